//! Velour - an ERB-style template rendering engine
//!
//! Templates mix raw text with `<% ... %>` tags. A [`Template`] parses
//! its source once, caches the parsed program, and renders it against
//! caller-supplied [`Context`]s any number of times, from any number of
//! threads. Helper functions registered on the template (or the
//! built-in set) are callable from template expressions.
//!
//! # Example
//!
//! ```rust
//! use velour::{render, Context};
//!
//! let mut ctx = Context::new();
//! ctx.set("name", "world");
//!
//! let out = render("Hello <%= upper(name) %>: <%= 1 + 1 %>", &ctx).unwrap();
//! assert_eq!(out, "Hello WORLD: 2");
//! ```

pub mod compiler;
pub mod context;
pub mod error;
pub mod helpers;
pub mod parser;
pub mod template;
pub mod value;

pub use compiler::EvalError;
pub use context::Context;
pub use error::ParseError;
pub use helpers::HelperMap;
pub use parser::{parse, Program};
pub use template::Template;
pub use value::{Helper, Value};

use thiserror::Error;

/// Errors that can occur during the render pipeline
#[derive(Debug, Error)]
pub enum RenderError {
    /// Error during parsing
    #[error("parse errors: {}", format_parse_errors(.0))]
    Parse(Vec<ParseError>),

    /// Error during evaluation
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
}

impl From<Vec<ParseError>> for RenderError {
    fn from(errors: Vec<ParseError>) -> Self {
        RenderError::Parse(errors)
    }
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Render template source against a context with the built-in helpers
///
/// This constructs a throwaway [`Template`]; hold on to a `Template`
/// instead when the same source renders more than once.
///
/// # Example
///
/// ```rust
/// use velour::{render, Context};
///
/// let out = render("<%= join([1, 2, 3], \"-\") %>", &Context::new()).unwrap();
/// assert_eq!(out, "1-2-3");
/// ```
pub fn render(input: &str, ctx: &Context<'_>) -> Result<String, RenderError> {
    let template = Template::new(input)?;
    template.exec(ctx)
}

/// Render with a caller-supplied helper registry in place of the
/// built-in one
pub fn render_with_helpers(
    input: &str,
    ctx: &Context<'_>,
    helpers: HelperMap,
) -> Result<String, RenderError> {
    let mut template = Template::new(input)?;
    template.helpers = helpers;
    template.exec(ctx)
}
