//! Template lifecycle: parse once, cache, execute, clone

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::compiler::Compiler;
use crate::context::Context;
use crate::helpers::HelperMap;
use crate::parser::{parse, Program};
use crate::RenderError;

/// A template source paired with the helpers used to render it.
///
/// The parsed [`Program`] is produced at most once per template and
/// cached; executions and clones share it by reference. One mutex per
/// instance both guards the cache and serializes [`Template::exec`], so
/// concurrent renders of the same instance run one at a time while
/// renders of different instances (clones included) proceed in
/// parallel.
pub struct Template {
    input: String,
    /// Helpers overlaid onto the derived scope of every execution.
    /// Extend freely between construction and execution.
    pub helpers: HelperMap,
    program: Mutex<Option<Arc<Program>>>,
}

impl Template {
    /// Build a template and parse it eagerly.
    ///
    /// Returns the parse error for invalid input; use
    /// [`Template::lazy`] to defer parsing instead.
    pub fn new(input: impl Into<String>) -> Result<Self, RenderError> {
        let template = Self::lazy(input);
        template.parse()?;
        Ok(template)
    }

    /// Build a template without parsing. The first `parse` or `exec`
    /// call parses on demand; invalid input surfaces there as an error,
    /// never a panic.
    pub fn lazy(input: impl Into<String>) -> Self {
        Template {
            input: input.into(),
            helpers: HelperMap::new(),
            program: Mutex::new(None),
        }
    }

    /// The raw template source. Immutable after construction, so the
    /// cached program can never go stale.
    pub fn source(&self) -> &str {
        &self.input
    }

    /// Whether the source has been parsed and cached
    pub fn is_parsed(&self) -> bool {
        self.lock().is_some()
    }

    /// Ensure the cached program is populated.
    ///
    /// A no-op once the cache is set. On failure the cache stays empty,
    /// so a later call may retry.
    pub fn parse(&self) -> Result<(), RenderError> {
        let mut slot = self.lock();
        self.ensure_parsed(&mut slot).map(|_| ())
    }

    /// Render the template against a caller-supplied base context.
    ///
    /// Parses on demand, derives a child scope from `ctx` (the caller's
    /// context is never mutated), overlays the template's helpers onto
    /// the child, and evaluates the cached program against it. The
    /// whole sequence runs under this instance's lock; the guard is
    /// released on every exit path.
    pub fn exec(&self, ctx: &Context<'_>) -> Result<String, RenderError> {
        let mut slot = self.lock();
        let program = self.ensure_parsed(&mut slot)?;

        let mut scope = ctx.child();
        for (name, value) in self.helpers.iter() {
            scope.set(name.clone(), value.clone());
        }

        let output = Compiler::new(&program).compile(&mut scope)?;
        Ok(output)
    }

    /// A helper panic poisons the mutex; recover the guard so later
    /// renders on this instance are not wedged.
    fn lock(&self) -> MutexGuard<'_, Option<Arc<Program>>> {
        self.program.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_parsed(
        &self,
        slot: &mut Option<Arc<Program>>,
    ) -> Result<Arc<Program>, RenderError> {
        if let Some(program) = slot.as_ref() {
            return Ok(Arc::clone(program));
        }
        let program = Arc::new(parse(&self.input)?);
        *slot = Some(Arc::clone(&program));
        Ok(program)
    }
}

/// Cloning is meant for per-instance customization: the clone shares
/// the already-parsed program (no re-parse) but owns an independent
/// helper map and a fresh lock, so it renders in parallel with the
/// original and its helper set can diverge.
impl Clone for Template {
    fn clone(&self) -> Self {
        let mut helpers = HelperMap::empty();
        helpers.add_many(self.helpers.helpers().clone());
        Template {
            input: self.input.clone(),
            helpers,
            program: Mutex::new(self.lock().clone()),
        }
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("input", &self.input)
            .field("helpers", &self.helpers.len())
            .field("parsed", &self.is_parsed())
            .finish()
    }
}
