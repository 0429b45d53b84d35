//! Abstract syntax tree for parsed templates

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Valid identifier (alphanumeric + underscore, starts with letter/_)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Root AST node - a fully parsed template
///
/// Immutable after creation; shared via `Arc` between a `Template`
/// and its clones, and read concurrently by executions.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Spanned<Statement>>,
}

/// Top-level item in a template
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Raw text between tags, written to the output verbatim
    Text(String),
    /// `<%= expr %>` - evaluate and write the display form
    Output(Spanned<Expr>),
    /// `<% expr %>` - evaluate for side effects, discard the result
    Expression(Spanned<Expr>),
    /// `<% let name = expr %>` - bind in the innermost scope
    Let {
        name: Spanned<Identifier>,
        value: Spanned<Expr>,
    },
    /// `<% name = expr %>` - rebind in the innermost scope
    Assign {
        name: Spanned<Identifier>,
        value: Spanned<Expr>,
    },
    /// `<% if cond { %>...<% } else { %>...<% } %>`
    ///
    /// An `else if` chain nests as a single-statement else branch.
    If {
        condition: Spanned<Expr>,
        then_branch: Vec<Spanned<Statement>>,
        else_branch: Option<Vec<Spanned<Statement>>>,
    },
    /// `<% for v in expr { %>...<% } %>` or `<% for k, v in expr { %>...<% } %>`
    ///
    /// With two binders, `key` receives the index (arrays, ranges) or
    /// the map key (hashes) and `value` the element.
    For {
        key: Option<Spanned<Identifier>>,
        value: Spanned<Identifier>,
        iterable: Spanned<Expr>,
        body: Vec<Spanned<Statement>>,
    },
}

/// Expression inside a tag
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Spanned<Expr>>),
    /// `start..end`, end-exclusive
    Range {
        start: Box<Spanned<Expr>>,
        end: Box<Spanned<Expr>>,
    },
    Ident(Identifier),
    /// `object.field` - hash member lookup
    Field {
        object: Box<Spanned<Expr>>,
        field: Spanned<Identifier>,
    },
    /// `object[index]`
    Index {
        object: Box<Spanned<Expr>>,
        index: Box<Spanned<Expr>>,
    },
    /// `callee(args...)` - helper invocation
    Call {
        callee: Box<Spanned<Expr>>,
        args: Vec<Spanned<Expr>>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Spanned<Expr>>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!x`
    Not,
    /// `-x`
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
}

impl BinaryOp {
    /// Operator spelling for error messages
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}
