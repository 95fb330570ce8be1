//! Expression syntax tree and statement heads

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    In,
    NotIn,
    Is,
    IsNot,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::Is => "is",
            BinaryOp::IsNot => "is not",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// `then if cond else otherwise`
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn name(name: &str) -> Self {
        Expr::Name(name.to_string())
    }
}

/// `for TARGETS in ITER`
#[derive(Debug, Clone, PartialEq)]
pub struct ForHead {
    pub targets: Vec<String>,
    pub iter: Expr,
}

/// `with EXPR [as NAME]`
#[derive(Debug, Clone, PartialEq)]
pub struct WithHead {
    pub expr: Expr,
    pub alias: Option<String>,
}

/// `except [KIND [as NAME]]`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExceptHead {
    pub kind: Option<String>,
    pub alias: Option<String>,
}

/// `import MODULE [as NAME]`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportHead {
    pub module: String,
    pub alias: Option<String>,
}

/// `from MODULE import NAME [as ALIAS], ...`
#[derive(Debug, Clone, PartialEq)]
pub struct FromHead {
    pub module: String,
    pub names: Vec<(String, Option<String>)>,
}

/// `raise KIND[(MESSAGE)]`
#[derive(Debug, Clone, PartialEq)]
pub struct RaiseHead {
    pub kind: String,
    pub message: Option<Expr>,
}

/// `assert TEST[, MESSAGE]`
#[derive(Debug, Clone, PartialEq)]
pub struct AssertHead {
    pub test: Expr,
    pub message: Option<Expr>,
}
