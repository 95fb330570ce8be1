//! Error types for compiling and rendering templates

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in template source
pub type Span = std::ops::Range<usize>;

/// The specific reason a template failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    /// A begin mark without a matching end mark
    MissingEndMark,
    /// An `end` with nothing open
    RedundantUnindent,
    /// A construct still open at end of input
    UnterminatedBlock,
    /// A statement ending with `:`
    TrailingColon,
    /// An output statement without an expression
    EmptyOutput,
    /// A malformed `let` statement
    InvalidAssignment,
    /// A block name that is not an identifier
    InvalidBlockName,
    /// An expression or statement header that does not parse
    InvalidExpression,
    /// `elif`/`else`/`except`/`finally` closing the wrong construct
    MisplacedClause,
    /// `break`/`continue` outside a loop
    OutsideLoop,
    /// `nonlocal` has no enclosing scope to bind to
    NonlocalBinding,
}

#[derive(Debug, Error)]
pub enum Error {
    /// The loader cannot resolve a path
    #[error("{message}")]
    NotFound { path: String, message: String },

    /// Malformed template source
    #[error("{message} in file {file} at line {line}")]
    Syntax {
        kind: SyntaxErrorKind,
        file: String,
        line: usize,
        span: Span,
        message: String,
    },

    /// A statement string no grammar claims
    #[error("unknown statement {statement:?} in file {file} at line {line}")]
    UnknownStatement {
        statement: String,
        file: String,
        line: usize,
        span: Span,
    },

    /// Two blocks with the same name in one file
    #[error(
        "block `{name}` in file {file} at line {line} conflicts with the block defined at line {first_line}"
    )]
    BlockNameConflict {
        name: String,
        file: String,
        line: usize,
        first_line: usize,
        span: Span,
    },

    /// Misuse of the render state machine
    #[error("render error: {0}")]
    Render(String),

    /// An error raised while evaluating template code
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// Template bytes not valid in the configured encoding
    #[error("cannot decode {path} as {encoding}")]
    Decode { path: String, encoding: &'static str },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A bug in code generation, never caused by template content
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn syntax(
        kind: SyntaxErrorKind,
        file: impl Into<String>,
        line: usize,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Self::Syntax {
            kind,
            file: file.into(),
            line,
            span,
            message: message.into(),
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    /// True for syntax errors, including unknown statements
    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax { .. } | Self::UnknownStatement { .. })
    }

    /// The syntax error kind, if this is a syntax error
    pub fn syntax_kind(&self) -> Option<SyntaxErrorKind> {
        match self {
            Self::Syntax { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Line number the error points at, for errors tied to a source location
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Syntax { line, .. }
            | Self::UnknownStatement { line, .. }
            | Self::BlockNameConflict { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// Format the error with source context using ariadne
    ///
    /// Returns `None` for errors that do not point into template source.
    pub fn report(&self, source: &str) -> Option<String> {
        let (file, span, message) = match self {
            Self::Syntax {
                file,
                span,
                message,
                ..
            } => (file, span, message.clone()),
            Self::UnknownStatement {
                file,
                span,
                statement,
                ..
            } => (file, span, format!("unknown statement {:?}", statement)),
            Self::BlockNameConflict {
                file,
                span,
                name,
                first_line,
                ..
            } => (
                file,
                span,
                format!("block `{}` is already defined at line {}", name, first_line),
            ),
            _ => return None,
        };

        // ariadne counts characters, spans are bytes
        let to_chars = |offset: usize| source.get(..offset).map_or(0, |s| s.chars().count());
        let span = to_chars(span.start)..to_chars(span.end.min(source.len()));
        let file = file.as_str();

        let mut buf = Vec::new();
        Report::build(ReportKind::Error, file, span.start)
            .with_message(&message)
            .with_label(
                Label::new((file, span))
                    .with_message(message)
                    .with_color(Color::Red),
            )
            .finish()
            .write((file, Source::from(source)), &mut buf)
            .ok()?;
        String::from_utf8(buf).ok()
    }
}

/// An error raised by template code: a failed expression, `raise` or `assert`
///
/// `kind` names the error class (`NameError`, `TypeError`, a user-chosen name
/// in `raise`), which `except` clauses match against.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", self.describe())]
pub struct EvalError {
    pub kind: String,
    pub message: String,
}

impl EvalError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn name_error(name: &str) -> Self {
        Self::new("NameError", format!("name '{}' is not defined", name))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }

    pub fn key_error(key: &str) -> Self {
        Self::new("KeyError", format!("{:?}", key))
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new("IndexError", message)
    }

    pub fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::new(
            "AttributeError",
            format!("'{}' object has no attribute '{}'", type_name, attr),
        )
    }

    pub fn zero_division() -> Self {
        Self::new("ZeroDivisionError", "division by zero")
    }

    fn describe(&self) -> String {
        if self.message.is_empty() {
            self.kind.clone()
        } else {
            format!("{}: {}", self.kind, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_message_names_file_and_line() {
        let err = Error::syntax(
            SyntaxErrorKind::MissingEndMark,
            "page.html",
            3,
            10..12,
            "cannot find end mark for begin mark",
        );
        assert_eq!(
            err.to_string(),
            "cannot find end mark for begin mark in file page.html at line 3"
        );
        assert!(err.is_syntax());
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn test_eval_error_display() {
        assert_eq!(
            EvalError::name_error("missing").to_string(),
            "NameError: name 'missing' is not defined"
        );
        assert_eq!(EvalError::new("RuntimeError", "").to_string(), "RuntimeError");
    }

    #[test]
    fn test_report_points_into_source() {
        let source = "Hello <% fi %>";
        let err = Error::UnknownStatement {
            statement: "fi".to_string(),
            file: "hello.html".to_string(),
            line: 1,
            span: 6..14,
        };
        let report = err.report(source).expect("has a span");
        assert!(report.contains("hello.html"));
        assert!(report.contains("unknown statement"));
    }

    #[test]
    fn test_report_is_none_without_span() {
        assert!(Error::render("boom").report("").is_none());
    }
}
