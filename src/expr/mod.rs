//! The embedded expression language
//!
//! Statements delegate everything after their keyword to this module:
//! `<% if user.admin and not banned %>`, `<% for k, v in items.items() %>`,
//! `<%= title.upper() if loud else title %>`. Evaluation itself lives in the
//! runtime, which owns the scopes; [`ops`] holds the value-level operations.

pub mod ast;
pub mod builtins;
mod grammar;
pub mod lexer;
pub mod ops;

use chumsky::error::{Rich, RichPattern, RichReason};
use thiserror::Error;

use crate::error::Span;

pub use ast::*;
pub use grammar::{
    parse_assert_head, parse_except_head, parse_expr, parse_for_head, parse_from_head,
    parse_import_head, parse_names, parse_raise_head, parse_targets, parse_with_head,
};

use lexer::Token;

/// A malformed expression; the span is relative to the expression text
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ExprError {
    pub message: String,
    pub span: Span,
}

impl ExprError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    fn from_rich(errors: Vec<Rich<'_, Token>>) -> Self {
        let Some(err) = errors.into_iter().next() else {
            return Self::new("invalid expression", 0..0);
        };

        let mut message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => match found {
                Some(tok) => format!("unexpected {}", &**tok),
                None => "unexpected end of expression".to_string(),
            },
            RichReason::Custom(msg) => msg.to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|pattern| match pattern {
                RichPattern::Token(tok) => Some(tok.to_string()),
                RichPattern::Label(label) => Some(label.to_string()),
                RichPattern::EndOfInput => Some("end of expression".to_string()),
                RichPattern::Identifier(s) => Some(format!("'{}'", s)),
                RichPattern::Any => Some("any token".to_string()),
                RichPattern::SomethingElse => None,
            })
            .collect();
        if !expected.is_empty() {
            message.push_str(&format!(", expected {}", expected.join(" or ")));
        }

        Self::new(message, err.span().into_range())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_unexpected_token() {
        let err = parse_expr("a +").unwrap_err();
        assert!(err.message.starts_with("unexpected"), "{}", err.message);

        let err = parse_expr("a )").unwrap_err();
        assert!(err.message.starts_with("unexpected ')'"), "{}", err.message);
        assert_eq!(err.span, 2..3);
    }

    #[test]
    fn test_lex_error_is_reported() {
        let err = parse_expr("a $ b").unwrap_err();
        assert_eq!(err.message, "unexpected \"$\"");
    }
}
