//! Mark scanner splitting template source into text and statement segments
//!
//! Two logos token sets share one lexer: [`PlainToken`] outside marks and
//! [`StatementToken`] between `<%` and `%>`, switched with `Lexer::morph`.

use logos::{Lexer, Logos};

use crate::error::{Error, Span, SyntaxErrorKind};

pub const BEGIN_MARK: &str = "<%";
pub const END_MARK: &str = "%>";

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
enum PlainToken {
    #[token("<%%")]
    EscapedBegin,
    #[token("<%")]
    Begin,
    #[token("\n")]
    Newline,
    #[token("<")]
    Lt,
    #[regex(r"[^<\n]+")]
    Text,
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
enum StatementToken {
    #[token("%%>")]
    EscapedEnd,
    #[token("%>")]
    End,
    #[token("\n")]
    Newline,
    #[token("%")]
    Percent,
    #[regex(r"[^%\n]+")]
    Text,
}

/// A piece of template source
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text with escaped marks already collapsed
    Plain(String),
    /// The raw text between a begin and end mark
    Statement {
        text: String,
        /// Line of the begin mark, starting at 1
        line: usize,
        /// Byte range from the begin mark to the end of the end mark
        span: Span,
    },
}

/// Split `source` into segments
///
/// Empty text runs are never emitted. A begin mark without an end mark is a
/// syntax error pointing at the line of the begin mark.
pub fn scan(source: &str, file: &str) -> Result<Vec<Segment>, Error> {
    let mut segments = Vec::new();
    let mut line = 1;
    let mut lex: Lexer<'_, PlainToken> = PlainToken::lexer(source);

    loop {
        let mut plain = String::new();
        let mut begin = None;
        while let Some(token) = lex.next() {
            match token {
                Ok(PlainToken::EscapedBegin) => plain.push_str(BEGIN_MARK),
                Ok(PlainToken::Begin) => {
                    begin = Some(lex.span().start);
                    break;
                }
                Ok(PlainToken::Newline) => {
                    line += 1;
                    plain.push('\n');
                }
                Ok(PlainToken::Lt | PlainToken::Text) | Err(_) => plain.push_str(lex.slice()),
            }
        }
        if !plain.is_empty() {
            segments.push(Segment::Plain(plain));
        }

        let Some(start) = begin else {
            break;
        };
        let start_line = line;
        let mut statement = lex.morph::<StatementToken>();
        let mut text = String::new();
        let mut end = None;
        while let Some(token) = statement.next() {
            match token {
                Ok(StatementToken::EscapedEnd) => text.push_str(END_MARK),
                Ok(StatementToken::End) => {
                    end = Some(statement.span().end);
                    break;
                }
                Ok(StatementToken::Newline) => {
                    line += 1;
                    text.push('\n');
                }
                Ok(StatementToken::Percent | StatementToken::Text) | Err(_) => {
                    text.push_str(statement.slice())
                }
            }
        }

        let Some(end) = end else {
            return Err(Error::syntax(
                SyntaxErrorKind::MissingEndMark,
                file,
                start_line,
                start..start + BEGIN_MARK.len(),
                "cannot find end mark for begin mark",
            ));
        };
        segments.push(Segment::Statement {
            text,
            line: start_line,
            span: start..end,
        });
        lex = statement.morph();
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(text: &str, line: usize, span: Span) -> Segment {
        Segment::Statement {
            text: text.to_string(),
            line,
            span,
        }
    }

    #[test]
    fn test_plain_only() {
        let segments = scan("Hello, <world> 100%", "t").unwrap();
        assert_eq!(segments, vec![Segment::Plain("Hello, <world> 100%".to_string())]);
    }

    #[test]
    fn test_empty_source_has_no_segments() {
        assert!(scan("", "t").unwrap().is_empty());
    }

    #[test]
    fn test_statement_between_text() {
        let segments = scan("a<%= x %>b", "t").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Plain("a".to_string()),
                statement("= x ", 1, 1..9),
                Segment::Plain("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_adjacent_statements_emit_no_empty_text() {
        let segments = scan("<% if x %><% end %>", "t").unwrap();
        assert_eq!(segments.len(), 2);
        assert!(segments
            .iter()
            .all(|s| matches!(s, Segment::Statement { .. })));
    }

    #[test]
    fn test_escaped_begin_mark() {
        let segments = scan("<%% foo %>", "t").unwrap();
        assert_eq!(segments, vec![Segment::Plain("<% foo %>".to_string())]);
    }

    #[test]
    fn test_escaped_end_mark_inside_statement() {
        let segments = scan("<%= \"%%>\" %>", "t").unwrap();
        assert_eq!(segments, vec![statement("= \"%>\" ", 1, 0..12)]);
    }

    #[test]
    fn test_multiline_statement_keeps_begin_line() {
        let segments = scan("one\ntwo <% if a and\n   b %>\n<% end %>", "t").unwrap();
        assert_eq!(segments[1], statement(" if a and\n   b ", 2, 8..27));
        assert_eq!(
            segments[3],
            Segment::Statement {
                text: " end ".to_string(),
                line: 4,
                span: 28..37,
            }
        );
    }

    #[test]
    fn test_missing_end_mark_cites_begin_line() {
        let err = scan("line one\n<% if x\n\n", "page.html").unwrap_err();
        assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::MissingEndMark));
        assert_eq!(err.line(), Some(2));
        assert_eq!(
            err.to_string(),
            "cannot find end mark for begin mark in file page.html at line 2"
        );
    }
}
