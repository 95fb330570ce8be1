//! Expression tokens using logos

use std::fmt;

use logos::Logos;

use crate::error::Span;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"([ \t\r\n\f]|\\\r?\n)+")]
pub enum Token {
    // Keywords
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("in")]
    In,
    #[token("is")]
    Is,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("as")]
    As,
    #[token("import")]
    Import,
    #[token("True")]
    #[token("true")]
    True,
    #[token("False")]
    #[token("false")]
    False,
    #[token("None")]
    #[token("none")]
    None,

    // Operators (longer first)
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("//")]
    SlashSlash,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    // Delimiters
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    // Literals
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape(lex.slice()))]
    Str(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "name '{}'", s),
            Token::Int(n) => write!(f, "number {}", n),
            Token::Float(x) => write!(f, "number {}", x),
            Token::Str(s) => write!(f, "string {:?}", s),
            other => write!(f, "'{}'", other.symbol()),
        }
    }
}

impl Token {
    fn symbol(&self) -> &'static str {
        match self {
            Token::And => "and",
            Token::Or => "or",
            Token::Not => "not",
            Token::In => "in",
            Token::Is => "is",
            Token::If => "if",
            Token::Else => "else",
            Token::As => "as",
            Token::Import => "import",
            Token::True => "true",
            Token::False => "false",
            Token::None => "none",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::LessEq => "<=",
            Token::GreaterEq => ">=",
            Token::Less => "<",
            Token::Greater => ">",
            Token::Assign => "=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::SlashSlash => "//",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::ParenOpen => "(",
            Token::ParenClose => ")",
            Token::BracketOpen => "[",
            Token::BracketClose => "]",
            Token::BraceOpen => "{",
            Token::BraceClose => "}",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Dot => ".",
            Token::Ident(_) | Token::Int(_) | Token::Float(_) | Token::Str(_) => "literal",
        }
    }
}

/// Strip the quotes of a string literal and resolve its escapes
fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(c @ ('\\' | '"' | '\'')) => out.push(c),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Lex an expression, failing on the first character no token matches
pub fn lex(input: &str) -> Result<Vec<(Token, Span)>, (String, Span)> {
    Token::lexer(input)
        .spanned()
        .map(|(tok, span)| match tok {
            Ok(tok) => Ok((tok, span)),
            Err(()) => Err((format!("unexpected {:?}", &input[span.clone()]), span)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_keywords_and_names() {
        assert_eq!(
            tokens("not notable in index"),
            vec![
                Token::Not,
                Token::Ident("notable".to_string()),
                Token::In,
                Token::Ident("index".to_string()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("42 3.5 1.0e3"),
            vec![Token::Int(42), Token::Float(3.5), Token::Float(1000.0)]
        );
    }

    #[test]
    fn test_operators_prefer_longest() {
        assert_eq!(
            tokens("a // b <= c == d"),
            vec![
                Token::Ident("a".to_string()),
                Token::SlashSlash,
                Token::Ident("b".to_string()),
                Token::LessEq,
                Token::Ident("c".to_string()),
                Token::EqEq,
                Token::Ident("d".to_string()),
            ]
        );
    }

    #[test]
    fn test_strings_with_escapes() {
        assert_eq!(
            tokens(r#""a\"b\n" 'it\'s'"#),
            vec![
                Token::Str("a\"b\n".to_string()),
                Token::Str("it's".to_string())
            ]
        );
    }

    #[test]
    fn test_line_continuation_is_whitespace() {
        assert_eq!(tokens("a \\\n + b").len(), 3);
    }

    #[test]
    fn test_bad_character() {
        let (message, span) = lex("a ? b").unwrap_err();
        assert_eq!(message, "unexpected \"?\"");
        assert_eq!(span, 2..3);
    }
}
