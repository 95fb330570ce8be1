//! Statement model and the grammars that classify statement strings

use crate::config::Config;
use crate::error::{Error, Span, SyntaxErrorKind};
use crate::escape::BoundFilter;
use crate::expr::{
    self, AssertHead, ExceptHead, Expr, ExprError, ForHead, FromHead, ImportHead, RaiseHead,
    WithHead,
};

/// How a statement moves the parser's stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Opens a scope that following statements nest into
    pub can_indent: bool,
    /// Is attached to the enclosing scope
    pub can_append: bool,
    /// Closes the innermost open scope
    pub can_unindent: bool,
}

impl Capabilities {
    const APPEND: Self = Self {
        can_indent: false,
        can_append: true,
        can_unindent: false,
    };
    const INDENT: Self = Self {
        can_indent: true,
        can_append: true,
        can_unindent: false,
    };
    const HALF_INDENT: Self = Self {
        can_indent: true,
        can_append: true,
        can_unindent: true,
    };
    const UNINDENT: Self = Self {
        can_indent: false,
        can_append: false,
        can_unindent: true,
    };
}

/// Header of a statement that opens a scope
#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    If(Expr),
    While(Expr),
    For { head: ForHead, is_async: bool },
    With { head: WithHead, is_async: bool },
    Try,
    Elif(Expr),
    Else,
    Except(ExceptHead),
    Finally,
}

impl Header {
    pub fn keyword(&self) -> &'static str {
        match self {
            Header::If(_) => "if",
            Header::While(_) => "while",
            Header::For { .. } => "for",
            Header::With { .. } => "with",
            Header::Try => "try",
            Header::Elif(_) => "elif",
            Header::Else => "else",
            Header::Except(_) => "except",
            Header::Finally => "finally",
        }
    }
}

/// A single-line statement with no body
#[derive(Debug, Clone, PartialEq)]
pub enum InlineStmt {
    Break,
    Continue,
    Import(ImportHead),
    FromImport(FromHead),
    /// `raise` alone re-raises the error being handled
    Raise(Option<RaiseHead>),
    Global(Vec<String>),
    Nonlocal(Vec<String>),
    Assert(AssertHead),
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    Plain(String),
    Output { filter: BoundFilter, expr: Expr },
    Block { name: String },
    Include { path: Expr },
    Inherit { path: Expr },
    Indent(Header),
    HalfIndent(Header),
    Unindent,
    Inline(InlineStmt),
    Comment(String),
    Assign { targets: Vec<String>, expr: Expr },
}

impl StatementKind {
    pub fn capabilities(&self) -> Capabilities {
        match self {
            StatementKind::Block { .. } | StatementKind::Indent(_) => Capabilities::INDENT,
            StatementKind::HalfIndent(_) => Capabilities::HALF_INDENT,
            StatementKind::Unindent => Capabilities::UNINDENT,
            _ => Capabilities::APPEND,
        }
    }
}

/// A parsed statement and, for scope openers, the statements nested in it
#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    /// Source line; `None` for plain text
    pub line: Option<usize>,
    pub span: Span,
    pub children: Vec<Statement>,
}

impl Statement {
    pub fn plain(text: String) -> Self {
        Self {
            kind: StatementKind::Plain(text),
            line: None,
            span: 0..0,
            children: Vec::new(),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.kind.capabilities()
    }
}

/// Where a statement string came from, for error reporting and filter lookup
pub struct MatchContext<'c> {
    pub config: &'c Config,
    pub file: &'c str,
    pub line: usize,
    pub span: Span,
}

impl MatchContext<'_> {
    pub fn error(&self, kind: SyntaxErrorKind, message: impl Into<String>) -> Error {
        Error::syntax(kind, self.file, self.line, self.span.clone(), message)
    }

    fn invalid(&self, what: &str, err: ExprError) -> Error {
        self.error(
            SyntaxErrorKind::InvalidExpression,
            format!("invalid {}: {}", what, err.message),
        )
    }

    fn parse<T>(
        &self,
        what: &str,
        text: &str,
        parse: fn(&str) -> Result<T, ExprError>,
    ) -> Result<T, Error> {
        parse(text).map_err(|err| self.invalid(what, err))
    }
}

/// A statement grammar: one matcher in the parser's dispatch list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    Block,
    Include,
    Inherit,
    Indent,
    Unindent,
    HalfIndent,
    Inline,
    Comment,
    Output,
    Assign,
}

impl Grammar {
    /// Dispatch order; fixed keywords before filter prefixes before `let`
    pub const DEFAULT_ORDER: [Grammar; 10] = [
        Grammar::Block,
        Grammar::Include,
        Grammar::Inherit,
        Grammar::Indent,
        Grammar::Unindent,
        Grammar::HalfIndent,
        Grammar::Inline,
        Grammar::Comment,
        Grammar::Output,
        Grammar::Assign,
    ];

    /// Classify a trimmed statement string
    ///
    /// `Ok(None)` means this grammar does not claim the statement; an error
    /// means it does but the statement is malformed.
    pub fn try_match(
        self,
        text: &str,
        cx: &MatchContext<'_>,
    ) -> Result<Option<StatementKind>, Error> {
        let (keyword, rest) = split_keyword(text);
        match self {
            Grammar::Block => {
                if keyword != "block" {
                    return Ok(None);
                }
                if !is_block_name(rest) {
                    return Err(cx.error(
                        SyntaxErrorKind::InvalidBlockName,
                        format!("invalid block name {:?}", rest),
                    ));
                }
                Ok(Some(StatementKind::Block {
                    name: rest.to_string(),
                }))
            }
            Grammar::Include | Grammar::Inherit => {
                let wanted = if self == Grammar::Include {
                    "include"
                } else {
                    "inherit"
                };
                if keyword != wanted {
                    return Ok(None);
                }
                let path = cx.parse("path", rest, expr::parse_expr)?;
                Ok(Some(if self == Grammar::Include {
                    StatementKind::Include { path }
                } else {
                    StatementKind::Inherit { path }
                }))
            }
            Grammar::Indent => match_indent(keyword, rest, cx),
            Grammar::Unindent => Ok((text == "end").then_some(StatementKind::Unindent)),
            Grammar::HalfIndent => match_half_indent(keyword, rest, cx),
            Grammar::Inline => match_inline(keyword, rest, cx),
            Grammar::Comment => Ok(text
                .strip_prefix('#')
                .map(|comment| StatementKind::Comment(comment.trim().to_string()))),
            Grammar::Output => match_output(text, cx),
            Grammar::Assign => {
                if keyword != "let" {
                    return Ok(None);
                }
                match_assign(rest, cx).map(Some)
            }
        }
    }
}

fn keyword_len(text: &str) -> usize {
    text.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len())
}

/// Split off the leading identifier-like word, trimming the remainder
fn split_keyword(text: &str) -> (&str, &str) {
    let (keyword, rest) = text.split_at(keyword_len(text));
    (keyword, rest.trim())
}

fn is_block_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn match_indent(
    keyword: &str,
    rest: &str,
    cx: &MatchContext<'_>,
) -> Result<Option<StatementKind>, Error> {
    let header = match keyword {
        "if" => Header::If(cx.parse("condition", rest, expr::parse_expr)?),
        "while" => Header::While(cx.parse("condition", rest, expr::parse_expr)?),
        "for" => Header::For {
            head: cx.parse("for loop", rest, expr::parse_for_head)?,
            is_async: false,
        },
        "with" => Header::With {
            head: cx.parse("with statement", rest, expr::parse_with_head)?,
            is_async: false,
        },
        "try" if rest.is_empty() => Header::Try,
        "async" => {
            let (inner, head) = split_keyword(rest);
            match inner {
                "for" => Header::For {
                    head: cx.parse("for loop", head, expr::parse_for_head)?,
                    is_async: true,
                },
                "with" => Header::With {
                    head: cx.parse("with statement", head, expr::parse_with_head)?,
                    is_async: true,
                },
                _ => return Ok(None),
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(StatementKind::Indent(header)))
}

fn match_half_indent(
    keyword: &str,
    rest: &str,
    cx: &MatchContext<'_>,
) -> Result<Option<StatementKind>, Error> {
    let header = match keyword {
        "elif" => Header::Elif(cx.parse("condition", rest, expr::parse_expr)?),
        "else" if rest.is_empty() => Header::Else,
        "except" if rest.is_empty() => Header::Except(ExceptHead::default()),
        "except" => Header::Except(cx.parse("except clause", rest, expr::parse_except_head)?),
        "finally" if rest.is_empty() => Header::Finally,
        _ => return Ok(None),
    };
    Ok(Some(StatementKind::HalfIndent(header)))
}

fn match_inline(
    keyword: &str,
    rest: &str,
    cx: &MatchContext<'_>,
) -> Result<Option<StatementKind>, Error> {
    let inline = match keyword {
        "break" if rest.is_empty() => InlineStmt::Break,
        "continue" if rest.is_empty() => InlineStmt::Continue,
        "import" => InlineStmt::Import(cx.parse("import", rest, expr::parse_import_head)?),
        "from" => InlineStmt::FromImport(cx.parse("import", rest, expr::parse_from_head)?),
        "raise" if rest.is_empty() => InlineStmt::Raise(None),
        "raise" => InlineStmt::Raise(Some(cx.parse("raise", rest, expr::parse_raise_head)?)),
        "global" => InlineStmt::Global(cx.parse("global", rest, expr::parse_names)?),
        "nonlocal" => InlineStmt::Nonlocal(cx.parse("nonlocal", rest, expr::parse_names)?),
        "assert" => InlineStmt::Assert(cx.parse("assert", rest, expr::parse_assert_head)?),
        _ => return Ok(None),
    };
    Ok(Some(StatementKind::Inline(inline)))
}

fn match_output(text: &str, cx: &MatchContext<'_>) -> Result<Option<StatementKind>, Error> {
    let (prefix, raw) = text.split_at(keyword_len(text));
    if !raw.starts_with('=') || raw.starts_with("==") {
        return Ok(None);
    }

    let name = if prefix.is_empty() { "default" } else { prefix };
    let Some(func) = cx.config.filter(name) else {
        return Ok(None);
    };

    let source = raw[1..].trim();
    if source.is_empty() {
        return Err(cx.error(SyntaxErrorKind::EmptyOutput, "empty output expression"));
    }
    let expr = cx.parse("output expression", source, expr::parse_expr)?;
    Ok(Some(StatementKind::Output {
        filter: BoundFilter {
            name: name.to_string(),
            func: func.clone(),
        },
        expr,
    }))
}

/// `let TARGETS = EXPR`, split on the first bare `=`
fn match_assign(rest: &str, cx: &MatchContext<'_>) -> Result<StatementKind, Error> {
    let invalid = || cx.error(SyntaxErrorKind::InvalidAssignment, "invalid assignment");

    let mut assigns = bare_assignments(rest);
    let at = assigns.next().ok_or_else(invalid)?;
    if assigns.next().is_some() {
        return Err(invalid());
    }

    let (target, value) = (rest[..at].trim(), rest[at + 1..].trim());
    if target.is_empty() || value.is_empty() {
        return Err(invalid());
    }

    let targets = expr::parse_targets(target).map_err(|_| invalid())?;
    let expr = cx.parse("assigned expression", value, expr::parse_expr)?;
    Ok(StatementKind::Assign { targets, expr })
}

/// Byte offsets of `=` that are not part of `==`, `!=`, `<=` or `>=`
///
/// Quoted strings are skipped so `let s = "a=b"` has one assignment.
fn bare_assignments(text: &str) -> impl Iterator<Item = usize> + '_ {
    let bytes = text.as_bytes();
    let mut quote = None;
    let mut escaped = false;
    let mut offsets = Vec::new();

    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'=' => {
                let prev = i.checked_sub(1).map(|p| bytes[p]);
                let next = bytes.get(i + 1).copied();
                let compound =
                    matches!(prev, Some(b'=' | b'!' | b'<' | b'>')) || next == Some(b'=');
                if !compound {
                    offsets.push(i);
                }
            }
            _ => {}
        }
    }
    offsets.into_iter()
}
