//! Template parser
//!
//! Turns template source into a [`Root`]: the scanner in [`lexer`] yields
//! text and statement segments, each statement string is classified by the
//! first [`Grammar`] in the config that claims it, and an explicit stack of
//! open scopes nests statements into a tree. Block bodies are lifted out of
//! the tree into [`Root::blocks`], leaving a reference where they were
//! defined.

pub mod lexer;
pub mod statement;

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::config::Config;
use crate::error::{Error, SyntaxErrorKind};
pub use lexer::{scan, Segment};
pub use statement::{
    Capabilities, Grammar, Header, InlineStmt, MatchContext, Statement, StatementKind,
};

/// A named block body lifted out of the tree
#[derive(Debug, Clone)]
pub struct BlockDef {
    pub name: String,
    pub line: usize,
    pub body: Vec<Statement>,
}

/// A parsed template
#[derive(Debug, Clone, Default)]
pub struct Root {
    pub statements: Vec<Statement>,
    pub blocks: BTreeMap<String, BlockDef>,
}

/// Which clauses may follow an open scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chain {
    If,
    IfElse,
    Loop,
    LoopElse,
    TryStart,
    TryExcept,
    TryElse,
    TryFinally,
    With,
    Block,
}

/// Parse template source
pub fn parse(source: &str, file: &str, config: &Config) -> Result<Root, Error> {
    let mut builder = TreeBuilder {
        config,
        file,
        root: Root::default(),
        stack: Vec::new(),
        block_lines: HashMap::new(),
    };
    for segment in scan(source, file)? {
        builder.push_segment(segment)?;
    }
    builder.finish()
}

struct TreeBuilder<'c> {
    config: &'c Config,
    file: &'c str,
    root: Root,
    stack: Vec<(Statement, Chain)>,
    block_lines: HashMap<String, usize>,
}

impl TreeBuilder<'_> {
    fn push_segment(&mut self, segment: Segment) -> Result<(), Error> {
        let (text, line, span) = match segment {
            Segment::Plain(text) => {
                self.attach(Statement::plain(text));
                return Ok(());
            }
            Segment::Statement { text, line, span } => (text, line, span),
        };

        let cx = MatchContext {
            config: self.config,
            file: self.file,
            line,
            span: span.clone(),
        };
        let text = text.trim();
        if text.ends_with(':') {
            return Err(cx.error(
                SyntaxErrorKind::TrailingColon,
                format!("statement {:?} must not end with a colon", text),
            ));
        }

        let mut kind = None;
        for grammar in self.config.grammars() {
            if let Some(matched) = grammar.try_match(text, &cx)? {
                kind = Some(matched);
                break;
            }
        }
        let Some(kind) = kind else {
            return Err(Error::UnknownStatement {
                statement: text.to_string(),
                file: self.file.to_string(),
                line,
                span,
            });
        };

        self.push(Statement {
            kind,
            line: Some(line),
            span,
            children: Vec::new(),
        })
    }

    fn push(&mut self, statement: Statement) -> Result<(), Error> {
        let caps = statement.capabilities();

        let mut chain = None;
        if caps.can_unindent {
            let Some((open, open_chain)) = self.stack.pop() else {
                return Err(self.error(
                    &statement,
                    SyntaxErrorKind::RedundantUnindent,
                    "redundant unindent",
                ));
            };
            chain = self.continue_chain(&statement, &open, open_chain)?;
            trace!(file = self.file, line = ?statement.line, "closing scope");
            self.close(open);
        }

        if caps.can_indent {
            let chain = match chain {
                Some(chain) => chain,
                None => self.open_chain(&statement)?,
            };
            self.stack.push((statement, chain));
        } else if caps.can_append {
            self.check_inline(&statement)?;
            self.attach(statement);
        }
        Ok(())
    }

    /// The chain a clause continues, or `None` for a plain `end`
    fn continue_chain(
        &self,
        clause: &Statement,
        open: &Statement,
        open_chain: Chain,
    ) -> Result<Option<Chain>, Error> {
        let header = match &clause.kind {
            StatementKind::HalfIndent(header) => header,
            _ if open_chain == Chain::TryStart => {
                return Err(self.error(
                    open,
                    SyntaxErrorKind::MisplacedClause,
                    "`try` needs an `except` or `finally` clause",
                ))
            }
            _ => return Ok(None),
        };

        let next = match (header, open_chain) {
            (Header::Elif(_), Chain::If) => Chain::If,
            (Header::Else, Chain::If) => Chain::IfElse,
            (Header::Else, Chain::Loop) => Chain::LoopElse,
            (Header::Else, Chain::TryExcept) => Chain::TryElse,
            (Header::Except(_), Chain::TryStart | Chain::TryExcept) => Chain::TryExcept,
            (Header::Finally, Chain::TryStart | Chain::TryExcept | Chain::TryElse) => {
                Chain::TryFinally
            }
            _ => {
                return Err(self.error(
                    clause,
                    SyntaxErrorKind::MisplacedClause,
                    format!("`{}` does not continue the open statement", header.keyword()),
                ))
            }
        };
        Ok(Some(next))
    }

    fn open_chain(&mut self, statement: &Statement) -> Result<Chain, Error> {
        let chain = match &statement.kind {
            StatementKind::Block { name } => {
                let line = statement.line.unwrap_or_default();
                if let Some(&first_line) = self.block_lines.get(name) {
                    return Err(Error::BlockNameConflict {
                        name: name.clone(),
                        file: self.file.to_string(),
                        line,
                        first_line,
                        span: statement.span.clone(),
                    });
                }
                self.block_lines.insert(name.clone(), line);
                Chain::Block
            }
            StatementKind::Indent(Header::If(_)) => Chain::If,
            StatementKind::Indent(Header::While(_) | Header::For { .. }) => Chain::Loop,
            StatementKind::Indent(Header::With { .. }) => Chain::With,
            StatementKind::Indent(Header::Try) => Chain::TryStart,
            _ => {
                return Err(Error::Internal(format!(
                    "statement at line {:?} cannot open a scope",
                    statement.line
                )))
            }
        };
        Ok(chain)
    }

    fn check_inline(&self, statement: &Statement) -> Result<(), Error> {
        match &statement.kind {
            StatementKind::Inline(InlineStmt::Break) => self.check_in_loop(statement, "break"),
            StatementKind::Inline(InlineStmt::Continue) => {
                self.check_in_loop(statement, "continue")
            }
            StatementKind::Inline(InlineStmt::Nonlocal(names)) => Err(self.error(
                statement,
                SyntaxErrorKind::NonlocalBinding,
                format!("no binding for nonlocal '{}' found", names.join(", ")),
            )),
            _ => Ok(()),
        }
    }

    /// Blocks render on their own, so a loop outside a block does not count
    fn check_in_loop(&self, statement: &Statement, keyword: &str) -> Result<(), Error> {
        for (_, chain) in self.stack.iter().rev() {
            match chain {
                Chain::Loop => return Ok(()),
                Chain::Block => break,
                _ => {}
            }
        }
        Err(self.error(
            statement,
            SyntaxErrorKind::OutsideLoop,
            format!("'{}' outside loop", keyword),
        ))
    }

    fn close(&mut self, mut open: Statement) {
        if let StatementKind::Block { name } = &open.kind {
            let body = std::mem::take(&mut open.children);
            self.root.blocks.insert(
                name.clone(),
                BlockDef {
                    name: name.clone(),
                    line: open.line.unwrap_or_default(),
                    body,
                },
            );
        }
        self.attach(open);
    }

    fn attach(&mut self, statement: Statement) {
        match self.stack.last_mut() {
            Some((top, _)) => top.children.push(statement),
            None => self.root.statements.push(statement),
        }
    }

    fn finish(self) -> Result<Root, Error> {
        if let Some((open, _)) = self.stack.last() {
            return Err(self.error(
                open,
                SyntaxErrorKind::UnterminatedBlock,
                format!("unterminated block `{}`", describe(&open.kind)),
            ));
        }
        Ok(self.root)
    }

    fn error(
        &self,
        statement: &Statement,
        kind: SyntaxErrorKind,
        message: impl Into<String>,
    ) -> Error {
        Error::syntax(
            kind,
            self.file,
            statement.line.unwrap_or_default(),
            statement.span.clone(),
            message,
        )
    }
}

fn describe(kind: &StatementKind) -> &'static str {
    match kind {
        StatementKind::Block { .. } => "block",
        StatementKind::Indent(header) | StatementKind::HalfIndent(header) => header.keyword(),
        _ => "statement",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Root {
        parse(source, "test.html", &Config::default()).expect("Should parse")
    }

    fn parse_err(source: &str) -> Error {
        parse(source, "test.html", &Config::default()).expect_err("Should fail")
    }

    #[test]
    fn test_plain_text_only() {
        let root = parse_ok("Hello, world!");
        assert_eq!(root.statements.len(), 1);
        assert!(matches!(
            &root.statements[0].kind,
            StatementKind::Plain(t) if t == "Hello, world!"
        ));
    }

    #[test]
    fn test_nesting_and_clause_siblings() {
        let root = parse_ok("<% if a %>A<% elif b %>B<% else %>C<% end %>!");
        let kinds: Vec<_> = root.statements.iter().map(|s| describe(&s.kind)).collect();
        assert_eq!(kinds, vec!["if", "elif", "else", "statement"]);
        assert_eq!(root.statements[0].children.len(), 1);
        assert_eq!(root.statements[2].children.len(), 1);
    }

    #[test]
    fn test_block_body_is_lifted() {
        let root = parse_ok("<% block title %>Title<% end %>after");
        assert_eq!(root.statements.len(), 2);
        assert!(root.statements[0].children.is_empty());
        let block = &root.blocks["title"];
        assert_eq!(block.line, 1);
        assert_eq!(block.body.len(), 1);
    }

    #[test]
    fn test_nested_blocks_are_both_registered() {
        let root = parse_ok("<% block outer %>a<% block inner %>b<% end %>c<% end %>");
        assert_eq!(root.blocks.len(), 2);
        assert_eq!(root.blocks["outer"].body.len(), 3);
    }

    #[test]
    fn test_redundant_unindent() {
        let err = parse_err("text<% end %>");
        assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::RedundantUnindent));
    }

    #[test]
    fn test_unterminated_block_cites_opening_line() {
        let err = parse_err("a\nb\n<% while true %>\nloop\n");
        assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::UnterminatedBlock));
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn test_unknown_statement_names_text_file_and_line() {
        let err = parse_err("<% if a %>\n<% fi %>");
        match err {
            Error::UnknownStatement {
                statement,
                file,
                line,
                ..
            } => {
                assert_eq!(statement, "fi");
                assert_eq!(file, "test.html");
                assert_eq!(line, 2);
            }
            other => panic!("Expected unknown statement, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_block_cites_both_lines() {
        let err = parse_err("<% block a %><% end %>\n\n<% block a %><% end %>");
        match err {
            Error::BlockNameConflict {
                name,
                line,
                first_line,
                ..
            } => {
                assert_eq!(name, "a");
                assert_eq!(first_line, 1);
                assert_eq!(line, 3);
            }
            other => panic!("Expected block conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_colon() {
        let err = parse_err("<% if a: %><% end %>");
        assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::TrailingColon));
    }

    #[test]
    fn test_misplaced_clauses() {
        for source in [
            "<% for x in xs %><% else %><% else %><% end %>",
            "<% if a %><% else %><% elif b %><% end %>",
            "<% while a %><% except %><% end %>",
            "<% block b %><% else %><% end %>",
            "<% try %><% end %>",
        ] {
            let err = parse_err(source);
            assert_eq!(
                err.syntax_kind(),
                Some(SyntaxErrorKind::MisplacedClause),
                "{}",
                source
            );
        }
    }

    #[test]
    fn test_try_chain() {
        let root =
            parse_ok("<% try %>a<% except KeyError as e %>b<% else %>c<% finally %>d<% end %>");
        assert_eq!(root.statements.len(), 4);
    }

    #[test]
    fn test_break_outside_loop() {
        let err = parse_err("<% if a %><% break %><% end %>");
        assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::OutsideLoop));

        let err = parse_err("<% for x in xs %><% block b %><% continue %><% end %><% end %>");
        assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::OutsideLoop));

        parse_ok("<% for x in xs %><% if x %><% break %><% end %><% end %>");
    }

    #[test]
    fn test_nonlocal_is_rejected() {
        let err = parse_err("<% nonlocal x %>");
        assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::NonlocalBinding));
    }

    #[test]
    fn test_bad_expression_is_syntax_error() {
        let err = parse_err("<%= a + %>");
        assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::InvalidExpression));
        assert!(err.is_syntax());
    }
}
