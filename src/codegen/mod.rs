//! Code generation: statement tree to executable op tree
//!
//! A [`Unit`] is produced once per template and shared between renders. Its
//! ops are interpreted by the runtime; clause siblings (`elif`, `else`,
//! `except`, `finally`) are folded into the op of the statement they
//! continue, and every block body becomes its own [`BlockUnit`].

use std::collections::BTreeMap;
use std::iter::Peekable;
use std::sync::Arc;

use crate::error::Error;
use crate::escape::BoundFilter;
use crate::expr::Expr;
use crate::parser::{Header, InlineStmt, Root, Statement, StatementKind};

/// The compiled form of one template
#[derive(Debug, Default)]
pub struct Unit {
    pub body: Vec<Op>,
    pub blocks: BTreeMap<String, Arc<BlockUnit>>,
}

/// A compiled block body, tagged with the template that defined it
#[derive(Debug)]
pub struct BlockUnit {
    pub name: String,
    pub origin: String,
    pub body: Vec<Op>,
}

#[derive(Debug, Clone)]
pub struct Handler {
    /// `None` catches every error
    pub kind: Option<String>,
    pub alias: Option<String>,
    pub body: Vec<Op>,
}

#[derive(Debug, Clone)]
pub enum Op {
    Text(String),
    Output {
        expr: Expr,
        filter: BoundFilter,
    },
    /// Draw the named block where it is defined
    Block(String),
    Include(Expr),
    Inherit(Expr),
    If {
        branches: Vec<(Expr, Vec<Op>)>,
        otherwise: Option<Vec<Op>>,
    },
    For {
        targets: Vec<String>,
        iter: Expr,
        body: Vec<Op>,
        otherwise: Option<Vec<Op>>,
    },
    While {
        cond: Expr,
        body: Vec<Op>,
        otherwise: Option<Vec<Op>>,
    },
    With {
        expr: Expr,
        alias: Option<String>,
        body: Vec<Op>,
    },
    Try {
        body: Vec<Op>,
        handlers: Vec<Handler>,
        otherwise: Option<Vec<Op>>,
        finally: Option<Vec<Op>>,
    },
    Assign {
        targets: Vec<String>,
        expr: Expr,
    },
    Import {
        module: String,
        alias: Option<String>,
    },
    FromImport {
        module: String,
        names: Vec<(String, Option<String>)>,
    },
    /// `None` re-raises the error being handled
    Raise(Option<(String, Option<Expr>)>),
    Global(Vec<String>),
    Assert {
        test: Expr,
        message: Option<Expr>,
    },
    Break,
    Continue,
    Comment(String),
}

/// Generate the unit for a parsed template
pub fn generate(root: &Root, origin: &str) -> Result<Unit, Error> {
    let body = sequence(&root.statements)?;
    let blocks: BTreeMap<String, Arc<BlockUnit>> = root
        .blocks
        .values()
        .map(|block| {
            let unit = BlockUnit {
                name: block.name.clone(),
                origin: origin.to_string(),
                body: sequence(&block.body)?,
            };
            Ok((block.name.clone(), Arc::new(unit)))
        })
        .collect::<Result<_, Error>>()?;
    Ok(Unit { body, blocks })
}

fn sequence(statements: &[Statement]) -> Result<Vec<Op>, Error> {
    let mut ops = Vec::with_capacity(statements.len());
    let mut iter = statements.iter().peekable();
    while let Some(statement) = iter.next() {
        statement_ops(statement, &mut iter, &mut ops)?;
    }
    Ok(ops)
}

type Siblings<'s> = Peekable<std::slice::Iter<'s, Statement>>;

fn statement_ops(
    statement: &Statement,
    siblings: &mut Siblings<'_>,
    ops: &mut Vec<Op>,
) -> Result<(), Error> {
    let op = match &statement.kind {
        StatementKind::Plain(text) => Op::Text(text.clone()),
        StatementKind::Output { filter, expr } => Op::Output {
            expr: expr.clone(),
            filter: filter.clone(),
        },
        StatementKind::Block { name } => Op::Block(name.clone()),
        StatementKind::Include { path } => Op::Include(path.clone()),
        StatementKind::Inherit { path } => Op::Inherit(path.clone()),
        StatementKind::Indent(header) => scope_op(header, statement, siblings)?,
        StatementKind::Comment(text) => {
            ops.extend(text.lines().map(|line| Op::Comment(line.to_string())));
            return Ok(());
        }
        StatementKind::Assign { targets, expr } => Op::Assign {
            targets: targets.clone(),
            expr: expr.clone(),
        },
        StatementKind::Inline(inline) => inline_op(inline, statement)?,
        StatementKind::HalfIndent(header) => {
            return Err(internal(
                statement,
                &format!("`{}` without an opening statement", header.keyword()),
            ))
        }
        StatementKind::Unindent => return Err(internal(statement, "stray `end` in tree")),
    };
    ops.push(op);
    Ok(())
}

fn scope_op(
    header: &Header,
    statement: &Statement,
    siblings: &mut Siblings<'_>,
) -> Result<Op, Error> {
    let body = sequence(&statement.children)?;
    let op = match header {
        Header::If(cond) => {
            let mut branches = vec![(cond.clone(), body)];
            while let Some(clause) = next_clause(siblings, |h| matches!(h, Header::Elif(_))) {
                if let StatementKind::HalfIndent(Header::Elif(cond)) = &clause.kind {
                    branches.push((cond.clone(), sequence(&clause.children)?));
                }
            }
            Op::If {
                branches,
                otherwise: else_clause(siblings)?,
            }
        }
        Header::For { head, .. } => Op::For {
            targets: head.targets.clone(),
            iter: head.iter.clone(),
            body,
            otherwise: else_clause(siblings)?,
        },
        Header::While(cond) => Op::While {
            cond: cond.clone(),
            body,
            otherwise: else_clause(siblings)?,
        },
        Header::With { head, .. } => Op::With {
            expr: head.expr.clone(),
            alias: head.alias.clone(),
            body,
        },
        Header::Try => {
            let mut handlers = Vec::new();
            while let Some(clause) = next_clause(siblings, |h| matches!(h, Header::Except(_))) {
                if let StatementKind::HalfIndent(Header::Except(head)) = &clause.kind {
                    handlers.push(Handler {
                        kind: head.kind.clone().filter(|kind| kind != "Exception"),
                        alias: head.alias.clone(),
                        body: sequence(&clause.children)?,
                    });
                }
            }
            let otherwise = else_clause(siblings)?;
            let finally = match next_clause(siblings, |h| matches!(h, Header::Finally)) {
                Some(clause) => Some(sequence(&clause.children)?),
                None => None,
            };
            if handlers.is_empty() && finally.is_none() {
                return Err(internal(statement, "`try` without handlers"));
            }
            Op::Try {
                body,
                handlers,
                otherwise,
                finally,
            }
        }
        Header::Elif(_) | Header::Else | Header::Except(_) | Header::Finally => {
            return Err(internal(
                statement,
                &format!("`{}` opened a scope", header.keyword()),
            ))
        }
    };
    Ok(op)
}

/// Take the next sibling if it is a clause accepted by `accept`
fn next_clause<'s>(
    siblings: &mut Siblings<'s>,
    accept: impl Fn(&Header) -> bool,
) -> Option<&'s Statement> {
    siblings.next_if(|next| matches!(&next.kind, StatementKind::HalfIndent(h) if accept(h)))
}

fn else_clause(siblings: &mut Siblings<'_>) -> Result<Option<Vec<Op>>, Error> {
    match next_clause(siblings, |h| matches!(h, Header::Else)) {
        Some(clause) => sequence(&clause.children).map(Some),
        None => Ok(None),
    }
}

fn inline_op(inline: &InlineStmt, statement: &Statement) -> Result<Op, Error> {
    let op = match inline {
        InlineStmt::Break => Op::Break,
        InlineStmt::Continue => Op::Continue,
        InlineStmt::Import(head) => Op::Import {
            module: head.module.clone(),
            alias: head.alias.clone(),
        },
        InlineStmt::FromImport(head) => Op::FromImport {
            module: head.module.clone(),
            names: head.names.clone(),
        },
        InlineStmt::Raise(head) => Op::Raise(
            head.as_ref()
                .map(|head| (head.kind.clone(), head.message.clone())),
        ),
        InlineStmt::Global(names) => Op::Global(names.clone()),
        InlineStmt::Assert(head) => Op::Assert {
            test: head.test.clone(),
            message: head.message.clone(),
        },
        InlineStmt::Nonlocal(_) => return Err(internal(statement, "`nonlocal` reached codegen")),
    };
    Ok(op)
}

fn internal(statement: &Statement, message: &str) -> Error {
    Error::Internal(format!("{} (line {:?})", message, statement.line))
}
