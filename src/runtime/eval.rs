//! Expression evaluation against a namespace's scopes

use std::collections::BTreeMap;

use futures_util::future::{BoxFuture, FutureExt};

use super::{Frame, Namespace};
use crate::error::{Error, EvalError};
use crate::expr::{ops, Expr};
use crate::value::Value;

/// Functions that need the namespace rather than just their arguments
#[derive(Debug, Clone, Copy)]
enum Intrinsic {
    Body,
    Block,
    ParentBlock,
}

impl Intrinsic {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "body" => Some(Intrinsic::Body),
            "block" => Some(Intrinsic::Block),
            "parent_block" => Some(Intrinsic::ParentBlock),
            _ => None,
        }
    }
}

impl Namespace {
    pub(super) fn eval<'a>(
        &'a mut self,
        frame: &'a Frame,
        expr: &'a Expr,
    ) -> BoxFuture<'a, Result<Value, Error>> {
        async move {
            let value = match expr {
                Expr::Literal(value) => value.clone(),
                Expr::Name(name) => self.lookup(frame, name)?,
                Expr::List(items) => Value::List(self.eval_all(frame, items).await?),
                Expr::Map(entries) => {
                    let mut map = BTreeMap::new();
                    for (key, value) in entries {
                        let key = match self.eval(frame, key).await? {
                            Value::Str(key) => key,
                            other => {
                                return Err(EvalError::type_error(format!(
                                    "map keys must be strings, not '{}'",
                                    other.type_name()
                                ))
                                .into())
                            }
                        };
                        let value = self.eval(frame, value).await?;
                        map.insert(key, value);
                    }
                    Value::Map(map)
                }
                Expr::Attr(target, name) => {
                    let target = self.eval(frame, target).await?;
                    ops::attribute(&target, name)?
                }
                Expr::Index(target, index) => {
                    let target = self.eval(frame, target).await?;
                    let index = self.eval(frame, index).await?;
                    ops::index(&target, &index)?
                }
                Expr::Call(callee, args) => self.call(frame, callee, args).await?,
                Expr::Neg(inner) => ops::negate(&self.eval(frame, inner).await?)?,
                Expr::Not(inner) => Value::Bool(!self.eval(frame, inner).await?.truthy()),
                Expr::Binary(op, lhs, rhs) => {
                    let lhs = self.eval(frame, lhs).await?;
                    let rhs = self.eval(frame, rhs).await?;
                    ops::binary(*op, &lhs, &rhs, self.template.config().max_sequence_len())?
                }
                Expr::And(lhs, rhs) => {
                    let lhs = self.eval(frame, lhs).await?;
                    if lhs.truthy() {
                        self.eval(frame, rhs).await?
                    } else {
                        lhs
                    }
                }
                Expr::Or(lhs, rhs) => {
                    let lhs = self.eval(frame, lhs).await?;
                    if lhs.truthy() {
                        lhs
                    } else {
                        self.eval(frame, rhs).await?
                    }
                }
                Expr::Cond {
                    cond,
                    then,
                    otherwise,
                } => {
                    if self.eval(frame, cond).await?.truthy() {
                        self.eval(frame, then).await?
                    } else {
                        self.eval(frame, otherwise).await?
                    }
                }
            };
            Ok(value)
        }
        .boxed()
    }

    async fn eval_all(&mut self, frame: &Frame, exprs: &[Expr]) -> Result<Vec<Value>, Error> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(self.eval(frame, expr).await?);
        }
        Ok(values)
    }

    /// Locals, then namespace globals, then built-ins
    fn lookup(&self, frame: &Frame, name: &str) -> Result<Value, EvalError> {
        if !frame.declared_global.contains(name) {
            if let Some(value) = frame.locals.get(name) {
                return Ok(value.clone());
            }
        }
        self.globals
            .get(name)
            .or_else(|| self.template.config().builtins().get(name))
            .cloned()
            .ok_or_else(|| EvalError::name_error(name))
    }

    async fn call(&mut self, frame: &Frame, callee: &Expr, args: &[Expr]) -> Result<Value, Error> {
        if let Expr::Name(name) = callee {
            let intrinsic = Intrinsic::from_name(name).filter(|_| self.lookup(frame, name).is_err());
            if let Some(intrinsic) = intrinsic {
                let args = self.eval_all(frame, args).await?;
                return self.intrinsic(frame, intrinsic, &args).await;
            }
        }

        let function = match self.eval(frame, callee).await? {
            Value::Function(function) => function,
            other => {
                return Err(EvalError::type_error(format!(
                    "'{}' object is not callable",
                    other.type_name()
                ))
                .into())
            }
        };
        let args = self.eval_all(frame, args).await?;
        Ok(function.call(&args)?)
    }

    async fn intrinsic(
        &mut self,
        frame: &Frame,
        intrinsic: Intrinsic,
        args: &[Value],
    ) -> Result<Value, Error> {
        match intrinsic {
            Intrinsic::Body => {
                if !args.is_empty() {
                    return Err(EvalError::type_error(format!(
                        "body() takes no arguments ({} given)",
                        args.len()
                    ))
                    .into());
                }
                Ok(Value::Str(self.body.clone().unwrap_or_default()))
            }
            Intrinsic::Block => {
                let name = block_name("block", args)?;
                Ok(Value::Str(self.render_block(name, 0).await?))
            }
            Intrinsic::ParentBlock => {
                let name = block_name("parent_block", args)?;
                // inside an override, step one definition further up its chain
                let depth = match &frame.block {
                    Some((current, depth)) if current == name => depth + 1,
                    _ => 1,
                };
                if self.blocks.get(name, depth).is_none() {
                    return Err(Error::render(format!(
                        "block `{}` has no parent definition in {}",
                        name,
                        self.path()
                    )));
                }
                Ok(Value::Str(self.render_block(name, depth).await?))
            }
        }
    }
}

fn block_name<'v>(function: &str, args: &'v [Value]) -> Result<&'v str, EvalError> {
    match args {
        [Value::Str(name)] => Ok(name),
        _ => Err(EvalError::type_error(format!(
            "{}() takes exactly one block name",
            function
        ))),
    }
}
