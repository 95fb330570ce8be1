//! Render-time execution of compiled templates
//!
//! One [`Namespace`] drives one template through
//! `Fresh -> Drawing -> (Inheriting) -> Finished`. The body is drawn first;
//! if it declared a parent with `inherit`, its output becomes the parent's
//! `body()`, its block overrides are merged into the parent's storage and the
//! parent's finished output replaces its own.

mod blocks;
mod eval;

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{debug, trace};

use crate::codegen::{Handler, Op, Unit};
use crate::error::{Error, EvalError};
use crate::expr::ops;
use crate::expr::Expr;
use crate::loader::Finder;
use crate::template::Template;
use crate::value::{Value, Vars};

pub use blocks::BlockStorage;

/// Nesting limit for includes and parents
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Fresh,
    Drawing,
    Inheriting,
    Finished,
}

/// How a sequence of ops ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

/// Scope of one body or block run
#[derive(Debug, Default)]
struct Frame {
    locals: Vars,
    declared_global: HashSet<String>,
    buffer: String,
    /// Block name and chain depth when running a block
    block: Option<(String, usize)>,
    /// The error an `except` clause is handling, for bare `raise`
    handling: Option<EvalError>,
}

impl Frame {
    fn for_block(name: &str, depth: usize) -> Self {
        Self {
            block: Some((name.to_string(), depth)),
            ..Self::default()
        }
    }

    fn in_block(&self) -> bool {
        self.block.is_some()
    }
}

/// A single-use render of one template
pub struct Namespace {
    template: Template,
    unit: Arc<Unit>,
    globals: Vars,
    body: Option<String>,
    parent: Option<Box<Namespace>>,
    blocks: BlockStorage,
    state: State,
    output: String,
    depth: usize,
}

impl Namespace {
    /// Create a namespace for `template`, compiling it if needed
    pub fn new(template: Template, globals: Vars) -> Result<Self, Error> {
        let unit = template.compile()?;
        let blocks = BlockStorage::from_unit(&unit);
        Ok(Self {
            template,
            unit,
            globals,
            body: None,
            parent: None,
            blocks,
            state: State::Fresh,
            output: String::new(),
            depth: 0,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn blocks(&self) -> &BlockStorage {
        &self.blocks
    }

    /// Draw the body, resolve inheritance and return the finished output
    pub fn render(&mut self) -> BoxFuture<'_, Result<String, Error>> {
        async move {
            self.transition(State::Fresh, State::Drawing)?;
            let unit = Arc::clone(&self.unit);
            let mut frame = Frame::default();
            self.exec(&mut frame, &unit.body).await?;
            self.output = frame.buffer;

            match self.parent.take() {
                Some(mut parent) => {
                    self.transition(State::Drawing, State::Inheriting)?;
                    parent.body = Some(std::mem::take(&mut self.output));
                    parent.globals = self.globals.clone();
                    parent.blocks.merge_overrides(&self.blocks);
                    self.output = parent.render().await?;
                    self.transition(State::Inheriting, State::Finished)?;
                }
                None => self.transition(State::Drawing, State::Finished)?,
            }
            Ok(self.output.clone())
        }
        .boxed()
    }

    fn transition(&mut self, from: State, to: State) -> Result<(), Error> {
        if self.state != from {
            let message = match self.state {
                State::Finished => format!("{} has already finished rendering", self.path()),
                _ => format!("{} is already rendering", self.path()),
            };
            return Err(Error::render(message));
        }
        trace!(template = %self.path(), ?from, ?to, "namespace state");
        self.state = to;
        Ok(())
    }

    fn path(&self) -> &str {
        self.template.path()
    }

    fn write(&self, frame: &mut Frame, text: &str) -> Result<(), Error> {
        if self.state != State::Drawing {
            return Err(Error::render(format!(
                "cannot write to {} while {:?}",
                self.path(),
                self.state
            )));
        }
        frame.buffer.push_str(text);
        Ok(())
    }

    fn exec<'a>(
        &'a mut self,
        frame: &'a mut Frame,
        ops: &'a [Op],
    ) -> BoxFuture<'a, Result<Flow, Error>> {
        async move {
            for op in ops {
                let flow = self.step(frame, op).await?;
                if flow != Flow::Normal {
                    return Ok(flow);
                }
            }
            Ok(Flow::Normal)
        }
        .boxed()
    }

    async fn step(&mut self, frame: &mut Frame, op: &Op) -> Result<Flow, Error> {
        match op {
            Op::Text(text) => self.write(frame, text)?,
            Op::Output { expr, filter } => {
                let value = self.eval(frame, expr).await?;
                self.write(frame, &filter.apply(&value))?;
            }
            Op::Block(name) => {
                // a parent declaring this slot draws it with the merged override
                let deferred = self
                    .parent
                    .as_ref()
                    .is_some_and(|parent| parent.blocks.declares(name));
                if !deferred {
                    let text = self.render_block(name, 0).await?;
                    self.write(frame, &text)?;
                }
            }
            Op::Include(path) => {
                let path = self.eval_path(frame, path).await?;
                let text = self.include(&path).await?;
                self.write(frame, &text)?;
            }
            Op::Inherit(path) => {
                let path = self.eval_path(frame, path).await?;
                self.add_parent(frame, &path).await?;
            }
            Op::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if self.eval(frame, cond).await?.truthy() {
                        return self.exec(frame, body).await;
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec(frame, body).await;
                }
            }
            Op::For {
                targets,
                iter,
                body,
                otherwise,
            } => {
                let items = ops::iterate(&self.eval(frame, iter).await?)?;
                for item in items {
                    self.bind_targets(frame, targets, item)?;
                    if self.exec(frame, body).await? == Flow::Break {
                        return Ok(Flow::Normal);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec(frame, body).await;
                }
            }
            Op::While {
                cond,
                body,
                otherwise,
            } => {
                while self.eval(frame, cond).await?.truthy() {
                    if self.exec(frame, body).await? == Flow::Break {
                        return Ok(Flow::Normal);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec(frame, body).await;
                }
            }
            Op::With { expr, alias, body } => {
                let value = self.eval(frame, expr).await?;
                if let Some(alias) = alias {
                    self.bind(frame, alias, value);
                }
                return self.exec(frame, body).await;
            }
            Op::Try {
                body,
                handlers,
                otherwise,
                finally,
            } => {
                let result = match self.exec(frame, body).await {
                    Err(Error::Eval(err)) => self.handle(frame, handlers, err).await,
                    Ok(Flow::Normal) => match otherwise {
                        Some(body) => self.exec(frame, body).await,
                        None => Ok(Flow::Normal),
                    },
                    other => other,
                };
                if let Some(body) = finally {
                    let flow = self.exec(frame, body).await?;
                    if flow != Flow::Normal {
                        return Ok(flow);
                    }
                }
                return result;
            }
            Op::Assign { targets, expr } => {
                let value = self.eval(frame, expr).await?;
                self.bind_targets(frame, targets, value)?;
            }
            Op::Import { module, alias } => {
                let members = self.module(module)?;
                self.bind(frame, alias.as_deref().unwrap_or(module), Value::Map(members));
            }
            Op::FromImport { module, names } => {
                let members = self.module(module)?;
                for (name, alias) in names {
                    let value = members.get(name).cloned().ok_or_else(|| {
                        EvalError::new(
                            "ImportError",
                            format!("cannot import name '{}' from '{}'", name, module),
                        )
                    })?;
                    self.bind(frame, alias.as_deref().unwrap_or(name), value);
                }
            }
            Op::Raise(None) => {
                let err = frame.handling.clone().unwrap_or_else(|| {
                    EvalError::new("RuntimeError", "No active exception to reraise")
                });
                return Err(err.into());
            }
            Op::Raise(Some((kind, message))) => {
                let message = match message {
                    Some(expr) => self.eval(frame, expr).await?.to_string(),
                    None => String::new(),
                };
                return Err(EvalError::new(kind.as_str(), message).into());
            }
            Op::Global(names) => frame.declared_global.extend(names.iter().cloned()),
            Op::Assert { test, message } => {
                if !self.eval(frame, test).await?.truthy() {
                    let message = match message {
                        Some(expr) => self.eval(frame, expr).await?.to_string(),
                        None => String::new(),
                    };
                    return Err(EvalError::new("AssertionError", message).into());
                }
            }
            Op::Break => return Ok(Flow::Break),
            Op::Continue => return Ok(Flow::Continue),
            Op::Comment(_) => {}
        }
        Ok(Flow::Normal)
    }

    /// Run the first handler matching `err`, or give the error back
    async fn handle(
        &mut self,
        frame: &mut Frame,
        handlers: &[Handler],
        err: EvalError,
    ) -> Result<Flow, Error> {
        let Some(handler) = handlers
            .iter()
            .find(|handler| handler.kind.as_deref().map_or(true, |kind| kind == err.kind))
        else {
            return Err(err.into());
        };
        trace!(kind = %err.kind, "handling template error");
        if let Some(alias) = &handler.alias {
            self.bind(frame, alias, Value::Str(err.message.clone()));
        }
        let previous = frame.handling.replace(err);
        let result = self.exec(frame, &handler.body).await;
        frame.handling = previous;
        result
    }

    fn bind(&mut self, frame: &mut Frame, name: &str, value: Value) {
        if frame.declared_global.contains(name) {
            self.globals.insert(name.to_string(), value);
        } else {
            frame.locals.insert(name.to_string(), value);
        }
    }

    fn bind_targets(
        &mut self,
        frame: &mut Frame,
        targets: &[String],
        value: Value,
    ) -> Result<(), Error> {
        if let [single] = targets {
            self.bind(frame, single, value);
            return Ok(());
        }
        let items = ops::iterate(&value)?;
        if items.len() != targets.len() {
            let message = if items.len() < targets.len() {
                format!(
                    "not enough values to unpack (expected {}, got {})",
                    targets.len(),
                    items.len()
                )
            } else {
                format!("too many values to unpack (expected {})", targets.len())
            };
            return Err(EvalError::value_error(message).into());
        }
        for (target, item) in targets.iter().zip(items) {
            self.bind(frame, target, item);
        }
        Ok(())
    }

    fn module(&self, name: &str) -> Result<Vars, EvalError> {
        self.template.config().module(name).cloned().ok_or_else(|| {
            EvalError::new("ModuleNotFoundError", format!("No module named '{}'", name))
        })
    }

    async fn eval_path(&mut self, frame: &Frame, expr: &Expr) -> Result<String, Error> {
        match self.eval(frame, expr).await? {
            Value::Str(path) => Ok(path),
            other => Err(EvalError::type_error(format!(
                "template path must be a string, not '{}'",
                other.type_name()
            ))
            .into()),
        }
    }

    fn finder(&self, path: &str) -> Result<Finder, Error> {
        self.template.finder().ok_or_else(|| {
            let reason = if self.template.finder_dropped() {
                "its finder was dropped before rendering"
            } else {
                "the template has no finder"
            };
            Error::render(format!(
                "cannot load \"{}\" from {}: {}",
                path,
                self.path(),
                reason
            ))
        })
    }

    /// Load a template relative to this one and wrap it in a child namespace
    async fn spawn(&self, path: &str, globals: Vars) -> Result<Namespace, Error> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::render(format!(
                "loading \"{}\" from {} exceeds the nesting limit of {}",
                path,
                self.path(),
                MAX_DEPTH
            )));
        }
        let finder = self.finder(path)?;
        let template = finder.find_from(path, Some(self.path())).await?;
        let mut namespace = Namespace::new(template, globals)?;
        namespace.depth = self.depth + 1;
        Ok(namespace)
    }

    async fn include(&mut self, path: &str) -> Result<String, Error> {
        let mut included = self.spawn(path, self.globals.clone()).await?;
        debug!(template = %self.path(), include = %included.path(), "include");
        included.render().await
    }

    async fn add_parent(&mut self, frame: &Frame, path: &str) -> Result<(), Error> {
        if frame.in_block() {
            return Err(Error::render(format!(
                "cannot inherit inside a block ({})",
                self.path()
            )));
        }
        if self.parent.is_some() {
            return Err(Error::render(format!(
                "{} already inherits a parent",
                self.path()
            )));
        }
        let parent = self.spawn(path, Vars::new()).await?;
        debug!(template = %self.path(), parent = %parent.path(), "inherit");
        self.parent = Some(Box::new(parent));
        Ok(())
    }

    async fn render_block(&mut self, name: &str, depth: usize) -> Result<String, Error> {
        let unit = self.blocks.get(name, depth).cloned().ok_or_else(|| {
            Error::render(format!("block `{}` is not defined in {}", name, self.path()))
        })?;
        trace!(block = name, origin = %unit.origin, depth, "render block");
        let mut frame = Frame::for_block(name, depth);
        self.exec(&mut frame, &unit.body).await?;
        Ok(frame.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::vars;

    fn namespace(source: &str, globals: Vars) -> Namespace {
        let template = Template::new(source).expect("Should compile");
        Namespace::new(template, globals).expect("Should create namespace")
    }

    async fn render(source: &str, globals: Vars) -> Result<String, Error> {
        namespace(source, globals).render().await
    }

    #[tokio::test]
    async fn test_states_progress_to_finished() {
        let mut ns = namespace("Hello", Vars::new());
        assert_eq!(ns.state(), State::Fresh);
        assert_eq!(ns.render().await.unwrap(), "Hello");
        assert_eq!(ns.state(), State::Finished);
    }

    #[tokio::test]
    async fn test_second_render_is_rejected() {
        let mut ns = namespace("Hello", Vars::new());
        ns.render().await.unwrap();
        let err = ns.render().await.unwrap_err();
        assert!(matches!(err, Error::Render(ref m) if m.contains("already finished")), "{}", err);
    }

    #[tokio::test]
    async fn test_inherit_without_finder_is_render_error() {
        let err = render("<% inherit \"base.html\" %>", Vars::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Render(ref m) if m.contains("no finder")), "{}", err);
    }

    #[tokio::test]
    async fn test_inherit_inside_block_is_render_error() {
        let err = render("<% block a %><% inherit \"x.html\" %><% end %>", Vars::new())
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::Render(ref m) if m.contains("inside a block")),
            "{}",
            err
        );
    }

    #[tokio::test]
    async fn test_for_break_skips_else() {
        let out = render(
            "<% for x in xs %><% if x == 3 %><% break %><% end %><%= x %><% else %>!<% end %>",
            vars([("xs", Value::from(vec![1, 2, 3, 4]))]),
        )
        .await
        .unwrap();
        assert_eq!(out, "12");
    }

    #[tokio::test]
    async fn test_for_else_runs_when_exhausted() {
        let out = render(
            "<% for x in xs %><% continue %><%= x %><% else %>done<% end %>",
            vars([("xs", Value::from(vec![1, 2]))]),
        )
        .await
        .unwrap();
        assert_eq!(out, "done");
    }

    #[tokio::test]
    async fn test_unpacking_targets() {
        let out = render(
            "<% for k, v in m.items() %><%= k %>=<%= v %>;<% end %>",
            vars([("m", Value::Map(vars([("a", 1), ("b", 2)])))]),
        )
        .await
        .unwrap();
        assert_eq!(out, "a=1;b=2;");

        let err = render("<% let a, b = [1] %>", Vars::new()).await.unwrap_err();
        assert!(err.to_string().contains("not enough values"), "{}", err);
    }

    #[tokio::test]
    async fn test_try_catches_matching_kind() {
        let out = render(
            "<% try %><% raise KeyError(\"k\") %><% except ValueError %>v<% except KeyError as e %>caught <%= e %><% finally %>.<% end %>",
            Vars::new(),
        )
        .await
        .unwrap();
        assert_eq!(out, "caught k.");
    }

    #[tokio::test]
    async fn test_unmatched_error_runs_finally_then_propagates() {
        let mut ns = namespace(
            "<% global log %><% try %><% let x = missing %><% except KeyError %>no<% finally %><% let log = \"ran\" %><% end %>",
            Vars::new(),
        );
        let err = ns.render().await.unwrap_err();
        assert!(matches!(err, Error::Eval(ref e) if e.kind == "NameError"), "{}", err);
        assert_eq!(ns.globals.get("log"), Some(&Value::from("ran")));
    }

    #[tokio::test]
    async fn test_bare_raise_reraises_handled_error() {
        let err = render(
            "<% try %><% raise ValueError(\"bad\") %><% except %><% raise %><% end %>",
            Vars::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "ValueError: bad");

        let err = render("<% raise %>", Vars::new()).await.unwrap_err();
        assert!(matches!(err, Error::Eval(ref e) if e.kind == "RuntimeError"));
    }

    #[tokio::test]
    async fn test_assert_raises_assertion_error() {
        let err = render("<% assert 1 > 2, \"math\" %>", Vars::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "AssertionError: math");
    }

    #[tokio::test]
    async fn test_global_declaration_writes_namespace_globals() {
        let mut ns = namespace(
            "<% global count %><% let count = count + 1 %><%= count %>",
            vars([("count", 1)]),
        );
        assert_eq!(ns.render().await.unwrap(), "2");
        assert_eq!(ns.globals.get("count"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn test_block_locals_are_separate_from_body() {
        let err = render("<% let x = 1 %><% block a %><%= x %><% end %>", Vars::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Eval(ref e) if e.kind == "NameError"), "{}", err);
    }

    #[tokio::test]
    async fn test_block_intrinsic_renders_again() {
        let out = render(
            "<% block a %>A<% end %>|<%r= block(\"a\") %>|<%r= body() %>",
            Vars::new(),
        )
        .await
        .unwrap();
        assert_eq!(out, "A|A|");
    }

    #[tokio::test]
    async fn test_intrinsic_name_can_be_shadowed() {
        let out = render("<% let body = upper %><%= body(\"x\") %>", Vars::new())
            .await
            .unwrap();
        assert_eq!(out, "X");
    }

    #[tokio::test]
    async fn test_import_binds_config_module() {
        let config = crate::config::Config::default()
            .with_module("site", vars([("name", "Tessera")]));
        let source = "<% import site %><% from site import name as n %><%= site.name %>/<%= n %>";
        let template = Template::with_config(source, "t.html", Arc::new(config)).unwrap();
        let out = Namespace::new(template, Vars::new())
            .unwrap()
            .render()
            .await
            .unwrap();
        assert_eq!(out, "Tessera/Tessera");

        let err = render("<% import nope %>", Vars::new()).await.unwrap_err();
        assert!(matches!(err, Error::Eval(ref e) if e.kind == "ModuleNotFoundError"));
    }
}
