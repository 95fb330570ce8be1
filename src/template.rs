//! Compiled templates and the render entry points

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use serde::Serialize;
use tracing::debug;

use crate::codegen::{self, Unit};
use crate::config::Config;
use crate::error::{Error, EvalError};
use crate::loader::{Finder, FinderInner};
use crate::parser::{self, Root};
use crate::runtime::Namespace;
use crate::value::{Value, Vars};

/// Path given to templates built from a string
const STRING_PATH: &str = "<string>";

/// A parsed template, cheap to clone and reusable across renders
#[derive(Clone)]
pub struct Template {
    inner: Arc<TemplateInner>,
}

struct TemplateInner {
    path: String,
    source: String,
    root: Root,
    unit: OnceLock<Arc<Unit>>,
    config: Arc<Config>,
    finder: Option<Weak<FinderInner>>,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("path", &self.inner.path)
            .field("compiled", &self.inner.unit.get().is_some())
            .finish()
    }
}

impl Template {
    /// Parse a template with the default configuration
    pub fn new(source: impl Into<String>) -> Result<Self, Error> {
        Self::with_config(source, STRING_PATH, Arc::new(Config::default()))
    }

    /// Parse a template with an explicit path and configuration
    ///
    /// The path only labels errors; such a template cannot `include` or
    /// `inherit` because it has no finder.
    pub fn with_config(
        source: impl Into<String>,
        path: &str,
        config: Arc<Config>,
    ) -> Result<Self, Error> {
        Self::build(source.into(), path, config, None)
    }

    /// Decode template bytes with the configured source encoding, then parse
    pub fn from_bytes(bytes: &[u8], path: &str, config: Arc<Config>) -> Result<Self, Error> {
        let source = decode(bytes, path, &config)?;
        Self::build(source, path, config, None)
    }

    pub(crate) fn load(
        bytes: &[u8],
        path: &str,
        config: Arc<Config>,
        finder: Weak<FinderInner>,
    ) -> Result<Self, Error> {
        let source = decode(bytes, path, &config)?;
        Self::build(source, path, config, Some(finder))
    }

    fn build(
        source: String,
        path: &str,
        config: Arc<Config>,
        finder: Option<Weak<FinderInner>>,
    ) -> Result<Self, Error> {
        let root = parser::parse(&source, path, &config)?;
        Ok(Self {
            inner: Arc::new(TemplateInner {
                path: path.to_string(),
                source,
                root,
                unit: OnceLock::new(),
                config,
                finder,
            }),
        })
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.inner.config
    }

    /// Names of the blocks this template defines
    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.inner.root.blocks.keys().map(String::as_str)
    }

    /// Build the executable unit, once
    pub fn compile(&self) -> Result<Arc<Unit>, Error> {
        if let Some(unit) = self.inner.unit.get() {
            return Ok(Arc::clone(unit));
        }
        debug!(path = %self.inner.path, "compiling template");
        let unit = Arc::new(codegen::generate(&self.inner.root, &self.inner.path)?);
        // a concurrent compile may have won; either unit is equivalent
        Ok(Arc::clone(self.inner.unit.get_or_init(|| unit)))
    }

    pub(crate) fn finder(&self) -> Option<Finder> {
        self.inner
            .finder
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Finder::from_inner)
    }

    /// True if this template came from a finder that no longer exists
    pub(crate) fn finder_dropped(&self) -> bool {
        self.inner
            .finder
            .as_ref()
            .is_some_and(|finder| finder.strong_count() == 0)
    }

    /// Render with the given variables
    pub async fn render(&self, vars: Vars) -> Result<String, Error> {
        let mut namespace = Namespace::new(self.clone(), vars)?;
        namespace.render().await
    }

    /// Render with variables taken from any value that serializes to a map
    pub async fn render_serialize<T: Serialize + ?Sized>(&self, vars: &T) -> Result<String, Error> {
        match Value::from_serialize(vars)? {
            Value::Map(vars) => self.render(vars).await,
            other => Err(EvalError::type_error(format!(
                "render variables must serialize to a map, not '{}'",
                other.type_name()
            ))
            .into()),
        }
    }

    /// True if both handles point at the same compiled template
    pub fn ptr_eq(a: &Template, b: &Template) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

fn decode(bytes: &[u8], path: &str, config: &Config) -> Result<String, Error> {
    let encoding = config.source_encoding();
    encoding.decode(bytes).ok_or_else(|| Error::Decode {
        path: path.to_string(),
        encoding: encoding.name(),
    })
}

/// Parse and render a template string in one step
///
/// ```rust
/// use tessera::{render, vars};
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let out = rt.block_on(render("Hello, <%= name %>!", vars([("name", "<b>")])));
/// assert_eq!(out.unwrap(), "Hello, &lt;b&gt;!");
/// ```
pub async fn render(source: &str, vars: Vars) -> Result<String, Error> {
    Template::new(source)?.render(vars).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceEncoding;
    use crate::value::vars;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_template_is_reusable() {
        let template = Template::new("<%= n * 2 %>").unwrap();
        assert_eq!(template.render(vars([("n", 1)])).await.unwrap(), "2");
        assert_eq!(template.render(vars([("n", 5)])).await.unwrap(), "10");
    }

    #[tokio::test]
    async fn test_compile_is_cached() {
        let template = Template::new("x").unwrap();
        let a = template.compile().unwrap();
        let b = template.compile().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_render_serialize() {
        #[derive(Serialize)]
        struct Page {
            title: &'static str,
            tags: Vec<&'static str>,
        }
        let template = Template::new("<%= title %>: <%= join(tags, \", \") %>").unwrap();
        let page = Page {
            title: "Notes",
            tags: vec!["a", "b"],
        };
        assert_eq!(template.render_serialize(&page).await.unwrap(), "Notes: a, b");

        let err = template.render_serialize(&[1, 2]).await.unwrap_err();
        assert!(matches!(err, Error::Eval(ref e) if e.kind == "TypeError"));
    }

    #[test]
    fn test_latin1_source() {
        let config = Arc::new(Config::default().with_source_encoding(SourceEncoding::Latin1));
        let template = Template::from_bytes(b"caf\xe9", "latin.html", config).unwrap();
        assert_eq!(template.source(), "café");

        let err = Template::from_bytes(b"caf\xe9", "utf.html", Arc::new(Config::default()))
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_syntax_errors_surface_at_construction() {
        let err = Template::new("<% if x %>").unwrap_err();
        assert!(err.is_syntax());
    }
}
