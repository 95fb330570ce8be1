use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::Loader;
use crate::config::Config;
use crate::error::Error;
use crate::template::Template;
use crate::value::Vars;

/// Finds, compiles and caches templates from a loader
///
/// Cloning is cheap; clones share the cache. The lock is held while a path
/// is checked, loaded and parsed, so concurrent first loads of the same path
/// produce one template. It is released before rendering.
#[derive(Clone)]
pub struct Finder {
    inner: Arc<FinderInner>,
}

pub(crate) struct FinderInner {
    loader: Arc<dyn Loader>,
    config: Arc<Config>,
    cache: Mutex<HashMap<String, Template>>,
}

impl fmt::Debug for Finder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finder")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Finder {
    pub fn new(loader: impl Loader + 'static, config: impl Into<Arc<Config>>) -> Self {
        Self::from_shared(Arc::new(loader), config.into())
    }

    pub fn from_shared(loader: Arc<dyn Loader>, config: Arc<Config>) -> Self {
        Self {
            inner: Arc::new(FinderInner {
                loader,
                config,
                cache: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<FinderInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.inner.config
    }

    /// Find a template by root-relative path
    ///
    /// The template keeps only a weak handle to this finder. Keep the finder
    /// alive while rendering it, or its `include` and `inherit` statements
    /// fail with a render error.
    pub async fn find(&self, path: &str) -> Result<Template, Error> {
        self.find_from(path, None).await
    }

    /// Find a template by a path written inside the template at `origin`
    pub async fn find_from(&self, path: &str, origin: Option<&str>) -> Result<Template, Error> {
        let mut cache = self.inner.cache.lock().await;
        let resolved = self.inner.loader.resolve(path, origin)?;

        let caching = self.inner.config.cache_templates();
        if caching {
            if let Some(template) = cache.get(&resolved) {
                debug!(path = %resolved, "template cache hit");
                return Ok(template.clone());
            }
        }

        debug!(path = %resolved, "loading template");
        let bytes = self.inner.loader.load(&resolved).await?;
        let template = Template::load(
            &bytes,
            &resolved,
            Arc::clone(&self.inner.config),
            Arc::downgrade(&self.inner),
        )?;
        if caching {
            cache.insert(resolved, template.clone());
        }
        Ok(template)
    }

    /// Find and render a template
    pub async fn render(&self, path: &str, vars: Vars) -> Result<String, Error> {
        self.find(path).await?.render(vars).await
    }

    /// Number of cached templates
    pub async fn cached(&self) -> usize {
        self.inner.cache.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;

    fn finder(cache: bool) -> Finder {
        let loader = MemoryLoader::new().with("a.html", "A");
        Finder::new(loader, Config::default().with_cache(cache))
    }

    #[tokio::test]
    async fn test_cache_returns_same_template() {
        let finder = finder(true);
        let first = finder.find("a.html").await.unwrap();
        let second = finder.find("/./a.html").await.unwrap();
        assert!(Template::ptr_eq(&first, &second));
        assert_eq!(finder.cached().await, 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_loads_fresh() {
        let finder = finder(false);
        let first = finder.find("a.html").await.unwrap();
        let second = finder.find("a.html").await.unwrap();
        assert!(!Template::ptr_eq(&first, &second));
        assert_eq!(finder.cached().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_first_loads_share_one_template() {
        let finder = finder(true);
        let (a, b) = tokio::join!(finder.find("a.html"), finder.find("a.html"));
        assert!(Template::ptr_eq(&a.unwrap(), &b.unwrap()));
    }
}
