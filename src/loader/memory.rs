use std::collections::BTreeMap;

use futures_util::future::{BoxFuture, FutureExt};

use super::{resolve_path, Loader};
use crate::error::Error;

/// Templates held in memory, keyed by root-relative path
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    sources: BTreeMap<String, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template, builder style
    pub fn with(mut self, path: &str, source: impl Into<Vec<u8>>) -> Self {
        self.insert(path, source);
        self
    }

    /// Add or replace a template
    ///
    /// The path is normalized the way templates refer to it, so `/a.html`
    /// and `a.html` name the same entry.
    pub fn insert(&mut self, path: &str, source: impl Into<Vec<u8>>) {
        let key = resolve_path(path, None).unwrap_or_else(|_| path.to_string());
        self.sources.insert(key, source.into());
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Loader for MemoryLoader {
    fn load<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, Error>> {
        let found = self.sources.get(path).cloned().ok_or_else(|| {
            Error::not_found(path, format!("template {:?} does not exist", path))
        });
        async move { found }.boxed()
    }
}
