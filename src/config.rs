//! Engine configuration
//!
//! A [`Config`] is built once, wrapped in an `Arc`, and shared by every
//! template it compiles. It can be assembled in code with the `with_*`
//! methods or loaded from a TOML file:
//!
//! ```toml
//! [engine]
//! cache = true
//! default_escape = "html"
//! source_encoding = "utf-8"
//! root = "templates"
//! max_sequence_len = 16777216
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::Error;
use crate::escape::{builtin_filters, Filter};
use crate::expr::builtins::builtins;
use crate::expr::ops::DEFAULT_MAX_SEQUENCE_LEN;
use crate::parser::Grammar;
use crate::value::{Value, Vars};

/// Encoding used to decode template bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum SourceEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl SourceEncoding {
    pub fn name(self) -> &'static str {
        match self {
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::Latin1 => "latin-1",
        }
    }

    /// Decode template bytes; `None` if they are invalid in this encoding
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            SourceEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            SourceEncoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// Immutable settings shared by all templates of one engine
#[derive(Clone)]
pub struct Config {
    source_encoding: SourceEncoding,
    default_escape: String,
    filters: BTreeMap<String, Filter>,
    grammars: Vec<Grammar>,
    cache_templates: bool,
    modules: BTreeMap<String, Vars>,
    max_sequence_len: usize,
    builtins: Vars,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_encoding: SourceEncoding::Utf8,
            default_escape: "html".to_string(),
            filters: builtin_filters(),
            grammars: Grammar::DEFAULT_ORDER.to_vec(),
            cache_templates: true,
            modules: BTreeMap::new(),
            max_sequence_len: DEFAULT_MAX_SEQUENCE_LEN,
            builtins: builtins(DEFAULT_MAX_SEQUENCE_LEN),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("source_encoding", &self.source_encoding)
            .field("default_escape", &self.default_escape)
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("grammars", &self.grammars)
            .field("cache_templates", &self.cache_templates)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("max_sequence_len", &self.max_sequence_len)
            .finish()
    }
}

impl Config {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the encoding used to decode loaded template bytes
    pub fn with_source_encoding(mut self, encoding: SourceEncoding) -> Self {
        self.source_encoding = encoding;
        self
    }

    /// Set the filter `<%= ... %>` uses
    pub fn with_default_escape(mut self, name: impl Into<String>) -> Self {
        self.default_escape = name.into();
        self
    }

    /// Register a filter, replacing any built-in of the same name
    pub fn with_filter<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
        self
    }

    /// Replace the ordered list of statement grammars
    pub fn with_grammars(mut self, grammars: Vec<Grammar>) -> Self {
        self.grammars = grammars;
        self
    }

    /// Enable or disable the finder's compiled template cache
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache_templates = cache;
        self
    }

    /// Register a module importable with `import` and `from ... import`
    pub fn with_module(mut self, name: impl Into<String>, members: Vars) -> Self {
        self.modules.insert(name.into(), members);
        self
    }

    /// Bound the length of strings and lists built by `+`, `*` and `range`
    pub fn with_max_sequence_len(mut self, max_len: usize) -> Self {
        self.max_sequence_len = max_len;
        self.builtins = builtins(max_len);
        self
    }

    pub fn source_encoding(&self) -> SourceEncoding {
        self.source_encoding
    }

    pub fn default_escape(&self) -> &str {
        &self.default_escape
    }

    pub fn grammars(&self) -> &[Grammar] {
        &self.grammars
    }

    pub fn cache_templates(&self) -> bool {
        self.cache_templates
    }

    pub fn module(&self, name: &str) -> Option<&Vars> {
        self.modules.get(name)
    }

    pub fn max_sequence_len(&self) -> usize {
        self.max_sequence_len
    }

    /// Built-in functions, bounded by this configuration's sequence limit
    pub fn builtins(&self) -> &Vars {
        &self.builtins
    }

    /// Look up a filter by name
    ///
    /// `default` falls back to the configured default escape unless a filter
    /// was registered under that exact name.
    pub fn filter(&self, name: &str) -> Option<&Filter> {
        match self.filters.get(name) {
            Some(filter) => Some(filter),
            None if name == "default" => self.filters.get(&self.default_escape),
            None => None,
        }
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), Error> {
        if self.filter("default").is_none() {
            return Err(Error::Config(format!(
                "default escape `{}` is not a registered filter",
                self.default_escape
            )));
        }
        if self.grammars.is_empty() {
            return Err(Error::Config("no statement grammars configured".to_string()));
        }
        Ok(())
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        Settings::from_toml_str(content).and_then(Settings::into_config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        Settings::from_file(path).and_then(Settings::into_config)
    }
}

/// TOML structure for engine settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    pub cache: bool,
    pub default_escape: String,
    pub source_encoding: SourceEncoding,
    /// Template root directory for the file-system loader
    pub root: Option<PathBuf>,
    pub max_sequence_len: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache: true,
            default_escape: "html".to_string(),
            source_encoding: SourceEncoding::Utf8,
            root: None,
            max_sequence_len: DEFAULT_MAX_SEQUENCE_LEN,
        }
    }
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn into_config(self) -> Result<Config, Error> {
        let config = Config::new()
            .with_cache(self.engine.cache)
            .with_default_escape(self.engine.default_escape)
            .with_source_encoding(self.engine.source_encoding)
            .with_max_sequence_len(self.engine.max_sequence_len);
        config.validate()?;
        Ok(config)
    }
}
