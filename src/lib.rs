//! Tessera - text templates with `<% %>` statements, inheritance and blocks
//!
//! Templates are plain text with embedded statements. `<%= expr %>` writes an
//! escaped value, `<% if %>`/`<% for %>`/`<% end %>` control flow, and
//! `<% inherit %>`, `<% block %>` and `<% include %>` compose files.
//!
//! # Example
//!
//! ```rust
//! use tessera::{vars, Config, Finder, MemoryLoader};
//!
//! let loader = MemoryLoader::new()
//!     .with("base.html", "<title><% block title %>Site<% end %></title><%r= body() %>")
//!     .with("page.html", "<% inherit \"base.html\" %><% block title %><%= name %><% end %>Hi");
//! let finder = Finder::new(loader, Config::default());
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! let out = rt.block_on(finder.render("page.html", vars([("name", "Home")]))).unwrap();
//! assert_eq!(out, "<title>Home</title>Hi");
//! ```

pub mod codegen;
pub mod config;
pub mod error;
pub mod escape;
pub mod expr;
pub mod loader;
pub mod parser;
pub mod runtime;
pub mod template;
pub mod value;

pub use config::{Config, Settings, SourceEncoding};
pub use error::{Error, EvalError, SyntaxErrorKind};
pub use loader::{FileSystemLoader, Finder, Loader, MemoryLoader};
pub use template::{render, Template};
pub use value::{vars, Function, Value, Vars};
