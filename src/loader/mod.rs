//! Template sources and the caching finder
//!
//! A [`Loader`] turns a path into bytes; the [`Finder`] resolves paths
//! against the including template, loads, parses and caches templates.

mod finder;
mod fs;
mod memory;

use futures_util::future::BoxFuture;

use crate::error::Error;

pub use finder::Finder;
pub(crate) use finder::FinderInner;
pub use fs::FileSystemLoader;
pub use memory::MemoryLoader;

/// A source of template bytes
pub trait Loader: Send + Sync {
    /// Turn a path as written in a template into a root-relative key
    fn resolve(&self, path: &str, origin: Option<&str>) -> Result<String, Error> {
        resolve_path(path, origin)
    }

    /// Read the template stored under a resolved path
    fn load<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, Error>>;
}

/// Resolve `path` relative to the directory of `origin`
///
/// A leading `/` or `\` starts from the root. Backslashes are separators.
/// Climbing above the root with `..` is `NotFound`.
pub fn resolve_path(path: &str, origin: Option<&str>) -> Result<String, Error> {
    let normalized = path.replace('\\', "/");
    let (mut parts, relative): (Vec<&str>, &str) = match normalized.strip_prefix('/') {
        Some(rooted) => (Vec::new(), rooted),
        None => {
            let mut dir: Vec<&str> = origin
                .map(|origin| origin.split(['/', '\\']).collect())
                .unwrap_or_default();
            // drop the origin's file name
            dir.pop();
            (dir, normalized.as_str())
        }
    };

    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(Error::not_found(
                        path,
                        format!("template path {:?} escapes the template root", path),
                    ));
                }
            }
            name => parts.push(name),
        }
    }

    if parts.is_empty() {
        return Err(Error::not_found(
            path,
            format!("template path {:?} names no file", path),
        ));
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_to_origin_directory() {
        assert_eq!(
            resolve_path("nav.html", Some("pages/index.html")).unwrap(),
            "pages/nav.html"
        );
        assert_eq!(
            resolve_path("../base.html", Some("pages/index.html")).unwrap(),
            "base.html"
        );
        assert_eq!(resolve_path("./a/b.html", None).unwrap(), "a/b.html");
    }

    #[test]
    fn test_leading_separator_starts_at_root() {
        assert_eq!(
            resolve_path("/base.html", Some("pages/index.html")).unwrap(),
            "base.html"
        );
        assert_eq!(
            resolve_path("\\layouts\\base.html", Some("pages/index.html")).unwrap(),
            "layouts/base.html"
        );
    }

    #[test]
    fn test_escaping_the_root_is_not_found() {
        let err = resolve_path("../hijack.html", None).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        let err = resolve_path("../../x.html", Some("pages/index.html")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_empty_path_is_not_found() {
        assert!(matches!(
            resolve_path("./", None).unwrap_err(),
            Error::NotFound { .. }
        ));
    }
}
