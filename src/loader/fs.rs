use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures_util::future::{BoxFuture, FutureExt};

use super::Loader;
use crate::error::Error;

/// Loads templates from a directory
///
/// Paths are resolved below `root`; a file that canonicalizes outside the
/// root (through a symlink, say) is reported as not found.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root: PathBuf,
}

impl FileSystemLoader {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root).map_err(|source| Error::Io {
            path: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Loader for FileSystemLoader {
    fn load<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, Error>> {
        async move {
            let candidate = self.root.join(path);
            let canonical = tokio::fs::canonicalize(&candidate)
                .await
                .map_err(|source| match source.kind() {
                    ErrorKind::NotFound => {
                        Error::not_found(path, format!("template {:?} does not exist", path))
                    }
                    _ => Error::Io {
                        path: candidate.display().to_string(),
                        source,
                    },
                })?;
            if !canonical.starts_with(&self.root) {
                return Err(Error::not_found(
                    path,
                    format!("template {:?} resolves outside the template root", path),
                ));
            }
            tokio::fs::read(&canonical).await.map_err(|source| Error::Io {
                path: canonical.display().to_string(),
                source,
            })
        }
        .boxed()
    }
}
