//! Local mirror of remote script sources.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::remote::jerry::handler::ANONYMOUS_SOURCE;

/// Thin file access layer under the cache.
pub trait SourceStore {
    /// Current content at `path`, `None` if there is no file.
    fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>>;

    fn write(&self, path: &Path, content: &[u8]) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsStore;

impl SourceStore for FsStore {
    fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        fs::write(path, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Base name of a remote script name, `debug_eval.js` for unnamed scripts.
pub fn source_basename(name: Option<&str>) -> String {
    let name = name.filter(|n| !n.is_empty()).unwrap_or(ANONYMOUS_SOURCE);
    Path::new(name)
        .file_name()
        .map(|base| base.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

/// `<root>/<basename(name)>`
pub fn local_source_path(root: &Path, name: Option<&str>) -> PathBuf {
    root.join(source_basename(name))
}

pub struct SourceCache {
    root: PathBuf,
    store: Box<dyn SourceStore>,
}

impl SourceCache {
    pub fn new(root: PathBuf) -> Self {
        Self::with_store(root, Box::new(FsStore))
    }

    pub fn with_store(root: PathBuf, store: Box<dyn SourceStore>) -> Self {
        Self { root, store }
    }

    pub fn local_path(&self, name: Option<&str>) -> PathBuf {
        local_source_path(&self.root, name)
    }

    /// Bring the local copy of script `name` in line with `text`. Writes only on change.
    pub fn sync(&self, name: Option<&str>, text: &str) -> io::Result<SyncOutcome> {
        let path = self.local_path(name);
        let outcome = match self.store.read(&path)? {
            Some(current) if current == text.as_bytes() => return Ok(SyncOutcome::Unchanged),
            Some(_) => SyncOutcome::Updated,
            None => SyncOutcome::Created,
        };
        self.store.write(&path, text.as_bytes())?;
        Ok(outcome)
    }
}
