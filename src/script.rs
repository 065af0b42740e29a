use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Supplies SQL scripts line by line.
pub trait ScriptSource: fmt::Debug + Send + Sync {
    fn read_lines(&self, path: &Path) -> io::Result<Vec<String>>;
}

/// Reads scripts from disk, relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileScriptSource {
    root: PathBuf,
}

impl FileScriptSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for FileScriptSource {
    fn default() -> Self {
        Self::new(".")
    }
}

impl ScriptSource for FileScriptSource {
    fn read_lines(&self, path: &Path) -> io::Result<Vec<String>> {
        let content = fs::read_to_string(self.root.join(path))?;
        Ok(content.lines().map(str::to_string).collect())
    }
}
