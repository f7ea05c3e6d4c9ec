use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static FILE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<path>[^\s:()\[\]<>"']+):(?P<line>\d+)(?::(?P<column>\d+))?"#)
        .expect("file reference regex is valid")
});

/// `path:line[:column]` as printed by compilers, linters and grep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    pub path: String,
    pub line: u32,
    pub column: Option<u32>,
    /// Byte range of the reference inside the output line.
    pub span: (usize, usize),
}

pub fn file_references(line: &str) -> Vec<FileReference> {
    FILE_REFERENCE
        .captures_iter(line)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(FileReference {
                path: caps["path"].to_owned(),
                line: caps["line"].parse().ok()?,
                column: caps.name("column").and_then(|c| c.as_str().parse().ok()),
                span: (whole.start(), whole.end()),
            })
        })
        .collect()
}

/// Resolves the path of a [`FileReference`] to an existing file. Absolute
/// paths are taken as-is; relative ones are tried against each root in
/// order.
#[derive(Debug, Clone, Default)]
pub struct FileLookup {
    roots: Vec<PathBuf>,
}

impl FileLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    pub fn resolve(&self, reference: &FileReference) -> Option<PathBuf> {
        let path = Path::new(&reference.path);
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }
        self.roots
            .iter()
            .map(|root| root.join(path))
            .find(|candidate| candidate.is_file())
    }
}
