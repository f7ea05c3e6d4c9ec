use std::path::{Path, PathBuf};

/// Snapshot of the active document, supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentContext {
    pub has_path: bool,
    pub is_remote: bool,
    pub language_id: Option<String>,
    /// Location of the document when it has one. Remote documents carry
    /// their URI here.
    pub location: Option<String>,
}

impl DocumentContext {
    /// A document that has never been saved.
    pub fn untitled() -> Self {
        Self::default()
    }

    /// A document at `location`, which is either a local path or a URI.
    /// Any scheme other than `file://` counts as remote. The language is
    /// guessed from the file extension.
    pub fn at(location: &str) -> Self {
        let (is_remote, path) = match location.split_once("://") {
            Some(("file", rest)) => (false, rest),
            Some((_, rest)) => (true, rest),
            None => (false, location),
        };
        Self {
            has_path: true,
            is_remote,
            language_id: detect_language(Path::new(path)).map(str::to_owned),
            location: Some(location.to_owned()),
        }
    }

    pub fn with_language(mut self, language: Option<&str>) -> Self {
        self.language_id = language.map(str::to_owned);
        self
    }

    /// Local filesystem path, when the document is titled and local.
    pub fn local_path(&self) -> Option<PathBuf> {
        if !self.has_path || self.is_remote {
            return None;
        }
        let location = self.location.as_deref()?;
        let path = location.strip_prefix("file://").unwrap_or(location);
        Some(PathBuf::from(path))
    }
}

/// Language id for a file name, matching the ids tools list in `languages`.
pub fn detect_language(path: &Path) -> Option<&'static str> {
    let file_name = path.file_name()?.to_str()?;
    match file_name {
        "Makefile" | "makefile" | "GNUmakefile" => return Some("makefile"),
        "CMakeLists.txt" => return Some("cmake"),
        "Dockerfile" => return Some("dockerfile"),
        _ => {}
    }

    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let language = match ext.as_str() {
        "rs" => "rust",
        "py" | "pyw" => "python",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hh" | "hpp" | "hxx" => "cpp",
        "go" => "go",
        "java" => "java",
        "js" | "mjs" | "cjs" => "js",
        "ts" => "typescript",
        "rb" => "ruby",
        "pl" | "pm" => "perl",
        "php" => "php",
        "lua" => "lua",
        "sh" | "bash" => "sh",
        "html" | "htm" => "html",
        "css" => "css",
        "xml" => "xml",
        "json" => "json",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "md" | "markdown" => "markdown",
        "tex" => "latex",
        "sql" => "sql",
        "diff" | "patch" => "diff",
        "vala" => "vala",
        _ => return None,
    };
    Some(language)
}
