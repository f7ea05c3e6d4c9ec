use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ExtoolsError;

const MAX_LIBRARY_FILE_SIZE: u64 = 256 * 1024; // 256 KiB

/// Where the serialized library lives. The library owns the format; a store
/// only moves text in and out.
pub trait ToolStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn read(&self) -> Result<Option<String>, ExtoolsError>;

    fn write(&self, content: &str) -> Result<(), ExtoolsError>;

    fn describe(&self) -> String;
}

impl<S: ToolStore + ?Sized> ToolStore for Arc<S> {
    fn read(&self) -> Result<Option<String>, ExtoolsError> {
        (**self).read()
    }

    fn write(&self, content: &str) -> Result<(), ExtoolsError> {
        (**self).write(content)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

// --- TOML deserialization structs (map 1:1 to the file schema) ---

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(super) struct DirectoryFile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, rename = "tool", skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolFile>,
    #[serde(default, rename = "directory", skip_serializing_if = "Vec::is_empty")]
    pub directories: Vec<DirectoryFile>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(super) struct ToolFile {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
    // Kept as text so a bad value can be reported against its tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicability: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
}

/// Library file on disk. Writes go to a sibling temp file first and are
/// renamed into place.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ToolStore for FileStore {
    fn read(&self) -> Result<Option<String>, ExtoolsError> {
        let metadata = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no tool library yet");
                return Ok(None);
            }
            Err(e) => {
                return Err(ExtoolsError::LibraryLoad(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };

        if metadata.len() > MAX_LIBRARY_FILE_SIZE {
            return Err(ExtoolsError::LibraryLoad(format!(
                "library file exceeds {MAX_LIBRARY_FILE_SIZE} byte limit"
            )));
        }

        fs::read_to_string(&self.path).map(Some).map_err(|e| {
            ExtoolsError::LibraryLoad(format!("cannot read {}: {e}", self.path.display()))
        })
    }

    fn write(&self, content: &str) -> Result<(), ExtoolsError> {
        let persist_err =
            |e: std::io::Error| ExtoolsError::Persist(format!("{}: {e}", self.path.display()));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content).map_err(persist_err)?;
        fs::rename(&tmp, &self.path).map_err(persist_err)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process store. `fail_writes` simulates an unavailable backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    content: Mutex<Option<String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: &str) -> Self {
        Self {
            content: Mutex::new(Some(content.to_owned())),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn content(&self) -> Option<String> {
        self.content.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ToolStore for MemoryStore {
    fn read(&self) -> Result<Option<String>, ExtoolsError> {
        Ok(self.content())
    }

    fn write(&self, content: &str) -> Result<(), ExtoolsError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ExtoolsError::Persist("memory store is read-only".to_owned()));
        }
        *self.content.lock().unwrap_or_else(|e| e.into_inner()) = Some(content.to_owned());
        Ok(())
    }

    fn describe(&self) -> String {
        "<memory>".to_owned()
    }
}
