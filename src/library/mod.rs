pub mod storage;
pub mod tool;

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info};

use crate::accel::Accelerator;
use crate::error::ExtoolsError;
use storage::{DirectoryFile, ToolFile, ToolStore};
pub use tool::{Applicability, PLAIN_LANGUAGE, Tool, ToolId};

/// A named group of tools. Subdirectories and tools keep their stored order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    pub name: String,
    subdirs: Vec<Directory>,
    tools: Vec<ToolId>,
}

impl Directory {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    pub fn subdirs(&self) -> &[Directory] {
        &self.subdirs
    }

    pub fn tools(&self) -> &[ToolId] {
        &self.tools
    }

    fn subdir_mut(&mut self, name: &str) -> &mut Directory {
        match self.subdirs.iter().position(|d| d.name == name) {
            Some(i) => &mut self.subdirs[i],
            None => {
                self.subdirs.push(Directory::new(name));
                let last = self.subdirs.len() - 1;
                &mut self.subdirs[last]
            }
        }
    }

    fn remove_tool(&mut self, id: ToolId) -> bool {
        if let Some(i) = self.tools.iter().position(|t| *t == id) {
            self.tools.remove(i);
            return true;
        }
        self.subdirs.iter_mut().any(|d| d.remove_tool(id))
    }
}

/// Tool definitions arranged in a directory tree, backed by a [`ToolStore`].
///
/// Tools live in an id-indexed arena; directories only hold ids, so a menu
/// leaf recovers its tool in O(1).
pub struct ToolLibrary {
    root: Directory,
    tools: HashMap<ToolId, Tool>,
    store: Box<dyn ToolStore>,
}

impl fmt::Debug for ToolLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolLibrary")
            .field("store", &self.store.describe())
            .field("tool_count", &self.tools.len())
            .finish()
    }
}

impl ToolLibrary {
    pub fn new(store: Box<dyn ToolStore>) -> Self {
        Self {
            root: Directory::default(),
            tools: HashMap::new(),
            store,
        }
    }

    /// Load from the store. An empty store yields an empty library.
    pub fn load(store: Box<dyn ToolStore>) -> Result<Self, ExtoolsError> {
        match store.read()? {
            Some(content) => Self::parse(&content, store),
            None => Ok(Self::new(store)),
        }
    }

    /// Parse library TOML, keeping `store` as the save target.
    pub fn parse(content: &str, store: Box<dyn ToolStore>) -> Result<Self, ExtoolsError> {
        let file: DirectoryFile =
            toml::from_str(content).map_err(|e| ExtoolsError::LibraryLoad(e.to_string()))?;

        let mut library = Self::new(store);
        let root = library.compile_directory(String::new(), file, "")?;
        library.root = root;
        info!(
            store = %library.store.describe(),
            tools = library.tools.len(),
            "tool library loaded"
        );
        Ok(library)
    }

    pub fn root(&self) -> &Directory {
        &self.root
    }

    pub fn tool(&self, id: ToolId) -> Option<&Tool> {
        self.tools.get(&id)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Add `tool` under the directory path `dirs`, creating directories as
    /// needed.
    pub fn add_tool(&mut self, dirs: &[&str], tool: Tool) -> Result<ToolId, ExtoolsError> {
        for dir in dirs {
            validate_name(dir, "directory", "")?;
        }
        validate_name(&tool.name, "tool", &dirs.join("/"))?;
        if tool.command.trim().is_empty() {
            return Err(ExtoolsError::LibraryValidation(format!(
                "tool '{}': command must not be empty",
                tool.name
            )));
        }

        let mut directory = &mut self.root;
        for name in dirs {
            directory = directory.subdir_mut(name);
        }
        let id = tool.id;
        directory.tools.push(id);
        self.tools.insert(id, tool);
        Ok(id)
    }

    pub fn remove_tool(&mut self, id: ToolId) -> Option<Tool> {
        self.root.remove_tool(id);
        self.tools.remove(&id)
    }

    /// Look a tool up by its slash-separated menu path, e.g. `"Git/Blame"`.
    /// The first match in stored order wins.
    pub fn find_by_path(&self, path: &str) -> Option<ToolId> {
        let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let name = parts.pop()?;

        let mut directory = &self.root;
        for part in parts {
            directory = directory.subdirs.iter().find(|d| d.name == part)?;
        }
        directory
            .tools
            .iter()
            .copied()
            .find(|id| self.tools.get(id).is_some_and(|t| t.name == name))
    }

    /// Slash-separated menu path of a tool.
    pub fn path_of(&self, id: ToolId) -> Option<String> {
        fn walk(dir: &Directory, id: ToolId, prefix: &mut Vec<String>) -> bool {
            if dir.tools.contains(&id) {
                return true;
            }
            for sub in &dir.subdirs {
                prefix.push(sub.name.clone());
                if walk(sub, id, prefix) {
                    return true;
                }
                prefix.pop();
            }
            false
        }

        let tool = self.tools.get(&id)?;
        let mut prefix = Vec::new();
        walk(&self.root, id, &mut prefix).then(|| {
            prefix.push(tool.name.clone());
            prefix.join("/")
        })
    }

    /// In-memory shortcut update. Does not persist; see [`ToolLibrary::save`].
    pub fn set_shortcut(
        &mut self,
        id: ToolId,
        shortcut: Option<Accelerator>,
    ) -> Result<&Tool, ExtoolsError> {
        let tool = self
            .tools
            .get_mut(&id)
            .ok_or_else(|| ExtoolsError::UnknownTool(id.to_string()))?;
        tool.shortcut = shortcut;
        Ok(tool)
    }

    /// Serialize the whole tree and hand it to the store.
    pub fn save(&self) -> Result<(), ExtoolsError> {
        let content = self.to_toml()?;
        self.store.write(&content)?;
        debug!(store = %self.store.describe(), "tool library saved");
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ExtoolsError> {
        toml::to_string_pretty(&self.export_directory(&self.root))
            .map_err(|e| ExtoolsError::Persist(e.to_string()))
    }

    fn compile_directory(
        &mut self,
        name: String,
        file: DirectoryFile,
        parent: &str,
    ) -> Result<Directory, ExtoolsError> {
        let here = if parent.is_empty() {
            name.clone()
        } else {
            format!("{parent}/{name}")
        };

        let mut directory = Directory {
            name,
            subdirs: Vec::with_capacity(file.directories.len()),
            tools: Vec::with_capacity(file.tools.len()),
        };

        for tool_file in file.tools {
            let tool = compile_tool(tool_file, &here)?;
            directory.tools.push(tool.id);
            self.tools.insert(tool.id, tool);
        }

        for sub in file.directories {
            validate_name(&sub.name, "directory", &here)?;
            let name = sub.name.clone();
            directory
                .subdirs
                .push(self.compile_directory(name, sub, &here)?);
        }

        Ok(directory)
    }

    fn export_directory(&self, directory: &Directory) -> DirectoryFile {
        DirectoryFile {
            name: directory.name.clone(),
            tools: directory
                .tools
                .iter()
                .filter_map(|id| self.tools.get(id))
                .map(export_tool)
                .collect(),
            directories: directory
                .subdirs
                .iter()
                .map(|d| self.export_directory(d))
                .collect(),
        }
    }
}

fn compile_tool(file: ToolFile, directory: &str) -> Result<Tool, ExtoolsError> {
    let label = if directory.is_empty() {
        file.name.clone()
    } else {
        format!("{directory}/{}", file.name)
    };

    validate_name(&file.name, "tool", directory)?;
    if file.command.trim().is_empty() {
        return Err(ExtoolsError::LibraryValidation(format!(
            "tool '{label}': command must not be empty"
        )));
    }

    let applicability = match file.applicability.as_deref() {
        None => Applicability::All,
        Some(value) => parse_applicability(value).ok_or_else(|| {
            ExtoolsError::LibraryLoad(format!(
                "tool '{label}': unknown applicability '{value}' \
                 (expected all, local, remote, titled or untitled)"
            ))
        })?,
    };

    let shortcut = match file.shortcut.as_deref() {
        None => None,
        Some(s) => Accelerator::parse_optional(s).map_err(|e| {
            ExtoolsError::LibraryValidation(format!("tool '{label}': {e}"))
        })?,
    };

    Ok(Tool {
        id: ToolId::new(),
        name: file.name,
        comment: file.comment,
        command: file.command,
        shortcut,
        applicability,
        languages: file.languages.into_iter().collect(),
    })
}

fn export_tool(tool: &Tool) -> ToolFile {
    ToolFile {
        name: tool.name.clone(),
        comment: tool.comment.clone(),
        command: tool.command.clone(),
        shortcut: tool.shortcut.as_ref().map(ToString::to_string),
        applicability: (tool.applicability != Applicability::All)
            .then(|| tool.applicability.as_str().to_owned()),
        languages: tool.languages.iter().cloned().collect(),
    }
}

fn parse_applicability(value: &str) -> Option<Applicability> {
    match value {
        "all" => Some(Applicability::All),
        "local" => Some(Applicability::Local),
        "remote" => Some(Applicability::Remote),
        "titled" => Some(Applicability::Titled),
        "untitled" => Some(Applicability::Untitled),
        _ => None,
    }
}

fn validate_name(name: &str, kind: &str, parent: &str) -> Result<(), ExtoolsError> {
    let location = if parent.is_empty() {
        String::new()
    } else {
        format!(" in '{parent}'")
    };
    if name.trim().is_empty() {
        return Err(ExtoolsError::LibraryValidation(format!(
            "{kind} name{location} must not be empty"
        )));
    }
    if name.contains('/') {
        return Err(ExtoolsError::LibraryValidation(format!(
            "{kind} '{name}'{location}: name must not contain '/'"
        )));
    }
    Ok(())
}
