use crate::library::{Directory, ToolId, ToolLibrary};

/// Action group every generated action belongs to. Part of each accelerator
/// path.
pub const ACTION_GROUP: &str = "ExternalToolActions";

/// Accelerator path for a tool. Derived from the tool id only, so rebuilding
/// the menu for the same library yields the same path.
pub fn accel_path(tool: ToolId) -> String {
    format!("<Actions>/{ACTION_GROUP}/{}", tool_action_name(tool))
}

pub fn tool_action_name(tool: ToolId) -> String {
    format!("ExternalToolTool{tool}")
}

/// Menu label with `_` doubled so it is not read as a mnemonic marker.
pub fn escape_label(name: &str) -> String {
    name.replace('_', "__")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuNode {
    Directory(DirectoryNode),
    Tool(ToolNode),
}

impl MenuNode {
    pub fn action_name(&self) -> &str {
        match self {
            MenuNode::Directory(d) => &d.action_name,
            MenuNode::Tool(t) => &t.action_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryNode {
    pub action_name: String,
    pub name: String,
    pub children: Vec<MenuNode>,
}

impl DirectoryNode {
    pub fn label(&self) -> String {
        escape_label(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolNode {
    pub action_name: String,
    pub name: String,
    pub tooltip: String,
    pub tool: ToolId,
    pub accel_path: String,
    pub visible: bool,
}

impl ToolNode {
    pub fn label(&self) -> String {
        escape_label(&self.name)
    }
}

/// Rendered menu for one library, rooted at a host menu placeholder path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuTree {
    path: String,
    nodes: Vec<MenuNode>,
}

impl MenuTree {
    /// Walk the library tree: per directory, subdirectories first, then tools,
    /// each in stored order.
    pub fn build(library: &ToolLibrary, path: &str) -> Self {
        let mut next_dir = 0usize;
        let nodes = build_directory(library, library.root(), &mut next_dir);
        Self {
            path: path.to_owned(),
            nodes,
        }
    }

    /// Host menu path the nodes are merged under.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn nodes(&self) -> &[MenuNode] {
        &self.nodes
    }

    pub fn tool_nodes(&self) -> Vec<&ToolNode> {
        fn collect<'a>(nodes: &'a [MenuNode], out: &mut Vec<&'a ToolNode>) {
            for node in nodes {
                match node {
                    MenuNode::Directory(d) => collect(&d.children, out),
                    MenuNode::Tool(t) => out.push(t),
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.nodes, &mut out);
        out
    }

    pub fn for_each_tool_mut(&mut self, mut f: impl FnMut(&mut ToolNode)) {
        fn walk(nodes: &mut [MenuNode], f: &mut dyn FnMut(&mut ToolNode)) {
            for node in nodes {
                match node {
                    MenuNode::Directory(d) => walk(&mut d.children, f),
                    MenuNode::Tool(t) => f(t),
                }
            }
        }
        walk(&mut self.nodes, &mut f);
    }

    pub fn find_tool(&self, tool: ToolId) -> Option<&ToolNode> {
        self.tool_nodes().into_iter().find(|t| t.tool == tool)
    }

    pub fn find_action(&self, action_name: &str) -> Option<&ToolNode> {
        self.tool_nodes()
            .into_iter()
            .find(|t| t.action_name == action_name)
    }
}

fn build_directory(
    library: &ToolLibrary,
    directory: &Directory,
    next_dir: &mut usize,
) -> Vec<MenuNode> {
    let mut nodes = Vec::with_capacity(directory.subdirs().len() + directory.tools().len());

    for sub in directory.subdirs() {
        *next_dir += 1;
        let action_name = format!("ExternalToolDirectory{:X}", *next_dir);
        let children = build_directory(library, sub, next_dir);
        nodes.push(MenuNode::Directory(DirectoryNode {
            action_name,
            name: sub.name.clone(),
            children,
        }));
    }

    for &id in directory.tools() {
        let Some(tool) = library.tool(id) else {
            continue;
        };
        nodes.push(MenuNode::Tool(ToolNode {
            action_name: tool_action_name(id),
            name: tool.name.clone(),
            tooltip: tool.comment.clone(),
            tool: id,
            accel_path: accel_path(id),
            visible: true,
        }));
    }

    nodes
}
