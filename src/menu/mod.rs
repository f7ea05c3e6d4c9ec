pub mod filter;
pub mod tree;

use tracing::{debug, warn};

use crate::accel::{AccelChanged, AccelMap, Accelerator, ListenerHandle, ShortcutConflict};
use crate::context::DocumentContext;
use crate::error::ExtoolsError;
use crate::library::{ToolId, ToolLibrary};
pub use tree::{DirectoryNode, MenuNode, MenuTree, ToolNode};

/// Outcome of an accelerator change routed to the menu.
#[derive(Debug)]
pub struct ShortcutUpdate {
    pub tool: ToolId,
    pub shortcut: Option<Accelerator>,
    /// Set when the new shortcut could not be saved. The in-memory library
    /// still holds the new value.
    pub persist_error: Option<ExtoolsError>,
}

struct Registration {
    tool: ToolId,
    accel_path: String,
    listener: ListenerHandle,
}

struct BuiltMenu {
    tree: MenuTree,
    registrations: Vec<Registration>,
}

enum MenuState {
    Unattached,
    Built(BuiltMenu),
}

/// The tool menu for one host window.
///
/// `Unattached → Built` on [`ToolMenu::update`]; [`ToolMenu::filter`] may run
/// any number of times while built; [`ToolMenu::remove`] returns to
/// `Unattached` and is a no-op when already there.
pub struct ToolMenu {
    path: String,
    state: MenuState,
}

impl ToolMenu {
    /// `path` is the host menu placeholder the tree is merged under.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_owned(),
            state: MenuState::Unattached,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_built(&self) -> bool {
        matches!(self.state, MenuState::Built(_))
    }

    pub fn tree(&self) -> Option<&MenuTree> {
        match &self.state {
            MenuState::Built(built) => Some(&built.tree),
            MenuState::Unattached => None,
        }
    }

    /// Whether this menu holds a change listener for `tool`.
    pub fn is_registered(&self, tool: ToolId) -> bool {
        match &self.state {
            MenuState::Built(built) => built.registrations.iter().any(|r| r.tool == tool),
            MenuState::Unattached => false,
        }
    }

    /// Number of accelerator listeners this menu currently holds.
    pub fn listener_count(&self) -> usize {
        match &self.state {
            MenuState::Built(built) => built.registrations.len(),
            MenuState::Unattached => 0,
        }
    }

    /// Discard the current menu and build a fresh one from `library`.
    ///
    /// Every tool with a shortcut gets its binding and one change listener.
    /// A shortcut already taken by another tool is left unbound and returned
    /// as a conflict. Visibility is then applied for `ctx`.
    pub fn update(
        &mut self,
        library: &ToolLibrary,
        accels: &mut AccelMap,
        ctx: Option<&DocumentContext>,
    ) -> Vec<ShortcutConflict> {
        self.remove(accels);

        let tree = MenuTree::build(library, &self.path);
        let mut registrations = Vec::new();
        let mut conflicts = Vec::new();

        for node in tree.tool_nodes() {
            let Some(shortcut) = library.tool(node.tool).and_then(|t| t.shortcut.clone()) else {
                continue;
            };
            let owner = library.path_of(node.tool).unwrap_or_else(|| node.name.clone());

            match accels.register(&node.accel_path, shortcut, &owner) {
                Ok(_) => registrations.push(Registration {
                    tool: node.tool,
                    accel_path: node.accel_path.clone(),
                    listener: accels.connect(&node.accel_path),
                }),
                Err(conflict) => {
                    warn!(%conflict, "shortcut not bound");
                    conflicts.push(conflict);
                }
            }
        }

        debug!(
            path = %self.path,
            tools = tree.tool_nodes().len(),
            listeners = registrations.len(),
            "tool menu built"
        );
        self.state = MenuState::Built(BuiltMenu {
            tree,
            registrations,
        });
        self.filter(library, ctx);
        conflicts
    }

    /// Apply visibility for the active document. Without one, nothing
    /// changes.
    pub fn filter(&mut self, library: &ToolLibrary, ctx: Option<&DocumentContext>) {
        let (MenuState::Built(built), Some(ctx)) = (&mut self.state, ctx) else {
            return;
        };
        built.tree.for_each_tool_mut(|node| {
            node.visible = library
                .tool(node.tool)
                .is_some_and(|tool| filter::visible(tool, ctx));
        });
    }

    /// Tear the menu down: release every listener it installed, and every
    /// binding no other menu still listens on.
    pub fn remove(&mut self, accels: &mut AccelMap) {
        let state = std::mem::replace(&mut self.state, MenuState::Unattached);
        let MenuState::Built(built) = state else {
            return;
        };
        for registration in built.registrations {
            accels.disconnect(registration.listener);
            if accels.listeners_on(&registration.accel_path) == 0 {
                accels.remove_entry(&registration.accel_path);
            }
        }
        debug!(path = %self.path, "tool menu removed");
    }

    pub fn deactivate(&mut self, accels: &mut AccelMap) {
        self.remove(accels);
    }

    /// Route an accelerator change. Changes for listeners this menu does not
    /// own (including ones from a previous build) are ignored.
    ///
    /// The tool's shortcut is updated and the library saved. A failed save is
    /// logged and reported in the result, but the new shortcut stays.
    pub fn on_accel_changed(
        &mut self,
        change: &AccelChanged,
        library: &mut ToolLibrary,
    ) -> Option<ShortcutUpdate> {
        let MenuState::Built(built) = &self.state else {
            return None;
        };
        let registration = built
            .registrations
            .iter()
            .find(|r| r.listener.id() == change.listener)?;
        let tool = registration.tool;

        if let Err(e) = library.set_shortcut(tool, change.accelerator.clone()) {
            debug!(error = %e, "accelerator change for a tool no longer in the library");
            return None;
        }

        let persist_error = library.save().err();
        if let Some(e) = &persist_error {
            warn!(error = %e, "shortcut changed but could not be saved");
        }

        Some(ShortcutUpdate {
            tool,
            shortcut: change.accelerator.clone(),
            persist_error,
        })
    }

    /// Tool behind a visible action, if the action exists and is shown.
    pub fn activate(&self, action_name: &str) -> Option<ToolId> {
        self.tree()?
            .find_action(action_name)
            .filter(|node| node.visible)
            .map(|node| node.tool)
    }
}
