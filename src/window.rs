use std::time::Duration;

use tracing::{debug, info, warn};

use crate::accel::{AccelMap, Accelerator, ShortcutConflict};
use crate::capture::{Capture, CaptureEvent, CaptureRequest, ExitInfo};
use crate::context::DocumentContext;
use crate::error::ExtoolsError;
use crate::library::{Tool, ToolId, ToolLibrary};
use crate::menu::tree::accel_path;
use crate::menu::{ShortcutUpdate, ToolMenu, filter};
use crate::output::OutputPanel;

/// Placeholder inside the host's Tools menu that the tool tree is merged
/// under.
pub const MENU_PATH: &str =
    "/MenuBar/ToolsMenu/ToolsOps_4/ExternalToolsMenu/ExternalToolPlaceholder";

/// A fixed action the helper contributes to the host menus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostAction {
    pub name: &'static str,
    pub label: &'static str,
    pub tooltip: &'static str,
}

pub const MANAGER_ACTION: HostAction = HostAction {
    name: "ExternalToolManager",
    label: "Manage _External Tools...",
    tooltip: "Opens the External Tools Manager",
};

pub const TOOLS_MENU_ACTION: HostAction = HostAction {
    name: "ExternalTools",
    label: "_External Tools",
    tooltip: "External tools",
};

/// Told when a tool changed underneath an open manager, so it can refresh.
pub trait ManagerObserver: Send {
    fn tool_updated(&mut self, tool: &Tool);
}

/// Per-window wiring: menu, output panel and command capture.
///
/// The [`ToolLibrary`] is shared by every window and owned by the host, like
/// the [`AccelMap`]; both are passed in explicitly. Windows on the same
/// library derive the same accelerator paths and share their bindings.
pub struct ExternalTools {
    menu: ToolMenu,
    panel: OutputPanel,
    capture: Capture,
    timeout: Option<Duration>,
    observer: Option<Box<dyn ManagerObserver>>,
    /// Last document reported by the host; reapplied on every rebuild.
    context: Option<DocumentContext>,
}

impl ExternalTools {
    pub fn new(capture: Capture, panel: OutputPanel) -> Self {
        Self {
            menu: ToolMenu::new(MENU_PATH),
            panel,
            capture,
            timeout: None,
            observer: None,
            context: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_observer(&mut self, observer: Box<dyn ManagerObserver>) {
        self.observer = Some(observer);
    }

    pub fn host_actions(&self) -> [HostAction; 2] {
        [MANAGER_ACTION, TOOLS_MENU_ACTION]
    }

    pub fn menu(&self) -> &ToolMenu {
        &self.menu
    }

    pub fn panel(&self) -> &OutputPanel {
        &self.panel
    }

    pub fn find_tool(library: &ToolLibrary, path: &str) -> Result<ToolId, ExtoolsError> {
        library
            .find_by_path(path)
            .ok_or_else(|| ExtoolsError::UnknownTool(path.to_owned()))
    }

    /// Build the menu for the window. Returns the shortcuts that could not
    /// be bound.
    pub fn attach(
        &mut self,
        library: &ToolLibrary,
        accels: &mut AccelMap,
        ctx: Option<&DocumentContext>,
    ) -> Vec<ShortcutConflict> {
        self.context = ctx.cloned();
        let conflicts = self.menu.update(library, accels, ctx);
        info!(
            tools = library.len(),
            conflicts = conflicts.len(),
            "external tools attached"
        );
        conflicts
    }

    /// Rebuild after the library changed.
    pub fn reload_menu(
        &mut self,
        library: &ToolLibrary,
        accels: &mut AccelMap,
    ) -> Vec<ShortcutConflict> {
        self.menu.update(library, accels, self.context.as_ref())
    }

    /// The active document changed. `None` means no document is active and
    /// leaves visibility as it was.
    pub fn update_ui(&mut self, library: &ToolLibrary, ctx: Option<&DocumentContext>) {
        if ctx.is_some() {
            self.context = ctx.cloned();
        }
        self.menu.filter(library, ctx);
    }

    /// Change the binding at `path` in the host table and route the
    /// resulting notifications to this window's menu. A key combination
    /// already in use elsewhere is refused.
    pub fn accel_changed(
        &mut self,
        library: &mut ToolLibrary,
        accels: &mut AccelMap,
        path: &str,
        accelerator: Option<Accelerator>,
    ) -> Result<Vec<ShortcutUpdate>, ShortcutConflict> {
        let notifications = accels.change_entry(path, accelerator)?;

        let mut updates = Vec::new();
        for change in &notifications {
            let Some(update) = self.menu.on_accel_changed(change, library) else {
                continue;
            };
            self.notify_observer(library, update.tool);
            updates.push(update);
        }
        Ok(updates)
    }

    /// Change a tool's shortcut by path, as the manager would. The binding
    /// is refused when its key combination is taken by another tool.
    pub fn rebind(
        &mut self,
        library: &mut ToolLibrary,
        accels: &mut AccelMap,
        tool_path: &str,
        accelerator: Option<Accelerator>,
    ) -> Result<ShortcutUpdate, ExtoolsError> {
        let id = Self::find_tool(library, tool_path)?;
        let path = accel_path(id);

        if self.menu.is_registered(id) {
            let mut updates = self.accel_changed(library, accels, &path, accelerator.clone())?;
            if let Some(update) = updates.pop() {
                return Ok(update);
            }
        }

        // No listener of ours on the path: update the library and rebuild
        // so the new binding gets registered.
        let owner = library.path_of(id).unwrap_or_else(|| tool_path.to_owned());
        if let Some(accel) = &accelerator {
            if let Some(taken) = accels.find_path(accel).filter(|p| *p != path) {
                return Err(ShortcutConflict {
                    accelerator: accel.to_string(),
                    existing: taken.to_owned(),
                    requested: owner,
                }
                .into());
            }
        }

        let previous = library.tool(id).and_then(|t| t.shortcut.clone());
        library.set_shortcut(id, accelerator.clone())?;
        if self.menu.is_built() {
            let conflicts = self.reload_menu(library, accels);
            if let Some(conflict) = conflicts.into_iter().find(|c| c.requested == owner) {
                library.set_shortcut(id, previous)?;
                self.reload_menu(library, accels);
                return Err(conflict.into());
            }
        }

        let persist_error = library.save().err();
        if let Some(e) = &persist_error {
            warn!(error = %e, "shortcut changed but could not be saved");
        }
        self.notify_observer(library, id);
        Ok(ShortcutUpdate {
            tool: id,
            shortcut: accelerator,
            persist_error,
        })
    }

    fn notify_observer(&mut self, library: &ToolLibrary, tool: ToolId) {
        if let (Some(observer), Some(tool)) = (self.observer.as_mut(), library.tool(tool)) {
            observer.tool_updated(tool);
        }
    }

    /// Run a tool against `ctx`, writing its output into the panel and
    /// handing every event to `on_event` as it arrives. The panel is cleared
    /// first.
    pub async fn activate(
        &mut self,
        library: &ToolLibrary,
        tool: ToolId,
        ctx: &DocumentContext,
        stdin: Option<String>,
        mut on_event: impl FnMut(&CaptureEvent),
    ) -> Result<ExitInfo, ExtoolsError> {
        let tool = library
            .tool(tool)
            .ok_or_else(|| ExtoolsError::UnknownTool(tool.to_string()))?;
        if !filter::visible(tool, ctx) {
            return Err(ExtoolsError::ToolExecution(format!(
                "tool '{}' does not apply to this document",
                tool.name
            )));
        }

        let request = CaptureRequest::for_tool(tool, ctx)
            .with_stdin(stdin)
            .with_timeout(self.timeout);
        self.panel.clear();
        self.panel.started(&tool.name);
        debug!(tool = %tool.name, "activating tool");

        let mut events = self.capture.spawn(request)?;
        while let Some(event) = events.recv().await {
            self.panel.record(&event);
            on_event(&event);
            if let CaptureEvent::Exited(exit) = event {
                return Ok(exit);
            }
        }
        Err(ExtoolsError::ToolExecution(
            "tool output ended without an exit status".to_owned(),
        ))
    }

    /// Remove everything the helper installed. Safe to call repeatedly.
    pub fn deactivate(&mut self, accels: &mut AccelMap) {
        self.menu.deactivate(accels);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::library::storage::MemoryStore;

    const LIBRARY: &str = r#"
[[tool]]
name = "Greet"
command = "echo hi from $EXTOOLS_CURRENT_DOCUMENT_NAME"
shortcut = "<Control>g"
applicability = "titled"

[[tool]]
name = "Upper"
command = "tr a-z A-Z"

[[tool]]
name = "Fail"
command = "echo broken >&2; exit 2"
"#;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl ManagerObserver for Recorder {
        fn tool_updated(&mut self, tool: &Tool) {
            self.0.lock().unwrap().push(tool.name.clone());
        }
    }

    fn library() -> ToolLibrary {
        ToolLibrary::parse(LIBRARY, Box::new(MemoryStore::new())).unwrap()
    }

    fn window() -> ExternalTools {
        ExternalTools::new(Capture::default(), OutputPanel::default())
    }

    fn id(library: &ToolLibrary, path: &str) -> ToolId {
        ExternalTools::find_tool(library, path).unwrap()
    }

    fn accel(s: &str) -> Accelerator {
        s.parse().unwrap()
    }

    #[test]
    fn attach_and_deactivate_are_symmetric() {
        let library = library();
        let mut accels = AccelMap::new();
        let mut tools = window();
        assert!(tools.attach(&library, &mut accels, None).is_empty());
        assert_eq!(accels.listener_count(), 1);

        tools.deactivate(&mut accels);
        tools.deactivate(&mut accels);
        assert_eq!(accels.listener_count(), 0);
        assert!(!tools.menu().is_built());
    }

    #[test]
    fn two_windows_share_bindings() {
        let mut library = library();
        let mut accels = AccelMap::new();
        let mut first = window();
        let mut second = window();

        assert!(first.attach(&library, &mut accels, None).is_empty());
        assert!(second.attach(&library, &mut accels, None).is_empty());
        assert_eq!(accels.entry_count(), 1);

        let greet = id(&library, "Greet");
        first.deactivate(&mut accels);
        assert_eq!(accels.lookup(&accel_path(greet)), Some(&accel("<Control>g")));

        let updates = second
            .accel_changed(&mut library, &mut accels, &accel_path(greet), Some(accel("<Alt>g")))
            .unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(library.tool(greet).unwrap().shortcut, Some(accel("<Alt>g")));
    }

    #[test]
    fn accel_change_reaches_observer() {
        let mut library = library();
        let mut accels = AccelMap::new();
        let mut tools = window();
        let recorder = Recorder::default();
        tools.set_observer(Box::new(recorder.clone()));
        tools.attach(&library, &mut accels, None);

        let greet = id(&library, "Greet");
        let updates = tools
            .accel_changed(&mut library, &mut accels, &accel_path(greet), Some(accel("<Alt>g")))
            .unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(*recorder.0.lock().unwrap(), ["Greet"]);
    }

    #[test]
    fn accel_change_to_taken_key_refused() {
        let mut library = library();
        let mut accels = AccelMap::new();
        accels.register("<Actions>/Other/Save", accel("<Control>s"), "Save").unwrap();
        let mut tools = window();
        tools.attach(&library, &mut accels, None);

        let greet = id(&library, "Greet");
        let err = tools
            .accel_changed(&mut library, &mut accels, &accel_path(greet), Some(accel("<Control>s")))
            .unwrap_err();
        assert_eq!(err.existing, "Save");
        assert_eq!(err.requested, "Greet");
    }

    #[test]
    fn rebind_unbound_tool_registers_it() {
        let mut library = library();
        let mut accels = AccelMap::new();
        let mut tools = window();
        tools.attach(&library, &mut accels, None);

        let update = tools
            .rebind(&mut library, &mut accels, "Upper", Some(accel("<Control>u")))
            .unwrap();
        assert!(update.persist_error.is_none());
        assert_eq!(accels.listener_count(), 2);
        let upper = id(&library, "Upper");
        assert_eq!(accels.lookup(&accel_path(upper)), Some(&accel("<Control>u")));
    }

    #[test]
    fn rebind_bound_tool_goes_through_table() {
        let mut library = library();
        let mut accels = AccelMap::new();
        let mut tools = window();
        tools.attach(&library, &mut accels, None);

        let update = tools.rebind(&mut library, &mut accels, "Greet", None).unwrap();
        assert_eq!(update.shortcut, None);
        let greet = id(&library, "Greet");
        assert_eq!(library.tool(greet).unwrap().shortcut, None);

        // the listener survives clearing, so a new key is routed too
        let update = tools
            .rebind(&mut library, &mut accels, "Greet", Some(accel("F2")))
            .unwrap();
        assert_eq!(update.shortcut, Some(accel("F2")));
        assert_eq!(tools.menu().listener_count(), 1);
    }

    #[test]
    fn rebind_after_host_edit_of_unbound_tool() {
        let mut library = library();
        let mut accels = AccelMap::new();
        let mut tools = window();
        tools.attach(&library, &mut accels, None);

        let upper = id(&library, "Upper");
        accels.change_entry(&accel_path(upper), Some(accel("F3"))).unwrap();

        tools.rebind(&mut library, &mut accels, "Upper", Some(accel("F4"))).unwrap();
        assert!(tools.menu().is_registered(upper));
        assert_eq!(tools.menu().listener_count(), 2);

        let updates = tools
            .accel_changed(&mut library, &mut accels, &accel_path(upper), Some(accel("F5")))
            .unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(library.tool(upper).unwrap().shortcut, Some(accel("F5")));
    }

    #[test]
    fn rebind_to_taken_key_refused() {
        let mut library = library();
        let mut accels = AccelMap::new();
        let mut tools = window();
        tools.attach(&library, &mut accels, None);

        let err = tools
            .rebind(&mut library, &mut accels, "Upper", Some(accel("<Control>g")))
            .unwrap_err();
        assert!(matches!(err, ExtoolsError::ShortcutConflict(_)));
        assert_eq!(library.tool(id(&library, "Upper")).unwrap().shortcut, None);
    }

    #[test]
    fn rebind_reports_conflict_found_on_rebuild() {
        let mut library = library();
        let mut accels = AccelMap::new();
        let mut tools = window();
        tools.attach(&library, &mut accels, None);

        // the Upper path is held by another owner, so registering it fails
        let upper = id(&library, "Upper");
        accels.register(&accel_path(upper), accel("F9"), "Elsewhere").unwrap();

        let err = tools
            .rebind(&mut library, &mut accels, "Upper", Some(accel("F4")))
            .unwrap_err();
        let ExtoolsError::ShortcutConflict(conflict) = err else {
            panic!("expected a shortcut conflict, got {err:?}");
        };
        assert_eq!(conflict.existing, "Elsewhere");
        assert_eq!(conflict.requested, "Upper");
        assert_eq!(library.tool(upper).unwrap().shortcut, None);
        assert!(!tools.menu().is_registered(upper));
    }

    #[test]
    fn reload_keeps_last_document() {
        let library = library();
        let mut accels = AccelMap::new();
        let mut tools = window();
        tools.attach(&library, &mut accels, None);
        tools.update_ui(&library, Some(&DocumentContext::untitled()));

        let greet = id(&library, "Greet");
        tools.reload_menu(&library, &mut accels);
        let node = tools.menu().tree().unwrap().find_tool(greet).unwrap();
        assert!(!node.visible);
    }

    #[test]
    fn unknown_tool_path() {
        let library = library();
        assert!(matches!(
            ExternalTools::find_tool(&library, "Nope"),
            Err(ExtoolsError::UnknownTool(_))
        ));
    }

    #[tokio::test]
    async fn activate_streams_into_panel() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        std::fs::write(&file, "").unwrap();
        let ctx = DocumentContext::at(&file.display().to_string());

        let library = library();
        let mut tools = window();
        let greet = id(&library, "Greet");
        let mut seen = 0;
        let exit = tools
            .activate(&library, greet, &ctx, None, |_| seen += 1)
            .await
            .unwrap();

        assert!(exit.success());
        assert_eq!(seen, 2);
        assert_eq!(tools.panel().text(), "Running tool: Greet\nhi from doc.txt\nDone.");
    }

    #[tokio::test]
    async fn activate_reports_failure() {
        let library = library();
        let mut tools = window();
        let fail = id(&library, "Fail");
        let exit = tools
            .activate(&library, fail, &DocumentContext::untitled(), None, |_| {})
            .await
            .unwrap();
        assert_eq!(exit.code, Some(2));
        assert!(tools.panel().text().ends_with("broken\nExited: 2"));
    }

    #[tokio::test]
    async fn activate_with_stdin() {
        let library = library();
        let mut tools = window();
        let upper = id(&library, "Upper");
        tools
            .activate(
                &library,
                upper,
                &DocumentContext::untitled(),
                Some("abc\n".to_owned()),
                |_| {},
            )
            .await
            .unwrap();
        assert!(tools.panel().text().contains("ABC"));
    }

    #[tokio::test]
    async fn activate_refuses_inapplicable_tool() {
        let library = library();
        let mut tools = window();
        let greet = id(&library, "Greet");
        let err = tools
            .activate(&library, greet, &DocumentContext::untitled(), None, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ExtoolsError::ToolExecution(_)));
        assert!(tools.panel().is_empty());
    }
}
