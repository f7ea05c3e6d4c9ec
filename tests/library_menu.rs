//! End-to-end behaviour over a library file on disk: load, build the menu,
//! filter it, rebind a shortcut and reload what was saved.

use extools::accel::AccelMap;
use extools::capture::{Capture, CaptureEvent};
use extools::context::DocumentContext;
use extools::error::ExtoolsError;
use extools::library::storage::FileStore;
use extools::library::{Applicability, Tool, ToolLibrary};
use extools::menu::tree::accel_path;
use extools::menu::{MenuNode, ToolMenu};
use extools::output::OutputPanel;
use extools::window::{ExternalTools, MENU_PATH};

const LIBRARY: &str = r#"
[[tool]]
name = "Word Count"
command = "wc -l"
shortcut = "<Control>F9"

[[directory]]
name = "Rust"

[[directory.tool]]
name = "Clippy"
command = "cargo clippy"
comment = "Lint the crate"
shortcut = "<Control><Shift>c"
applicability = "local"
languages = ["rust"]

[[directory.directory]]
name = "Docs"

[[directory.directory.tool]]
name = "Open_Docs"
command = "cargo doc --open"
"#;

fn write_library(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("tools.toml");
    std::fs::write(&path, LIBRARY).unwrap();
    path
}

fn load(path: &std::path::Path) -> ToolLibrary {
    ToolLibrary::load(Box::new(FileStore::new(path))).unwrap()
}

#[test]
fn menu_mirrors_library_tree() {
    let dir = tempfile::tempdir().unwrap();
    let library = load(&write_library(&dir));
    let mut accels = AccelMap::new();
    let mut menu = ToolMenu::new(MENU_PATH);
    menu.update(&library, &mut accels, None);

    let tree = menu.tree().unwrap();
    // subdirectories come before tools
    let MenuNode::Directory(rust) = &tree.nodes()[0] else {
        panic!("expected the Rust directory first");
    };
    assert_eq!(rust.name, "Rust");
    assert!(matches!(&tree.nodes()[1], MenuNode::Tool(t) if t.name == "Word Count"));

    let MenuNode::Directory(docs) = &rust.children[0] else {
        panic!("expected Docs before Clippy");
    };
    let MenuNode::Tool(open_docs) = &docs.children[0] else {
        panic!("expected a tool in Docs");
    };
    assert_eq!(open_docs.label(), "Open__Docs");
    assert_eq!(accels.entry_count(), 2);
}

#[test]
fn rust_tools_follow_the_document() {
    let dir = tempfile::tempdir().unwrap();
    let library = load(&write_library(&dir));
    let mut accels = AccelMap::new();
    let mut menu = ToolMenu::new(MENU_PATH);
    let clippy = library.find_by_path("Rust/Clippy").unwrap();
    let visible = |menu: &ToolMenu| menu.tree().unwrap().find_tool(clippy).unwrap().visible;

    menu.update(&library, &mut accels, Some(&DocumentContext::at("/work/src/lib.rs")));
    assert!(visible(&menu));

    menu.filter(&library, Some(&DocumentContext::at("sftp://host/src/lib.rs")));
    assert!(!visible(&menu), "local-only tool on a remote file");

    menu.filter(&library, Some(&DocumentContext::at("/work/README.md")));
    assert!(!visible(&menu), "rust tool on a markdown file");
}

#[test]
fn rebinding_persists_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_library(&dir);
    let mut library = load(&path);
    let mut tools = ExternalTools::new(Capture::default(), OutputPanel::default());
    let mut accels = AccelMap::new();
    tools.attach(&library, &mut accels, None);

    let clippy = ExternalTools::find_tool(&library, "Rust/Clippy").unwrap();
    let updates = tools
        .accel_changed(
            &mut library,
            &mut accels,
            &accel_path(clippy),
            Some("<Alt>F1".parse().unwrap()),
        )
        .unwrap();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].persist_error.is_none());

    let reloaded = load(&path);
    let clippy = reloaded.find_by_path("Rust/Clippy").unwrap();
    let tool = reloaded.tool(clippy).unwrap();
    assert_eq!(tool.shortcut, Some("<Alt>F1".parse().unwrap()));
    assert_eq!(tool.comment, "Lint the crate");
    assert_eq!(tool.applicability, Applicability::Local);
    assert!(tool.languages.contains("rust"));
    assert!(reloaded.find_by_path("Rust/Docs/Open_Docs").is_some());
}

#[test]
fn added_tool_saved_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_library(&dir);
    let mut library = load(&path);
    library
        .add_tool(&["Rust"], Tool::new("Test", "cargo test"))
        .unwrap();
    library.save().unwrap();

    let reloaded = load(&path);
    let rust = &reloaded.root().subdirs()[0];
    let names: Vec<&str> = rust
        .tools()
        .iter()
        .map(|id| reloaded.tool(*id).unwrap().name.as_str())
        .collect();
    assert_eq!(names, ["Clippy", "Test"]);
}

#[test]
fn unknown_key_in_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tools.toml");
    std::fs::write(&path, "[[tool]]\nname = \"x\"\ncommand = \"y\"\ncolour = \"red\"\n").unwrap();
    let err = ToolLibrary::load(Box::new(FileStore::new(&path))).unwrap_err();
    assert!(matches!(err, ExtoolsError::LibraryLoad(_)));
}

#[test]
fn missing_file_is_empty_library() {
    let dir = tempfile::tempdir().unwrap();
    let library = load(&dir.path().join("absent.toml"));
    assert!(library.is_empty());
}

#[tokio::test]
async fn run_tool_in_document_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_library(&dir);
    let doc = dir.path().join("notes.txt");
    std::fs::write(&doc, "a\nb\nc\n").unwrap();

    let library = load(&path);
    let mut tools = ExternalTools::new(Capture::default(), OutputPanel::default());
    let word_count = ExternalTools::find_tool(&library, "Word Count").unwrap();
    let ctx = DocumentContext::at(&doc.display().to_string());

    let mut stdout = Vec::new();
    let exit = tools
        .activate(&library, word_count, &ctx, Some("one\ntwo\n".to_owned()), |event| {
            if let CaptureEvent::Stdout(line) = event {
                stdout.push(line.trim().to_owned());
            }
        })
        .await
        .unwrap();

    assert!(exit.success());
    assert_eq!(stdout, ["2"]);
}
