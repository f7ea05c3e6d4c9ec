use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use extools::accel::{AccelMap, Accelerator};
use extools::capture::{Capture, CaptureEvent, ExitInfo};
use extools::config::Config;
use extools::context::DocumentContext;
use extools::library::storage::FileStore;
use extools::library::ToolLibrary;
use extools::menu::MenuNode;
use extools::output::{FileLookup, OutputPanel};
use extools::window::ExternalTools;

#[derive(Parser, Debug)]
#[command(name = "extools")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Tool library file (overrides EXTOOLS_LIBRARY)
    #[arg(long, global = true)]
    library: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the tool menu as it would appear for a document
    List {
        #[command(flatten)]
        document: DocumentArgs,

        /// Treat the document as remote
        #[arg(long)]
        remote: bool,

        /// Print JSON instead of a tree
        #[arg(long)]
        json: bool,
    },
    /// Run a tool by its path, e.g. "Python/Lint"
    Run {
        tool: String,

        #[command(flatten)]
        document: DocumentArgs,

        /// Pass this process's stdin to the tool
        #[arg(long)]
        stdin: bool,
    },
    /// Change a tool's shortcut ("" clears it)
    Bind { tool: String, accelerator: String },
    /// Load the library and report shortcut conflicts
    Check,
}

#[derive(clap::Args, Debug)]
struct DocumentArgs {
    /// Active document; untitled when omitted
    #[arg(short, long)]
    file: Option<String>,

    /// Language id, overriding detection from the file name
    #[arg(short, long)]
    language: Option<String>,
}

impl DocumentArgs {
    fn context(&self) -> DocumentContext {
        let ctx = match &self.file {
            Some(file) => DocumentContext::at(&absolute(file)),
            None => DocumentContext::untitled(),
        };
        match &self.language {
            Some(language) => ctx.with_language(Some(language)),
            None => ctx,
        }
    }
}

fn absolute(file: &str) -> String {
    if file.contains("://") {
        return file.to_owned();
    }
    std::path::absolute(file)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| file.to_owned())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("invalid environment configuration")?;
    if let Some(library) = cli.library {
        config.library_path = library;
    }

    let mut library = ToolLibrary::load(Box::new(FileStore::new(&config.library_path)))
        .with_context(|| format!("failed to load {}", config.library_path.display()))?;
    let mut tools = ExternalTools::new(
        Capture::new(&config.shell),
        OutputPanel::new(config.scrollback),
    )
    .with_timeout(config.timeout);
    let mut accels = AccelMap::new();

    match cli.command {
        Commands::List {
            document,
            remote,
            json,
        } => {
            let mut ctx = document.context();
            ctx.is_remote |= remote;
            tools.attach(&library, &mut accels, Some(&ctx));
            list(&tools, &library, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            tool,
            document,
            stdin,
        } => {
            run(
                &mut tools,
                &library,
                &mut accels,
                &tool,
                &document.context(),
                stdin,
            )
            .await
        }
        Commands::Bind { tool, accelerator } => {
            let accelerator = Accelerator::parse_optional(&accelerator)?;
            tools.attach(&library, &mut accels, None);
            let update = tools.rebind(&mut library, &mut accels, &tool, accelerator)?;
            if let Some(e) = update.persist_error {
                bail!("shortcut changed but not saved: {e}");
            }
            match update.shortcut {
                Some(accel) => println!("{tool}: {accel}"),
                None => println!("{tool}: no shortcut"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check => {
            let conflicts = tools.attach(&library, &mut accels, None);
            println!(
                "{}: {} tools, {} shortcuts bound",
                config.library_path.display(),
                library.len(),
                tools.menu().listener_count()
            );
            for conflict in &conflicts {
                println!("conflict: {conflict}");
            }
            Ok(if conflicts.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

#[derive(Serialize)]
struct ListedTool {
    path: String,
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    shortcut: Option<String>,
    applicability: String,
    languages: Vec<String>,
    visible: bool,
}

fn list(tools: &ExternalTools, library: &ToolLibrary, json: bool) -> Result<()> {
    let tree = tools.menu().tree().context("menu was not built")?;

    if json {
        let listed: Vec<ListedTool> = tree
            .tool_nodes()
            .into_iter()
            .filter_map(|node| {
                let tool = library.tool(node.tool)?;
                Some(ListedTool {
                    path: library.path_of(node.tool)?,
                    command: tool.command.clone(),
                    shortcut: tool.shortcut.as_ref().map(ToString::to_string),
                    applicability: tool.applicability.to_string(),
                    languages: tool.languages.iter().cloned().collect(),
                    visible: node.visible,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    print_nodes(library, tree.nodes(), 0);
    if tree.nodes().is_empty() {
        println!("(no tools)");
    }
    Ok(())
}

fn print_nodes(library: &ToolLibrary, nodes: &[MenuNode], depth: usize) {
    let indent = "  ".repeat(depth);
    for node in nodes {
        match node {
            MenuNode::Directory(dir) => {
                println!("{indent}{}/", dir.name);
                print_nodes(library, &dir.children, depth + 1);
            }
            MenuNode::Tool(leaf) => {
                let shortcut = library
                    .tool(leaf.tool)
                    .and_then(|t| t.shortcut.as_ref())
                    .map(|s| format!("  [{s}]"))
                    .unwrap_or_default();
                let hidden = if leaf.visible { "" } else { "  (hidden)" };
                println!("{indent}{}{shortcut}{hidden}", leaf.name);
            }
        }
    }
}

async fn run(
    tools: &mut ExternalTools,
    library: &ToolLibrary,
    accels: &mut AccelMap,
    path: &str,
    ctx: &DocumentContext,
    pass_stdin: bool,
) -> Result<ExitCode> {
    tools.attach(library, accels, Some(ctx));
    let id = ExternalTools::find_tool(library, path)?;

    let input = if pass_stdin {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("failed to read stdin")?;
        Some(buf)
    } else {
        None
    };

    let exit = tools
        .activate(library, id, ctx, input, |event| match event {
            CaptureEvent::Stdout(line) => println!("{line}"),
            CaptureEvent::Stderr(line) => eprintln!("{line}"),
            CaptureEvent::Exited(exit) if !exit.success() => eprintln!("{exit}"),
            CaptureEvent::Exited(_) => {}
        })
        .await?;
    std::io::stdout().flush().ok();

    report_references(tools, ctx);
    Ok(exit_code(&exit))
}

/// List `file:line` references from the run that point at existing files.
fn report_references(tools: &ExternalTools, ctx: &DocumentContext) {
    let mut lookup = FileLookup::new();
    if let Some(dir) = ctx.local_path().as_deref().and_then(Path::parent) {
        lookup = lookup.with_root(dir);
    }
    if let Ok(cwd) = std::env::current_dir() {
        lookup = lookup.with_root(cwd);
    }

    let mut resolved: Vec<String> = tools
        .panel()
        .file_references()
        .into_iter()
        .filter_map(|(_, reference)| {
            let path = lookup.resolve(&reference)?;
            Some(match reference.column {
                Some(column) => format!("{}:{}:{column}", path.display(), reference.line),
                None => format!("{}:{}", path.display(), reference.line),
            })
        })
        .collect();
    resolved.dedup();
    for location in resolved {
        eprintln!("  -> {location}");
    }
}

fn exit_code(exit: &ExitInfo) -> ExitCode {
    if exit.timed_out {
        return ExitCode::from(124);
    }
    match exit.code {
        Some(0) => ExitCode::SUCCESS,
        Some(code) => ExitCode::from(u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(1)),
        None => ExitCode::from(137),
    }
}
