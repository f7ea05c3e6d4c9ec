use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::context::DocumentContext;
use crate::error::ExtoolsError;
use crate::library::Tool;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub timed_out: bool,
}

impl ExitInfo {
    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.timed_out, self.code) {
            (true, _) => f.write_str("Timed out."),
            (false, Some(0)) => f.write_str("Done."),
            (false, Some(code)) => write!(f, "Exited: {code}"),
            (false, None) => f.write_str("Killed."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Stdout(String),
    Stderr(String),
    /// Always the last event of a run.
    Exited(ExitInfo),
}

/// Everything needed to run one command.
#[derive(Debug, Clone, Default)]
pub struct CaptureRequest {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

impl CaptureRequest {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_owned(),
            ..Self::default()
        }
    }

    /// Request for `tool` against the document in `ctx`: runs in the
    /// document's directory when it is local, with the document described in
    /// `EXTOOLS_CURRENT_DOCUMENT_*` variables.
    pub fn for_tool(tool: &Tool, ctx: &DocumentContext) -> Self {
        let mut request = Self::new(&tool.command);
        request.env = document_env(ctx);
        request.cwd = ctx
            .local_path()
            .and_then(|p| p.parent().map(|d| d.to_path_buf()))
            .filter(|d| d.is_dir());
        request
    }

    pub fn with_stdin(mut self, stdin: Option<String>) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

fn document_env(ctx: &DocumentContext) -> Vec<(String, String)> {
    let mut env = vec![(
        "EXTOOLS_CURRENT_DOCUMENT_REMOTE".to_owned(),
        if ctx.is_remote { "1" } else { "0" }.to_owned(),
    )];
    if let Some(location) = &ctx.location {
        env.push(("EXTOOLS_CURRENT_DOCUMENT_URI".to_owned(), location.clone()));
    }
    if let Some(language) = &ctx.language_id {
        env.push(("EXTOOLS_CURRENT_DOCUMENT_LANGUAGE".to_owned(), language.clone()));
    }
    if let Some(path) = ctx.local_path() {
        env.push((
            "EXTOOLS_CURRENT_DOCUMENT_PATH".to_owned(),
            path.display().to_string(),
        ));
        if let Some(name) = path.file_name() {
            env.push((
                "EXTOOLS_CURRENT_DOCUMENT_NAME".to_owned(),
                name.to_string_lossy().into_owned(),
            ));
        }
        if let Some(dir) = path.parent() {
            env.push((
                "EXTOOLS_CURRENT_DOCUMENT_DIR".to_owned(),
                dir.display().to_string(),
            ));
        }
    }
    env
}

/// Runs commands through a shell and streams their output.
#[derive(Debug, Clone)]
pub struct Capture {
    shell: String,
}

impl Default for Capture {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl Capture {
    pub fn new(shell: &str) -> Self {
        Self {
            shell: shell.to_owned(),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Start `request`. Output arrives line by line on the returned channel,
    /// followed by exactly one [`CaptureEvent::Exited`]. Must be called from
    /// within a tokio runtime.
    pub fn spawn(&self, request: CaptureRequest) -> Result<mpsc::Receiver<CaptureEvent>, ExtoolsError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&request.command)
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        debug!(shell = %self.shell, command = %request.command, "spawning tool");
        let mut child = cmd.spawn().map_err(|e| {
            ExtoolsError::ToolExecution(format!("cannot run '{}': {e}", request.command))
        })?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        if let (Some(mut stdin), Some(input)) = (child.stdin.take(), request.stdin) {
            tokio::spawn(async move {
                // A tool that exits without reading its input is not an error.
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!(error = %e, "tool did not consume stdin");
                }
            });
        }

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, tx.clone(), CaptureEvent::Stdout)));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, tx.clone(), CaptureEvent::Stderr)));

        // The deadline bounds the whole run, including draining output that
        // background children may keep open after the shell exits.
        let timeout = request.timeout;
        let deadline = timeout.map(|limit| Instant::now() + limit);
        let mut readers: Vec<JoinHandle<()>> = [stdout, stderr].into_iter().flatten().collect();

        tokio::spawn(async move {
            let waited = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, child.wait()).await.ok(),
                None => Some(child.wait().await),
            };

            let exit = match waited {
                Some(Ok(status)) => {
                    let drained = drain(&mut readers, deadline).await;
                    if !drained {
                        warn!(?timeout, "tool output still open at the deadline");
                        abort_all(&readers);
                    }
                    ExitInfo {
                        code: status.code(),
                        timed_out: !drained,
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "waiting for tool failed");
                    abort_all(&readers);
                    ExitInfo {
                        code: None,
                        timed_out: false,
                    }
                }
                None => {
                    warn!(?timeout, "tool timed out, killing it");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "cannot kill timed out tool");
                    }
                    // Grandchildren may still hold the pipes open.
                    abort_all(&readers);
                    ExitInfo {
                        code: None,
                        timed_out: true,
                    }
                }
            };

            debug!(code = ?exit.code, timed_out = exit.timed_out, "tool finished");
            let _ = tx.send(CaptureEvent::Exited(exit)).await;
        });

        Ok(rx)
    }

    /// Run to completion and collect everything.
    pub async fn run(&self, request: CaptureRequest) -> Result<CapturedOutput, ExtoolsError> {
        let mut events = self.spawn(request)?;
        let mut output = CapturedOutput::default();
        while let Some(event) = events.recv().await {
            match event {
                CaptureEvent::Stdout(line) => output.stdout.push(line),
                CaptureEvent::Stderr(line) => output.stderr.push(line),
                CaptureEvent::Exited(exit) => {
                    output.exit = Some(exit);
                    break;
                }
            }
        }
        Ok(output)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit: Option<ExitInfo>,
}

/// Wait for every reader to hit end of output. False if the deadline passed
/// first.
async fn drain(readers: &mut [JoinHandle<()>], deadline: Option<Instant>) -> bool {
    for reader in readers.iter_mut() {
        match deadline {
            Some(deadline) => {
                if tokio::time::timeout_at(deadline, reader).await.is_err() {
                    return false;
                }
            }
            None => {
                let _ = reader.await;
            }
        }
    }
    true
}

fn abort_all(readers: &[JoinHandle<()>]) {
    for reader in readers {
        reader.abort();
    }
}

async fn forward_lines<R>(
    reader: R,
    tx: mpsc::Sender<CaptureEvent>,
    wrap: fn(String) -> CaptureEvent,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(wrap(line)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "tool output stream closed");
                break;
            }
        }
    }
}
