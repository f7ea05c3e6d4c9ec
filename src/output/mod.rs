pub mod lookup;

use std::collections::VecDeque;

use crate::capture::{CaptureEvent, ExitInfo};
pub use lookup::{FileLookup, FileReference, file_references};

pub const PANEL_NAME: &str = "Shell Output";
pub const PANEL_ICON: &str = "system-run";
pub const DEFAULT_SCROLLBACK: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
    /// Lines written by the runner itself (start and exit notices).
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: Stream,
    pub text: String,
}

/// Scrollback view that captured tool output is written into. The host embeds
/// it in its panel area under [`PANEL_NAME`] with [`PANEL_ICON`].
#[derive(Debug, Clone)]
pub struct OutputPanel {
    lines: VecDeque<OutputLine>,
    scrollback: usize,
    dropped: usize,
}

impl Default for OutputPanel {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLLBACK)
    }
}

impl OutputPanel {
    /// Keeps at most `scrollback` lines; older ones are dropped.
    pub fn new(scrollback: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            scrollback: scrollback.max(1),
            dropped: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        PANEL_NAME
    }

    pub fn icon(&self) -> &'static str {
        PANEL_ICON
    }

    pub fn write(&mut self, stream: Stream, text: &str) {
        if text.is_empty() {
            self.push(stream, "");
        }
        for line in text.lines() {
            self.push(stream, line);
        }
    }

    fn push(&mut self, stream: Stream, line: &str) {
        if self.lines.len() == self.scrollback {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(OutputLine {
            stream,
            text: line.to_owned(),
        });
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.dropped = 0;
    }

    pub fn lines(&self) -> impl Iterator<Item = &OutputLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines discarded since the last clear.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn started(&mut self, tool: &str) {
        self.write(Stream::Status, &format!("Running tool: {tool}"));
    }

    pub fn finished(&mut self, exit: &ExitInfo) {
        self.write(Stream::Status, &exit.to_string());
    }

    pub fn record(&mut self, event: &CaptureEvent) {
        match event {
            CaptureEvent::Stdout(line) => self.write(Stream::Stdout, line),
            CaptureEvent::Stderr(line) => self.write(Stream::Stderr, line),
            CaptureEvent::Exited(exit) => self.finished(exit),
        }
    }

    /// `file:line` references found in the panel, newest line last.
    pub fn file_references(&self) -> Vec<(usize, FileReference)> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.stream != Stream::Status)
            .flat_map(|(i, l)| file_references(&l.text).into_iter().map(move |r| (i, r)))
            .collect()
    }
}
