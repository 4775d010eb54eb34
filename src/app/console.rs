use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const DEFAULT_CONSOLE_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleKind {
    Command,
    Response,
    Error,
    Success,
    Info,
}

impl ConsoleKind {
    fn label(self) -> &'static str {
        match self {
            ConsoleKind::Command => "command",
            ConsoleKind::Response => "response",
            ConsoleKind::Error => "error",
            ConsoleKind::Success => "success",
            ConsoleKind::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsoleEntry {
    pub kind: ConsoleKind,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// What a line typed into the debug console turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    Clear,
    Unsupported(String),
    Run(Vec<String>),
}

pub fn prepare_console_command(input: &str) -> ConsoleAction {
    let trimmed = input.trim();
    let command = trimmed
        .strip_prefix("adb ")
        .map(str::trim_start)
        .unwrap_or(trimmed);
    if command == "adb" || command.is_empty() {
        return ConsoleAction::Unsupported("Enter an adb command, e.g. devices".to_string());
    }
    if command.eq_ignore_ascii_case("clear") || command.eq_ignore_ascii_case("cls") {
        return ConsoleAction::Clear;
    }
    let args: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    if args.len() == 1 && args[0] == "shell" {
        return ConsoleAction::Unsupported(
            "Interactive shell is not supported, use shell <command>".to_string(),
        );
    }
    ConsoleAction::Run(args)
}

/// adb prints `adb: usage...` style errors whose useful part is on the
/// second line; single-line errors are shown as is.
pub fn error_display_line(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    lines
        .get(1)
        .or_else(|| lines.first())
        .map(|line| line.to_string())
        .unwrap_or_default()
}

/// One line per entry: UTC time, kind, then the text. Multi-line text is
/// indented under its entry.
pub fn render_transcript(entries: &[ConsoleEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let mut lines = entry.text.trim_end().lines();
        out.push_str(&format!(
            "[{}] {:<8} {}\n",
            entry.at.format("%H:%M:%S"),
            entry.kind.label(),
            lines.next().unwrap_or_default()
        ));
        for line in lines {
            out.push_str(&format!("{:20}{line}\n", ""));
        }
    }
    out
}

/// Bounded transcript; the oldest entries fall off first.
#[derive(Debug)]
pub struct ConsoleLog {
    entries: VecDeque<ConsoleEntry>,
    capacity: usize,
}

impl Default for ConsoleLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CONSOLE_LINES)
    }
}

impl ConsoleLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_CONSOLE_LINES)),
            capacity,
        }
    }

    pub fn push(&mut self, kind: ConsoleKind, text: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ConsoleEntry {
            kind,
            text: text.into(),
            at: Utc::now(),
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<ConsoleEntry> {
        self.entries.iter().cloned().collect()
    }
}
