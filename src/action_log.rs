//! Append-only action log
//!
//! Every subscriber-level and template-level result is written as one line to
//! a plain text file (by default `list.log` in the working directory):
//!
//! ```text
//! 2026-03-02T09:15:04+01:00 INFO Verified list subscription (eng): "a@x.com", "ticket 42" => succeeded
//! ```
//!
//! Each line is also emitted as a `tracing` event, so it shows up on the
//! console with `--verbose`.

use crate::error::Result;
use crate::types::Outcome;
use chrono::{Local, SecondsFormat};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// One logged event
#[derive(Clone, Copy, Debug, Default)]
pub struct ActionEntry<'a> {
    /// What was done, e.g. "Verified list subscription"
    pub action: &'a str,
    /// Alias (or comma-joined aliases) the action applies to
    pub alias: &'a str,
    /// Subscriber address or template name
    pub address: &'a str,
    /// Free-text annotation from `-m`
    pub annotation: &'a str,
    /// Result, if the entry records one
    pub outcome: Option<Outcome>,
}

impl ActionEntry<'_> {
    /// Failed outcomes are logged at warning level
    pub fn level(&self) -> &'static str {
        match self.outcome {
            Some(Outcome::Failed) => "WARN",
            _ => "INFO",
        }
    }
}

/// Message part of a log line, without timestamp and level
///
/// The ` (alias)` part is left out when the alias is empty; the address and
/// annotation are quoted, comma-joined and only present when non-empty.
pub fn format_entry(entry: &ActionEntry<'_>) -> String {
    let mut line = String::from(entry.action);
    if !entry.alias.is_empty() {
        line.push_str(&format!(" ({})", entry.alias));
    }
    line.push(':');

    let parts: Vec<String> = [entry.address, entry.annotation]
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| format!(" \"{}\"", p))
        .collect();
    line.push_str(&parts.join(","));

    if let Some(outcome) = entry.outcome {
        line.push_str(&format!(" => {}", outcome));
    }
    line
}

/// Line-oriented log file shared by all workflows
#[derive(Debug)]
pub struct ActionLog {
    file: Option<Mutex<File>>,
}

impl ActionLog {
    /// Open `path` for appending, creating it if needed
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Some(Mutex::new(file)),
        })
    }

    /// A log that only emits tracing events
    pub fn disabled() -> Self {
        Self { file: None }
    }

    /// Record one entry
    ///
    /// A failed write is reported through tracing and otherwise ignored; the
    /// log never aborts an operation.
    pub fn record(&self, entry: &ActionEntry<'_>) {
        let message = format_entry(entry);
        match entry.outcome {
            Some(Outcome::Failed) => tracing::warn!(alias = %entry.alias, "{}", message),
            _ => tracing::info!(alias = %entry.alias, "{}", message),
        }
        self.write_line(entry.level(), &message);
    }

    /// Record free text at info level
    pub fn note(&self, text: &str) {
        tracing::debug!("{}", text);
        self.write_line("INFO", text);
    }

    fn write_line(&self, level: &str, message: &str) {
        let Some(file) = &self.file else {
            return;
        };
        let timestamp = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
        let line = format!("{} {} {}\n", timestamp, level, message);

        let result = match file.lock() {
            Ok(mut file) => file.write_all(line.as_bytes()),
            Err(poisoned) => poisoned.into_inner().write_all(line.as_bytes()),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Could not write action log");
        }
    }
}
