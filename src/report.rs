//! Console reporting
//!
//! Plain-text renderings of statistics, listings and archive reports, and the
//! [`Reporter`] that prints per-subscriber outcomes while recording them in the
//! [`ActionLog`].

use crate::action_log::{ActionEntry, ActionLog};
use crate::error::Result;
use crate::stats::ListSection;
use crate::types::{ArchiveReport, FrequencyTable, StatRow};
use serde::Serialize;
use std::fmt::Write as _;
use std::io::Write;

const COLUMN: usize = 12;
const WIDE_COLUMN: usize = 20;
const LABEL_WIDTH: usize = 46;

/// Right-aligned status label followed by its target
pub fn status_line(label: &str, target: &str) -> String {
    format!("{:>width$} {}", label, target, width = LABEL_WIDTH)
}

/// Fixed-width statistics table
///
/// Split counts that were not computed are shown as `-`, which keeps them
/// apart from a real zero.
pub fn render_stat_table(rows: &[StatRow]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut out = String::from("Statistics:\n");
    let _ = writeln!(
        out,
        "{:>w2$} |{:>w$}|{:>w$}|{:>w$}|{:>w$}|{:>w$}|{:>w2$}",
        "List",
        "Alias",
        "Total",
        "int.",
        "ext.",
        "Domains ext.",
        "Comment",
        w = COLUMN,
        w2 = WIDE_COLUMN
    );
    out.push_str(&"-".repeat(WIDE_COLUMN + 1));
    for _ in 0..5 {
        out.push('+');
        out.push_str(&"-".repeat(COLUMN));
    }
    out.push('+');
    out.push_str(&"-".repeat(WIDE_COLUMN));
    out.push('\n');

    let count = |value: Option<usize>| value.map_or_else(|| "-".to_string(), |v| v.to_string());
    for row in rows {
        let (total, comment) = match &row.error {
            None => (row.total.to_string(), row.comment.as_str()),
            Some(_) => ("-".to_string(), "(unavailable)"),
        };
        let _ = writeln!(
            out,
            "{:>w2$} |{:>w$}|{:>w$}|{:>w$}|{:>w$}|{:>w$}|{:>w2$}",
            row.list_name,
            row.alias,
            total,
            count(row.internal),
            count(row.external),
            count(row.external_domains),
            comment,
            w = COLUMN,
            w2 = WIDE_COLUMN
        );
    }
    out
}

/// Per-subscriber listing, one block per list followed by a blank line
pub fn render_listing(sections: &[ListSection]) -> String {
    let mut out = String::new();
    for section in sections {
        if !section.classified {
            let _ = writeln!(
                out,
                "All subscribers {}, {}",
                section.list_name, section.comment
            );
        }
        for line in &section.lines {
            let _ = writeln!(
                out,
                "{}, {}, {}",
                line.kind.tag(),
                section.list_name,
                line.value
            );
        }
        out.push('\n');
    }
    out
}

fn render_frequencies(out: &mut String, label: &str, table: &FrequencyTable) {
    let _ = writeln!(out, "  * Mails by {} senders ({}):", label, table.total());
    for entry in table.entries() {
        let _ = writeln!(out, "     {:>3} {}", entry.count, entry.address);
    }
}

/// Sender statistics of one archive
pub fn render_archive_report(report: &ArchiveReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Processing {} mails...", report.files);
    let _ = writeln!(out, "Extended stats for \"{}\":", report.list_name);
    render_frequencies(&mut out, "internal", &report.internal);
    out.push('\n');
    render_frequencies(&mut out, "external", &report.external);
    if report.skipped > 0 {
        let _ = writeln!(out, "  ({} files without a sender were skipped)", report.skipped);
    }
    out
}

/// Pretty-printed JSON for `--json`
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Prints results to the console and records them in the action log
pub struct Reporter {
    out: Box<dyn Write + Send>,
    log: ActionLog,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter").field("log", &self.log).finish()
    }
}

impl Reporter {
    /// Reporter writing to `out`
    pub fn new(out: impl Write + Send + 'static, log: ActionLog) -> Self {
        Self {
            out: Box::new(out),
            log,
        }
    }

    /// Reporter writing to standard output
    pub fn stdout(log: ActionLog) -> Self {
        Self::new(std::io::stdout(), log)
    }

    /// The action log entries are recorded in
    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// Print text as-is
    pub fn text(&mut self, text: &str) -> Result<()> {
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    /// Print one line
    pub fn line(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{}", text)?;
        Ok(())
    }

    /// Print a status line for `entry.address` and record the entry
    pub fn outcome(&mut self, label: &str, entry: &ActionEntry<'_>) -> Result<()> {
        self.line(&status_line(label, entry.address))?;
        self.log.record(entry);
        Ok(())
    }
}
