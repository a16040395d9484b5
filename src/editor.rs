//! Interactive editing of message templates

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use tokio::process::Command;

/// Lets the operator change a piece of text
#[async_trait]
pub trait MessageEditor: Send + Sync {
    /// Return the edited version of `current`
    async fn edit(&self, current: &str) -> Result<String>;
}

/// Runs an external editor on a temporary file
///
/// The temporary file is removed when editing ends, whether the editor
/// succeeded or not.
#[derive(Clone, Debug)]
pub struct ExternalEditor {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalEditor {
    /// Editor `program` started with `args` before the file name
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Editor from `$EDITOR` (which may carry arguments), falling back to `vi`
    pub fn from_env() -> Self {
        std::env::var("EDITOR")
            .ok()
            .and_then(|command| Self::from_command(&command))
            .unwrap_or_else(|| {
                let vi = which::which("vi").unwrap_or_else(|_| PathBuf::from("vi"));
                Self::new(vi, vec![])
            })
    }

    fn from_command(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next()?;
        let program = which::which(program).unwrap_or_else(|_| PathBuf::from(program));
        Some(Self::new(program, parts.map(str::to_string).collect()))
    }

    /// Program that will be started
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

#[async_trait]
impl MessageEditor for ExternalEditor {
    async fn edit(&self, current: &str) -> Result<String> {
        let mut file = tempfile::Builder::new().prefix("msg_edit").tempfile()?;
        file.write_all(current.as_bytes())?;
        file.flush()?;

        tracing::debug!(
            editor = %self.program.display(),
            path = %file.path().display(),
            "Starting editor"
        );

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(file.path())
            .status()
            .await
            .map_err(|e| {
                Error::Editor(format!(
                    "Failed to execute {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !status.success() {
            return Err(Error::Editor(format!(
                "{} exited with {}",
                self.program.display(),
                status
            )));
        }

        // Read by path: editors may replace the file instead of rewriting it
        tokio::fs::read_to_string(file.path())
            .await
            .map_err(|e| Error::Editor(format!("Failed to read edited text: {}", e)))
    }
}
