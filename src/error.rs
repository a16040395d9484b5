//! Error types for listwarden
//!
//! This module provides the error taxonomy shared by every component:
//! - Fatal errors (configuration, bulk input, missing selection) that abort a run
//! - Per-backend errors (authentication, fetch, transport, form schema) that are
//!   reported and recovered by the bulk operations
//! - Archive errors for lists without a usable mail-directory archive
//!
//! [`Error::exit_code`] maps errors onto the process exit status used by the
//! `listwarden` binary.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for listwarden operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for listwarden
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "lists[2].server")
        key: Option<String>,
    },

    /// Bulk input file could not be read or parsed
    #[error("could not read from {}: {message}", path.display())]
    Input {
        /// The file that was given as subscriber list
        path: PathBuf,
        /// What went wrong while reading it
        message: String,
    },

    /// The remote service rejected the list credential
    #[error("authentication failed for list {alias}: {reason}")]
    Auth {
        /// Alias of the list whose login failed
        alias: String,
        /// Reason reported by the login exchange
        reason: String,
    },

    /// A page was retrieved but could not be used (bad status, unparseable body)
    #[error("fetch failed for list {alias}: {reason}")]
    Fetch {
        /// Alias of the list being scraped
        alias: String,
        /// What went wrong
        reason: String,
    },

    /// Network-level failure talking to the admin interface
    #[error("transport error for list {alias}: {reason}")]
    Transport {
        /// Alias of the list being contacted
        alias: String,
        /// Underlying transport error message
        reason: String,
        /// Whether the failure looks transient (timeout, refused connection, 5xx)
        retryable: bool,
    },

    /// An admin page did not match the expected form schema
    #[error("form error: {0}")]
    Form(#[from] FormError),

    /// Archive mining was requested for a list without a usable archive
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// An operation that needs `-l ALIAS,...` was started without one
    #[error("no list selected, select one or more lists with \"-l ALIAS1,ALIAS2,...\"")]
    NoListSelected,

    /// The interactive message editor failed
    #[error("editor error: {0}")]
    Editor(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Form schema errors raised at the session boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    /// The page contained no `<form>` element
    #[error("no form found on {page}")]
    MissingForm {
        /// URL of the page that was scraped
        page: String,
    },

    /// The form exists but lacks the field the operation writes to
    #[error("form on {page} has no field named {field}")]
    MissingField {
        /// URL of the page that was scraped
        page: String,
        /// The field identifier the operation expected
        field: String,
    },

    /// The form's action attribute could not be resolved to a URL
    #[error("form on {page} has unusable action {action}: {reason}")]
    InvalidAction {
        /// URL of the page that was scraped
        page: String,
        /// The raw action attribute
        action: String,
        /// Why it could not be resolved
        reason: String,
    },
}

/// Archive mining errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The list has no archive, or one in a format other than a mail directory
    #[error("\"{list}\" has no mdir archive")]
    NotMaildir {
        /// Name of the list on the remote service
        list: String,
        /// The configured archive type, if any
        kind: Option<String>,
    },

    /// The archive root could not be walked
    #[error("archive {} is not readable: {reason}", path.display())]
    Unreadable {
        /// The configured archive path
        path: PathBuf,
        /// Why it could not be read
        reason: String,
    },
}

impl Error {
    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Classify a reqwest failure against the list it was talking to
    pub fn transport(alias: &str, err: &reqwest::Error) -> Self {
        let retryable = err.is_timeout()
            || err.is_connect()
            || err.status().is_some_and(|s| s.is_server_error());
        Error::Transport {
            alias: alias.to_string(),
            reason: err.to_string(),
            retryable,
        }
    }

    /// Process exit status for this error when it ends a run
    ///
    /// - `2` configuration could not be loaded
    /// - `3` bulk input file unreadable
    /// - `4` operation requires a list selection
    /// - `1` anything else
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config { .. } => 2,
            Error::Input { .. } => 3,
            Error::NoListSelected => 4,
            _ => 1,
        }
    }

    /// Whether this error belongs to a single backend and must not abort a bulk run
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Error::Auth { .. } | Error::Fetch { .. } | Error::Transport { .. } | Error::Form(_)
        )
    }
}
