//! # listwarden
//!
//! Roster administration for mailing lists that are only reachable through a
//! web admin interface (Mailman 2 style).
//!
//! ## Design Philosophy
//!
//! listwarden is designed to be:
//! - **Explicit about sessions** - every list has its own login state machine
//! - **Safe to rehearse** - a dry run logs in and reads, but never mutates
//! - **Verified** - every subscribe and unsubscribe is checked against a fresh roster
//! - **Tolerant** - one unreachable list never stops work on the others
//!
//! ## Quick Start
//!
//! ```no_run
//! use listwarden::{Config, ListDirectory, RunOptions};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file(Path::new("listwarden.toml"))?;
//!     let directory = ListDirectory::from_config(&config, RunOptions::default())?;
//!
//!     let new = vec!["alice@example.com".to_string()];
//!     for dispatch in directory.bulk_subscribe(&["eng"], &new).await {
//!         println!("{}: {}", dispatch.alias, dispatch.outcome);
//!     }
//!     println!("member: {}", directory.is_member("eng", "alice@example.com").await);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Append-only action log
pub mod action_log;
/// Sender statistics from list archives
pub mod archive;
/// Internal/external address classification
pub mod classifier;
/// Configuration types
pub mod config;
/// Alias registry and bulk dispatch
pub mod directory;
/// Interactive template editing
pub mod editor;
/// Error types
pub mod error;
/// Subscriber lists from arguments and files
pub mod input;
/// Console rendering
pub mod report;
/// Retry logic with exponential backoff
pub mod retry;
/// Admin interface sessions
pub mod session;
/// Roster statistics
pub mod stats;
/// Core types
pub mod types;
/// Post-mutation verification
pub mod verify;
/// Operator-facing flows
pub mod workflow;

// Re-export commonly used types
pub use action_log::{ActionEntry, ActionLog};
pub use archive::ArchiveMiner;
pub use classifier::DomainClassifier;
pub use config::{Config, RunOptions};
pub use directory::{Dispatch, ListDirectory};
pub use editor::{ExternalEditor, MessageEditor};
pub use error::{ArchiveError, Error, FormError, Result};
pub use report::Reporter;
pub use session::{ClientSettings, SessionClient};
pub use stats::StatisticsEngine;
pub use types::{
    ArchiveReport, Classification, ListBackend, MessageKind, Outcome, Roster, SessionState,
    StatRow,
};
pub use verify::{ReconciliationVerifier, Verification};
pub use workflow::{Confirm, Request, Workflow};
