//! Core types for listwarden

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Archive type identifier of a directory-of-messages archive (one file per mail)
pub const MAILDIR_ARCHIVE: &str = "mdir";

/// One mailing list hosted on one remote administration service
///
/// Built once from configuration and never modified afterwards; a
/// [`SessionClient`](crate::session::SessionClient) owns its backend and only
/// hands out shared references. The `Debug` output never shows the password.
#[derive(Clone, PartialEq, Eq)]
pub struct ListBackend {
    /// Base URL of the admin service (e.g. `https://lists.example.com/mailman`)
    pub server_url: String,
    /// List name on the remote service
    pub list_name: String,
    /// Operator-chosen short identifier, unique within a directory
    pub alias: String,
    /// Admin password of the list
    pub password: String,
    /// Free-text description shown in reports
    pub comment: String,
    /// Stored message archive, if configured
    pub archive: Option<ArchiveLocation>,
    /// Internal-domain regex patterns, tested in this order
    pub internal_domains: Vec<String>,
}

impl ListBackend {
    /// Server base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    /// Entry page of the list's admin interface (also the login page)
    pub fn admin_url(&self) -> String {
        format!("{}/admin/{}", self.base_url(), self.list_name)
    }

    /// Public roster page listing one hyperlink per subscriber
    pub fn roster_url(&self) -> String {
        format!("{}/roster/{}", self.base_url(), self.list_name)
    }
}

impl std::fmt::Debug for ListBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListBackend")
            .field("server_url", &self.server_url)
            .field("list_name", &self.list_name)
            .field("alias", &self.alias)
            .field("password", &"<redacted>")
            .field("comment", &self.comment)
            .field("archive", &self.archive)
            .field("internal_domains", &self.internal_domains)
            .finish()
    }
}

/// Where and how a list's messages are stored
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveLocation {
    /// Archive type as configured (`mdir` is the only minable one)
    pub kind: String,
    /// Root directory of the archive
    pub path: PathBuf,
}

impl ArchiveLocation {
    /// Whether this archive is a directory with one file per message
    pub fn is_maildir(&self) -> bool {
        self.kind == MAILDIR_ARCHIVE
    }
}

/// Why a session ended up in [`SessionState::Failed`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The remote service rejected the credential
    Auth,
    /// The service could not be reached or returned something unusable
    Transport,
}

/// Connection state of one backend's session
///
/// Transitions: `Disconnected → Connected` on the first successful login,
/// `Disconnected → Failed` on an authentication or transport error. There is
/// no transition out of `Failed` within a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No login attempted yet
    #[default]
    Disconnected,
    /// Logged in; the session cookie is held by the client
    Connected,
    /// Login failed; all further operations fail without network access
    Failed {
        /// Class of the failure
        kind: FailureKind,
        /// Message of the underlying error
        reason: String,
    },
}

impl SessionState {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connected => "connected",
            SessionState::Failed { .. } => "failed",
        }
    }
}

/// Canonical subscriber set of one list: lower-cased, deduplicated, sorted
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Roster {
    addresses: Vec<String>,
}

impl Roster {
    /// Build a roster from raw addresses, canonicalizing them
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut addresses: Vec<String> = addresses
            .into_iter()
            .map(|a| a.as_ref().trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        addresses.sort();
        addresses.dedup();
        Self { addresses }
    }

    /// Sorted addresses
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Membership test, case-insensitive
    pub fn contains(&self, address: &str) -> bool {
        let needle = address.trim().to_lowercase();
        self.addresses.binary_search(&needle).is_ok()
    }

    /// Number of subscribers
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Whether the list has no subscribers
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Iterate over the sorted addresses
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.addresses.iter().map(String::as_str)
    }
}

/// Internal/external classification of a subscriber address
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Matches one of the configured internal-domain patterns
    Internal,
    /// Matches none of them
    External,
}

/// Result of one subscriber-level or template-level action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The action was performed (and verified, where verification applies)
    Succeeded,
    /// The action failed or could not be verified
    Failed,
    /// Dry run: the remote mutation was deliberately not sent
    Skipped,
}

impl Outcome {
    /// Map a verification check onto an outcome
    pub fn from_check(ok: bool) -> Self {
        if ok {
            Outcome::Succeeded
        } else {
            Outcome::Failed
        }
    }

    /// Whether the action did what was asked
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::Failed => write!(f, "failed"),
            Outcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// Roster mutation kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberChange {
    /// Add addresses to the list
    Subscribe,
    /// Remove addresses from the list
    Unsubscribe,
}

impl MemberChange {
    /// Path of the mass-change page below the list's admin URL
    pub fn page_path(&self) -> &'static str {
        match self {
            MemberChange::Subscribe => "members/add",
            MemberChange::Unsubscribe => "members/remove",
        }
    }

    /// Verb used in logs
    pub fn verb(&self) -> &'static str {
        match self {
            MemberChange::Subscribe => "subscribe",
            MemberChange::Unsubscribe => "unsubscribe",
        }
    }
}

/// Free-text message templates of a list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Sent to new subscribers
    Welcome,
    /// Sent to leaving subscribers
    Goodbye,
}

impl MessageKind {
    /// Path (with query) of the page carrying the template form
    pub fn page_path(&self) -> &'static str {
        match self {
            MessageKind::Welcome => "?VARHELP=general/welcome_msg",
            MessageKind::Goodbye => "?VARHELP=general/goodbye_msg",
        }
    }

    /// Label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::Welcome => "Welcome message",
            MessageKind::Goodbye => "Goodbye message",
        }
    }
}

/// One line of the statistics table
///
/// The split counts are `None` for lists without internal-domain patterns,
/// which keeps "not classified" distinct from "zero subscribers".
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatRow {
    /// List name on the remote service
    pub list_name: String,
    /// Alias of the list
    pub alias: String,
    /// Number of subscribers
    pub total: usize,
    /// Subscribers matching an internal-domain pattern
    pub internal: Option<usize>,
    /// Subscribers matching none
    pub external: Option<usize>,
    /// Distinct domains among external subscribers
    pub external_domains: Option<usize>,
    /// Comment from configuration
    pub comment: String,
    /// Set when the roster could not be retrieved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Message count of one sender
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SenderCount {
    /// Sender address
    pub address: String,
    /// Messages sent
    pub count: usize,
}

/// Sender frequency table, sorted by descending count
///
/// Senders with equal counts keep the order in which they were first seen.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FrequencyTable {
    entries: Vec<SenderCount>,
}

impl FrequencyTable {
    /// Entries in report order
    pub fn entries(&self) -> &[SenderCount] {
        &self.entries
    }

    /// Sum of all counts
    pub fn total(&self) -> usize {
        self.entries.iter().map(|e| e.count).sum()
    }

    /// Number of distinct senders
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no sender was counted
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accumulates sender counts in first-seen order
#[derive(Debug, Default)]
pub struct FrequencyTally {
    entries: Vec<SenderCount>,
    index: HashMap<String, usize>,
}

impl FrequencyTally {
    /// Count one message from `address`
    pub fn add(&mut self, address: &str) {
        match self.index.get(address) {
            Some(&i) => self.entries[i].count += 1,
            None => {
                self.index.insert(address.to_string(), self.entries.len());
                self.entries.push(SenderCount {
                    address: address.to_string(),
                    count: 1,
                });
            }
        }
    }

    /// Sort by descending count; `sort_by` is stable so ties stay in first-seen order
    pub fn into_table(self) -> FrequencyTable {
        let mut entries = self.entries;
        entries.sort_by(|a, b| b.count.cmp(&a.count));
        FrequencyTable { entries }
    }
}

/// Result of mining one list archive
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArchiveReport {
    /// List name on the remote service
    pub list_name: String,
    /// Alias of the list
    pub alias: String,
    /// Regular files found below the archive root
    pub files: usize,
    /// Files that were not a message with a usable From address
    pub skipped: usize,
    /// Messages by internal senders
    pub internal: FrequencyTable,
    /// Messages by external senders
    pub external: FrequencyTable,
}

impl ArchiveReport {
    /// Messages by internal senders
    pub fn internal_messages(&self) -> usize {
        self.internal.total()
    }

    /// Messages by external senders
    pub fn external_messages(&self) -> usize {
        self.external.total()
    }
}
