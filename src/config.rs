//! Configuration types for listwarden
//!
//! The configuration file is TOML and is loaded once at startup. It declares
//! the admin servers, the lists on them, and the internal-domain patterns
//! shared by all lists:
//!
//! ```toml
//! internal_domains = ["example\\.com"]
//!
//! [listservers.main]
//! url = "https://lists.example.com/mailman"
//!
//! [[lists]]
//! server = "main"
//! name = "engineering"
//! alias = "eng"
//! pass = "secret"
//! comment = "Engineering"
//! archivetype = "mdir"
//! archiveurl = "/var/lib/mailman/archives/private/engineering"
//! ```
//!
//! Run-wide switches from the command line (dry run, no-verify, annotation)
//! live in [`RunOptions`], which is immutable once the run starts.

use crate::classifier::DomainClassifier;
use crate::error::{Error, Result};
use crate::types::{ArchiveLocation, ListBackend};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Regex patterns identifying internal subscriber domains (shared by all lists)
    #[serde(default)]
    pub internal_domains: Vec<String>,

    /// Append-only action log (default: "list.log")
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Admin servers keyed by the name lists refer to
    #[serde(default)]
    pub listservers: HashMap<String, ListServerConfig>,

    /// Lists, in reporting order
    #[serde(default)]
    pub lists: Vec<ListConfig>,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry configuration for idempotent page loads
    #[serde(default)]
    pub retry: RetryConfig,

    /// Maximum number of lists queried at the same time for statistics (default: 4)
    #[serde(default = "default_max_concurrent_lists")]
    pub max_concurrent_lists: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            internal_domains: vec![],
            log_file: default_log_file(),
            listservers: HashMap::new(),
            lists: vec![],
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            max_concurrent_lists: default_max_concurrent_lists(),
        }
    }
}

/// Admin server declaration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListServerConfig {
    /// Base URL below which `admin/` and `roster/` pages live
    pub url: String,
}

/// One list on one server
#[derive(Clone, Serialize, Deserialize)]
pub struct ListConfig {
    /// Name of the server entry in `listservers`
    pub server: String,

    /// List name on the remote service
    pub name: String,

    /// Short operator-chosen identifier
    pub alias: String,

    /// Admin password
    pub pass: String,

    /// Free-text description
    #[serde(default)]
    pub comment: String,

    /// Archive type (`mdir` for a directory of message files)
    #[serde(default)]
    pub archivetype: Option<String>,

    /// Archive root directory
    #[serde(default)]
    pub archiveurl: Option<PathBuf>,
}

impl std::fmt::Debug for ListConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListConfig")
            .field("server", &self.server)
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("pass", &"<redacted>")
            .field("comment", &self.comment)
            .field("archivetype", &self.archivetype)
            .field("archiveurl", &self.archiveurl)
            .finish()
    }
}

/// HTTP client settings shared by all sessions
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Skip TLS certificate validation (default: false)
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            accept_invalid_certs: false,
            user_agent: default_user_agent(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A configuration that never retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Run-wide options taken from the command line
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Suppress every remote mutation; reads still happen
    pub dry_run: bool,
    /// Debug-level console logging
    pub verbose: bool,
    /// Skip the post-mutation roster refresh and verification
    pub no_verify: bool,
    /// Free-text annotation attached to logged actions
    pub message: Option<String>,
}

impl RunOptions {
    /// Annotation text, empty when none was given
    pub fn annotation(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }

    /// Whether a mutation should be followed by a roster refresh
    pub fn refresh_after_mutation(&self) -> bool {
        !self.dry_run && !self.no_verify
    }
}

impl Config {
    /// Load and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("could not read {}: {}", path.display(), e),
            key: None,
        })?;
        Self::from_toml_str(&text).map_err(|e| match e {
            Error::Config { message, key } => Error::Config {
                message: format!("{}: {}", path.display(), message),
                key,
            },
            other => other,
        })
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::Config {
            message: format!("could not parse configuration: {}", e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-references that serde cannot express
    ///
    /// - every list names a declared server
    /// - aliases are unique
    /// - every internal-domain pattern compiles
    pub fn validate(&self) -> Result<()> {
        let mut aliases = HashSet::new();
        for (i, list) in self.lists.iter().enumerate() {
            if !self.listservers.contains_key(&list.server) {
                return Err(Error::config(
                    format!("lists[{}].server", i),
                    format!(
                        "list '{}' refers to undeclared server '{}'",
                        list.name, list.server
                    ),
                ));
            }
            if list.alias.trim().is_empty() {
                return Err(Error::config(
                    format!("lists[{}].alias", i),
                    format!("list '{}' has an empty alias", list.name),
                ));
            }
            if !aliases.insert(list.alias.as_str()) {
                return Err(Error::config(
                    format!("lists[{}].alias", i),
                    format!("alias '{}' is used by more than one list", list.alias),
                ));
            }
        }

        DomainClassifier::new(self.internal_domains.as_slice())?;

        if self.max_concurrent_lists == 0 {
            return Err(Error::config(
                "max_concurrent_lists",
                "must be at least 1",
            ));
        }

        Ok(())
    }

    /// Backends in declaration order
    pub fn backends(&self) -> Result<Vec<ListBackend>> {
        self.lists
            .iter()
            .enumerate()
            .map(|(i, list)| {
                let server = self.listservers.get(&list.server).ok_or_else(|| {
                    Error::config(
                        format!("lists[{}].server", i),
                        format!("undeclared server '{}'", list.server),
                    )
                })?;

                let archive = match (&list.archivetype, &list.archiveurl) {
                    (Some(kind), Some(path)) => Some(ArchiveLocation {
                        kind: kind.clone(),
                        path: path.clone(),
                    }),
                    _ => None,
                };

                Ok(ListBackend {
                    server_url: server.url.clone(),
                    list_name: list.name.clone(),
                    alias: list.alias.clone(),
                    password: list.pass.clone(),
                    comment: list.comment.clone(),
                    archive,
                    internal_domains: self.internal_domains.clone(),
                })
            })
            .collect()
    }
}

// Default value functions
fn default_log_file() -> PathBuf {
    PathBuf::from("list.log")
}

fn default_max_concurrent_lists() -> usize {
    4
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("listwarden/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
