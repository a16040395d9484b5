//! Alias registry and bulk dispatch across lists
//!
//! The directory is built once at startup from the configured lists and is not
//! modified afterwards. Bulk operations walk the selected lists one after the
//! other; a failure on one list is recorded in its [`Dispatch`] and the next
//! list is processed normally.

use crate::config::{Config, RunOptions};
use crate::error::Result;
use crate::session::{ClientSettings, SessionClient};
use crate::types::{Classification, ListBackend, MemberChange, MessageKind, Outcome, Roster};
use serde::Serialize;
use tracing::{debug, error, warn};

/// Result of a bulk operation on one list
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Dispatch {
    /// Alias of the list
    pub alias: String,
    /// What happened
    pub outcome: Outcome,
    /// Error message when the outcome is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Registry of session clients keyed by alias
#[derive(Debug)]
pub struct ListDirectory {
    settings: ClientSettings,
    clients: Vec<SessionClient>,
}

impl ListDirectory {
    /// Empty directory whose sessions will use `settings`
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            clients: Vec::new(),
        }
    }

    /// Register every configured list in declaration order
    pub fn from_config(config: &Config, options: RunOptions) -> Result<Self> {
        let mut directory = Self::new(ClientSettings::from_config(config, options));
        for backend in config.backends()? {
            directory.register(backend)?;
        }
        Ok(directory)
    }

    /// Add a list
    ///
    /// Aliases are not checked for uniqueness here; configuration validation
    /// rejects duplicates. If the same alias is registered twice, lookups find
    /// the first registration.
    pub fn register(&mut self, backend: ListBackend) -> Result<()> {
        debug!(alias = %backend.alias, list = %backend.list_name, "Registering list");
        let client = SessionClient::new(backend, &self.settings)?;
        self.clients.push(client);
        Ok(())
    }

    /// Run-wide options shared by every session
    pub fn options(&self) -> &RunOptions {
        &self.settings.options
    }

    /// Number of registered lists
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no list is registered
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Aliases in registration order
    pub fn aliases(&self) -> Vec<&str> {
        self.clients.iter().map(|c| c.alias()).collect()
    }

    /// Session of the list registered under `alias`
    pub fn resolve(&self, alias: &str) -> Option<&SessionClient> {
        self.clients.iter().find(|c| c.alias() == alias)
    }

    /// Sessions for a selection, in selection order
    ///
    /// An empty selection means every list in registration order. Unknown
    /// aliases are skipped with a warning.
    pub fn select<S: AsRef<str>>(&self, aliases: &[S]) -> Vec<&SessionClient> {
        if aliases.is_empty() {
            return self.clients.iter().collect();
        }
        aliases
            .iter()
            .filter_map(|alias| {
                let alias = alias.as_ref();
                let client = self.resolve(alias);
                if client.is_none() {
                    warn!(alias = %alias, "Unknown list alias, skipping");
                }
                client
            })
            .collect()
    }

    /// Subscribe `addresses` on every selected list
    pub async fn bulk_subscribe<S: AsRef<str>>(
        &self,
        aliases: &[S],
        addresses: &[String],
    ) -> Vec<Dispatch> {
        self.bulk_change(MemberChange::Subscribe, aliases, addresses).await
    }

    /// Unsubscribe `addresses` from every selected list
    pub async fn bulk_unsubscribe<S: AsRef<str>>(
        &self,
        aliases: &[S],
        addresses: &[String],
    ) -> Vec<Dispatch> {
        self.bulk_change(MemberChange::Unsubscribe, aliases, addresses).await
    }

    async fn bulk_change<S: AsRef<str>>(
        &self,
        change: MemberChange,
        aliases: &[S],
        addresses: &[String],
    ) -> Vec<Dispatch> {
        let mut dispatches = Vec::new();

        for client in self.select(aliases) {
            let result = match change {
                MemberChange::Subscribe => client.subscribe(addresses).await,
                MemberChange::Unsubscribe => client.unsubscribe(addresses).await,
            };

            let dispatch = match result {
                Ok(outcome) => {
                    if outcome != Outcome::Failed && self.options().refresh_after_mutation() {
                        client.fetch_roster().await;
                    }
                    Dispatch {
                        alias: client.alias().to_string(),
                        outcome,
                        error: None,
                    }
                }
                Err(e) => {
                    if e.is_backend_failure() {
                        warn!(
                            alias = %client.alias(),
                            error = %e,
                            "Could not {} addresses",
                            change.verb()
                        );
                    } else {
                        error!(
                            alias = %client.alias(),
                            error = %e,
                            "Unexpected error, could not {} addresses",
                            change.verb()
                        );
                    }
                    Dispatch {
                        alias: client.alias().to_string(),
                        outcome: Outcome::Failed,
                        error: Some(e.to_string()),
                    }
                }
            };
            dispatches.push(dispatch);
        }

        dispatches
    }

    /// Whether `address` is on the list's roster
    ///
    /// Uses the cached roster (loaded on first use); callers refresh it after
    /// mutations. Unknown aliases and unreachable lists report `false`.
    pub async fn is_member(&self, alias: &str, address: &str) -> bool {
        let Some(client) = self.resolve(alias) else {
            return false;
        };
        if let Err(e) = client.connect().await {
            debug!(alias = %alias, error = %e, "Membership check without session");
            return false;
        }
        client.roster().await.contains(address)
    }

    /// Roster of `alias` including every mutation of this run
    ///
    /// `None` for unknown aliases and for lists whose roster cannot be
    /// loaded after a change; membership on such lists is unknown.
    pub async fn confirmed_roster(&self, alias: &str) -> Option<Roster> {
        self.resolve(alias)?.confirmed_roster().await
    }

    /// Freshly fetched subscribers of `alias` classified as external
    pub async fn external_subscribers_of(&self, alias: &str) -> Vec<String> {
        let Some(client) = self.resolve(alias) else {
            warn!(alias = %alias, "Unknown list alias, skipping");
            return Vec::new();
        };
        client
            .fetch_roster()
            .await
            .iter()
            .filter(|a| client.classify(a) == Classification::External)
            .map(str::to_string)
            .collect()
    }

    /// Template text of `alias`, `None` for unknown aliases
    pub async fn message(&self, alias: &str, kind: MessageKind) -> Option<Result<String>> {
        match self.resolve(alias) {
            Some(client) => Some(client.message(kind).await),
            None => {
                warn!(alias = %alias, "Unknown list alias, skipping");
                None
            }
        }
    }

    /// Replace a template of `alias`, `None` for unknown aliases
    pub async fn set_message(
        &self,
        alias: &str,
        kind: MessageKind,
        text: &str,
    ) -> Option<Result<Outcome>> {
        match self.resolve(alias) {
            Some(client) => Some(client.set_message(kind, text).await),
            None => {
                warn!(alias = %alias, "Unknown list alias, skipping");
                None
            }
        }
    }

    /// Welcome template of `alias`
    pub async fn welcome_message(&self, alias: &str) -> Option<Result<String>> {
        self.message(alias, MessageKind::Welcome).await
    }

    /// Goodbye template of `alias`
    pub async fn goodbye_message(&self, alias: &str) -> Option<Result<String>> {
        self.message(alias, MessageKind::Goodbye).await
    }

    /// Replace the welcome template of `alias`
    pub async fn set_welcome_message(&self, alias: &str, text: &str) -> Option<Result<Outcome>> {
        self.set_message(alias, MessageKind::Welcome, text).await
    }

    /// Replace the goodbye template of `alias`
    pub async fn set_goodbye_message(&self, alias: &str, text: &str) -> Option<Result<Outcome>> {
        self.set_message(alias, MessageKind::Goodbye, text).await
    }
}
