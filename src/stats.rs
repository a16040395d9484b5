//! Subscriber statistics across lists
//!
//! Every figure is computed on demand from a freshly fetched roster; nothing
//! here is cached. Lists are queried with bounded concurrency, but results are
//! always returned in selection order.

use crate::classifier::DomainClassifier;
use crate::directory::ListDirectory;
use crate::session::SessionClient;
use crate::types::{ListBackend, Roster, StatRow};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::warn;

/// Tag of one line of the subscriber listing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ListingKind {
    /// Internal subscriber
    #[serde(rename = "subint")]
    InternalSubscriber,
    /// External subscriber
    #[serde(rename = "subext")]
    ExternalSubscriber,
    /// Domain of internal subscribers
    #[serde(rename = "domint")]
    InternalDomain,
    /// Domain of external subscribers
    #[serde(rename = "domext")]
    ExternalDomain,
    /// Subscriber of a list without internal-domain patterns
    #[serde(rename = "suball")]
    Subscriber,
}

impl ListingKind {
    /// Tag printed at the start of the line
    pub fn tag(&self) -> &'static str {
        match self {
            ListingKind::InternalSubscriber => "subint",
            ListingKind::ExternalSubscriber => "subext",
            ListingKind::InternalDomain => "domint",
            ListingKind::ExternalDomain => "domext",
            ListingKind::Subscriber => "suball",
        }
    }
}

/// One line of the subscriber listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListingLine {
    /// What `value` is
    pub kind: ListingKind,
    /// Address or domain
    pub value: String,
}

/// Subscriber listing of one list
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListSection {
    /// List name on the remote service
    pub list_name: String,
    /// Comment from configuration
    pub comment: String,
    /// Whether internal-domain patterns were applied
    pub classified: bool,
    /// Lines in report order
    pub lines: Vec<ListingLine>,
}

/// Computes statistics over the lists of a directory
#[derive(Debug)]
pub struct StatisticsEngine<'a> {
    directory: &'a ListDirectory,
    concurrency: usize,
}

impl<'a> StatisticsEngine<'a> {
    /// Engine querying at most `concurrency` lists at a time
    pub fn new(directory: &'a ListDirectory, concurrency: usize) -> Self {
        Self {
            directory,
            concurrency: concurrency.max(1),
        }
    }

    /// One row per selected list (all lists for an empty selection)
    pub async fn rows<S: AsRef<str>>(&self, aliases: &[S]) -> Vec<StatRow> {
        stream::iter(self.directory.select(aliases))
            .map(|client| async move { Self::collect_row(client).await })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn collect_row(client: &SessionClient) -> StatRow {
        match client.try_fetch_roster().await {
            Ok(roster) => stat_row(client.backend(), client.classifier(), &roster),
            Err(e) => {
                warn!(alias = %client.alias(), error = %e, "No statistics for list");
                let backend = client.backend();
                StatRow {
                    list_name: backend.list_name.clone(),
                    alias: backend.alias.clone(),
                    total: 0,
                    internal: None,
                    external: None,
                    external_domains: None,
                    comment: backend.comment.clone(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Per-subscriber listing of the selected lists
    pub async fn listing<S: AsRef<str>>(&self, aliases: &[S]) -> Vec<ListSection> {
        stream::iter(self.directory.select(aliases))
            .map(|client| async move {
                let roster = client.fetch_roster().await;
                list_section(client.backend(), client.classifier(), &roster)
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

/// Statistics row of one list for a given roster
///
/// Lists without internal-domain patterns report the total only.
pub fn stat_row(backend: &ListBackend, classifier: &DomainClassifier, roster: &Roster) -> StatRow {
    let mut row = StatRow {
        list_name: backend.list_name.clone(),
        alias: backend.alias.clone(),
        total: roster.len(),
        internal: None,
        external: None,
        external_domains: None,
        comment: backend.comment.clone(),
        error: None,
    };

    if classifier.is_configured() {
        let (internal, external) = classifier.split(roster.iter());
        row.internal = Some(internal.len());
        row.external = Some(external.len());
        row.external_domains = Some(crate::classifier::domains_of(external).len());
    }
    row
}

/// Listing section of one list for a given roster
pub fn list_section(
    backend: &ListBackend,
    classifier: &DomainClassifier,
    roster: &Roster,
) -> ListSection {
    let mut lines = Vec::new();
    let classified = classifier.is_configured();

    if classified {
        let (internal, external) = classifier.split(roster.iter());
        let line = |kind: ListingKind, value: &str| ListingLine {
            kind,
            value: value.to_string(),
        };
        lines.extend(
            internal
                .iter()
                .map(|&a| line(ListingKind::InternalSubscriber, a)),
        );
        lines.extend(
            external
                .iter()
                .map(|&a| line(ListingKind::ExternalSubscriber, a)),
        );
        lines.extend(
            crate::classifier::domains_of(internal)
                .iter()
                .map(|d| line(ListingKind::InternalDomain, d.as_str())),
        );
        lines.extend(
            crate::classifier::domains_of(external)
                .iter()
                .map(|d| line(ListingKind::ExternalDomain, d.as_str())),
        );
    } else {
        lines.extend(roster.iter().map(|a| ListingLine {
            kind: ListingKind::Subscriber,
            value: a.to_string(),
        }));
    }

    ListSection {
        list_name: backend.list_name.clone(),
        comment: backend.comment.clone(),
        classified,
        lines,
    }
}
