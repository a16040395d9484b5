//! Sender statistics from stored list archives
//!
//! Only directory archives holding one message per file (`mdir`) can be mined.
//! Every regular file below the archive root is parsed as a single message and
//! its first `From` address is counted as internal or external.

use crate::classifier::DomainClassifier;
use crate::error::{ArchiveError, Error, Result};
use crate::session::SessionClient;
use crate::types::{ArchiveReport, Classification, FrequencyTally};
use mailparse::{MailAddr, MailHeaderMap, parse_mail};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// First `From` address of a raw message, lower-cased
pub fn sender_of(raw: &[u8]) -> Option<String> {
    let parsed = parse_mail(raw).ok()?;
    let from = parsed.headers.get_first_value("From")?;
    let addrs = mailparse::addrparse(from.trim()).ok()?;

    let addr = match addrs.iter().next()? {
        MailAddr::Single(info) => info.addr.clone(),
        MailAddr::Group(group) => group.addrs.first()?.addr.clone(),
    };
    let addr = addr.trim().to_lowercase();
    addr.contains('@').then_some(addr)
}

/// Tabulates archive senders with one list's internal-domain patterns
#[derive(Clone, Debug)]
pub struct ArchiveMiner {
    classifier: DomainClassifier,
}

impl ArchiveMiner {
    /// Miner classifying senders with `classifier`
    pub fn new(classifier: DomainClassifier) -> Self {
        Self { classifier }
    }

    /// Walk `root` and count senders
    ///
    /// Files are visited in file-name order so that ties in the frequency
    /// tables come out the same on every run.
    pub fn mine(
        &self,
        list_name: &str,
        alias: &str,
        root: &Path,
    ) -> std::result::Result<ArchiveReport, ArchiveError> {
        if !root.is_dir() {
            return Err(ArchiveError::Unreadable {
                path: root.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }

        let mut files = 0;
        let mut skipped = 0;
        let mut internal = FrequencyTally::default();
        let mut external = FrequencyTally::default();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable archive entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            files += 1;

            let sender = std::fs::read(entry.path())
                .map_err(|e| e.to_string())
                .and_then(|raw| sender_of(&raw).ok_or_else(|| "no From address".to_string()));

            match sender {
                Ok(sender) => match self.classifier.classify(&sender) {
                    Classification::Internal => internal.add(&sender),
                    Classification::External => external.add(&sender),
                },
                Err(reason) => {
                    debug!(path = %entry.path().display(), reason = %reason, "Skipping archive file");
                    skipped += 1;
                }
            }
        }

        let report = ArchiveReport {
            list_name: list_name.to_string(),
            alias: alias.to_string(),
            files,
            skipped,
            internal: internal.into_table(),
            external: external.into_table(),
        };
        info!(
            alias = %alias,
            files = report.files,
            internal = report.internal_messages(),
            external = report.external_messages(),
            "Archive mined"
        );
        Ok(report)
    }

    /// Mine the archive configured for `client`'s list
    ///
    /// # Errors
    /// Returns [`ArchiveError::NotMaildir`] when the list has no archive or one
    /// of another type; nothing is read in that case.
    pub async fn mine_list(client: &SessionClient) -> Result<ArchiveReport> {
        let backend = client.backend();
        let location = match &backend.archive {
            Some(location) if location.is_maildir() => location.clone(),
            other => {
                return Err(ArchiveError::NotMaildir {
                    list: backend.list_name.clone(),
                    kind: other.as_ref().map(|l| l.kind.clone()),
                }
                .into());
            }
        };

        let miner = ArchiveMiner::new(client.classifier().clone());
        let list_name = backend.list_name.clone();
        let alias = backend.alias.clone();

        let report = tokio::task::spawn_blocking(move || {
            miner.mine(&list_name, &alias, &location.path)
        })
        .await
        .map_err(|e| Error::Other(format!("archive task failed: {}", e)))??;

        Ok(report)
    }
}
