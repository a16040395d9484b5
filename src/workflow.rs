//! Operator-facing flows
//!
//! A [`Request`] describes everything asked for on one command line. [`Workflow`]
//! runs the requested operations in a fixed order:
//!
//! 1. delete, delete-external
//! 2. edit goodbye message, edit welcome message
//! 3. statistics (ends the run)
//! 4. get goodbye message, get welcome message
//! 5. show (ends the run), archive statistics (ends the run)
//! 6. add
//! 7. log the annotation if no add verification carried it

use crate::action_log::ActionEntry;
use crate::archive::ArchiveMiner;
use crate::directory::{Dispatch, ListDirectory};
use crate::editor::{ExternalEditor, MessageEditor};
use crate::error::{Error, Result};
use crate::input::parse_subscriber_arg;
use crate::report::{self, Reporter};
use crate::stats::StatisticsEngine;
use crate::types::{MessageKind, Outcome};
use crate::verify::{Check, ReconciliationVerifier, Verification};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Asks the operator to confirm a destructive step
#[async_trait]
pub trait Confirm: Send + Sync {
    /// Whether the operator agreed to `question`, which has already been printed
    async fn confirm(&self, question: &str) -> Result<bool>;
}

/// Reads the answer from standard input; only `yes` confirms
#[derive(Clone, Copy, Debug, Default)]
pub struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, question: &str) -> Result<bool> {
        debug!(question = %question, "Waiting for confirmation");
        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .map_err(|e| Error::Other(format!("confirmation task failed: {}", e)))??;
        Ok(answer.trim() == "yes")
    }
}

/// Operations requested on one command line
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
    /// Selected aliases (`-l`)
    pub lists: Vec<String>,
    /// Addresses or file to subscribe (`-a`)
    pub add: Vec<String>,
    /// Addresses or file to unsubscribe (`-D`)
    pub delete: Vec<String>,
    /// Unsubscribe every external subscriber of the selected lists
    pub delete_external: bool,
    /// Edit the goodbye template
    pub edit_goodbye: bool,
    /// Edit the welcome template
    pub edit_welcome: bool,
    /// Print the goodbye template
    pub get_goodbye: bool,
    /// Print the welcome template
    pub get_welcome: bool,
    /// Print the statistics table
    pub stats: bool,
    /// Print every subscriber
    pub show: bool,
    /// Print sender statistics from the archives
    pub xstats: bool,
    /// Print reports as JSON
    pub json: bool,
}

/// Runs requests against a list directory
pub struct Workflow {
    directory: ListDirectory,
    reporter: Reporter,
    editor: Box<dyn MessageEditor>,
    confirm: Box<dyn Confirm>,
    concurrency: usize,
    annotation_logged: bool,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("directory", &self.directory)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl Workflow {
    /// Workflow using `$EDITOR` and standard input for confirmations
    pub fn new(directory: ListDirectory, reporter: Reporter) -> Self {
        Self {
            directory,
            reporter,
            editor: Box::new(ExternalEditor::from_env()),
            confirm: Box::new(StdinConfirm),
            concurrency: 1,
            annotation_logged: false,
        }
    }

    /// Replace the message editor
    pub fn with_editor(mut self, editor: impl MessageEditor + 'static) -> Self {
        self.editor = Box::new(editor);
        self
    }

    /// Replace the confirmation prompt
    pub fn with_confirm(mut self, confirm: impl Confirm + 'static) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    /// Query up to `concurrency` lists at once for reports
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The directory operations run against
    pub fn directory(&self) -> &ListDirectory {
        &self.directory
    }

    /// Run every operation in `request`
    ///
    /// # Errors
    /// Fails with [`Error::NoListSelected`] when an operation needs a selection
    /// and none was given, and with [`Error::Input`] for unreadable subscriber
    /// files. Failures of single lists are reported and do not end the run.
    pub async fn run(&mut self, request: &Request) -> Result<()> {
        let lists = &request.lists;

        if !request.delete.is_empty() {
            self.delete(lists, &request.delete).await?;
        }
        if request.delete_external {
            self.delete_external(lists).await?;
        }
        if request.edit_goodbye {
            self.edit_message(lists, MessageKind::Goodbye).await?;
        }
        if request.edit_welcome {
            self.edit_message(lists, MessageKind::Welcome).await?;
        }
        if request.stats {
            return self.statistics(lists, request.json).await;
        }
        if request.get_goodbye {
            self.print_message(lists, MessageKind::Goodbye).await?;
        }
        if request.get_welcome {
            self.print_message(lists, MessageKind::Welcome).await?;
        }
        if request.show {
            return self.show(lists, request.json).await;
        }
        if request.xstats {
            return self.archive_stats(lists, request.json).await;
        }
        if !request.add.is_empty() {
            self.add(lists, &request.add).await?;
        }
        self.log_annotation(lists);
        Ok(())
    }

    /// Aliases of the selection that resolve to a registered list
    fn selected(&self, lists: &[String]) -> Result<Vec<String>> {
        if lists.is_empty() {
            return Err(Error::NoListSelected);
        }
        Ok(self
            .directory
            .select(lists)
            .into_iter()
            .map(|client| client.alias().to_string())
            .collect())
    }

    fn annotation(&self) -> String {
        self.directory.options().annotation().to_string()
    }

    fn verifies(&self) -> bool {
        !self.directory.options().no_verify
    }

    fn report(&mut self, verification: &Verification, annotation: &str) -> Result<()> {
        self.reporter
            .outcome(&verification.label(), &verification.entry(annotation))
    }

    fn report_unreachable(&mut self, dispatches: &[Dispatch]) -> Result<()> {
        for dispatch in dispatches {
            if let Some(error) = &dispatch.error {
                self.reporter.line(&report::status_line(
                    &format!("List not changed ({}):", dispatch.alias),
                    error,
                ))?;
            }
        }
        Ok(())
    }

    /// Unsubscribe addresses from the selected lists and verify the result
    pub async fn delete(&mut self, lists: &[String], tokens: &[String]) -> Result<()> {
        let aliases = self.selected(lists)?;
        let addresses = parse_subscriber_arg(tokens)?;
        self.unsubscribe_and_verify(&aliases, &addresses).await
    }

    async fn unsubscribe_and_verify(
        &mut self,
        aliases: &[String],
        addresses: &[String],
    ) -> Result<()> {
        // An empty selection would address every list
        if aliases.is_empty() {
            return Ok(());
        }
        let dispatches = self.directory.bulk_unsubscribe(aliases, addresses).await;
        if !self.verifies() {
            return self.report_unreachable(&dispatches);
        }

        let verifications = ReconciliationVerifier::new(&self.directory)
            .verify_unsubscribed(&dispatches, addresses)
            .await;
        let annotation = self.annotation();
        for verification in &verifications {
            self.report(verification, &annotation)?;
        }
        Ok(())
    }

    /// Unsubscribe the external subscribers of each selected list after confirmation
    pub async fn delete_external(&mut self, lists: &[String]) -> Result<()> {
        for alias in self.selected(lists)? {
            let externals = self.directory.external_subscribers_of(&alias).await;
            if externals.is_empty() {
                debug!(alias = %alias, "No external subscribers");
                continue;
            }

            let question = format!(
                "Really delete {} subscriptions from {} (yes/no)?",
                externals.len(),
                alias
            );
            self.reporter.line(&question)?;
            if !self.confirm.confirm(&question).await? {
                debug!(alias = %alias, "Deletion of external subscribers declined");
                continue;
            }

            self.unsubscribe_and_verify(std::slice::from_ref(&alias), &externals)
                .await?;
        }
        Ok(())
    }

    /// Edit a template of each selected list
    pub async fn edit_message(&mut self, lists: &[String], kind: MessageKind) -> Result<()> {
        for alias in self.selected(lists)? {
            let current = match self.directory.message(&alias, kind).await {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    self.reporter.line(&format!(
                        "Could not read {} of {}: {}",
                        kind.label(),
                        alias,
                        e
                    ))?;
                    continue;
                }
                None => continue,
            };

            let edited = self.editor.edit(&current).await?;
            if edited == current {
                self.reporter.line("Message not changed!")?;
                continue;
            }

            let outcome = match self.directory.set_message(&alias, kind, &edited).await {
                Some(Ok(outcome)) => outcome,
                Some(Err(e)) => {
                    warn!(alias = %alias, error = %e, "Could not change {}", kind.label());
                    Outcome::Failed
                }
                None => continue,
            };

            let verification = match outcome {
                Outcome::Succeeded if self.verifies() => {
                    ReconciliationVerifier::new(&self.directory)
                        .verify_message(&alias, kind, &edited)
                        .await
                }
                Outcome::Succeeded => continue,
                outcome => Verification {
                    alias: alias.clone(),
                    target: kind.label().to_string(),
                    check: Check::Message,
                    outcome,
                },
            };
            let annotation = self.annotation();
            self.report(&verification, &annotation)?;
        }
        Ok(())
    }

    /// Print a template of each selected list
    pub async fn print_message(&mut self, lists: &[String], kind: MessageKind) -> Result<()> {
        for alias in self.selected(lists)? {
            match self.directory.message(&alias, kind).await {
                Some(Ok(text)) => self.reporter.line(&text)?,
                Some(Err(e)) => self.reporter.line(&format!(
                    "Could not read {} of {}: {}",
                    kind.label(),
                    alias,
                    e
                ))?,
                None => {}
            }
        }
        Ok(())
    }

    /// Print the statistics table (all lists when none is selected)
    pub async fn statistics(&mut self, lists: &[String], json: bool) -> Result<()> {
        let rows = StatisticsEngine::new(&self.directory, self.concurrency)
            .rows(lists)
            .await;
        if json {
            self.reporter.line(&report::to_json(&rows)?)
        } else {
            self.reporter.text(&report::render_stat_table(&rows))
        }
    }

    /// Print every subscriber (all lists when none is selected)
    pub async fn show(&mut self, lists: &[String], json: bool) -> Result<()> {
        let sections = StatisticsEngine::new(&self.directory, self.concurrency)
            .listing(lists)
            .await;
        if json {
            self.reporter.line(&report::to_json(&sections)?)
        } else {
            self.reporter.text(&report::render_listing(&sections))
        }
    }

    /// Print sender statistics of each selected list's archive
    pub async fn archive_stats(&mut self, lists: &[String], json: bool) -> Result<()> {
        let mut reports = Vec::new();
        for alias in self.selected(lists)? {
            let Some(client) = self.directory.resolve(&alias) else {
                continue;
            };
            match ArchiveMiner::mine_list(client).await {
                Ok(report) if json => reports.push(report),
                Ok(report) => self.reporter.text(&report::render_archive_report(&report))?,
                Err(e) => {
                    warn!(alias = %alias, error = %e, "No archive statistics");
                    self.reporter
                        .line(&format!("No archive statistics for {}: {}", alias, e))?;
                }
            }
        }
        if json {
            self.reporter.line(&report::to_json(&reports)?)?;
        }
        Ok(())
    }

    /// Subscribe addresses on the selected lists and verify the result
    ///
    /// The annotation is attached to the first verification line only.
    pub async fn add(&mut self, lists: &[String], tokens: &[String]) -> Result<()> {
        let aliases = self.selected(lists)?;
        let addresses = parse_subscriber_arg(tokens)?;
        if aliases.is_empty() {
            return Ok(());
        }
        let dispatches = self.directory.bulk_subscribe(&aliases, &addresses).await;

        let verifications = if self.verifies() {
            ReconciliationVerifier::new(&self.directory)
                .verify_subscribed(&dispatches, &addresses)
                .await
        } else {
            self.report_unreachable(&dispatches)?;
            Vec::new()
        };
        let mut per_list = verifications.chunks(addresses.len().max(1));

        for dispatch in &dispatches {
            if dispatch.outcome == Outcome::Skipped {
                self.reporter.line(&format!(
                    "Dry run: Skipped subscribing {} new subscribers to {}.",
                    addresses.len(),
                    dispatch.alias
                ))?;
            }
            for verification in per_list.next().unwrap_or_default() {
                let annotation = if self.annotation_logged {
                    String::new()
                } else {
                    self.annotation_logged = true;
                    self.annotation()
                };
                self.report(verification, &annotation)?;
            }
        }
        Ok(())
    }

    /// Log the annotation on its own unless an add verification carried it
    pub fn log_annotation(&mut self, lists: &[String]) {
        let annotation = self.annotation();
        if self.annotation_logged || annotation.is_empty() {
            return;
        }
        let aliases = lists.join(",");
        self.reporter.log().record(&ActionEntry {
            action: "Message",
            alias: &aliases,
            annotation: &annotation,
            ..ActionEntry::default()
        });
        self.annotation_logged = true;
    }
}
