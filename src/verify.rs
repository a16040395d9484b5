//! Post-mutation verification
//!
//! After a bulk subscribe or unsubscribe the directory refreshes the affected
//! rosters; the verifier then checks every address against them and produces
//! one [`Verification`] per list and address. Lists whose mutation failed, or
//! whose roster cannot be loaded afterwards, are not checked: their addresses
//! are reported as failed directly, so a list that could not be read never
//! looks like a successful deletion.

use crate::action_log::ActionEntry;
use crate::directory::{Dispatch, ListDirectory};
use crate::types::{MessageKind, Outcome};
use serde::Serialize;

/// What was verified
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Check {
    /// The address should now be on the roster
    Subscribed,
    /// The address should now be off the roster
    Unsubscribed,
    /// The template should now hold the submitted text
    Message,
}

/// Verified result for one address (or template) on one list
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Verification {
    /// Alias of the list
    pub alias: String,
    /// Address, or the template name for message checks
    pub target: String,
    /// What was checked
    pub check: Check,
    /// Result
    pub outcome: Outcome,
}

impl Verification {
    /// Console label printed before the target
    pub fn label(&self) -> String {
        let text = match (self.check, self.outcome) {
            (Check::Subscribed, Outcome::Succeeded) => "Mailinglist verified",
            (Check::Subscribed, Outcome::Failed) => "Mailinglist error",
            (Check::Subscribed, Outcome::Skipped) => "Dry run, not subscribed",
            (Check::Unsubscribed, Outcome::Succeeded) => "List subscription deleted",
            (Check::Unsubscribed, Outcome::Failed) => "List deletion failed",
            (Check::Unsubscribed, Outcome::Skipped) => "Dry run, not deleted",
            (Check::Message, Outcome::Succeeded) => "Changing text succeeded",
            (Check::Message, Outcome::Failed) => "Changing text failed",
            (Check::Message, Outcome::Skipped) => "Dry run, text not changed",
        };
        format!("{} ({}):", text, self.alias)
    }

    /// Action name recorded in the log
    pub fn action(&self) -> &'static str {
        match (self.check, self.outcome) {
            (Check::Subscribed, Outcome::Succeeded) => "Verified list subscription",
            (Check::Subscribed, Outcome::Failed) => "List subscription failed",
            (Check::Subscribed, Outcome::Skipped) => "Skipped list subscription",
            (Check::Unsubscribed, Outcome::Succeeded) => "List subscription deleted",
            (Check::Unsubscribed, Outcome::Failed) => "List deletion failed",
            (Check::Unsubscribed, Outcome::Skipped) => "Skipped list deletion",
            (Check::Message, _) => "Changing text",
        }
    }

    /// Log entry for this result
    pub fn entry<'a>(&'a self, annotation: &'a str) -> ActionEntry<'a> {
        ActionEntry {
            action: self.action(),
            alias: &self.alias,
            address: &self.target,
            annotation,
            outcome: Some(self.outcome),
        }
    }
}

/// Checks mutations against refreshed rosters
#[derive(Debug)]
pub struct ReconciliationVerifier<'a> {
    directory: &'a ListDirectory,
}

impl<'a> ReconciliationVerifier<'a> {
    /// Verifier reading rosters through `directory`
    pub fn new(directory: &'a ListDirectory) -> Self {
        Self { directory }
    }

    /// Every address should now be subscribed on every dispatched list
    pub async fn verify_subscribed(
        &self,
        dispatches: &[Dispatch],
        addresses: &[String],
    ) -> Vec<Verification> {
        self.verify(Check::Subscribed, dispatches, addresses).await
    }

    /// Every address should now be gone from every dispatched list
    pub async fn verify_unsubscribed(
        &self,
        dispatches: &[Dispatch],
        addresses: &[String],
    ) -> Vec<Verification> {
        self.verify(Check::Unsubscribed, dispatches, addresses).await
    }

    async fn verify(
        &self,
        check: Check,
        dispatches: &[Dispatch],
        addresses: &[String],
    ) -> Vec<Verification> {
        let mut results = Vec::with_capacity(dispatches.len() * addresses.len());

        for dispatch in dispatches {
            let roster = match dispatch.outcome {
                Outcome::Succeeded => self.directory.confirmed_roster(&dispatch.alias).await,
                _ => None,
            };
            for address in addresses {
                let outcome = match (dispatch.outcome, &roster) {
                    (Outcome::Skipped, _) => Outcome::Skipped,
                    (Outcome::Succeeded, Some(roster)) => {
                        let member = roster.contains(address);
                        Outcome::from_check(match check {
                            Check::Unsubscribed => !member,
                            _ => member,
                        })
                    }
                    _ => Outcome::Failed,
                };
                results.push(Verification {
                    alias: dispatch.alias.clone(),
                    target: address.clone(),
                    check,
                    outcome,
                });
            }
        }

        results
    }

    /// The template of `alias` should now read `expected`
    pub async fn verify_message(
        &self,
        alias: &str,
        kind: MessageKind,
        expected: &str,
    ) -> Verification {
        let outcome = match self.directory.message(alias, kind).await {
            Some(Ok(text)) => Outcome::from_check(text == expected),
            Some(Err(e)) => {
                tracing::warn!(alias = %alias, error = %e, "Could not re-read {}", kind.label());
                Outcome::Failed
            }
            None => Outcome::Failed,
        };
        Verification {
            alias: alias.to_string(),
            target: kind.label().to_string(),
            check: Check::Message,
            outcome,
        }
    }
}
