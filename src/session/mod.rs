//! Authenticated sessions against one list's web admin interface
//!
//! A [`SessionClient`] drives the admin pages of a single list the way a browser
//! would: it logs in once, keeps the session cookie, scrapes the roster and
//! submits the mass-change and template forms.
//!
//! The session moves through [`SessionState`] exactly once per run: the first
//! operation logs in, and a failed login is remembered so later calls fail
//! without contacting the server again.

mod forms;
mod roster;

pub use forms::{BoundForm, FormMethod, FormSchema, FormSubmission, HtmlForm};
pub use roster::{OBFUSCATION_TOKEN, decode_obfuscated, parse_roster};

use crate::classifier::{self, DomainClassifier};
use crate::config::{Config, HttpConfig, RetryConfig, RunOptions};
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::types::{
    Classification, FailureKind, ListBackend, MemberChange, MessageKind, Outcome, Roster,
    SessionState,
};
use reqwest::StatusCode;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Settings shared by every session of a run
#[derive(Clone, Debug, Default)]
pub struct ClientSettings {
    /// Run-wide switches (dry run, no-verify, annotation)
    pub options: Arc<RunOptions>,
    /// HTTP client settings
    pub http: HttpConfig,
    /// Retry policy for page loads
    pub retry: RetryConfig,
}

impl ClientSettings {
    /// Take the HTTP and retry sections from `config`
    pub fn from_config(config: &Config, options: RunOptions) -> Self {
        Self {
            options: Arc::new(options),
            http: config.http.clone(),
            retry: config.retry.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct RosterCache {
    roster: Roster,
    /// Set once the first fetch succeeded
    loaded: bool,
    /// Set by mutations, cleared by a successful fetch
    stale: bool,
}

/// A fetched admin page
#[derive(Debug)]
struct Page {
    /// Final URL after redirects; relative form actions resolve against it
    url: String,
    status: StatusCode,
    body: String,
}

/// One authenticated session against one remote list
pub struct SessionClient {
    backend: ListBackend,
    classifier: DomainClassifier,
    options: Arc<RunOptions>,
    retry: RetryConfig,
    http: reqwest::Client,
    state: Mutex<SessionState>,
    roster: RwLock<RosterCache>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("alias", &self.backend.alias)
            .field("list", &self.backend.list_name)
            .field("server", &self.backend.server_url)
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Create a disconnected session for `backend`
    ///
    /// # Errors
    /// Returns a configuration error if an internal-domain pattern does not
    /// compile, or an error if the HTTP client cannot be created.
    pub fn new(backend: ListBackend, settings: &ClientSettings) -> Result<Self> {
        let classifier = DomainClassifier::new(backend.internal_domains.as_slice())?;

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(settings.http.timeout)
            .user_agent(settings.http.user_agent.as_str())
            .danger_accept_invalid_certs(settings.http.accept_invalid_certs)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            backend,
            classifier,
            options: settings.options.clone(),
            retry: settings.retry.clone(),
            http,
            state: Mutex::new(SessionState::Disconnected),
            roster: RwLock::new(RosterCache::default()),
        })
    }

    /// The list this session administers
    pub fn backend(&self) -> &ListBackend {
        &self.backend
    }

    /// Alias of the list
    pub fn alias(&self) -> &str {
        &self.backend.alias
    }

    /// Compiled internal-domain patterns of the list
    pub fn classifier(&self) -> &DomainClassifier {
        &self.classifier
    }

    /// Run-wide options this session was created with
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Current session state
    pub async fn state(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    /// Log in unless already connected
    ///
    /// Idempotent. Concurrent callers wait on the state lock, so the login
    /// request is sent at most once. After a failed login every call returns
    /// the remembered error without network access.
    pub async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match &*state {
            SessionState::Connected => return Ok(()),
            SessionState::Failed { kind, reason } => return Err(self.remembered(*kind, reason)),
            SessionState::Disconnected => {}
        }

        match self.login().await {
            Ok(()) => {
                info!(alias = %self.backend.alias, list = %self.backend.list_name, "Logged in");
                *state = SessionState::Connected;
                Ok(())
            }
            Err(e) => {
                let (kind, reason) = match &e {
                    Error::Auth { reason, .. } => (FailureKind::Auth, reason.clone()),
                    Error::Transport { reason, .. } | Error::Fetch { reason, .. } => {
                        (FailureKind::Transport, reason.clone())
                    }
                    other => (FailureKind::Transport, other.to_string()),
                };
                warn!(alias = %self.backend.alias, error = %e, "Login failed");
                *state = SessionState::Failed { kind, reason };
                Err(e)
            }
        }
    }

    fn remembered(&self, kind: FailureKind, reason: &str) -> Error {
        match kind {
            FailureKind::Auth => Error::Auth {
                alias: self.backend.alias.clone(),
                reason: reason.to_string(),
            },
            FailureKind::Transport => Error::Transport {
                alias: self.backend.alias.clone(),
                reason: reason.to_string(),
                retryable: false,
            },
        }
    }

    async fn login(&self) -> Result<()> {
        let url = self.backend.admin_url();
        debug!(alias = %self.backend.alias, url = %url, "Opening admin page");

        let page = self.load_page(&url, true).await?;
        let submission = FormSchema::LOGIN
            .bind(&page.url, &page.body)?
            .fill(&self.backend.password)?;
        let response = self.submit(&submission).await?;

        if matches!(
            response.status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(Error::Auth {
                alias: self.backend.alias.clone(),
                reason: format!("login returned HTTP {}", response.status.as_u16()),
            });
        }
        self.check_status(&response)?;
        if FormSchema::LOGIN.is_presented(&response.body) {
            return Err(Error::Auth {
                alias: self.backend.alias.clone(),
                reason: "password rejected".to_string(),
            });
        }
        Ok(())
    }

    /// Retrieve the roster and replace the cached one
    ///
    /// # Errors
    /// Returns the login error if the session cannot be connected, or a fetch
    /// error if the roster page cannot be loaded. The cache is left untouched
    /// on failure.
    pub async fn try_fetch_roster(&self) -> Result<Roster> {
        self.connect().await?;

        let url = self.backend.roster_url();
        let page = self.get_page(&url).await.map_err(|e| match e {
            Error::Transport { alias, reason, .. } => Error::Fetch { alias, reason },
            other => other,
        })?;
        let roster = parse_roster(&page.body);

        debug!(
            alias = %self.backend.alias,
            subscribers = roster.len(),
            "Roster refreshed"
        );

        let mut cache = self.roster.write().await;
        cache.roster = roster.clone();
        cache.loaded = true;
        cache.stale = false;
        Ok(roster)
    }

    /// Refresh the roster, returning an empty one if that fails
    ///
    /// The failure is logged and the cached roster is kept for later callers.
    pub async fn fetch_roster(&self) -> Roster {
        match self.try_fetch_roster().await {
            Ok(roster) => roster,
            Err(e) => {
                warn!(
                    alias = %self.backend.alias,
                    error = %e,
                    "Could not load roster, keeping cached subscribers"
                );
                Roster::default()
            }
        }
    }

    /// Cached roster; loaded on first use
    pub async fn roster(&self) -> Roster {
        {
            let cache = self.roster.read().await;
            if cache.loaded {
                return cache.roster.clone();
            }
        }
        self.fetch_roster().await;
        self.roster.read().await.roster.clone()
    }

    /// Whether a mutation happened since the last successful fetch
    pub async fn roster_is_stale(&self) -> bool {
        self.roster.read().await.stale
    }

    /// Roster reflecting every mutation of this session, `None` if unknown
    ///
    /// The cache is used when it was loaded and no mutation followed;
    /// otherwise the roster is fetched once more. If that fails there is no
    /// trustworthy roster and `None` is returned.
    pub async fn confirmed_roster(&self) -> Option<Roster> {
        {
            let cache = self.roster.read().await;
            if cache.loaded && !cache.stale {
                return Some(cache.roster.clone());
            }
        }
        match self.try_fetch_roster().await {
            Ok(roster) => Some(roster),
            Err(e) => {
                warn!(alias = %self.backend.alias, error = %e, "Roster could not be confirmed");
                None
            }
        }
    }

    /// Subscribe `addresses` through the mass-subscribe form
    pub async fn subscribe(&self, addresses: &[String]) -> Result<Outcome> {
        self.change_members(MemberChange::Subscribe, addresses).await
    }

    /// Unsubscribe `addresses` through the mass-removal form
    pub async fn unsubscribe(&self, addresses: &[String]) -> Result<Outcome> {
        self.change_members(MemberChange::Unsubscribe, addresses).await
    }

    async fn change_members(&self, change: MemberChange, addresses: &[String]) -> Result<Outcome> {
        if addresses.is_empty() {
            return Ok(Outcome::Succeeded);
        }
        if self.options.dry_run {
            info!(
                alias = %self.backend.alias,
                count = addresses.len(),
                "Dry run: not submitting {}",
                change.verb()
            );
            return Ok(Outcome::Skipped);
        }
        self.connect().await?;

        let url = format!("{}/{}", self.backend.admin_url(), change.page_path());
        let page = self.get_page(&url).await?;
        let submission = FormSchema::for_change(change)
            .bind(&page.url, &page.body)?
            .fill(&addresses.join("\n"))?;

        // Whatever the response, the remote roster may have changed
        self.roster.write().await.stale = true;

        let response = self.submit(&submission).await?;
        self.check_status(&response)?;

        info!(
            alias = %self.backend.alias,
            count = addresses.len(),
            "Submitted {}",
            change.verb()
        );
        Ok(Outcome::Succeeded)
    }

    /// Current text of a message template
    pub async fn message(&self, kind: MessageKind) -> Result<String> {
        self.connect().await?;

        let url = format!("{}/{}", self.backend.admin_url(), kind.page_path());
        let page = self.get_page(&url).await?;
        let form = FormSchema::for_message(kind).bind(&page.url, &page.body)?;
        Ok(form.value().to_string())
    }

    /// Replace a message template
    ///
    /// Nothing is cached locally, so a dry run does not touch the server.
    pub async fn set_message(&self, kind: MessageKind, text: &str) -> Result<Outcome> {
        if self.options.dry_run {
            info!(alias = %self.backend.alias, "Dry run: not changing {}", kind.label());
            return Ok(Outcome::Skipped);
        }
        self.connect().await?;

        let url = format!("{}/{}", self.backend.admin_url(), kind.page_path());
        let page = self.get_page(&url).await?;
        let submission = FormSchema::for_message(kind)
            .bind(&page.url, &page.body)?
            .fill(text)?;
        let response = self.submit(&submission).await?;
        self.check_status(&response)?;

        info!(alias = %self.backend.alias, "{} changed", kind.label());
        Ok(Outcome::Succeeded)
    }

    /// Welcome template text
    pub async fn welcome_message(&self) -> Result<String> {
        self.message(MessageKind::Welcome).await
    }

    /// Goodbye template text
    pub async fn goodbye_message(&self) -> Result<String> {
        self.message(MessageKind::Goodbye).await
    }

    /// Replace the welcome template
    pub async fn set_welcome_message(&self, text: &str) -> Result<Outcome> {
        self.set_message(MessageKind::Welcome, text).await
    }

    /// Replace the goodbye template
    pub async fn set_goodbye_message(&self, text: &str) -> Result<Outcome> {
        self.set_message(MessageKind::Goodbye, text).await
    }

    /// Classify one address against this list's internal domains
    pub fn classify(&self, address: &str) -> Classification {
        self.classifier.classify(address)
    }

    /// Sorted, distinct domains of `addresses`
    pub fn domains_of<'a, I>(&self, addresses: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        classifier::domains_of(addresses)
    }

    /// GET a page, retrying transient failures
    async fn get_page(&self, url: &str) -> Result<Page> {
        self.load_page(url, false).await
    }

    /// GET a page; with `login_form`, a 401/403 carrying the login form is
    /// accepted as the entry page
    async fn load_page(&self, url: &str, login_form: bool) -> Result<Page> {
        with_retry(&self.retry, move || async move {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| Error::transport(&self.backend.alias, &e))?;
            let page = self.read_page(response).await?;
            let challenge = login_form
                && matches!(page.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
                && FormSchema::LOGIN.is_presented(&page.body);
            if !challenge {
                self.check_status(&page)?;
            }
            Ok(page)
        })
        .await
    }

    /// Send a form once; the caller decides what the status means
    async fn submit(&self, submission: &FormSubmission) -> Result<Page> {
        debug!(
            alias = %self.backend.alias,
            url = %submission.url,
            fields = submission.fields.len(),
            "Submitting form"
        );
        let request = match submission.method {
            FormMethod::Post => self
                .http
                .post(submission.url.clone())
                .form(&submission.fields),
            FormMethod::Get => self
                .http
                .get(submission.url.clone())
                .query(&submission.fields),
        };
        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(&self.backend.alias, &e))?;
        self.read_page(response).await
    }

    async fn read_page(&self, response: reqwest::Response) -> Result<Page> {
        let status = response.status();
        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(&self.backend.alias, &e))?;
        Ok(Page { url, status, body })
    }

    fn check_status(&self, page: &Page) -> Result<()> {
        let status = page.status;
        if status.is_success() {
            return Ok(());
        }
        let alias = self.backend.alias.clone();
        let reason = format!("HTTP {} from {}", status.as_u16(), page.url);
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth { alias, reason },
            s if s.is_server_error() => Error::Transport {
                alias,
                reason,
                retryable: true,
            },
            _ => Error::Fetch { alias, reason },
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
