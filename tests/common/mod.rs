//! Common test utilities for listwarden integration tests

#[allow(dead_code)]
pub mod mailman;

#[allow(unused_imports)]
pub use mailman::*;

use async_trait::async_trait;
use listwarden::editor::MessageEditor;
use listwarden::workflow::Confirm;
use listwarden::{Config, RunOptions};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Configuration with one list per `(name, alias)` on the mock server
///
/// Every list uses the password `secret`; retries are off and requests time
/// out after five seconds.
#[allow(dead_code)]
pub fn config_for(server: &MockMailman, lists: &[(&str, &str)], internal: &[&str]) -> Config {
    let patterns: Vec<String> = internal
        .iter()
        .map(|p| format!("'{}'", p))
        .collect();
    let mut text = format!(
        r#"internal_domains = [{patterns}]

[http]
timeout = 5

[retry]
max_attempts = 0

[listservers.main]
url = "{url}"
"#,
        patterns = patterns.join(", "),
        url = server.base_url()
    );
    for (name, alias) in lists {
        text.push_str(&format!(
            r#"
[[lists]]
server = "main"
name = "{name}"
alias = "{alias}"
pass = "secret"
comment = "The {name} list"
"#
        ));
    }
    Config::from_toml_str(&text).unwrap()
}

/// Run options for a normal, verified run
#[allow(dead_code)]
pub fn options() -> RunOptions {
    RunOptions::default()
}

/// Console output captured in memory
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct Output(Arc<Mutex<Vec<u8>>>);

#[allow(dead_code)]
impl Output {
    /// Everything written so far
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Editor that replaces any text with a fixed one
#[allow(dead_code)]
pub struct ReplaceWith(pub String);

#[async_trait]
impl MessageEditor for ReplaceWith {
    async fn edit(&self, _current: &str) -> listwarden::Result<String> {
        Ok(self.0.clone())
    }
}

/// Confirmation that always gives the same answer and remembers the questions
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct Answer {
    yes: bool,
    questions: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl Answer {
    /// Agree to everything
    pub fn yes() -> Self {
        Self {
            yes: true,
            ..Self::default()
        }
    }

    /// Decline everything
    pub fn no() -> Self {
        Self::default()
    }

    /// Questions asked so far
    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Confirm for Answer {
    async fn confirm(&self, question: &str) -> listwarden::Result<bool> {
        self.questions.lock().unwrap().push(question.to_string());
        Ok(self.yes)
    }
}
