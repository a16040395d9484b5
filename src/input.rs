//! Subscriber lists given on the command line
//!
//! `-a` and `-D` take either literal addresses (`a@x.com,b@y.com`) or the path
//! of a delimited file whose first column holds one address per row.

use crate::error::{Error, Result};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static ADDRESS_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@.+\..+").expect("address pattern"));

/// Whether `token` looks like an email address rather than a file name
pub fn looks_like_address(token: &str) -> bool {
    ADDRESS_LIKE.is_match(token)
}

/// Resolve a subscriber argument into addresses
///
/// When the first token looks like an address, all tokens are taken as
/// addresses. Otherwise the first token is read as a file.
pub fn parse_subscriber_arg<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<String>> {
    let Some(first) = tokens.first() else {
        return Ok(Vec::new());
    };
    if looks_like_address(first.as_ref()) {
        return Ok(tokens
            .iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect());
    }
    read_subscriber_file(Path::new(first.as_ref()))
}

/// Addresses from the first column of a header-less delimited file
pub fn read_subscriber_file(path: &Path) -> Result<Vec<String>> {
    let input_error = |message: String| Error::Input {
        path: path.to_path_buf(),
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| input_error(e.to_string()))?;

    let mut addresses = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| input_error(e.to_string()))?;
        match record.get(0) {
            Some(address) if !address.is_empty() => addresses.push(address.to_string()),
            _ => {}
        }
    }

    tracing::debug!(path = %path.display(), count = addresses.len(), "Read subscriber file");
    Ok(addresses)
}
