//! Roster page parsing
//!
//! The public roster page lists one hyperlink per subscriber, pointing at the
//! subscriber's options page. The address is embedded in the last path segment
//! with `@` replaced by an obfuscation token.

use super::forms::parse_attributes;
use crate::types::Roster;
use regex::Regex;
use std::sync::LazyLock;

/// Token the service writes in place of `@` inside roster links
pub const OBFUSCATION_TOKEN: &str = "--at--";

#[allow(clippy::expect_used)]
static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>").expect("anchor pattern"));

/// Recover the address carried by one roster hyperlink
///
/// Takes the text after the last `/`, drops any query or fragment,
/// percent-decodes it and restores `@`. Returns `None` for links that carry
/// no obfuscated address.
pub fn decode_obfuscated(href: &str) -> Option<String> {
    if !href.contains(OBFUSCATION_TOKEN) {
        return None;
    }
    let tail = href.rsplit('/').next().unwrap_or(href);
    let tail = tail.split(['?', '#']).next().unwrap_or(tail);
    let decoded = urlencoding::decode(tail)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| tail.to_string());
    let address = decoded.replace(OBFUSCATION_TOKEN, "@");
    let address = address.trim();
    if address.is_empty() || !address.contains('@') {
        None
    } else {
        Some(address.to_lowercase())
    }
}

/// Extract the canonical roster from a roster page
pub fn parse_roster(html: &str) -> Roster {
    let addresses: Vec<String> = ANCHOR_RE
        .captures_iter(html)
        .filter_map(|caps| parse_attributes(&caps[1]).remove("href"))
        .filter_map(|href| decode_obfuscated(&href))
        .collect();
    Roster::from_addresses(addresses)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_options_link() {
        assert_eq!(
            decode_obfuscated("../options/engineering/alice--at--example.com").as_deref(),
            Some("alice@example.com")
        );
    }

    #[test]
    fn decodes_percent_escapes_and_drops_query() {
        assert_eq!(
            decode_obfuscated("/mailman/options/eng/Bob%2Bnews--at--Example.ORG?lang=en")
                .as_deref(),
            Some("bob+news@example.org")
        );
    }

    #[test]
    fn ignores_links_without_token() {
        assert_eq!(decode_obfuscated("../listinfo/engineering"), None);
        assert_eq!(decode_obfuscated("../options/eng/--at--/"), None);
    }

    #[test]
    fn roster_page_is_canonicalised() {
        let html = r#"
<html><body>
<a href="../listinfo/engineering">engineering list</a>
<ul>
  <li><a HREF="../options/engineering/carol--at--example.net">carol at example.net</a>
  <li><a href="../options/engineering/alice--at--example.com">alice at example.com</a>
  <li><a href='../options/engineering/Alice--at--Example.com'>Alice at Example.com</a>
  <li><a href="../options/engineering/bob--at--example.org">bob at example.org</a>
</ul>
</body></html>"#;

        let roster = parse_roster(html);
        assert_eq!(
            roster.addresses(),
            ["alice@example.com", "bob@example.org", "carol@example.net"]
        );
    }

    #[test]
    fn page_without_links_gives_empty_roster() {
        assert!(parse_roster("<html><body>No members</body></html>").is_empty());
    }
}
