//! Internal/external subscriber classification
//!
//! Internal-domain patterns are regular expressions matched case-insensitively
//! anywhere in the address. They are compiled once when a backend is set up and
//! tested in their configured order.

use crate::error::{Error, Result};
use crate::types::Classification;
use regex::{Regex, RegexBuilder};

/// Compiled internal-domain patterns of one backend
#[derive(Clone, Debug, Default)]
pub struct DomainClassifier {
    patterns: Vec<Regex>,
}

impl DomainClassifier {
    /// Compile `patterns`, failing with a configuration error on the first invalid one
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .enumerate()
            .map(|(i, pattern)| {
                RegexBuilder::new(pattern.as_ref())
                    .case_insensitive(true)
                    .size_limit(1024 * 1024) // 1MB compiled DFA limit
                    .build()
                    .map_err(|e| {
                        Error::config(
                            format!("internal_domains[{}]", i),
                            format!("invalid pattern '{}': {}", pattern.as_ref(), e),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Whether any pattern is configured
    pub fn is_configured(&self) -> bool {
        !self.patterns.is_empty()
    }

    /// Index of the first pattern matching `address`
    pub fn matching_pattern(&self, address: &str) -> Option<usize> {
        self.patterns.iter().position(|re| re.is_match(address))
    }

    /// Classify one address
    pub fn classify(&self, address: &str) -> Classification {
        if self.matching_pattern(address).is_some() {
            Classification::Internal
        } else {
            Classification::External
        }
    }

    /// Split addresses into `(internal, external)`, keeping input order
    pub fn split<'a, I>(&self, addresses: I) -> (Vec<&'a str>, Vec<&'a str>)
    where
        I: IntoIterator<Item = &'a str>,
    {
        addresses
            .into_iter()
            .partition(|a| self.classify(a) == Classification::Internal)
    }
}

/// Domain part of an address: everything after the last `@`
pub fn domain_of(address: &str) -> &str {
    address.rsplit('@').next().unwrap_or(address)
}

/// Sorted, distinct domains of `addresses`
pub fn domains_of<'a, I>(addresses: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut domains: Vec<String> = addresses
        .into_iter()
        .map(|a| domain_of(a).to_string())
        .collect();
    domains.sort();
    domains.dedup();
    domains
}
