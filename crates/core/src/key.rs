// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Cache keys and invalidation patterns.
//!
//! A [`QueryKey`] is a resource type plus resolved parameters and renders to
//! a stable string (`analytics:revenue?period=7d&store=3`). Parameters are
//! kept sorted so the same query always produces the same key.
//!
//! A [`KeyPattern`] is a glob over rendered keys where `*` matches any run of
//! characters: `analytics:*` covers every analytics query.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Composite cache key: resource type + resolved parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    pub resource: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl QueryKey {
    pub fn new(resource: impl Into<String>) -> Self {
        QueryKey { resource: resource.into(), params: BTreeMap::new() }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Resource family used for TTL lookup: the segment before the first `:`.
    pub fn resource_type(&self) -> &str {
        self.resource.split(':').next().unwrap_or(&self.resource)
    }

    /// Parses a rendered key back into its parts.
    pub fn parse(rendered: &str) -> Self {
        match rendered.split_once('?') {
            None => QueryKey::new(rendered),
            Some((resource, query)) => {
                let params = query
                    .split('&')
                    .filter(|pair| !pair.is_empty())
                    .map(|pair| match pair.split_once('=') {
                        Some((k, v)) => (k.to_string(), v.to_string()),
                        None => (pair.to_string(), String::new()),
                    })
                    .collect();
                QueryKey { resource: resource.to_string(), params }
            }
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resource)?;
        for (index, (name, value)) in self.params.iter().enumerate() {
            let sep = if index == 0 { '?' } else { '&' };
            write!(f, "{sep}{name}={value}")?;
        }
        Ok(())
    }
}

impl From<&str> for QueryKey {
    fn from(rendered: &str) -> Self {
        QueryKey::parse(rendered)
    }
}

/// Glob over rendered cache keys.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    source: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Exact,
    Glob(Regex),
}

impl KeyPattern {
    /// Compiles a glob. `*` matches any run of characters; everything else is literal.
    pub fn new(pattern: &str) -> Result<Self> {
        if !pattern.contains('*') {
            return Ok(KeyPattern { source: pattern.to_string(), matcher: Matcher::Exact });
        }
        let body = pattern.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
        let regex = Regex::new(&format!("^{body}$")).map_err(|e| Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(KeyPattern { source: pattern.to_string(), matcher: Matcher::Glob(regex) })
    }

    /// Pattern matching exactly one key.
    pub fn exact(key: &QueryKey) -> Self {
        KeyPattern { source: key.to_string(), matcher: Matcher::Exact }
    }

    pub fn matches(&self, key: &str) -> bool {
        match &self.matcher {
            Matcher::Exact => self.source == key,
            Matcher::Glob(regex) => regex.is_match(key),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for KeyPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
#[path = "key_tests.rs"]
mod tests;
