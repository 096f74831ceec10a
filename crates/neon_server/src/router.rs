//! Path-pattern request multiplexing.
//!
//! A site produces a [`RouteTable`] at register time; a listener merges
//! the tables of every linked site into one [`Mux`] and swaps it in
//! atomically. Patterns are URL-path prefixes: a pattern ending in `/`
//! matches every path below it, any other pattern matches exactly, and
//! the longest matching pattern wins. Entries carrying a host are
//! preferred over host-less entries for requests naming that host.

use std::collections::HashMap;
use std::sync::Arc;

use neon_core::http::HttpHandler;

/// Routing key: an optional host and a path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    /// The host the entry answers for; `None` for the default site.
    pub host: Option<String>,
    /// The path pattern, always beginning with `/`.
    pub pattern: String,
}

impl RouteKey {
    /// A host-less key.
    #[must_use]
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self {
            host: None,
            pattern: pattern.into(),
        }
    }

    /// A host-qualified key.
    #[must_use]
    pub fn hosted(host: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            pattern: pattern.into(),
        }
    }
}

/// The effective routing table of one site.
pub type RouteTable = HashMap<RouteKey, Arc<dyn HttpHandler>>;

struct MuxEntry {
    host: Option<String>,
    pattern: String,
    handler: Arc<dyn HttpHandler>,
}

/// An immutable request multiplexer merged from site route tables.
#[derive(Default)]
pub struct Mux {
    entries: Vec<MuxEntry>,
}

impl Mux {
    /// Merges route tables into one multiplexer.
    #[must_use]
    pub fn merge<'a>(tables: impl IntoIterator<Item = &'a RouteTable>) -> Self {
        let mut entries = Vec::new();
        for table in tables {
            for (key, handler) in table {
                entries.push(MuxEntry {
                    host: key.host.clone(),
                    pattern: key.pattern.clone(),
                    handler: Arc::clone(handler),
                });
            }
        }
        // Longest pattern first so lookups can take the first match.
        entries.sort_by(|a, b| b.pattern.len().cmp(&a.pattern.len()));
        Self { entries }
    }

    /// Resolves a request to a handler.
    ///
    /// Host-qualified entries are consulted first; host-less entries
    /// (the default site) catch everything else.
    #[must_use]
    pub fn lookup(&self, host: &str, path: &str) -> Option<Arc<dyn HttpHandler>> {
        self.find(Some(host), path).or_else(|| self.find(None, path))
    }

    fn find(&self, host: Option<&str>, path: &str) -> Option<Arc<dyn HttpHandler>> {
        self.entries
            .iter()
            .find(|entry| entry.host.as_deref() == host && pattern_matches(&entry.pattern, path))
            .map(|entry| Arc::clone(&entry.handler))
    }

    /// The number of merged entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the multiplexer has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl core::fmt::Debug for Mux {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let keys: Vec<String> = self
            .entries
            .iter()
            .map(|entry| match &entry.host {
                Some(host) => format!("{host}{}", entry.pattern),
                None => entry.pattern.clone(),
            })
            .collect();
        f.debug_struct("Mux").field("entries", &keys).finish()
    }
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('/') {
        // A trailing-slash pattern is a subtree: it matches the subtree
        // root with and without the slash, and everything below it.
        path == pattern || path == prefix || path.starts_with(pattern)
    } else {
        path == pattern
    }
}

/// Strips an optional `:port` suffix from a Host header value.
#[must_use]
pub fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
