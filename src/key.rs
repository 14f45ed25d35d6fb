use std::fmt;

use regex::{Regex, RegexBuilder};
use tracing::trace;

use crate::common::BuildError;
use crate::formatting::{sanitize_path_segment, sanitize_stat_key};

/// Stat key used when the request path is `/`. Requires the trailing separator.
pub const ROOT_NAME: &str = "ROOT.";

/// Ordered list of patterns; a path segment matching any of them is left out of the stat key.
///
/// Patterns are compiled once, at configuration time, case-insensitively and unanchored: a
/// pattern excludes a segment if it matches anywhere inside it.
#[derive(Clone, Debug, Default)]
pub struct Exclusions {
    patterns: Vec<Regex>,
}

impl Exclusions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `pattern` and appends it after the existing ones.
    pub fn push(&mut self, pattern: &str) -> Result<(), BuildError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| BuildError::InvalidExcludePattern {
                pattern: pattern.to_owned(),
                source,
            })?;
        self.patterns.push(regex);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns `true` if any pattern matches `segment`, checking in configured order.
    pub fn excludes(&self, segment: &str) -> bool {
        match self.patterns.iter().position(|re| re.is_match(segment)) {
            Some(idx) => {
                trace!(segment, pattern = idx, "path segment excluded");
                true
            }
            None => false,
        }
    }
}

/// Where a [`StatKey`] came from, in order of precedence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeySource {
    /// The fixed key from configuration.
    Configured,
    /// The `statsd.stat` note set on the request.
    Note,
    /// The `X-Statsd-Stat` response header.
    Header,
    /// Derived from the request path.
    Path,
}

/// The dot-delimited body of a stat name.
///
/// A key is either empty or ends with `.`, so it can be concatenated directly with the verb.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatKey {
    key: String,
    source: KeySource,
}

impl StatKey {
    fn from_override(value: &str, source: KeySource) -> Self {
        let mut key = sanitize_stat_key(value);
        if !key.ends_with('.') {
            key.push('.');
        }
        StatKey { key, source }
    }

    /// Derives a key from a request path.
    ///
    /// Leading slashes are stripped and an empty remainder yields [`ROOT_NAME`]. Every other
    /// non-empty segment is either dropped by `exclusions` or sanitized and appended with a
    /// trailing `.`. When every segment is excluded the key is empty.
    pub fn from_path(path: &str, exclusions: &Exclusions) -> Self {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return StatKey {
                key: ROOT_NAME.to_owned(),
                source: KeySource::Path,
            };
        }

        let mut key = String::with_capacity(path.len() + 1);
        for part in path.split('/') {
            if part.is_empty() || exclusions.excludes(part) {
                continue;
            }
            key.push_str(&sanitize_path_segment(part));
            key.push('.');
        }

        trace!(%key, "derived stat key from path");
        StatKey {
            key,
            source: KeySource::Path,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> KeySource {
        self.source
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }

    /// Iterates over the key's segments, without separators.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.key.split_terminator('.')
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Resolves the stat key for a request.
///
/// Precedence, highest first: a non-empty `configured` key, a non-empty `note`, a non-empty
/// `header`, and finally the `path`. Overrides keep their `.` levels but have line protocol
/// characters replaced, and get a trailing `.` when missing.
pub fn resolve_stat_key(
    path: &str,
    note: Option<&str>,
    header: Option<&str>,
    configured: Option<&str>,
    exclusions: &Exclusions,
) -> StatKey {
    fn non_empty(v: Option<&str>) -> Option<&str> {
        v.filter(|s| !s.is_empty())
    }

    if let Some(key) = non_empty(configured) {
        return StatKey::from_override(key, KeySource::Configured);
    }
    if let Some(note) = non_empty(note) {
        trace!(note, "stat key from note");
        return StatKey::from_override(note, KeySource::Note);
    }
    if let Some(header) = non_empty(header) {
        trace!(header, "stat key from header");
        return StatKey::from_override(header, KeySource::Header);
    }
    StatKey::from_path(path, exclusions)
}
