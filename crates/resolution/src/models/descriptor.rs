//! Request descriptors and cache-key normalization.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ResolutionError;

/// Separator between the domain and subject parts of a cache key.
const KEY_SEPARATOR: char = ':';

/// Optional time bounds of a request, both inclusive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Whether `at` lies inside the range.
    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| *at >= s) && self.end.map_or(true, |e| *at <= e)
    }

    fn key_fragment(&self) -> String {
        let fmt = |t: &Option<DateTime<Utc>>| {
            t.map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                .unwrap_or_default()
        };
        format!("{}..{}", fmt(&self.start), fmt(&self.end))
    }
}

/// Identifies what is being resolved.
///
/// A descriptor is a domain key (`"activities"`, `"collection-log-item"`),
/// a subject key (group name, player name, `itemId=12073,player=Foo`) and
/// optional time bounds. It is immutable once built; the normalized cache key
/// is computed at construction.
///
/// Normalization lower-cases the domain and subject, trims whitespace, and for
/// `key=value` subjects sorts the pairs so that parameter order does not
/// produce distinct cache entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct RequestDescriptor {
    domain: String,
    subject: String,
    range: Option<TimeRange>,
    #[serde(skip)]
    key: String,
}

impl RequestDescriptor {
    /// Build a descriptor without time bounds.
    ///
    /// Fails when the domain or subject is blank, or when the domain contains
    /// the key separator.
    pub fn new(
        domain: impl Into<String>,
        subject: impl Into<String>,
    ) -> Result<Self, ResolutionError> {
        Self::build(domain.into(), subject.into(), None)
    }

    /// Build a descriptor bounded by `range`.
    pub fn with_range(
        domain: impl Into<String>,
        subject: impl Into<String>,
        range: TimeRange,
    ) -> Result<Self, ResolutionError> {
        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start > end {
                return Err(ResolutionError::InvalidDescriptor(format!(
                    "range start {} is after end {}",
                    start, end
                )));
            }
        }
        Self::build(domain.into(), subject.into(), Some(range))
    }

    fn build(
        domain: String,
        subject: String,
        range: Option<TimeRange>,
    ) -> Result<Self, ResolutionError> {
        let domain = domain.trim().to_ascii_lowercase();
        if domain.is_empty() {
            return Err(ResolutionError::InvalidDescriptor(
                "domain must not be empty".to_string(),
            ));
        }
        if domain.contains(KEY_SEPARATOR) {
            return Err(ResolutionError::InvalidDescriptor(format!(
                "domain '{}' must not contain '{}'",
                domain, KEY_SEPARATOR
            )));
        }

        let subject = subject.trim().to_string();
        if subject.is_empty() {
            return Err(ResolutionError::InvalidDescriptor(format!(
                "subject for domain '{}' must not be empty",
                domain
            )));
        }

        let mut key = format!(
            "{}{}{}",
            domain,
            KEY_SEPARATOR,
            normalize_subject(&subject)
        );
        if let Some(range) = &range {
            key.push('@');
            key.push_str(&range.key_fragment());
        }

        Ok(Self {
            domain,
            subject,
            range,
            key,
        })
    }

    /// The normalized (lower-cased) domain key.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The subject as supplied, trimmed but with its original casing.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn range(&self) -> Option<&TimeRange> {
        self.range.as_ref()
    }

    /// Normalized cache key for this descriptor.
    pub fn cache_key(&self) -> &str {
        &self.key
    }

    /// Look up a `name=value` parameter of the subject, case-insensitively by name.
    ///
    /// ```
    /// use groupscape_resolution::RequestDescriptor;
    ///
    /// let d = RequestDescriptor::new("collection-log-item", "itemId=12073,player=Foo").unwrap();
    /// assert_eq!(d.param("itemid"), Some("12073"));
    /// assert_eq!(d.param("player"), Some("Foo"));
    /// assert_eq!(d.param("group"), None);
    /// ```
    pub fn param(&self, name: &str) -> Option<&str> {
        self.subject.split(',').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            k.trim().eq_ignore_ascii_case(name).then_some(v.trim())
        })
    }

    /// Cache key prefix shared by every descriptor of `domain`.
    pub fn domain_prefix(domain: &str) -> String {
        format!("{}{}", domain.trim().to_ascii_lowercase(), KEY_SEPARATOR)
    }
}

impl std::fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

fn normalize_subject(subject: &str) -> String {
    if !subject.contains('=') {
        return subject.to_lowercase();
    }

    let mut pairs: Vec<String> = subject
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => format!("{}={}", k.trim().to_lowercase(), v.trim().to_lowercase()),
            None => pair.to_lowercase(),
        })
        .collect();
    pairs.sort();
    pairs.join(",")
}
