//! Scrub rule sets.
//!
//! A provider declares which request fields vary between runs (dates,
//! request ids, signatures) and how to normalize them before comparison.
//! Normalized values are only ever compared; stored sessions always keep the
//! raw bytes. Any field without a rule must match exactly.

use crate::error::{Error, Result};
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Addresses one comparable field of a request or response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldPath {
    Method,
    /// The full target. Query parameters with their own rule are excluded.
    Target,
    /// One query parameter of the target URL.
    Query(String),
    /// All values of a header; names are stored lowercase.
    Header(String),
    Metadata(String),
    Body,
    /// A JSON pointer (RFC 6901) into a JSON body, e.g. `/items/0/etag`.
    BodyJson(String),
    /// Response status. Only meaningful on [`Side::Response`].
    Status,
}

impl FieldPath {
    pub fn header(name: &str) -> Self {
        Self::Header(name.to_ascii_lowercase())
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self::Query(name.into())
    }

    pub fn metadata(key: impl Into<String>) -> Self {
        Self::Metadata(key.into())
    }

    pub fn body_json(pointer: impl Into<String>) -> Self {
        Self::BodyJson(pointer.into())
    }

    /// The stored form of this path: header names lowercase.
    #[must_use]
    pub fn canonical(self) -> Self {
        match self {
            Self::Header(name) => Self::header(&name),
            other => other,
        }
    }

    /// Equality with header names compared case-insensitively.
    pub fn same_field(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Header(a), Self::Header(b)) => a.eq_ignore_ascii_case(b),
            _ => self == other,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method => f.write_str("method"),
            Self::Target => f.write_str("target"),
            Self::Query(name) => write!(f, "query[{name}]"),
            Self::Header(name) => write!(f, "header[{name}]"),
            Self::Metadata(key) => write!(f, "metadata[{key}]"),
            Self::Body => f.write_str("body"),
            Self::BodyJson(pointer) => write!(f, "body{pointer}"),
            Self::Status => f.write_str("status"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Request,
    Response,
}

pub type NormalizeFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// How a field is compared.
#[derive(Clone)]
pub enum ScrubPolicy {
    /// The field is left out of the comparison entirely, presence included.
    Ignore,
    /// Both sides go through `func` and the results must be equal.
    Normalize { label: String, func: NormalizeFn },
    /// Exact comparison. The default for every field without a rule.
    RequireEqual,
}

static REQUIRE_EQUAL: ScrubPolicy = ScrubPolicy::RequireEqual;

impl ScrubPolicy {
    pub fn normalize<F>(label: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::Normalize {
            label: label.into(),
            func: Arc::new(func),
        }
    }

    /// Replaces every value with `value`; presence still has to match.
    pub fn constant(value: impl Into<String>) -> Self {
        let value = value.into();
        let label = format!("constant({value})");
        Self::normalize(label, move |_| value.clone())
    }

    /// Replaces every match of `pattern` with `replacement`.
    pub fn replace_regex(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::config(format!("Invalid scrub pattern {pattern:?}: {e}")))?;
        let replacement = replacement.into();
        let label = format!("replace({pattern} -> {replacement})");
        Ok(Self::normalize(label, move |value| {
            regex.replace_all(value, replacement.as_str()).into_owned()
        }))
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Ignore => "ignore",
            Self::Normalize { label, .. } => label,
            Self::RequireEqual => "require_equal",
        }
    }

    /// `None` means the value takes no part in the comparison.
    pub fn apply<'a>(&self, raw: &'a str) -> Option<Cow<'a, str>> {
        match self {
            Self::Ignore => None,
            Self::Normalize { func, .. } => Some(Cow::Owned(func(raw))),
            Self::RequireEqual => Some(Cow::Borrowed(raw)),
        }
    }
}

impl fmt::Debug for ScrubPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normalize { label, .. } => f.debug_tuple("Normalize").field(label).finish(),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrubRule {
    pub side: Side,
    pub path: FieldPath,
    pub policy: ScrubPolicy,
}

/// The rules one provider contributes, in declaration order.
#[derive(Debug, Clone)]
pub struct ScrubRuleSet {
    provider: String,
    rules: Vec<ScrubRule>,
}

impl ScrubRuleSet {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            rules: Vec::new(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Adds a rule. A second rule for the same side and path replaces the
    /// first in place, so a path never has two competing policies.
    #[must_use]
    pub fn rule(mut self, side: Side, path: FieldPath, policy: ScrubPolicy) -> Self {
        let path = path.canonical();
        if let Some(existing) = self
            .rules
            .iter_mut()
            .find(|rule| rule.side == side && rule.path == path)
        {
            existing.policy = policy;
        } else {
            self.rules.push(ScrubRule { side, path, policy });
        }
        self
    }

    #[must_use]
    pub fn ignore(self, path: FieldPath) -> Self {
        self.rule(Side::Request, path, ScrubPolicy::Ignore)
    }

    #[must_use]
    pub fn normalize(self, path: FieldPath, policy: ScrubPolicy) -> Self {
        self.rule(Side::Request, path, policy)
    }

    #[must_use]
    pub fn require_equal(self, path: FieldPath) -> Self {
        self.rule(Side::Request, path, ScrubPolicy::RequireEqual)
    }

    #[must_use]
    pub fn response_rule(self, path: FieldPath, policy: ScrubPolicy) -> Self {
        self.rule(Side::Response, path, policy)
    }

    pub fn rules_for(&self, side: Side) -> impl Iterator<Item = &ScrubRule> {
        self.rules.iter().filter(move |rule| rule.side == side)
    }

    pub fn policy_for(&self, side: Side, path: &FieldPath) -> &ScrubPolicy {
        self.rules
            .iter()
            .find(|rule| rule.side == side && rule.path.same_field(path))
            .map_or(&REQUIRE_EQUAL, |rule| &rule.policy)
    }

    pub fn covers(&self, side: Side, path: &FieldPath) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.side == side && rule.path.same_field(path))
    }

    /// Normalizes `raw` for comparison under whatever rule covers `path`.
    pub fn apply<'a>(&self, side: Side, path: &FieldPath, raw: &'a str) -> Option<Cow<'a, str>> {
        self.policy_for(side, path).apply(raw)
    }

    pub(crate) fn has_query_rules(&self, side: Side) -> bool {
        self.rules_for(side)
            .any(|rule| matches!(rule.path, FieldPath::Query(_)))
    }

    pub(crate) fn has_body_json_rules(&self, side: Side) -> bool {
        self.rules_for(side)
            .any(|rule| matches!(rule.path, FieldPath::BodyJson(_)))
    }
}

/// Provider name to rule set. The harness registers nothing itself.
#[derive(Debug, Clone, Default)]
pub struct ScrubRegistry {
    sets: HashMap<String, Arc<ScrubRuleSet>>,
}

impl ScrubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `set` under its provider name, returning any set it replaced.
    pub fn register(&mut self, set: ScrubRuleSet) -> Option<Arc<ScrubRuleSet>> {
        self.sets.insert(set.provider.clone(), Arc::new(set))
    }

    #[must_use]
    pub fn with(mut self, set: ScrubRuleSet) -> Self {
        self.register(set);
        self
    }

    /// Rule set for `provider`; an unregistered provider gets an empty set,
    /// which compares every field exactly.
    pub fn lookup(&self, provider: &str) -> Arc<ScrubRuleSet> {
        if let Some(set) = self.sets.get(provider) {
            return Arc::clone(set);
        }
        debug!(provider, "No scrub rules registered; all fields compare exactly");
        Arc::new(ScrubRuleSet::new(provider))
    }

    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
