//! Per-operation transport options and the rule for merging them.
//!
//! Two layers feed every operation: the client's global extra options, fixed
//! at construction, and a small set derived from the request itself (method,
//! return the body, follow redirects, keep the head out of the body).
//!
//! # Precedence
//! With the default `Precedence::GlobalWins`, a key present in both layers
//! takes the **global** value. A global `method = "PUT"` therefore rewrites
//! every request, GETs included, and a global `follow_redirects = false`
//! disables redirects for all of them. `Precedence::RequestWins` flips this.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::parse_duration;
use crate::http::HttpRequest;

const DEFAULT_MAX_REDIRECTS: u64 = 10;

/// Names of the options a transport handle understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKey {
    /// Request method sent on the wire.
    Method,
    /// Keep the response body (otherwise it is discarded).
    ReturnBody,
    FollowRedirects,
    /// Prefix the status line and headers to the body.
    IncludeHead,
    MaxRedirects,
    /// Whole-transfer timeout, milliseconds or a duration string.
    Timeout,
    ConnectTimeout,
    UserAgent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(u64),
    Text(String),
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<u64> for OptionValue {
    fn from(value: u64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

impl From<Duration> for OptionValue {
    fn from(value: Duration) -> Self {
        OptionValue::Int(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}

/// An option map keyed by `OptionKey`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportOptions(BTreeMap<OptionKey, OptionValue>);

impl TransportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: OptionKey, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: OptionKey, value: impl Into<OptionValue>) {
        self.0.insert(key, value.into());
    }

    pub fn get(&self, key: OptionKey) -> Option<&OptionValue> {
        self.0.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (OptionKey, &OptionValue)> + '_ {
        self.0.iter().map(|(key, value)| (*key, value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for TransportOptions {
    type Item = (OptionKey, OptionValue);
    type IntoIter = std::collections::btree_map::IntoIter<OptionKey, OptionValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Which layer wins when both set the same key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    /// Global extra options override request-derived defaults.
    #[default]
    GlobalWins,
    /// Request-derived defaults override global extra options.
    RequestWins,
}

impl Precedence {
    /// Merge the two layers. Keys present in only one layer are always kept.
    pub fn merge_layers(
        self,
        global: &TransportOptions,
        request: TransportOptions,
    ) -> TransportOptions {
        let (mut base, overlay) = match self {
            Precedence::GlobalWins => (request, global.clone()),
            Precedence::RequestWins => (global.clone(), request),
        };
        for (key, value) in overlay {
            base.insert(key, value);
        }
        base
    }
}

/// The fixed options every request carries before merging.
pub fn request_defaults(request: &HttpRequest) -> TransportOptions {
    TransportOptions::new()
        .with(OptionKey::Method, request.method())
        .with(OptionKey::ReturnBody, true)
        .with(OptionKey::FollowRedirects, true)
        .with(OptionKey::IncludeHead, false)
}

/// Effective options for one request.
pub fn merge(
    global: &TransportOptions,
    request: &HttpRequest,
    precedence: Precedence,
) -> EffectiveOptions {
    EffectiveOptions(precedence.merge_layers(global, request_defaults(request)))
}

/// The merged option set handed to one transport handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveOptions(TransportOptions);

impl EffectiveOptions {
    pub fn method(&self) -> &str {
        self.text(OptionKey::Method).unwrap_or("GET")
    }

    pub fn return_body(&self) -> bool {
        self.flag(OptionKey::ReturnBody).unwrap_or(true)
    }

    pub fn follow_redirects(&self) -> bool {
        self.flag(OptionKey::FollowRedirects).unwrap_or(false)
    }

    pub fn include_head(&self) -> bool {
        self.flag(OptionKey::IncludeHead).unwrap_or(false)
    }

    pub fn max_redirects(&self) -> u64 {
        match self.0.get(OptionKey::MaxRedirects) {
            Some(OptionValue::Int(n)) => *n,
            _ => DEFAULT_MAX_REDIRECTS,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.duration(OptionKey::Timeout)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.duration(OptionKey::ConnectTimeout)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.text(OptionKey::UserAgent)
    }

    /// Cap the transfer timeout at `limit`, setting it if absent.
    pub fn clamp_timeout(&mut self, limit: Duration) {
        let timeout = self.timeout().map_or(limit, |t| t.min(limit));
        self.0.insert(OptionKey::Timeout, timeout);
    }

    pub fn as_options(&self) -> &TransportOptions {
        &self.0
    }

    fn flag(&self, key: OptionKey) -> Option<bool> {
        match self.0.get(key)? {
            OptionValue::Bool(b) => Some(*b),
            OptionValue::Int(n) => Some(*n != 0),
            OptionValue::Text(_) => None,
        }
    }

    fn text(&self, key: OptionKey) -> Option<&str> {
        match self.0.get(key)? {
            OptionValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn duration(&self, key: OptionKey) -> Option<Duration> {
        match self.0.get(key)? {
            OptionValue::Int(ms) => Some(Duration::from_millis(*ms)),
            OptionValue::Text(s) => parse_duration(s),
            OptionValue::Bool(_) => None,
        }
    }
}

impl From<TransportOptions> for EffectiveOptions {
    fn from(options: TransportOptions) -> Self {
        EffectiveOptions(options)
    }
}
