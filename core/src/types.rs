//! Caller-facing inputs for building a request from raw parts.
//!
//! # Design
//! `HeaderValues` accepts either one string or a list so callers can describe
//! headers the way they appear in JSON or TOML (`"a"` or `["a", "b"]`).

use serde::{Deserialize, Serialize};

use crate::http::Body;

/// One header value or several values for the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

impl HeaderValues {
    pub fn into_values(self) -> Vec<String> {
        match self {
            HeaderValues::One(value) => vec![value],
            HeaderValues::Many(values) => values,
        }
    }
}

impl From<&str> for HeaderValues {
    fn from(value: &str) -> Self {
        HeaderValues::One(value.to_string())
    }
}

impl From<String> for HeaderValues {
    fn from(value: String) -> Self {
        HeaderValues::One(value)
    }
}

impl From<Vec<String>> for HeaderValues {
    fn from(values: Vec<String>) -> Self {
        HeaderValues::Many(values)
    }
}

/// Optional body and headers for `Client::request`.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub body: Option<Body>,
    pub headers: Vec<(String, HeaderValues)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, values: impl Into<HeaderValues>) -> Self {
        self.headers.push((name.into(), values.into()));
        self
    }
}
