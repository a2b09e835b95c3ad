//! Header multimap and the per-operation header accumulator.
//!
//! # Design
//! `Headers` keeps names in first-seen order with every value in arrival
//! order. Lookups compare names ASCII case-insensitively, but the spelling
//! received first is the one reported back.
//!
//! `HeaderAccumulator` is the sink a transport handle feeds raw header lines
//! into while a transfer is running. Each operation owns exactly one, so
//! operations sharing a loop can never write into each other's headers.

use tracing::trace;

use crate::transport::HandleId;

/// Order-preserving header multimap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` under `name`. Never replaces an existing value.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// Every value stored under `name`, in arrival order.
    pub fn get_all(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(idx) => &self.entries[idx].1,
            None => &[],
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Flattened `(name, value)` pairs, one per value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Wire-style `Name: value` lines, one per value.
    pub fn lines(&self) -> Vec<String> {
        self.iter().map(|(name, value)| format!("{name}: {value}")).collect()
    }

    /// Number of values (not distinct names).
    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, values)| values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

impl<N, V> FromIterator<(N, V)> for Headers
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

/// Collects the header lines of one transfer.
#[derive(Debug)]
pub struct HeaderAccumulator {
    handle: HandleId,
    headers: Headers,
    reason: Option<String>,
}

impl HeaderAccumulator {
    pub fn new(handle: HandleId) -> Self {
        Self {
            handle,
            headers: Headers::new(),
            reason: None,
        }
    }

    /// The handle this accumulator belongs to.
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    /// Absorb one raw header line and return the number of bytes consumed.
    ///
    /// Blank lines and status lines (`HTTP/...`) add no header; the reason
    /// phrase of a status line is remembered. Anything else is split on the
    /// first colon and appended. Lines without a colon are dropped. The whole
    /// line always counts as consumed.
    pub fn on_header_line(&mut self, raw: &[u8]) -> usize {
        let consumed = raw.len();
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();

        if line.is_empty() {
            return consumed;
        }
        if line.starts_with("HTTP/") {
            self.reason = Some(reason_phrase(line).to_string());
            return consumed;
        }

        match line.split_once(':') {
            Some((name, value)) => {
                let (name, value) = (name.trim(), value.trim());
                trace!(handle = %self.handle, name, value, "header line");
                self.headers.append(name, value);
            }
            None => trace!(handle = %self.handle, line, "dropping header line without colon"),
        }
        consumed
    }

    /// Headers absorbed so far.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Reason phrase from the most recent status line, if one was seen.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Finished snapshot: the headers and the reason phrase (empty if none).
    pub fn into_parts(self) -> (Headers, String) {
        (self.headers, self.reason.unwrap_or_default())
    }
}

/// `HTTP/1.1 404 Not Found` -> `Not Found`; `HTTP/2 200` -> ``.
fn reason_phrase(status_line: &str) -> &str {
    status_line.splitn(3, ' ').nth(2).map(str::trim).unwrap_or("")
}
