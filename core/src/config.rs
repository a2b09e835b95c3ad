//! Client configuration.
//!
//! A `ClientConfig` is fixed when the client is built. It can be assembled in
//! code or read from TOML:
//!
//! ```toml
//! batch_size = 25
//! batch_deadline = "30s"
//! precedence = "global_wins"
//!
//! [extra_options]
//! user_agent = "fanout/0.1"
//! timeout = "5s"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::options::{OptionKey, OptionValue, Precedence, TransportOptions};

/// Batch size used when the caller does not pick one.
pub const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Requests run concurrently per batch.
    pub batch_size: usize,
    /// Upper bound on one batch's loop. Also caps each handle's timeout.
    pub batch_deadline: Option<Duration>,
    pub precedence: Precedence,
    /// Applied to every request according to `precedence`.
    pub extra_options: TransportOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_deadline: None,
            precedence: Precedence::default(),
            extra_options: TransportOptions::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    batch_size: Option<usize>,
    batch_deadline: Option<String>,
    precedence: Option<Precedence>,
    extra_options: TransportOptions,
}

impl ClientConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(s)?;

        let batch_size = raw.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        let batch_deadline = match raw.batch_deadline {
            Some(s) => Some(parse_duration(&s).ok_or(ConfigError::InvalidDuration(s))?),
            None => None,
        };

        Ok(Self {
            batch_size,
            batch_deadline,
            precedence: raw.precedence.unwrap_or_default(),
            extra_options: raw.extra_options,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    pub fn with_batch_deadline(self, deadline: Duration) -> Self {
        Self {
            batch_deadline: Some(deadline),
            ..self
        }
    }

    pub fn with_precedence(self, precedence: Precedence) -> Self {
        Self { precedence, ..self }
    }

    pub fn with_extra_option(mut self, key: OptionKey, value: impl Into<OptionValue>) -> Self {
        self.extra_options.insert(key, value);
        self
    }
}

/// Parse a duration string like "5s", "500ms", "1m". A bare number is seconds.
pub(crate) fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
