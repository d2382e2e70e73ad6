//! Runtime configuration.
//!
//! All values have defaults. Override them via environment variables
//! (prefixed `BEMPP_GATHER_`) or by constructing a custom `GatherConfig`.

use std::time::Duration;

use crate::constants::{DEFAULT_TIMEOUT_MS, ENV_MAX_CHUNK_BYTES, ENV_TIMEOUT_MS, MAX_CHUNK_BYTES};

/// Tuning parameters for gather calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherConfig {
    /// Longest time an in-process exchange waits for a peer.
    ///
    /// Read by [`LocalGroup::create`](crate::group::LocalGroup::create) only.
    /// A `Collectives` handle ignores it.
    pub timeout: Duration,

    /// Largest encoded chunk a rank may contribute to a serialized gather.
    ///
    /// Values above the transport limit of `i32::MAX` bytes are clamped.
    pub max_chunk_bytes: usize,
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_chunk_bytes: MAX_CHUNK_BYTES,
        }
    }
}

impl GatherConfig {
    /// Load the configuration from the environment, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `BEMPP_GATHER_TIMEOUT_MS`
    /// - `BEMPP_GATHER_MAX_CHUNK_BYTES`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Values that fail to parse are ignored.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut cfg = Self::default();

        if let Some(ms) = lookup(ENV_TIMEOUT_MS).and_then(|v| v.parse::<u64>().ok()) {
            cfg.timeout = Duration::from_millis(ms);
        }

        if let Some(n) = lookup(ENV_MAX_CHUNK_BYTES).and_then(|v| v.parse::<usize>().ok()) {
            cfg.max_chunk_bytes = n.min(MAX_CHUNK_BYTES);
        }

        if cfg != Self::default() {
            tracing::debug!(?cfg, "gather configuration overridden from environment");
        }

        cfg
    }

    /// Set the in-process exchange timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the largest encoded chunk per rank.
    pub fn with_max_chunk_bytes(mut self, bytes: usize) -> Self {
        self.max_chunk_bytes = bytes.min(MAX_CHUNK_BYTES);
        self
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::GatherConfig;

    #[test]
    fn test_config_overrides() {
        let cfg = GatherConfig::from_lookup(|key| match key {
            "BEMPP_GATHER_TIMEOUT_MS" => Some("250".to_string()),
            "BEMPP_GATHER_MAX_CHUNK_BYTES" => Some("not a number".to_string()),
            _ => None,
        });

        assert_eq!(cfg.timeout, Duration::from_millis(250));
        assert_eq!(cfg.max_chunk_bytes, GatherConfig::default().max_chunk_bytes);
    }
}
