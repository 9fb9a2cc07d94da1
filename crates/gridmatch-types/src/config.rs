//! Configuration types for GridMatch nodes.
//!
//! Every section deserializes with defaults, so an empty TOML file is a
//! valid configuration. Durations are expressed in milliseconds.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{GridmatchError, MarketId, Result, constants};

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address for the HTTP/WS API.
    pub listen_addr: SocketAddr,
    /// Market used when a submission names none.
    pub default_market: MarketId,
    pub broadcast: BroadcastConfig,
    pub settlement: SettlementConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                constants::DEFAULT_API_PORT,
            ),
            default_market: MarketId::default(),
            broadcast: BroadcastConfig::default(),
            settlement: SettlementConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Reject values that would make the node misbehave at runtime.
    ///
    /// # Errors
    /// [`GridmatchError::Configuration`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.default_market.as_str().trim().is_empty() {
            return Err(GridmatchError::Configuration(
                "default_market must not be empty".into(),
            ));
        }
        if self.broadcast.subscriber_queue == 0 {
            return Err(GridmatchError::Configuration(
                "broadcast.subscriber_queue must be at least 1".into(),
            ));
        }
        self.settlement.validate()
    }
}

/// Subscriber fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Per-subscriber queue depth; a full queue disconnects the subscriber.
    pub subscriber_queue: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_queue: constants::DEFAULT_SUBSCRIBER_QUEUE,
        }
    }
}

/// Settlement sorting and submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Concurrent participant metric reads per epoch.
    pub metric_fetch_concurrency: usize,
    /// Attempts per metric read before the participant is excluded.
    pub metric_fetch_attempts: u32,
    pub metric_fetch_backoff_ms: u64,
    /// Inclusive hour window summed for buyer consumption.
    pub buyer_window_start_hour: u32,
    pub buyer_window_end_hour: u32,
    /// Commit retry policy.
    pub retry: RetryConfig,
    /// Bound on each individual ledger call.
    pub attempt_timeout_ms: u64,
    /// Payloads larger than this are externalized to the blob store.
    pub inline_payload_limit: usize,
    /// How often uncommitted epochs are re-attempted.
    pub retry_pass_interval_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            metric_fetch_concurrency: constants::DEFAULT_METRIC_FETCH_CONCURRENCY,
            metric_fetch_attempts: constants::DEFAULT_METRIC_FETCH_ATTEMPTS,
            metric_fetch_backoff_ms: constants::DEFAULT_METRIC_FETCH_BACKOFF_MS,
            buyer_window_start_hour: constants::DEFAULT_BUYER_WINDOW_START_HOUR,
            buyer_window_end_hour: constants::DEFAULT_BUYER_WINDOW_END_HOUR,
            retry: RetryConfig::default(),
            attempt_timeout_ms: constants::DEFAULT_ATTEMPT_TIMEOUT_MS,
            inline_payload_limit: constants::DEFAULT_INLINE_PAYLOAD_LIMIT,
            retry_pass_interval_ms: constants::DEFAULT_RETRY_PASS_INTERVAL_MS,
        }
    }
}

impl SettlementConfig {
    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    #[must_use]
    pub fn retry_pass_interval(&self) -> Duration {
        Duration::from_millis(self.retry_pass_interval_ms)
    }

    #[must_use]
    pub fn metric_fetch_backoff(&self) -> Duration {
        Duration::from_millis(self.metric_fetch_backoff_ms)
    }

    /// # Errors
    /// [`GridmatchError::Configuration`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.metric_fetch_concurrency == 0 {
            return Err(GridmatchError::Configuration(
                "settlement.metric_fetch_concurrency must be at least 1".into(),
            ));
        }
        if self.metric_fetch_attempts == 0 {
            return Err(GridmatchError::Configuration(
                "settlement.metric_fetch_attempts must be at least 1".into(),
            ));
        }
        let hours = u32::try_from(constants::HOURS_PER_DAY).unwrap_or(24);
        if self.buyer_window_start_hour > self.buyer_window_end_hour
            || self.buyer_window_end_hour >= hours
        {
            return Err(GridmatchError::Configuration(format!(
                "settlement buyer window {}..={} is not a valid hour range",
                self.buyer_window_start_hour, self.buyer_window_end_hour
            )));
        }
        if self.attempt_timeout_ms == 0 || self.retry_pass_interval_ms == 0 {
            return Err(GridmatchError::Configuration(
                "settlement timeouts and intervals must be non-zero".into(),
            ));
        }
        self.retry.validate()
    }
}

/// Bounded exponential backoff for ledger commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    /// Fraction of the delay randomized, 0.0 to 1.0.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_COMMIT_ATTEMPTS,
            initial_backoff_ms: constants::DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: constants::DEFAULT_MAX_BACKOFF_MS,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Fast, jitter-free policy for tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    /// # Errors
    /// [`GridmatchError::Configuration`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(GridmatchError::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.multiplier < 1.0 {
            return Err(GridmatchError::Configuration(
                "retry.multiplier must be >= 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(GridmatchError::Configuration(
                "retry.jitter must be within 0.0..=1.0".into(),
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(GridmatchError::Configuration(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".into(),
            ));
        }
        Ok(())
    }
}
