//! Aggregator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default pump buffer capacity (32 KiB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 32 * 1024;

/// Default delay before re-delivering a notification the writer deferred.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Default bound on consecutive notifications without progress.
pub const DEFAULT_MAX_IDLE_POLLS: u32 = 1024;

/// Configuration for an aggregator and the writer it opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Capacity of the pump buffer in bytes.
    pub buffer_capacity: usize,
    /// What to do when the sink's paired reader is not open yet.
    pub retry: RetryPolicy,
    /// How to treat a declared length that does not match what was written.
    pub length_check: LengthCheck,
    /// Consecutive idle notifications the synchronous driver tolerates.
    pub max_idle_polls: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            retry: RetryPolicy::default(),
            length_check: LengthCheck::default(),
            max_idle_polls: DEFAULT_MAX_IDLE_POLLS,
        }
    }
}

impl AggregatorConfig {
    /// Create a new default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the buffer capacity.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Retry after a fixed delay.
    #[must_use]
    pub fn retry_after(mut self, delay: Duration) -> Self {
        self.retry = RetryPolicy::Fixed { delay };
        self
    }

    /// Never defer writes.
    #[must_use]
    pub fn no_retry(mut self) -> Self {
        self.retry = RetryPolicy::Disabled;
        self
    }

    /// Set the length check.
    #[must_use]
    pub fn length_check(mut self, check: LengthCheck) -> Self {
        self.length_check = check;
        self
    }

    /// Treat length mismatches as errors.
    #[must_use]
    pub fn strict_length(self) -> Self {
        self.length_check(LengthCheck::Strict)
    }

    /// Set the idle poll bound.
    #[must_use]
    pub fn max_idle_polls(mut self, polls: u32) -> Self {
        self.max_idle_polls = polls;
        self
    }
}

/// Policy for writability notifications that arrive while the reading half
/// of a bound pipe has not finished opening.
///
/// Some pipe implementations report space before their reader is usable;
/// writing at that point loses data. The writer then asks its driver to
/// re-deliver the notification later instead of writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Write regardless of the peer state.
    Disabled,
    /// Re-deliver after a fixed delay.
    Fixed {
        /// Delay before the notification is re-delivered.
        #[serde(with = "duration_millis")]
        delay: Duration,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Fixed {
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before re-delivering, if retrying is enabled.
    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::Fixed { delay } => Some(*delay),
        }
    }
}

/// Treatment of a written total that differs from the declared length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthCheck {
    /// Log a warning and close normally.
    #[default]
    Warn,
    /// Record a `LengthMismatch` error.
    Strict,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
