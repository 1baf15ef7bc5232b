//! Backoff engine
//!
//! Computes the delay before each retry of a logical operation.
//!
//! A [`BackoffState`] belongs to exactly one logical operation (a single
//! request including its internal retries, or one page of a listing). Its
//! attempt counter only ever grows; a token refresh in the middle of the
//! operation keeps using the same state, so an operation whose token keeps
//! being rejected still sees its delay grow and still runs out of attempts.
//! Only a new logical operation calls [`BackoffConfig::start`] (or
//! [`BackoffState::reset`]) to get a fresh counter.

use crate::config::duration_ms;
use crate::types::BackoffType;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Randomisation applied on top of the computed delay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Jitter {
    /// Use the computed delay as is
    None,
    /// Uniform in `[0, delay]`
    Full,
    /// Uniform in `delay ± delay * factor / 2`
    Proportional {
        /// Width of the window relative to the delay (0.0 - 1.0)
        factor: f64,
    },
}

impl Default for Jitter {
    fn default() -> Self {
        Jitter::Proportional { factor: 0.2 }
    }
}

impl Jitter {
    fn apply(self, delay: Duration) -> Duration {
        let factor = match self {
            Jitter::None => return delay,
            Jitter::Full => {
                let millis = delay.as_millis() as u64;
                if millis == 0 {
                    return delay;
                }
                return Duration::from_millis(rand::thread_rng().gen_range(0..=millis));
            }
            Jitter::Proportional { factor } => factor.clamp(0.0, 1.0),
        };

        if factor == 0.0 {
            return delay;
        }

        let millis = delay.as_millis() as f64;
        let range = millis * factor;
        let jitter = rand::thread_rng().gen_range(-range / 2.0..=range / 2.0);
        Duration::from_millis((millis + jitter).max(0.0) as u64)
    }
}

/// Retry budget and delay curve for one logical operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Growth curve
    #[serde(rename = "type")]
    pub backoff_type: BackoffType,
    /// Delay before the first retry
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    /// Upper bound for any single delay
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    /// Total attempts allowed, the first one included
    pub max_attempts: u32,
    /// Randomisation policy
    pub jitter: Jitter,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            backoff_type: BackoffType::Exponential,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            max_attempts: 4,
            jitter: Jitter::default(),
        }
    }
}

impl BackoffConfig {
    /// Create an exponential config without jitter
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            backoff_type: BackoffType::Exponential,
            base_delay,
            max_delay,
            max_attempts,
            jitter: Jitter::None,
        }
    }

    /// Set the growth curve
    #[must_use]
    pub fn with_type(mut self, backoff_type: BackoffType) -> Self {
        self.backoff_type = backoff_type;
        self
    }

    /// Set the jitter policy
    #[must_use]
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Start a fresh state for a new logical operation
    pub fn start(&self) -> BackoffState {
        BackoffState {
            attempt: 0,
            config: self.clone(),
        }
    }

    /// Delay for a zero-based retry index, before jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match self.backoff_type {
            BackoffType::Constant => Some(self.base_delay),
            BackoffType::Linear => self.base_delay.checked_mul(attempt.saturating_add(1)),
            BackoffType::Exponential => 2u32
                .checked_pow(attempt)
                .and_then(|factor| self.base_delay.checked_mul(factor)),
        };

        delay.map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Outcome of consulting the engine after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextDelay {
    /// How long to wait before the next attempt (zero when exhausted)
    pub delay: Duration,
    /// No attempts remain
    pub exhausted: bool,
}

/// Per-operation retry state
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffState {
    attempt: u32,
    config: BackoffConfig,
}

impl BackoffState {
    /// Failed attempts recorded so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Attempt ceiling, never below one
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Config this state was started from
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Whether the attempt budget is spent
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts()
    }

    /// Record a failed attempt and compute the wait before the next one
    pub fn next_delay(&mut self) -> NextDelay {
        let retry_index = self.attempt;
        self.attempt = self.attempt.saturating_add(1);

        if self.is_exhausted() {
            return NextDelay {
                delay: Duration::ZERO,
                exhausted: true,
            };
        }

        let delay = self.config.delay_for(retry_index);
        NextDelay {
            delay: self.config.jitter.apply(delay).min(self.config.max_delay),
            exhausted: false,
        }
    }

    /// Fresh state with the same config, for a new logical operation
    pub fn reset(&self) -> BackoffState {
        self.config.start()
    }
}
