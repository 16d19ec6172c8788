// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Linear retry backoff for connection errors.
//!
//! Retry `n` waits `base_delay * n`. Once `max_retries` retries have been
//! handed out, [`Backoff::next_retry`] returns `None` and the failure is
//! terminal until [`Backoff::reset`] is called after a success.

use crate::config::RetryConfig;
use std::time::Duration;

/// Retry counter with linear backoff.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    retry_count: u32,
}

impl Backoff {
    /// Create a backoff from a retry policy.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            retry_count: 0,
        }
    }

    /// Request the next retry.
    ///
    /// Returns `Some(delay)` if another attempt is allowed,
    /// `None` if the retry cap is reached.
    pub fn next_retry(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.retry_count += 1;
        Some(self.delay_for(self.retry_count))
    }

    /// Delay for the given (1-based) retry.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.config.base_delay().saturating_mul(retry)
    }

    /// Forget accumulated retries.
    pub fn reset(&mut self) {
        self.retry_count = 0;
    }

    /// Retries handed out since the last reset.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Check if the retry cap has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.config.max_retries
    }

    /// Retry policy in use.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
