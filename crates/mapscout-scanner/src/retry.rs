//! Bounded retries around feed discovery.
//!
//! Two failure modes are retried at different granularities. A stale element
//! restarts the discovery loop in place, since the feed position is reacquired
//! on the next read. A stuck feed restarts the whole scan from navigation after
//! a cooldown, and on the last attempt degrades to a soft `failed_to_scroll`
//! flag instead of an error.

use crate::error::{Result, ScanError};
use crate::feed::ScanStep;
use mapscout_core::ScanningConfig;
use std::time::Duration;

/// Retry limits for one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Immediate restarts allowed after stale element errors
    pub stale_retries: u32,
    /// Full scan attempts when the feed gets stuck
    pub max_scan_attempts: u32,
    /// Wait between stuck scan attempts
    pub stuck_cooldown: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &ScanningConfig) -> Self {
        Self {
            stale_retries: config.stale_retries,
            max_scan_attempts: config.max_scan_attempts.max(1),
            stuck_cooldown: config.stuck_cooldown(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ScanningConfig::default())
    }
}

/// A restartable discovery run.
#[async_trait::async_trait]
pub trait Discovery: Send {
    /// Prepare a fresh scan attempt, typically by navigating to the search surface.
    async fn begin_attempt(&mut self, attempt: u32) -> Result<()>;

    /// Run discovery until a terminal step.
    ///
    /// A stuck feed is reported as [`ScanError::StuckInFeed`].
    async fn discover(&mut self) -> Result<ScanStep>;
}

/// What the escalator observed while driving discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Terminal step of the last attempt; `None` if stale retries ran out
    pub final_step: Option<ScanStep>,
    /// Every scan attempt ended stuck
    pub failed_to_scroll: bool,
    /// Scan attempts made
    pub attempts: u32,
}

/// Applies a [`RetryPolicy`] to a [`Discovery`].
#[derive(Debug, Clone, Default)]
pub struct RetryEscalator {
    policy: RetryPolicy,
}

impl RetryEscalator {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Drive `discovery` to completion.
    ///
    /// Errors other than staleness and stuck feeds propagate unchanged.
    pub async fn run<D>(&self, discovery: &mut D) -> Result<DiscoveryReport>
    where
        D: Discovery + ?Sized,
    {
        let max_attempts = self.policy.max_scan_attempts.max(1);
        let mut attempt = 1;

        loop {
            discovery.begin_attempt(attempt).await?;

            match self.discover_with_stale_retries(discovery).await {
                Ok(final_step) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "scan succeeded after retrying");
                    }
                    return Ok(DiscoveryReport {
                        final_step,
                        failed_to_scroll: false,
                        attempts: attempt,
                    });
                }
                Err(ScanError::StuckInFeed { elapsed }) if attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        ?elapsed,
                        "Feed stuck, retrying scan in {:?}...",
                        self.policy.stuck_cooldown
                    );
                    tokio::time::sleep(self.policy.stuck_cooldown).await;
                    attempt += 1;
                }
                Err(ScanError::StuckInFeed { elapsed }) => {
                    tracing::error!(
                        attempts = attempt,
                        ?elapsed,
                        "Feed stuck on every attempt, keeping partial results"
                    );
                    return Ok(DiscoveryReport {
                        final_step: Some(ScanStep::Stuck),
                        failed_to_scroll: true,
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn discover_with_stale_retries<D>(&self, discovery: &mut D) -> Result<Option<ScanStep>>
    where
        D: Discovery + ?Sized,
    {
        let mut retries = 0;
        loop {
            match discovery.discover().await {
                Ok(step) => return Ok(Some(step)),
                Err(e) if e.is_stale() && retries < self.policy.stale_retries => {
                    retries += 1;
                    tracing::debug!(retry = retries, "stale element, restarting discovery: {}", e);
                }
                Err(e) if e.is_stale() => {
                    tracing::warn!(retries, "giving up on stale feed: {}", e);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
