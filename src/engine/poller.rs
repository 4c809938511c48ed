// src/engine/poller.rs

//! Readiness polling against the object store.
//!
//! A missing artifact is a state, not an error: `wait_until_ready` absorbs
//! it and reports [`PollOutcome::Exhausted`] once the attempt budget is
//! spent. A failed check that is not fatal counts as "not found yet";
//! credential failures are returned immediately without another check.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BatchConfig;
use crate::errors::Result;
use crate::store::ObjectStoreGate;
use crate::units::ArtifactRef;

/// Per-target attempt counter. Lives for one `wait_until_ready` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    max_attempts: u32,
    interval: Duration,
}

impl RetryState {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            interval,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready { attempts: u32 },
    Exhausted { attempts: u32 },
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Ready { attempts } | PollOutcome::Exhausted { attempts } => *attempts,
        }
    }
}

#[derive(Debug)]
pub struct ReadinessPoller<'a, G: ?Sized> {
    gate: &'a G,
    max_attempts: u32,
    interval: Duration,
}

impl<'a, G: ObjectStoreGate + ?Sized> ReadinessPoller<'a, G> {
    pub fn new(gate: &'a G, max_attempts: u32, interval: Duration) -> Self {
        Self {
            gate,
            max_attempts,
            interval,
        }
    }

    pub fn from_config(gate: &'a G, cfg: &BatchConfig) -> Self {
        Self::new(gate, cfg.retry.max_attempts, cfg.retry_interval())
    }

    /// Single existence check.
    pub async fn is_ready(&self, artifact: &ArtifactRef) -> Result<bool> {
        self.gate.exists(&artifact.remote_key()).await
    }

    /// Poll with the configured budget.
    pub async fn wait_until_ready(&self, artifact: &ArtifactRef) -> Result<PollOutcome> {
        self.wait_until_ready_with(artifact, self.max_attempts, self.interval)
            .await
    }

    /// Check up to `max_attempts` times, sleeping `interval` between checks
    /// (never after the last one).
    pub async fn wait_until_ready_with(
        &self,
        artifact: &ArtifactRef,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<PollOutcome> {
        let key = artifact.remote_key();
        let started = Instant::now();
        let mut retry = RetryState::new(max_attempts, interval);

        while !retry.is_exhausted() {
            retry.record_attempt();
            let found = match self.gate.exists(&key).await {
                Ok(found) => found,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(
                        unit = %artifact.unit,
                        key = %key,
                        attempt = retry.attempts(),
                        error = %err,
                        "existence check failed; counting as not found"
                    );
                    false
                }
            };
            if found {
                info!(
                    unit = %artifact.unit,
                    key = %key,
                    attempt = retry.attempts(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "artifact ready"
                );
                return Ok(PollOutcome::Ready {
                    attempts: retry.attempts(),
                });
            }

            if retry.is_exhausted() {
                break;
            }

            debug!(
                unit = %artifact.unit,
                key = %key,
                attempt = retry.attempts(),
                max_attempts,
                "artifact not found yet; waiting"
            );
            tokio::time::sleep(retry.interval()).await;
        }

        warn!(
            unit = %artifact.unit,
            key = %key,
            attempts = retry.attempts(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "gave up waiting for artifact"
        );
        Ok(PollOutcome::Exhausted {
            attempts: retry.attempts(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BatchError;
    use crate::store::MemoryGate;
    use crate::units::SimulationUnit;

    fn artifact() -> ArtifactRef {
        let unit = SimulationUnit::new("74", "GLDAS", "VIC", "3H", "1980-02".parse().unwrap());
        ArtifactRef::initial_state(&unit)
    }

    #[tokio::test(start_paused = true)]
    async fn absent_artifact_exhausts_after_exactly_k_checks() {
        let gate = MemoryGate::new();
        let poller = ReadinessPoller::new(&gate, 4, Duration::from_secs(10));
        let started = Instant::now();

        let outcome = poller.wait_until_ready(&artifact()).await.unwrap();

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 4 });
        assert_eq!(gate.exists_calls(&artifact().remote_key()), 4);
        // three sleeps between four checks
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn becomes_ready_after_delayed_visibility() {
        let gate = MemoryGate::new();
        let key = artifact().remote_key();
        gate.put(&key, b"state".to_vec());
        gate.hide_for(&key, 2);

        let poller = ReadinessPoller::new(&gate, 25, Duration::from_secs(10));
        let outcome = poller.wait_until_ready(&artifact()).await.unwrap();

        assert_eq!(outcome, PollOutcome::Ready { attempts: 3 });
        assert!(outcome.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn credential_error_short_circuits() {
        let gate = MemoryGate::new();
        gate.expire_credentials_after(2);

        let poller = ReadinessPoller::new(&gate, 10, Duration::from_secs(10));
        let err = poller.wait_until_ready(&artifact()).await.unwrap_err();

        assert!(matches!(err, BatchError::Credential(_)));
        // two charged checks succeeded, the third failed; no further attempts
        assert_eq!(gate.exists_calls(&artifact().remote_key()), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_storage_error_counts_as_a_failed_check() {
        let gate = MemoryGate::new();
        let key = artifact().remote_key();
        gate.put(&key, b"state".to_vec());
        gate.fail_checks(&key, 1);

        let poller = ReadinessPoller::new(&gate, 3, Duration::from_secs(10));
        let outcome = poller.wait_until_ready(&artifact()).await.unwrap();

        assert_eq!(outcome, PollOutcome::Ready { attempts: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_makes_no_checks() {
        let gate = MemoryGate::new();
        let poller = ReadinessPoller::new(&gate, 0, Duration::from_secs(10));
        let outcome = poller.wait_until_ready(&artifact()).await.unwrap();
        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 0 });
        assert_eq!(gate.exists_calls(&artifact().remote_key()), 0);
    }
}
