//! Readiness polling with linear backoff
//!
//! The probe is `list_databases`. After the n-th failed probe the checker
//! sleeps `n × base_interval`, capped by what is left of the deadline, then
//! probes again. The only attempt limit is the deadline itself.

use crate::error::{BootstrapError, Result};
use seedbed_core::{ClientError, DatabaseClient, Deadline, Interrupt};
use std::time::Duration;
use tracing::{debug, info};

/// Default backoff unit
pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of a successful readiness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// Probes issued, the successful one included
    pub attempts: u32,
    /// Time from the first probe until success, per the deadline's clock
    pub waited: Duration,
}

/// Polls a server until it answers
#[derive(Debug, Clone, Copy)]
pub struct StatusChecker {
    base_interval: Duration,
    probe_timeout: Option<Duration>,
}

impl Default for StatusChecker {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_INTERVAL)
    }
}

impl StatusChecker {
    /// Checker with the given backoff unit; probes are bounded only by the
    /// overall deadline
    pub fn new(base_interval: Duration) -> Self {
        Self {
            base_interval,
            probe_timeout: None,
        }
    }

    /// Bound each probe separately, never past the overall deadline
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Sleep after the `attempt`-th failed probe
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_interval.saturating_mul(attempt)
    }

    /// Probe `client` until it answers or `deadline` ends
    pub fn wait<C>(&self, client: &C, endpoint: &str, deadline: &Deadline) -> Result<Readiness>
    where
        C: DatabaseClient + ?Sized,
    {
        let clock = deadline.clock();
        let started = clock.now();
        let mut attempts = 0u32;
        let mut last_error: Option<ClientError> = None;

        loop {
            if let Err(interrupt) = deadline.check() {
                return Err(interrupted(interrupt, endpoint, attempts, last_error));
            }

            attempts += 1;
            let probe = match self.probe_timeout {
                Some(timeout) => deadline.child(timeout),
                None => deadline.clone(),
            };
            match client.list_databases(&probe) {
                Ok(_) => {
                    let waited = clock.now().saturating_duration_since(started);
                    info!(target: "seedbed::readiness", endpoint, attempts, waited_ms = waited.as_millis() as u64, "server ready");
                    return Ok(Readiness { attempts, waited });
                }
                Err(e) => {
                    debug!(target: "seedbed::readiness", endpoint, attempt = attempts, error = %e, "probe failed");
                    last_error = Some(e);
                }
            }

            if let Err(interrupt) = deadline.sleep(self.backoff(attempts)) {
                return Err(interrupted(interrupt, endpoint, attempts, last_error));
            }
        }
    }
}

fn interrupted(
    interrupt: Interrupt,
    endpoint: &str,
    attempts: u32,
    last_error: Option<ClientError>,
) -> BootstrapError {
    match interrupt {
        Interrupt::Cancelled => BootstrapError::Cancelled {
            operation: "readiness check",
        },
        Interrupt::Expired => BootstrapError::Unreachable {
            endpoint: endpoint.to_string(),
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "deadline elapsed before the first probe".to_string()),
        },
    }
}

/// Wait until `client` answers, sleeping `attempt × base_interval` between
/// failed probes
pub fn check_ready<C>(
    client: &C,
    endpoint: &str,
    deadline: &Deadline,
    base_interval: Duration,
) -> Result<Readiness>
where
    C: DatabaseClient + ?Sized,
{
    StatusChecker::new(base_interval).wait(client, endpoint, deadline)
}
