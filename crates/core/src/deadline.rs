//! Deadlines, clocks and cancellation
//!
//! Every network call made while bootstrapping is bounded by a [`Deadline`].
//! A deadline couples an absolute instant with a [`CancelToken`] shared by
//! the whole run, and reads time through an injected [`Clock`] so that
//! backoff loops can be tested without real sleeping.
//!
//! ```ignore
//! let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//! let run = Deadline::after(clock, Duration::from_secs(10));
//! let call = run.child(Duration::from_millis(1000)); // never outlives `run`
//! call.check()?;
//! ```

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a bounded operation stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupt {
    /// The caller cancelled the run
    #[error("operation cancelled")]
    Cancelled,
    /// The deadline elapsed
    #[error("deadline exceeded")]
    Expired,
}

// ============================================================================
// Cancellation
// ============================================================================

#[derive(Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

/// Explicit cancellation signal shared between a caller and a running operation
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel, waking every thread blocked in [`CancelToken::wait_timeout`]
    pub fn cancel(&self) {
        let mut cancelled = self.state.cancelled.lock();
        *cancelled = true;
        self.state.cond.notify_all();
    }

    /// Whether [`CancelToken::cancel`] has been called
    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock()
    }

    /// Block for `timeout` or until cancelled. Returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut cancelled = self.state.cancelled.lock();
        match Instant::now().checked_add(timeout) {
            Some(until) => {
                while !*cancelled {
                    if self.state.cond.wait_until(&mut cancelled, until).timed_out() {
                        break;
                    }
                }
            }
            None => {
                while !*cancelled {
                    self.state.cond.wait(&mut cancelled);
                }
            }
        }
        *cancelled
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ============================================================================
// Clocks
// ============================================================================

/// Source of time and sleeping for bounded loops
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant
    fn now(&self) -> Instant;

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `true` when woken by `cancel`.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool;
}

/// Wall clock backed by [`Instant::now`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        cancel.wait_timeout(duration)
    }
}

/// Virtual clock for tests
///
/// Sleeping advances virtual time immediately and records the requested
/// duration, so backoff schedules can be asserted exactly.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// Create a clock starting at the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move virtual time forward without recording a sleep
    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }

    /// Total virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return true;
        }
        self.sleeps.lock().push(duration);
        self.advance(duration);
        cancel.is_cancelled()
    }
}

// ============================================================================
// Deadline
// ============================================================================

/// Absolute time bound plus cancellation signal for one operation
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Option<Instant>,
    cancel: CancelToken,
    clock: Arc<dyn Clock>,
}

impl Deadline {
    /// Deadline `timeout` from now
    pub fn after(clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        let at = clock.now().checked_add(timeout);
        Self {
            at,
            cancel: CancelToken::new(),
            clock,
        }
    }

    /// Deadline that has already elapsed
    pub fn expired(clock: Arc<dyn Clock>) -> Self {
        let at = Some(clock.now());
        Self {
            at,
            cancel: CancelToken::new(),
            clock,
        }
    }

    /// Deadline that only ends through cancellation
    pub fn unbounded(clock: Arc<dyn Clock>) -> Self {
        Self {
            at: None,
            cancel: CancelToken::new(),
            clock,
        }
    }

    /// Replace the cancellation token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Deadline for a single call: `timeout` from now, never later than `self`
    pub fn child(&self, timeout: Duration) -> Self {
        let candidate = self.clock.now().checked_add(timeout);
        let at = match (self.at, candidate) {
            (Some(parent), Some(child)) => Some(parent.min(child)),
            (Some(parent), None) => Some(parent),
            (None, child) => child,
        };
        Self {
            at,
            cancel: self.cancel.clone(),
            clock: Arc::clone(&self.clock),
        }
    }

    /// Time left, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(self.clock.now()))
    }

    /// Whether the time bound has elapsed
    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| self.clock.now() >= at)
    }

    /// Cancellation wins over expiry
    pub fn check(&self) -> Result<(), Interrupt> {
        if self.cancel.is_cancelled() {
            Err(Interrupt::Cancelled)
        } else if self.is_expired() {
            Err(Interrupt::Expired)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration` but never past the deadline.
    ///
    /// Returns `Interrupt::Expired` if the deadline elapses during the
    /// sleep and `Interrupt::Cancelled` if the token fires.
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupt> {
        self.check()?;
        let (nap, truncated) = match self.remaining() {
            Some(left) if left < duration => (left, true),
            _ => (duration, false),
        };
        if self.clock.sleep(nap, &self.cancel) {
            return Err(Interrupt::Cancelled);
        }
        if truncated {
            return Err(Interrupt::Expired);
        }
        Ok(())
    }

    /// Token observed by this deadline
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Clock this deadline reads time from
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
