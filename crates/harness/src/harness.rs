//! Lifecycle of a disposable, provisioned database environment
//!
//! ```text
//! Uninitialized -> InstanceStarting -> AwaitingReady -> Provisioning -> Ready -> TornDown
//!        \_______________\__________________\_______________\_____________> Failed
//! ```
//!
//! [`Harness::launch`] owns the instance it starts and stops it on teardown.
//! [`Harness::launch_on`] provisions on an instance from
//! [`Harness::start_shared`]; teardown then only flushes logs. Any failure
//! before `Ready` captures the instance logs, stops an owned instance and
//! returns [`HarnessError`]; no partial environment escapes.

use crate::auth::{Authenticator, SigningError};
use crate::config::HarnessConfig;
use crate::logs::LogCapture;
use parking_lot::Mutex;
use seedbed_bootstrap::{
    BootstrapError, DatabaseOf, MigrationReport, Provisioner, Readiness, SeedReport, StatusChecker,
};
use seedbed_core::{
    CancelToken, ClientError, Clock, ConfigError, Connector, Deadline, Fixture, InstanceManager,
    InstanceRef, SystemClock,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

// ============================================================================
// State machine
// ============================================================================

/// Where a run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HarnessState {
    /// Nothing done yet
    Uninitialized,
    /// Starting the database instance
    InstanceStarting,
    /// Polling the instance until it answers
    AwaitingReady,
    /// Creating the database, collections and seed data
    Provisioning,
    /// Environment handed to the caller
    Ready,
    /// Teardown finished
    TornDown,
    /// A step before `Ready` failed; absorbing
    Failed,
}

impl HarnessState {
    /// No transition leaves this state
    pub fn is_terminal(self) -> bool {
        matches!(self, HarnessState::TornDown | HarnessState::Failed)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: HarnessState) -> bool {
        use HarnessState::*;
        match (self, next) {
            (Ready, Failed) => false,
            (from, Failed) => !from.is_terminal(),
            (Uninitialized, InstanceStarting)
            | (Uninitialized, AwaitingReady)
            | (InstanceStarting, AwaitingReady)
            | (AwaitingReady, Provisioning)
            | (Provisioning, Ready)
            | (Ready, TornDown) => true,
            _ => false,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            HarnessState::Uninitialized => "uninitialized",
            HarnessState::InstanceStarting => "instance-starting",
            HarnessState::AwaitingReady => "awaiting-ready",
            HarnessState::Provisioning => "provisioning",
            HarnessState::Ready => "ready",
            HarnessState::TornDown => "torn-down",
            HarnessState::Failed => "failed",
        }
    }
}

impl fmt::Display for HarnessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state plus every state visited, in order
#[derive(Debug, Clone)]
struct Lifecycle {
    history: Vec<HarnessState>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            history: vec![HarnessState::Uninitialized],
        }
    }

    fn state(&self) -> HarnessState {
        self.history
            .last()
            .copied()
            .unwrap_or(HarnessState::Uninitialized)
    }

    /// Record `next`; illegal transitions are logged and ignored
    fn advance(&mut self, next: HarnessState) -> bool {
        let from = self.state();
        if !from.can_transition_to(next) {
            warn!(target: "seedbed::harness", %from, to = %next, "ignoring illegal state transition");
            return false;
        }
        self.history.push(next);
        info!(target: "seedbed::harness", %from, to = %next, "state transition");
        true
    }
}

// ============================================================================
// Errors
// ============================================================================

/// What went wrong before the environment became ready
#[derive(Debug, Error)]
pub enum LaunchFailure {
    /// Fixture or database name rejected before any work
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The instance manager failed
    #[error("instance: {0}")]
    Instance(#[source] ClientError),

    /// Readiness or provisioning failed
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}

/// A launch failed; carries the state it failed in and the captured logs
#[derive(Debug, Error)]
#[error("harness failed while {state}: {source}")]
pub struct HarnessError {
    /// State the run was in when the failure happened
    pub state: HarnessState,
    /// Cause
    #[source]
    pub source: LaunchFailure,
    /// Harness logs plus whatever the instance logged
    pub logs: String,
}

impl HarnessError {
    /// The bootstrap error, if readiness or provisioning failed
    pub fn bootstrap(&self) -> Option<&BootstrapError> {
        match &self.source {
            LaunchFailure::Bootstrap(err) => Some(err),
            _ => None,
        }
    }
}

// ============================================================================
// Instances
// ============================================================================

/// An instance started for use by several environments
///
/// Stopped by [`SharedInstance::stop`] or on drop.
pub struct SharedInstance {
    instance: InstanceRef,
    instances: Arc<dyn InstanceManager>,
    stopped: AtomicBool,
}

impl fmt::Debug for SharedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedInstance")
            .field("instance", &self.instance)
            .field("stopped", &self.stopped.load(Ordering::SeqCst))
            .finish()
    }
}

impl SharedInstance {
    /// The running instance
    pub fn instance(&self) -> &InstanceRef {
        &self.instance
    }

    /// Everything the instance logged so far
    pub fn logs(&self) -> String {
        self.instances.dump_logs(&self.instance)
    }

    /// Stop the instance; later calls do nothing
    pub fn stop(&self) -> Result<(), ClientError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(target: "seedbed::harness", instance = %self.instance.id, "stopping shared instance");
        self.instances.stop_instance(&self.instance)
    }
}

impl Drop for SharedInstance {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(target: "seedbed::harness", instance = %self.instance.id, error = %e, "failed to stop shared instance");
        }
    }
}

// ============================================================================
// Teardown
// ============================================================================

/// Releases an environment exactly once
///
/// Runs on drop if the caller never ran it.
pub struct Teardown {
    log: LogCapture,
    owned: Option<(Arc<dyn InstanceManager>, InstanceRef)>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    output: Mutex<Option<String>>,
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Teardown")
            .field("owned", &self.owned.as_ref().map(|(_, i)| i))
            .field("done", &self.is_done())
            .finish()
    }
}

impl Teardown {
    /// Stop the owned instance, if any, then flush the captured logs.
    ///
    /// Returns the flushed text. Later calls return the same text without
    /// stopping or printing again.
    pub fn run(&self) -> String {
        let mut output = self.output.lock();
        if let Some(text) = output.as_ref() {
            return text.clone();
        }

        self.log.in_scope(|| {
            if let Some((instances, instance)) = &self.owned {
                match instances.stop_instance(instance) {
                    Ok(()) => {
                        info!(target: "seedbed::harness", instance = %instance.id, "instance stopped")
                    }
                    Err(e) => {
                        warn!(target: "seedbed::harness", instance = %instance.id, error = %e, "failed to stop instance")
                    }
                }
            }
            self.lifecycle.lock().advance(HarnessState::TornDown);
        });

        let text = self.log.flush();
        *output = Some(text.clone());
        text
    }

    /// Whether teardown already ran
    pub fn is_done(&self) -> bool {
        self.output.lock().is_some()
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.run();
    }
}

// ============================================================================
// Environment
// ============================================================================

/// A ready, seeded database plus logger and credential issuer
#[derive(Debug)]
pub struct TestEnv<D> {
    /// Live database handle; do not use after teardown
    pub db: D,
    /// Diagnostic log capture for this run
    pub log: LogCapture,
    /// Credential issuer
    pub auth: Authenticator,
    /// Releases the environment
    pub teardown: Teardown,
    /// Instance the database lives on
    pub instance: InstanceRef,
    /// Database name
    pub database: String,
    /// Readiness polling outcome
    pub readiness: Readiness,
    /// Collections ensured
    pub migration: MigrationReport,
    /// Seed outcome
    pub seed: SeedReport,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl<D> TestEnv<D> {
    /// Valid token for `subject` with `roles`
    pub fn token<R>(&self, subject: &str, roles: R) -> Result<String, SigningError>
    where
        R: IntoIterator,
        R::Item: Into<String>,
    {
        let token = self.auth.issue_token(subject, roles)?;
        self.log
            .in_scope(|| info!(target: "seedbed::harness", subject, "issued test token"));
        Ok(token)
    }

    /// Token that never verifies
    pub fn invalid_token(&self) -> Result<String, SigningError> {
        self.auth.issue_invalid_token()
    }

    /// Current lifecycle state
    pub fn state(&self) -> HarnessState {
        self.lifecycle.lock().state()
    }

    /// Every state this run passed through
    pub fn history(&self) -> Vec<HarnessState> {
        self.lifecycle.lock().history.clone()
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Builds disposable environments
pub struct Harness<C> {
    config: HarnessConfig,
    instances: Arc<dyn InstanceManager>,
    provisioner: Provisioner<C>,
    auth: Authenticator,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
}

impl<C> fmt::Debug for Harness<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("config", &self.config)
            .field("key_id", &self.auth.key_id())
            .finish()
    }
}

impl<C: Connector> Harness<C> {
    /// Validate `config` and generate fresh key material
    pub fn new(
        config: HarnessConfig,
        instances: Arc<dyn InstanceManager>,
        connector: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let provisioner =
            Provisioner::new(connector, config.admin.clone()).with_timeouts(config.timeouts);
        let auth = Authenticator::generate(config.key_id.clone());
        Ok(Self {
            config,
            instances,
            provisioner,
            auth,
            clock: Arc::new(SystemClock),
            cancel: CancelToken::new(),
        })
    }

    /// Read time and sleep through `clock`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Abort bring-up when `cancel` fires
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Credential issuer shared by every environment of this harness
    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// Start an instance that outlives individual environments
    pub fn start_shared(&self) -> Result<SharedInstance, HarnessError> {
        let instance = self
            .instances
            .start_instance(&self.config.instance)
            .map_err(|e| HarnessError {
                state: HarnessState::InstanceStarting,
                source: LaunchFailure::Instance(e),
                logs: String::new(),
            })?;
        info!(target: "seedbed::harness", instance = %instance.id, address = %instance.address(), "shared instance started");
        Ok(SharedInstance {
            instance,
            instances: Arc::clone(&self.instances),
            stopped: AtomicBool::new(false),
        })
    }

    /// Start a dedicated instance and provision `database` on it
    pub fn launch(
        &self,
        database: &str,
        fixture: &Fixture,
    ) -> Result<TestEnv<DatabaseOf<C>>, HarnessError> {
        let run = Run::new(self);
        run.log.in_scope(|| {
            run.preflight(database, fixture)?;
            run.advance(HarnessState::InstanceStarting);
            let instance = self
                .instances
                .start_instance(&self.config.instance)
                .map_err(|e| run.fail(None, LaunchFailure::Instance(e)))?;
            info!(target: "seedbed::harness", instance = %instance.id, address = %instance.address(), "instance started");
            run.bring_up(instance, true, database, fixture)
        })
    }

    /// Provision `database` on an already running shared instance
    pub fn launch_on(
        &self,
        shared: &SharedInstance,
        database: &str,
        fixture: &Fixture,
    ) -> Result<TestEnv<DatabaseOf<C>>, HarnessError> {
        let run = Run::new(self);
        run.log.in_scope(|| {
            run.preflight(database, fixture)?;
            run.bring_up(shared.instance.clone(), false, database, fixture)
        })
    }
}

/// State of one launch
struct Run<'h, C> {
    harness: &'h Harness<C>,
    log: LogCapture,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl<'h, C: Connector> Run<'h, C> {
    fn new(harness: &'h Harness<C>) -> Self {
        Self {
            harness,
            log: LogCapture::new(),
            lifecycle: Arc::new(Mutex::new(Lifecycle::new())),
        }
    }

    fn advance(&self, next: HarnessState) {
        self.lifecycle.lock().advance(next);
    }

    fn preflight(&self, database: &str, fixture: &Fixture) -> Result<(), HarnessError> {
        if !seedbed_core::is_valid_database_name(database) {
            return Err(self.fail(
                None,
                LaunchFailure::Config(ConfigError::Invalid {
                    field: "database",
                    reason: format!("'{database}' is not a valid database name"),
                }),
            ));
        }
        fixture
            .validate()
            .map_err(|e| self.fail(None, LaunchFailure::Config(e)))
    }

    /// Wait for readiness, provision, and hand out the environment
    fn bring_up(
        &self,
        instance: InstanceRef,
        owned: bool,
        database: &str,
        fixture: &Fixture,
    ) -> Result<TestEnv<DatabaseOf<C>>, HarnessError> {
        let harness = self.harness;
        let target = Some((&instance, owned));
        let connection = harness.config.connection_for(&instance);
        let timeouts = harness.config.timeouts;
        let deadline = Deadline::after(Arc::clone(&harness.clock), timeouts.readiness())
            .with_cancel(harness.cancel.clone());

        self.advance(HarnessState::AwaitingReady);
        let endpoint = connection.endpoint();
        let client = harness
            .provisioner
            .connector()
            .connect(&connection)
            .map_err(|cause| {
                self.fail(
                    target,
                    BootstrapError::Connection {
                        endpoint: endpoint.clone(),
                        cause,
                    }
                    .into(),
                )
            })?;
        StatusChecker::new(timeouts.backoff_base())
            .with_probe_timeout(timeouts.probe())
            .wait(&client, &endpoint, &deadline)
            .map_err(|e| self.fail(target, e.into()))?;

        self.advance(HarnessState::Provisioning);
        let provisioned = harness
            .provisioner
            .provision(&connection, database, fixture, &deadline)
            .map_err(|e| self.fail(target, e.into()))?;

        self.advance(HarnessState::Ready);
        info!(target: "seedbed::harness", database, instance = %instance.id, "ready for testing");

        let teardown = Teardown {
            log: self.log.clone(),
            owned: owned.then(|| (Arc::clone(&harness.instances), instance.clone())),
            lifecycle: Arc::clone(&self.lifecycle),
            output: Mutex::new(None),
        };
        Ok(TestEnv {
            db: provisioned.db,
            log: self.log.clone(),
            auth: harness.auth.clone(),
            teardown,
            instance,
            database: database.to_string(),
            readiness: provisioned.readiness,
            migration: provisioned.migration,
            seed: provisioned.seed,
            lifecycle: Arc::clone(&self.lifecycle),
        })
    }

    /// Move to `Failed`, collect the instance logs and stop the instance if
    /// this run owns it
    fn fail(&self, target: Option<(&InstanceRef, bool)>, source: LaunchFailure) -> HarnessError {
        let state = self.lifecycle.lock().state();
        error!(target: "seedbed::harness", %state, error = %source, "launch failed");
        self.advance(HarnessState::Failed);

        if let Some((instance, owned)) = target {
            let instances = &self.harness.instances;
            let dumped = instances.dump_logs(instance);
            if !dumped.is_empty() {
                self.log.append(&dumped);
            }
            if !owned {
                return self.error(state, source);
            }
            match instances.stop_instance(instance) {
                Ok(()) => {
                    info!(target: "seedbed::harness", instance = %instance.id, "instance stopped after failure")
                }
                Err(e) => {
                    warn!(target: "seedbed::harness", instance = %instance.id, error = %e, "failed to stop instance after failure")
                }
            }
        }

        self.error(state, source)
    }

    fn error(&self, state: HarnessState, source: LaunchFailure) -> HarnessError {
        HarnessError {
            state,
            source,
            logs: self.log.contents(),
        }
    }
}
