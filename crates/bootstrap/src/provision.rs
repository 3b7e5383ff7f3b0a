//! The bootstrap sequence: connect, wait for readiness, ensure the database,
//! migrate, seed

use crate::error::{classify, BootstrapError, Phase, Result};
use crate::migrate::{migrate, MigrationReport};
use crate::readiness::{Readiness, StatusChecker};
use crate::seed::{seed, SeedReport};
use seedbed_core::{
    AdminUser, ClientError, ConnectionConfig, Connector, DatabaseClient, Deadline, Fixture, Timeouts,
};
use tracing::{error, info};

/// Database handle type produced by a connector
pub type DatabaseOf<C> = <<C as Connector>::Client as DatabaseClient>::Database;

/// A provisioned database and what it took to get there
#[derive(Debug)]
pub struct Provisioned<D> {
    /// Live handle to the logical database
    pub db: D,
    /// Whether the database was created by this run
    pub created: bool,
    /// Readiness polling outcome
    pub readiness: Readiness,
    /// Collections ensured
    pub migration: MigrationReport,
    /// Seed outcome
    pub seed: SeedReport,
}

/// Brings a logical database to a known state on a running server
#[derive(Debug, Clone)]
pub struct Provisioner<C> {
    connector: C,
    admin: AdminUser,
    timeouts: Timeouts,
}

impl<C: Connector> Provisioner<C> {
    /// Provisioner that grants `admin` access to the databases it creates
    pub fn new(connector: C, admin: AdminUser) -> Self {
        Self {
            connector,
            admin,
            timeouts: Timeouts::default(),
        }
    }

    /// Replace the per-call bounds
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Connector used to build clients
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Current per-call bounds
    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Run the whole sequence against the server described by `config`.
    ///
    /// `deadline` bounds everything; each network call additionally gets its
    /// own bound from [`Timeouts`]. Readiness is established before any
    /// schema operation. Not atomic against another provisioner using the
    /// same database name at the same time.
    pub fn provision(
        &self,
        config: &ConnectionConfig,
        database: &str,
        fixture: &Fixture,
        deadline: &Deadline,
    ) -> Result<Provisioned<DatabaseOf<C>>> {
        let endpoint = config.endpoint();
        let fail = |phase: Phase, err: BootstrapError| {
            error!(target: "seedbed::provision", database, %phase, error = %err, "provisioning failed");
            BootstrapError::provisioning(database, phase, err)
        };

        let client = self.connector.connect(config).map_err(|cause| {
            fail(
                Phase::Connect,
                BootstrapError::Connection {
                    endpoint: endpoint.clone(),
                    cause,
                },
            )
        })?;

        let readiness = StatusChecker::new(self.timeouts.backoff_base())
            .with_probe_timeout(self.timeouts.probe())
            .wait(&client, &endpoint, deadline)
            .map_err(|e| fail(Phase::AwaitReady, e))?;

        let (db, created) = self
            .open_or_create(&client, database, deadline)
            .map_err(|e| fail(Phase::Database, e))?;

        let migration = migrate(
            &db,
            &fixture.document_collections,
            &fixture.edge_collections,
            deadline,
            self.timeouts.collection_call(),
        )
        .map_err(|e| fail(Phase::Migrate, e))?;

        let seeded = seed(&db, &fixture.seed_batch(), deadline, self.timeouts.seed())
            .map_err(|e| fail(Phase::Seed, e))?;

        info!(
            target: "seedbed::provision",
            database,
            endpoint = %endpoint,
            created,
            collections = migration.len(),
            seed_rows = seeded.rows,
            "database provisioned"
        );
        Ok(Provisioned {
            db,
            created,
            readiness,
            migration,
            seed: seeded,
        })
    }

    /// Create the database if it is absent, otherwise open it
    fn open_or_create(
        &self,
        client: &C::Client,
        name: &str,
        deadline: &Deadline,
    ) -> Result<(DatabaseOf<C>, bool)> {
        let wrap = |operation: &'static str| {
            move |cause: ClientError| {
                classify(cause, operation, |cause| BootstrapError::Database {
                    name: name.to_string(),
                    cause,
                })
            }
        };

        let exists = client
            .database_exists(name, &deadline.child(self.timeouts.database_call()))
            .map_err(wrap("database check"))?;

        if exists {
            let db = client
                .database(name, &deadline.child(self.timeouts.database_call()))
                .map_err(wrap("database open"))?;
            info!(target: "seedbed::provision", database = name, "database opened");
            Ok((db, false))
        } else {
            let db = client
                .create_database(
                    name,
                    &self.admin,
                    &deadline.child(self.timeouts.database_call()),
                )
                .map_err(wrap("database creation"))?;
            info!(target: "seedbed::provision", database = name, admin = %self.admin.username, "database created");
            Ok((db, true))
        }
    }
}
