//! Transactional fixture loading

use crate::error::{classify, BootstrapError, Result};
use seedbed_core::{Database, Deadline, SeedBatch};
use std::time::Duration;
use tracing::{debug, error, info};

/// Default bound for the seed query
pub const DEFAULT_SEED_TIMEOUT: Duration = Duration::from_millis(5000);

/// Outcome of a seed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// False when the script was empty and nothing was sent
    pub executed: bool,
    /// Result rows returned by the script
    pub rows: usize,
}

/// Run `batch` as one query, so either every statement applies or none does.
///
/// An empty script is a successful no-op.
pub fn seed<D>(db: &D, batch: &SeedBatch, parent: &Deadline, timeout: Duration) -> Result<SeedReport>
where
    D: Database + ?Sized,
{
    if batch.is_empty() {
        debug!(target: "seedbed::seed", database = db.name(), "empty seed script, skipping");
        return Ok(SeedReport::default());
    }

    let deadline = parent.child(timeout);
    let rows = db
        .run_query(&batch.script, &batch.bind_vars, &deadline)
        .map_err(|cause| {
            error!(target: "seedbed::seed", database = db.name(), error = %cause, "seed script failed");
            classify(cause, "seed", |cause| BootstrapError::Seed {
                script: batch.script.clone(),
                cause,
            })
        })?;

    info!(target: "seedbed::seed", database = db.name(), rows = rows.len(), "seed data loaded");
    Ok(SeedReport {
        executed: true,
        rows: rows.len(),
    })
}
