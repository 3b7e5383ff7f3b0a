//! Idempotent collection creation

use crate::error::{classify, BootstrapError, Result};
use seedbed_core::{CollectionKind, CollectionSpec, Database, Deadline};
use std::time::Duration;
use tracing::{error, info};

/// Default bound for each collection creation
pub const DEFAULT_COLLECTION_TIMEOUT: Duration = Duration::from_millis(1000);

/// Collections ensured by a migration, in creation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Every collection that now exists with the requested kind
    pub ensured: Vec<CollectionSpec>,
}

impl MigrationReport {
    /// Number of collections ensured
    pub fn len(&self) -> usize {
        self.ensured.len()
    }

    /// True when nothing was requested
    pub fn is_empty(&self) -> bool {
        self.ensured.is_empty()
    }
}

/// Ensure every document collection and then every edge collection exists.
///
/// Each creation call gets its own deadline, `per_collection_timeout` from
/// when it starts and never past `parent`. The first failure aborts the run;
/// collections created before it are left in place.
pub fn migrate<D>(
    db: &D,
    document_collections: &[String],
    edge_collections: &[String],
    parent: &Deadline,
    per_collection_timeout: Duration,
) -> Result<MigrationReport>
where
    D: Database + ?Sized,
{
    let specs = document_collections
        .iter()
        .map(CollectionSpec::document)
        .chain(edge_collections.iter().map(CollectionSpec::edge));

    let mut report = MigrationReport::default();
    for spec in specs {
        ensure_collection(db, &spec.name, spec.kind, parent, per_collection_timeout)?;
        report.ensured.push(spec);
    }
    info!(target: "seedbed::migrate", database = db.name(), collections = report.len(), "schema ready");
    Ok(report)
}

fn ensure_collection<D>(
    db: &D,
    name: &str,
    kind: CollectionKind,
    parent: &Deadline,
    timeout: Duration,
) -> Result<()>
where
    D: Database + ?Sized,
{
    let deadline = parent.child(timeout);
    db.create_collection(name, kind, &deadline).map_err(|cause| {
        error!(target: "seedbed::migrate", database = db.name(), collection = name, %kind, error = %cause, "collection creation failed");
        classify(cause, "schema migration", |cause| BootstrapError::Schema {
            collection: name.to_string(),
            kind,
            cause,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedbed_core::{
        AdminUser, CancelToken, ClientError, ConnectionConfig, Connector, DatabaseClient,
        ManualClock, SystemClock,
    };
    use seedbed_memory::{MemoryDatabase, MemoryServer};
    use std::sync::Arc;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn database(server: &MemoryServer) -> MemoryDatabase {
        let client = server
            .connect(&ConnectionConfig {
                password: "pw".to_string(),
                ..ConnectionConfig::default()
            })
            .unwrap();
        client
            .create_database("app", &AdminUser::new("admin", "secret"), &deadline())
            .unwrap()
    }

    fn deadline() -> Deadline {
        Deadline::after(Arc::new(SystemClock), Duration::from_secs(5))
    }

    #[test]
    fn test_documents_then_edges() {
        let server = MemoryServer::new("pw");
        let db = database(&server);
        let report = migrate(
            &db,
            &names(&["user", "order"]),
            &names(&["placed"]),
            &deadline(),
            DEFAULT_COLLECTION_TIMEOUT,
        )
        .unwrap();

        assert_eq!(
            report.ensured,
            vec![
                CollectionSpec::document("user"),
                CollectionSpec::document("order"),
                CollectionSpec::edge("placed"),
            ]
        );
        assert_eq!(server.collection_kind("app", "placed"), Some(CollectionKind::Edge));
    }

    #[test]
    fn test_migrate_twice_is_noop() {
        let server = MemoryServer::new("pw");
        let db = database(&server);
        let docs = names(&["user"]);
        let edges = names(&["placed"]);

        migrate(&db, &docs, &edges, &deadline(), DEFAULT_COLLECTION_TIMEOUT).unwrap();
        migrate(&db, &docs, &edges, &deadline(), DEFAULT_COLLECTION_TIMEOUT).unwrap();
        assert_eq!(
            server.collection_names("app").unwrap(),
            vec!["placed".to_string(), "user".to_string()]
        );
    }

    #[test]
    fn test_kind_mismatch_aborts() {
        let server = MemoryServer::new("pw");
        let db = database(&server);
        migrate(&db, &names(&["placed"]), &[], &deadline(), DEFAULT_COLLECTION_TIMEOUT).unwrap();

        let err = migrate(
            &db,
            &names(&["user"]),
            &names(&["placed", "knows"]),
            &deadline(),
            DEFAULT_COLLECTION_TIMEOUT,
        )
        .unwrap_err();
        match err {
            BootstrapError::Schema {
                collection,
                kind,
                cause,
            } => {
                assert_eq!(collection, "placed");
                assert_eq!(kind, CollectionKind::Edge);
                assert!(matches!(cause, ClientError::Conflict(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        // no rollback of earlier steps, nothing after the failure
        assert!(server.collection_kind("app", "user").is_some());
        assert!(server.collection_kind("app", "knows").is_none());
    }

    #[test]
    fn test_slow_collection_times_out_individually() {
        let server = MemoryServer::new("pw");
        let db = database(&server);
        server.set_latency("collection:order", Duration::from_secs(2));
        let clock = Arc::new(ManualClock::new());
        let parent = Deadline::after(clock.clone(), Duration::from_secs(30));

        let err = migrate(
            &db,
            &names(&["user", "order"]),
            &[],
            &parent,
            DEFAULT_COLLECTION_TIMEOUT,
        )
        .unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, BootstrapError::Schema { ref collection, .. } if collection == "order"));
        assert_eq!(clock.elapsed(), DEFAULT_COLLECTION_TIMEOUT);
    }

    #[test]
    fn test_cancellation() {
        let server = MemoryServer::new("pw");
        let db = database(&server);
        let cancel = CancelToken::new();
        cancel.cancel();
        let parent = deadline().with_cancel(cancel);

        let err = migrate(&db, &names(&["user"]), &[], &parent, DEFAULT_COLLECTION_TIMEOUT)
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(server.collection_kind("app", "user").is_none());
    }
}
