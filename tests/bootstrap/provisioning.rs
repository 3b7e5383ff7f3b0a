//! End-to-end provisioning against a fresh instance

use crate::common::*;
use seedbed::{AdminUser, BootstrapError, ClientResult, MemoryClient, Phase};
use std::io::Write;

/// Connector whose clients never see an existing database, as when two
/// provisioners both check before either creates
struct StaleExistenceConnector(MemoryCluster);

struct StaleExistenceClient(MemoryClient);

impl Connector for StaleExistenceConnector {
    type Client = StaleExistenceClient;

    fn connect(&self, config: &ConnectionConfig) -> ClientResult<StaleExistenceClient> {
        self.0.connect(config).map(StaleExistenceClient)
    }
}

impl DatabaseClient for StaleExistenceClient {
    type Database = MemoryDatabase;

    fn list_databases(&self, deadline: &Deadline) -> ClientResult<Vec<String>> {
        self.0.list_databases(deadline)
    }

    fn database_exists(&self, _name: &str, _deadline: &Deadline) -> ClientResult<bool> {
        Ok(false)
    }

    fn create_database(
        &self,
        name: &str,
        admin: &AdminUser,
        deadline: &Deadline,
    ) -> ClientResult<MemoryDatabase> {
        self.0.create_database(name, admin, deadline)
    }

    fn database(&self, name: &str, deadline: &Deadline) -> ClientResult<MemoryDatabase> {
        self.0.database(name, deadline)
    }
}

#[test]
fn provision_creates_collections_and_seeds_one_of_each() {
    init_tracing();
    let test = TestInstance::start();
    let provisioned = test
        .provisioner()
        .provision(&test.config, "orders", &order_fixture(), &deadline())
        .unwrap();

    assert!(provisioned.created);
    assert_eq!(count(&provisioned.db, "user"), 1);
    assert_eq!(count(&provisioned.db, "order"), 1);
    assert_eq!(count(&provisioned.db, "placed"), 1);

    let server = test.server();
    assert_eq!(server.collection_kind("orders", "user"), Some(CollectionKind::Document));
    assert_eq!(server.collection_kind("orders", "placed"), Some(CollectionKind::Edge));
}

#[test]
fn admin_user_can_use_the_new_database() {
    let test = TestInstance::start();
    test.provisioner()
        .provision(&test.config, "orders", &order_fixture(), &deadline())
        .unwrap();

    let admin = ConnectionConfig {
        user: "arangodb".to_string(),
        password: "arangodb".to_string(),
        ..test.config.clone()
    };
    let client = test.cluster.connect(&admin).unwrap();
    let db = client.database("orders", &deadline()).unwrap();
    assert_eq!(count(&db, "user"), 1);
}

#[test]
fn fixture_loaded_from_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
document_collections = ["user", "order"]
edge_collections = ["placed"]
seed = """
INSERT @user INTO user
INSERT {{"_key": "o1"}} INTO order
INSERT {{"_from": "user/u1", "_to": "order/o1"}} INTO placed
"""

[seed_bind_vars]
user = {{ _key = "u1", name = "Ada" }}
"#
    )
    .unwrap();
    let fixture = Fixture::from_file(file.path()).unwrap();

    let test = TestInstance::start();
    let provisioned = test
        .provisioner()
        .provision(&test.config, "orders", &fixture, &deadline())
        .unwrap();
    assert_eq!(count(&provisioned.db, "placed"), 1);

    let users = provisioned
        .db
        .run_query("FOR u IN user RETURN u", &BindVars::new(), &deadline())
        .unwrap();
    assert_eq!(users[0]["name"], "Ada");
}

#[test]
fn distinct_names_isolate_concurrent_runs() {
    let test = TestInstance::start();
    let provisioner = test.provisioner();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let provisioner = &provisioner;
                let config = &test.config;
                scope.spawn(move || {
                    let name = unique_database_name("orders");
                    let provisioned = provisioner
                        .provision(config, &name, &order_fixture(), &deadline())
                        .unwrap();
                    (name, count(&provisioned.db, "user"))
                })
            })
            .collect();

        let mut names = Vec::new();
        for handle in handles {
            let (name, users) = handle.join().unwrap();
            assert_eq!(users, 1);
            names.push(name);
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 4);
    });
}

#[test]
fn provisioning_failure_names_the_phase() {
    let test = TestInstance::start();
    let fixture = Fixture::new(["user"], ["user"]);

    let err = test
        .provisioner()
        .provision(&test.config, "orders", &fixture, &deadline())
        .unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Migrate));
    match err.root() {
        BootstrapError::Schema {
            collection, kind, ..
        } => {
            assert_eq!(collection, "user");
            assert_eq!(*kind, CollectionKind::Edge);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn wrong_root_password_fails_readiness() {
    let test = TestInstance::start();
    let config = ConnectionConfig {
        password: "wrong".to_string(),
        ..test.config.clone()
    };
    let (_clock, deadline) = manual_deadline(std::time::Duration::from_secs(1));

    let err = test
        .provisioner()
        .provision(&config, "orders", &order_fixture(), &deadline)
        .unwrap_err();
    assert_eq!(err.phase(), Some(Phase::AwaitReady));
    assert!(err.to_string().contains("unauthorized"));
}

#[test]
fn losing_create_race_is_reported() {
    let test = TestInstance::start();
    let provisioner = Provisioner::new(
        StaleExistenceConnector(test.cluster.clone()),
        AdminUser::new("arangodb", "arangodb"),
    );

    let first = provisioner
        .provision(&test.config, "orders", &order_fixture(), &deadline())
        .unwrap();
    assert!(first.created);

    let err = provisioner
        .provision(&test.config, "orders", &order_fixture(), &deadline())
        .unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Database));
    match err.root() {
        BootstrapError::Database { name, cause } => {
            assert_eq!(name, "orders");
            assert!(matches!(cause, ClientError::Conflict(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    // the winner's seed data is untouched
    assert_eq!(count(&first.db, "user"), 1);
}
