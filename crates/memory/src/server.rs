//! In-memory database server
//!
//! [`MemoryServer`] behaves like a single database server process: it has a
//! root account, logical databases with collections, a request log, and a
//! running flag. Handles obtained from a server stop working once it is
//! stopped, which is how a torn-down test instance behaves.
//!
//! Fault injection hooks let tests simulate slow startup and slow calls.

use crate::query::{self, codes};
use crate::store::{Collection, DatabaseState};
use parking_lot::Mutex;
use seedbed_core::{
    is_valid_database_name, AdminUser, BindVars, ClientError, ClientResult, CollectionKind,
    ConnectionConfig, Connector, Database, DatabaseClient, Deadline,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Name of the database that always exists
pub const SYSTEM_DATABASE: &str = "_system";

/// Root account name
pub const ROOT_USER: &str = "root";

struct ServerInner {
    id: String,
    root_password: String,
    running: AtomicBool,
    /// Requests still to be refused before the server accepts connections
    warmup_requests: AtomicU32,
    databases: Mutex<BTreeMap<String, DatabaseState>>,
    users: Mutex<HashMap<String, String>>,
    latency: Mutex<HashMap<String, Duration>>,
    log: Mutex<Vec<String>>,
}

/// A running in-memory database server
///
/// Cloning yields another handle to the same server.
#[derive(Clone)]
pub struct MemoryServer {
    inner: Arc<ServerInner>,
}

impl std::fmt::Debug for MemoryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryServer")
            .field("id", &self.inner.id)
            .field("running", &self.is_running())
            .finish()
    }
}

impl MemoryServer {
    /// Start a server whose root account uses `root_password`
    pub fn new(root_password: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().simple().to_string(), root_password)
    }

    pub(crate) fn with_id(id: String, root_password: impl Into<String>) -> Self {
        let mut databases = BTreeMap::new();
        databases.insert(SYSTEM_DATABASE.to_string(), DatabaseState::default());
        let server = Self {
            inner: Arc::new(ServerInner {
                id,
                root_password: root_password.into(),
                running: AtomicBool::new(true),
                warmup_requests: AtomicU32::new(0),
                databases: Mutex::new(databases),
                users: Mutex::new(HashMap::new()),
                latency: Mutex::new(HashMap::new()),
                log: Mutex::new(Vec::new()),
            }),
        };
        server.record(format!("server {} started", server.inner.id));
        server
    }

    /// Server identifier
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Whether the server accepts requests
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Stop accepting requests. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        let was_running = self.inner.running.swap(false, Ordering::SeqCst);
        if was_running {
            self.record("server stopped".to_string());
        }
        was_running
    }

    /// Refuse the next `requests` requests as if the server were still booting
    pub fn set_warmup_requests(&self, requests: u32) {
        self.inner.warmup_requests.store(requests, Ordering::SeqCst);
    }

    /// Delay every request for `operation` by `latency`.
    ///
    /// `operation` is a request name (`list_databases`, `database_exists`,
    /// `create_database`, `database`, `run_query`) or `collection:<name>`,
    /// which delays creation of that collection.
    pub fn set_latency(&self, operation: impl Into<String>, latency: Duration) {
        self.inner.latency.lock().insert(operation.into(), latency);
    }

    /// Request log, one line per request
    pub fn logs(&self) -> Vec<String> {
        self.inner.log.lock().clone()
    }

    /// Names of the collections in `database`, `None` if it does not exist
    pub fn collection_names(&self, database: &str) -> Option<Vec<String>> {
        self.inner
            .databases
            .lock()
            .get(database)
            .map(|db| db.collections.keys().cloned().collect())
    }

    /// Kind of `collection` in `database`
    pub fn collection_kind(&self, database: &str, collection: &str) -> Option<CollectionKind> {
        self.inner
            .databases
            .lock()
            .get(database)
            .and_then(|db| db.collections.get(collection))
            .map(|c| c.kind)
    }

    /// Number of documents in `collection`
    pub fn document_count(&self, database: &str, collection: &str) -> Option<usize> {
        self.inner
            .databases
            .lock()
            .get(database)
            .and_then(|db| db.collections.get(collection))
            .map(|c| c.documents.len())
    }

    fn record(&self, line: String) {
        self.inner.log.lock().push(line);
    }

    /// Common prologue of every request: deadline, liveness, warmup,
    /// authentication, injected latency.
    fn admit(&self, operation: &str, credentials: &Credentials, deadline: &Deadline) -> ClientResult<()> {
        deadline.check()?;
        if !self.is_running() {
            return Err(ClientError::Transport(format!(
                "connection refused: server {} is not running",
                self.inner.id
            )));
        }
        let refused = self
            .inner
            .warmup_requests
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            self.record(format!("{operation}: refused, server starting"));
            return Err(ClientError::Transport(
                "connection refused: server is starting".to_string(),
            ));
        }
        self.authenticate(credentials)?;
        let latency = self.inner.latency.lock().get(operation).copied();
        if let Some(latency) = latency {
            deadline.sleep(latency)?;
        }
        self.record(format!("{operation}: user={}", credentials.user));
        debug!(target: "seedbed::memory", server = %self.inner.id, operation, "request");
        Ok(())
    }

    fn authenticate(&self, credentials: &Credentials) -> ClientResult<()> {
        let accepted = if credentials.user == ROOT_USER {
            credentials.password == self.inner.root_password
        } else {
            self.inner
                .users
                .lock()
                .get(&credentials.user)
                .is_some_and(|password| *password == credentials.password)
        };
        if accepted {
            Ok(())
        } else {
            Err(ClientError::Unauthorized(format!(
                "not authorized to execute this request as '{}'",
                credentials.user
            )))
        }
    }

    fn can_access(credentials: &Credentials, db: &DatabaseState) -> bool {
        credentials.user == ROOT_USER || db.users.contains(&credentials.user)
    }
}

impl Connector for MemoryServer {
    type Client = MemoryClient;

    fn connect(&self, config: &ConnectionConfig) -> ClientResult<MemoryClient> {
        config
            .validate()
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        Ok(MemoryClient {
            server: self.clone(),
            credentials: Credentials {
                user: config.user.clone(),
                password: config.password.clone(),
            },
        })
    }
}

#[derive(Debug, Clone)]
struct Credentials {
    user: String,
    password: String,
}

/// Client bound to one server and one set of credentials
#[derive(Debug, Clone)]
pub struct MemoryClient {
    server: MemoryServer,
    credentials: Credentials,
}

impl MemoryClient {
    fn handle(&self, name: &str) -> MemoryDatabase {
        MemoryDatabase {
            server: self.server.clone(),
            credentials: self.credentials.clone(),
            name: name.to_string(),
        }
    }
}

impl DatabaseClient for MemoryClient {
    type Database = MemoryDatabase;

    fn list_databases(&self, deadline: &Deadline) -> ClientResult<Vec<String>> {
        self.server
            .admit("list_databases", &self.credentials, deadline)?;
        let databases = self.server.inner.databases.lock();
        Ok(databases
            .iter()
            .filter(|(_, db)| MemoryServer::can_access(&self.credentials, db))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn database_exists(&self, name: &str, deadline: &Deadline) -> ClientResult<bool> {
        self.server
            .admit("database_exists", &self.credentials, deadline)?;
        Ok(self.server.inner.databases.lock().contains_key(name))
    }

    fn create_database(
        &self,
        name: &str,
        admin: &AdminUser,
        deadline: &Deadline,
    ) -> ClientResult<MemoryDatabase> {
        self.server
            .admit("create_database", &self.credentials, deadline)?;
        if self.credentials.user != ROOT_USER {
            return Err(ClientError::Unauthorized(
                "only root may create databases".to_string(),
            ));
        }
        if !is_valid_database_name(name) {
            return Err(ClientError::Http {
                status: 400,
                code: 1229,
                message: format!("database name invalid: '{name}'"),
            });
        }
        {
            let mut databases = self.server.inner.databases.lock();
            if databases.contains_key(name) {
                return Err(ClientError::Conflict(format!("duplicate database name '{name}'")));
            }
            let mut state = DatabaseState::default();
            if admin.username != ROOT_USER {
                state.users.insert(admin.username.clone());
                self.server
                    .inner
                    .users
                    .lock()
                    .insert(admin.username.clone(), admin.password.clone());
            }
            databases.insert(name.to_string(), state);
        }
        self.server
            .record(format!("database {name} created for {}", admin.username));
        Ok(self.handle(name))
    }

    fn database(&self, name: &str, deadline: &Deadline) -> ClientResult<MemoryDatabase> {
        self.server.admit("database", &self.credentials, deadline)?;
        let databases = self.server.inner.databases.lock();
        match databases.get(name) {
            Some(db) if MemoryServer::can_access(&self.credentials, db) => Ok(self.handle(name)),
            Some(_) => Err(ClientError::Unauthorized(format!(
                "'{}' has no access to database '{name}'",
                self.credentials.user
            ))),
            None => Err(ClientError::NotFound(format!("database not found: {name}"))),
        }
    }
}

/// Handle to one logical database on a [`MemoryServer`]
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    server: MemoryServer,
    credentials: Credentials,
    name: String,
}

impl MemoryDatabase {
    /// Server this handle talks to
    pub fn server(&self) -> &MemoryServer {
        &self.server
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut DatabaseState) -> ClientResult<T>,
    ) -> ClientResult<T> {
        let mut databases = self.server.inner.databases.lock();
        let state = databases
            .get_mut(&self.name)
            .ok_or_else(|| ClientError::NotFound(format!("database not found: {}", self.name)))?;
        if !MemoryServer::can_access(&self.credentials, state) {
            return Err(ClientError::Unauthorized(format!(
                "'{}' has no access to database '{}'",
                self.credentials.user, self.name
            )));
        }
        f(state)
    }
}

impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_collection(
        &self,
        name: &str,
        kind: CollectionKind,
        deadline: &Deadline,
    ) -> ClientResult<()> {
        self.server
            .admit(&format!("collection:{name}"), &self.credentials, deadline)?;
        self.with_state(|state| match state.collections.get(name) {
            Some(existing) if existing.kind == kind => Ok(()),
            Some(existing) => Err(ClientError::Conflict(format!(
                "collection '{name}' already exists as {} collection",
                existing.kind
            ))),
            None => {
                state
                    .collections
                    .insert(name.to_string(), Collection::new(kind));
                Ok(())
            }
        })
    }

    fn run_query(
        &self,
        script: &str,
        bind_vars: &BindVars,
        deadline: &Deadline,
    ) -> ClientResult<Vec<serde_json::Value>> {
        self.server.admit("run_query", &self.credentials, deadline)?;
        self.with_state(|state| {
            query::execute(&mut state.collections, script, bind_vars).map_err(|e| {
                if e.code == codes::PARSE {
                    ClientError::Http {
                        status: 400,
                        code: e.code,
                        message: e.to_string(),
                    }
                } else {
                    ClientError::Query(e.to_string())
                }
            })
        })
    }
}
