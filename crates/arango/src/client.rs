//! ArangoDB implementations of the seedbed client traits

use crate::http::{Http, Method, Reply};
use seedbed_core::{
    AdminUser, BindVars, ClientError, ClientResult, CollectionKind, ConnectionConfig, Connector,
    Database, DatabaseClient, Deadline,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Rows requested per cursor round trip
const CURSOR_BATCH_SIZE: u64 = 1000;

/// Builds [`ArangoClient`]s over HTTP
#[derive(Debug, Clone, Copy, Default)]
pub struct ArangoConnector;

impl ArangoConnector {
    /// New connector
    pub fn new() -> Self {
        Self
    }
}

impl Connector for ArangoConnector {
    type Client = ArangoClient;

    fn connect(&self, config: &ConnectionConfig) -> ClientResult<ArangoClient> {
        config
            .validate()
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        let http = Http::new(config);
        debug!(target: "seedbed::arango", endpoint = %http.base(), user = %config.user, "client created");
        Ok(ArangoClient {
            http: Arc::new(http),
        })
    }
}

/// Server-level client
#[derive(Debug, Clone)]
pub struct ArangoClient {
    http: Arc<Http>,
}

impl ArangoClient {
    /// Base URL this client talks to
    pub fn endpoint(&self) -> &str {
        self.http.base()
    }

    fn current_database(&self, name: &str, deadline: &Deadline) -> ClientResult<Reply> {
        self.http.request(
            Method::Get,
            &format!("/_db/{name}/_api/database/current"),
            None,
            deadline,
        )
    }
}

impl DatabaseClient for ArangoClient {
    type Database = ArangoDatabase;

    fn list_databases(&self, deadline: &Deadline) -> ClientResult<Vec<String>> {
        let reply = self
            .http
            .request(Method::Get, "/_api/database", None, deadline)?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        parse_database_names(&reply)
    }

    fn database_exists(&self, name: &str, deadline: &Deadline) -> ClientResult<bool> {
        let reply = self.current_database(name, deadline)?;
        match reply.status {
            404 => Ok(false),
            _ if reply.is_success() => Ok(true),
            _ => Err(reply.into_error()),
        }
    }

    fn create_database(
        &self,
        name: &str,
        admin: &AdminUser,
        deadline: &Deadline,
    ) -> ClientResult<ArangoDatabase> {
        let body = json!({
            "name": name,
            "users": [{
                "username": admin.username,
                "passwd": admin.password,
                "active": true,
            }],
        });
        let reply = self
            .http
            .request(Method::Post, "/_api/database", Some(&body), deadline)?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        debug!(target: "seedbed::arango", database = %name, admin = %admin.username, "database created");
        Ok(ArangoDatabase {
            http: Arc::clone(&self.http),
            name: name.to_string(),
        })
    }

    fn database(&self, name: &str, deadline: &Deadline) -> ClientResult<ArangoDatabase> {
        let reply = self.current_database(name, deadline)?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        Ok(ArangoDatabase {
            http: Arc::clone(&self.http),
            name: name.to_string(),
        })
    }
}

/// Handle to one logical database
#[derive(Debug, Clone)]
pub struct ArangoDatabase {
    http: Arc<Http>,
    name: String,
}

impl ArangoDatabase {
    fn path(&self, rest: &str) -> String {
        format!("/_db/{}{}", self.name, rest)
    }

    fn existing_kind(&self, collection: &str, deadline: &Deadline) -> ClientResult<CollectionKind> {
        let reply = self.http.request(
            Method::Get,
            &self.path(&format!("/_api/collection/{collection}")),
            None,
            deadline,
        )?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        collection_kind(&reply.body)
    }
}

impl Database for ArangoDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_collection(
        &self,
        name: &str,
        kind: CollectionKind,
        deadline: &Deadline,
    ) -> ClientResult<()> {
        let body = json!({ "name": name, "type": kind.wire_type() });
        let reply = self.http.request(
            Method::Post,
            &self.path("/_api/collection"),
            Some(&body),
            deadline,
        )?;
        if reply.is_success() {
            debug!(target: "seedbed::arango", database = %self.name, collection = %name, kind = %kind, "collection created");
            return Ok(());
        }
        if reply.status != 409 {
            return Err(reply.into_error());
        }

        let existing = self.existing_kind(name, deadline)?;
        if existing == kind {
            debug!(target: "seedbed::arango", database = %self.name, collection = %name, "collection already exists");
            Ok(())
        } else {
            Err(ClientError::Conflict(format!(
                "collection {name} already exists as a {existing} collection"
            )))
        }
    }

    fn run_query(
        &self,
        script: &str,
        bind_vars: &BindVars,
        deadline: &Deadline,
    ) -> ClientResult<Vec<Value>> {
        let body = json!({
            "query": script,
            "bindVars": bind_vars,
            "batchSize": CURSOR_BATCH_SIZE,
        });
        let mut reply = self.http.request(
            Method::Post,
            &self.path("/_api/cursor"),
            Some(&body),
            deadline,
        )?;

        let mut rows = Vec::new();
        loop {
            if !reply.is_success() {
                return Err(query_error(reply));
            }
            let page = CursorPage::parse(&reply.body)?;
            rows.extend(page.rows);
            match page.next {
                Some(id) => {
                    reply = self.http.request(
                        Method::Put,
                        &self.path(&format!("/_api/cursor/{id}")),
                        None,
                        deadline,
                    )?;
                }
                None => break,
            }
        }
        debug!(target: "seedbed::arango", database = %self.name, rows = rows.len(), "query executed");
        Ok(rows)
    }
}

/// Cursor errors other than authentication are query failures
fn query_error(reply: Reply) -> ClientError {
    match reply.into_error() {
        ClientError::Unauthorized(message) => ClientError::Unauthorized(message),
        ClientError::Http { code, message, .. } => {
            ClientError::Query(format!("{message} (error {code})"))
        }
        ClientError::NotFound(message) | ClientError::Conflict(message) => {
            ClientError::Query(message)
        }
        other => other,
    }
}

fn parse_database_names(reply: &Reply) -> ClientResult<Vec<String>> {
    let names = reply
        .result()
        .and_then(Value::as_array)
        .ok_or_else(|| ClientError::Transport("database list missing `result` array".into()))?;
    Ok(names
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

fn collection_kind(body: &Value) -> ClientResult<CollectionKind> {
    body.get("type")
        .and_then(Value::as_u64)
        .and_then(|code| u32::try_from(code).ok())
        .and_then(CollectionKind::from_wire)
        .ok_or_else(|| ClientError::Transport("collection info missing a known `type`".into()))
}

/// One batch of cursor results
#[derive(Debug, PartialEq)]
struct CursorPage {
    rows: Vec<Value>,
    next: Option<String>,
}

impl CursorPage {
    fn parse(body: &Value) -> ClientResult<Self> {
        let rows = match body.get("result") {
            Some(Value::Array(rows)) => rows.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(ClientError::Transport(
                    "cursor `result` is not an array".into(),
                ))
            }
        };
        let has_more = body.get("hasMore").and_then(Value::as_bool).unwrap_or(false);
        let next = if has_more {
            let id = match body.get("id") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) => id.to_string(),
                _ => {
                    return Err(ClientError::Transport(
                        "cursor has more results but no id".into(),
                    ))
                }
            };
            Some(id)
        } else {
            None
        };
        Ok(Self { rows, next })
    }
}
