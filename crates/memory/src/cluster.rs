//! A set of in-memory servers addressed like container instances
//!
//! [`MemoryCluster`] plays both external roles of the harness: it is the
//! instance manager (start/stop/logs) and the connector that resolves a
//! `host:port` endpoint back to the server started for it.

use crate::server::MemoryServer;
use parking_lot::Mutex;
use seedbed_core::{
    ClientError, ClientResult, ConnectionConfig, Connector, InstanceManager, InstanceRef,
    InstanceSpec,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Host name reported for in-memory instances
pub const MEMORY_HOST: &str = "memory";

const FIRST_PORT: u16 = 20_000;

#[derive(Default)]
struct ClusterInner {
    servers: Mutex<BTreeMap<u16, MemoryServer>>,
    next_port: Mutex<u16>,
    warmup_requests: AtomicU32,
    fail_start: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

/// In-memory stand-in for a container runtime
///
/// Cloning yields another handle to the same cluster.
#[derive(Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<ClusterInner>,
}

impl MemoryCluster {
    /// Empty cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Every server started from now on refuses its first `requests` requests
    pub fn with_warmup_requests(self, requests: u32) -> Self {
        self.inner.warmup_requests.store(requests, Ordering::SeqCst);
        self
    }

    /// Make the next starts fail (`true`) or succeed (`false`)
    pub fn set_fail_start(&self, fail: bool) {
        self.inner.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Server behind an instance
    pub fn server(&self, instance: &InstanceRef) -> Option<MemoryServer> {
        self.inner.servers.lock().get(&instance.port).cloned()
    }

    /// Number of successful starts
    pub fn start_count(&self) -> usize {
        self.inner.starts.load(Ordering::SeqCst)
    }

    /// Number of successful stops
    pub fn stop_count(&self) -> usize {
        self.inner.stops.load(Ordering::SeqCst)
    }

    fn allocate_port(&self) -> u16 {
        let mut next = self.inner.next_port.lock();
        if *next < FIRST_PORT {
            *next = FIRST_PORT;
        }
        let port = *next;
        *next = next.wrapping_add(1).max(FIRST_PORT);
        port
    }

    fn resolve(&self, config: &ConnectionConfig) -> ClientResult<MemoryServer> {
        let endpoint = config.endpoint();
        let address = endpoint
            .split_once("://")
            .map_or(endpoint.as_str(), |(_, rest)| rest);
        let port = match address.rsplit_once(':') {
            Some((host, port)) if host == MEMORY_HOST => port.parse::<u16>().ok(),
            _ => None,
        };
        port.and_then(|port| self.inner.servers.lock().get(&port).cloned())
            .ok_or_else(|| ClientError::Connection(format!("no in-memory server at {endpoint}")))
    }
}

impl InstanceManager for MemoryCluster {
    fn start_instance(&self, spec: &InstanceSpec) -> ClientResult<InstanceRef> {
        if self.inner.fail_start.load(Ordering::SeqCst) {
            return Err(ClientError::Instance(format!(
                "failed to start {}: injected failure",
                spec.image_ref()
            )));
        }
        let port = self.allocate_port();
        let password = spec
            .env
            .get("ARANGO_ROOT_PASSWORD")
            .cloned()
            .unwrap_or_default();
        let id = format!("mem-{}", uuid::Uuid::new_v4().simple());
        let server = MemoryServer::with_id(id.clone(), password);
        server.set_warmup_requests(self.inner.warmup_requests.load(Ordering::SeqCst));
        self.inner.servers.lock().insert(port, server);
        self.inner.starts.fetch_add(1, Ordering::SeqCst);
        info!(target: "seedbed::memory", instance = %id, port, image = %spec.image_ref(), "instance started");
        Ok(InstanceRef {
            id,
            host: MEMORY_HOST.to_string(),
            port,
        })
    }

    fn stop_instance(&self, instance: &InstanceRef) -> ClientResult<()> {
        let server = self
            .server(instance)
            .ok_or_else(|| ClientError::Instance(format!("unknown instance {}", instance.id)))?;
        if !server.stop() {
            return Err(ClientError::Instance(format!(
                "instance {} is already stopped",
                instance.id
            )));
        }
        self.inner.stops.fetch_add(1, Ordering::SeqCst);
        info!(target: "seedbed::memory", instance = %instance.id, "instance stopped");
        Ok(())
    }

    fn dump_logs(&self, instance: &InstanceRef) -> String {
        self.server(instance)
            .map(|server| server.logs().join("\n"))
            .unwrap_or_default()
    }
}

impl Connector for MemoryCluster {
    type Client = crate::server::MemoryClient;

    fn connect(&self, config: &ConnectionConfig) -> ClientResult<Self::Client> {
        self.resolve(config)?.connect(config)
    }
}
