//! Docker-backed database instances
//!
//! Containers are started with the blocking testcontainers runner and kept
//! until [`InstanceManager::stop_instance`]; dropping the manager removes
//! whatever is still running.

use crate::config::HarnessConfig;
use crate::harness::Harness;
use parking_lot::Mutex;
use seedbed_arango::ArangoConnector;
use seedbed_core::{ClientError, ClientResult, ConfigError, InstanceManager, InstanceRef, InstanceSpec};
use std::collections::HashMap;
use std::sync::Arc;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::SyncRunner;
use testcontainers::{Container, ContainerRequest, GenericImage, ImageExt};
use tracing::info;

/// Starts database containers through the local Docker daemon
#[derive(Default)]
pub struct DockerInstances {
    containers: Mutex<HashMap<String, Container<GenericImage>>>,
}

impl DockerInstances {
    /// Manager with no running containers
    pub fn new() -> Self {
        Self::default()
    }
}

fn instance_error(action: &str, spec: &str, err: impl std::fmt::Display) -> ClientError {
    ClientError::Instance(format!("failed to {action} {spec}: {err}"))
}

impl InstanceManager for DockerInstances {
    fn start_instance(&self, spec: &InstanceSpec) -> ClientResult<InstanceRef> {
        let image_ref = spec.image_ref();
        let image = GenericImage::new(spec.image.clone(), spec.tag.clone())
            .with_exposed_port(spec.port.tcp())
            .with_wait_for(WaitFor::message_on_stdout(spec.ready_message.clone()));
        let mut request: ContainerRequest<GenericImage> = image.into();
        for (key, value) in &spec.env {
            request = request.with_env_var(key.clone(), value.clone());
        }
        if !spec.args.is_empty() {
            request = request.with_cmd(spec.args.clone());
        }

        let container = request
            .start()
            .map_err(|e| instance_error("start", &image_ref, e))?;
        let port = container
            .get_host_port_ipv4(spec.port.tcp())
            .map_err(|e| instance_error("map port of", &image_ref, e))?;
        let host = container
            .get_host()
            .map_err(|e| instance_error("resolve host of", &image_ref, e))?
            .to_string();
        let id = container.id().to_string();

        info!(target: "seedbed::docker", container = %id, image = %image_ref, %host, port, "container started");
        self.containers.lock().insert(id.clone(), container);
        Ok(InstanceRef { id, host, port })
    }

    fn stop_instance(&self, instance: &InstanceRef) -> ClientResult<()> {
        let container = self
            .containers
            .lock()
            .remove(&instance.id)
            .ok_or_else(|| ClientError::Instance(format!("unknown container {}", instance.id)))?;
        container
            .stop()
            .map_err(|e| instance_error("stop", &instance.id, e))?;
        info!(target: "seedbed::docker", container = %instance.id, "container stopped");
        Ok(())
    }

    fn dump_logs(&self, instance: &InstanceRef) -> String {
        let containers = self.containers.lock();
        let Some(container) = containers.get(&instance.id) else {
            return String::new();
        };
        let mut logs = container.stdout_to_vec().unwrap_or_default();
        logs.extend(container.stderr_to_vec().unwrap_or_default());
        String::from_utf8_lossy(&logs).into_owned()
    }
}

/// Harness that starts ArangoDB containers and talks to them over HTTP
pub fn docker_harness(config: HarnessConfig) -> Result<Harness<ArangoConnector>, ConfigError> {
    Harness::new(config, Arc::new(DockerInstances::new()), ArangoConnector::new())
}
