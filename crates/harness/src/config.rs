//! Harness configuration
//!
//! ```toml
//! root_password = "arangodb"
//!
//! [admin]
//! username = "arangodb"
//! password = "arangodb"
//!
//! [instance]
//! image = "arangodb"
//! tag = "3.9.8"
//!
//! [timeouts]
//! readiness_ms = 10000
//! ```

use crate::auth::DEFAULT_KEY_ID;
use seedbed_core::{AdminUser, ConfigError, ConnectionConfig, InstanceRef, InstanceSpec, Timeouts};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable the database image reads its root password from
pub const ROOT_PASSWORD_ENV: &str = "ARANGO_ROOT_PASSWORD";

/// Everything a harness needs to start, provision and authenticate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Instance to start
    #[serde(default)]
    pub instance: InstanceSpec,
    /// Account used for readiness probes and database creation
    #[serde(default = "default_root_user")]
    pub root_user: String,
    /// Password of `root_user`
    #[serde(default = "default_password")]
    pub root_password: String,
    /// User granted access to each provisioned database
    #[serde(default = "default_admin")]
    pub admin: AdminUser,
    /// Plain HTTP towards the instance
    #[serde(default = "default_true")]
    pub disable_tls: bool,
    /// Per-call bounds; `readiness_ms` also caps the whole bring-up
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Key id under which test credentials are signed
    #[serde(default = "default_key_id")]
    pub key_id: String,
}

fn default_root_user() -> String {
    "root".to_string()
}

fn default_password() -> String {
    "arangodb".to_string()
}

fn default_admin() -> AdminUser {
    AdminUser::new("arangodb", "arangodb")
}

fn default_true() -> bool {
    true
}

fn default_key_id() -> String {
    DEFAULT_KEY_ID.to_string()
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            instance: InstanceSpec::default(),
            root_user: default_root_user(),
            root_password: default_password(),
            admin: default_admin(),
            disable_tls: true,
            timeouts: Timeouts::default(),
            key_id: default_key_id(),
        }
    }
}

impl HarnessConfig {
    /// Parse from TOML text and validate
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations that cannot bring up a usable environment
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timeouts.validate()?;
        let required = [
            ("root_user", &self.root_user),
            ("admin.username", &self.admin.username),
            ("key_id", &self.key_id),
            ("instance.image", &self.instance.image),
            ("instance.tag", &self.instance.tag),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }
        if self.instance.port == 0 {
            return Err(ConfigError::Invalid {
                field: "instance.port",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(password) = self.instance.env.get(ROOT_PASSWORD_ENV) {
            if *password != self.root_password {
                return Err(ConfigError::Invalid {
                    field: "root_password",
                    reason: format!("does not match instance.env.{ROOT_PASSWORD_ENV}"),
                });
            }
        }
        Ok(())
    }

    /// Root connection to a running instance
    pub fn connection_for(&self, instance: &InstanceRef) -> ConnectionConfig {
        ConnectionConfig {
            disable_tls: self.disable_tls,
            ..ConnectionConfig::for_instance(instance, &self.root_user, &self.root_password)
        }
    }
}
