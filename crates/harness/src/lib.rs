//! Disposable, authenticated database environments for integration tests
//!
//! A [`Harness`] starts (or reuses) a database instance, waits for it,
//! provisions a logical database from a [`seedbed_core::Fixture`], and hands
//! back a [`TestEnv`]: the live handle, a [`LogCapture`], an
//! [`Authenticator`] for signed test tokens, and a [`Teardown`] that releases
//! everything exactly once.
//!
//! ```ignore
//! let harness = Harness::new(HarnessConfig::default(), Arc::new(cluster.clone()), cluster)?;
//! let env = harness.launch(&unique_database_name("orders"), &fixture)?;
//! let token = env.token("42", ["USER"])?;
//! // ...
//! env.teardown.run();
//! ```

#![warn(missing_docs)]

pub mod auth;
mod config;
#[cfg(feature = "docker")]
mod docker;
mod harness;
mod logs;

pub use auth::{Authenticator, Claims, KeyStore, SigningError, TokenError};
pub use config::{HarnessConfig, ROOT_PASSWORD_ENV};
#[cfg(feature = "docker")]
pub use docker::{docker_harness, DockerInstances};
pub use harness::{
    Harness, HarnessError, HarnessState, LaunchFailure, SharedInstance, Teardown, TestEnv,
};
pub use logs::{LogCapture, BANNER};
