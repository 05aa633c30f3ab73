//! Consistency coordinator handles.
//!
//! The coordinator keeps the store's transactional snapshots and the
//! engine's checkpoints aligned. Its protocol is external; the pipeline only
//! starts it, reads its options for diagnostics, and closes it.

mod process;

pub use process::ProcessCoordinator;

use std::collections::BTreeMap;
use std::time::Duration;

use crate::core::traits::{Coordinator, CoordinatorFactory};
use crate::error::{Result, TiviewError};

/// Coordinator options (ordered for stable logging).
pub type CoordinatorOptions = BTreeMap<String, String>;

/// Host the coordinator binds to and clients connect to.
pub const HOST_OPTION_KEY: &str = "coordinator.host";

/// Port the coordinator listens on.
pub const PORT_OPTION_KEY: &str = "coordinator.port";

/// Executable launched by [`ProcessCoordinator`].
pub const COMMAND_OPTION_KEY: &str = "coordinator.command";

/// Milliseconds to wait for the coordinator to accept connections.
pub const STARTUP_TIMEOUT_OPTION_KEY: &str = "coordinator.startup-timeout-ms";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5800;
pub const DEFAULT_COMMAND: &str = "tiview-coordinator";
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings a process coordinator runs with, resolved from options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSettings {
    pub host: String,
    pub port: u16,
    pub command: String,
    pub startup_timeout: Duration,
}

impl ProcessSettings {
    /// Resolve settings from options, filling defaults.
    pub fn from_options(options: &CoordinatorOptions) -> Result<Self> {
        let host = options
            .get(HOST_OPTION_KEY)
            .cloned()
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match options.get(PORT_OPTION_KEY) {
            Some(p) => p.parse::<u16>().map_err(|_| {
                TiviewError::Config(format!(
                    "{} must be a port number, got '{}'",
                    PORT_OPTION_KEY, p
                ))
            })?,
            None => DEFAULT_PORT,
        };

        let command = options
            .get(COMMAND_OPTION_KEY)
            .cloned()
            .unwrap_or_else(|| DEFAULT_COMMAND.to_string());

        let startup_timeout = match options.get(STARTUP_TIMEOUT_OPTION_KEY) {
            Some(ms) => Duration::from_millis(ms.parse::<u64>().map_err(|_| {
                TiviewError::Config(format!(
                    "{} must be a number of milliseconds, got '{}'",
                    STARTUP_TIMEOUT_OPTION_KEY, ms
                ))
            })?),
            None => DEFAULT_STARTUP_TIMEOUT,
        };

        if host.is_empty() || command.is_empty() {
            return Err(TiviewError::Config(format!(
                "{} and {} cannot be empty",
                HOST_OPTION_KEY, COMMAND_OPTION_KEY
            )));
        }

        Ok(Self {
            host,
            port,
            command,
            startup_timeout,
        })
    }
}

/// Factory used when no coordinator or factory is supplied.
///
/// Builds a [`ProcessCoordinator`]; the resolved host and port are written
/// back into its options so that catalogs pointing at the coordinator see
/// the effective values.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCoordinatorFactory;

impl CoordinatorFactory for DefaultCoordinatorFactory {
    fn create(&self, mut options: CoordinatorOptions) -> Result<Box<dyn Coordinator>> {
        let settings = ProcessSettings::from_options(&options)?;
        options.insert(HOST_OPTION_KEY.to_string(), settings.host.clone());
        options.insert(PORT_OPTION_KEY.to_string(), settings.port.to_string());
        Ok(Box::new(ProcessCoordinator::new(settings, options)))
    }
}
