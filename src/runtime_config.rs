//! # Runtime Configuration Module
//!
//! Startup configuration for the dispatcher: component options, the default
//! pool settings for groups and the `may` scheduler.
//!
//! Configuration comes from environment variables ([`RuntimeConfig::from_env`])
//! or a YAML document ([`RuntimeConfig::load`], [`RuntimeConfig::from_yaml_str`]).
//! Every field has a default, so a partial document is fine.
//!
//! ## Environment Variables
//!
//! | Variable                            | Default   |
//! |-------------------------------------|-----------|
//! | `BRRTMESH_PRINT_ROUTE_LOG`          | `false`   |
//! | `BRRTMESH_SHUTDOWN_POLICY`          | `drain`   |
//! | `BRRTMESH_LOWERCASE_NAMES`          | `true`    |
//! | `BRRTMESH_WORKERS`                  | may default |
//! | `BRRTMESH_QUEUE_NUM` and friends    | see [`GroupConfig::from_env`] |
//!
//! `BRRTMESH_STACK_SIZE` accepts decimal (`32768`) or hex (`0x8000`).
//!
//! ## YAML
//!
//! ```yaml
//! component:
//!   print_route_log: true
//!   shutdown_policy: halt
//! group:
//!   queue_num: 8
//!   queue_bound: 1024
//!   backpressure_mode: shed
//! may_workers: 4
//! ```

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
pub use crate::worker_pool::GroupConfig;
use crate::worker_pool::ShutdownPolicy;

/// Options recognized at component construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentConfig {
    /// Log the chosen partition and route of every dispatched message at debug
    pub print_route_log: bool,
    pub shutdown_policy: ShutdownPolicy,
    /// Normalize handler names to lower case; `false` keeps them as written
    pub lowercase_names: bool,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            print_route_log: false,
            shutdown_policy: ShutdownPolicy::Drain,
            lowercase_names: true,
        }
    }
}

impl ComponentConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            print_route_log: env_bool("BRRTMESH_PRINT_ROUTE_LOG")
                .unwrap_or(defaults.print_route_log),
            shutdown_policy: env::var("BRRTMESH_SHUTDOWN_POLICY")
                .ok()
                .and_then(|s| ShutdownPolicy::parse(&s))
                .unwrap_or(defaults.shutdown_policy),
            lowercase_names: env_bool("BRRTMESH_LOWERCASE_NAMES")
                .unwrap_or(defaults.lowercase_names),
        }
    }
}

/// Everything the dispatcher reads at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub component: ComponentConfig,
    /// Default settings for groups created by the component
    pub group: GroupConfig,
    /// `may` scheduler worker threads; `None` keeps may's default
    pub may_workers: Option<usize>,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            component: ComponentConfig::from_env(),
            group: GroupConfig::from_env(),
            may_workers: env::var("BRRTMESH_WORKERS")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .filter(|n| *n > 0),
        }
    }

    /// Parse a YAML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Yaml`] when the document does not match.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] when the file cannot be read, [`ConfigError::Yaml`]
    /// when it does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Apply scheduler settings to the global `may` configuration.
    ///
    /// Call once, before any group runs.
    pub fn apply_runtime(&self) {
        let cfg = may::config();
        if let Some(workers) = self.may_workers {
            cfg.set_workers(workers);
        }
        cfg.set_stack_size(self.group.stack_size);
        info!(
            may_workers = ?self.may_workers,
            stack_size = self.group.stack_size,
            "Applied coroutine runtime settings"
        );
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let value = env::var(key).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker_pool::BackpressureMode;
    use std::sync::Mutex;

    // Tests touching process env vars must not overlap.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 9] = [
        "BRRTMESH_PRINT_ROUTE_LOG",
        "BRRTMESH_SHUTDOWN_POLICY",
        "BRRTMESH_LOWERCASE_NAMES",
        "BRRTMESH_WORKERS",
        "BRRTMESH_QUEUE_NUM",
        "BRRTMESH_QUEUE_BOUND",
        "BRRTMESH_BACKPRESSURE_MODE",
        "BRRTMESH_BACKPRESSURE_TIMEOUT_MS",
        "BRRTMESH_STACK_SIZE",
    ];

    fn clean_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults_without_env() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clean_env();
        assert_eq!(RuntimeConfig::from_env(), RuntimeConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clean_env();
        env::set_var("BRRTMESH_PRINT_ROUTE_LOG", "true");
        env::set_var("BRRTMESH_SHUTDOWN_POLICY", "halt");
        env::set_var("BRRTMESH_WORKERS", "3");
        env::set_var("BRRTMESH_QUEUE_NUM", "16");
        env::set_var("BRRTMESH_QUEUE_BOUND", "64");
        env::set_var("BRRTMESH_BACKPRESSURE_MODE", "shed");
        env::set_var("BRRTMESH_STACK_SIZE", "0x8000");

        let config = RuntimeConfig::from_env();
        clean_env();

        assert!(config.component.print_route_log);
        assert_eq!(config.component.shutdown_policy, ShutdownPolicy::Halt);
        assert!(config.component.lowercase_names);
        assert_eq!(config.may_workers, Some(3));
        assert_eq!(config.group.queue_num, 16);
        assert_eq!(config.group.queue_bound, 64);
        assert_eq!(config.group.backpressure_mode, BackpressureMode::Shed);
        assert_eq!(config.group.stack_size, 0x8000);
    }

    #[test]
    fn test_invalid_env_values_fall_back() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clean_env();
        env::set_var("BRRTMESH_PRINT_ROUTE_LOG", "maybe");
        env::set_var("BRRTMESH_QUEUE_NUM", "many");
        env::set_var("BRRTMESH_WORKERS", "0");

        let config = RuntimeConfig::from_env();
        clean_env();

        assert!(!config.component.print_route_log);
        assert_eq!(config.group.queue_num, GroupConfig::default().queue_num);
        assert_eq!(config.may_workers, None);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = RuntimeConfig::from_yaml_str(
            "component:\n  print_route_log: true\ngroup:\n  queue_num: 2\n",
        )
        .unwrap();
        assert!(config.component.print_route_log);
        assert_eq!(config.component.shutdown_policy, ShutdownPolicy::Drain);
        assert_eq!(config.group.queue_num, 2);
        assert_eq!(config.group.queue_bound, 0);
        assert_eq!(config.may_workers, None);
    }

    #[test]
    fn test_bad_yaml_is_an_error() {
        let err = RuntimeConfig::from_yaml_str("group:\n  backpressure_mode: sometimes\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
