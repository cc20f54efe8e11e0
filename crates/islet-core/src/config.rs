//! Configuration defaults and environment overrides.
//!
//! All tunables of the isolate runtime live here so the CLI and embedders
//! agree on names and default values.

/// Default values
pub mod defaults {
    /// Prefix used for isolate thread names.
    pub const ISOLATE_NAME_PREFIX: &str = "islet-isolate";
    /// Stack size of an isolate thread (8 MiB).
    pub const ISOLATE_STACK_SIZE: usize = 8 * 1024 * 1024;
    /// Smallest stack size accepted from the environment.
    pub const MIN_ISOLATE_STACK_SIZE: usize = 64 * 1024;
}

/// Environment variable names
pub mod env_vars {
    use super::defaults;

    pub const ISOLATE_STACK_SIZE: &str = "ISLET_ISOLATE_STACK_SIZE";
    pub const ISOLATE_NAME_PREFIX: &str = "ISLET_ISOLATE_NAME_PREFIX";
    /// `true` switches the CLI to JSON logs.
    pub const LOG_JSON: &str = "ISLET_LOG_JSON";

    /// Isolate stack size from the environment, or the default.
    ///
    /// Values below [`defaults::MIN_ISOLATE_STACK_SIZE`] are ignored.
    pub fn isolate_stack_size() -> usize {
        std::env::var(ISOLATE_STACK_SIZE)
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|size| *size >= defaults::MIN_ISOLATE_STACK_SIZE)
            .unwrap_or(defaults::ISOLATE_STACK_SIZE)
    }

    /// Isolate thread name prefix from the environment, or the default.
    pub fn isolate_name_prefix() -> String {
        std::env::var(ISOLATE_NAME_PREFIX)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| defaults::ISOLATE_NAME_PREFIX.to_string())
    }

    /// Whether JSON logging was requested.
    pub fn log_json() -> bool {
        std::env::var(LOG_JSON)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false)
    }
}

/// Configuration for a single isolate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolateConfig {
    /// Thread name prefix; the isolate id is appended.
    pub name: String,

    /// Stack size of the isolate thread in bytes.
    pub stack_size: usize,
}

impl Default for IsolateConfig {
    fn default() -> Self {
        Self {
            name: defaults::ISOLATE_NAME_PREFIX.to_string(),
            stack_size: defaults::ISOLATE_STACK_SIZE,
        }
    }
}

impl IsolateConfig {
    /// Build a config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            name: env_vars::isolate_name_prefix(),
            stack_size: env_vars::isolate_stack_size(),
        }
    }

    /// Set the thread name prefix.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the thread stack size.
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size.max(defaults::MIN_ISOLATE_STACK_SIZE);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolate_config_default() {
        let config = IsolateConfig::default();
        assert_eq!(config.name, "islet-isolate");
        assert_eq!(config.stack_size, 8 * 1024 * 1024);
    }

    #[test]
    fn test_isolate_config_builder() {
        let config = IsolateConfig::default()
            .with_name("worker")
            .with_stack_size(1);
        assert_eq!(config.name, "worker");
        assert_eq!(config.stack_size, defaults::MIN_ISOLATE_STACK_SIZE);
    }
}
