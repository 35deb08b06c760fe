//! Configuration traits and the application configuration.

use std::fmt;

/// Base trait for configuration types.
///
/// # Example
///
/// ```rust
/// use qi4rs::Config;
///
/// #[derive(Debug, Clone)]
/// struct PoolConfig {
///     max_connections: u32,
/// }
///
/// impl Config for PoolConfig {
///     fn name(&self) -> &str {
///         "pool"
///     }
///
///     fn validate(&self) -> Result<(), String> {
///         if self.max_connections == 0 {
///             return Err("max_connections must be greater than 0".to_string());
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Config: Send + Sync {
    /// Returns the configuration name/identifier.
    fn name(&self) -> &str {
        "default"
    }

    /// Validates the configuration.
    ///
    /// Returns Ok(()) if valid, or an error message describing the issue.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Trait for configurations that can be merged.
pub trait MergeableConfig: Config {
    /// Merge another configuration into this one.
    ///
    /// Values from `other` override values in `self` where applicable.
    fn merge(&mut self, other: &Self);

    /// Create a new configuration by merging two configurations.
    fn merged(base: &Self, overlay: &Self) -> Self
    where
        Self: Clone,
    {
        let mut result = base.clone();
        result.merge(overlay);
        result
    }
}

/// Mode an application runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplicationMode {
    /// Local development
    #[default]
    Development,
    /// Pre-production
    Staging,
    /// Production
    Production,
}

impl fmt::Display for ApplicationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationMode::Development => f.write_str("development"),
            ApplicationMode::Staging => f.write_str("staging"),
            ApplicationMode::Production => f.write_str("production"),
        }
    }
}

/// Configuration an architecture is assembled with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Application version
    pub version: String,
    /// Running mode
    pub mode: ApplicationMode,
    /// Buffer size of each lifecycle event subscription
    pub event_buffer_size: usize,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "application".to_string(),
            version: "1.0".to_string(),
            mode: ApplicationMode::default(),
            event_buffer_size: 64,
        }
    }
}

impl ApplicationConfig {
    /// Create a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the application version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the running mode.
    pub fn with_mode(mut self, mode: ApplicationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the lifecycle event buffer size.
    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }
}

impl Config for ApplicationConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("application name must not be empty".to_string());
        }
        if self.event_buffer_size == 0 {
            return Err("event_buffer_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl MergeableConfig for ApplicationConfig {
    fn merge(&mut self, other: &Self) {
        let defaults = ApplicationConfig::default();
        if other.name != defaults.name {
            self.name = other.name.clone();
        }
        if other.version != defaults.version {
            self.version = other.version.clone();
        }
        if other.mode != defaults.mode {
            self.mode = other.mode;
        }
        if other.event_buffer_size != defaults.event_buffer_size {
            self.event_buffer_size = other.event_buffer_size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApplicationConfig::new()
            .with_name("billing")
            .with_version("2.1")
            .with_mode(ApplicationMode::Production);

        assert_eq!(Config::name(&config), "billing");
        assert_eq!(config.version, "2.1");
        assert_eq!(config.mode, ApplicationMode::Production);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(ApplicationConfig::new().with_name("  ").validate().is_err());
        assert!(ApplicationConfig::new().with_event_buffer_size(0).validate().is_err());
    }

    #[test]
    fn test_merge_overrides_non_default_values() {
        let base = ApplicationConfig::new().with_name("billing").with_version("2.0");
        let overlay = ApplicationConfig::new().with_mode(ApplicationMode::Staging);

        let merged = ApplicationConfig::merged(&base, &overlay);
        assert_eq!(merged.name, "billing");
        assert_eq!(merged.version, "2.0");
        assert_eq!(merged.mode, ApplicationMode::Staging);
    }
}
