//! # Configuration
//!
//! Runtime settings of the reflection layer.
//!
//! ## Environment Variables
//!
//! - `YRT_MAPS_PATH`: memory-map description to read during discovery
//!   (default: `/proc/self/maps`)
//! - `YRT_DISCOVERY`: `on` or `off`; whether a lookup miss while instantiating
//!   a class triggers a registry refresh before failing (default: `on` on Linux)

use std::env;
use std::path::PathBuf;

use tracing::warn;

/// Memory-map description of the calling process.
pub const DEFAULT_MAPS_PATH: &str = "/proc/self/maps";

/// Environment variable overriding [`ReflectConfig::maps_path`].
pub const MAPS_PATH_ENV: &str = "YRT_MAPS_PATH";

/// Environment variable overriding [`ReflectConfig::discover_on_miss`].
pub const DISCOVERY_ENV: &str = "YRT_DISCOVERY";

/// Reflection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectConfig
{
    /// Memory-map description read by symbol discovery
    pub maps_path: PathBuf,
    /// Refresh the symbol registry when a class lookup misses
    pub discover_on_miss: bool,
}

impl Default for ReflectConfig
{
    fn default() -> Self
    {
        Self {
            maps_path: PathBuf::from(DEFAULT_MAPS_PATH),
            discover_on_miss: cfg!(target_os = "linux"),
        }
    }
}

impl ReflectConfig
{
    /// Create configuration from environment variables.
    ///
    /// Unset variables keep their defaults. An unrecognised `YRT_DISCOVERY`
    /// value is ignored with a warning.
    pub fn from_env() -> Self
    {
        let mut config = Self::default();

        if let Ok(path) = env::var(MAPS_PATH_ENV) {
            if !path.is_empty() {
                config.maps_path = PathBuf::from(path);
            }
        }

        if let Ok(value) = env::var(DISCOVERY_ENV) {
            match parse_switch(&value) {
                Some(enabled) => config.discover_on_miss = enabled,
                None => warn!("Ignoring {DISCOVERY_ENV}={value}: expected on or off"),
            }
        }

        config
    }

    /// Configuration that never touches the process's memory map.
    ///
    /// Lookups only see symbols registered explicitly, which keeps tests and
    /// embedders that declare every class independent of the host binary.
    #[must_use]
    pub fn isolated() -> Self
    {
        Self {
            discover_on_miss: false,
            ..Self::default()
        }
    }

    /// Replace the memory-map description path.
    #[must_use]
    pub fn with_maps_path(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.maps_path = path.into();
        self
    }

    /// Enable or disable discovery on lookup misses.
    #[must_use]
    pub fn with_discovery(mut self, enabled: bool) -> Self
    {
        self.discover_on_miss = enabled;
        self
    }
}

fn parse_switch(value: &str) -> Option<bool>
{
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "1" | "true" | "yes" => Some(true),
        "off" | "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn switch_values()
    {
        assert_eq!(parse_switch("on"), Some(true));
        assert_eq!(parse_switch(" OFF "), Some(false));
        assert_eq!(parse_switch("1"), Some(true));
        assert_eq!(parse_switch("maybe"), None);
    }

    #[test]
    fn isolated_disables_discovery()
    {
        let config = ReflectConfig::isolated();
        assert!(!config.discover_on_miss);
        assert_eq!(config.maps_path, PathBuf::from(DEFAULT_MAPS_PATH));
    }

    #[test]
    fn builders_override_fields()
    {
        let config = ReflectConfig::default().with_maps_path("/tmp/maps").with_discovery(false);
        assert_eq!(config.maps_path, PathBuf::from("/tmp/maps"));
        assert!(!config.discover_on_miss);
    }
}
