//! Hardware sinks for display color adjustment.
//!
//! A sink accepts one of two kinds of value, depending on what the panel
//! supports:
//! - **RGB additional adjustment**: three channel gains in `[0, 1]` applied on
//!   top of any other color processing.
//! - **Color balance**: a single device-specific integer within a range the
//!   device reports.
//!
//! ## Supported Backends
//!
//! - **Sysfs Backend**: writes KCAL-style `r g b` and integer balance nodes
//! - **Memory Backend**: keeps values in memory; used for dry runs and tests
//!
//! Auto-detection picks sysfs when a configured node exists, otherwise memory.

use anyhow::Result;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Backend, Config};
use crate::logger::Log;

pub mod memory;
pub mod sysfs;

pub use memory::MemoryHardware;
pub use sysfs::SysfsHardware;

/// Display color hardware shared between the controller and the CLI.
///
/// Implementations use interior mutability so one instance can be shared
/// across the service thread and animation frames.
#[cfg_attr(test, mockall::automock)]
pub trait DisplayHardware: Send + Sync {
    /// Human-readable name for logs (e.g., "Sysfs", "Memory").
    fn backend_name(&self) -> &'static str;

    /// Whether the panel takes a scalar color balance.
    fn supports_color_balance(&self) -> bool;

    /// Valid color balance values. Meaningless without color balance support.
    fn color_balance_range(&self) -> RangeInclusive<i32>;

    /// Current color balance as the hardware reports it.
    fn color_balance(&self) -> Result<i32>;

    fn set_color_balance(&self, value: i32) -> Result<()>;

    /// Whether the panel takes RGB additional adjustment.
    fn has_color_adjustment(&self) -> bool;

    /// Apply per-channel gains.
    ///
    /// # Arguments
    /// * `rgb` - `[red, green, blue]` multipliers in `[0, 1]`
    fn set_additional_adjustment(&self, rgb: [f32; 3]) -> Result<()>;
}

/// Concrete backend implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Sysfs,
    Memory,
}

impl BackendType {
    pub fn name(&self) -> &'static str {
        match self {
            BackendType::Sysfs => "Sysfs",
            BackendType::Memory => "Memory",
        }
    }
}

fn any_node_exists(config: &Config) -> bool {
    [config.rgb_path.as_deref(), config.color_balance_path.as_deref()]
        .into_iter()
        .flatten()
        .any(|path| Path::new(path).exists())
}

/// Decide which backend to use for this configuration.
///
/// # Errors
/// Returns an error if `backend = "sysfs"` is configured but none of the
/// configured nodes exist.
pub fn detect_backend(config: &Config) -> Result<BackendType> {
    match config.backend.unwrap_or(Backend::Auto) {
        Backend::Auto => {
            if any_node_exists(config) {
                Ok(BackendType::Sysfs)
            } else {
                Log::log_warning("No display color nodes found, using in-memory backend");
                Ok(BackendType::Memory)
            }
        }
        Backend::Sysfs => {
            if config.rgb_path.is_none() && config.color_balance_path.is_none() {
                Log::log_pipe();
                anyhow::bail!(
                    "Configuration specifies backend=\"sysfs\" but neither rgb_path nor \
                    color_balance_path is set."
                );
            }
            if !any_node_exists(config) {
                Log::log_pipe();
                anyhow::bail!(
                    "Configuration specifies backend=\"sysfs\" but no configured node exists.\n\
                    \n\
                    To fix this, either:\n\
                    • Point rgb_path or color_balance_path at a real node\n\
                    • Switch to automatic detection: set backend=\"auto\" in livedisplay.toml"
                );
            }
            Ok(BackendType::Sysfs)
        }
        Backend::Memory => Ok(BackendType::Memory),
    }
}

/// Build the backend chosen by [`detect_backend`].
pub fn create_backend(
    backend_type: BackendType,
    config: &Config,
) -> Result<Arc<dyn DisplayHardware>> {
    match backend_type {
        BackendType::Sysfs => Ok(Arc::new(SysfsHardware::from_config(config)?)),
        BackendType::Memory => Ok(Arc::new(MemoryHardware::from_config(config))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_auto_falls_back_to_memory_without_nodes() {
        let mut config = Config::default();
        config.backend = Some(Backend::Auto);
        config.rgb_path = Some("/nonexistent/kcal".to_string());
        assert_eq!(detect_backend(&config).unwrap(), BackendType::Memory);
    }

    #[test]
    fn test_auto_picks_sysfs_when_node_exists() {
        let dir = tempdir().unwrap();
        let node = dir.path().join("kcal");
        std::fs::write(&node, "256 256 256\n").unwrap();

        let mut config = Config::default();
        config.rgb_path = Some(node.display().to_string());
        assert_eq!(detect_backend(&config).unwrap(), BackendType::Sysfs);
    }

    #[test]
    fn test_explicit_sysfs_requires_nodes() {
        let mut config = Config::default();
        config.backend = Some(Backend::Sysfs);
        assert!(detect_backend(&config).is_err());

        config.color_balance_path = Some("/nonexistent/balance".to_string());
        assert!(detect_backend(&config).is_err());
    }

    #[test]
    fn test_explicit_memory() {
        let mut config = Config::default();
        config.backend = Some(Backend::Memory);
        let backend = create_backend(detect_backend(&config).unwrap(), &config).unwrap();
        assert_eq!(backend.backend_name(), "Memory");
    }

    #[test]
    fn test_backend_type_names() {
        assert_eq!(BackendType::Sysfs.name(), "Sysfs");
        assert_eq!(BackendType::Memory.name(), "Memory");
    }
}
