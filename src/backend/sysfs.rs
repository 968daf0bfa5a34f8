//! Sysfs display color nodes.
//!
//! Two node formats are supported:
//! - an RGB node that takes `"<r> <g> <b>\n"` with each channel scaled to
//!   `rgb_max` (the KCAL convention, where 256 is unity gain)
//! - a color balance node that reads and writes one signed integer

use anyhow::{Context, Result};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use super::DisplayHardware;
use crate::config::Config;
use crate::constants::DEFAULT_RGB_MAX;

#[derive(Debug, Clone)]
pub struct SysfsHardware {
    rgb_path: Option<PathBuf>,
    rgb_max: u32,
    balance_path: Option<PathBuf>,
    balance_range: RangeInclusive<i32>,
}

impl SysfsHardware {
    pub fn new(
        rgb_path: Option<PathBuf>,
        rgb_max: u32,
        balance_path: Option<PathBuf>,
        balance_range: RangeInclusive<i32>,
    ) -> Self {
        Self {
            rgb_path,
            rgb_max,
            balance_path,
            balance_range,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let balance_path = config.color_balance_path.as_ref().map(PathBuf::from);
        let balance_range = match (config.color_balance_min, config.color_balance_max) {
            (Some(min), Some(max)) => min..=max,
            _ if balance_path.is_some() => anyhow::bail!(
                "color_balance_path is set but color_balance_min/color_balance_max are missing"
            ),
            _ => 0..=0,
        };

        Ok(Self::new(
            config.rgb_path.as_ref().map(PathBuf::from),
            config.rgb_max.unwrap_or(DEFAULT_RGB_MAX),
            balance_path,
            balance_range,
        ))
    }

    fn write_node(path: &Path, content: &str) -> Result<()> {
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Format gains the way the RGB node expects.
    pub fn format_rgb(&self, rgb: [f32; 3]) -> String {
        let scale = |gain: f32| (gain.clamp(0.0, 1.0) * self.rgb_max as f32).round() as u32;
        format!("{} {} {}\n", scale(rgb[0]), scale(rgb[1]), scale(rgb[2]))
    }
}

impl DisplayHardware for SysfsHardware {
    fn backend_name(&self) -> &'static str {
        "Sysfs"
    }

    fn supports_color_balance(&self) -> bool {
        self.balance_path.as_deref().is_some_and(Path::exists)
    }

    fn color_balance_range(&self) -> RangeInclusive<i32> {
        self.balance_range.clone()
    }

    fn color_balance(&self) -> Result<i32> {
        let path = self
            .balance_path
            .as_deref()
            .context("No color balance node configured")?;
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        content
            .trim()
            .parse()
            .with_context(|| format!("Unexpected content in {}: {:?}", path.display(), content))
    }

    fn set_color_balance(&self, value: i32) -> Result<()> {
        let path = self
            .balance_path
            .as_deref()
            .context("No color balance node configured")?;
        if !self.balance_range.contains(&value) {
            anyhow::bail!(
                "Color balance {} outside {:?}",
                value,
                self.balance_range
            );
        }
        Self::write_node(path, &format!("{}\n", value))
    }

    fn has_color_adjustment(&self) -> bool {
        self.rgb_path.as_deref().is_some_and(Path::exists)
    }

    fn set_additional_adjustment(&self, rgb: [f32; 3]) -> Result<()> {
        let path = self
            .rgb_path
            .as_deref()
            .context("No RGB adjustment node configured")?;
        Self::write_node(path, &self.format_rgb(rgb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn hardware(dir: &Path) -> SysfsHardware {
        let rgb = dir.join("kcal");
        let balance = dir.join("color_balance");
        fs::write(&rgb, "256 256 256\n").unwrap();
        fs::write(&balance, "0\n").unwrap();
        SysfsHardware::new(Some(rgb), 256, Some(balance), -100..=100)
    }

    #[test]
    fn test_rgb_node_scaling() {
        let dir = tempdir().unwrap();
        let hw = hardware(dir.path());
        hw.set_additional_adjustment([1.0, 0.5, 0.0]).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("kcal")).unwrap(), "256 128 0\n");
    }

    #[test]
    fn test_balance_node_read_write() {
        let dir = tempdir().unwrap();
        let hw = hardware(dir.path());
        assert!(hw.supports_color_balance());
        hw.set_color_balance(-42).unwrap();
        assert_eq!(hw.color_balance().unwrap(), -42);
    }

    #[test]
    fn test_balance_outside_range_is_rejected() {
        let dir = tempdir().unwrap();
        let hw = hardware(dir.path());
        assert!(hw.set_color_balance(101).is_err());
        assert_eq!(hw.color_balance().unwrap(), 0);
    }

    #[test]
    fn test_missing_nodes_disable_features() {
        let hw = SysfsHardware::new(
            Some(PathBuf::from("/nonexistent/kcal")),
            256,
            None,
            0..=0,
        );
        assert!(!hw.has_color_adjustment());
        assert!(!hw.supports_color_balance());
        assert!(hw.color_balance().is_err());
    }

    #[test]
    fn test_from_config_requires_balance_range() {
        let mut config = Config::default();
        config.color_balance_path = Some("/sys/balance".to_string());
        assert!(SysfsHardware::from_config(&config).is_err());

        config.color_balance_min = Some(-50);
        config.color_balance_max = Some(50);
        let hw = SysfsHardware::from_config(&config).unwrap();
        assert_eq!(hw.color_balance_range(), -50..=50);
    }
}
