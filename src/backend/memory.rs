//! In-memory display hardware.
//!
//! Holds the last applied values and a history of every write. The daemon
//! falls back to it when no real nodes exist, and tests use it to observe
//! what the controller applied.

use anyhow::Result;
use std::ops::RangeInclusive;
use std::sync::{Mutex, MutexGuard};

use super::DisplayHardware;
use crate::config::Config;

#[derive(Debug, Default)]
struct MemoryState {
    balance: i32,
    adjustment: [f32; 3],
    balance_writes: Vec<i32>,
    adjustment_writes: Vec<[f32; 3]>,
}

#[derive(Debug)]
pub struct MemoryHardware {
    color_balance: Option<RangeInclusive<i32>>,
    color_adjustment: bool,
    state: Mutex<MemoryState>,
}

impl MemoryHardware {
    /// Hardware that only supports RGB adjustment.
    pub fn rgb() -> Self {
        Self::new(None, true)
    }

    /// Hardware with scalar color balance over `range`, starting at 0.
    pub fn color_balance(range: RangeInclusive<i32>) -> Self {
        Self::new(Some(range), false)
    }

    /// Hardware with no color features at all.
    pub fn unsupported() -> Self {
        Self::new(None, false)
    }

    pub fn new(color_balance: Option<RangeInclusive<i32>>, color_adjustment: bool) -> Self {
        Self {
            color_balance,
            color_adjustment,
            state: Mutex::new(MemoryState {
                adjustment: [1.0, 1.0, 1.0],
                ..MemoryState::default()
            }),
        }
    }

    /// Mirror the features a configured sysfs device would have.
    pub fn from_config(config: &Config) -> Self {
        let balance = match (config.color_balance_min, config.color_balance_max) {
            (Some(min), Some(max)) if config.color_balance_path.is_some() => Some(min..=max),
            _ => None,
        };
        let color_adjustment = balance.is_none();
        Self::new(balance, color_adjustment)
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current_adjustment(&self) -> [f32; 3] {
        self.state().adjustment
    }

    pub fn balance_writes(&self) -> Vec<i32> {
        self.state().balance_writes.clone()
    }

    pub fn adjustment_writes(&self) -> Vec<[f32; 3]> {
        self.state().adjustment_writes.clone()
    }
}

impl DisplayHardware for MemoryHardware {
    fn backend_name(&self) -> &'static str {
        "Memory"
    }

    fn supports_color_balance(&self) -> bool {
        self.color_balance.is_some()
    }

    fn color_balance_range(&self) -> RangeInclusive<i32> {
        self.color_balance.clone().unwrap_or(0..=0)
    }

    fn color_balance(&self) -> Result<i32> {
        Ok(self.state().balance)
    }

    fn set_color_balance(&self, value: i32) -> Result<()> {
        let Some(range) = &self.color_balance else {
            anyhow::bail!("Color balance is not supported");
        };
        if !range.contains(&value) {
            anyhow::bail!("Color balance {} outside {:?}", value, range);
        }
        let mut state = self.state();
        state.balance = value;
        state.balance_writes.push(value);
        Ok(())
    }

    fn has_color_adjustment(&self) -> bool {
        self.color_adjustment
    }

    fn set_additional_adjustment(&self, rgb: [f32; 3]) -> Result<()> {
        if !self.color_adjustment {
            anyhow::bail!("Color adjustment is not supported");
        }
        let mut state = self.state();
        state.adjustment = rgb;
        state.adjustment_writes.push(rgb);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_hardware_records_writes() {
        let hw = MemoryHardware::rgb();
        assert!(hw.has_color_adjustment());
        assert!(!hw.supports_color_balance());
        hw.set_additional_adjustment([1.0, 0.8, 0.6]).unwrap();
        assert_eq!(hw.current_adjustment(), [1.0, 0.8, 0.6]);
        assert_eq!(hw.adjustment_writes().len(), 1);
        assert!(hw.set_color_balance(1).is_err());
    }

    #[test]
    fn test_balance_hardware_enforces_range() {
        let hw = MemoryHardware::color_balance(-10..=10);
        hw.set_color_balance(5).unwrap();
        assert!(hw.set_color_balance(11).is_err());
        assert_eq!(hw.color_balance().unwrap(), 5);
        assert_eq!(hw.balance_writes(), vec![5]);
    }

    #[test]
    fn test_from_config_mirrors_balance_setup() {
        let mut config = Config::default();
        assert!(MemoryHardware::from_config(&config).has_color_adjustment());

        config.color_balance_path = Some("/sys/balance".to_string());
        config.color_balance_min = Some(-5);
        config.color_balance_max = Some(5);
        let hw = MemoryHardware::from_config(&config);
        assert!(hw.supports_color_balance());
        assert_eq!(hw.color_balance_range(), -5..=5);
    }
}
