//! LiveDisplay: mode selection, capabilities and the color temperature
//! controller.
//!
//! The [`service::LiveDisplayService`] owns the shared [`State`] and fans
//! changes out to the [`color_temperature::ColorTemperatureController`],
//! tagged with one of the update flags below. All work runs on the
//! service's [`sequencer::Sequencer`] thread.

use anyhow::Result;
use serde::Deserialize;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::twilight::TwilightState;

pub mod animator;
pub mod color_temperature;
pub mod sequencer;
pub mod service;

pub use animator::BalanceAnimation;
pub use color_temperature::ColorTemperatureController;
pub use sequencer::{Sequencer, SequencerHandle};
pub use service::{
    Caller, LiveDisplayInterface, LiveDisplayService, LogNotifier, Notifier, PermissionDenied,
    ServiceContext,
};

/// Display modes. The discriminants double as capability bit numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Mode {
    Off = 0,
    Night = 1,
    Auto = 2,
    Outdoor = 3,
    Day = 4,
}

pub const MODE_FIRST: Mode = Mode::Off;
pub const MODE_LAST: Mode = Mode::Day;

// Feature bits live above the mode bits. Only the color temperature
// controller's features are reported; 10-19 is the reserved range.
pub const FEATURE_FIRST: u32 = 10;
pub const FEATURE_COLOR_ADJUSTMENT: u32 = 13;
pub const FEATURE_COLOR_BALANCE: u32 = 16;
pub const FEATURE_LAST: u32 = 19;

impl Mode {
    pub const ALL: [Mode; 5] = [Mode::Off, Mode::Night, Mode::Auto, Mode::Outdoor, Mode::Day];

    pub fn from_i32(value: i32) -> Option<Mode> {
        Self::ALL.into_iter().find(|mode| mode.as_i32() == value)
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Off => "off",
            Mode::Night => "night",
            Mode::Auto => "auto",
            Mode::Outdoor => "outdoor",
            Mode::Day => "day",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(value) = s.parse::<i32>() {
            return Mode::from_i32(value)
                .ok_or_else(|| anyhow::anyhow!("Unknown display mode {}", value));
        }
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown display mode '{}'. Use off, night, auto, outdoor or day",
                    s
                )
            })
    }
}

/// Set of supported modes and features, indexed by bit number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities(u32);

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, bit: u32) {
        if bit < u32::BITS {
            self.0 |= 1 << bit;
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.set(mode as u32);
    }

    /// Whether `bit` is set. Negative or oversized bits are never set.
    pub fn get(&self, bit: i32) -> bool {
        u32::try_from(bit).is_ok_and(|bit| bit < u32::BITS && self.0 & (1 << bit) != 0)
    }

    pub fn has_mode(&self, mode: Mode) -> bool {
        self.get(mode.as_i32())
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> impl Iterator<Item = u32> + '_ {
        (0..u32::BITS).filter(|bit| self.0 & (1 << bit) != 0)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits: Vec<String> = self.bits().map(|bit| bit.to_string()).collect();
        write!(f, "{{{}}}", bits.join(", "))
    }
}

/// Static configuration published to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveDisplayConfig {
    pub capabilities: Capabilities,
    pub default_mode: Mode,
    pub default_day_temperature: i32,
    pub default_night_temperature: i32,
    pub color_temperature_range: RangeInclusive<i32>,
    pub color_balance_range: RangeInclusive<i32>,
}

impl LiveDisplayConfig {
    /// True if anything besides off is supported.
    pub fn has_mode_support(&self) -> bool {
        Mode::ALL
            .into_iter()
            .filter(|mode| *mode != Mode::Off)
            .any(|mode| self.capabilities.has_mode(mode))
    }

    /// Whether a mode or feature number is supported. Off always is.
    pub fn has_feature(&self, bit: i32) -> bool {
        let is_mode = (MODE_FIRST.as_i32()..=MODE_LAST.as_i32()).contains(&bit);
        let is_feature = (FEATURE_FIRST as i32..=FEATURE_LAST as i32).contains(&bit);
        (is_mode || is_feature) && (bit == Mode::Off.as_i32() || self.capabilities.get(bit))
    }
}

impl fmt::Display for LiveDisplayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[capabilities={}, defaultMode={}, defaultDayTemperature={}, \
             defaultNightTemperature={}, colorTemperatureRange={:?}, colorBalanceRange={:?}]",
            self.capabilities,
            self.default_mode.as_i32(),
            self.default_day_temperature,
            self.default_night_temperature,
            self.color_temperature_range,
            self.color_balance_range
        )
    }
}

/// Shared display state handed to the controller with every update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct State {
    pub low_power_mode: bool,
    pub screen_on: bool,
    /// `None` until the mode observer has reported, or when modes are unsupported.
    pub mode: Option<Mode>,
    pub twilight: Option<TwilightState>,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[lowPowerMode={}, screenOn={}, mode={}, twilight={}]",
            self.low_power_mode,
            self.screen_on,
            self.mode.map_or(-1, Mode::as_i32),
            self.twilight
                .map_or_else(|| "NULL".to_string(), |t| t.to_string())
        )
    }
}

/// Update flags telling the controller what changed.
pub mod flags {
    pub const MODE_CHANGED: u32 = 1;
    pub const DISPLAY_CHANGED: u32 = 2;
    pub const TWILIGHT_CHANGED: u32 = 4;
    pub const ALL_CHANGED: u32 = 255;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(modes: &[Mode]) -> LiveDisplayConfig {
        let mut capabilities = Capabilities::new();
        for mode in modes {
            capabilities.set_mode(*mode);
        }
        LiveDisplayConfig {
            capabilities,
            default_mode: Mode::Off,
            default_day_temperature: 6500,
            default_night_temperature: 4500,
            color_temperature_range: 1000..=10000,
            color_balance_range: 0..=0,
        }
    }

    #[test]
    fn test_mode_numbering() {
        assert_eq!(Mode::Off.as_i32(), 0);
        assert_eq!(Mode::Night.as_i32(), 1);
        assert_eq!(Mode::Auto.as_i32(), 2);
        assert_eq!(Mode::Outdoor.as_i32(), 3);
        assert_eq!(Mode::Day.as_i32(), 4);
        assert_eq!(Mode::from_i32(5), None);
        assert_eq!(Mode::from_i32(-1), None);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("auto".parse::<Mode>().unwrap(), Mode::Auto);
        assert_eq!("Night".parse::<Mode>().unwrap(), Mode::Night);
        assert_eq!("4".parse::<Mode>().unwrap(), Mode::Day);
        assert!("dusk".parse::<Mode>().is_err());
        assert!("9".parse::<Mode>().is_err());
    }

    #[test]
    fn test_capability_bits() {
        let mut caps = Capabilities::new();
        caps.set_mode(Mode::Auto);
        caps.set(FEATURE_COLOR_BALANCE);
        assert!(caps.has_mode(Mode::Auto));
        assert!(!caps.has_mode(Mode::Day));
        assert!(caps.get(16));
        assert!(!caps.get(-1));
        assert!(!caps.get(64));
        assert_eq!(caps.bits().collect::<Vec<_>>(), vec![2, 16]);
        assert_eq!(caps.to_string(), "{2, 16}");
    }

    #[test]
    fn test_has_feature_checks_known_ranges() {
        let mut config = config(&[Mode::Night]);
        config.capabilities.set(FEATURE_COLOR_ADJUSTMENT);
        config.capabilities.set(25);

        assert!(config.has_feature(Mode::Off.as_i32()));
        assert!(config.has_feature(Mode::Night.as_i32()));
        assert!(!config.has_feature(Mode::Auto.as_i32()));
        assert!(config.has_feature(FEATURE_COLOR_ADJUSTMENT as i32));
        assert!(!config.has_feature(FEATURE_COLOR_BALANCE as i32));
        // Set but outside both ranges
        assert!(!config.has_feature(25));
        assert!(!config.has_feature(-1));
    }

    #[test]
    fn test_mode_support_ignores_off() {
        assert!(!config(&[]).has_mode_support());
        assert!(!config(&[Mode::Off]).has_mode_support());
        assert!(config(&[Mode::Night]).has_mode_support());
    }

    #[test]
    fn test_state_display() {
        let state = State {
            screen_on: true,
            mode: Some(Mode::Auto),
            ..State::default()
        };
        assert_eq!(
            state.to_string(),
            "[lowPowerMode=false, screenOn=true, mode=2, twilight=NULL]"
        );
    }
}
