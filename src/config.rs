//! Configuration system for livedisplay with validation.
//!
//! The device configuration describes what the panel can do and the defaults
//! the daemon starts from. User choices (mode, day and night temperature)
//! are not stored here; they live in the settings database.
//!
//! ## Configuration Source
//!
//! The file is `$XDG_CONFIG_HOME/livedisplay/livedisplay.toml`, or any path
//! given with `--config`. When the default file is missing a commented one
//! is generated on first load.
//!
//! ```toml
//! # Backend configuration
//! backend = "auto"                  # "auto", "sysfs", or "memory"
//! rgb_path = "/sys/devices/platform/kcal_ctrl.0/kcal"
//! rgb_max = 256
//!
//! # Color temperature
//! default_mode = "off"              # "off", "night", "auto", "outdoor" or "day"
//! day_temp = 6500                   # Kelvin
//! night_temp = 4500                 # Kelvin
//! min_temp = 1000                   # Lowest Kelvin the panel accepts
//! max_temp = 10000                  # Highest Kelvin the panel accepts
//!
//! # Location for automatic mode
//! latitude = 40.7128
//! longitude = -74.0060
//! ```
//!
//! ## Validation
//!
//! - **Range validation**: temperatures 1000-20000K, `min_temp < max_temp`,
//!   defaults inside `[min_temp, max_temp]`
//! - **Geographic validation**: latitude (-90° to +90°, capped at ±65°),
//!   longitude (-180° to +180°)
//! - **Hardware validation**: a color balance range must be non-empty

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::display::Mode;
use crate::logger::Log;

/// Backend selection for the display color sink.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Sysfs when a configured node exists, otherwise memory.
    Auto,
    /// Write the configured sysfs nodes.
    Sysfs,
    /// Keep values in memory only. Useful for dry runs.
    Memory,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Auto => "auto",
            Backend::Sysfs => "sysfs",
            Backend::Memory => "memory",
        }
    }
}

/// Configuration structure for livedisplay.
///
/// Most fields are optional and are filled in by
/// `apply_defaults_and_validate_fields` during loading.
///
/// ## Configuration Categories
///
/// - **Backend Control**: `backend`, `rgb_path`, `rgb_max`,
///   `color_balance_path`, `color_balance_min`, `color_balance_max`
/// - **Color Settings**: `default_mode`, `day_temp`, `night_temp`,
///   `min_temp`, `max_temp`, `night_display_available`
/// - **Location**: `latitude`, `longitude`
/// - **Settings Store**: `settings_dir`, `user_id`,
///   `fingerprint_wake_and_unlock`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub backend: Option<Backend>,
    pub default_mode: Option<Mode>,
    pub day_temp: Option<i32>,
    pub night_temp: Option<i32>,
    pub min_temp: Option<i32>,
    pub max_temp: Option<i32>,

    /// Whether the platform ships its own night display. When `true` the
    /// temperature controller stays inactive.
    pub night_display_available: Option<bool>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub rgb_path: Option<String>,
    pub rgb_max: Option<u32>,
    pub color_balance_path: Option<String>,
    pub color_balance_min: Option<i32>,
    pub color_balance_max: Option<i32>,

    /// Directory holding the settings database. Defaults to the user data dir.
    pub settings_dir: Option<String>,
    pub user_id: Option<u32>,

    /// Device default used when migrating the legacy fingerprint settings.
    pub fingerprint_wake_and_unlock: Option<bool>,
}

impl Config {
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("livedisplay").join("livedisplay.toml"))
    }

    /// Write a commented default configuration to `path`.
    pub fn create_default_config(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let config_content = ConfigBuilder::new()
            .add_section("Backend")
            .add_setting(
                "backend",
                &format!("\"{}\"", DEFAULT_BACKEND.as_str()),
                "Backend to use: \"auto\", \"sysfs\" or \"memory\"",
            )
            .add_setting(
                "rgb_max",
                &DEFAULT_RGB_MAX.to_string(),
                "Full-scale value of the RGB node channels",
            )
            .add_section("Color temperature")
            .add_setting(
                "default_mode",
                &format!("\"{}\"", DEFAULT_MODE),
                "Mode used until one is chosen: off, night, auto, outdoor or day",
            )
            .add_setting(
                "day_temp",
                &DEFAULT_DAY_TEMP.to_string(),
                "Default day temperature in Kelvin",
            )
            .add_setting(
                "night_temp",
                &DEFAULT_NIGHT_TEMP.to_string(),
                "Default night temperature in Kelvin",
            )
            .add_setting(
                "min_temp",
                &DEFAULT_MIN_TEMP.to_string(),
                "Lowest temperature the panel accepts",
            )
            .add_setting(
                "max_temp",
                &DEFAULT_MAX_TEMP.to_string(),
                "Highest temperature the panel accepts",
            )
            .add_setting(
                "night_display_available",
                &DEFAULT_NIGHT_DISPLAY_AVAILABLE.to_string(),
                "Set true if the platform already provides a night light",
            )
            .build();

        fs::write(path, config_content)
            .with_context(|| format!("Failed to write default config to {}", path.display()))?;

        Log::log_indented(&format!(
            "Created default config at {}",
            crate::utils::path_for_display(path)
        ));
        Ok(())
    }

    fn apply_defaults_and_validate_fields(config: &mut Config) -> Result<()> {
        if config.backend.is_none() {
            config.backend = Some(DEFAULT_BACKEND);
        }

        if config.default_mode.is_none() {
            config.default_mode = Some(DEFAULT_MODE);
        }

        // Validate the supported range first, the defaults are checked against it
        let min_temp = *config.min_temp.get_or_insert(DEFAULT_MIN_TEMP);
        let max_temp = *config.max_temp.get_or_insert(DEFAULT_MAX_TEMP);
        for (name, temp) in [("Minimum", min_temp), ("Maximum", max_temp)] {
            if !(MINIMUM_TEMP..=MAXIMUM_TEMP).contains(&temp) {
                anyhow::bail!(
                    "{} temperature must be between {} and {} Kelvin",
                    name,
                    MINIMUM_TEMP,
                    MAXIMUM_TEMP
                );
            }
        }
        if min_temp >= max_temp {
            anyhow::bail!(
                "min_temp ({}K) must be lower than max_temp ({}K)",
                min_temp,
                max_temp
            );
        }

        let day_temp = *config.day_temp.get_or_insert(DEFAULT_DAY_TEMP);
        let night_temp = *config.night_temp.get_or_insert(DEFAULT_NIGHT_TEMP);
        for (name, temp) in [("Day", day_temp), ("Night", night_temp)] {
            if !(min_temp..=max_temp).contains(&temp) {
                anyhow::bail!(
                    "{} temperature must be between {} and {} Kelvin (got {})",
                    name,
                    min_temp,
                    max_temp,
                    temp
                );
            }
        }

        if config.night_display_available.is_none() {
            config.night_display_available = Some(DEFAULT_NIGHT_DISPLAY_AVAILABLE);
        }

        if config.fingerprint_wake_and_unlock.is_none() {
            config.fingerprint_wake_and_unlock = Some(DEFAULT_FINGERPRINT_WAKE_AND_UNLOCK);
        }

        if config.user_id.is_none() {
            config.user_id = Some(OWNER_USER_ID);
        }

        if let Some(rgb_max) = config.rgb_max {
            if rgb_max == 0 {
                anyhow::bail!("rgb_max must be greater than 0");
            }
        } else {
            config.rgb_max = Some(DEFAULT_RGB_MAX);
        }

        match (config.color_balance_min, config.color_balance_max) {
            (Some(min), Some(max)) if min >= max => {
                anyhow::bail!(
                    "color_balance_min ({}) must be lower than color_balance_max ({})",
                    min,
                    max
                );
            }
            (Some(_), None) | (None, Some(_)) => {
                anyhow::bail!("color_balance_min and color_balance_max must be set together");
            }
            _ => {}
        }

        // Validate latitude range (-90 to 90)
        if let Some(lat) = config.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                anyhow::bail!(
                    "Latitude must be between -90 and 90 degrees (got {})",
                    lat
                );
            }
            // Cap latitude to avoid solar calculation edge cases
            if lat.abs() > MAXIMUM_LATITUDE {
                Log::log_pipe();
                Log::log_warning(&format!(
                    "⚠️ Latitude capped at {}°{} (config {:.4}°{})",
                    MAXIMUM_LATITUDE,
                    if lat >= 0.0 { "N" } else { "S" },
                    lat.abs(),
                    if lat >= 0.0 { "N" } else { "S" },
                ));
                Log::log_indented("Sunrise and sunset are unreliable near the poles.");
                config.latitude = Some(MAXIMUM_LATITUDE * lat.signum());
            }
        }

        // Validate longitude range (-180 to 180)
        if let Some(lon) = config.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                anyhow::bail!(
                    "Longitude must be between -180 and 180 degrees (got {})",
                    lon
                );
            }
        }

        if config.latitude.is_some() != config.longitude.is_some() {
            anyhow::bail!("latitude and longitude must be set together");
        }

        Ok(())
    }

    /// Load from a specific path. Does NOT create a default config.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!(
                "Configuration file not found at specified path: {}",
                path.display()
            );
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        Self::apply_defaults_and_validate_fields(&mut config)?;

        Ok(config)
    }

    /// Load the default config file, creating it on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)
                .context("Failed to create default config during load")?;
        }

        Self::load_from_path(&config_path).with_context(|| {
            Log::log_pipe();
            format!(
                "Failed to load configuration from {}",
                config_path.display()
            )
        })
    }

    /// Directory holding the per-user settings files.
    pub fn settings_dir(&self) -> Result<PathBuf> {
        match &self.settings_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => {
                let data_dir = dirs::data_dir().context("Could not determine data directory")?;
                Ok(data_dir.join("livedisplay"))
            }
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    pub fn log_config(&self, config_path: &Path) {
        Log::log_block_start(&format!(
            "Loaded configuration from {}",
            crate::utils::path_for_display(config_path)
        ));

        Log::log_indented(&format!(
            "Backend: {}",
            self.backend.unwrap_or(DEFAULT_BACKEND).as_str()
        ));
        if let Some(path) = &self.rgb_path {
            Log::log_indented(&format!(
                "RGB node: {} (max {})",
                path,
                self.rgb_max.unwrap_or(DEFAULT_RGB_MAX)
            ));
        }
        if let Some(path) = &self.color_balance_path {
            Log::log_indented(&format!(
                "Color balance node: {} ({}..={})",
                path,
                self.color_balance_min.unwrap_or_default(),
                self.color_balance_max.unwrap_or_default()
            ));
        }

        Log::log_indented(&format!(
            "Default mode: {}",
            self.default_mode.unwrap_or(DEFAULT_MODE)
        ));
        Log::log_indented(&format!(
            "Day temperature: {}K",
            self.day_temp.unwrap_or(DEFAULT_DAY_TEMP)
        ));
        Log::log_indented(&format!(
            "Night temperature: {}K",
            self.night_temp.unwrap_or(DEFAULT_NIGHT_TEMP)
        ));
        Log::log_indented(&format!(
            "Temperature range: {}K - {}K",
            self.min_temp.unwrap_or(DEFAULT_MIN_TEMP),
            self.max_temp.unwrap_or(DEFAULT_MAX_TEMP)
        ));
        if self
            .night_display_available
            .unwrap_or(DEFAULT_NIGHT_DISPLAY_AVAILABLE)
        {
            Log::log_indented("Platform night display present, temperature control disabled");
        }

        if let Some((lat, lon)) = self.coordinates() {
            let lat_dir = if lat >= 0.0 { "N" } else { "S" };
            let lon_dir = if lon >= 0.0 { "E" } else { "W" };
            Log::log_indented(&format!(
                "Location: {:.4}°{}, {:.4}°{}",
                lat.abs(),
                lat_dir,
                lon.abs(),
                lon_dir
            ));
        } else {
            Log::log_indented("Location: not set, automatic mode stays at day");
        }
    }
}

/// Builder for the generated default config, aligning comments in a column.
struct ConfigBuilder {
    entries: Vec<ConfigEntry>,
}

struct ConfigEntry {
    content: String,
    entry_type: EntryType,
}

enum EntryType {
    Section,
    Setting { line: String, comment: String },
}

impl ConfigBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn add_section(mut self, title: &str) -> Self {
        self.entries.push(ConfigEntry {
            content: format!("#[{}]", title),
            entry_type: EntryType::Section,
        });
        self
    }

    fn add_setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        let line = format!("{} = {}", key, value);
        self.entries.push(ConfigEntry {
            content: line.clone(),
            entry_type: EntryType::Setting {
                line,
                comment: format!("# {}", comment),
            },
        });
        self
    }

    fn build(self) -> String {
        let max_width = self
            .entries
            .iter()
            .filter_map(|entry| match &entry.entry_type {
                EntryType::Setting { line, .. } => Some(line.len()),
                EntryType::Section => None,
            })
            .max()
            .unwrap_or(0)
            + 1;

        let mut result = Vec::new();
        let mut first_section = true;

        for entry in self.entries {
            match entry.entry_type {
                EntryType::Section => {
                    if !first_section {
                        result.push(String::new());
                    }
                    result.push(entry.content);
                    first_section = false;
                }
                EntryType::Setting { line, comment } => {
                    let padding = " ".repeat(max_width - line.len());
                    result.push(format!("{}{}{}", line, padding, comment));
                }
            }
        }

        result.push(String::new());
        result.join("\n")
    }
}
