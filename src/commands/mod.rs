//! One-shot CLI command handlers.
//!
//! The setting commands edit the settings file directly and then ask a
//! running daemon to reload it. `status` spins up a private service against
//! in-memory hardware and reports what it would apply.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{DisplayHardware, MemoryHardware};
use crate::clock::Clock;
use crate::config::Config;
use crate::constants::*;
use crate::display::{LiveDisplayService, LogNotifier, ServiceContext};
use crate::settings::{DefaultSettings, SettingsDatabase, SettingsHelper};
use crate::twilight::{FixedTwilight, SolarTwilight, TwilightSource, TwilightState};

pub mod settings;
pub mod status;

/// Load the configuration from `path`, or from the default location.
///
/// # Returns
/// The config and the path it was read from
pub fn load_config(path: Option<&Path>) -> Result<(Config, PathBuf)> {
    match path {
        Some(path) => Ok((Config::load_from_path(path)?, path.to_path_buf())),
        None => Ok((Config::load()?, Config::get_config_path()?)),
    }
}

/// Open (and migrate) the current user's settings file.
pub fn open_settings(config: &Config) -> Result<Arc<SettingsHelper>> {
    let dir = config.settings_dir()?;
    let user_id = config.user_id.unwrap_or(OWNER_USER_ID);
    let defaults = DefaultSettings::builtin(
        config
            .fingerprint_wake_and_unlock
            .unwrap_or(DEFAULT_FINGERPRINT_WAKE_AND_UNLOCK),
    );
    let database = SettingsDatabase::open(&dir, user_id, &defaults)
        .with_context(|| format!("Failed to open settings in {}", dir.display()))?;
    Ok(Arc::new(SettingsHelper::new(database)))
}

/// Twilight from the configured coordinates, or permanent day without them.
pub fn twilight_source(config: &Config) -> Result<Arc<dyn TwilightSource>> {
    match config.coordinates() {
        Some((latitude, longitude)) => Ok(Arc::new(SolarTwilight::new(latitude, longitude)?)),
        None => Ok(Arc::new(FixedTwilight::new(TwilightState::unknown()))),
    }
}

/// Build a service that mirrors the configured hardware without touching it.
pub fn offline_service(
    config: &Config,
    settings: Arc<SettingsHelper>,
    clock: Arc<dyn Clock>,
) -> Result<Arc<LiveDisplayService>> {
    let hardware: Arc<dyn DisplayHardware> = Arc::new(MemoryHardware::from_config(config));
    LiveDisplayService::new(
        ServiceContext {
            hardware,
            settings,
            twilight: twilight_source(config)?,
            clock,
            notifier: Arc::new(LogNotifier),
        },
        config,
    )
}
