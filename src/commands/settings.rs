//! `mode`, `day`, `night`, `get` and `put`.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::args::Period;
use crate::clock::SystemClock;
use crate::display::{Caller, LiveDisplayInterface, Mode};
use crate::logger::Log;
use crate::settings::SettingUri;
use crate::signals;

use super::{load_config, offline_service, open_settings};

fn notify_daemon() {
    match signals::notify_running_instance(&signals::lock_file_path()) {
        Ok(true) => Log::log_indented("Running livedisplay notified"),
        Ok(false) => Log::log_indented("No running livedisplay found, change applies on next start"),
        Err(e) => Log::log_warning(&format!("Could not notify running livedisplay: {}", e)),
    }
}

/// Store a display mode through the service's validation.
///
/// # Returns
/// `Ok(false)` if the mode isn't supported by the configured hardware
pub fn handle_set_mode(mode: Mode, config_path: Option<&Path>) -> Result<bool> {
    let (config, _) = load_config(config_path)?;
    let settings = open_settings(&config)?;
    let service = offline_service(&config, settings, Arc::new(SystemClock))?;

    let stored = service.set_mode(&Caller::system(), mode.as_i32())?;
    service.shutdown();

    Log::log_block_start(&format!("Set mode {}", mode));
    if stored {
        Log::log_indented("Stored");
        notify_daemon();
    } else {
        Log::log_error(&format!(
            "Mode {} is not supported here (capabilities {})",
            mode,
            service.config().capabilities
        ));
    }
    Ok(stored)
}

/// Store a day or night temperature.
///
/// # Returns
/// `Ok(false)` if `kelvin` is outside the configured range
pub fn handle_set_temperature(
    period: Period,
    kelvin: i32,
    config_path: Option<&Path>,
) -> Result<bool> {
    let (config, _) = load_config(config_path)?;
    let settings = open_settings(&config)?;
    let service = offline_service(&config, settings, Arc::new(SystemClock))?;

    let caller = Caller::system();
    let stored = match period {
        Period::Day => service.set_day_color_temperature(&caller, kelvin)?,
        Period::Night => service.set_night_color_temperature(&caller, kelvin)?,
    };
    service.shutdown();

    let label = match period {
        Period::Day => "day",
        Period::Night => "night",
    };
    Log::log_block_start(&format!("Set {} temperature {}K", label, kelvin));
    if stored {
        Log::log_indented("Stored");
        notify_daemon();
    } else {
        let range = service.config().color_temperature_range;
        Log::log_error(&format!(
            "{}K is outside {}K - {}K",
            kelvin,
            range.start(),
            range.end()
        ));
    }
    Ok(stored)
}

/// Print a raw setting value, or `null` when unset.
pub fn handle_get(uri: &SettingUri, config_path: Option<&Path>) -> Result<Option<String>> {
    let (config, _) = load_config(config_path)?;
    let settings = open_settings(&config)?;
    let value = settings.get_string(uri);
    println!("{}", value.as_deref().unwrap_or("null"));
    Ok(value)
}

/// Write a raw setting value.
pub fn handle_put(uri: &SettingUri, value: &str, config_path: Option<&Path>) -> Result<()> {
    let (config, _) = load_config(config_path)?;
    let settings = open_settings(&config)?;
    settings.put_string(uri, value)?;
    Log::log_block_start(&format!("{} = {}", uri, value));
    notify_daemon();
    Ok(())
}
