//! `status [--at]`: what the daemon would apply right now, or at `--at`.

use anyhow::Result;
use chrono::{Local, TimeZone};
use std::path::Path;
use std::sync::Arc;

use crate::clock::{Clock, ManualClock, SystemClock};
use crate::display::{Caller, LiveDisplayInterface};
use crate::logger::Log;

use super::{load_config, offline_service, open_settings};

/// Snapshot printed by the status command.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub at_millis: i64,
    pub mode: String,
    pub is_night: bool,
    pub color_temperature: i32,
    pub day_temperature: i32,
    pub night_temperature: i32,
    pub dump: String,
}

pub fn handle_status_command(
    at_millis: Option<i64>,
    debug_enabled: bool,
    config_path: Option<&Path>,
) -> Result<StatusReport> {
    Log::set_debug(debug_enabled);
    let (config, config_path) = load_config(config_path)?;
    Log::log_version();
    config.log_config(&config_path);

    let at_millis = at_millis.unwrap_or_else(|| SystemClock.now_millis());
    let settings = open_settings(&config)?;
    let service = offline_service(&config, settings, Arc::new(ManualClock::new(at_millis)))?;

    service.start(true, false);
    // settings observers first, then the updates they post
    service.flush();
    service.flush();

    let report = StatusReport {
        at_millis,
        mode: service.mode().to_string(),
        is_night: service.is_night(),
        color_temperature: service.color_temperature(),
        day_temperature: service.day_color_temperature(),
        night_temperature: service.night_color_temperature(),
        dump: service.dump(&Caller::system())?,
    };
    service.shutdown();

    let when = Local
        .timestamp_millis_opt(report.at_millis)
        .single()
        .map_or_else(|| report.at_millis.to_string(), |t| t.format("%Y-%m-%d %H:%M:%S %Z").to_string());
    Log::log_block_start(&format!("Status at {}", when));
    Log::log_indented(&format!("Mode: {}", report.mode));
    Log::log_indented(&format!("Night: {}", report.is_night));
    if report.color_temperature < 0 {
        Log::log_indented("Color temperature: not applied");
    } else {
        Log::log_indented(&format!("Color temperature: {}K", report.color_temperature));
    }
    Log::log_indented(&format!(
        "Day / night: {}K / {}K",
        report.day_temperature, report.night_temperature
    ));
    if debug_enabled {
        for line in report.dump.lines().filter(|line| !line.is_empty()) {
            Log::log_indented(line);
        }
    }
    Log::log_end();

    Ok(report)
}
