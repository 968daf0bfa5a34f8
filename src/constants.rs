//! Application constants and default values for livedisplay.
//!
//! This module contains the configuration defaults, validation limits,
//! timing constants and permission names used throughout the daemon.

use crate::config::Backend;
use crate::display::Mode;

// ═══ Application Configuration Defaults ═══
// These values are used when config options are not specified by the user

pub const DEFAULT_BACKEND: Backend = Backend::Auto;
pub const DEFAULT_MODE: Mode = Mode::Off;
pub const DEFAULT_DAY_TEMP: i32 = 6500; // Kelvin - close to natural sunlight
pub const DEFAULT_NIGHT_TEMP: i32 = 4500; // Kelvin - warm, comfortable for night viewing
pub const DEFAULT_MIN_TEMP: i32 = 1000; // Lowest Kelvin the panel accepts
pub const DEFAULT_MAX_TEMP: i32 = 10000; // Highest Kelvin the panel accepts
pub const DEFAULT_NIGHT_DISPLAY_AVAILABLE: bool = false;
pub const DEFAULT_FINGERPRINT_WAKE_AND_UNLOCK: bool = true;
pub const DEFAULT_RGB_MAX: u32 = 256; // KCAL full-scale channel value

// ═══ Validation Limits ═══
// Bounds enforced when loading the configuration file

pub const MINIMUM_TEMP: i32 = 1000; // Very warm candlelight-like
pub const MAXIMUM_TEMP: i32 = 20000; // Very cool blue light
pub const MAXIMUM_LATITUDE: f64 = 65.0; // Solar math degrades past the polar circles

// ═══ Timing ═══

pub const TWILIGHT_ADJUSTMENT_TIME_MS: i64 = 30 * 60 * 1000; // Ease window either side of a boundary
pub const TRANSITION_REEVALUATE_MS: u64 = 30 * 1000; // Poll interval while blending
pub const ANIMATION_FRAME_MS: u64 = 16; // ~60 fps balance animation
pub const BALANCE_STEP_DURATION_MS: u64 = 5; // Animation length per balance unit
pub const TWILIGHT_MIN_REFRESH_MS: i64 = 60 * 1000; // Never recompute sooner than a minute
pub const TWILIGHT_MAX_REFRESH_MS: i64 = 60 * 60 * 1000; // Always recompute at least hourly
pub const CHECK_INTERVAL_MS: u64 = 250; // Main loop signal polling

// ═══ Settings ═══

pub const DEFAULT_SUNSET_COUNTER: i32 = -3; // Nights to wait before showing the hint
pub const SETTINGS_DATABASE_NAME: &str = "lineagesettings.toml";
pub const SETTINGS_AUTHORITY: &str = "lineagesettings";
pub const OWNER_USER_ID: u32 = 0;

// ═══ Permissions ═══

pub const MANAGE_LIVEDISPLAY_PERMISSION: &str = "lineageos.permission.MANAGE_LIVEDISPLAY";
pub const DUMP_PERMISSION: &str = "android.permission.DUMP";

// ═══ Process ═══

pub const LOCK_FILE_NAME: &str = "livedisplay.lock";
pub const EXIT_FAILURE: i32 = 1;
