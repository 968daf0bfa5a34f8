//! # LiveDisplay
//!
//! A sunset-aware display color temperature daemon.
//!
//! LiveDisplay warms the screen between sunset and sunrise, easing across a
//! half hour either side of each boundary. User choices (mode, day and night
//! temperatures) live in a versioned, per-user settings store that other
//! processes can change and the daemon picks up on reload.
//!
//! ## Architecture
//!
//! - **args**: Command-line parsing
//! - **backend**: Display color hardware (sysfs nodes or in-memory)
//! - **blend**: Twilight weighting of the day and night temperatures
//! - **clock**: Wall-clock abstraction
//! - **color**: Kelvin to RGB gains
//! - **commands**: One-shot CLI commands
//! - **config**: Configuration loading, validation, and default generation
//! - **constants**: Application-wide constants and defaults
//! - **display**: Modes, capabilities, the controller and the service
//! - **logger**: Structured logging with visual formatting
//! - **settings**: The settings store, its migrations and change observers
//! - **signals**: Signal handling and the single-instance lock
//! - **twilight**: Sunrise and sunset boundaries
//! - **utils**: Interpolation and curve fitting helpers

pub mod args;
pub mod backend;
pub mod blend;
pub mod clock;
pub mod color;
pub mod commands;
pub mod config;
pub mod constants;
pub mod display;
pub mod logger;
pub mod settings;
pub mod signals;
pub mod twilight;
pub mod utils;

// Re-export important types for easier access
pub use config::Config;
pub use display::{Caller, LiveDisplayInterface, LiveDisplayService, Mode, ServiceContext};
pub use logger::{Log, LogLevel};
pub use settings::{SettingUri, SettingsHelper};
pub use twilight::{TwilightSource, TwilightState};
