//! Persisted user settings.
//!
//! Settings live in three scoped name/value tables (`system`, `secure` and
//! `global`), stored per user and versioned with forward migrations. They
//! are addressed by URI, e.g. `content://lineagesettings/system/display_temperature_mode`.
//!
//! ## Layers
//!
//! - [`database`]: the on-disk store, schema creation and migrations
//! - [`observer`]: change notification keyed by URI
//! - [`helper`]: typed, URI-routed access that persists then notifies

pub mod database;
pub mod helper;
pub mod observer;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::SETTINGS_AUTHORITY;

pub use database::{DATABASE_VERSION, DefaultSettings, SettingsDatabase};
pub use helper::SettingsHelper;
pub use observer::{ListenerId, Observatory, SettingsChangeListener};

/// Setting names used by the display service and the migrations.
pub mod keys {
    // System
    pub const DISPLAY_TEMPERATURE_DAY: &str = "display_temperature_day";
    pub const DISPLAY_TEMPERATURE_NIGHT: &str = "display_temperature_night";
    pub const DISPLAY_TEMPERATURE_MODE: &str = "display_temperature_mode";
    pub const LIVE_DISPLAY_HINTED: &str = "live_display_hinted";
    pub const FINGERPRINT_WAKE_UNLOCK: &str = "fingerprint_wake_unlock";

    // Secure
    pub const BUTTON_BRIGHTNESS: &str = "button_brightness";
    pub const KEYBOARD_BRIGHTNESS: &str = "keyboard_brightness";
    pub const BERRY_BLACK_THEME: &str = "berry_black_theme";
    pub const SFPS_REQUIRE_SCREEN_ON_TO_AUTH_ENABLED: &str = "sfps_require_screen_on_to_auth_enabled";
    pub const SFPS_PERFORMANT_AUTH_ENABLED: &str = "sfps_performant_auth_enabled";
    pub const TETHERING_ALLOW_VPN_UPSTREAMS: &str = "tethering_allow_vpn_upstreams";

    // Global
    pub const TRUST_RESTRICT_USB: &str = "trust_restrict_usb";
    pub const RESTRICTED_NETWORKING_MODE: &str = "restricted_networking_mode";
    pub const UIDS_ALLOWED_ON_RESTRICTED_NETWORKS: &str = "uids_allowed_on_restricted_networks";
    pub const GLOBAL_VPN_APP: &str = "global_vpn_app";
}

/// Which table a setting lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    System,
    Secure,
    Global,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::System, Scope::Secure, Scope::Global];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::System => "system",
            Scope::Secure => "secure",
            Scope::Global => "global",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(Scope::System),
            "secure" => Ok(Scope::Secure),
            "global" => Ok(Scope::Global),
            other => anyhow::bail!("Table '{}' is not a valid settings table", other),
        }
    }
}

/// Address of a single setting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SettingUri {
    pub scope: Scope,
    pub name: String,
}

impl SettingUri {
    pub fn new(scope: Scope, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }

    pub fn system(name: impl Into<String>) -> Self {
        Self::new(Scope::System, name)
    }

    pub fn secure(name: impl Into<String>) -> Self {
        Self::new(Scope::Secure, name)
    }

    pub fn global(name: impl Into<String>) -> Self {
        Self::new(Scope::Global, name)
    }

    /// Parse either a full `content://lineagesettings/<scope>/<name>` URI or
    /// the short `<scope>/<name>` form.
    pub fn parse(input: &str) -> Result<Self> {
        let prefix = format!("content://{}/", SETTINGS_AUTHORITY);
        let path = input.strip_prefix(prefix.as_str()).unwrap_or(input);

        let (scope, name) = path
            .split_once('/')
            .with_context(|| format!("Setting URI '{}' has no table component", input))?;
        if name.is_empty() || name.contains('/') {
            anyhow::bail!("Setting URI '{}' has an invalid name", input);
        }
        Ok(Self::new(scope.parse()?, name))
    }
}

impl fmt::Display for SettingUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "content://{}/{}/{}", SETTINGS_AUTHORITY, self.scope, self.name)
    }
}

impl FromStr for SettingUri {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
