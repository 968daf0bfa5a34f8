//! On-disk settings store with schema creation and versioned migrations.
//!
//! Each user has one TOML file holding a schema `version` and one table per
//! [`Scope`]. The owner (user 0) gets `<dir>/lineagesettings.toml`; any other
//! user gets `<dir>/users/<id>/lineagesettings.toml`. Only the owner has a
//! `global` table.
//!
//! ```toml
//! version = 21
//!
//! [system]
//! display_temperature_mode = "2"
//!
//! [secure]
//! berry_black_theme = "0"
//!
//! [global]
//! restricted_networking_mode = "1"
//! ```
//!
//! Opening a file whose version is older than [`DATABASE_VERSION`] runs
//! every migration step in order. A newer file is left alone apart from the
//! version number. All writes go through a temp file and rename, so a crash
//! never leaves a half-written store behind.
//!
//! Several processes may share one file (the daemon and the CLI). Each
//! read-modify-write cycle holds an exclusive `flock` on a sibling
//! `lineagesettings.toml.lock` file and re-reads the store before editing.

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{Scope, SettingUri, keys};
use crate::constants::{OWNER_USER_ID, SETTINGS_DATABASE_NAME};
use crate::logger::Log;
use crate::utils::round_to_places;

/// Current schema version. Bump together with a new step in `on_upgrade`.
pub const DATABASE_VERSION: u32 = 21;

type Table = BTreeMap<String, String>;

/// Serialized file layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSettings {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    system: Table,
    #[serde(default)]
    secure: Table,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    global: Option<Table>,
}

/// Values loaded into a freshly created store.
///
/// Inserted without overwriting, so user values already present survive.
#[derive(Debug, Clone)]
pub struct DefaultSettings {
    /// Device supports waking and unlocking from the fingerprint sensor.
    pub fingerprint_wake_and_unlock: bool,
    pub system: Vec<(String, String)>,
    pub secure: Vec<(String, String)>,
    pub global: Vec<(String, String)>,
}

impl DefaultSettings {
    /// Stock defaults for a device.
    pub fn builtin(fingerprint_wake_and_unlock: bool) -> Self {
        fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
            entries
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect()
        }

        Self {
            fingerprint_wake_and_unlock,
            system: pairs(&[
                ("force_show_navbar", "0"),
                ("qs_quick_pulldown", "0"),
                ("battery_light_brightness_level", "255"),
                ("battery_light_brightness_level_zen", "255"),
                ("notification_light_brightness_level", "255"),
                ("notification_light_brightness_level_zen", "255"),
                ("system_profiles_enabled", "1"),
                ("notification_light_pulse_custom_enable", "0"),
                ("swap_volume_keys_on_rotation", "0"),
                ("status_bar_battery_style", "0"),
                ("status_bar_clock", "2"),
                ("navigation_bar_menu_arrow_keys", "0"),
            ]),
            secure: pairs(&[
                ("stats_collection", "1"),
                ("lockscreen_visualizer", "1"),
                ("volume_panel_on_left", "0"),
                (keys::BERRY_BLACK_THEME, "0"),
                ("network_traffic_mode", "0"),
                ("network_traffic_autohide", "0"),
                ("network_traffic_units", "1"),
                ("panic_in_power_menu", "0"),
            ]),
            global: pairs(&[(keys::GLOBAL_VPN_APP, "")]),
        }
    }

    /// Defaults with no preloaded values at all.
    pub fn empty(fingerprint_wake_and_unlock: bool) -> Self {
        Self {
            fingerprint_wake_and_unlock,
            system: Vec::new(),
            secure: Vec::new(),
            global: Vec::new(),
        }
    }
}

/// Path of the settings file for `user_id` under `base_dir`.
pub fn db_path_for_user(base_dir: &Path, user_id: u32) -> PathBuf {
    if user_id == OWNER_USER_ID {
        base_dir.join(SETTINGS_DATABASE_NAME)
    } else {
        base_dir
            .join("users")
            .join(user_id.to_string())
            .join(SETTINGS_DATABASE_NAME)
    }
}

/// Format a number the way the store holds SQL reals: always with a decimal point.
fn format_real(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// In-memory tables as they stood before a transaction.
#[derive(Debug, Clone)]
struct Snapshot {
    version: u32,
    system: Table,
    secure: Table,
    global: Option<Table>,
}

/// One user's settings tables.
#[derive(Debug)]
pub struct SettingsDatabase {
    path: PathBuf,
    user_id: u32,
    version: u32,
    fingerprint_wake_and_unlock: bool,
    system: Table,
    secure: Table,
    global: Option<Table>,
}

impl SettingsDatabase {
    /// Open (creating or migrating as needed) the store for `user_id`.
    pub fn open(base_dir: &Path, user_id: u32, defaults: &DefaultSettings) -> Result<Self> {
        Self::open_at_version(base_dir, user_id, defaults, DATABASE_VERSION)
    }

    /// Open the store, bringing it to `target_version`.
    ///
    /// # Arguments
    /// * `base_dir` - Directory holding the owner's file and the `users/` tree
    /// * `user_id` - Whose settings to open
    /// * `defaults` - Values for a new store and device flags used by migrations
    /// * `target_version` - Schema version the store should end at
    pub fn open_at_version(
        base_dir: &Path,
        user_id: u32,
        defaults: &DefaultSettings,
        target_version: u32,
    ) -> Result<Self> {
        let path = db_path_for_user(base_dir, user_id);
        let mut db = Self {
            path,
            user_id,
            version: 0,
            fingerprint_wake_and_unlock: defaults.fingerprint_wake_and_unlock,
            system: Table::new(),
            secure: Table::new(),
            global: None,
        };

        let _lock = db.lock(true)?;
        if !db.path.exists() {
            db.on_create(defaults);
            db.version = target_version;
            db.persist()?;
            return Ok(db);
        }

        db.load_from_disk()?;
        let stored_version = db.version;
        if stored_version < target_version {
            db.on_upgrade(stored_version, target_version);
        } else if stored_version > target_version {
            db.on_downgrade(stored_version, target_version);
        }
        if stored_version != target_version {
            db.version = target_version;
            db.persist()?;
        }
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    fn is_owner(&self) -> bool {
        self.user_id == OWNER_USER_ID
    }

    fn table(&self, scope: Scope) -> Result<&Table> {
        match scope {
            Scope::System => Ok(&self.system),
            Scope::Secure => Ok(&self.secure),
            Scope::Global => self.global.as_ref().with_context(|| {
                format!("Table 'global' does not exist for user {}", self.user_id)
            }),
        }
    }

    fn table_mut(&mut self, scope: Scope) -> Result<&mut Table> {
        let user_id = self.user_id;
        match scope {
            Scope::System => Ok(&mut self.system),
            Scope::Secure => Ok(&mut self.secure),
            Scope::Global => self
                .global
                .as_mut()
                .with_context(|| format!("Table 'global' does not exist for user {}", user_id)),
        }
    }

    /// Whether the given table exists for this user.
    pub fn has_table(&self, scope: Scope) -> bool {
        self.table(scope).is_ok()
    }

    // ═══ Reads ═══

    /// Raw value of a setting, if present.
    pub fn get(&self, scope: Scope, name: &str) -> Result<Option<&str>> {
        Ok(self.table(scope)?.get(name).map(String::as_str))
    }

    /// Read a string, falling back to `default` when unset.
    pub fn read_setting(&self, scope: Scope, name: &str, default: &str) -> Result<String> {
        Ok(self
            .get(scope, name)?
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string()))
    }

    /// Read an integer, falling back to `default` when unset or unparsable.
    pub fn read_int(&self, scope: Scope, name: &str, default: i32) -> Result<i32> {
        Ok(self
            .get(scope, name)?
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default))
    }

    /// Read a long, falling back to `default` when unset or unparsable.
    pub fn read_long(&self, scope: Scope, name: &str, default: i64) -> Result<i64> {
        Ok(self
            .get(scope, name)?
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default))
    }

    /// All settings in a table, sorted by name.
    pub fn entries(&self, scope: Scope) -> Result<Vec<(String, String)>> {
        Ok(self
            .table(scope)?
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect())
    }

    // ═══ Writes (in memory; call `persist` to commit) ═══

    /// Insert or replace a setting.
    pub fn write_setting(&mut self, scope: Scope, name: &str, value: &str) -> Result<()> {
        self.table_mut(scope)?
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Insert a setting only when it isn't already present.
    ///
    /// Returns whether the value was inserted.
    pub fn write_setting_if_not_present(
        &mut self,
        scope: Scope,
        name: &str,
        value: &str,
    ) -> Result<bool> {
        let table = self.table_mut(scope)?;
        if table.contains_key(name) {
            return Ok(false);
        }
        table.insert(name.to_string(), value.to_string());
        Ok(true)
    }

    /// Remove a setting. Returns whether it existed.
    pub fn delete_setting(&mut self, scope: Scope, name: &str) -> Result<bool> {
        Ok(self.table_mut(scope)?.remove(name).is_some())
    }

    /// Copy settings from one table to another, then remove them from the source.
    ///
    /// With `do_ignore`, a value already present in the destination wins;
    /// otherwise the moved value replaces it.
    pub fn move_settings_to_new_table(
        &mut self,
        source: Scope,
        destination: Scope,
        names: &[&str],
        do_ignore: bool,
    ) -> Result<()> {
        // Both tables must exist before anything moves
        self.table(source)?;
        self.table(destination)?;

        for name in names {
            let value = self.table(source)?.get(*name).cloned();
            if let Some(value) = value {
                if do_ignore {
                    self.write_setting_if_not_present(destination, name, &value)?;
                } else {
                    self.write_setting(destination, name, &value)?;
                }
            }
            self.delete_setting(source, name)?;
        }
        Ok(())
    }

    // ═══ Transactions ═══

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: self.version,
            system: self.system.clone(),
            secure: self.secure.clone(),
            global: self.global.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.version = snapshot.version;
        self.system = snapshot.system;
        self.secure = snapshot.secure;
        self.global = snapshot.global;
    }

    /// Path of the advisory lock guarding the store file.
    pub fn lock_path(&self) -> PathBuf {
        self.path.with_extension("toml.lock")
    }

    /// Take the store's advisory lock. Released when the handle drops.
    fn lock(&self, exclusive: bool) -> Result<File> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = File::options()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open {}", lock_path.display()))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.with_context(|| format!("Failed to lock {}", lock_path.display()))?;
        Ok(file)
    }

    /// Run `edit` as one locked read-modify-write cycle and persist it.
    ///
    /// The file is re-read under the lock first, so edits other processes
    /// made since the last load are kept. If any step fails the in-memory
    /// tables are put back exactly as they were before the call.
    ///
    /// # Returns
    /// The edit's result and the settings other processes had changed
    pub fn transact<R>(
        &mut self,
        edit: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<(R, Vec<SettingUri>)> {
        let _lock = self.lock(true)?;
        let before = self.snapshot();
        let result = self.transact_locked(edit);
        if result.is_err() {
            self.restore(before);
        }
        result
    }

    fn transact_locked<R>(
        &mut self,
        edit: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<(R, Vec<SettingUri>)> {
        let external = if self.path.exists() {
            self.reload_unlocked()?
        } else {
            Vec::new()
        };
        let value = edit(self)?;
        self.persist()?;
        Ok((value, external))
    }

    // ═══ Persistence ═══

    /// Write the store to disk atomically.
    pub fn persist(&self) -> Result<()> {
        let parent = self
            .path
            .parent()
            .context("Settings path has no parent directory")?;
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;

        let stored = StoredSettings {
            version: self.version,
            system: self.system.clone(),
            secure: self.secure.clone(),
            global: self.global.clone(),
        };
        let content = toml::to_string(&stored).context("Failed to serialize settings")?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .context("Failed to create temporary settings file")?;
        temp.write_all(content.as_bytes())
            .context("Failed to write temporary settings file")?;
        temp.as_file()
            .sync_all()
            .context("Failed to flush temporary settings file")?;
        temp.persist(&self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn load_from_disk(&mut self) -> Result<()> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let stored: StoredSettings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {}", self.path.display()))?;

        self.version = stored.version;
        self.system = stored.system;
        self.secure = stored.secure;
        self.global = if self.is_owner() {
            Some(stored.global.unwrap_or_default())
        } else {
            if stored.global.is_some() {
                Log::log_warning(&format!(
                    "Ignoring global table in settings for user {}",
                    self.user_id
                ));
            }
            None
        };
        Ok(())
    }

    /// Re-read the file and report every setting whose value changed.
    pub fn reload(&mut self) -> Result<Vec<SettingUri>> {
        let _lock = self.lock(false)?;
        self.reload_unlocked()
    }

    fn reload_unlocked(&mut self) -> Result<Vec<SettingUri>> {
        let before: Vec<(Scope, Table)> = Scope::ALL
            .into_iter()
            .filter_map(|scope| self.table(scope).ok().map(|t| (scope, t.clone())))
            .collect();

        self.load_from_disk()?;

        let mut changed = Vec::new();
        for (scope, old) in before {
            let new = self.table(scope)?;
            for (name, value) in new {
                if old.get(name) != Some(value) {
                    changed.push(SettingUri::new(scope, name.clone()));
                }
            }
            for name in old.keys() {
                if !new.contains_key(name) {
                    changed.push(SettingUri::new(scope, name.clone()));
                }
            }
        }
        changed.sort();
        Ok(changed)
    }

    // ═══ Schema lifecycle ═══

    fn on_create(&mut self, defaults: &DefaultSettings) {
        Log::log_debug(&format!(
            "Creating settings tables for user {} at {}",
            self.user_id,
            self.path.display()
        ));
        self.system = Table::new();
        self.secure = Table::new();
        self.global = self.is_owner().then(Table::new);

        for (name, value) in &defaults.system {
            self.system.entry(name.clone()).or_insert_with(|| value.clone());
        }
        for (name, value) in &defaults.secure {
            self.secure.entry(name.clone()).or_insert_with(|| value.clone());
        }
        if let Some(global) = self.global.as_mut() {
            for (name, value) in &defaults.global {
                global.entry(name.clone()).or_insert_with(|| value.clone());
            }
            global.insert(keys::RESTRICTED_NETWORKING_MODE.to_string(), "1".to_string());
        }
    }

    fn on_upgrade(&mut self, old_version: u32, new_version: u32) {
        Log::log_debug(&format!(
            "Upgrading settings from version {} to {}",
            old_version, new_version
        ));
        let mut upgrade_version = old_version;

        // Versions 2 through 13 changed settings that no longer exist
        if upgrade_version < 13 {
            upgrade_version = 13;
        }

        if upgrade_version < 14 {
            // Button/keyboard brightness moved from 0..255 to 0.0..1.0
            if self.is_owner() {
                for key in [keys::BUTTON_BRIGHTNESS, keys::KEYBOARD_BRIGHTNESS] {
                    let scaled = self
                        .secure
                        .get(key)
                        .and_then(|value| value.trim().parse::<f64>().ok())
                        .map(|value| format_real(round_to_places(value / 255.0, 2)));
                    if let Some(scaled) = scaled {
                        self.secure.insert(key.to_string(), scaled);
                    }
                }
            }
            upgrade_version = 14;
        }

        if upgrade_version < 15 {
            if let Some(global) = self.global.as_mut() {
                global.insert(keys::RESTRICTED_NETWORKING_MODE.to_string(), "1".to_string());
            }
            upgrade_version = 15;
        }

        if upgrade_version < 16 {
            if self.is_owner() {
                self.run_step(16, |db| {
                    db.move_settings_to_new_table(
                        Scope::Secure,
                        Scope::Global,
                        &[keys::TRUST_RESTRICT_USB],
                        true,
                    )
                });
            }
            upgrade_version = 16;
        }

        if upgrade_version < 17 {
            self.run_step(17, |db| {
                db.move_settings_to_new_table(
                    Scope::System,
                    Scope::Secure,
                    &[keys::BERRY_BLACK_THEME],
                    true,
                )
            });
            upgrade_version = 17;
        }

        if upgrade_version < 18 {
            // Old values are inverted relative to the new setting; 2 folds into 1
            let default = if self.fingerprint_wake_and_unlock { 1 } else { 0 };
            let old = self
                .system
                .get(keys::FINGERPRINT_WAKE_UNLOCK)
                .and_then(|value| value.trim().parse::<i32>().ok())
                .unwrap_or(default);
            let migrated = match old {
                0 | 2 => 1,
                1 => 0,
                other => other,
            };
            self.secure.insert(
                keys::SFPS_REQUIRE_SCREEN_ON_TO_AUTH_ENABLED.to_string(),
                migrated.to_string(),
            );
            upgrade_version = 18;
        }

        if upgrade_version < 19 {
            let default = if self.fingerprint_wake_and_unlock { 0 } else { 1 };
            let old = self
                .secure
                .get(keys::SFPS_REQUIRE_SCREEN_ON_TO_AUTH_ENABLED)
                .and_then(|value| value.trim().parse::<i32>().ok())
                .unwrap_or(default);
            let flipped = if old == 1 { 0 } else { 1 };
            self.secure.insert(
                keys::SFPS_PERFORMANT_AUTH_ENABLED.to_string(),
                flipped.to_string(),
            );
            upgrade_version = 19;
        }

        if upgrade_version < 20 {
            if let Some(global) = self.global.as_mut() {
                global.insert(
                    keys::UIDS_ALLOWED_ON_RESTRICTED_NETWORKS.to_string(),
                    String::new(),
                );
            }
            upgrade_version = 20;
        }

        if upgrade_version < 21 {
            let value = self
                .secure
                .get(keys::TETHERING_ALLOW_VPN_UPSTREAMS)
                .and_then(|value| value.trim().parse::<i64>().ok());
            match value {
                Some(0) => {
                    self.secure.remove(keys::TETHERING_ALLOW_VPN_UPSTREAMS);
                }
                Some(value) => {
                    self.secure.insert(
                        keys::TETHERING_ALLOW_VPN_UPSTREAMS.to_string(),
                        value.to_string(),
                    );
                }
                None => {}
            }
            upgrade_version = 21;
        }

        if upgrade_version != new_version {
            Log::log_critical(&format!(
                "Upgrading settings database to version {} left it at {} instead; \
                this is probably a bug. Did you update DATABASE_VERSION?",
                new_version, upgrade_version
            ));
        }
    }

    fn on_downgrade(&mut self, old_version: u32, new_version: u32) {
        Log::log_debug(&format!(
            "Settings version {} is newer than {}, leaving contents untouched",
            old_version, new_version
        ));
    }

    /// Run a migration step, logging failure instead of aborting the upgrade.
    fn run_step<F>(&mut self, step: u32, action: F)
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if let Err(e) = action(self) {
            Log::log_warning(&format!("Settings migration step {} skipped: {}", step, e));
        }
    }
}
