//! Typed, URI-routed settings access.
//!
//! [`SettingsHelper`] is the only way the rest of the daemon touches the
//! store. Reads never fail: a missing table, a missing row or a malformed
//! value all resolve to the caller's default. Writes persist to disk first
//! and then notify watchers of that URI. A write that fails leaves the
//! store as it was and notifies nobody.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use super::database::SettingsDatabase;
use super::observer::{ListenerId, Observatory, SettingsChangeListener};
use super::{Scope, SettingUri};
use crate::logger::Log;

pub struct SettingsHelper {
    database: Mutex<SettingsDatabase>,
    observatory: Observatory,
}

impl SettingsHelper {
    pub fn new(database: SettingsDatabase) -> Self {
        Self {
            database: Mutex::new(database),
            observatory: Observatory::new(),
        }
    }

    fn db(&self) -> MutexGuard<'_, SettingsDatabase> {
        self.database
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn path(&self) -> PathBuf {
        self.db().path().to_path_buf()
    }

    // ═══ Reads ═══

    pub fn get_string(&self, uri: &SettingUri) -> Option<String> {
        match self.db().get(uri.scope, &uri.name) {
            Ok(value) => value.map(str::to_string),
            Err(e) => {
                Log::log_debug(&format!("Read of {} failed: {}", uri, e));
                None
            }
        }
    }

    pub fn get_int(&self, uri: &SettingUri, default: i32) -> i32 {
        self.db()
            .read_int(uri.scope, &uri.name, default)
            .unwrap_or(default)
    }

    /// True only when the stored integer is exactly 1.
    pub fn get_boolean(&self, uri: &SettingUri, default: bool) -> bool {
        self.get_int(uri, if default { 1 } else { 0 }) == 1
    }

    /// Every setting in a table, sorted by name. Empty if the table doesn't exist.
    pub fn entries(&self, scope: Scope) -> Vec<(String, String)> {
        self.db().entries(scope).unwrap_or_default()
    }

    // ═══ Writes ═══

    pub fn put_string(&self, uri: &SettingUri, value: &str) -> Result<()> {
        let ((), external) = self
            .db()
            .transact(|db| db.write_setting(uri.scope, &uri.name, value))?;
        Log::log_debug(&format!("{} = {}", uri, value));
        self.notify_external(&external, uri);
        self.observatory.notify_change(uri);
        Ok(())
    }

    pub fn put_int(&self, uri: &SettingUri, value: i32) -> Result<()> {
        self.put_string(uri, &value.to_string())
    }

    pub fn put_boolean(&self, uri: &SettingUri, value: bool) -> Result<()> {
        self.put_int(uri, if value { 1 } else { 0 })
    }

    /// Remove a setting. Watchers are notified only if something was removed.
    pub fn delete(&self, uri: &SettingUri) -> Result<bool> {
        let (removed, external) = self
            .db()
            .transact(|db| db.delete_setting(uri.scope, &uri.name))?;
        self.notify_external(&external, uri);
        if removed {
            self.observatory.notify_change(uri);
        }
        Ok(removed)
    }

    /// Deliver changes another process made that a write picked up.
    fn notify_external(&self, external: &[SettingUri], written: &SettingUri) {
        for changed in external.iter().filter(|changed| *changed != written) {
            self.observatory.notify_change(changed);
        }
    }

    // ═══ Watching ═══

    pub fn start_watching(
        &self,
        listener: Arc<dyn SettingsChangeListener>,
        uris: &[SettingUri],
    ) -> ListenerId {
        self.observatory.register(listener, uris)
    }

    pub fn stop_watching(&self, id: ListenerId) {
        self.observatory.unregister(id);
    }

    /// Pick up edits made to the file by another process.
    ///
    /// # Returns
    /// Number of settings that changed
    pub fn reload(&self) -> Result<usize> {
        let changed = self.db().reload()?;
        for uri in &changed {
            self.observatory.notify_change(uri);
        }
        Ok(changed.len())
    }
}
