//! Change notification for settings, keyed by URI.
//!
//! Registering for a URI that nobody watched before fires one immediate
//! `on_settings_changed(None)` so the listener can load its initial values.
//! Later changes are delivered with the URI that changed. Listeners are
//! always invoked with the registry lock released, so a callback may freely
//! read or write settings.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::SettingUri;

/// Something that reacts to settings changes.
pub trait SettingsChangeListener: Send + Sync {
    /// `None` means "reload everything you care about".
    fn on_settings_changed(&self, uri: Option<&SettingUri>);
}

/// Handle returned by [`Observatory::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Registration {
    listener: Arc<dyn SettingsChangeListener>,
    uris: BTreeSet<SettingUri>,
}

#[derive(Default)]
struct Registry {
    triggers: HashMap<ListenerId, Registration>,
    refs: HashMap<SettingUri, usize>,
}

/// Aggregates all settings listeners behind one entry point.
#[derive(Default)]
pub struct Observatory {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl Observatory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // A panicking listener never runs under this lock, so a poisoned
        // registry is still consistent
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start delivering changes for `uris` to `listener`.
    pub fn register(
        &self,
        listener: Arc<dyn SettingsChangeListener>,
        uris: &[SettingUri],
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut initial_loads = 0;
        {
            let mut registry = self.lock();
            let mut watched = BTreeSet::new();
            for uri in uris {
                if !watched.insert(uri.clone()) {
                    continue;
                }
                let count = registry.refs.entry(uri.clone()).or_insert(0);
                if *count == 0 {
                    initial_loads += 1;
                }
                *count += 1;
            }
            registry.triggers.insert(
                id,
                Registration {
                    listener: Arc::clone(&listener),
                    uris: watched,
                },
            );
        }

        for _ in 0..initial_loads {
            listener.on_settings_changed(None);
        }
        id
    }

    /// Stop delivering changes to a listener. Unknown ids are ignored.
    pub fn unregister(&self, id: ListenerId) {
        let mut registry = self.lock();
        if let Some(registration) = registry.triggers.remove(&id) {
            for uri in registration.uris {
                if let Some(count) = registry.refs.get_mut(&uri) {
                    *count -= 1;
                    if *count == 0 {
                        registry.refs.remove(&uri);
                    }
                }
            }
        }
    }

    /// Deliver a change to every listener watching `uri`.
    pub fn notify_change(&self, uri: &SettingUri) {
        let listeners: Vec<Arc<dyn SettingsChangeListener>> = {
            let registry = self.lock();
            let mut ids: Vec<&ListenerId> = registry
                .triggers
                .iter()
                .filter(|(_, registration)| registration.uris.contains(uri))
                .map(|(id, _)| id)
                .collect();
            ids.sort();
            ids.into_iter()
                .filter_map(|id| registry.triggers.get(id))
                .map(|registration| Arc::clone(&registration.listener))
                .collect()
        };

        for listener in listeners {
            listener.on_settings_changed(Some(uri));
        }
    }

    /// Whether anyone is watching `uri`.
    pub fn is_observed(&self, uri: &SettingUri) -> bool {
        self.lock().refs.contains_key(uri)
    }

    pub fn listener_count(&self) -> usize {
        self.lock().triggers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Option<SettingUri>>>,
    }

    impl SettingsChangeListener for Recorder {
        fn on_settings_changed(&self, uri: Option<&SettingUri>) {
            self.calls.lock().unwrap().push(uri.cloned());
        }
    }

    impl Recorder {
        fn calls(&self) -> Vec<Option<SettingUri>> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn day() -> SettingUri {
        SettingUri::system("display_temperature_day")
    }

    fn night() -> SettingUri {
        SettingUri::system("display_temperature_night")
    }

    #[test]
    fn test_register_fires_initial_load_per_new_uri() {
        let observatory = Observatory::new();
        let recorder = Arc::new(Recorder::default());
        observatory.register(recorder.clone(), &[day(), night()]);
        assert_eq!(recorder.calls(), vec![None, None]);
    }

    #[test]
    fn test_second_listener_on_same_uri_gets_no_initial_load() {
        let observatory = Observatory::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        observatory.register(first.clone(), &[day()]);
        observatory.register(second.clone(), &[day()]);
        assert_eq!(first.calls().len(), 1);
        assert!(second.calls().is_empty());
    }

    #[test]
    fn test_notify_reaches_only_matching_listeners() {
        let observatory = Observatory::new();
        let day_listener = Arc::new(Recorder::default());
        let night_listener = Arc::new(Recorder::default());
        observatory.register(day_listener.clone(), &[day()]);
        observatory.register(night_listener.clone(), &[night()]);

        observatory.notify_change(&day());

        assert_eq!(day_listener.calls(), vec![None, Some(day())]);
        assert_eq!(night_listener.calls(), vec![None]);
    }

    #[test]
    fn test_unregister_drops_refs_and_stops_delivery() {
        let observatory = Observatory::new();
        let recorder = Arc::new(Recorder::default());
        let id = observatory.register(recorder.clone(), &[day()]);
        assert!(observatory.is_observed(&day()));

        observatory.unregister(id);
        observatory.notify_change(&day());

        assert!(!observatory.is_observed(&day()));
        assert_eq!(observatory.listener_count(), 0);
        assert_eq!(recorder.calls(), vec![None]);
    }

    #[test]
    fn test_listener_may_reenter_registry() {
        struct Reentrant {
            observatory: Arc<Observatory>,
            seen: Mutex<usize>,
        }
        impl SettingsChangeListener for Reentrant {
            fn on_settings_changed(&self, _uri: Option<&SettingUri>) {
                // Would deadlock if called with the registry lock held
                let _ = self.observatory.is_observed(&day());
                *self.seen.lock().unwrap() += 1;
            }
        }

        let observatory = Arc::new(Observatory::new());
        let listener = Arc::new(Reentrant {
            observatory: observatory.clone(),
            seen: Mutex::new(0),
        });
        observatory.register(listener.clone(), &[day()]);
        observatory.notify_change(&day());
        assert_eq!(*listener.seen.lock().unwrap(), 2);
    }
}
