//! The LiveDisplay service.
//!
//! Owns the shared display [`State`], watches the mode setting, tracks
//! twilight and drives the color temperature controller. Clients talk to it
//! through [`LiveDisplayInterface`]; every mutating call is checked against
//! the caller's permissions first.

use anyhow::Result;
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use super::color_temperature::ColorTemperatureController;
use super::flags::{ALL_CHANGED, DISPLAY_CHANGED, MODE_CHANGED, TWILIGHT_CHANGED};
use super::sequencer::{Sequencer, SequencerHandle};
use super::{Capabilities, LiveDisplayConfig, MODE_FIRST, MODE_LAST, Mode, State};
use crate::backend::DisplayHardware;
use crate::clock::Clock;
use crate::config::Config;
use crate::constants::*;
use crate::logger::Log;
use crate::settings::{ListenerId, SettingUri, SettingsChangeListener, SettingsHelper, keys};
use crate::twilight::{TwilightSource, TwilightState};

/// Token for the scheduled twilight recomputation.
pub const TWILIGHT_TOKEN: &str = "twilight";

pub fn mode_uri() -> SettingUri {
    SettingUri::system(keys::DISPLAY_TEMPERATURE_MODE)
}

pub fn sunset_counter_uri() -> SettingUri {
    SettingUri::system(keys::LIVE_DISPLAY_HINTED)
}

/// Returned (inside `anyhow::Error`) when a caller lacks a permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDenied {
    pub caller: String,
    pub permission: String,
}

impl fmt::Display for PermissionDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Permission denial: {} requires {}",
            self.caller, self.permission
        )
    }
}

impl std::error::Error for PermissionDenied {}

/// Identity and granted permissions of whoever is calling the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    name: String,
    permissions: BTreeSet<String>,
}

impl Caller {
    pub fn new(name: impl Into<String>, permissions: &[&str]) -> Self {
        Self {
            name: name.into(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// The daemon itself and its local CLI.
    pub fn system() -> Self {
        Self::new(
            "system",
            &[MANAGE_LIVEDISPLAY_PERMISSION, DUMP_PERMISSION],
        )
    }

    pub fn unprivileged(name: impl Into<String>) -> Self {
        Self::new(name, &[])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn enforce(&self, permission: &str) -> Result<()> {
        if self.has_permission(permission) {
            return Ok(());
        }
        Err(PermissionDenied {
            caller: self.name.clone(),
            permission: permission.to_string(),
        }
        .into())
    }
}

/// Shows the one-time hint about the night light.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn show_hint(&self);
}

/// Prints the hint to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show_hint(&self) {
        Log::log_pipe();
        Log::log_block_start("LiveDisplay");
        Log::log_indented(
            "Reduce blue light at night: try `livedisplay mode auto` to warm the \
             screen after sunset.",
        );
    }
}

/// Client-facing operations.
pub trait LiveDisplayInterface {
    fn config(&self) -> LiveDisplayConfig;

    /// Current mode, or off when modes are unsupported.
    fn mode(&self) -> Mode;

    /// Store a new mode. `Ok(false)` if the mode isn't supported or out of range.
    fn set_mode(&self, caller: &Caller, mode: i32) -> Result<bool>;

    fn day_color_temperature(&self) -> i32;
    fn set_day_color_temperature(&self, caller: &Caller, temperature: i32) -> Result<bool>;

    fn night_color_temperature(&self) -> i32;
    fn set_night_color_temperature(&self, caller: &Caller, temperature: i32) -> Result<bool>;

    /// Last applied Kelvin value, -1 before the first apply.
    fn color_temperature(&self) -> i32;

    fn is_night(&self) -> bool;

    fn dump(&self, caller: &Caller) -> Result<String>;
}

/// Collaborators injected into the service.
pub struct ServiceContext {
    pub hardware: Arc<dyn DisplayHardware>,
    pub settings: Arc<SettingsHelper>,
    pub twilight: Arc<dyn TwilightSource>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Default)]
struct ServiceState {
    state: State,
    awaiting_nudge: bool,
    sunset: bool,
}

pub struct LiveDisplayService {
    settings: Arc<SettingsHelper>,
    twilight: Arc<dyn TwilightSource>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,

    sequencer: Mutex<Sequencer>,
    handle: SequencerHandle,
    controller: Arc<ColorTemperatureController>,
    config: LiveDisplayConfig,

    state: Mutex<ServiceState>,
    mode_listener: Mutex<Option<ListenerId>>,
    this: Weak<Self>,
}

/// Forwards mode setting changes to the service.
struct ModeObserver {
    service: Weak<LiveDisplayService>,
}

impl SettingsChangeListener for ModeObserver {
    fn on_settings_changed(&self, _uri: Option<&SettingUri>) {
        if let Some(service) = self.service.upgrade() {
            service.on_mode_setting_changed();
        }
    }
}

impl LiveDisplayService {
    pub fn new(context: ServiceContext, config: &Config) -> Result<Arc<Self>> {
        let sequencer = Sequencer::new("livedisplay")?;
        let handle = sequencer.handle();

        let controller = ColorTemperatureController::new(
            context.hardware,
            Arc::clone(&context.settings),
            Arc::clone(&context.clock),
            handle.clone(),
            config,
        );

        let mut capabilities = Capabilities::new();
        if !controller.capabilities(&mut capabilities) {
            Log::log_warning("Display hardware offers no color temperature control");
        }

        let live_config = LiveDisplayConfig {
            capabilities,
            default_mode: config.default_mode.unwrap_or(DEFAULT_MODE),
            default_day_temperature: controller.default_day_temperature(),
            default_night_temperature: controller.default_night_temperature(),
            color_temperature_range: controller.color_temperature_range(),
            color_balance_range: controller.color_balance_range(),
        };

        Ok(Arc::new_cyclic(|this| Self {
            settings: context.settings,
            twilight: context.twilight,
            clock: context.clock,
            notifier: context.notifier,
            sequencer: Mutex::new(sequencer),
            handle,
            controller,
            config: live_config,
            state: Mutex::new(ServiceState {
                awaiting_nudge: true,
                ..ServiceState::default()
            }),
            mode_listener: Mutex::new(None),
            this: this.clone(),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read the initial state, start watching and apply the first update.
    pub fn start(&self, screen_on: bool, low_power_mode: bool) {
        let awaiting_nudge = self.sunset_counter() < 1;
        let twilight = self.current_twilight();
        {
            let mut state = self.lock();
            state.awaiting_nudge = awaiting_nudge;
            state.state.screen_on = screen_on;
            state.state.low_power_mode = low_power_mode;
            state.state.twilight = twilight;
        }

        if self.config.has_mode_support() {
            let observer = Arc::new(ModeObserver {
                service: self.this.clone(),
            });
            let id = self.settings.start_watching(observer, &[mode_uri()]);
            *self
                .mode_listener
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(id);
            let mode = self.mode_setting();
            self.lock().state.mode = mode;
        }

        self.controller.start();
        self.update_features(ALL_CHANGED);
        self.schedule_twilight_refresh(twilight);

        Log::log_decorated(&format!("LiveDisplay started: {}", self.state()));
    }

    /// Stop watching settings and the sequencer thread.
    pub fn shutdown(&self) {
        let id = self
            .mode_listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(id) = id {
            self.settings.stop_watching(id);
        }
        self.controller.stop();
        self.sequencer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .shutdown();
    }

    fn update_features(&self, flags: u32) {
        let this = self.this.clone();
        self.handle.post(move || {
            if let Some(service) = this.upgrade() {
                let state = service.lock().state;
                service.controller.update(flags, &state);
            }
        });
    }

    // ═══ Inputs ═══

    pub fn set_screen_on(&self, screen_on: bool) {
        let changed = {
            let mut state = self.lock();
            let changed = state.state.screen_on != screen_on;
            state.state.screen_on = screen_on;
            changed
        };
        if changed {
            self.update_features(DISPLAY_CHANGED);
        }
    }

    pub fn set_low_power_mode(&self, low_power_mode: bool) {
        let changed = {
            let mut state = self.lock();
            let changed = state.state.low_power_mode != low_power_mode;
            state.state.low_power_mode = low_power_mode;
            changed
        };
        if changed {
            self.update_features(MODE_CHANGED);
        }
    }

    /// Re-read the settings file and deliver changes made by other processes.
    pub fn reload_settings(&self) -> Result<usize> {
        self.settings.reload()
    }

    fn on_mode_setting_changed(&self) {
        let this = self.this.clone();
        self.handle.post(move || {
            let Some(service) = this.upgrade() else {
                return;
            };
            let mode = service.mode_setting();
            let changed = {
                let mut state = service.lock();
                let changed = state.state.mode != mode;
                state.state.mode = mode;
                changed
            };
            if changed {
                service.update_features(MODE_CHANGED);
            }
        });
    }

    fn mode_setting(&self) -> Option<Mode> {
        Mode::from_i32(
            self.settings
                .get_int(&mode_uri(), self.config.default_mode.as_i32()),
        )
    }

    // ═══ Twilight ═══

    fn current_twilight(&self) -> Option<TwilightState> {
        let twilight = self.twilight.compute(self.clock.now_millis());
        (twilight != TwilightState::unknown()).then_some(twilight)
    }

    fn schedule_twilight_refresh(&self, twilight: Option<TwilightState>) {
        let delay_ms = twilight.map_or(TWILIGHT_MAX_REFRESH_MS, |t| {
            t.refresh_delay_ms(self.clock.now_millis())
        });
        let this = self.this.clone();
        self.handle.remove_callbacks(TWILIGHT_TOKEN);
        self.handle.post_delayed(
            TWILIGHT_TOKEN,
            Duration::from_millis(delay_ms.max(0) as u64),
            move || {
                if let Some(service) = this.upgrade() {
                    service.refresh_twilight();
                }
            },
        );
    }

    /// Recompute twilight, publish it and consider showing the hint.
    pub fn refresh_twilight(&self) {
        let twilight = self.current_twilight();
        self.lock().state.twilight = twilight;
        Log::log_debug(&format!(
            "Twilight updated: {}",
            twilight.map_or_else(|| "NULL".to_string(), |t| t.to_string())
        ));

        self.update_features(TWILIGHT_CHANGED);
        self.nudge();
        self.schedule_twilight_refresh(twilight);
    }

    // ═══ Nudge ═══

    fn sunset_counter(&self) -> i32 {
        self.settings
            .get_int(&sunset_counter_uri(), DEFAULT_SUNSET_COUNTER)
    }

    fn update_sunset_counter(&self, count: i32) {
        if let Err(e) = self.settings.put_int(&sunset_counter_uri(), count) {
            Log::log_error(&format!("Failed to store sunset counter: {}", e));
        }
        self.lock().awaiting_nudge = count < 1;
    }

    fn stop_nudging(&self) {
        if self.lock().awaiting_nudge {
            self.update_sunset_counter(1);
        }
    }

    /// Count day to night edges and show the hint once on the third unused one.
    fn nudge(&self) {
        let transition = {
            let mut state = self.lock();
            let Some(twilight) = state.state.twilight else {
                return;
            };
            if !state.awaiting_nudge {
                return;
            }
            let transition = twilight.is_night && !state.sunset;
            state.sunset = twilight.is_night;
            transition
        };
        if !transition {
            return;
        }

        let mut counter = self.sunset_counter();
        if counter <= 0 {
            counter += 1;
            self.update_sunset_counter(counter);
        }
        if counter == 0 {
            self.notifier.show_hint();
            self.update_sunset_counter(1);
        }
    }

    // ═══ Introspection ═══

    pub fn state(&self) -> State {
        self.lock().state
    }

    pub fn awaiting_nudge(&self) -> bool {
        self.lock().awaiting_nudge
    }

    pub fn controller(&self) -> &Arc<ColorTemperatureController> {
        &self.controller
    }

    pub fn sequencer(&self) -> SequencerHandle {
        self.handle.clone()
    }

    /// Wait until every queued update has been applied.
    pub fn flush(&self) {
        self.handle.flush();
    }
}

impl LiveDisplayInterface for LiveDisplayService {
    fn config(&self) -> LiveDisplayConfig {
        self.config.clone()
    }

    fn mode(&self) -> Mode {
        if self.config.has_mode_support() {
            self.mode_setting().unwrap_or(self.config.default_mode)
        } else {
            Mode::Off
        }
    }

    fn set_mode(&self, caller: &Caller, mode: i32) -> Result<bool> {
        caller.enforce(MANAGE_LIVEDISPLAY_PERMISSION)?;
        if !self.config.has_mode_support() {
            return Ok(false);
        }
        let in_range = (MODE_FIRST.as_i32()..=MODE_LAST.as_i32()).contains(&mode);
        if !self.config.has_feature(mode) || !in_range {
            return Ok(false);
        }
        self.settings.put_int(&mode_uri(), mode)?;
        if mode != self.config.default_mode.as_i32() {
            self.stop_nudging();
        }
        Ok(true)
    }

    fn day_color_temperature(&self) -> i32 {
        self.controller.day_color_temperature()
    }

    fn set_day_color_temperature(&self, caller: &Caller, temperature: i32) -> Result<bool> {
        caller.enforce(MANAGE_LIVEDISPLAY_PERMISSION)?;
        self.controller.set_day_color_temperature(temperature)
    }

    fn night_color_temperature(&self) -> i32 {
        self.controller.night_color_temperature()
    }

    fn set_night_color_temperature(&self, caller: &Caller, temperature: i32) -> Result<bool> {
        caller.enforce(MANAGE_LIVEDISPLAY_PERMISSION)?;
        self.controller.set_night_color_temperature(temperature)
    }

    fn color_temperature(&self) -> i32 {
        self.controller.color_temperature()
    }

    fn is_night(&self) -> bool {
        self.lock().state.twilight.is_some_and(|t| t.is_night)
    }

    fn dump(&self, caller: &Caller) -> Result<String> {
        caller.enforce(DUMP_PERMISSION)?;
        let (state, awaiting_nudge) = {
            let state = self.lock();
            (state.state, state.awaiting_nudge)
        };
        let mut out = String::new();
        let _ = writeln!(out);
        let _ = writeln!(out, "LiveDisplay Service State:");
        let _ = writeln!(out, "  state={}", state);
        let _ = writeln!(out, "  config={}", self.config);
        let _ = writeln!(out, "  awaitingNudge={}", awaiting_nudge);
        let _ = writeln!(out, "  twilightSource={}", self.twilight.describe());
        if self.controller.is_enabled() {
            out.push_str(&self.controller.dump());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryHardware;
    use crate::clock::ManualClock;
    use crate::settings::{DefaultSettings, SettingsDatabase};
    use tempfile::TempDir;

    const HOUR: i64 = 60 * 60 * 1000;
    const SUNSET: i64 = 1_000 * HOUR;

    struct SwitchableTwilight(Mutex<TwilightState>);

    impl SwitchableTwilight {
        fn set_night(&self, is_night: bool) {
            self.0.lock().unwrap().is_night = is_night;
        }
    }

    impl TwilightSource for SwitchableTwilight {
        fn compute(&self, _now_ms: i64) -> TwilightState {
            *self.0.lock().unwrap()
        }

        fn describe(&self) -> String {
            "switchable".to_string()
        }
    }

    struct Fixture {
        _dir: TempDir,
        settings: Arc<SettingsHelper>,
        twilight: Arc<SwitchableTwilight>,
        service: Arc<LiveDisplayService>,
    }

    fn fixture(notifier: MockNotifier, hardware: MemoryHardware) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = SettingsDatabase::open(dir.path(), 0, &DefaultSettings::empty(true)).unwrap();
        let settings = Arc::new(SettingsHelper::new(db));
        let twilight = Arc::new(SwitchableTwilight(Mutex::new(TwilightState::new(
            SUNSET - 24 * HOUR,
            SUNSET - 12 * HOUR,
            SUNSET,
            SUNSET + 12 * HOUR,
            false,
        ))));
        let service = LiveDisplayService::new(
            ServiceContext {
                hardware: Arc::new(hardware),
                settings: settings.clone(),
                twilight: twilight.clone(),
                clock: Arc::new(ManualClock::new(SUNSET - 6 * HOUR)),
                notifier: Arc::new(notifier),
            },
            &Config::default(),
        )
        .unwrap();
        Fixture {
            _dir: dir,
            settings,
            twilight,
            service,
        }
    }

    fn silent() -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier.expect_show_hint().never();
        notifier
    }

    #[test]
    fn test_config_reflects_controller() {
        let fx = fixture(silent(), MemoryHardware::color_balance(-50..=50));
        let config = fx.service.config();
        assert!(config.has_mode_support());
        assert!(config.has_feature(Mode::Auto.as_i32()));
        assert!(config.has_feature(crate::display::FEATURE_COLOR_BALANCE as i32));
        assert!(!config.has_feature(Mode::Outdoor.as_i32()));
        assert_eq!(config.color_balance_range, -50..=50);
        assert_eq!(config.default_mode, Mode::Off);
    }

    #[test]
    fn test_no_mode_support_without_color_hardware() {
        let fx = fixture(silent(), MemoryHardware::unsupported());
        fx.service.start(true, false);
        assert!(!fx.service.config().has_mode_support());
        assert_eq!(fx.service.mode(), Mode::Off);
        assert!(!fx.service.set_mode(&Caller::system(), Mode::Night.as_i32()).unwrap());
        fx.service.shutdown();
    }

    #[test]
    fn test_set_mode_validates_and_stores() {
        let fx = fixture(silent(), MemoryHardware::rgb());
        fx.service.start(true, false);
        let caller = Caller::system();

        assert!(!fx.service.set_mode(&caller, Mode::Outdoor.as_i32()).unwrap());
        assert!(!fx.service.set_mode(&caller, 7).unwrap());
        assert!(!fx.service.set_mode(&caller, -1).unwrap());
        assert!(fx.service.set_mode(&caller, Mode::Night.as_i32()).unwrap());
        assert_eq!(fx.service.mode(), Mode::Night);
        assert_eq!(fx.settings.get_int(&mode_uri(), -1), 1);
        fx.service.shutdown();
    }

    #[test]
    fn test_mutations_require_permission() {
        let fx = fixture(silent(), MemoryHardware::rgb());
        let caller = Caller::unprivileged("app");

        let err = fx.service.set_mode(&caller, Mode::Night.as_i32()).unwrap_err();
        let denied = err.downcast_ref::<PermissionDenied>().unwrap();
        assert_eq!(denied.permission, MANAGE_LIVEDISPLAY_PERMISSION);

        assert!(fx.service.set_day_color_temperature(&caller, 6000).is_err());
        assert!(fx.service.set_night_color_temperature(&caller, 4000).is_err());
        assert!(fx.service.dump(&caller).is_err());
        assert_eq!(fx.service.day_color_temperature(), DEFAULT_DAY_TEMP);

        let dumper = Caller::new("adb", &[DUMP_PERMISSION]);
        assert!(fx.service.dump(&dumper).unwrap().contains("LiveDisplay Service State:"));
    }

    #[test]
    fn test_mode_change_applies_temperature() {
        let fx = fixture(silent(), MemoryHardware::rgb());
        fx.service.start(true, false);
        fx.service.flush();
        assert_eq!(fx.service.color_temperature(), DEFAULT_DAY_TEMP);

        fx.service
            .set_mode(&Caller::system(), Mode::Night.as_i32())
            .unwrap();
        // observer job, then the update it posts
        fx.service.flush();
        fx.service.flush();

        assert_eq!(fx.service.state().mode, Some(Mode::Night));
        assert_eq!(fx.service.color_temperature(), DEFAULT_NIGHT_TEMP);
        fx.service.shutdown();
    }

    #[test]
    fn test_screen_off_then_on_reapplies() {
        let fx = fixture(silent(), MemoryHardware::rgb());
        fx.service.start(false, false);
        fx.service.flush();
        assert_eq!(fx.service.color_temperature(), -1);

        fx.service.set_screen_on(true);
        fx.service.flush();
        assert_eq!(fx.service.color_temperature(), DEFAULT_DAY_TEMP);
        fx.service.shutdown();
    }

    #[test]
    fn test_hint_shown_once_on_third_sunset() {
        let mut notifier = MockNotifier::new();
        notifier.expect_show_hint().times(1).return_const(());
        let fx = fixture(notifier, MemoryHardware::rgb());
        fx.service.start(true, false);
        assert!(fx.service.awaiting_nudge());

        let counter = || fx.settings.get_int(&sunset_counter_uri(), DEFAULT_SUNSET_COUNTER);
        for expected in [-2, -1] {
            fx.twilight.set_night(true);
            fx.service.refresh_twilight();
            // staying night is not a new edge
            fx.service.refresh_twilight();
            assert_eq!(counter(), expected);
            fx.twilight.set_night(false);
            fx.service.refresh_twilight();
        }

        fx.twilight.set_night(true);
        fx.service.refresh_twilight();
        assert_eq!(counter(), 1);
        assert!(!fx.service.awaiting_nudge());

        fx.twilight.set_night(false);
        fx.service.refresh_twilight();
        fx.twilight.set_night(true);
        fx.service.refresh_twilight();
        assert_eq!(counter(), 1);
        fx.service.shutdown();
    }

    #[test]
    fn test_choosing_a_mode_stops_the_nudge() {
        let fx = fixture(silent(), MemoryHardware::rgb());
        fx.service.start(true, false);
        fx.service
            .set_mode(&Caller::system(), Mode::Auto.as_i32())
            .unwrap();
        assert!(!fx.service.awaiting_nudge());
        assert_eq!(fx.settings.get_int(&sunset_counter_uri(), 0), 1);

        fx.twilight.set_night(true);
        fx.service.refresh_twilight();
        assert_eq!(fx.settings.get_int(&sunset_counter_uri(), 0), 1);
        fx.service.shutdown();
    }

    #[test]
    fn test_default_mode_does_not_stop_the_nudge() {
        let fx = fixture(silent(), MemoryHardware::rgb());
        fx.service.start(true, false);
        fx.service
            .set_mode(&Caller::system(), Mode::Off.as_i32())
            .unwrap();
        assert!(fx.service.awaiting_nudge());
        fx.service.shutdown();
    }

    #[test]
    fn test_is_night_and_twilight_schedule() {
        let fx = fixture(silent(), MemoryHardware::rgb());
        fx.service.start(true, false);
        assert!(!fx.service.is_night());
        assert!(fx.service.sequencer().has_callbacks(TWILIGHT_TOKEN));

        fx.twilight.set_night(true);
        fx.service.refresh_twilight();
        assert!(fx.service.is_night());
        fx.service.shutdown();
        assert!(!fx.service.sequencer().has_callbacks(TWILIGHT_TOKEN));
    }

    #[test]
    fn test_dump_includes_controller() {
        let fx = fixture(silent(), MemoryHardware::rgb());
        fx.service.start(true, false);
        fx.service.flush();
        let dump = fx.service.dump(&Caller::system()).unwrap();
        assert!(dump.contains("awaitingNudge=true"));
        assert!(dump.contains("ColorTemperatureController State:"));
        assert!(dump.contains("twilightSource=switchable"));
        fx.service.shutdown();
    }
}
