//! Color temperature controller.
//!
//! Picks a Kelvin value from the current mode and twilight and pushes it to
//! the hardware, either as RGB gains or as an animated color balance. While
//! automatic mode is between its day and night values it re-evaluates every
//! 30 seconds.

use anyhow::Result;
use std::fmt::Write as _;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use super::animator::BalanceAnimation;
use super::flags::{DISPLAY_CHANGED, MODE_CHANGED, TWILIGHT_CHANGED};
use super::sequencer::SequencerHandle;
use super::{Capabilities, FEATURE_COLOR_ADJUSTMENT, FEATURE_COLOR_BALANCE, Mode, State};
use crate::backend::DisplayHardware;
use crate::blend;
use crate::clock::Clock;
use crate::color;
use crate::config::Config;
use crate::constants::*;
use crate::logger::Log;
use crate::settings::{ListenerId, SettingUri, SettingsChangeListener, SettingsHelper, keys};
use crate::utils::{PowerCurve, lerp, round_half_up};

/// Token for the chain of balance animation frames.
pub const ANIMATION_TOKEN: &str = "animation";
/// Token for the delayed re-evaluation while transitioning.
pub const TRANSITION_TOKEN: &str = "transition";

pub fn day_temperature_uri() -> SettingUri {
    SettingUri::system(keys::DISPLAY_TEMPERATURE_DAY)
}

pub fn night_temperature_uri() -> SettingUri {
    SettingUri::system(keys::DISPLAY_TEMPERATURE_NIGHT)
}

#[derive(Debug)]
struct ControllerState {
    /// Last applied Kelvin value, -1 before the first apply.
    color_temperature: i32,
    day_temperature: i32,
    night_temperature: i32,
    /// Twilight weight behind the last automatic apply, 1.0 outside auto.
    blend_factor: f32,
    display: State,
    animation_generation: u64,
}

pub struct ColorTemperatureController {
    hardware: Arc<dyn DisplayHardware>,
    settings: Arc<SettingsHelper>,
    clock: Arc<dyn Clock>,
    sequencer: SequencerHandle,

    use_temperature_adjustment: bool,
    use_color_balance: bool,
    color_balance_range: RangeInclusive<i32>,
    color_temperature_range: RangeInclusive<i32>,
    color_balance_curve: PowerCurve,
    default_day_temperature: i32,
    default_night_temperature: i32,

    state: Mutex<ControllerState>,
    listener: Mutex<Option<ListenerId>>,
    this: Weak<Self>,
}

impl ColorTemperatureController {
    pub fn new(
        hardware: Arc<dyn DisplayHardware>,
        settings: Arc<SettingsHelper>,
        clock: Arc<dyn Clock>,
        sequencer: SequencerHandle,
        config: &Config,
    ) -> Arc<Self> {
        let night_display_available = config
            .night_display_available
            .unwrap_or(DEFAULT_NIGHT_DISPLAY_AVAILABLE);
        let use_color_balance = hardware.supports_color_balance();
        let color_balance_range = hardware.color_balance_range();
        let use_temperature_adjustment = !night_display_available
            && (use_color_balance || hardware.has_color_adjustment());

        let default_day_temperature = config.day_temp.unwrap_or(DEFAULT_DAY_TEMP);
        let default_night_temperature = config.night_temp.unwrap_or(DEFAULT_NIGHT_TEMP);
        let min_temp = config.min_temp.unwrap_or(DEFAULT_MIN_TEMP);
        let max_temp = config.max_temp.unwrap_or(DEFAULT_MAX_TEMP);

        let color_balance_curve = PowerCurve::fit(
            min_temp as f64,
            default_day_temperature as f64,
            max_temp as f64,
        );

        Arc::new_cyclic(|this| Self {
            hardware,
            settings,
            clock,
            sequencer,
            use_temperature_adjustment,
            use_color_balance,
            color_balance_range,
            color_temperature_range: min_temp..=max_temp,
            color_balance_curve,
            default_day_temperature,
            default_night_temperature,
            state: Mutex::new(ControllerState {
                color_temperature: -1,
                day_temperature: default_day_temperature,
                night_temperature: default_night_temperature,
                blend_factor: 1.0,
                display: State::default(),
                animation_generation: 0,
            }),
            listener: Mutex::new(None),
            this: this.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add this controller's modes and features to `caps`.
    ///
    /// # Returns
    /// `false` if the controller has nothing to offer on this hardware
    pub fn capabilities(&self, caps: &mut Capabilities) -> bool {
        if self.use_temperature_adjustment {
            caps.set_mode(Mode::Auto);
            caps.set_mode(Mode::Day);
            caps.set_mode(Mode::Night);
            if self.use_color_balance {
                caps.set(FEATURE_COLOR_BALANCE);
            } else {
                caps.set(FEATURE_COLOR_ADJUSTMENT);
            }
        }
        self.use_temperature_adjustment
    }

    /// Load the user's temperatures and start watching them.
    pub fn start(&self) {
        if !self.use_temperature_adjustment {
            return;
        }

        let day = self.day_color_temperature();
        let night = self.night_color_temperature();
        {
            let mut state = self.lock();
            state.day_temperature = day;
            state.night_temperature = night;
        }

        let Some(this) = self.this.upgrade() else {
            return;
        };
        let id = self.settings.start_watching(
            this,
            &[day_temperature_uri(), night_temperature_uri()],
        );
        *self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(id);
    }

    /// Stop watching settings and drop any scheduled work.
    pub fn stop(&self) {
        let id = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(id) = id {
            self.settings.stop_watching(id);
        }
        self.sequencer.remove_callbacks(ANIMATION_TOKEN);
        self.sequencer.remove_callbacks(TRANSITION_TOKEN);
    }

    /// React to a change of the shared display state.
    pub fn update(&self, flags: u32, state: &State) {
        self.lock().display = *state;

        if flags & DISPLAY_CHANGED != 0 {
            self.on_screen_state_changed();
        } else if flags & MODE_CHANGED != 0
            || (flags & TWILIGHT_CHANGED != 0 && state.twilight.is_some())
        {
            self.update_color_temperature();
        }
    }

    fn on_screen_state_changed(&self) {
        let screen_on = self.lock().display.screen_on;
        if self.sequencer.has_callbacks(ANIMATION_TOKEN) && !screen_on {
            self.sequencer.remove_callbacks(ANIMATION_TOKEN);
        } else {
            self.update_color_temperature();
        }
    }

    /// Auto mode with the twilight weight strictly inside `(0, 1)`.
    ///
    /// Decided on the weight, not the applied Kelvin: just past sunrise the
    /// blend still truncates to the night value while the weight is moving.
    fn is_transitioning(state: &ControllerState) -> bool {
        state.display.mode == Some(Mode::Auto)
            && state.blend_factor > 0.0
            && state.blend_factor < 1.0
    }

    pub fn is_transitioning_now(&self) -> bool {
        Self::is_transitioning(&self.lock())
    }

    fn update_color_temperature(&self) {
        let mut state = self.lock();
        if !self.use_temperature_adjustment || !state.display.screen_on {
            return;
        }

        let mode = state.display.mode;
        state.blend_factor = match mode {
            Some(Mode::Auto) => self.twilight_factor(&state),
            _ => 1.0,
        };
        let temperature = match mode {
            Some(Mode::Off) => self.default_day_temperature,
            Some(Mode::Night) => state.night_temperature,
            Some(Mode::Auto) => blend::blend_temperature(
                state.day_temperature,
                state.night_temperature,
                state.blend_factor,
            ),
            _ => state.day_temperature,
        };

        Log::log_debug(&format!(
            "updateColorTemperature mode={} temperature={} colorTemperature={}",
            mode.map_or(-1, Mode::as_i32),
            temperature,
            state.color_temperature
        ));

        self.set_display_temperature(&mut state, temperature);

        if Self::is_transitioning(&state) {
            self.sequencer.remove_callbacks(TRANSITION_TOKEN);
            let this = self.this.clone();
            self.sequencer.post_delayed(
                TRANSITION_TOKEN,
                Duration::from_millis(TRANSITION_REEVALUATE_MS),
                move || {
                    if let Some(controller) = this.upgrade() {
                        controller.update_color_temperature();
                    }
                },
            );
        }
    }

    fn twilight_factor(&self, state: &ControllerState) -> f32 {
        blend::twilight_blend_factor(state.display.twilight.as_ref(), self.clock.now_millis())
    }

    fn set_display_temperature(&self, state: &mut ControllerState, temperature: i32) {
        if !self.color_temperature_range.contains(&temperature) {
            Log::log_error(&format!("Color temperature out of range: {}", temperature));
            return;
        }

        state.color_temperature = temperature;

        if self.use_color_balance {
            let balance = self.map_color_temperature_to_balance(temperature);
            Log::log_debug(&format!(
                "Set color balance = {} (temperature={})",
                balance, temperature
            ));
            self.animate_color_balance(state, balance);
            return;
        }

        let rgb = color::temperature_to_rgb(temperature);
        match self.hardware.set_additional_adjustment(rgb) {
            Ok(()) => Log::log_debug(&format!(
                "Adjust display temperature to {}K",
                temperature
            )),
            Err(e) => Log::log_error(&format!("Failed to apply {}K: {}", temperature, e)),
        }
    }

    /// Map Kelvin onto the hardware balance range through the fitted curve.
    pub fn map_color_temperature_to_balance(&self, temperature: i32) -> i32 {
        let z = self.color_balance_curve.to_linear(temperature as f64);
        round_half_up(lerp(
            *self.color_balance_range.start() as f32,
            *self.color_balance_range.end() as f32,
            z as f32,
        ))
    }

    fn animate_color_balance(&self, state: &mut ControllerState, balance: i32) {
        // Always start from what the hardware has now
        let current = match self.hardware.color_balance() {
            Ok(current) => current,
            Err(e) => {
                Log::log_warning(&format!(
                    "Failed to read color balance, writing target directly: {}",
                    e
                ));
                self.sequencer.remove_callbacks(ANIMATION_TOKEN);
                state.animation_generation += 1;
                if let Err(e) = self.hardware.set_color_balance(balance) {
                    Log::log_error(&format!("Failed to set color balance: {}", e));
                }
                return;
            }
        };

        let Some(animation) = BalanceAnimation::new(current, balance) else {
            return;
        };

        Log::log_debug(&format!(
            "animateDisplayColor current={} target={} duration={}",
            current, balance, animation.duration_ms
        ));

        self.sequencer.remove_callbacks(ANIMATION_TOKEN);
        state.animation_generation += 1;
        self.schedule_frame(animation, state.animation_generation, 0, Duration::ZERO);
    }

    fn schedule_frame(
        &self,
        animation: BalanceAnimation,
        generation: u64,
        frame: usize,
        delay: Duration,
    ) {
        let this = self.this.clone();
        self.sequencer
            .post_delayed(ANIMATION_TOKEN, delay, move || {
                if let Some(controller) = this.upgrade() {
                    controller.run_frame(animation, generation, frame);
                }
            });
    }

    fn run_frame(&self, animation: BalanceAnimation, generation: u64, frame: usize) {
        {
            let state = self.lock();
            if state.animation_generation != generation {
                return;
            }
            if state.display.screen_on {
                let value = animation.frame_value(frame);
                if let Err(e) = self.hardware.set_color_balance(value) {
                    Log::log_error(&format!("Failed to set color balance {}: {}", value, e));
                }
            }
        }

        if !animation.is_last_frame(frame) {
            let next = frame + 1;
            let delay = animation.frame_time_ms(next) - animation.frame_time_ms(frame);
            self.schedule_frame(animation, generation, next, Duration::from_millis(delay));
        }
    }

    // ═══ Accessors ═══

    pub fn is_enabled(&self) -> bool {
        self.use_temperature_adjustment
    }

    pub fn uses_color_balance(&self) -> bool {
        self.use_color_balance
    }

    pub fn default_day_temperature(&self) -> i32 {
        self.default_day_temperature
    }

    pub fn default_night_temperature(&self) -> i32 {
        self.default_night_temperature
    }

    /// Last applied Kelvin value, -1 before the first apply.
    pub fn color_temperature(&self) -> i32 {
        self.lock().color_temperature
    }

    pub fn day_color_temperature(&self) -> i32 {
        self.settings
            .get_int(&day_temperature_uri(), self.default_day_temperature)
    }

    pub fn night_color_temperature(&self) -> i32 {
        self.settings
            .get_int(&night_temperature_uri(), self.default_night_temperature)
    }

    /// Persist a new day temperature.
    ///
    /// # Returns
    /// `Ok(false)` without storing anything if `temperature` is out of range
    pub fn set_day_color_temperature(&self, temperature: i32) -> Result<bool> {
        self.store_temperature(&day_temperature_uri(), temperature)
    }

    /// Persist a new night temperature. Same contract as the day setter.
    pub fn set_night_color_temperature(&self, temperature: i32) -> Result<bool> {
        self.store_temperature(&night_temperature_uri(), temperature)
    }

    fn store_temperature(&self, uri: &SettingUri, temperature: i32) -> Result<bool> {
        if !self.color_temperature_range.contains(&temperature) {
            Log::log_error(&format!(
                "Color temperature out of range: {} (allowed {}..={})",
                temperature,
                self.color_temperature_range.start(),
                self.color_temperature_range.end()
            ));
            return Ok(false);
        }
        self.settings.put_int(uri, temperature)?;
        Ok(true)
    }

    pub fn color_temperature_range(&self) -> RangeInclusive<i32> {
        self.color_temperature_range.clone()
    }

    pub fn color_balance_range(&self) -> RangeInclusive<i32> {
        self.color_balance_range.clone()
    }

    pub fn dump(&self) -> String {
        let state = self.lock();
        let mut out = String::new();
        let _ = writeln!(out);
        let _ = writeln!(out, "ColorTemperatureController Configuration:");
        let _ = writeln!(out, "  backend={}", self.hardware.backend_name());
        let _ = writeln!(out, "  dayTemperature={}", state.day_temperature);
        let _ = writeln!(out, "  nightTemperature={}", state.night_temperature);
        let _ = writeln!(out);
        let _ = writeln!(out, "  ColorTemperatureController State:");
        let _ = writeln!(out, "    colorTemperature={}", state.color_temperature);
        let _ = writeln!(out, "    isTransitioning={}", Self::is_transitioning(&state));
        out
    }
}

impl SettingsChangeListener for ColorTemperatureController {
    fn on_settings_changed(&self, uri: Option<&SettingUri>) {
        let uri = uri.cloned();
        let this = self.this.clone();
        self.sequencer.post(move || {
            let Some(controller) = this.upgrade() else {
                return;
            };
            let reload_day = uri.as_ref().is_none_or(|u| *u == day_temperature_uri());
            let reload_night = uri.as_ref().is_none_or(|u| *u == night_temperature_uri());
            let day = reload_day.then(|| controller.day_color_temperature());
            let night = reload_night.then(|| controller.night_color_temperature());
            {
                let mut state = controller.lock();
                if let Some(day) = day {
                    state.day_temperature = day;
                }
                if let Some(night) = night {
                    state.night_temperature = night;
                }
            }
            controller.update_color_temperature();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryHardware, MockDisplayHardware};
    use crate::clock::ManualClock;
    use crate::display::Sequencer;
    use crate::display::flags::ALL_CHANGED;
    use crate::settings::{DefaultSettings, SettingsDatabase};
    use crate::twilight::TwilightState;
    use std::time::Instant;
    use tempfile::TempDir;

    const MINUTE: i64 = 60 * 1000;
    const HOUR: i64 = 60 * MINUTE;
    const SUNSET: i64 = 1_000 * HOUR;

    struct Fixture {
        _dir: TempDir,
        sequencer: Sequencer,
        settings: Arc<SettingsHelper>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = SettingsDatabase::open(dir.path(), 0, &DefaultSettings::empty(true)).unwrap();
        Fixture {
            _dir: dir,
            sequencer: Sequencer::new("controller-test").unwrap(),
            settings: Arc::new(SettingsHelper::new(db)),
            clock: Arc::new(ManualClock::new(SUNSET - 6 * HOUR)),
        }
    }

    fn controller(fx: &Fixture, hardware: Arc<dyn DisplayHardware>) -> Arc<ColorTemperatureController> {
        let controller = ColorTemperatureController::new(
            hardware,
            fx.settings.clone(),
            fx.clock.clone(),
            fx.sequencer.handle(),
            &Config::default(),
        );
        controller.start();
        fx.sequencer.handle().flush();
        controller
    }

    fn screen_on(mode: Mode) -> State {
        State {
            screen_on: true,
            mode: Some(mode),
            ..State::default()
        }
    }

    fn twilight() -> TwilightState {
        TwilightState::new(SUNSET - 24 * HOUR, SUNSET - 12 * HOUR, SUNSET, SUNSET + 12 * HOUR, false)
    }

    fn rgb_mock() -> MockDisplayHardware {
        let mut hw = MockDisplayHardware::new();
        hw.expect_supports_color_balance().return_const(false);
        hw.expect_color_balance_range().returning(|| 0..=0);
        hw.expect_has_color_adjustment().return_const(true);
        hw.expect_backend_name().return_const("Mock");
        hw
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    #[test]
    fn test_capabilities_for_rgb_hardware() {
        let fx = fixture();
        let controller = controller(&fx, Arc::new(MemoryHardware::rgb()));
        let mut caps = Capabilities::new();
        assert!(controller.capabilities(&mut caps));
        assert!(caps.has_mode(Mode::Auto));
        assert!(caps.has_mode(Mode::Day));
        assert!(caps.has_mode(Mode::Night));
        assert!(!caps.has_mode(Mode::Outdoor));
        assert!(caps.get(FEATURE_COLOR_ADJUSTMENT as i32));
        assert!(!caps.get(FEATURE_COLOR_BALANCE as i32));
    }

    #[test]
    fn test_capabilities_for_balance_and_unsupported_hardware() {
        let fx = fixture();
        let balance = controller(&fx, Arc::new(MemoryHardware::color_balance(-100..=100)));
        let mut caps = Capabilities::new();
        assert!(balance.capabilities(&mut caps));
        assert!(caps.get(FEATURE_COLOR_BALANCE as i32));
        assert!(!caps.get(FEATURE_COLOR_ADJUSTMENT as i32));

        let none = controller(&fx, Arc::new(MemoryHardware::unsupported()));
        let mut caps = Capabilities::new();
        assert!(!none.capabilities(&mut caps));
        assert!(caps.is_empty());
    }

    #[test]
    fn test_platform_night_display_disables_controller() {
        let fx = fixture();
        let config = Config {
            night_display_available: Some(true),
            ..Config::default()
        };
        let controller = ColorTemperatureController::new(
            Arc::new(MemoryHardware::rgb()),
            fx.settings.clone(),
            fx.clock.clone(),
            fx.sequencer.handle(),
            &config,
        );
        assert!(!controller.is_enabled());
        controller.update(ALL_CHANGED, &screen_on(Mode::Night));
        assert_eq!(controller.color_temperature(), -1);
    }

    #[test]
    fn test_night_mode_applies_night_rgb_once() {
        let fx = fixture();
        let expected = color::temperature_to_rgb(DEFAULT_NIGHT_TEMP);
        let mut hw = rgb_mock();
        hw.expect_set_additional_adjustment()
            .withf(move |rgb| *rgb == expected)
            .times(1)
            .returning(|_| Ok(()));

        let controller = controller(&fx, Arc::new(hw));
        controller.update(MODE_CHANGED, &screen_on(Mode::Night));
        assert_eq!(controller.color_temperature(), DEFAULT_NIGHT_TEMP);
    }

    #[test]
    fn test_off_mode_uses_default_day_even_with_custom_day() {
        let fx = fixture();
        fx.settings.put_int(&day_temperature_uri(), 5800).unwrap();
        let hw = Arc::new(MemoryHardware::rgb());
        let controller = controller(&fx, hw.clone());

        controller.update(MODE_CHANGED, &screen_on(Mode::Off));
        assert_eq!(controller.color_temperature(), DEFAULT_DAY_TEMP);

        controller.update(MODE_CHANGED, &screen_on(Mode::Day));
        assert_eq!(controller.color_temperature(), 5800);

        controller.update(MODE_CHANGED, &screen_on(Mode::Outdoor));
        assert_eq!(controller.color_temperature(), 5800);
    }

    #[test]
    fn test_nothing_applied_while_screen_off() {
        let fx = fixture();
        let mut hw = rgb_mock();
        hw.expect_set_additional_adjustment().never();
        let controller = controller(&fx, Arc::new(hw));

        let state = State {
            screen_on: false,
            mode: Some(Mode::Night),
            ..State::default()
        };
        controller.update(ALL_CHANGED, &state);
        assert_eq!(controller.color_temperature(), -1);
    }

    #[test]
    fn test_out_of_range_setting_is_not_applied() {
        let fx = fixture();
        fx.settings.put_int(&night_temperature_uri(), 500).unwrap();
        let hw = Arc::new(MemoryHardware::rgb());
        let controller = controller(&fx, hw.clone());

        controller.update(MODE_CHANGED, &screen_on(Mode::Day));
        controller.update(MODE_CHANGED, &screen_on(Mode::Night));

        assert_eq!(controller.color_temperature(), DEFAULT_DAY_TEMP);
        assert_eq!(hw.adjustment_writes().len(), 1);
    }

    #[test]
    fn test_setters_reject_out_of_range() {
        let fx = fixture();
        let controller = controller(&fx, Arc::new(MemoryHardware::rgb()));

        assert!(!controller.set_day_color_temperature(DEFAULT_MAX_TEMP + 1).unwrap());
        assert!(!controller.set_night_color_temperature(DEFAULT_MIN_TEMP - 1).unwrap());
        assert_eq!(controller.day_color_temperature(), DEFAULT_DAY_TEMP);
        assert_eq!(controller.night_color_temperature(), DEFAULT_NIGHT_TEMP);

        assert!(controller.set_day_color_temperature(DEFAULT_MAX_TEMP).unwrap());
        assert_eq!(controller.day_color_temperature(), DEFAULT_MAX_TEMP);
    }

    #[test]
    fn test_settings_change_reapplies() {
        let fx = fixture();
        let hw = Arc::new(MemoryHardware::rgb());
        let controller = controller(&fx, hw.clone());
        controller.update(MODE_CHANGED, &screen_on(Mode::Night));

        assert!(controller.set_night_color_temperature(3000).unwrap());
        fx.sequencer.handle().flush();

        assert_eq!(controller.color_temperature(), 3000);
        assert_eq!(hw.current_adjustment(), color::temperature_to_rgb(3000));
    }

    #[test]
    fn test_auto_mode_during_dusk_schedules_reevaluation() {
        let fx = fixture();
        let controller = controller(&fx, Arc::new(MemoryHardware::rgb()));
        let mut state = screen_on(Mode::Auto);
        state.twilight = Some(twilight());

        fx.clock.set(SUNSET - 15 * MINUTE);
        controller.update(TWILIGHT_CHANGED, &state);

        let applied = controller.color_temperature();
        assert!(applied > DEFAULT_NIGHT_TEMP && applied < DEFAULT_DAY_TEMP);
        assert!(controller.is_transitioning_now());
        assert!(fx.sequencer.handle().has_callbacks(TRANSITION_TOKEN));

        fx.clock.set(SUNSET + 2 * HOUR);
        controller.update(TWILIGHT_CHANGED, &state);
        assert_eq!(controller.color_temperature(), DEFAULT_NIGHT_TEMP);
        assert!(!controller.is_transitioning_now());
    }

    #[test]
    fn test_auto_mode_keeps_polling_while_dawn_rounds_to_night() {
        let fx = fixture();
        let controller = controller(&fx, Arc::new(MemoryHardware::rgb()));
        let mut state = screen_on(Mode::Auto);
        state.twilight = Some(twilight());

        fx.clock.set(SUNSET + 12 * HOUR + 1000);
        controller.update(TWILIGHT_CHANGED, &state);

        assert_eq!(controller.color_temperature(), DEFAULT_NIGHT_TEMP);
        assert!(controller.is_transitioning_now());
        assert!(fx.sequencer.handle().has_callbacks(TRANSITION_TOKEN));
    }

    #[test]
    fn test_auto_mode_without_twilight_is_day() {
        let fx = fixture();
        let controller = controller(&fx, Arc::new(MemoryHardware::rgb()));
        controller.update(MODE_CHANGED, &screen_on(Mode::Auto));
        assert_eq!(controller.color_temperature(), DEFAULT_DAY_TEMP);
        assert!(!fx.sequencer.handle().has_callbacks(TRANSITION_TOKEN));
    }

    #[test]
    fn test_twilight_update_without_snapshot_is_ignored() {
        let fx = fixture();
        let controller = controller(&fx, Arc::new(MemoryHardware::rgb()));
        controller.update(TWILIGHT_CHANGED, &screen_on(Mode::Night));
        assert_eq!(controller.color_temperature(), -1);
    }

    #[test]
    fn test_balance_mapping_hits_curve_points() {
        let fx = fixture();
        let controller = controller(&fx, Arc::new(MemoryHardware::color_balance(-100..=100)));
        assert_eq!(controller.map_color_temperature_to_balance(DEFAULT_MIN_TEMP), -100);
        assert_eq!(controller.map_color_temperature_to_balance(DEFAULT_DAY_TEMP), 0);
        assert_eq!(controller.map_color_temperature_to_balance(DEFAULT_MAX_TEMP), 100);
        assert!(controller.map_color_temperature_to_balance(DEFAULT_NIGHT_TEMP) < 0);
    }

    #[test]
    fn test_balance_animates_to_target() {
        let fx = fixture();
        let hw = Arc::new(MemoryHardware::color_balance(-100..=100));
        let controller = controller(&fx, hw.clone());
        let target = controller.map_color_temperature_to_balance(DEFAULT_NIGHT_TEMP);

        let handle = fx.sequencer.handle();
        let c = controller.clone();
        handle.post(move || c.update(MODE_CHANGED, &screen_on(Mode::Night)));

        assert!(wait_for(|| hw.color_balance().unwrap() == target));
        let writes = hw.balance_writes();
        assert_eq!(writes.first(), Some(&0));
        assert_eq!(writes.last(), Some(&target));
        assert!(writes.windows(2).all(|w| w[0] >= w[1]));
        assert!(wait_for(|| !handle.has_callbacks(ANIMATION_TOKEN)));
    }

    #[test]
    fn test_screen_off_cancels_animation() {
        let fx = fixture();
        let hw = Arc::new(MemoryHardware::color_balance(-1000..=1000));
        let controller = controller(&fx, hw.clone());
        let handle = fx.sequencer.handle();

        let c = controller.clone();
        handle.post(move || c.update(MODE_CHANGED, &screen_on(Mode::Night)));
        handle.flush();
        assert!(handle.has_callbacks(ANIMATION_TOKEN));

        let c = controller.clone();
        handle.post(move || {
            c.update(
                DISPLAY_CHANGED,
                &State {
                    screen_on: false,
                    mode: Some(Mode::Night),
                    ..State::default()
                },
            )
        });
        handle.flush();
        assert!(!handle.has_callbacks(ANIMATION_TOKEN));
    }

    #[test]
    fn test_dump_reports_state() {
        let fx = fixture();
        let controller = controller(&fx, Arc::new(MemoryHardware::rgb()));
        controller.update(MODE_CHANGED, &screen_on(Mode::Night));
        let dump = controller.dump();
        assert!(dump.contains("colorTemperature=4500"));
        assert!(dump.contains("isTransitioning=false"));
        assert!(dump.contains("backend=Memory"));
    }
}
