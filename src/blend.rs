//! Day/night color temperature blending around twilight.
//!
//! The blend weight is 1.0 during the day and 0.0 at night. Around each
//! boundary it eases over [`TWILIGHT_ADJUSTMENT_TIME_MS`]: during the half
//! hour before sunset it falls from 1 to 0, and during the half hour after
//! sunrise it rises from 0 to 1.
//!
//! Two weights are multiplied so a single snapshot covers both the night
//! that is ending (yesterday's sunset to today's sunrise) and the one that
//! is coming (today's sunset to tomorrow's sunrise).

use crate::constants::TWILIGHT_ADJUSTMENT_TIME_MS;
use crate::twilight::TwilightState;
use crate::utils::{accelerate_decelerate, lerp};

/// Weight in `[0, 1]` for `now` relative to one night.
///
/// # Arguments
/// * `now` - Current time in epoch milliseconds
/// * `sunset` - Start of the night, negative if unknown
/// * `sunrise` - End of the night, negative if unknown
pub fn twilight_adjustment(now: i64, sunset: i64, sunrise: i64) -> f32 {
    if sunset < 0
        || sunrise < 0
        || now < sunset - TWILIGHT_ADJUSTMENT_TIME_MS
        || now > sunrise + TWILIGHT_ADJUSTMENT_TIME_MS
    {
        return 1.0;
    }

    if now <= sunset {
        // Dusk
        let amount = (sunset - now) as f32 / TWILIGHT_ADJUSTMENT_TIME_MS as f32;
        return accelerate_decelerate(amount);
    }

    if now >= sunrise {
        // Dawn
        let amount = (now - sunrise) as f32 / TWILIGHT_ADJUSTMENT_TIME_MS as f32;
        return accelerate_decelerate(amount);
    }

    0.0
}

/// Combined weight for a snapshot. No snapshot means daytime.
pub fn twilight_blend_factor(twilight: Option<&TwilightState>, now: i64) -> f32 {
    match twilight {
        None => 1.0,
        Some(state) => {
            twilight_adjustment(now, state.yesterday_sunset, state.today_sunrise)
                * twilight_adjustment(now, state.today_sunset, state.tomorrow_sunrise)
        }
    }
}

/// Interpolate from night to day by `factor`, truncating toward zero.
pub fn blend_temperature(day: i32, night: i32, factor: f32) -> i32 {
    lerp(night as f32, day as f32, factor) as i32
}

/// Kelvin value for `now` given the user's day and night temperatures.
pub fn twilight_temperature(
    twilight: Option<&TwilightState>,
    now: i64,
    day: i32,
    night: i32,
) -> i32 {
    blend_temperature(day, night, twilight_blend_factor(twilight, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60 * 1000;
    const HOUR: i64 = 60 * MINUTE;
    const SUNSET: i64 = 1_000 * HOUR;
    const SUNRISE: i64 = SUNSET + 12 * HOUR;

    fn state() -> TwilightState {
        TwilightState::new(SUNSET - 24 * HOUR, SUNSET - 12 * HOUR, SUNSET, SUNRISE, false)
    }

    #[test]
    fn test_full_day_outside_windows() {
        assert_eq!(twilight_adjustment(SUNSET - 31 * MINUTE, SUNSET, SUNRISE), 1.0);
        assert_eq!(twilight_adjustment(SUNRISE + 31 * MINUTE, SUNSET, SUNRISE), 1.0);
    }

    #[test]
    fn test_unknown_boundaries_mean_day() {
        assert_eq!(twilight_adjustment(SUNSET, -1, SUNRISE), 1.0);
        assert_eq!(twilight_adjustment(SUNSET, SUNSET, -1), 1.0);
        assert_eq!(twilight_blend_factor(None, SUNSET), 1.0);
    }

    #[test]
    fn test_dusk_eases_down_to_zero_at_sunset() {
        let start = twilight_adjustment(SUNSET - 30 * MINUTE, SUNSET, SUNRISE);
        let middle = twilight_adjustment(SUNSET - 15 * MINUTE, SUNSET, SUNRISE);
        let end = twilight_adjustment(SUNSET, SUNSET, SUNRISE);
        assert!((start - 1.0).abs() < 1e-6);
        assert!((middle - 0.5).abs() < 1e-6);
        assert!(end.abs() < 1e-6);
    }

    #[test]
    fn test_full_night_between_boundaries() {
        assert_eq!(twilight_adjustment(SUNSET + 15 * MINUTE, SUNSET, SUNRISE), 0.0);
        assert_eq!(twilight_adjustment(SUNSET + 6 * HOUR, SUNSET, SUNRISE), 0.0);
    }

    #[test]
    fn test_dawn_eases_up_after_sunrise() {
        let start = twilight_adjustment(SUNRISE, SUNSET, SUNRISE);
        let middle = twilight_adjustment(SUNRISE + 15 * MINUTE, SUNSET, SUNRISE);
        let end = twilight_adjustment(SUNRISE + 30 * MINUTE, SUNSET, SUNRISE);
        assert!(start.abs() < 1e-6);
        assert!((middle - 0.5).abs() < 1e-6);
        assert!((end - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_blend_truncates() {
        assert_eq!(blend_temperature(6500, 4500, 1.0), 6500);
        assert_eq!(blend_temperature(6500, 4500, 0.0), 4500);
        assert_eq!(blend_temperature(6500, 4500, 0.5006), 5501);
        assert_eq!(blend_temperature(6500, 4500, 0.4999), 5499);
    }

    #[test]
    fn test_twilight_temperature_at_noon_and_midnight() {
        let snapshot = state();
        assert_eq!(twilight_temperature(Some(&snapshot), SUNSET - 4 * HOUR, 6500, 4500), 6500);
        assert_eq!(twilight_temperature(Some(&snapshot), SUNSET + 6 * HOUR, 6500, 4500), 4500);
    }

    #[test]
    fn test_twilight_temperature_without_snapshot_is_day() {
        assert_eq!(twilight_temperature(None, SUNSET, 6500, 4500), 6500);
    }
}
