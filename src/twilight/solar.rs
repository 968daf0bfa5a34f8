//! Sunrise and sunset boundaries computed from geographic coordinates.
//!
//! Uses the `sunrise` crate for the solar math. The three local calendar
//! dates around "now" (yesterday, today, tomorrow) each contribute the
//! boundaries the blend needs.

use anyhow::Result;
use chrono::{Local, NaiveDate, TimeZone};
use sunrise::{Coordinates, SolarDay, SolarEvent};

use super::{TwilightSource, TwilightState, UNKNOWN_TIME};
use crate::logger::Log;

/// Twilight source backed by solar position calculations.
#[derive(Debug, Clone, Copy)]
pub struct SolarTwilight {
    latitude: f64,
    longitude: f64,
}

impl SolarTwilight {
    /// Create a source for the given coordinates.
    ///
    /// # Arguments
    /// * `latitude` - Geographic latitude in degrees (-90 to +90)
    /// * `longitude` - Geographic longitude in degrees (-180 to +180)
    ///
    /// # Returns
    /// * `Err(_)` if the coordinates are outside the valid ranges
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            anyhow::bail!(
                "Invalid latitude: {}. Must be between -90 and 90 degrees",
                latitude
            );
        }
        if !(-180.0..=180.0).contains(&longitude) {
            anyhow::bail!(
                "Invalid longitude: {}. Must be between -180 and 180 degrees",
                longitude
            );
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Sunrise and sunset for one calendar date, in epoch milliseconds.
    ///
    /// Returns the unknown sentinel for both when the sun doesn't rise and
    /// set normally on that date.
    fn boundaries_for(&self, date: NaiveDate) -> (i64, i64) {
        let Some(coord) = Coordinates::new(self.latitude, self.longitude) else {
            return (UNKNOWN_TIME, UNKNOWN_TIME);
        };
        let solar_day = SolarDay::new(coord, date);
        let sunrise = solar_day.event_time(SolarEvent::Sunrise).timestamp_millis();
        let sunset = solar_day.event_time(SolarEvent::Sunset).timestamp_millis();

        if sunrise < 0 || sunset <= sunrise {
            Log::log_debug(&format!("No usable sunrise/sunset on {}", date));
            return (UNKNOWN_TIME, UNKNOWN_TIME);
        }
        (sunrise, sunset)
    }
}

impl TwilightSource for SolarTwilight {
    fn compute(&self, now_ms: i64) -> TwilightState {
        let Some(now) = Local.timestamp_millis_opt(now_ms).single() else {
            return TwilightState::unknown();
        };
        let today = now.date_naive();
        let (Some(yesterday), Some(tomorrow)) = (today.pred_opt(), today.succ_opt()) else {
            return TwilightState::unknown();
        };

        let (_, yesterday_sunset) = self.boundaries_for(yesterday);
        let (today_sunrise, today_sunset) = self.boundaries_for(today);
        let (tomorrow_sunrise, _) = self.boundaries_for(tomorrow);

        let is_night = today_sunrise >= 0
            && today_sunset >= 0
            && (now_ms < today_sunrise || now_ms > today_sunset);

        TwilightState::new(
            yesterday_sunset,
            today_sunrise,
            today_sunset,
            tomorrow_sunrise,
            is_night,
        )
    }

    fn describe(&self) -> String {
        format!("solar ({:.4}°, {:.4}°)", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime};

    fn local_millis(date: NaiveDate, hour: u32) -> i64 {
        let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap();
        Local
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn test_rejects_invalid_coordinates() {
        assert!(SolarTwilight::new(91.0, 0.0).is_err());
        assert!(SolarTwilight::new(0.0, -181.0).is_err());
        assert!(SolarTwilight::new(40.7, -74.0).is_ok());
    }

    #[test]
    fn test_boundaries_are_ordered() {
        // Equator: the sun rises and sets every day of the year
        let source = SolarTwilight::new(0.0, 0.0).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let state = source.compute(local_millis(date, 12));

        assert!(state.is_complete());
        assert!(state.yesterday_sunset < state.today_sunrise);
        assert!(state.today_sunrise < state.today_sunset);
        assert!(state.today_sunset < state.tomorrow_sunrise);
    }

    #[test]
    fn test_day_length_is_roughly_twelve_hours_at_equator() {
        let source = SolarTwilight::new(0.0, 0.0).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let state = source.compute(local_millis(date, 12));
        let length = Duration::milliseconds(state.today_sunset - state.today_sunrise);
        assert!(length > Duration::hours(11) && length < Duration::hours(13));
    }

    #[test]
    fn test_is_night_outside_daylight() {
        let source = SolarTwilight::new(0.0, 0.0).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let noon = source.compute(local_millis(date, 12));
        let state = source.compute(noon.today_sunset + 60 * 60 * 1000);
        assert!(state.is_night);
        let state = source.compute(noon.today_sunrise + 60 * 60 * 1000);
        assert!(!state.is_night);
    }
}
