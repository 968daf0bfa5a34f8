//! Sunset and sunrise boundaries for the color temperature blend.
//!
//! A [`TwilightState`] is an immutable snapshot of four boundary timestamps
//! around "now". Sources replace the snapshot whole; nobody mutates one in
//! place. Timestamps are milliseconds since the Unix epoch and a negative
//! value marks a boundary as unknown.

pub mod solar;

use chrono::{Local, TimeZone};
use std::fmt;

use crate::constants::{
    TWILIGHT_ADJUSTMENT_TIME_MS, TWILIGHT_MAX_REFRESH_MS, TWILIGHT_MIN_REFRESH_MS,
};

pub use solar::SolarTwilight;

/// Sentinel used for a boundary that could not be computed.
pub const UNKNOWN_TIME: i64 = -1;

/// Boundaries bracketing the current moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwilightState {
    pub yesterday_sunset: i64,
    pub today_sunrise: i64,
    pub today_sunset: i64,
    pub tomorrow_sunrise: i64,
    pub is_night: bool,
}

impl TwilightState {
    pub fn new(
        yesterday_sunset: i64,
        today_sunrise: i64,
        today_sunset: i64,
        tomorrow_sunrise: i64,
        is_night: bool,
    ) -> Self {
        Self {
            yesterday_sunset,
            today_sunrise,
            today_sunset,
            tomorrow_sunrise,
            is_night,
        }
    }

    /// A state with no usable boundaries. The blend treats this as daytime.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_TIME, UNKNOWN_TIME, UNKNOWN_TIME, UNKNOWN_TIME, false)
    }

    /// True when every boundary is known.
    pub fn is_complete(&self) -> bool {
        self.yesterday_sunset >= 0
            && self.today_sunrise >= 0
            && self.today_sunset >= 0
            && self.tomorrow_sunrise >= 0
    }

    /// Delay until the snapshot should be recomputed.
    ///
    /// Lands just after the next moment the blend starts moving: the start
    /// of a dusk window, a sunset or a sunrise. Bounded to
    /// `[1 minute, 1 hour]`.
    pub fn refresh_delay_ms(&self, now: i64) -> i64 {
        let dusk_starts = [self.yesterday_sunset, self.today_sunset]
            .into_iter()
            .filter(|&t| t >= 0)
            .map(|t| t - TWILIGHT_ADJUSTMENT_TIME_MS);
        let next_boundary = [
            self.yesterday_sunset,
            self.today_sunrise,
            self.today_sunset,
            self.tomorrow_sunrise,
        ]
        .into_iter()
        .filter(|&t| t >= 0)
        .chain(dusk_starts)
        .filter(|&t| t > now)
        .min();

        match next_boundary {
            Some(t) => (t - now + 1000).clamp(TWILIGHT_MIN_REFRESH_MS, TWILIGHT_MAX_REFRESH_MS),
            None => TWILIGHT_MAX_REFRESH_MS,
        }
    }
}

fn format_time(millis: i64) -> String {
    if millis < 0 {
        return "unknown".to_string();
    }
    match Local.timestamp_millis_opt(millis).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "invalid".to_string(),
    }
}

impl fmt::Display for TwilightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TwilightState {{ yesterday_sunset: {}, today_sunrise: {}, today_sunset: {}, tomorrow_sunrise: {}, is_night: {} }}",
            format_time(self.yesterday_sunset),
            format_time(self.today_sunrise),
            format_time(self.today_sunset),
            format_time(self.tomorrow_sunrise),
            self.is_night
        )
    }
}

/// Anything that can produce a twilight snapshot for a given moment.
pub trait TwilightSource: Send + Sync {
    /// Compute boundaries around `now_ms`.
    fn compute(&self, now_ms: i64) -> TwilightState;

    /// Short description for logs and dumps.
    fn describe(&self) -> String;
}

/// Source that always returns the same snapshot.
#[derive(Debug, Clone)]
pub struct FixedTwilight {
    state: TwilightState,
}

impl FixedTwilight {
    pub fn new(state: TwilightState) -> Self {
        Self { state }
    }
}

impl TwilightSource for FixedTwilight {
    fn compute(&self, _now_ms: i64) -> TwilightState {
        self.state
    }

    fn describe(&self) -> String {
        "fixed".to_string()
    }
}
