//! Numeric helpers shared by the blend, the balance mapping and the animator.
//!
//! The rounding and easing helpers reproduce the platform framework's
//! numerics bit-for-bit where it matters: rounding is half-up
//! (`floor(x + 0.5)`) and never half-away-from-zero, and the ease curve is
//! the cosine accelerate/decelerate interpolator.

use std::f64::consts::PI;
use std::path::Path;

/// Linear interpolation between `start` and `stop` by `amount`.
///
/// `amount` is not clamped; callers that need clamping do it themselves.
///
/// # Examples
/// ```
/// use livedisplay::utils::lerp;
/// assert_eq!(lerp(4500.0, 6500.0, 0.5), 5500.0);
/// ```
pub fn lerp(start: f32, stop: f32, amount: f32) -> f32 {
    start + (stop - start) * amount
}

/// Accelerate/decelerate easing over `[0, 1]`.
///
/// Starts and ends slowly, fastest in the middle. `ease(0) = 0`,
/// `ease(0.5) = 0.5`, `ease(1) = 1`.
pub fn accelerate_decelerate(input: f32) -> f32 {
    (((input as f64 + 1.0) * PI).cos() / 2.0 + 0.5) as f32
}

/// Round half-up, matching `Math.round(float)`.
///
/// # Examples
/// ```
/// use livedisplay::utils::round_half_up;
/// assert_eq!(round_half_up(2.5), 3);
/// assert_eq!(round_half_up(-2.5), -2);
/// ```
pub fn round_half_up(value: f32) -> i32 {
    (value + 0.5).floor() as i32
}

/// Round to a fixed number of decimal places, half-up.
pub fn round_to_places(value: f64, places: u32) -> f64 {
    let scale = 10f64.powi(places as i32);
    (value * scale + 0.5).floor() / scale
}

/// A monotone curve through three points.
///
/// Fitted once through (min, mid, max) so that `to_linear(min) = 0`,
/// `to_linear(mid) = 0.5` and `to_linear(max) = 1`. Points that cannot be
/// fitted (mid exactly halfway or touching an end) fall back to a straight
/// line through min and max.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerCurve {
    Exponential { a: f64, b: f64, c: f64 },
    Linear { min: f64, max: f64 },
}

impl PowerCurve {
    /// Fit the curve through three values.
    ///
    /// # Arguments
    /// * `x0` - Value mapped to 0.0
    /// * `x1` - Value mapped to 0.5
    /// * `x2` - Value mapped to 1.0
    pub fn fit(x0: f64, x1: f64, x2: f64) -> Self {
        let denominator = x0 - 2.0 * x1 + x2;
        if denominator != 0.0 {
            let a = (x0 * x2 - x1 * x1) / denominator;
            let b = (x1 - x0) * (x1 - x0) / denominator;
            let c = 2.0 * ((x2 - x1) / (x1 - x0)).ln();
            if a.is_finite() && b.is_finite() && c.is_finite() && b != 0.0 && c != 0.0 {
                return PowerCurve::Exponential { a, b, c };
            }
        }
        PowerCurve::Linear { min: x0, max: x2 }
    }

    /// Map a value on the curve back to `[0, 1]`.
    pub fn to_linear(&self, value: f64) -> f64 {
        match *self {
            PowerCurve::Exponential { a, b, c } => ((value - a) / b).ln() / c,
            PowerCurve::Linear { min, max } => (value - min) / (max - min),
        }
    }

    /// Map a linear position in `[0, 1]` onto the curve.
    pub fn from_linear(&self, value: f64) -> f64 {
        match *self {
            PowerCurve::Exponential { a, b, c } => a + b * (c * value).exp(),
            PowerCurve::Linear { min, max } => min + (max - min) * value,
        }
    }
}

/// Convert an absolute path to use ~ notation if it's in the user's home directory.
pub fn path_for_display(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(relative) = path.strip_prefix(&home) {
            return format!("~/{}", relative.display());
        }
    }
    path.display().to_string()
}
