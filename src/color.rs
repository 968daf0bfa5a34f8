//! Kelvin to RGB gain conversion.
//!
//! Black-body approximation fitted to the CIE 1964 10° color matching
//! functions. Good to within a few percent from 1000K to 40000K, which is
//! well beyond any panel's adjustable range.

/// Convert a color temperature to per-channel gains in `[0, 1]`.
///
/// # Arguments
/// * `kelvin` - Color temperature in Kelvin
///
/// # Returns
/// `[red, green, blue]` multipliers for the display's color adjustment
pub fn temperature_to_rgb(kelvin: i32) -> [f32; 3] {
    let temp = kelvin.clamp(1000, 40000) as f64 / 100.0;

    let red = if temp <= 66.0 {
        255.0
    } else {
        329.698727446 * (temp - 60.0).powf(-0.1332047592)
    };

    let green = if temp <= 66.0 {
        99.4708025861 * temp.ln() - 161.1195681661
    } else {
        288.1221695283 * (temp - 60.0).powf(-0.0755148492)
    };

    let blue = if temp >= 66.0 {
        255.0
    } else if temp <= 19.0 {
        0.0
    } else {
        138.5177312231 * (temp - 10.0).ln() - 305.0447927307
    };

    [
        (red / 255.0).clamp(0.0, 1.0) as f32,
        (green / 255.0).clamp(0.0, 1.0) as f32,
        (blue / 255.0).clamp(0.0, 1.0) as f32,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daylight_is_nearly_neutral() {
        let [r, g, b] = temperature_to_rgb(6500);
        assert_eq!(r, 1.0);
        assert!((g - 1.0).abs() < 0.05);
        assert!((b - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_warm_light_is_red_heavy() {
        let [r, g, b] = temperature_to_rgb(3000);
        assert!(r > g);
        assert!(g > b);
        assert!(b < 0.5);
    }

    #[test]
    fn test_cool_light_is_blue_heavy() {
        let [r, g, b] = temperature_to_rgb(9000);
        assert_eq!(b, 1.0);
        assert!(r < b);
        assert!(g < b);
    }

    #[test]
    fn test_candlelight_has_no_blue() {
        let [r, _, b] = temperature_to_rgb(1500);
        assert_eq!(r, 1.0);
        assert_eq!(b, 0.0);
    }

    #[test]
    fn test_gains_stay_in_unit_range() {
        for kelvin in (500..=45000).step_by(250) {
            for gain in temperature_to_rgb(kelvin) {
                assert!((0.0..=1.0).contains(&gain), "{}K produced {}", kelvin, gain);
            }
        }
    }
}
