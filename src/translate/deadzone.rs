//! Radial scaled stick deadzone with optional anti-deadzone.
//!
//! Works in normalized (-1..1) space on the stick vector, not per axis, so a
//! drifting stick is zeroed in every direction and diagonals keep their
//! angle. Above the deadzone the remaining range is rescaled to the full
//! output span; the anti-deadzone maps the bottom of that span up to a
//! floor, for games that apply their own inner deadzone on top.

use super::canonical::long_to_short;

/// Per-stick deadzone settings. Fractions of full deflection, in [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct DeadzoneConfig {
    pub enabled: bool,
    pub left_deadzone: f32,
    pub right_deadzone: f32,
    pub left_anti_deadzone: f32,
    pub right_anti_deadzone: f32,
}

impl Default for DeadzoneConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            left_deadzone: 0.15,
            right_deadzone: 0.15,
            left_anti_deadzone: 0.0,
            right_anti_deadzone: 0.0,
        }
    }
}

/// Apply the radial scaled deadzone to one stick.
pub fn apply_radial(x: i16, y: i16, deadzone: f32, anti_deadzone: f32) -> (i16, i16) {
    if deadzone >= 1.0 {
        return (0, 0);
    }

    let nx = x as f32 / 32767.0;
    let ny = y as f32 / 32767.0;
    let magnitude = (nx * nx + ny * ny).sqrt();

    if magnitude < deadzone || magnitude == 0.0 {
        return (0, 0);
    }

    let mut scaled = ((magnitude - deadzone) / (1.0 - deadzone)).min(1.0);
    if anti_deadzone > 0.0 && scaled > 0.0 {
        scaled = anti_deadzone + (1.0 - anti_deadzone) * scaled;
    }

    let out_x = (nx / magnitude) * scaled * 32767.0;
    let out_y = (ny / magnitude) * scaled * 32767.0;
    (
        long_to_short(out_x.round() as i32),
        long_to_short(out_y.round() as i32),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn magnitude(x: i16, y: i16) -> f32 {
        let nx = x as f32 / 32767.0;
        let ny = y as f32 / 32767.0;
        (nx * nx + ny * ny).sqrt()
    }

    #[test]
    fn test_drift_inside_deadzone_zeroed() {
        let (x, y) = apply_radial(3000, 2000, 0.15, 0.0);
        assert_eq!((x, y), (0, 0));
        let (x, y) = apply_radial(-2500, 1500, 0.15, 0.0);
        assert_eq!((x, y), (0, 0));
    }

    #[test]
    fn test_magnitude_exactly_at_deadzone_is_zero() {
        // 0.15 * 32767 ≈ 4915; at that magnitude output must be zero.
        let at = (0.15f32 * 32767.0) as i16;
        let (x, y) = apply_radial(at, 0, 0.15, 0.0);
        assert_eq!((x, y), (0, 0));
    }

    #[test]
    fn test_full_deflection_stays_near_full_scale() {
        let (x, y) = apply_radial(32767, 0, 0.15, 0.0);
        assert!(magnitude(x, y) > 0.95);
        assert_eq!(y, 0);

        let (x, y) = apply_radial(0, -32768, 0.15, 0.0);
        assert!(magnitude(x, y) > 0.95);
        assert_eq!(x, 0);
    }

    #[test]
    fn test_just_above_deadzone_scales_down() {
        // 25% deflection at 45° with a 20% deadzone: output is non-zero but
        // well below the input magnitude.
        let v = (32767.0 * 0.25 * 0.707) as i16;
        let (x, y) = apply_radial(v, v, 0.2, 0.0);
        let out = magnitude(x, y);
        assert!(out > 0.0);
        assert!(out < 0.25);
    }

    #[test]
    fn test_direction_is_preserved() {
        let (x, y) = apply_radial(20000, 10000, 0.15, 0.0);
        let in_angle = (10000.0f32).atan2(20000.0);
        let out_angle = (y as f32).atan2(x as f32);
        assert!((in_angle - out_angle).abs() < 0.01);
    }

    #[test]
    fn test_anti_deadzone_raises_floor() {
        // Just above the deadzone, with anti-deadzone 0.3 the output
        // magnitude jumps to roughly that floor.
        let v = (32767.0 * 0.20) as i16;
        let (x, y) = apply_radial(v, 0, 0.15, 0.3);
        let out = magnitude(x, y);
        assert!(out > 0.29, "floor not applied: {out}");
        // And without it the same input stays small.
        let (x, y) = apply_radial(v, 0, 0.15, 0.0);
        assert!(magnitude(x, y) < 0.1);
    }

    #[test]
    fn test_degenerate_full_deadzone() {
        assert_eq!(apply_radial(32767, 32767, 1.0, 0.0), (0, 0));
    }
}
