//! Analog stick positions

use std::f64::consts::TAU;

/// Neutral byte for both stick axes
pub const STICK_CENTER: u8 = 0x80;

/// An analog stick position as the pair of bytes sent on the wire
///
/// X grows to the right, Y grows downwards (the vertical axis is inverted
/// relative to the mathematical angle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StickPosition {
    pub x: u8,
    pub y: u8,
}

impl StickPosition {
    /// Stick at rest
    pub const CENTER: StickPosition = StickPosition {
        x: STICK_CENTER,
        y: STICK_CENTER,
    };

    /// Build from raw axis bytes
    pub const fn from_raw(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Build from an angle in radians (0 = right, counter-clockwise) and a
    /// magnitude that is clamped to `0.0..=1.0`
    pub fn from_angle(radians: f64, magnitude: f64) -> Self {
        let mag = if magnitude.is_nan() {
            0.0
        } else {
            magnitude.clamp(0.0, 1.0)
        };
        if mag == 0.0 {
            return Self::CENTER;
        }

        let x = axis_byte(radians.cos() * mag);
        let y = 255 - axis_byte(radians.sin() * mag);
        Self { x, y }
    }

    /// Same as `from_angle` with the angle in degrees
    pub fn from_degrees(degrees: f64, magnitude: f64) -> Self {
        Self::from_angle(degrees.to_radians(), magnitude)
    }

    /// Full tilt in one of the eight compass directions, `step` counting
    /// counter-clockwise from right in eighths of a turn
    pub fn compass(step: u8) -> Self {
        Self::from_angle(f64::from(step % 8) / 8.0 * TAU, 1.0)
    }

    pub fn right() -> Self {
        Self::compass(0)
    }

    pub fn up_right() -> Self {
        Self::compass(1)
    }

    pub fn up() -> Self {
        Self::compass(2)
    }

    pub fn up_left() -> Self {
        Self::compass(3)
    }

    pub fn left() -> Self {
        Self::compass(4)
    }

    pub fn down_left() -> Self {
        Self::compass(5)
    }

    pub fn down() -> Self {
        Self::compass(6)
    }

    pub fn down_right() -> Self {
        Self::compass(7)
    }

    /// Whether the stick is at rest
    pub fn is_centered(&self) -> bool {
        *self == Self::CENTER
    }
}

impl Default for StickPosition {
    fn default() -> Self {
        Self::CENTER
    }
}

/// ceil(127.5 * v + 127.5) for v in [-1, 1]
fn axis_byte(v: f64) -> u8 {
    (127.5 * v + 127.5).ceil().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected(radians: f64, mag: f64) -> (u8, u8) {
        let x = (127.5 * radians.cos() * mag + 127.5).ceil() as u8;
        let y = 255 - (127.5 * radians.sin() * mag + 127.5).ceil() as u8;
        (x, y)
    }

    #[test]
    fn test_zero_magnitude_is_centered() {
        for step in 0..16 {
            let angle = f64::from(step) * 0.7;
            assert_eq!(StickPosition::from_angle(angle, 0.0), StickPosition::CENTER);
            assert_eq!(StickPosition::from_angle(angle, -3.0), StickPosition::CENTER);
        }
    }

    #[test]
    fn test_matches_formula() {
        for step in 0..32 {
            let angle = f64::from(step) * TAU / 32.0;
            for mag in [0.25, 0.5, 0.75, 1.0] {
                let pos = StickPosition::from_angle(angle, mag);
                assert_eq!((pos.x, pos.y), expected(angle, mag), "angle={} mag={}", angle, mag);
            }
        }
    }

    #[test]
    fn test_magnitude_is_clamped() {
        assert_eq!(
            StickPosition::from_angle(1.0, 4.0),
            StickPosition::from_angle(1.0, 1.0)
        );
    }

    #[test]
    fn test_compass_extremes() {
        assert_eq!(StickPosition::right(), StickPosition::from_raw(255, 127));
        assert_eq!(StickPosition::up(), StickPosition::from_raw(128, 0));
        assert_eq!(StickPosition::left(), StickPosition::from_raw(0, 127));
        assert_eq!(StickPosition::down(), StickPosition::from_raw(128, 255));
        assert_eq!(StickPosition::from_degrees(90.0, 1.0), StickPosition::up());
    }
}
