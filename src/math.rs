//! Angle and range helpers used by the axis loops.
//!
//! Yaw is handled as whole degrees in `[0, 360)`; pitch as a normalised value
//! in `[0, 1]` derived from the host's raw pitch range.

use crate::error::{CameraError, Result};

/// A tile position in the host world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorldPoint {
    pub x: i32,
    pub y: i32,
}

impl WorldPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Scale `value` from `[min, max]` onto `[0, 1]`.
///
/// Values outside the range map outside `[0, 1]`; callers that need a clamped
/// result clamp themselves. An empty range is rejected instead of producing
/// NaN or infinity.
pub fn normalize(value: f64, min: f64, max: f64) -> Result<f64> {
    if !value.is_finite() || !min.is_finite() || !max.is_finite() {
        return Err(CameraError::invalid(format!(
            "normalize expects finite inputs (value {}, min {}, max {})",
            value, min, max
        )));
    }
    if max == min {
        return Err(CameraError::DivisionDegenerate(min));
    }
    Ok((value - min) / (max - min))
}

/// Clockwise distance in degrees from `start` to `target`, in `[0, 360)`.
pub fn angle_difference(start: i32, target: i32) -> i32 {
    // Widened so extreme inputs cannot overflow; the result always fits.
    (i64::from(target) - i64::from(start)).rem_euclid(360) as i32
}

/// Whether the short way from `start` to `target` is a left turn.
pub fn should_turn_left(start: i32, target: i32) -> bool {
    angle_difference(start, target) < 180
}

/// Camera yaw that faces `target` when standing on `origin`.
///
/// The host's yaw zero points north, so the mathematical angle is rotated by
/// a quarter turn before wrapping.
pub fn bearing_between(origin: WorldPoint, target: WorldPoint) -> i32 {
    let dx = f64::from(target.x - origin.x);
    let dy = f64::from(target.y - origin.y);
    let degrees = dy.atan2(dx).to_degrees() as i32 - 90;
    degrees.rem_euclid(360)
}

/// Round half-up (away from zero) to `places` decimal places.
///
/// Works on the shortest decimal representation of `value`, so `2.0005`
/// rounds to `2.001` even though its binary value sits just below the tie.
/// NaN and infinities are returned unchanged.
pub fn round(value: f64, places: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let repr = value.abs().to_string();
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    let places = places as usize;
    if frac_part.len() <= places {
        return value;
    }

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().take(places))
        .map(|b| b - b'0')
        .collect();

    if frac_part.as_bytes()[places] >= b'5' {
        let mut i = digits.len();
        loop {
            if i == 0 {
                digits.insert(0, 1);
                break;
            }
            i -= 1;
            if digits[i] == 9 {
                digits[i] = 0;
            } else {
                digits[i] += 1;
                break;
            }
        }
    }

    let int_len = digits.len() - places;
    let mut out = String::with_capacity(digits.len() + 1);
    out.extend(digits[..int_len].iter().map(|d| char::from(b'0' + d)));
    if places > 0 {
        out.push('.');
        out.extend(digits[int_len..].iter().map(|d| char::from(b'0' + d)));
    }

    let rounded: f64 = out.parse().unwrap_or_else(|_| value.abs());
    if value.is_sign_negative() {
        -rounded
    } else {
        rounded
    }
}

/// Convert the host's raw yaw units into whole degrees.
pub fn yaw_from_raw(raw: i32, raw_max: i32) -> Result<i32> {
    if raw_max <= 0 {
        return Err(CameraError::invalid(format!(
            "raw yaw range must be positive, got {}",
            raw_max
        )));
    }
    let degrees = (f64::from(raw) / f64::from(raw_max) * 360.0) as i32;
    Ok(degrees.rem_euclid(360))
}

/// Convert the host's raw pitch into a clamped value in `[0, 1]`, rounded to
/// three places.
pub fn pitch_from_raw(raw: f64, raw_min: f64, raw_max: f64) -> Result<f64> {
    let normalized = normalize(raw, raw_min, raw_max)?;
    Ok(round(normalized.clamp(0.0, 1.0), 3))
}
