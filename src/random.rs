//! Bounded random values for input timing.
//!
//! Every wait in the axis loops is drawn from a normal distribution clipped by
//! rejection sampling, so no value piles up at the bounds.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CameraError, Result};

/// Uniform integer in `[min, max)`, or `min` when the range is empty.
pub fn uniform_int<R: Rng + ?Sized>(rng: &mut R, min: i32, max: i32) -> Result<i32> {
    if min == max {
        return Ok(min);
    }
    if min > max {
        return Err(CameraError::invalid(format!(
            "minimum ({}) must not exceed maximum ({})",
            min, max
        )));
    }
    Ok(rng.random_range(min..max))
}

/// Draw from a normal distribution with the given mean and standard deviation.
///
/// Uses the Marsaglia polar method.
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    loop {
        let u = rng.random::<f64>() * 2.0 - 1.0;
        let v = rng.random::<f64>() * 2.0 - 1.0;
        let s = u * u + v * v;
        if s > 0.0 && s < 1.0 {
            let scale = (-2.0 * s.ln() / s).sqrt();
            return mean + u * scale * std_dev;
        }
    }
}

/// Gaussian integer no further than `max_deviation` from `mean`.
///
/// The standard deviation is half the allowed deviation, so roughly 95% of
/// first draws are accepted.
pub fn limited_gaussian_deviation<R: Rng + ?Sized>(
    rng: &mut R,
    mean: i32,
    max_deviation: i32,
) -> Result<i32> {
    if max_deviation < 0 {
        return Err(CameraError::invalid(format!(
            "maximum deviation must not be negative, got {}",
            max_deviation
        )));
    }

    let mean_f = f64::from(mean);
    let deviation = f64::from(max_deviation);
    let std_dev = deviation / 2.0;

    loop {
        let value = gaussian(rng, mean_f, std_dev);
        if value >= mean_f - deviation && value <= mean_f + deviation {
            return Ok(value as i32);
        }
    }
}

/// Gaussian integer centred on `mean` and confined to `[min, max]`.
pub fn limited_gaussian<R: Rng + ?Sized>(
    rng: &mut R,
    mean: i32,
    min: i32,
    max: i32,
) -> Result<i32> {
    check_bounds(mean, min, max)?;

    // Spread in f64: the i32 difference overflows for wide ranges.
    let (mean, lo, hi) = (f64::from(mean), f64::from(min), f64::from(max));
    let std_dev = (mean - lo).max(hi - mean) / 2.0;

    loop {
        let value = gaussian(rng, mean, std_dev);
        if value >= lo && value <= hi {
            return Ok(value as i32);
        }
    }
}

fn check_bounds(mean: i32, min: i32, max: i32) -> Result<()> {
    if min >= max {
        return Err(CameraError::invalid(format!(
            "minimum ({}) must be less than maximum ({})",
            min, max
        )));
    }
    if mean < min || mean > max {
        return Err(CameraError::invalid(format!(
            "mean ({}) must lie within [{}, {}]",
            mean, min, max
        )));
    }
    Ok(())
}

/// Bounded-gaussian delay, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelaySpec {
    #[serde(rename = "@mean")]
    pub mean: u32,
    #[serde(rename = "@min")]
    pub min: u32,
    #[serde(rename = "@max")]
    pub max: u32,
}

impl Default for DelaySpec {
    fn default() -> Self {
        Self::new(15, 10, 20)
    }
}

impl DelaySpec {
    pub fn new(mean: u32, min: u32, max: u32) -> Self {
        Self { mean, min, max }
    }

    /// Check the bounds can be sampled.
    pub fn validate(&self) -> Result<()> {
        let (mean, min, max) = self.as_i32()?;
        check_bounds(mean, min, max)
    }

    /// Draw one delay.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Duration> {
        let (mean, min, max) = self.as_i32()?;
        let millis = limited_gaussian(rng, mean, min, max)?;
        Ok(Duration::from_millis(u64::from(millis.max(0).unsigned_abs())))
    }

    fn as_i32(&self) -> Result<(i32, i32, i32)> {
        let convert = |v: u32| {
            i32::try_from(v)
                .map_err(|_| CameraError::invalid(format!("delay {}ms is too large", v)))
        };
        Ok((convert(self.mean)?, convert(self.min)?, convert(self.max)?))
    }
}
