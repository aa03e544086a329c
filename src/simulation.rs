//! In-process stand-in for the game client.
//!
//! [`SimulatedCamera`] implements both host traits. It integrates camera
//! motion lazily: every read or key event first advances the raw yaw/pitch by
//! the time elapsed while keys were held, so no background thread is needed.
//! Raw values use the host's units and go through the same conversions a real
//! client adapter would use.

use std::collections::HashSet;
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::Result;
use crate::host::{InputDriver, Key, OrientationReader};
use crate::math::{pitch_from_raw, yaw_from_raw};
use crate::settings::ControllerSettings;

/// A key transition observed by the simulated client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEvent {
    pub key: Key,
    pub pressed: bool,
    /// Yaw in degrees when the event arrived
    pub yaw: i32,
    /// Normalised pitch when the event arrived
    pub pitch: f64,
}

struct SimState {
    raw_yaw: f64,
    raw_pitch: f64,
    held: HashSet<Key>,
    events: Vec<KeyEvent>,
    conflicts: usize,
    last_update: Instant,
}

/// Simulated camera that rotates while directional keys are held.
pub struct SimulatedCamera {
    raw_yaw_max: i32,
    raw_pitch_min: f64,
    raw_pitch_max: f64,
    /// Degrees per second while left/right is held
    yaw_speed: f64,
    /// Normalised units per second while forward/back is held
    pitch_speed: f64,
    state: Mutex<SimState>,
}

impl SimulatedCamera {
    pub const DEFAULT_YAW_SPEED: f64 = 120.0;
    pub const DEFAULT_PITCH_SPEED: f64 = 0.5;

    /// Start at `yaw` degrees and normalised `pitch`, using the host ranges
    /// from `settings`.
    pub fn new(settings: &ControllerSettings, yaw: i32, pitch: f64) -> Result<Self> {
        settings.validate()?;
        let camera = Self {
            raw_yaw_max: settings.raw_yaw_max,
            raw_pitch_min: settings.raw_pitch_min,
            raw_pitch_max: settings.raw_pitch_max,
            yaw_speed: Self::DEFAULT_YAW_SPEED,
            pitch_speed: Self::DEFAULT_PITCH_SPEED,
            state: Mutex::new(SimState {
                raw_yaw: 0.0,
                raw_pitch: settings.raw_pitch_min,
                held: HashSet::new(),
                events: Vec::new(),
                conflicts: 0,
                last_update: Instant::now(),
            }),
        };
        camera.set_orientation(yaw, pitch);
        Ok(camera)
    }

    pub fn with_speeds(mut self, yaw_degrees_per_sec: f64, pitch_per_sec: f64) -> Self {
        self.yaw_speed = yaw_degrees_per_sec;
        self.pitch_speed = pitch_per_sec;
        self
    }

    /// Move the camera directly, as the client itself might.
    pub fn set_orientation(&self, yaw: i32, pitch: f64) {
        let mut state = self.state.lock();
        self.advance(&mut state);
        // Round up so reading back yields the same whole degree.
        state.raw_yaw = self.degrees_to_raw(f64::from(yaw)).ceil() % f64::from(self.raw_yaw_max);
        state.raw_pitch = self.pitch_to_raw(pitch);
    }

    pub fn held_keys(&self) -> Vec<Key> {
        self.state.lock().held.iter().copied().collect()
    }

    pub fn key_events(&self) -> Vec<KeyEvent> {
        self.state.lock().events.clone()
    }

    /// Number of presses that arrived while the opposite key was held.
    pub fn opposing_conflicts(&self) -> usize {
        self.state.lock().conflicts
    }

    fn degrees_to_raw(&self, degrees: f64) -> f64 {
        let max = f64::from(self.raw_yaw_max);
        (degrees / 360.0 * max).rem_euclid(max)
    }

    fn pitch_to_raw(&self, pitch: f64) -> f64 {
        let span = self.raw_pitch_max - self.raw_pitch_min;
        let raw = self.raw_pitch_min + pitch.clamp(0.0, 1.0) * span;
        raw.clamp(self.raw_pitch_min, self.raw_pitch_max)
    }

    /// Apply motion for the time since the last update.
    fn advance(&self, state: &mut SimState) {
        let now = Instant::now();
        let dt = now.duration_since(state.last_update).as_secs_f64();
        state.last_update = now;

        let mut yaw_dir = 0.0;
        let mut pitch_dir = 0.0;
        for key in &state.held {
            match key {
                Key::Left => yaw_dir += 1.0,
                Key::Right => yaw_dir -= 1.0,
                Key::Forward => pitch_dir += 1.0,
                Key::Back => pitch_dir -= 1.0,
            }
        }

        let yaw_delta = self.degrees_to_raw(yaw_dir * self.yaw_speed * dt);
        let raw_max = f64::from(self.raw_yaw_max);
        state.raw_yaw = (state.raw_yaw + yaw_delta).rem_euclid(raw_max);

        let pitch_span = self.raw_pitch_max - self.raw_pitch_min;
        state.raw_pitch = (state.raw_pitch + pitch_dir * self.pitch_speed * dt * pitch_span)
            .clamp(self.raw_pitch_min, self.raw_pitch_max);
    }

    fn read_yaw(&self, state: &SimState) -> i32 {
        yaw_from_raw(state.raw_yaw.floor() as i32, self.raw_yaw_max).unwrap_or_default()
    }

    fn read_pitch(&self, state: &SimState) -> f64 {
        pitch_from_raw(state.raw_pitch, self.raw_pitch_min, self.raw_pitch_max).unwrap_or_default()
    }

    fn record(&self, state: &mut SimState, key: Key, pressed: bool) {
        let event = KeyEvent {
            key,
            pressed,
            yaw: self.read_yaw(state),
            pitch: self.read_pitch(state),
        };
        state.events.push(event);
    }
}

impl OrientationReader for SimulatedCamera {
    fn yaw(&self) -> i32 {
        let mut state = self.state.lock();
        self.advance(&mut state);
        self.read_yaw(&state)
    }

    fn pitch(&self) -> f64 {
        let mut state = self.state.lock();
        self.advance(&mut state);
        self.read_pitch(&state)
    }
}

impl InputDriver for SimulatedCamera {
    fn press_key(&self, key: Key) {
        let mut state = self.state.lock();
        self.advance(&mut state);
        if state.held.contains(&key.opposite()) {
            state.conflicts += 1;
            tracing::warn!("{} pressed while {} is held", key, key.opposite());
        }
        state.held.insert(key);
        self.record(&mut state, key, true);
    }

    fn release_key(&self, key: Key) {
        let mut state = self.state.lock();
        self.advance(&mut state);
        state.held.remove(&key);
        self.record(&mut state, key, false);
    }
}
