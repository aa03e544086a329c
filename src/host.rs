//! Interfaces to the game client the controller steers.
//!
//! The controller never talks to the client directly; it reads orientation
//! through [`OrientationReader`] and drives the camera through
//! [`InputDriver`], both injected at construction.

use std::fmt;

/// Directional keys the camera responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Tilts the camera up
    Forward,
    /// Tilts the camera down
    Back,
    /// Rotates the camera left
    Left,
    /// Rotates the camera right
    Right,
}

impl Key {
    pub const ALL: [Key; 4] = [Key::Forward, Key::Back, Key::Left, Key::Right];

    /// AWT virtual key code dispatched to the client canvas.
    pub fn key_code(&self) -> u16 {
        match self {
            Key::Left => 37,
            Key::Forward => 38,
            Key::Right => 39,
            Key::Back => 40,
        }
    }

    /// The key that moves the same axis the other way.
    pub fn opposite(&self) -> Key {
        match self {
            Key::Forward => Key::Back,
            Key::Back => Key::Forward,
            Key::Left => Key::Right,
            Key::Right => Key::Left,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Key::Forward => "KEY_W",
            Key::Back => "KEY_S",
            Key::Left => "KEY_A",
            Key::Right => "KEY_D",
        };
        f.write_str(name)
    }
}

/// Live camera orientation. Implementations must return fresh values on every
/// call; the host moves the camera asynchronously.
pub trait OrientationReader: Send + Sync {
    /// Current yaw in whole degrees, `[0, 360)`.
    fn yaw(&self) -> i32;
    /// Current pitch normalised to `[0, 1]`.
    fn pitch(&self) -> f64;
}

/// Synthetic key events delivered to the client.
pub trait InputDriver: Send + Sync {
    fn press_key(&self, key: Key);
    fn release_key(&self, key: Key);
}

/// A key held down for as long as this guard lives.
///
/// Dropping the guard releases the key, which covers early returns, `?`
/// propagation and unwinding alike.
pub struct KeyHold<'a> {
    driver: &'a dyn InputDriver,
    key: Key,
}

impl<'a> KeyHold<'a> {
    pub fn press(driver: &'a dyn InputDriver, key: Key) -> Self {
        driver.press_key(key);
        Self { driver, key }
    }

    pub fn key(&self) -> Key {
        self.key
    }
}

impl Drop for KeyHold<'_> {
    fn drop(&mut self) {
        self.driver.release_key(self.key);
    }
}
