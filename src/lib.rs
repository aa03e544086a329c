//! Camera Steer Library
//!
//! Keyboard-driven camera orientation for a game client. Yaw and pitch are
//! corrected by two concurrent loops that hold a directional key, poll the
//! client's reported orientation on a gaussian-jittered timer, and release the
//! key once the axis is inside tolerance.

pub mod cancel;
pub mod controller;
pub mod error;
pub mod host;
pub mod math;
pub mod random;
pub mod scheduler;
pub mod settings;
pub mod simulation;
pub mod telemetry;

pub use cancel::CancellationToken;
pub use controller::{
    Axis, AxisOutcome, AxisPhase, CameraController, TurnHandle, TurnReport, TurnRequest,
};
pub use error::{CameraError, Result};
pub use host::{InputDriver, Key, KeyHold, OrientationReader};
pub use math::WorldPoint;
pub use random::DelaySpec;
pub use scheduler::{TaskHandle, TaskScheduler};
pub use settings::{ControllerSettings, SettingsError};
pub use simulation::{KeyEvent, SimulatedCamera};
pub use telemetry::{init_logging, LogConfig};
