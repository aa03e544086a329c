//! Camera Steer - simulator entry point
//!
//! Runs the controller against a simulated client: the camera starts at
//! `--start-yaw`/`--start-pitch`, is turned to `--yaw`/`--pitch`, and the final
//! orientation and per-axis outcomes are logged.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use camera_steer::telemetry::{init_logging, LogConfig};
use camera_steer::{
    CameraController, ControllerSettings, SimulatedCamera, TaskScheduler, TurnRequest,
};

/// Give up waiting on a turn after this long.
const TURN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "camera-steer")]
#[command(about = "Turn a simulated game camera with virtual key presses")]
struct Args {
    /// Target yaw in degrees (0-360)
    #[arg(long)]
    yaw: Option<i32>,

    /// Target pitch, normalised (0.0-1.0)
    #[arg(long)]
    pitch: Option<f64>,

    /// Starting yaw of the simulated camera
    #[arg(long, default_value = "0")]
    start_yaw: i32,

    /// Starting pitch of the simulated camera
    #[arg(long, default_value = "0.5")]
    start_pitch: f64,

    /// Settings XML file (defaults to the user config directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_config = LogConfig {
        json_format: args.json_logs,
        log_file: args.log_file.clone(),
        ..Default::default()
    };
    let _log_guard = init_logging(&log_config)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let settings = match &args.settings {
        Some(path) => ControllerSettings::load_from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => ControllerSettings::load_default(),
    };

    let request = TurnRequest {
        yaw: args.yaw,
        pitch: args.pitch,
        ..Default::default()
    };
    if request.yaw.is_none() && request.pitch.is_none() {
        bail!("nothing to do: pass --yaw and/or --pitch");
    }

    let scheduler = Arc::new(TaskScheduler::started(settings.axis_workers)?);
    let camera = Arc::new(SimulatedCamera::new(&settings, args.start_yaw, args.start_pitch)?);
    let controller = CameraController::new(
        camera.clone(),
        camera.clone(),
        Arc::clone(&scheduler),
        settings,
    )?;

    let (yaw, pitch) = controller.orientation();
    tracing::info!(yaw, pitch, "Simulated camera ready");

    let turn = controller.turn_to_tracked(request)?;
    if !turn.wait_timeout(TURN_TIMEOUT) {
        tracing::warn!("Turn did not finish within {:?}, cancelling", TURN_TIMEOUT);
        controller.cancel_all();
    }
    let report = turn.wait();

    let (yaw, pitch) = controller.orientation();
    tracing::info!(
        yaw,
        pitch,
        yaw_outcome = ?report.yaw,
        pitch_outcome = ?report.pitch,
        "Turn finished"
    );

    controller.stop();
    scheduler.stop();
    Ok(())
}
