use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camera_steer::math::angle_difference;
use camera_steer::{
    Axis, AxisOutcome, AxisPhase, CameraController, CameraError, ControllerSettings, DelaySpec,
    InputDriver, Key, OrientationReader, SimulatedCamera, TaskScheduler, TurnRequest, WorldPoint,
};
use parking_lot::Mutex;

const TIMEOUT: Duration = Duration::from_secs(10);

fn fast_settings() -> ControllerSettings {
    ControllerSettings {
        poll_delay: DelaySpec::new(3, 2, 5),
        ..Default::default()
    }
}

/// Reader that replays a fixed sequence of readings, repeating the last one,
/// and records every key event alongside how many readings had been taken.
struct ScriptedCamera {
    yaws: Vec<i32>,
    pitches: Vec<f64>,
    /// Yaw read (1-based) on which the reader panics
    panic_on_yaw_read: Option<usize>,
    yaw_reads: AtomicUsize,
    pitch_reads: AtomicUsize,
    events: Mutex<Vec<(Key, bool, usize)>>,
}

impl ScriptedCamera {
    fn new(yaws: Vec<i32>, pitches: Vec<f64>) -> Arc<Self> {
        Self::build(yaws, pitches, None)
    }

    fn panicking(yaws: Vec<i32>, pitches: Vec<f64>, on_read: usize) -> Arc<Self> {
        Self::build(yaws, pitches, Some(on_read))
    }

    fn build(yaws: Vec<i32>, pitches: Vec<f64>, panic_on_yaw_read: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            yaws,
            pitches,
            panic_on_yaw_read,
            yaw_reads: AtomicUsize::new(0),
            pitch_reads: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        })
    }

    fn events(&self) -> Vec<(Key, bool, usize)> {
        self.events.lock().clone()
    }

    fn record(&self, key: Key, pressed: bool) {
        let reads = match key {
            Key::Left | Key::Right => self.yaw_reads.load(Ordering::SeqCst),
            Key::Forward | Key::Back => self.pitch_reads.load(Ordering::SeqCst),
        };
        self.events.lock().push((key, pressed, reads));
    }
}

impl OrientationReader for ScriptedCamera {
    fn yaw(&self) -> i32 {
        let i = self.yaw_reads.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_yaw_read == Some(i + 1) {
            panic!("client disconnected while reading yaw");
        }
        self.yaws[i.min(self.yaws.len() - 1)]
    }

    fn pitch(&self) -> f64 {
        let i = self.pitch_reads.fetch_add(1, Ordering::SeqCst);
        self.pitches[i.min(self.pitches.len() - 1)]
    }
}

impl InputDriver for ScriptedCamera {
    fn press_key(&self, key: Key) {
        self.record(key, true);
    }

    fn release_key(&self, key: Key) {
        self.record(key, false);
    }
}

fn controller_for<C>(camera: &Arc<C>) -> (CameraController, Arc<TaskScheduler>)
where
    C: OrientationReader + InputDriver + 'static,
{
    let scheduler = Arc::new(TaskScheduler::started(2).unwrap());
    let controller = CameraController::new(
        camera.clone(),
        camera.clone(),
        Arc::clone(&scheduler),
        fast_settings(),
    )
    .unwrap();
    (controller, scheduler)
}

fn simulated(yaw: i32, pitch: f64) -> Arc<SimulatedCamera> {
    Arc::new(
        SimulatedCamera::new(&fast_settings(), yaw, pitch)
            .unwrap()
            .with_speeds(360.0, 1.0),
    )
}

/// Shortest angular distance between two yaws.
fn yaw_error(yaw: i32, target: i32) -> i32 {
    let d = angle_difference(yaw, target);
    d.min(360 - d)
}

fn wait_for_phase(controller: &CameraController, axis: Axis, phase: AxisPhase) {
    let deadline = Instant::now() + TIMEOUT;
    while controller.phase(axis) != phase {
        assert!(Instant::now() < deadline, "{:?} never reached {:?}", axis, phase);
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_yaw_releases_on_entering_tolerance() {
    // 0.015 of a turn is 5.4 degrees: 14 is still outside, 15 is inside.
    let camera = ScriptedCamera::new((10..=30).collect(), vec![0.5]);
    let (controller, _scheduler) = controller_for(&camera);

    let turn = controller.turn_to_tracked(TurnRequest::yaw(20)).unwrap();
    let report = turn.wait();
    assert_eq!(report.yaw, Some(AxisOutcome::Converged { polls: 5 }));
    assert_eq!(report.pitch, None);

    let events = camera.events();
    assert_eq!(events, vec![(Key::Left, true, 1), (Key::Left, false, 6)]);
    assert_eq!(controller.phase(Axis::Yaw), AxisPhase::Converged);
}

#[test]
fn test_invalid_targets_press_nothing() {
    let camera = ScriptedCamera::new(vec![10], vec![0.5]);
    let (controller, _scheduler) = controller_for(&camera);

    assert!(matches!(controller.turn_to_yaw(361), Err(CameraError::InvalidArgument(_))));
    assert!(matches!(controller.turn_to_yaw(-1), Err(CameraError::InvalidArgument(_))));
    assert!(matches!(controller.turn_to_pitch(1.5), Err(CameraError::InvalidArgument(_))));
    assert!(matches!(
        controller.turn_to_tracked(TurnRequest::default()),
        Err(CameraError::InvalidArgument(_))
    ));

    controller.stop();
    assert!(camera.events().is_empty());
    assert_eq!(camera.yaw_reads.load(Ordering::SeqCst), 0);
}

#[test]
fn test_aligned_axis_presses_nothing() {
    let camera = ScriptedCamera::new(vec![18], vec![0.505]);
    let (controller, _scheduler) = controller_for(&camera);

    let report = controller
        .turn_to_tracked(TurnRequest::both(20, 0.5))
        .unwrap()
        .wait();
    assert_eq!(report.yaw, Some(AxisOutcome::Aligned));
    assert_eq!(report.pitch, Some(AxisOutcome::Aligned));
    assert!(camera.events().is_empty());
}

#[test]
fn test_pitch_stops_after_crossing_target() {
    let camera = ScriptedCamera::new(vec![0], vec![0.2, 0.3, 0.45, 0.62, 0.7]);
    let (controller, _scheduler) = controller_for(&camera);

    let report = controller
        .turn_to_tracked(TurnRequest::pitch(0.5))
        .unwrap()
        .wait();
    assert_eq!(report.pitch, Some(AxisOutcome::Converged { polls: 3 }));
    assert_eq!(
        camera.events(),
        vec![(Key::Forward, true, 1), (Key::Forward, false, 4)]
    );
}

#[test]
fn test_pitch_down_uses_back_key() {
    let camera = ScriptedCamera::new(vec![0], vec![0.9, 0.7, 0.505]);
    let (controller, _scheduler) = controller_for(&camera);

    let report = controller
        .turn_to_tracked(TurnRequest::pitch(0.5))
        .unwrap()
        .wait();
    assert_eq!(report.pitch, Some(AxisOutcome::Converged { polls: 2 }));
    let events = camera.events();
    assert_eq!(events[0].0, Key::Back);
    assert!(events[0].1);
}

#[test]
fn test_cancel_all_releases_held_key() {
    // Stuck camera: the loop never converges on its own.
    let camera = ScriptedCamera::new(vec![10], vec![0.5]);
    let (controller, _scheduler) = controller_for(&camera);

    let turn = controller.turn_to_tracked(TurnRequest::yaw(200)).unwrap();
    wait_for_phase(&controller, Axis::Yaw, AxisPhase::Correcting);
    controller.cancel_all();

    assert!(turn.wait_timeout(TIMEOUT));
    assert_eq!(turn.wait().yaw, Some(AxisOutcome::Cancelled));
    assert_eq!(controller.phase(Axis::Yaw), AxisPhase::Idle);

    let events = camera.events();
    assert_eq!(events.len(), 2);
    assert_eq!((events[0].0, events[0].1), (Key::Right, true));
    assert_eq!((events[1].0, events[1].1), (Key::Right, false));
}

#[test]
fn test_new_turn_replaces_running_axis_task() {
    let camera = ScriptedCamera::new(vec![10], vec![0.5]);
    let (controller, _scheduler) = controller_for(&camera);

    let first = controller.turn_to_tracked(TurnRequest::yaw(200)).unwrap();
    wait_for_phase(&controller, Axis::Yaw, AxisPhase::Correcting);
    let second = controller.turn_to_tracked(TurnRequest::yaw(12)).unwrap();

    assert_eq!(first.wait().yaw, Some(AxisOutcome::Cancelled));
    assert_eq!(second.wait().yaw, Some(AxisOutcome::Aligned));

    // The first key went up before anything else happened.
    let events = camera.events();
    assert_eq!(events.len(), 2);
    assert!(!events[1].1);
}

#[test]
fn test_stop_releases_keys_and_rejects_turns() {
    let camera = ScriptedCamera::new(vec![10], vec![0.1]);
    let (controller, scheduler) = controller_for(&camera);

    let turn = controller
        .turn_to_tracked(TurnRequest::both(200, 0.9))
        .unwrap();
    wait_for_phase(&controller, Axis::Yaw, AxisPhase::Correcting);
    wait_for_phase(&controller, Axis::Pitch, AxisPhase::Correcting);

    controller.stop();
    assert!(turn.is_finished());
    let presses = camera.events().iter().filter(|e| e.1).count();
    let releases = camera.events().iter().filter(|e| !e.1).count();
    assert_eq!(presses, 2);
    assert_eq!(releases, 2);

    assert!(matches!(controller.turn_to_yaw(90), Err(CameraError::SchedulerStopped)));
    assert!(scheduler.is_running());
}

#[test]
fn test_unstarted_scheduler_rejects_turns() {
    let camera = ScriptedCamera::new(vec![10], vec![0.5]);
    let scheduler = Arc::new(TaskScheduler::new(2));
    let controller =
        CameraController::new(camera.clone(), camera.clone(), scheduler, fast_settings()).unwrap();

    assert!(matches!(controller.turn_to_yaw(90), Err(CameraError::SchedulerStopped)));
    assert!(camera.events().is_empty());
}

#[test]
fn test_simulated_yaw_converges() {
    let camera = simulated(0, 0.5);
    let (controller, _scheduler) = controller_for(&camera);

    let report = controller
        .turn_to_tracked(TurnRequest::yaw(90))
        .unwrap()
        .wait();
    assert!(matches!(report.yaw, Some(AxisOutcome::Converged { .. })));

    let (yaw, _) = controller.orientation();
    assert!(yaw_error(yaw, 90) <= 6, "final yaw {}", yaw);
    assert!(camera.held_keys().is_empty());
}

#[test]
fn test_simulated_axes_turn_concurrently() {
    let camera = simulated(0, 0.2);
    let (controller, _scheduler) = controller_for(&camera);

    let turn = controller
        .turn_to_tracked(TurnRequest::both(60, 0.8))
        .unwrap();
    assert!(turn.wait_timeout(TIMEOUT));
    let report = turn.wait();
    assert!(matches!(report.yaw, Some(AxisOutcome::Converged { .. })));
    assert!(matches!(report.pitch, Some(AxisOutcome::Converged { .. })));

    // Both keys were down together at some point.
    let events = camera.key_events();
    let first_release = events.iter().position(|e| !e.pressed).unwrap();
    let early_presses: Vec<Key> = events[..first_release].iter().map(|e| e.key).collect();
    assert!(early_presses.contains(&Key::Left));
    assert!(early_presses.contains(&Key::Forward));

    let (yaw, pitch) = controller.orientation();
    assert!(yaw_error(yaw, 60) <= 6, "final yaw {}", yaw);
    assert!(pitch >= 0.79, "final pitch {}", pitch);
    assert_eq!(camera.opposing_conflicts(), 0);
}

#[test]
fn test_reversing_turn_never_holds_opposing_keys() {
    // From 90, yaw 0 is a right turn and yaw 180 a left turn. Default speed
    // keeps the first turn running well past the second request.
    let camera = Arc::new(SimulatedCamera::new(&fast_settings(), 90, 0.5).unwrap());
    let (controller, _scheduler) = controller_for(&camera);

    let first = controller.turn_to_tracked(TurnRequest::yaw(0)).unwrap();
    wait_for_phase(&controller, Axis::Yaw, AxisPhase::Correcting);
    let second = controller.turn_to_tracked(TurnRequest::yaw(180)).unwrap();

    assert!(first.wait_timeout(TIMEOUT));
    assert!(second.wait_timeout(TIMEOUT));
    assert!(matches!(
        second.wait().yaw,
        Some(AxisOutcome::Converged { .. })
    ));

    let events = camera.key_events();
    let right_down = events.iter().position(|e| e.key == Key::Right && e.pressed);
    let right_up = events.iter().position(|e| e.key == Key::Right && !e.pressed);
    let left_down = events.iter().position(|e| e.key == Key::Left && e.pressed);
    let (right_down, right_up, left_down) = (
        right_down.unwrap(),
        right_up.unwrap(),
        left_down.unwrap(),
    );
    assert!(right_down < right_up && right_up < left_down, "{:?}", events);

    assert_eq!(camera.opposing_conflicts(), 0);
    assert!(camera.held_keys().is_empty());
}

#[test]
fn test_repeated_retargeting_settles() {
    let camera = simulated(0, 0.5);
    let (controller, _scheduler) = controller_for(&camera);

    controller.turn_to(90, 0.8).unwrap();
    controller.turn_to(270, 0.2).unwrap();
    controller.turn_to_yaw(300).unwrap();
    let last = controller.turn_to_tracked(TurnRequest::yaw(45)).unwrap();

    assert!(last.wait_timeout(TIMEOUT));
    assert!(matches!(
        last.wait().yaw,
        Some(AxisOutcome::Converged { .. }) | Some(AxisOutcome::Aligned)
    ));
    controller.stop();
    assert_eq!(camera.opposing_conflicts(), 0);
    assert!(camera.held_keys().is_empty());
}

#[test]
fn test_panicking_reader_fails_axis_and_resets_phase() {
    let camera = ScriptedCamera::panicking(vec![10], vec![0.5], 3);
    let (controller, _scheduler) = controller_for(&camera);

    let turn = controller.turn_to_tracked(TurnRequest::yaw(200)).unwrap();
    assert!(turn.wait_timeout(TIMEOUT));
    assert_eq!(
        turn.wait().yaw,
        Some(AxisOutcome::Failed("panicked".to_string()))
    );
    assert_eq!(controller.phase(Axis::Yaw), AxisPhase::Idle);

    let events = camera.events();
    assert_eq!(events, vec![(Key::Right, true, 1), (Key::Right, false, 3)]);

    // The axis worker survives and takes the next turn.
    let next = controller.turn_to_tracked(TurnRequest::yaw(12)).unwrap();
    assert_eq!(next.wait().yaw, Some(AxisOutcome::Aligned));
}

#[test]
fn test_face_turns_to_bearing() {
    let camera = simulated(0, 0.5);
    let (controller, _scheduler) = controller_for(&camera);

    // East of the origin.
    let yaw = controller
        .face(WorldPoint::new(0, 0), WorldPoint::new(10, 0))
        .unwrap();
    assert_eq!(yaw, 270);

    wait_for_phase(&controller, Axis::Yaw, AxisPhase::Converged);
    let (current, _) = controller.orientation();
    assert!(yaw_error(current, 270) <= 6, "final yaw {}", current);
}

#[test]
fn test_custom_tolerance_is_floored() {
    // With a tolerance below the floor the default window still applies.
    let camera = ScriptedCamera::new((10..=30).collect(), vec![0.5]);
    let (controller, _scheduler) = controller_for(&camera);

    let report = controller
        .turn_to_tracked(TurnRequest::yaw(20).with_yaw_tolerance(0.0001))
        .unwrap()
        .wait();
    assert_eq!(report.yaw, Some(AxisOutcome::Converged { polls: 5 }));
}

#[test]
fn test_wider_tolerance_releases_earlier() {
    // 0.05 of a turn is 18 degrees: a reading of 11 is still outside for
    // target 30, 12 is inside.
    let camera = ScriptedCamera::new((10..=40).collect(), vec![0.5]);
    let (controller, _scheduler) = controller_for(&camera);

    let report = controller
        .turn_to_tracked(TurnRequest::yaw(30).with_yaw_tolerance(0.05))
        .unwrap()
        .wait();
    assert_eq!(report.yaw, Some(AxisOutcome::Converged { polls: 2 }));
}
