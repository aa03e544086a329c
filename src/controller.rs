//! Two-axis camera controller.
//!
//! A turn request is validated on the caller's thread and handed to the
//! scheduler's orchestration worker. Orchestration replaces the task on each
//! requested axis: it cancels whatever loop is running there, waits for that
//! loop to finish (and so release its key), then queues the new loop on the
//! axis pool. Yaw and pitch loops run concurrently and converge independently.
//!
//! Each loop holds one directional key while it polls the host's orientation
//! on a jittered timer, and lets go as soon as the axis is inside tolerance.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::cancel::CancellationToken;
use crate::error::{CameraError, Result};
use crate::host::{InputDriver, Key, KeyHold, OrientationReader};
use crate::math::{angle_difference, bearing_between, should_turn_left, WorldPoint};
use crate::random::DelaySpec;
use crate::scheduler::{completion, AxisSpawner, Completer, TaskHandle, TaskScheduler};
use crate::settings::ControllerSettings;

/// One of the two independently controlled camera axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Yaw,
    Pitch,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Axis::Yaw => 0,
            Axis::Pitch => 1,
        }
    }
}

/// Where an axis is in its correction cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisPhase {
    /// No loop has run, or the last one was cancelled or failed
    #[default]
    Idle,
    /// A key is held and the loop is polling
    Correcting,
    /// The last loop finished inside tolerance
    Converged,
}

/// How an axis task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisOutcome {
    /// Already inside tolerance; no key was pressed
    Aligned,
    /// Reached tolerance after holding a key for `polls` orientation reads
    Converged { polls: u32 },
    /// Cancelled before converging; the key was released
    Cancelled,
    /// Stopped on an error; the key was released
    Failed(String),
}

/// Targets for a single turn. Unset axes are left alone.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TurnRequest {
    pub yaw: Option<i32>,
    pub pitch: Option<f64>,
    pub yaw_tolerance: Option<f64>,
    pub pitch_tolerance: Option<f64>,
}

impl TurnRequest {
    pub fn yaw(yaw: i32) -> Self {
        Self {
            yaw: Some(yaw),
            ..Default::default()
        }
    }

    pub fn pitch(pitch: f64) -> Self {
        Self {
            pitch: Some(pitch),
            ..Default::default()
        }
    }

    pub fn both(yaw: i32, pitch: f64) -> Self {
        Self {
            yaw: Some(yaw),
            pitch: Some(pitch),
            ..Default::default()
        }
    }

    pub fn with_yaw_tolerance(mut self, tolerance: f64) -> Self {
        self.yaw_tolerance = Some(tolerance);
        self
    }

    pub fn with_pitch_tolerance(mut self, tolerance: f64) -> Self {
        self.pitch_tolerance = Some(tolerance);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.yaw.is_none() && self.pitch.is_none() {
            return Err(CameraError::invalid("turn request has no target"));
        }
        if let Some(yaw) = self.yaw {
            if !(0..=360).contains(&yaw) {
                return Err(CameraError::invalid(format!(
                    "target yaw ({}) must be between 0 and 360",
                    yaw
                )));
            }
        }
        if let Some(pitch) = self.pitch {
            if !(0.0..=1.0).contains(&pitch) {
                return Err(CameraError::invalid(format!(
                    "target pitch ({}) must be between 0 and 1",
                    pitch
                )));
            }
        }
        Ok(())
    }
}

/// Final outcome of each axis in a tracked turn. `None` for axes that were
/// not requested or whose task never ran.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub yaw: Option<AxisOutcome>,
    pub pitch: Option<AxisOutcome>,
}

/// Completion handle for [`CameraController::turn_to_tracked`].
#[derive(Debug, Clone)]
pub struct TurnHandle {
    yaw: Option<TaskHandle<AxisOutcome>>,
    pitch: Option<TaskHandle<AxisOutcome>>,
}

impl TurnHandle {
    pub fn yaw(&self) -> Option<&TaskHandle<AxisOutcome>> {
        self.yaw.as_ref()
    }

    pub fn pitch(&self) -> Option<&TaskHandle<AxisOutcome>> {
        self.pitch.as_ref()
    }

    fn handles(&self) -> impl Iterator<Item = &TaskHandle<AxisOutcome>> {
        self.yaw.iter().chain(self.pitch.iter())
    }

    pub fn is_finished(&self) -> bool {
        self.handles().all(TaskHandle::is_finished)
    }

    /// Block until every requested axis has finished.
    pub fn wait(&self) -> TurnReport {
        TurnReport {
            yaw: self.yaw.as_ref().and_then(TaskHandle::wait),
            pitch: self.pitch.as_ref().and_then(TaskHandle::wait),
        }
    }

    /// Block for at most `timeout`; returns whether every axis finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.handles().all(|handle| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            handle.wait_timeout(remaining)
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum AxisTarget {
    Yaw { degrees: i32, tolerance: f64 },
    Pitch { value: f64, tolerance: f64 },
}

impl AxisTarget {
    fn axis(&self) -> Axis {
        match self {
            AxisTarget::Yaw { .. } => Axis::Yaw,
            AxisTarget::Pitch { .. } => Axis::Pitch,
        }
    }
}

/// An axis task waiting for orchestration.
struct AxisPlan {
    target: AxisTarget,
    completer: Completer<AxisOutcome>,
    handle: TaskHandle<AxisOutcome>,
}

/// The live task on one axis.
struct AxisSlot {
    token: CancellationToken,
    handle: TaskHandle<AxisOutcome>,
}

/// State shared between the controller and its background tasks.
struct Shared {
    reader: Arc<dyn OrientationReader>,
    driver: Arc<dyn InputDriver>,
    poll_delay: DelaySpec,
    slots: [Mutex<Option<AxisSlot>>; 2],
    phases: [Mutex<AxisPhase>; 2],
    closed: AtomicBool,
}

impl Shared {
    fn set_phase(&self, axis: Axis, phase: AxisPhase) {
        *self.phases[axis.index()].lock() = phase;
    }

    /// Runs on the orchestration worker, the only writer of axis slots.
    fn orchestrate(self: &Arc<Self>, spawner: &AxisSpawner, plans: Vec<AxisPlan>) {
        for plan in plans {
            let axis = plan.target.axis();
            let slot = &self.slots[axis.index()];

            let prior = slot.lock().take();
            if let Some(prior) = prior {
                prior.token.cancel();
                prior.handle.wait();
            }

            if self.closed.load(Ordering::SeqCst) {
                plan.completer.complete(AxisOutcome::Cancelled);
                continue;
            }

            let token = CancellationToken::new();
            *slot.lock() = Some(AxisSlot {
                token: token.clone(),
                handle: plan.handle,
            });
            // Pairs with the store in `CameraController::stop`: either this
            // sees the flag or `cancel_all` sees the slot.
            if self.closed.load(Ordering::SeqCst) {
                token.cancel();
            }

            let shared = Arc::clone(self);
            let target = plan.target;
            if let Err(e) = spawner.spawn(plan.completer, move || shared.run_axis(target, &token)) {
                tracing::warn!(?axis, "Could not queue axis task: {}", e);
            }
        }
    }

    fn run_axis(&self, target: AxisTarget, token: &CancellationToken) -> AxisOutcome {
        let axis = target.axis();
        // A panicking host unwinds through the key guard first, so the key
        // is already up when this returns.
        let result = panic::catch_unwind(AssertUnwindSafe(|| match target {
            AxisTarget::Yaw { degrees, tolerance } => self.run_yaw(degrees, tolerance, token),
            AxisTarget::Pitch { value, tolerance } => self.run_pitch(value, tolerance, token),
        }));

        match result {
            Ok(Ok(outcome)) => {
                self.set_phase(axis, AxisPhase::Converged);
                outcome
            }
            Ok(Err(CameraError::InterruptedWait)) => {
                tracing::info!(?axis, "Axis task cancelled, key released");
                self.set_phase(axis, AxisPhase::Idle);
                AxisOutcome::Cancelled
            }
            Ok(Err(e)) => {
                tracing::error!(?axis, "Axis task failed: {}", e);
                self.set_phase(axis, AxisPhase::Idle);
                AxisOutcome::Failed(e.to_string())
            }
            Err(_) => {
                tracing::error!(?axis, "Axis task panicked, key released");
                self.set_phase(axis, AxisPhase::Idle);
                AxisOutcome::Failed("panicked".to_string())
            }
        }
    }

    /// Hold left/right until the clockwise distance to `target` is within
    /// `360 * tolerance` degrees.
    fn run_yaw(
        &self,
        target: i32,
        tolerance: f64,
        token: &CancellationToken,
    ) -> Result<AxisOutcome> {
        token.check()?;

        let threshold = 360.0 * tolerance;
        let needs_turn = |yaw: i32| f64::from(angle_difference(yaw, target)) > threshold;

        let start = self.reader.yaw();
        if !needs_turn(start) {
            tracing::debug!(yaw = start, target, "Yaw already within tolerance");
            return Ok(AxisOutcome::Aligned);
        }

        let turn_left = should_turn_left(start, target);
        let key = if turn_left { Key::Left } else { Key::Right };
        tracing::info!(
            "Changing yaw to {}, turning {} by pressing {}",
            target,
            if turn_left { "left" } else { "right" },
            key
        );

        let hold = KeyHold::press(self.driver.as_ref(), key);
        self.set_phase(Axis::Yaw, AxisPhase::Correcting);
        self.poll_until(token, hold, || {
            let yaw = self.reader.yaw();
            tracing::debug!(yaw, target, "Yaw poll");
            (!needs_turn(yaw)).then(|| format!("yaw of {} (target {})", yaw, target))
        })
    }

    /// Hold up/down until pitch is within tolerance or has crossed the target.
    ///
    /// Stopping on the crossing, rather than on magnitude alone, keeps an
    /// overshoot from reversing direction.
    fn run_pitch(
        &self,
        target: f64,
        tolerance: f64,
        token: &CancellationToken,
    ) -> Result<AxisOutcome> {
        token.check()?;

        let start = self.reader.pitch();
        let going_up = target > start;
        let needs_turn = |pitch: f64| {
            let diff = target - pitch;
            diff.abs() >= tolerance && (diff > 0.0) == going_up
        };

        if !needs_turn(start) {
            tracing::debug!(pitch = start, target, "Pitch already within tolerance");
            return Ok(AxisOutcome::Aligned);
        }

        let key = if going_up { Key::Forward } else { Key::Back };
        tracing::info!(
            "Changing pitch to {:.3}, tilting {} by pressing {}",
            target,
            if going_up { "up" } else { "down" },
            key
        );

        let hold = KeyHold::press(self.driver.as_ref(), key);
        self.set_phase(Axis::Pitch, AxisPhase::Correcting);
        self.poll_until(token, hold, || {
            let pitch = self.reader.pitch();
            tracing::debug!(pitch, target, "Pitch poll");
            (!needs_turn(pitch))
                .then(|| format!("pitch of {:.3} (target {:.3})", pitch, target))
        })
    }

    /// Poll `reached` on the jittered delay until it reports arrival, then
    /// release the held key.
    fn poll_until<F>(
        &self,
        token: &CancellationToken,
        hold: KeyHold<'_>,
        mut reached: F,
    ) -> Result<AxisOutcome>
    where
        F: FnMut() -> Option<String>,
    {
        let mut rng = rand::rng();
        let mut polls = 0u32;
        loop {
            token.check()?;
            polls += 1;
            if let Some(arrival) = reached() {
                let key = hold.key();
                drop(hold);
                tracing::info!("Reached {}, released {}", arrival, key);
                return Ok(AxisOutcome::Converged { polls });
            }
            token.sleep(self.poll_delay.sample(&mut rng)?)?;
        }
    }
}

/// Drives the camera to requested orientations through injected host
/// interfaces and a shared [`TaskScheduler`].
pub struct CameraController {
    shared: Arc<Shared>,
    scheduler: Arc<TaskScheduler>,
    settings: ControllerSettings,
}

impl CameraController {
    /// Create a controller. The scheduler is shared and its lifecycle stays
    /// with the caller.
    pub fn new(
        reader: Arc<dyn OrientationReader>,
        driver: Arc<dyn InputDriver>,
        scheduler: Arc<TaskScheduler>,
        settings: ControllerSettings,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                reader,
                driver,
                poll_delay: settings.poll_delay,
                slots: Default::default(),
                phases: Default::default(),
                closed: AtomicBool::new(false),
            }),
            scheduler,
            settings,
        })
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Current `(yaw, pitch)` as reported by the host.
    pub fn orientation(&self) -> (i32, f64) {
        (self.shared.reader.yaw(), self.shared.reader.pitch())
    }

    pub fn phase(&self, axis: Axis) -> AxisPhase {
        *self.shared.phases[axis.index()].lock()
    }

    /// Turn to `yaw` degrees, leaving pitch alone.
    pub fn turn_to_yaw(&self, yaw: i32) -> Result<()> {
        self.turn_to_tracked(TurnRequest::yaw(yaw)).map(drop)
    }

    /// Turn to `yaw` degrees with a custom tolerance (clamped to the floor).
    pub fn turn_to_yaw_with_tolerance(&self, yaw: i32, tolerance: f64) -> Result<()> {
        self.turn_to_tracked(TurnRequest::yaw(yaw).with_yaw_tolerance(tolerance))
            .map(drop)
    }

    /// Tilt to normalised `pitch`, leaving yaw alone.
    pub fn turn_to_pitch(&self, pitch: f64) -> Result<()> {
        self.turn_to_tracked(TurnRequest::pitch(pitch)).map(drop)
    }

    /// Turn both axes at once.
    pub fn turn_to(&self, yaw: i32, pitch: f64) -> Result<()> {
        self.turn_to_tracked(TurnRequest::both(yaw, pitch)).map(drop)
    }

    /// Turn both axes with custom tolerances (each clamped to its floor).
    pub fn turn_to_with_tolerance(
        &self,
        yaw: i32,
        pitch: f64,
        yaw_tolerance: f64,
        pitch_tolerance: f64,
    ) -> Result<()> {
        let request = TurnRequest::both(yaw, pitch)
            .with_yaw_tolerance(yaw_tolerance)
            .with_pitch_tolerance(pitch_tolerance);
        self.turn_to_tracked(request).map(drop)
    }

    /// Turn so the camera faces `target` from `origin`. Returns the yaw turned to.
    pub fn face(&self, origin: WorldPoint, target: WorldPoint) -> Result<i32> {
        let yaw = bearing_between(origin, target);
        self.turn_to_yaw(yaw)?;
        Ok(yaw)
    }

    /// Queue a turn and return a handle that resolves as each axis finishes.
    ///
    /// Invalid targets are rejected here, before anything is queued or
    /// pressed. Errors inside the axis loops are reported through the handle
    /// and the log, never to this caller.
    pub fn turn_to_tracked(&self, request: TurnRequest) -> Result<TurnHandle> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(CameraError::SchedulerStopped);
        }
        if let Err(e) = request.validate() {
            tracing::warn!("Rejected camera turn: {}", e);
            return Err(e);
        }

        let spawner = self.scheduler.axis_spawner()?;
        let mut plans = Vec::with_capacity(2);
        let mut turn = TurnHandle {
            yaw: None,
            pitch: None,
        };

        if let Some(degrees) = request.yaw {
            let tolerance = self.settings.effective_yaw_tolerance(request.yaw_tolerance);
            let (completer, handle) = completion();
            turn.yaw = Some(handle.clone());
            plans.push(AxisPlan {
                target: AxisTarget::Yaw { degrees, tolerance },
                completer,
                handle,
            });
        }
        if let Some(value) = request.pitch {
            let tolerance = self.settings.effective_pitch_tolerance(request.pitch_tolerance);
            let (completer, handle) = completion();
            turn.pitch = Some(handle.clone());
            plans.push(AxisPlan {
                target: AxisTarget::Pitch { value, tolerance },
                completer,
                handle,
            });
        }

        tracing::debug!(yaw = ?request.yaw, pitch = ?request.pitch, "Queueing camera turn");
        let shared = Arc::clone(&self.shared);
        self.scheduler
            .submit(move || shared.orchestrate(&spawner, plans))?;
        Ok(turn)
    }

    /// Cancel every running axis task. Held keys are released by the tasks as
    /// they unwind.
    pub fn cancel_all(&self) {
        for slot in &self.shared.slots {
            if let Some(slot) = slot.lock().as_ref() {
                slot.token.cancel();
            }
        }
    }

    /// Refuse further turns, cancel in-flight tasks and wait for them to
    /// release their keys. The scheduler keeps running.
    pub fn stop(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Let already-queued orchestration finish so every slot it fills is
        // visible below.
        if let Ok(barrier) = self.scheduler.submit(|| ()) {
            barrier.wait();
        }

        self.cancel_all();
        let live: Vec<_> = self
            .shared
            .slots
            .iter()
            .filter_map(|slot| slot.lock().as_ref().map(|s| s.handle.clone()))
            .collect();
        for handle in live {
            handle.wait();
        }
        tracing::info!("Camera controller stopped");
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        self.stop();
    }
}
