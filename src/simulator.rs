use crate::constants::{MIN_SIMULATED_SPEED, SIMULATED_BASE_SPEED};
use crate::types::{PositionState, PtzVector};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct MotionSimulator {
    state: Arc<Mutex<PositionState>>,
    tick: Duration,
    // Lock order: `active` before `state`.
    active: Mutex<Option<CancellationToken>>,
}

impl MotionSimulator {
    pub fn new(state: Arc<Mutex<PositionState>>, tick: Duration) -> Self {
        Self {
            state,
            tick,
            active: Mutex::new(None),
        }
    }

    pub async fn snapshot(&self) -> PositionState {
        *self.state.lock().await
    }

    pub async fn is_moving(&self) -> bool {
        self.state.lock().await.moving
    }

    /// Interpolates toward `target` at `speed`. Returns `false` without
    /// doing anything when a motion is already in flight.
    pub async fn move_to(&self, target: PtzVector, speed: f64) -> bool {
        let target = target.clamped();
        let speed = if speed.is_finite() && speed > 0.0 {
            speed.max(MIN_SIMULATED_SPEED)
        } else {
            MIN_SIMULATED_SPEED
        };

        let mut active = self.active.lock().await;
        let start = {
            let mut state = self.state.lock().await;
            if state.moving {
                debug!("Simulated move ignored, a motion is already in flight");
                return false;
            }
            let distance = state.position.max_distance(&target);
            if distance == 0.0 {
                state.position = target;
                return true;
            }
            state.moving = true;
            state.position
        };

        let distance = start.max_distance(&target);
        let duration = Duration::from_secs_f64(distance / (speed * SIMULATED_BASE_SPEED));
        debug!(
            ?target,
            speed,
            duration_ms = duration.as_millis() as u64,
            "Simulated move started"
        );

        let cancel = CancellationToken::new();
        *active = Some(cancel.clone());

        let state = Arc::clone(&self.state);
        let tick = self.tick;
        tokio::spawn(async move {
            let started = Instant::now();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(tick) => {}
                }

                let progress =
                    (started.elapsed().as_secs_f64() / duration.as_secs_f64()).min(1.0);

                let mut s = state.lock().await;
                if cancel.is_cancelled() {
                    return;
                }
                if progress >= 1.0 {
                    s.position = target;
                    s.moving = false;
                    return;
                }
                s.position = start.lerp(&target, progress).clamped();
            }
        });

        true
    }

    /// Integrates `velocity` (units per second) into the position for
    /// `duration`, clamping after every tick. Replaces any motion in flight.
    pub async fn continuous_move(&self, velocity: PtzVector, duration: Duration) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.cancel();
        }
        self.state.lock().await.moving = true;

        let cancel = CancellationToken::new();
        *active = Some(cancel.clone());

        let state = Arc::clone(&self.state);
        let tick = self.tick;
        let step = tick.as_secs_f64();
        tokio::spawn(async move {
            let started = Instant::now();
            while started.elapsed() < duration {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(tick) => {}
                }
                let mut s = state.lock().await;
                if cancel.is_cancelled() {
                    return;
                }
                s.position = PtzVector {
                    pan: s.position.pan + velocity.pan * step,
                    tilt: s.position.tilt + velocity.tilt * step,
                    zoom: s.position.zoom + velocity.zoom * step,
                }
                .clamped();
            }
            let mut s = state.lock().await;
            if !cancel.is_cancelled() {
                s.moving = false;
            }
        });
    }

    /// Sets the position immediately, cancelling any motion.
    pub async fn place(&self, target: PtzVector) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.cancel();
        }
        let mut state = self.state.lock().await;
        state.position = target.clamped();
        state.moving = false;
    }

    /// Cancels the motion in flight and leaves the camera where it is.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.cancel();
        }
        self.state.lock().await.moving = false;
    }
}
