use crate::config::TourConfig;
use crate::device::{DeviceClient, DeviceError, PtzAxes};
use crate::error::{Result, TourError};
use crate::registry::TourEntry;
use crate::session::DeviceSession;
use crate::tour::{ExecutionMode, RunState, TourOperation, TourStep};
use crate::types::Preset;
use rand::seq::SliceRandom;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle to a running manual tour loop.
pub struct TourTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TourTask {
    pub fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(body(cancel.clone()));
        Self { cancel, handle }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits up to `limit` for the loop to exit. On timeout the task is left
    /// to wind down at its next checkpoint and `false` is returned.
    pub async fn join(self, limit: Duration) -> bool {
        timeout(limit, self.handle).await.is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

enum StepOutcome {
    Visited,
    Skipped,
    Cancelled,
}

pub struct TourExecutor {
    config: TourConfig,
}

impl TourExecutor {
    pub fn new(config: TourConfig) -> Self {
        Self { config }
    }

    pub async fn operate(
        &self,
        session: &Arc<DeviceSession>,
        entry: &Arc<TourEntry>,
        operation: TourOperation,
    ) -> Result<()> {
        match operation {
            TourOperation::Start => self.start(session, entry).await,
            TourOperation::Stop => self.stop(session, entry).await,
            TourOperation::Pause | TourOperation::Resume => {
                self.pause_or_resume(session, entry, operation).await
            }
        }
    }

    pub async fn start(&self, session: &Arc<DeviceSession>, entry: &Arc<TourEntry>) -> Result<()> {
        let mut run = entry.run.lock().await;
        if run.state != RunState::Idle {
            return Err(TourError::AlreadyRunning(format!(
                "tour '{}' is {}",
                entry.token(),
                run.state
            )));
        }

        match entry.mode() {
            ExecutionMode::Native => {
                let client = native_client(session)?;
                let profile = session.resolve_profile(None).await?;
                client
                    .operate_native_tour(&profile, entry.token(), TourOperation::Start)
                    .await?;
            }
            ExecutionMode::Manual => {
                run.run_id += 1;
                let run_id = run.run_id;
                let session = Arc::clone(session);
                let tour = Arc::clone(entry);
                let config = self.config.clone();
                run.task = Some(TourTask::spawn(move |cancel| {
                    run_manual_tour(session, tour, config, cancel, run_id)
                }));
            }
        }
        run.state = RunState::Running;

        info!(
            session = %session.key(),
            tour = %entry.token(),
            mode = %entry.mode(),
            "Tour started"
        );
        Ok(())
    }

    /// Stops a running tour. For manual tours the loop is joined for at most
    /// the configured timeout; success is reported either way.
    ///
    /// When the join times out the tour is already `Idle` while the old loop
    /// may still be inside a device call. A start issued in that window runs
    /// alongside it until the old loop reaches its next cancellation check.
    pub async fn stop(&self, session: &Arc<DeviceSession>, entry: &Arc<TourEntry>) -> Result<()> {
        let task = {
            let mut run = entry.run.lock().await;
            match run.state {
                RunState::Idle => {
                    return Err(TourError::NotRunning(format!("tour '{}'", entry.token())));
                }
                RunState::Stopping => {
                    return Err(TourError::NotRunning(format!(
                        "tour '{}' is already stopping",
                        entry.token()
                    )));
                }
                RunState::Running => {}
            }

            if entry.mode() == ExecutionMode::Native {
                let client = native_client(session)?;
                let profile = session.resolve_profile(None).await?;
                client
                    .operate_native_tour(&profile, entry.token(), TourOperation::Stop)
                    .await?;
                run.state = RunState::Idle;
                info!(session = %session.key(), tour = %entry.token(), "Native tour stopped");
                return Ok(());
            }

            run.state = RunState::Stopping;
            run.task.take()
        };

        // The per-tour lock is released here so the loop can record its exit.
        if let Some(task) = task {
            task.cancel();
            let limit = self.config.stop_join_timeout();
            if !task.join(limit).await {
                warn!(
                    session = %session.key(),
                    tour = %entry.token(),
                    timeout_ms = limit.as_millis() as u64,
                    "Tour loop did not exit in time, leaving it to finish on its own"
                );
            }
        }

        let mut run = entry.run.lock().await;
        if run.state == RunState::Stopping {
            run.state = RunState::Idle;
            run.task = None;
        }
        info!(session = %session.key(), tour = %entry.token(), "Manual tour stopped");
        Ok(())
    }

    /// Waits for a stop issued elsewhere to bring the tour back to `Idle`.
    /// Returns `false` if it is still not idle after twice the stop timeout.
    pub async fn wait_until_idle(&self, entry: &TourEntry) -> bool {
        let poll = self.config.motion_poll();
        timeout(self.config.stop_join_timeout() * 2, async {
            while entry.run_state().await != RunState::Idle {
                sleep(poll).await;
            }
        })
        .await
        .is_ok()
    }

    async fn pause_or_resume(
        &self,
        session: &Arc<DeviceSession>,
        entry: &Arc<TourEntry>,
        operation: TourOperation,
    ) -> Result<()> {
        match entry.mode() {
            ExecutionMode::Native => {
                let client = native_client(session)?;
                let profile = session.resolve_profile(None).await?;
                client
                    .operate_native_tour(&profile, entry.token(), operation)
                    .await?;
            }
            ExecutionMode::Manual => {
                // Manual tours have no pause semantics. The verb is
                // acknowledged and the run state is left as is.
            }
        }
        info!(
            session = %session.key(),
            tour = %entry.token(),
            operation = %operation,
            "Tour operation acknowledged"
        );
        Ok(())
    }
}

fn native_client(session: &DeviceSession) -> Result<&Arc<dyn DeviceClient>> {
    session.client().ok_or_else(|| {
        TourError::Device(DeviceError::Unsupported(
            "native tours need a connected device".to_string(),
        ))
    })
}

async fn run_manual_tour(
    session: Arc<DeviceSession>,
    entry: Arc<TourEntry>,
    config: TourConfig,
    cancel: CancellationToken,
    run_id: u64,
) {
    let key = session.key().clone();
    let token = entry.token().to_string();
    info!(session = %key, tour = %token, "Manual tour loop started");

    match session.resolve_profile(None).await {
        Ok(profile) => {
            drive_cycles(&session, &entry, &profile, &config, &cancel).await;
        }
        Err(e) => warn!(session = %key, tour = %token, error = %e, "No profile to tour with"),
    }

    let mut run = entry.run.lock().await;
    if run.run_id == run_id {
        run.state = RunState::Idle;
        run.task = None;
    }
    info!(session = %key, tour = %token, "Manual tour loop exited");
}

async fn drive_cycles(
    session: &DeviceSession,
    entry: &TourEntry,
    profile: &str,
    config: &TourConfig,
    cancel: &CancellationToken,
) {
    let mut cycles: u32 = 0;

    while !cancel.is_cancelled() {
        // Edits made while running take effect from the next cycle.
        let definition = entry.definition().await;
        let limit = definition.starting_condition.cycle_limit();
        let mut steps = definition.steps;
        if definition.starting_condition.random_preset_order {
            steps.shuffle(&mut rand::rng());
        }

        let presets = match session.presets(profile).await {
            Ok(presets) => Some(presets),
            Err(e) => {
                warn!(
                    session = %session.key(),
                    tour = %entry.token(),
                    error = %e,
                    "Could not list presets, visiting steps unchecked"
                );
                None
            }
        };

        let mut visited = 0usize;
        for step in &steps {
            match visit_step(session, profile, step, presets.as_deref(), config, cancel).await {
                StepOutcome::Visited => visited += 1,
                StepOutcome::Skipped => {}
                StepOutcome::Cancelled => return,
            }
        }

        cycles += 1;
        if limit.is_some_and(|n| cycles >= n) {
            info!(
                session = %session.key(),
                tour = %entry.token(),
                cycles,
                "Tour finished its recurring cycles"
            );
            return;
        }

        if visited == 0 {
            // Nothing reachable this cycle; back off instead of spinning.
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(config.dwell_tick()) => {}
            }
        }
    }
}

async fn visit_step(
    session: &DeviceSession,
    profile: &str,
    step: &TourStep,
    presets: Option<&[Preset]>,
    config: &TourConfig,
    cancel: &CancellationToken,
) -> StepOutcome {
    if cancel.is_cancelled() {
        return StepOutcome::Cancelled;
    }

    let preset = presets.and_then(|all| all.iter().find(|p| p.token == step.preset_token));
    if presets.is_some() && preset.is_none() {
        warn!(
            session = %session.key(),
            preset = %step.preset_token,
            "Preset not found, skipping tour step"
        );
        return StepOutcome::Skipped;
    }

    match (session.client(), preset) {
        (Some(client), _) => {
            let speed = (step.speed > 0.0).then(|| PtzAxes::uniform(step.speed));
            if let Err(e) = client.goto_preset(profile, &step.preset_token, speed).await {
                warn!(
                    session = %session.key(),
                    preset = %step.preset_token,
                    error = %e,
                    "Goto preset failed, skipping tour step"
                );
                return StepOutcome::Skipped;
            }
        }
        (None, Some(preset)) => {
            // A direct move may still be in flight; let it land first.
            if !wait_for_motion(session, profile, config, cancel).await {
                return StepOutcome::Cancelled;
            }
            let speed = if step.speed > 0.0 { step.speed } else { 1.0 };
            if !session.simulator().move_to(preset.position, speed).await {
                warn!(
                    session = %session.key(),
                    preset = %step.preset_token,
                    "Camera busy, skipping tour step"
                );
                return StepOutcome::Skipped;
            }
        }
        (None, None) => return StepOutcome::Skipped,
    }

    if !wait_for_motion(session, profile, config, cancel).await {
        return StepOutcome::Cancelled;
    }
    debug!(
        session = %session.key(),
        preset = %step.preset_token,
        dwell_secs = step.wait_time_seconds,
        "Reached tour step"
    );
    if !dwell(step.wait_time_seconds, config.dwell_tick(), cancel).await {
        return StepOutcome::Cancelled;
    }
    StepOutcome::Visited
}

/// Returns `false` if cancelled before the camera came to rest.
async fn wait_for_motion(
    session: &DeviceSession,
    profile: &str,
    config: &TourConfig,
    cancel: &CancellationToken,
) -> bool {
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        if !session.is_moving(profile).await {
            return true;
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = sleep(config.motion_poll()) => {}
        }
    }
}

/// Sleeps `seconds` whole seconds in `tick` slices. Returns `false` if
/// cancelled.
async fn dwell(seconds: u32, tick: Duration, cancel: &CancellationToken) -> bool {
    let total = Duration::from_secs(u64::from(seconds));
    let mut waited = Duration::ZERO;
    while waited < total {
        let slice = tick.min(total - waited);
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = sleep(slice) => {}
        }
        waited += slice;
    }
    !cancel.is_cancelled()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn dwell_observes_cancel_between_ticks() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        assert!(!dwell(30, Duration::from_secs(1), &cancel).await);
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn dwell_runs_full_wait() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        assert!(dwell(3, Duration::from_secs(1), &cancel).await);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn join_times_out_on_stuck_task() {
        let task = TourTask::spawn(|_cancel| async {
            sleep(Duration::from_secs(60)).await;
        });
        task.cancel();
        assert!(!task.join(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn join_returns_once_loop_observes_cancel() {
        let task = TourTask::spawn(|cancel| async move {
            cancel.cancelled().await;
        });
        assert!(!task.is_finished());
        task.cancel();
        assert!(task.join(Duration::from_secs(5)).await);
    }
}
