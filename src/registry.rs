use crate::capability::CapabilityProbe;
use crate::config::TourConfig;
use crate::constants::MANUAL_TOUR_TOKEN_PREFIX;
use crate::device::{NativeTour, NativeTourSpec};
use crate::error::{Result, TourError};
use crate::executor::{TourExecutor, TourTask};
use crate::session::DeviceSession;
use crate::tour::{
    ExecutionMode, NewTour, PresetTour, RunState, StartingCondition, TourChanges, TourDefinition,
    validate_steps,
};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

pub(crate) struct RunSlot {
    pub(crate) state: RunState,
    pub(crate) task: Option<TourTask>,
    // Bumped on every manual start so a stale loop never clobbers a newer run.
    pub(crate) run_id: u64,
}

pub struct TourEntry {
    token: String,
    seq: u64,
    mode: ExecutionMode,
    definition: RwLock<TourDefinition>,
    pub(crate) run: Mutex<RunSlot>,
}

impl TourEntry {
    pub(crate) fn new(
        token: String,
        seq: u64,
        mode: ExecutionMode,
        definition: TourDefinition,
    ) -> Self {
        Self {
            token,
            seq,
            mode,
            definition: RwLock::new(definition),
            run: Mutex::new(RunSlot {
                state: RunState::Idle,
                task: None,
                run_id: 0,
            }),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub async fn definition(&self) -> TourDefinition {
        self.definition.read().await.clone()
    }

    pub async fn run_state(&self) -> RunState {
        self.run.lock().await.state
    }

    pub async fn snapshot(&self) -> PresetTour {
        let definition = self.definition().await;
        PresetTour {
            token: self.token.clone(),
            name: definition.name,
            steps: definition.steps,
            auto_start: definition.auto_start,
            starting_condition: definition.starting_condition,
            execution_mode: self.mode,
            run_state: self.run_state().await,
        }
    }
}

impl From<&NativeTour> for TourDefinition {
    fn from(tour: &NativeTour) -> Self {
        let listed = tour.clone().into_preset_tour(None);
        Self {
            name: listed.name,
            steps: listed.steps,
            auto_start: listed.auto_start,
            starting_condition: listed.starting_condition,
        }
    }
}

pub struct TourRegistry {
    probe: Arc<CapabilityProbe>,
    executor: Arc<TourExecutor>,
    config: TourConfig,
}

impl TourRegistry {
    pub fn new(probe: Arc<CapabilityProbe>, executor: Arc<TourExecutor>, config: TourConfig) -> Self {
        Self {
            probe,
            executor,
            config,
        }
    }

    /// Creates a tour. The execution mode is fixed here for the tour's
    /// lifetime: native when the device runs tours itself, manual otherwise.
    pub async fn create(&self, session: &DeviceSession, new: NewTour) -> Result<String> {
        validate_steps(&new.steps)?;

        let seq = session.next_tour_seq();
        let native = self.probe.supports(session).await;
        let name = new
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| {
                if native {
                    format!("Native Tour {}", seq)
                } else {
                    format!("Manual Tour {}", seq)
                }
            });
        let definition = TourDefinition {
            name,
            steps: new.steps,
            auto_start: new.auto_start,
            starting_condition: new.starting_condition.unwrap_or_else(|| {
                StartingCondition::with_recurring_duration(
                    self.config.default_recurring_duration.clone(),
                )
            }),
        };

        let (token, mode) = match session.client().filter(|_| native) {
            Some(client) => {
                let profile = session.resolve_profile(None).await?;
                let spec = NativeTourSpec::from_definition(&definition, None);
                let token = client.create_native_tour(&profile, &spec).await?;
                (token, ExecutionMode::Native)
            }
            None => (
                format!("{}{}", MANUAL_TOUR_TOKEN_PREFIX, seq),
                ExecutionMode::Manual,
            ),
        };

        info!(
            session = %session.key(),
            tour = %token,
            mode = %mode,
            steps = definition.steps.len(),
            "Tour created"
        );
        session.insert_tour(Arc::new(TourEntry::new(token.clone(), seq, mode, definition)));
        Ok(token)
    }

    /// Finds a tour by token. Native tours created outside this process are
    /// adopted on first reference.
    pub async fn resolve(&self, session: &DeviceSession, token: &str) -> Result<Arc<TourEntry>> {
        if let Some(entry) = session.tour(token) {
            return Ok(entry);
        }

        let not_found = || TourError::NotFound(format!("tour '{}'", token));
        let Some(client) = session.client() else {
            return Err(not_found());
        };
        if token.starts_with(MANUAL_TOUR_TOKEN_PREFIX) || !self.probe.supports(session).await {
            return Err(not_found());
        }

        let profile = session.resolve_profile(None).await?;
        let tours = client.list_native_tours(&profile).await?;
        let listed = tours.iter().find(|t| t.token == token).ok_or_else(not_found)?;

        let entry = Arc::new(TourEntry::new(
            token.to_string(),
            session.next_tour_seq(),
            ExecutionMode::Native,
            TourDefinition::from(listed),
        ));
        session.insert_tour(Arc::clone(&entry));
        // Another caller may have adopted it concurrently; the map keeps one.
        Ok(session.tour(token).unwrap_or(entry))
    }

    /// Partial update. A running manual loop keeps its current cycle and
    /// picks the new steps up on the next one.
    pub async fn modify(
        &self,
        session: &DeviceSession,
        token: &str,
        changes: TourChanges,
    ) -> Result<()> {
        if let Some(steps) = &changes.steps {
            validate_steps(steps)?;
        }
        let entry = self.resolve(session, token).await?;

        let mut definition = entry.definition.write().await;
        let mut updated = definition.clone();
        updated.apply(changes);

        if entry.mode() == ExecutionMode::Native
            && let Some(client) = session.client()
        {
            let profile = session.resolve_profile(None).await?;
            let spec = NativeTourSpec::from_definition(&updated, Some(token.to_string()));
            client.modify_native_tour(&profile, &spec).await?;
        }

        *definition = updated;
        info!(session = %session.key(), tour = %token, "Tour modified");
        Ok(())
    }

    /// Removes a tour, stopping it first when it is not idle.
    pub async fn delete(&self, session: &Arc<DeviceSession>, token: &str) -> Result<()> {
        let entry = self.resolve(session, token).await?;

        if entry.run_state().await != RunState::Idle {
            match self.executor.stop(session, &entry).await {
                Ok(()) | Err(TourError::NotRunning(_)) => {}
                Err(e) => return Err(e),
            }
            // Another caller may still be joining the loop.
            if !self.executor.wait_until_idle(&entry).await {
                warn!(
                    session = %session.key(),
                    tour = %token,
                    "Tour still stopping, deleting it anyway"
                );
            }
        }

        if entry.mode() == ExecutionMode::Native
            && let Some(client) = session.client()
        {
            let profile = session.resolve_profile(None).await?;
            client.remove_native_tour(&profile, token).await?;
        }

        session.remove_tour(token);
        info!(session = %session.key(), tour = %token, "Tour deleted");
        Ok(())
    }

    /// Manual tours from the session followed by the device's native tours.
    /// A failing native listing is logged and the locally known native
    /// entries are reported instead.
    pub async fn list(&self, session: &DeviceSession) -> Result<Vec<PresetTour>> {
        let entries = session.tours();
        let mut tours = Vec::with_capacity(entries.len());
        for entry in entries.iter().filter(|e| e.mode() == ExecutionMode::Manual) {
            tours.push(entry.snapshot().await);
        }

        let Some(client) = session.client() else {
            return Ok(tours);
        };
        if !self.probe.supports(session).await {
            return Ok(tours);
        }

        let listed = match session.resolve_profile(None).await {
            Ok(profile) => client.list_native_tours(&profile).await.map_err(TourError::from),
            Err(e) => Err(e),
        };
        match listed {
            Ok(native) => {
                for tour in native {
                    let local = match session.tour(&tour.token) {
                        Some(entry) => Some(entry.run_state().await),
                        None => None,
                    };
                    tours.push(tour.into_preset_tour(local));
                }
            }
            Err(e) => {
                warn!(session = %session.key(), error = %e, "Native tour listing failed");
                for entry in entries.iter().filter(|e| e.mode() == ExecutionMode::Native) {
                    tours.push(entry.snapshot().await);
                }
            }
        }
        Ok(tours)
    }
}
