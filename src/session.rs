use crate::config::TourConfig;
use crate::constants::{SIMULATED_PRESET_TOKEN_PREFIX, SIMULATED_PRESETS, SIMULATED_PROFILES};
use crate::device::{DeviceClient, DeviceConnector};
use crate::error::{Result, TourError};
use crate::registry::TourEntry;
use crate::simulator::MotionSimulator;
use crate::types::{DeviceSessionKey, PositionState, Preset, Profile, PtzVector};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

/// Everything the engine keeps for one camera connection.
pub struct DeviceSession {
    key: DeviceSessionKey,
    client: Option<Arc<dyn DeviceClient>>,

    position: Arc<Mutex<PositionState>>,
    simulator: MotionSimulator,

    // Local preset store, used when no device is attached
    pub(crate) presets: Mutex<Vec<Preset>>,
    preset_seq: AtomicU64,

    tours: DashMap<String, Arc<TourEntry>>,
    tour_seq: AtomicU64,

    default_profile: OnceCell<String>,
}

impl DeviceSession {
    pub fn new(
        key: DeviceSessionKey,
        client: Option<Arc<dyn DeviceClient>>,
        config: &TourConfig,
    ) -> Self {
        let position = Arc::new(Mutex::new(PositionState::default()));
        let presets = if client.is_none() {
            SIMULATED_PRESETS
                .iter()
                .map(|(token, name, pan, tilt, zoom)| Preset {
                    token: token.to_string(),
                    name: name.to_string(),
                    position: PtzVector::new(*pan, *tilt, *zoom),
                })
                .collect()
        } else {
            Vec::new()
        };

        Self {
            simulator: MotionSimulator::new(Arc::clone(&position), config.motion_tick()),
            preset_seq: AtomicU64::new(presets.len() as u64),
            presets: Mutex::new(presets),
            position,
            key,
            client,
            tours: DashMap::new(),
            tour_seq: AtomicU64::new(0),
            default_profile: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &DeviceSessionKey {
        &self.key
    }

    pub fn client(&self) -> Option<&Arc<dyn DeviceClient>> {
        self.client.as_ref()
    }

    pub fn is_simulated(&self) -> bool {
        self.client.is_none()
    }

    pub fn simulator(&self) -> &MotionSimulator {
        &self.simulator
    }

    pub async fn position(&self) -> PositionState {
        *self.position.lock().await
    }

    /// Records a position reported by the device.
    pub(crate) async fn record_position(&self, reported: PositionState) {
        *self.position.lock().await = reported;
    }

    /// Whether the camera is still moving. Device query failures count as
    /// "not moving" so a tour never hangs on a flaky status call.
    pub(crate) async fn is_moving(&self, profile: &str) -> bool {
        let Some(client) = &self.client else {
            return self.simulator.is_moving().await;
        };
        match client.get_status(profile).await {
            Ok(status) => {
                self.record_position(PositionState {
                    position: status.position,
                    moving: status.moving,
                })
                .await;
                status.moving
            }
            Err(e) => {
                debug!(session = %self.key, error = %e, "Status poll failed");
                false
            }
        }
    }

    pub async fn profiles(&self) -> Result<Vec<Profile>> {
        match &self.client {
            Some(client) => Ok(client.list_profiles().await?),
            None => Ok(SIMULATED_PROFILES
                .iter()
                .map(|(token, name)| Profile {
                    token: token.to_string(),
                    name: name.to_string(),
                    ptz_enabled: true,
                })
                .collect()),
        }
    }

    /// Resolves a profile token or index. Without a request the first
    /// PTZ-capable profile is used and remembered.
    pub async fn resolve_profile(&self, requested: Option<&str>) -> Result<String> {
        let requested = requested.map(str::trim).filter(|r| !r.is_empty());

        let Some(requested) = requested else {
            return self
                .default_profile
                .get_or_try_init(|| async {
                    let profiles = self.profiles().await?;
                    profiles
                        .iter()
                        .find(|p| p.ptz_enabled)
                        .or_else(|| profiles.first())
                        .map(|p| p.token.clone())
                        .ok_or_else(|| {
                            TourError::NotFound("no profiles available on device".to_string())
                        })
                })
                .await
                .cloned();
        };

        let profiles = self.profiles().await?;
        if profiles.iter().any(|p| p.token == requested) {
            return Ok(requested.to_string());
        }
        if let Ok(index) = requested.parse::<usize>()
            && let Some(profile) = profiles.get(index)
        {
            return Ok(profile.token.clone());
        }
        Err(TourError::NotFound(format!("profile '{}'", requested)))
    }

    /// Presets as currently known: from the device, or the local store.
    pub async fn presets(&self, profile: &str) -> Result<Vec<Preset>> {
        match &self.client {
            Some(client) => Ok(client.list_presets(profile).await?),
            None => Ok(self.presets.lock().await.clone()),
        }
    }

    pub(crate) fn next_preset_token(&self) -> String {
        let n = self.preset_seq.fetch_add(1, Ordering::AcqRel) + 1;
        format!("{}{}", SIMULATED_PRESET_TOKEN_PREFIX, n)
    }

    pub(crate) fn next_tour_seq(&self) -> u64 {
        self.tour_seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn insert_tour(&self, entry: Arc<TourEntry>) {
        self.tours.insert(entry.token().to_string(), entry);
    }

    pub(crate) fn tour(&self, token: &str) -> Option<Arc<TourEntry>> {
        self.tours.get(token).map(|e| Arc::clone(e.value()))
    }

    pub(crate) fn remove_tour(&self, token: &str) -> Option<Arc<TourEntry>> {
        self.tours.remove(token).map(|(_, e)| e)
    }

    /// Local tours in creation order.
    pub(crate) fn tours(&self) -> Vec<Arc<TourEntry>> {
        let mut tours: Vec<_> = self.tours.iter().map(|e| Arc::clone(e.value())).collect();
        tours.sort_by_key(|t| t.seq());
        tours
    }
}

/// Lazily creates and hands out sessions. Sessions live until
/// [`SessionRegistry::remove`] is called by the owner.
pub struct SessionRegistry {
    connector: Arc<dyn DeviceConnector>,
    config: TourConfig,
    sessions: DashMap<DeviceSessionKey, Arc<DeviceSession>>,
}

impl SessionRegistry {
    pub fn new(connector: Arc<dyn DeviceConnector>, config: TourConfig) -> Self {
        Self {
            connector,
            config,
            sessions: DashMap::new(),
        }
    }

    pub async fn get_or_create(&self, key: &DeviceSessionKey) -> Result<Arc<DeviceSession>> {
        if let Some(session) = self.sessions.get(key) {
            return Ok(Arc::clone(session.value()));
        }

        let client = self.connector.connect(key).await?;
        info!(
            session = %key,
            simulated = client.is_none(),
            "Device session created"
        );
        let session = Arc::new(DeviceSession::new(key.clone(), client, &self.config));

        // A concurrent caller may have won the race; keep its session.
        let entry = self.sessions.entry(key.clone()).or_insert(session);
        Ok(Arc::clone(entry.value()))
    }

    pub fn get(&self, key: &DeviceSessionKey) -> Option<Arc<DeviceSession>> {
        self.sessions.get(key).map(|s| Arc::clone(s.value()))
    }

    pub fn remove(&self, key: &DeviceSessionKey) -> Option<Arc<DeviceSession>> {
        self.sessions.remove(key).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
