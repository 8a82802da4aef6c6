use crate::capability::CapabilityProbe;
use crate::config::TourConfig;
use crate::device::DeviceConnector;
use crate::error::Result;
use crate::executor::TourExecutor;
use crate::registry::TourRegistry;
use crate::session::{DeviceSession, SessionRegistry};
use crate::tour::ExecutionMode;
use crate::types::DeviceSessionKey;
use std::sync::Arc;

/// Entry point for every inbound operation.
///
/// Tour lifecycle lives in [`crate::commands::PresetTours`], presets in
/// [`crate::commands::Presets`], direct motion in [`crate::commands::Motion`]
/// and device queries in [`crate::commands::DeviceInfo`].
pub struct TourOrchestrator {
    pub(crate) connector: Arc<dyn DeviceConnector>,
    pub(crate) config: TourConfig,
    pub(crate) sessions: SessionRegistry,
    pub(crate) probe: Arc<CapabilityProbe>,
    pub(crate) executor: Arc<TourExecutor>,
    pub(crate) tours: TourRegistry,
}

impl TourOrchestrator {
    pub fn new(connector: Arc<dyn DeviceConnector>) -> Self {
        Self::build(connector, TourConfig::default())
    }

    /// Replaces the timing configuration. Call before any session exists.
    pub fn with_config(self, config: TourConfig) -> Self {
        Self::build(self.connector, config)
    }

    fn build(connector: Arc<dyn DeviceConnector>, config: TourConfig) -> Self {
        let probe = Arc::new(CapabilityProbe::new());
        let executor = Arc::new(TourExecutor::new(config.clone()));
        Self {
            sessions: SessionRegistry::new(Arc::clone(&connector), config.clone()),
            tours: TourRegistry::new(Arc::clone(&probe), Arc::clone(&executor), config.clone()),
            probe,
            executor,
            connector,
            config,
        }
    }

    pub fn config(&self) -> &TourConfig {
        &self.config
    }

    /// Session for `key`, connecting on first use.
    pub async fn session(&self, key: &DeviceSessionKey) -> Result<Arc<DeviceSession>> {
        self.sessions.get_or_create(key).await
    }

    pub(crate) async fn session_with_profile(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
    ) -> Result<(Arc<DeviceSession>, String)> {
        let session = self.session(key).await?;
        let profile = session.resolve_profile(profile).await?;
        Ok((session, profile))
    }

    /// Forgets the session's cached native tour verdict.
    pub fn invalidate_capabilities(&self, key: &DeviceSessionKey) {
        self.probe.invalidate(key);
    }

    /// Drops a session. Running manual tours are stopped first; native
    /// tours keep running on the device.
    pub async fn close_session(&self, key: &DeviceSessionKey) {
        let Some(session) = self.sessions.remove(key) else {
            return;
        };
        for entry in session
            .tours()
            .into_iter()
            .filter(|e| e.mode() == ExecutionMode::Manual)
        {
            // Idle tours report NotRunning, which is fine here.
            let _ = self.executor.stop(&session, &entry).await;
        }
        self.probe.invalidate(key);
    }
}
