use crate::error::Result;
use crate::orchestrator::TourOrchestrator;
use crate::types::{DeviceSessionKey, Profile};
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PtzCapabilities {
    pub ptz: bool,
    /// Tours run on the device rather than in this process.
    pub native_preset_tours: bool,
    pub simulated: bool,
}

#[async_trait]
pub trait DeviceInfo: Send + Sync {
    /// PTZ support and how tours will be executed
    async fn get_capabilities(&self, key: &DeviceSessionKey) -> Result<PtzCapabilities>;

    /// List media profiles
    async fn get_profiles(&self, key: &DeviceSessionKey) -> Result<Vec<Profile>>;
}

#[async_trait]
impl DeviceInfo for TourOrchestrator {
    async fn get_capabilities(&self, key: &DeviceSessionKey) -> Result<PtzCapabilities> {
        let session = self.session(key).await?;
        let ptz = match session.client() {
            Some(client) => client.get_capabilities().await?.ptz,
            None => true,
        };
        Ok(PtzCapabilities {
            ptz,
            native_preset_tours: self.probe.supports(&session).await,
            simulated: session.is_simulated(),
        })
    }

    async fn get_profiles(&self, key: &DeviceSessionKey) -> Result<Vec<Profile>> {
        self.session(key).await?.profiles().await
    }
}
