use crate::error::Result;
use crate::orchestrator::TourOrchestrator;
use crate::tour::{ExecutionMode, NewTour, PresetTour, TourChanges, TourOperation};
use crate::types::{DeviceSessionKey, Reply};
use async_trait::async_trait;

#[async_trait]
pub trait PresetTours: Send + Sync {
    /// Create a tour, returning its token
    async fn create_tour(&self, key: &DeviceSessionKey, tour: NewTour) -> Result<String>;

    /// Update steps and/or flags of a tour
    async fn modify_tour(
        &self,
        key: &DeviceSessionKey,
        token: &str,
        changes: TourChanges,
    ) -> Result<Reply>;

    /// Delete a tour, stopping it first if needed
    async fn delete_tour(&self, key: &DeviceSessionKey, token: &str) -> Result<Reply>;

    /// Manual and native tours of the session
    async fn list_tours(&self, key: &DeviceSessionKey) -> Result<Vec<PresetTour>>;

    async fn get_tour(&self, key: &DeviceSessionKey, token: &str) -> Result<PresetTour>;

    /// Start, stop, pause or resume a tour
    async fn operate_tour(
        &self,
        key: &DeviceSessionKey,
        token: &str,
        operation: &str,
    ) -> Result<Reply>;
}

#[async_trait]
impl PresetTours for TourOrchestrator {
    async fn create_tour(&self, key: &DeviceSessionKey, tour: NewTour) -> Result<String> {
        let session = self.session(key).await?;
        self.tours.create(&session, tour).await
    }

    async fn modify_tour(
        &self,
        key: &DeviceSessionKey,
        token: &str,
        changes: TourChanges,
    ) -> Result<Reply> {
        let session = self.session(key).await?;
        self.tours.modify(&session, token, changes).await?;
        Ok(Reply::ok(format!("Tour {} modified", token)))
    }

    async fn delete_tour(&self, key: &DeviceSessionKey, token: &str) -> Result<Reply> {
        let session = self.session(key).await?;
        self.tours.delete(&session, token).await?;
        Ok(Reply::ok(format!("Tour {} deleted", token)))
    }

    async fn list_tours(&self, key: &DeviceSessionKey) -> Result<Vec<PresetTour>> {
        let session = self.session(key).await?;
        self.tours.list(&session).await
    }

    async fn get_tour(&self, key: &DeviceSessionKey, token: &str) -> Result<PresetTour> {
        let session = self.session(key).await?;
        let entry = self.tours.resolve(&session, token).await?;
        Ok(entry.snapshot().await)
    }

    async fn operate_tour(
        &self,
        key: &DeviceSessionKey,
        token: &str,
        operation: &str,
    ) -> Result<Reply> {
        let operation = TourOperation::parse(operation)?;
        let session = self.session(key).await?;
        let entry = self.tours.resolve(&session, token).await?;
        self.executor.operate(&session, &entry, operation).await?;

        let message = match (operation, entry.mode()) {
            (TourOperation::Start, _) => format!("Tour {} started", token),
            (TourOperation::Stop, _) => format!("Tour {} stopped", token),
            (TourOperation::Pause | TourOperation::Resume, ExecutionMode::Manual) => format!(
                "{} acknowledged for tour {}; manual tours are not paused",
                operation, token
            ),
            (TourOperation::Pause | TourOperation::Resume, ExecutionMode::Native) => {
                format!("{} sent to tour {}", operation, token)
            }
        };
        Ok(Reply::ok(message))
    }
}
