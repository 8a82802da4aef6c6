use crate::device::{ContinuousMoveRequest, MoveRequest, PtzAxes};
use crate::error::{Result, TourError};
use crate::orchestrator::TourOrchestrator;
use crate::types::{DeviceSessionKey, PositionState, PtzVector, Reply};
use async_trait::async_trait;
use tokio::time::Duration;
use tracing::debug;

#[async_trait]
pub trait Motion: Send + Sync {
    /// Move to an absolute position; missing axes keep their value
    async fn absolute_move(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        request: MoveRequest,
    ) -> Result<Reply>;

    /// Move by a translation from the current position
    async fn relative_move(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        request: MoveRequest,
    ) -> Result<Reply>;

    /// Move at a velocity. `duration` bounds the simulated move; devices
    /// always receive the long configured timeout.
    async fn continuous_move(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        velocity: PtzAxes,
        duration: Option<Duration>,
    ) -> Result<Reply>;

    /// Stop pan/tilt and/or zoom motion
    async fn stop(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        pan_tilt: bool,
        zoom: bool,
    ) -> Result<Reply>;

    /// Current position and motion state
    async fn get_status(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
    ) -> Result<PositionState>;
}

fn require_axes(axes: &PtzAxes, what: &str) -> Result<()> {
    if axes.is_empty() {
        return Err(TourError::InvalidArgument(format!(
            "{} needs pan/tilt or zoom",
            what
        )));
    }
    Ok(())
}

fn busy() -> Reply {
    Reply::failed("Camera is already moving")
}

#[async_trait]
impl Motion for TourOrchestrator {
    async fn absolute_move(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        request: MoveRequest,
    ) -> Result<Reply> {
        require_axes(&request.target, "absolute move")?;
        let (session, profile) = self.session_with_profile(key, profile).await?;

        match session.client() {
            Some(client) => client.absolute_move(&profile, &request).await?,
            None => {
                let current = session.position().await.position;
                let target = request.target.apply_to(current);
                if !session.simulator().move_to(target, 1.0).await {
                    return Ok(busy());
                }
            }
        }
        Ok(Reply::ok("Absolute move started"))
    }

    async fn relative_move(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        request: MoveRequest,
    ) -> Result<Reply> {
        require_axes(&request.target, "relative move")?;
        let (session, profile) = self.session_with_profile(key, profile).await?;

        match session.client() {
            Some(client) => client.relative_move(&profile, &request).await?,
            None => {
                let current = session.position().await.position;
                let target = request.target.offset(current).clamped();
                if !session.simulator().move_to(target, 1.0).await {
                    return Ok(busy());
                }
            }
        }
        Ok(Reply::ok("Relative move started"))
    }

    async fn continuous_move(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        velocity: PtzAxes,
        duration: Option<Duration>,
    ) -> Result<Reply> {
        require_axes(&velocity, "continuous move")?;
        let (session, profile) = self.session_with_profile(key, profile).await?;

        match session.client() {
            Some(client) => {
                let request = ContinuousMoveRequest {
                    velocity,
                    timeout: self.config.continuous_move_device_timeout.clone(),
                };
                client.continuous_move(&profile, &request).await?;
            }
            None => {
                let velocity = velocity.apply_to(PtzVector::default());
                let duration = duration.unwrap_or_else(|| self.config.continuous_move_duration());
                debug!(session = %key, ?velocity, ?duration, "Simulated continuous move");
                session.simulator().continuous_move(velocity, duration).await;
            }
        }
        Ok(Reply::ok("Continuous move started"))
    }

    async fn stop(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        pan_tilt: bool,
        zoom: bool,
    ) -> Result<Reply> {
        let (session, profile) = self.session_with_profile(key, profile).await?;
        match session.client() {
            Some(client) => client.stop(&profile, pan_tilt, zoom).await?,
            None => session.simulator().stop().await,
        }
        Ok(Reply::ok("Motion stopped"))
    }

    async fn get_status(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
    ) -> Result<PositionState> {
        let (session, profile) = self.session_with_profile(key, profile).await?;
        let Some(client) = session.client() else {
            return Ok(session.position().await);
        };

        let status = client.get_status(&profile).await?;
        let state = PositionState {
            position: status.position,
            moving: status.moving,
        };
        session.record_position(state).await;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SimulatedConnector;
    use std::sync::Arc;
    use tokio::time::sleep;

    fn key() -> DeviceSessionKey {
        DeviceSessionKey::new("sim://cam", "admin")
    }

    #[tokio::test(start_paused = true)]
    async fn relative_move_is_clamped() {
        let orch = TourOrchestrator::new(Arc::new(SimulatedConnector));
        let request = MoveRequest {
            target: PtzAxes {
                pan_tilt: Some((1.5, -0.25)),
                zoom: Some(-0.5),
            },
            speed: None,
        };
        assert!(orch.relative_move(&key(), None, request).await.unwrap().success);
        sleep(Duration::from_secs(1)).await;

        let state = orch.get_status(&key(), None).await.unwrap();
        assert!(!state.moving);
        assert_eq!(state.position, PtzVector::new(1.0, -0.25, 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn absolute_move_keeps_missing_axes() {
        let orch = TourOrchestrator::new(Arc::new(SimulatedConnector));
        let zoom_only = MoveRequest {
            target: PtzAxes {
                pan_tilt: None,
                zoom: Some(0.8),
            },
            speed: None,
        };
        orch.absolute_move(&key(), None, zoom_only).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        let state = orch.get_status(&key(), None).await.unwrap();
        assert_eq!(state.position, PtzVector::new(0.0, 0.0, 0.8));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_continuous_move() {
        let orch = TourOrchestrator::new(Arc::new(SimulatedConnector));
        let velocity = PtzAxes {
            pan_tilt: Some((0.5, 0.0)),
            zoom: None,
        };
        orch.continuous_move(&key(), None, velocity, Some(Duration::from_secs(10)))
            .await
            .unwrap();
        sleep(Duration::from_millis(1050)).await;
        orch.stop(&key(), None, true, true).await.unwrap();

        let stopped = orch.get_status(&key(), None).await.unwrap();
        assert!(!stopped.moving);
        sleep(Duration::from_secs(2)).await;
        let later = orch.get_status(&key(), None).await.unwrap();
        assert_eq!(later.position, stopped.position);
        assert!(later.position.pan > 0.0 && later.position.pan < 1.0);
    }

    #[tokio::test]
    async fn empty_move_is_rejected() {
        let orch = TourOrchestrator::new(Arc::new(SimulatedConnector));
        assert!(matches!(
            orch.absolute_move(&key(), None, MoveRequest::default()).await,
            Err(TourError::InvalidArgument(_))
        ));
    }
}
