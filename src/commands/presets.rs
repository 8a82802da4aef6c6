use crate::constants::PRESET_NAME_FORMAT;
use crate::device::{MoveRequest, PtzAxes, SetPresetRequest};
use crate::error::{Result, TourError};
use crate::orchestrator::TourOrchestrator;
use crate::session::DeviceSession;
use crate::types::{DeviceSessionKey, Preset, PtzVector, Reply};
use async_trait::async_trait;
use chrono::Local;
use tracing::info;

#[async_trait]
pub trait Presets: Send + Sync {
    /// List stored presets
    async fn get_presets(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
    ) -> Result<Vec<Preset>>;

    /// Save the current position, returning the preset token. A simulated
    /// preset with the same name is overwritten.
    async fn set_preset(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        name: Option<&str>,
    ) -> Result<String>;

    /// Optionally move, then save a preset with a generated name
    async fn create_preset(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        position: Option<PtzVector>,
    ) -> Result<String>;

    /// Re-save an existing preset, optionally at a new position or name
    async fn update_preset(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        token: &str,
        name: Option<&str>,
        position: Option<PtzVector>,
    ) -> Result<Reply>;

    async fn remove_preset(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        token: &str,
    ) -> Result<Reply>;

    /// Move to a preset; speed in 0.0..=1.0
    async fn goto_preset(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        token: &str,
        speed: Option<f64>,
    ) -> Result<Reply>;
}

fn generated_preset_name() -> String {
    format!("Preset_{}", Local::now().format(PRESET_NAME_FORMAT))
}

fn find_preset(presets: &[Preset], token: &str) -> Result<Preset> {
    presets
        .iter()
        .find(|p| p.token == token)
        .cloned()
        .ok_or_else(|| TourError::NotFound(format!("preset '{}'", token)))
}

/// Moves instantly in simulation, or with an absolute move on a device.
async fn place(session: &DeviceSession, profile: &str, position: PtzVector) -> Result<()> {
    match session.client() {
        Some(client) => {
            let request = MoveRequest {
                target: PtzAxes::full(position.clamped()),
                speed: None,
            };
            client.absolute_move(profile, &request).await?;
        }
        None => session.simulator().place(position).await,
    }
    Ok(())
}

/// Stores the current simulated position. A caller-chosen name that is
/// already taken overwrites that preset; generated names always add one.
async fn save_simulated(session: &DeviceSession, name: Option<String>) -> String {
    let position = session.position().await.position;
    let mut presets = session.presets.lock().await;
    if let Some(existing) = name
        .as_deref()
        .and_then(|n| presets.iter_mut().find(|p| p.name == n))
    {
        existing.position = position;
        return existing.token.clone();
    }
    let token = session.next_preset_token();
    presets.push(Preset {
        token: token.clone(),
        name: name.unwrap_or_else(generated_preset_name),
        position,
    });
    token
}

async fn save(session: &DeviceSession, profile: &str, name: Option<String>) -> Result<String> {
    match session.client() {
        Some(client) => {
            let request = SetPresetRequest {
                name: Some(name.unwrap_or_else(generated_preset_name)),
                preset_token: None,
            };
            Ok(client.set_preset(profile, &request).await?)
        }
        None => Ok(save_simulated(session, name).await),
    }
}

#[async_trait]
impl Presets for TourOrchestrator {
    async fn get_presets(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
    ) -> Result<Vec<Preset>> {
        let (session, profile) = self.session_with_profile(key, profile).await?;
        session.presets(&profile).await
    }

    async fn set_preset(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        name: Option<&str>,
    ) -> Result<String> {
        let (session, profile) = self.session_with_profile(key, profile).await?;
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let token = save(&session, &profile, name).await?;
        info!(session = %key, preset = %token, "Preset saved");
        Ok(token)
    }

    async fn create_preset(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        position: Option<PtzVector>,
    ) -> Result<String> {
        let (session, profile) = self.session_with_profile(key, profile).await?;
        if let Some(position) = position {
            place(&session, &profile, position).await?;
        }

        let token = save(&session, &profile, None).await?;
        info!(session = %key, preset = %token, "Preset created");
        Ok(token)
    }

    async fn update_preset(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        token: &str,
        name: Option<&str>,
        position: Option<PtzVector>,
    ) -> Result<Reply> {
        let (session, profile) = self.session_with_profile(key, profile).await?;
        let existing = find_preset(&session.presets(&profile).await?, token)?;
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or(existing.name);

        if let Some(position) = position {
            place(&session, &profile, position).await?;
        }

        match session.client() {
            Some(client) => {
                let request = SetPresetRequest {
                    name: Some(name),
                    preset_token: Some(token.to_string()),
                };
                client.set_preset(&profile, &request).await?;
            }
            None => {
                let current = session.position().await.position;
                let mut presets = session.presets.lock().await;
                let preset = presets
                    .iter_mut()
                    .find(|p| p.token == token)
                    .ok_or_else(|| TourError::NotFound(format!("preset '{}'", token)))?;
                preset.name = name;
                preset.position = current;
            }
        }

        info!(session = %key, preset = %token, "Preset updated");
        Ok(Reply::ok(format!("Preset {} updated", token)))
    }

    async fn remove_preset(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        token: &str,
    ) -> Result<Reply> {
        let (session, profile) = self.session_with_profile(key, profile).await?;
        match session.client() {
            Some(client) => client.remove_preset(&profile, token).await?,
            None => {
                let mut presets = session.presets.lock().await;
                let before = presets.len();
                presets.retain(|p| p.token != token);
                if presets.len() == before {
                    return Err(TourError::NotFound(format!("preset '{}'", token)));
                }
            }
        }

        info!(session = %key, preset = %token, "Preset removed");
        Ok(Reply::ok(format!("Preset {} removed", token)))
    }

    async fn goto_preset(
        &self,
        key: &DeviceSessionKey,
        profile: Option<&str>,
        token: &str,
        speed: Option<f64>,
    ) -> Result<Reply> {
        let (session, profile) = self.session_with_profile(key, profile).await?;
        let preset = find_preset(&session.presets(&profile).await?, token)?;
        let speed = speed.filter(|s| *s > 0.0);

        match session.client() {
            Some(client) => {
                client
                    .goto_preset(&profile, token, speed.map(PtzAxes::uniform))
                    .await?;
            }
            None => {
                if !session
                    .simulator()
                    .move_to(preset.position, speed.unwrap_or(1.0))
                    .await
                {
                    return Ok(Reply::failed("Camera is already moving"));
                }
            }
        }
        Ok(Reply::ok(format!("Moving to preset {}", token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Motion;
    use crate::device::SimulatedConnector;
    use std::sync::Arc;

    fn orchestrator() -> TourOrchestrator {
        TourOrchestrator::new(Arc::new(SimulatedConnector))
    }

    fn key() -> DeviceSessionKey {
        DeviceSessionKey::new("sim://cam", "admin")
    }

    #[tokio::test]
    async fn set_preset_with_existing_name_overwrites() {
        let orch = orchestrator();
        let token = orch
            .create_preset(&key(), None, Some(PtzVector::new(0.1, 0.1, 0.1)))
            .await
            .unwrap();
        assert_eq!(token, "preset_4");

        let first = orch.set_preset(&key(), None, Some("Dock")).await.unwrap();
        orch.create_preset(&key(), None, Some(PtzVector::new(-0.4, 0.2, 0.0)))
            .await
            .unwrap();
        let again = orch.set_preset(&key(), None, Some("Dock")).await.unwrap();
        assert_eq!(first, again);

        let presets = orch.get_presets(&key(), None).await.unwrap();
        let dock: Vec<_> = presets.iter().filter(|p| p.name == "Dock").collect();
        assert_eq!(dock.len(), 1);
        assert_eq!(dock[0].position, PtzVector::new(-0.4, 0.2, 0.0));
    }

    #[tokio::test]
    async fn unnamed_presets_get_timestamped_names() {
        let orch = orchestrator();
        let token = orch.set_preset(&key(), None, None).await.unwrap();
        let presets = orch.get_presets(&key(), None).await.unwrap();
        let saved = presets.iter().find(|p| p.token == token).unwrap();
        assert!(saved.name.starts_with("Preset_"), "{}", saved.name);
    }

    #[tokio::test]
    async fn remove_and_update_unknown_presets_fail() {
        let orch = orchestrator();
        assert!(matches!(
            orch.remove_preset(&key(), None, "preset_42").await,
            Err(TourError::NotFound(_))
        ));
        assert!(matches!(
            orch.update_preset(&key(), None, "preset_42", None, None).await,
            Err(TourError::NotFound(_))
        ));
        assert!(matches!(
            orch.goto_preset(&key(), None, "preset_42", None).await,
            Err(TourError::NotFound(_))
        ));

        orch.remove_preset(&key(), None, "preset_3").await.unwrap();
        let tokens: Vec<_> = orch
            .get_presets(&key(), None)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.token)
            .collect();
        assert_eq!(tokens, ["preset_1", "preset_2"]);
    }

    #[tokio::test]
    async fn update_preset_moves_and_renames() {
        let orch = orchestrator();
        orch.update_preset(
            &key(),
            None,
            "preset_2",
            Some("Loading Bay"),
            Some(PtzVector::new(0.9, -0.9, 0.9)),
        )
        .await
        .unwrap();

        let presets = orch.get_presets(&key(), None).await.unwrap();
        let updated = presets.iter().find(|p| p.token == "preset_2").unwrap();
        assert_eq!(updated.name, "Loading Bay");
        assert_eq!(updated.position, PtzVector::new(0.9, -0.9, 0.9));
    }

    #[tokio::test(start_paused = true)]
    async fn goto_preset_drives_the_simulator() {
        let orch = orchestrator();
        let reply = orch
            .goto_preset(&key(), None, "preset_3", Some(0.5))
            .await
            .unwrap();
        assert!(reply.success);

        let busy = orch.goto_preset(&key(), None, "preset_2", None).await.unwrap();
        assert!(!busy.success);

        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
        let status = orch.get_status(&key(), None).await.unwrap();
        assert!(!status.moving);
        assert_eq!(status.position, PtzVector::new(-0.3, -0.1, 0.5));
    }
}
