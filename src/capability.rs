use crate::device::DeviceClient;
use crate::session::DeviceSession;
use crate::types::DeviceSessionKey;
use dashmap::DashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeOutcome {
    Supported,
    Unsupported,
    Inconclusive,
}

impl From<bool> for ProbeOutcome {
    fn from(supported: bool) -> Self {
        if supported {
            ProbeOutcome::Supported
        } else {
            ProbeOutcome::Unsupported
        }
    }
}

/// Per-session memo of native tour support.
#[derive(Default)]
pub struct CapabilityProbe {
    cache: DashMap<DeviceSessionKey, bool>,
}

impl CapabilityProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the session's device runs preset tours itself. Computed on
    /// first use and cached until [`CapabilityProbe::invalidate`].
    pub async fn supports(&self, session: &DeviceSession) -> bool {
        if let Some(cached) = self.cache.get(session.key()) {
            return *cached;
        }

        let supported = match session.client() {
            Some(client) => Self::probe(session, client.as_ref()).await,
            None => false,
        };

        info!(
            session = %session.key(),
            supported,
            "Native preset tour support resolved"
        );
        // Concurrent probes of the same session agree; first writer wins.
        *self
            .cache
            .entry(session.key().clone())
            .or_insert(supported)
    }

    pub fn invalidate(&self, key: &DeviceSessionKey) {
        self.cache.remove(key);
    }

    async fn probe(session: &DeviceSession, client: &dyn DeviceClient) -> bool {
        let key = session.key();

        let outcome = match client.get_capabilities().await {
            Ok(caps) => caps
                .preset_tour
                .map(ProbeOutcome::from)
                .unwrap_or(ProbeOutcome::Inconclusive),
            Err(e) => {
                debug!(session = %key, error = %e, "Capability query failed");
                ProbeOutcome::Inconclusive
            }
        };
        if let Some(answer) = Self::definitive(outcome) {
            return answer;
        }

        match client.get_configurations().await {
            Ok(configs) => {
                if configs
                    .iter()
                    .any(|c| c.default_preset_tour_token.is_some())
                {
                    return true;
                }
            }
            Err(e) => debug!(session = %key, error = %e, "Configuration query failed"),
        }

        let profile = match session.resolve_profile(None).await {
            Ok(profile) => profile,
            Err(e) => {
                debug!(session = %key, error = %e, "No profile to probe native tours with");
                return false;
            }
        };

        match client.list_native_tours(&profile).await {
            Ok(_) => return true,
            Err(e) => debug!(session = %key, error = %e, "Native tour listing failed"),
        }

        let outcome = match client.native_tour_supported(&profile).await {
            Ok(known) => ProbeOutcome::from(known),
            Err(e) => {
                debug!(session = %key, error = %e, "Native tour operation check failed");
                ProbeOutcome::Inconclusive
            }
        };
        Self::definitive(outcome).unwrap_or(false)
    }

    fn definitive(outcome: ProbeOutcome) -> Option<bool> {
        match outcome {
            ProbeOutcome::Supported => Some(true),
            ProbeOutcome::Unsupported => Some(false),
            ProbeOutcome::Inconclusive => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TourConfig;
    use crate::device::{
        DeviceCapabilities, DeviceError, MockDeviceClient, PtzConfiguration,
    };
    use crate::types::Profile;
    use std::sync::Arc;

    fn session_with(client: MockDeviceClient) -> DeviceSession {
        DeviceSession::new(
            DeviceSessionKey::new("10.0.0.9", "admin"),
            Some(Arc::new(client)),
            &TourConfig::default(),
        )
    }

    fn one_profile(client: &mut MockDeviceClient) {
        client.expect_list_profiles().returning(|| {
            Ok(vec![Profile {
                token: "main".into(),
                name: "Main".into(),
                ptz_enabled: true,
            }])
        });
    }

    fn transport() -> DeviceError {
        DeviceError::Transport("connection reset".into())
    }

    #[tokio::test]
    async fn simulated_session_is_unsupported() {
        let session = DeviceSession::new(
            DeviceSessionKey::new("sim://cam", "admin"),
            None,
            &TourConfig::default(),
        );
        assert!(!CapabilityProbe::new().supports(&session).await);
    }

    #[tokio::test]
    async fn capability_flag_is_definitive_and_cached() {
        let mut client = MockDeviceClient::new();
        client.expect_get_capabilities().times(1).returning(|| {
            Ok(DeviceCapabilities {
                ptz: true,
                preset_tour: Some(true),
            })
        });
        client.expect_get_configurations().never();

        let session = session_with(client);
        let probe = CapabilityProbe::new();
        assert!(probe.supports(&session).await);
        assert!(probe.supports(&session).await);
    }

    #[tokio::test]
    async fn explicit_false_skips_remaining_probes() {
        let mut client = MockDeviceClient::new();
        client.expect_get_capabilities().returning(|| {
            Ok(DeviceCapabilities {
                ptz: true,
                preset_tour: Some(false),
            })
        });
        client.expect_list_native_tours().never();

        assert!(!CapabilityProbe::new().supports(&session_with(client)).await);
    }

    #[tokio::test]
    async fn configuration_tour_token_implies_support() {
        let mut client = MockDeviceClient::new();
        client.expect_get_capabilities().returning(|| Err(transport()));
        client.expect_get_configurations().returning(|| {
            Ok(vec![PtzConfiguration {
                token: "cfg".into(),
                default_preset_tour_token: Some("tour".into()),
            }])
        });

        assert!(CapabilityProbe::new().supports(&session_with(client)).await);
    }

    #[tokio::test]
    async fn successful_listing_implies_support() {
        let mut client = MockDeviceClient::new();
        client
            .expect_get_capabilities()
            .returning(|| Ok(DeviceCapabilities::default()));
        client.expect_get_configurations().returning(|| Ok(vec![]));
        one_profile(&mut client);
        client.expect_list_native_tours().returning(|_| Ok(vec![]));

        assert!(CapabilityProbe::new().supports(&session_with(client)).await);
    }

    #[tokio::test]
    async fn all_probes_failing_falls_back_to_manual() {
        let mut client = MockDeviceClient::new();
        client.expect_get_capabilities().returning(|| Err(transport()));
        client.expect_get_configurations().returning(|| Err(transport()));
        one_profile(&mut client);
        client
            .expect_list_native_tours()
            .returning(|_| Err(DeviceError::Unsupported("GetPresetTours".into())));
        client
            .expect_native_tour_supported()
            .returning(|_| Err(transport()));

        assert!(!CapabilityProbe::new().supports(&session_with(client)).await);
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_probe() {
        let mut client = MockDeviceClient::new();
        client.expect_get_capabilities().times(2).returning(|| {
            Ok(DeviceCapabilities {
                ptz: true,
                preset_tour: Some(true),
            })
        });

        let session = session_with(client);
        let probe = CapabilityProbe::new();
        assert!(probe.supports(&session).await);
        probe.invalidate(session.key());
        assert!(probe.supports(&session).await);
    }
}
