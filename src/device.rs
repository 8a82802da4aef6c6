use crate::tour::{
    ExecutionMode, PresetTour, RunState, StartingCondition, TourDefinition, TourStep,
    format_stay_time, parse_iso8601_duration,
};
use crate::types::{DeviceSessionKey, Preset, Profile, PtzVector};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request rejected by device: {0}")]
    Rejected(String),

    #[error("Operation not supported by device: {0}")]
    Unsupported(String),
}

pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceCapabilities {
    pub ptz: bool,
    /// Service-level preset tour flag, when the device reports one.
    pub preset_tour: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PtzConfiguration {
    pub token: String,
    pub default_preset_tour_token: Option<String>,
}

/// Any subset of the three axes. Used for positions, translations,
/// velocities and speeds alike.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PtzAxes {
    pub pan_tilt: Option<(f64, f64)>,
    pub zoom: Option<f64>,
}

impl PtzAxes {
    pub fn full(v: PtzVector) -> Self {
        Self {
            pan_tilt: Some((v.pan, v.tilt)),
            zoom: Some(v.zoom),
        }
    }

    pub fn uniform(speed: f64) -> Self {
        Self {
            pan_tilt: Some((speed, speed)),
            zoom: Some(speed),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pan_tilt.is_none() && self.zoom.is_none()
    }

    /// Overlays the supplied axes on `base`.
    pub fn apply_to(&self, base: PtzVector) -> PtzVector {
        let (pan, tilt) = self.pan_tilt.unwrap_or((base.pan, base.tilt));
        PtzVector {
            pan,
            tilt,
            zoom: self.zoom.unwrap_or(base.zoom),
        }
    }

    /// Adds the supplied axes to `base`.
    pub fn offset(&self, base: PtzVector) -> PtzVector {
        let (dp, dt) = self.pan_tilt.unwrap_or((0.0, 0.0));
        PtzVector {
            pan: base.pan + dp,
            tilt: base.tilt + dt,
            zoom: base.zoom + self.zoom.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveRequest {
    pub target: PtzAxes,
    pub speed: Option<PtzAxes>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousMoveRequest {
    pub velocity: PtzAxes,
    /// ISO-8601 device-side timeout.
    pub timeout: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetPresetRequest {
    pub name: Option<String>,
    /// Overwrite this preset instead of allocating a new one.
    pub preset_token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PtzStatus {
    pub position: PtzVector,
    pub moving: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NativeVector2D {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NativeVector1D {
    pub x: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NativeSpeed {
    pub pan_tilt: NativeVector2D,
    pub zoom: NativeVector1D,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NativePresetDetail {
    pub preset_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NativeTourSpot {
    pub preset_detail: NativePresetDetail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<NativeSpeed>,
    pub stay_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NativeStartingCondition {
    pub recurring_time: u32,
    pub recurring_duration: String,
    pub random_preset_order: bool,
}

/// Tour in the shape the device protocol expects for create/modify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NativeTourSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub auto_start: bool,
    pub starting_condition: NativeStartingCondition,
    #[serde(default)]
    pub tour_spot: Vec<NativeTourSpot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NativeTourState {
    Idle,
    #[serde(alias = "Running")]
    Touring,
    Paused,
    Extended,
}

/// Tour as reported by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NativeTour {
    pub token: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub starting_condition: Option<NativeStartingCondition>,
    #[serde(default)]
    pub tour_spot: Vec<NativeTourSpot>,
    #[serde(default)]
    pub state: Option<NativeTourState>,
}

impl From<&StartingCondition> for NativeStartingCondition {
    fn from(c: &StartingCondition) -> Self {
        Self {
            recurring_time: c.recurring_time,
            recurring_duration: c.recurring_duration.clone(),
            random_preset_order: c.random_preset_order,
        }
    }
}

impl From<NativeStartingCondition> for StartingCondition {
    fn from(c: NativeStartingCondition) -> Self {
        Self {
            recurring_time: c.recurring_time,
            recurring_duration: c.recurring_duration,
            random_preset_order: c.random_preset_order,
        }
    }
}

impl From<&TourStep> for NativeTourSpot {
    fn from(step: &TourStep) -> Self {
        Self {
            preset_detail: NativePresetDetail {
                preset_token: step.preset_token.clone(),
            },
            speed: (step.speed > 0.0).then_some(NativeSpeed {
                pan_tilt: NativeVector2D {
                    x: step.speed,
                    y: step.speed,
                },
                zoom: NativeVector1D { x: step.speed },
            }),
            stay_time: format_stay_time(step.wait_time_seconds),
        }
    }
}

impl From<&NativeTourSpot> for TourStep {
    fn from(spot: &NativeTourSpot) -> Self {
        let wait = parse_iso8601_duration(&spot.stay_time)
            .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
            .unwrap_or(0);
        Self {
            preset_token: spot.preset_detail.preset_token.clone(),
            speed: spot.speed.map(|s| s.pan_tilt.x).unwrap_or(0.0),
            wait_time_seconds: wait,
        }
    }
}

impl NativeTourSpec {
    pub fn from_definition(def: &TourDefinition, token: Option<String>) -> Self {
        Self {
            token,
            name: Some(def.name.clone()),
            auto_start: def.auto_start,
            starting_condition: (&def.starting_condition).into(),
            tour_spot: def.steps.iter().map(NativeTourSpot::from).collect(),
        }
    }
}

impl NativeTour {
    /// `local` is the optimistic state recorded by the executor; a state
    /// reported by the device wins over it.
    pub fn into_preset_tour(self, local: Option<RunState>) -> PresetTour {
        let run_state = match self.state {
            Some(NativeTourState::Touring) => RunState::Running,
            Some(_) => RunState::Idle,
            None => local.unwrap_or(RunState::Idle),
        };
        PresetTour {
            name: self.name.unwrap_or_else(|| "Native Tour".to_string()),
            steps: self.tour_spot.iter().map(TourStep::from).collect(),
            auto_start: self.auto_start,
            starting_condition: self
                .starting_condition
                .map(StartingCondition::from)
                .unwrap_or_default(),
            execution_mode: ExecutionMode::Native,
            run_state,
            token: self.token,
        }
    }
}

/// Device-control capability consumed by the engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Query service capabilities
    async fn get_capabilities(&self) -> DeviceResult<DeviceCapabilities>;

    /// Read PTZ configuration objects
    async fn get_configurations(&self) -> DeviceResult<Vec<PtzConfiguration>>;

    /// List media profiles
    async fn list_profiles(&self) -> DeviceResult<Vec<Profile>>;

    /// Current position and motion state
    async fn get_status(&self, profile: &str) -> DeviceResult<PtzStatus>;

    async fn absolute_move(&self, profile: &str, request: &MoveRequest) -> DeviceResult<()>;

    async fn relative_move(&self, profile: &str, request: &MoveRequest) -> DeviceResult<()>;

    async fn continuous_move(
        &self,
        profile: &str,
        request: &ContinuousMoveRequest,
    ) -> DeviceResult<()>;

    /// Stop pan/tilt and/or zoom motion
    async fn stop(&self, profile: &str, pan_tilt: bool, zoom: bool) -> DeviceResult<()>;

    async fn list_presets(&self, profile: &str) -> DeviceResult<Vec<Preset>>;

    async fn goto_preset(
        &self,
        profile: &str,
        preset_token: &str,
        speed: Option<PtzAxes>,
    ) -> DeviceResult<()>;

    /// Save the current position as a preset, returning its token
    async fn set_preset(&self, profile: &str, request: &SetPresetRequest) -> DeviceResult<String>;

    async fn remove_preset(&self, profile: &str, preset_token: &str) -> DeviceResult<()>;

    /// Whether the device abstraction knows the native tour operations at all
    async fn native_tour_supported(&self, profile: &str) -> DeviceResult<bool>;

    async fn list_native_tours(&self, profile: &str) -> DeviceResult<Vec<NativeTour>>;

    /// Create a device-side tour, returning its token
    async fn create_native_tour(&self, profile: &str, spec: &NativeTourSpec)
    -> DeviceResult<String>;

    async fn modify_native_tour(&self, profile: &str, spec: &NativeTourSpec) -> DeviceResult<()>;

    async fn operate_native_tour(
        &self,
        profile: &str,
        tour_token: &str,
        operation: crate::tour::TourOperation,
    ) -> DeviceResult<()>;

    async fn remove_native_tour(&self, profile: &str, tour_token: &str) -> DeviceResult<()>;
}

/// Opens device sessions. `Ok(None)` means "no physical device": the
/// session runs on the motion simulator.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self, key: &DeviceSessionKey)
    -> DeviceResult<Option<Arc<dyn DeviceClient>>>;
}

/// Connector for demo and test setups without hardware.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedConnector;

#[async_trait]
impl DeviceConnector for SimulatedConnector {
    async fn connect(
        &self,
        _key: &DeviceSessionKey,
    ) -> DeviceResult<Option<Arc<dyn DeviceClient>>> {
        Ok(None)
    }
}
