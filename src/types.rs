use crate::constants::{PAN_TILT_RANGE, ZOOM_RANGE};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one logical camera connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceSessionKey {
    pub device_address: String,
    pub principal: String,
}

impl DeviceSessionKey {
    pub fn new(device_address: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            device_address: device_address.into(),
            principal: principal.into(),
        }
    }
}

impl fmt::Display for DeviceSessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device_address, self.principal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PtzVector {
    pub pan: f64,
    pub tilt: f64,
    pub zoom: f64,
}

impl PtzVector {
    pub fn new(pan: f64, tilt: f64, zoom: f64) -> Self {
        Self { pan, tilt, zoom }
    }

    /// Clamps pan/tilt to [-1, 1] and zoom to [0, 1].
    pub fn clamped(self) -> Self {
        Self {
            pan: self.pan.clamp(PAN_TILT_RANGE.0, PAN_TILT_RANGE.1),
            tilt: self.tilt.clamp(PAN_TILT_RANGE.0, PAN_TILT_RANGE.1),
            zoom: self.zoom.clamp(ZOOM_RANGE.0, ZOOM_RANGE.1),
        }
    }

    /// Largest per-axis distance to `other`.
    pub fn max_distance(&self, other: &PtzVector) -> f64 {
        (other.pan - self.pan)
            .abs()
            .max((other.tilt - self.tilt).abs())
            .max((other.zoom - self.zoom).abs())
    }

    pub fn lerp(&self, target: &PtzVector, progress: f64) -> PtzVector {
        PtzVector {
            pan: self.pan + (target.pan - self.pan) * progress,
            tilt: self.tilt + (target.tilt - self.tilt) * progress,
            zoom: self.zoom + (target.zoom - self.zoom) * progress,
        }
    }
}

/// Last known position of a session's camera.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionState {
    pub position: PtzVector,
    pub moving: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub token: String,
    pub name: String,
    pub position: PtzVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub token: String,
    pub name: String,
    pub ptz_enabled: bool,
}

/// Outcome handed back across the RPC boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub success: bool,
    pub message: String,
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    pub fn from_result(result: Result<Reply>) -> Self {
        result.unwrap_or_else(|e| Reply::failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TourError;

    #[test]
    fn clamps_axes_to_legal_ranges() {
        let v = PtzVector::new(1.7, -3.0, -0.2).clamped();
        assert_eq!(v, PtzVector::new(1.0, -1.0, 0.0));
    }

    #[test]
    fn max_distance_uses_largest_axis() {
        let a = PtzVector::new(0.0, 0.0, 0.0);
        let b = PtzVector::new(0.5, -0.8, 0.3);
        assert!((a.max_distance(&b) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn error_folds_into_failed_reply() {
        let reply = Reply::from_result(Err(TourError::NotFound("tour 'x'".into())));
        assert!(!reply.success);
        assert!(reply.message.contains("tour 'x'"));
    }

    #[test]
    fn session_key_display() {
        let key = DeviceSessionKey::new("http://10.0.0.5", "admin");
        assert_eq!(key.to_string(), "http://10.0.0.5:admin");
    }
}
