use crate::constants::{
    CONTINUOUS_MOVE_DEVICE_TIMEOUT, DEFAULT_RECURRING_DURATION, DWELL_TICK_MS, MOTION_POLL_MS,
    MOTION_TICK_MS, SIMULATED_CONTINUOUS_MOVE_SECS, STOP_JOIN_TIMEOUT_MS,
};
use crate::error::{Result, TourError};
use serde::Deserialize;
use tokio::time::Duration;

/// Timing knobs for the tour engine and the motion simulator.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use ptz_tour_rs::TourConfig;
///
/// let cfg = TourConfig::from_json(r#"{ "stop_join_timeout_ms": 2000 }"#).unwrap();
/// assert_eq!(cfg.stop_join_timeout().as_millis(), 2000);
/// assert_eq!(cfg.motion_tick().as_millis(), 100);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TourConfig {
    pub motion_tick_ms: u64,
    pub motion_poll_ms: u64,
    pub dwell_tick_ms: u64,
    pub stop_join_timeout_ms: u64,
    pub continuous_move_secs: f64,
    pub continuous_move_device_timeout: String,
    pub default_recurring_duration: String,
}

impl Default for TourConfig {
    fn default() -> Self {
        Self {
            motion_tick_ms: MOTION_TICK_MS,
            motion_poll_ms: MOTION_POLL_MS,
            dwell_tick_ms: DWELL_TICK_MS,
            stop_join_timeout_ms: STOP_JOIN_TIMEOUT_MS,
            continuous_move_secs: SIMULATED_CONTINUOUS_MOVE_SECS,
            continuous_move_device_timeout: CONTINUOUS_MOVE_DEVICE_TIMEOUT.to_string(),
            default_recurring_duration: DEFAULT_RECURRING_DURATION.to_string(),
        }
    }
}

impl TourConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw)
            .map_err(|e| TourError::Config(format!("Error parsing config: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.motion_tick_ms == 0 || self.motion_poll_ms == 0 || self.dwell_tick_ms == 0 {
            return Err(TourError::Config(
                "tick and poll intervals must be non-zero".to_string(),
            ));
        }
        if !(self.continuous_move_secs > 0.0
            && Duration::try_from_secs_f64(self.continuous_move_secs).is_ok())
        {
            return Err(TourError::Config(
                "continuous_move_secs must be a positive number".to_string(),
            ));
        }
        if crate::tour::parse_iso8601_duration(&self.default_recurring_duration).is_none() {
            return Err(TourError::Config(format!(
                "default_recurring_duration '{}' is not an ISO-8601 duration",
                self.default_recurring_duration
            )));
        }
        Ok(())
    }

    pub fn with_stop_join_timeout(mut self, timeout: Duration) -> Self {
        self.stop_join_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_motion_tick(mut self, tick: Duration) -> Self {
        self.motion_tick_ms = tick.as_millis().max(1) as u64;
        self
    }

    pub fn motion_tick(&self) -> Duration {
        Duration::from_millis(self.motion_tick_ms)
    }

    pub fn motion_poll(&self) -> Duration {
        Duration::from_millis(self.motion_poll_ms)
    }

    pub fn dwell_tick(&self) -> Duration {
        Duration::from_millis(self.dwell_tick_ms)
    }

    pub fn stop_join_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_join_timeout_ms)
    }

    /// Falls back to the built-in default when the configured value is not
    /// a representable duration.
    pub fn continuous_move_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.continuous_move_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| Duration::from_secs_f64(SIMULATED_CONTINUOUS_MOVE_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timings() {
        let cfg = TourConfig::default();
        assert_eq!(cfg.motion_tick(), Duration::from_millis(100));
        assert_eq!(cfg.dwell_tick(), Duration::from_secs(1));
        assert_eq!(cfg.stop_join_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.continuous_move_device_timeout, "PT86400S");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_tick() {
        let err = TourConfig::from_json(r#"{ "motion_tick_ms": 0 }"#).unwrap_err();
        assert!(matches!(err, TourError::Config(_)));
    }

    #[test]
    fn rejects_bad_recurring_duration() {
        let err = TourConfig::from_json(r#"{ "default_recurring_duration": "ten seconds" }"#)
            .unwrap_err();
        assert!(matches!(err, TourError::Config(_)));
    }

    #[test]
    fn rejects_durations_too_large_to_represent() {
        let err = TourConfig::from_json(
            r#"{ "default_recurring_duration": "PT99999999999999999999S" }"#,
        )
        .unwrap_err();
        assert!(matches!(err, TourError::Config(_)));

        let err = TourConfig::from_json(r#"{ "continuous_move_secs": 1e30 }"#).unwrap_err();
        assert!(matches!(err, TourError::Config(_)));

        let cfg = TourConfig {
            continuous_move_secs: 1e30,
            ..Default::default()
        };
        assert_eq!(cfg.continuous_move_duration(), Duration::from_secs(2));
    }

    #[test]
    fn builders_override_timings() {
        let cfg = TourConfig::default()
            .with_stop_join_timeout(Duration::from_millis(750))
            .with_motion_tick(Duration::from_millis(20));
        assert_eq!(cfg.stop_join_timeout_ms, 750);
        assert_eq!(cfg.motion_tick(), Duration::from_millis(20));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(TourConfig::from_json("{ not json").is_err());
    }
}
