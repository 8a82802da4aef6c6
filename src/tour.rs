use crate::error::{Result, TourError};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourStep {
    pub preset_token: String,
    /// 0.0 to 1.0; 0.0 leaves the speed to the device.
    pub speed: f64,
    pub wait_time_seconds: u32,
}

impl TourStep {
    pub fn new(preset_token: impl Into<String>, speed: f64, wait_time_seconds: u32) -> Self {
        Self {
            preset_token: preset_token.into(),
            speed,
            wait_time_seconds,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.preset_token.trim().is_empty() {
            return Err(TourError::InvalidArgument(
                "tour step has an empty preset token".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.speed) {
            return Err(TourError::InvalidArgument(format!(
                "step speed {} for preset '{}' is outside 0.0..=1.0",
                self.speed, self.preset_token
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartingCondition {
    /// Number of full cycles to run; 0 loops until stopped.
    pub recurring_time: u32,
    pub recurring_duration: String,
    pub random_preset_order: bool,
}

impl StartingCondition {
    pub fn with_recurring_duration(recurring_duration: impl Into<String>) -> Self {
        Self {
            recurring_time: 0,
            recurring_duration: recurring_duration.into(),
            random_preset_order: false,
        }
    }

    pub fn recurring_interval(&self) -> Option<Duration> {
        parse_iso8601_duration(&self.recurring_duration)
    }

    pub fn cycle_limit(&self) -> Option<u32> {
        (self.recurring_time > 0).then_some(self.recurring_time)
    }
}

impl Default for StartingCondition {
    fn default() -> Self {
        Self::with_recurring_duration(crate::constants::DEFAULT_RECURRING_DURATION)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ExecutionMode {
    Native,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
}

/// Verbs accepted by `OperateTour`. Parsing ignores case; `as_ref()` gives
/// the capitalized form devices expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display)]
#[strum(ascii_case_insensitive)]
pub enum TourOperation {
    Start,
    Stop,
    Pause,
    Resume,
}

impl TourOperation {
    pub fn parse(raw: &str) -> Result<Self> {
        raw.trim()
            .parse()
            .map_err(|_| TourError::InvalidOperation(format!("'{}'", raw)))
    }
}

/// Snapshot of a tour as handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetTour {
    pub token: String,
    pub name: String,
    pub steps: Vec<TourStep>,
    pub auto_start: bool,
    pub starting_condition: StartingCondition,
    pub execution_mode: ExecutionMode,
    pub run_state: RunState,
}

/// Caller-supplied fields of a new tour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTour {
    pub name: Option<String>,
    pub steps: Vec<TourStep>,
    pub auto_start: bool,
    pub starting_condition: Option<StartingCondition>,
}

/// Partial update; `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TourChanges {
    pub steps: Option<Vec<TourStep>>,
    pub auto_start: Option<bool>,
    pub starting_condition: Option<StartingCondition>,
}

/// Stored, user-editable part of a tour.
#[derive(Debug, Clone, PartialEq)]
pub struct TourDefinition {
    pub name: String,
    pub steps: Vec<TourStep>,
    pub auto_start: bool,
    pub starting_condition: StartingCondition,
}

impl TourDefinition {
    pub fn apply(&mut self, changes: TourChanges) {
        if let Some(steps) = changes.steps {
            self.steps = steps;
        }
        if let Some(auto_start) = changes.auto_start {
            self.auto_start = auto_start;
        }
        if let Some(condition) = changes.starting_condition {
            self.starting_condition = condition;
        }
    }
}

pub(crate) fn validate_steps(steps: &[TourStep]) -> Result<()> {
    steps.iter().try_for_each(TourStep::validate)
}

/// Parses the subset of ISO-8601 durations devices use (`PT10S`,
/// `PT1H30M`, `P1DT2H`). Years and months are rejected.
pub fn parse_iso8601_duration(raw: &str) -> Option<Duration> {
    let rest = raw.trim().strip_prefix('P')?;
    if rest.is_empty() {
        return None;
    }

    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) if t.is_empty() => (d, None),
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut secs = 0.0f64;
    let mut parsed_any = false;

    let mut accumulate = |part: &str, units: &[(char, f64)]| -> Option<()> {
        let mut number = String::new();
        let mut unit_idx = 0;
        for c in part.chars() {
            if c.is_ascii_digit() || c == '.' || c == ',' {
                number.push(if c == ',' { '.' } else { c });
                continue;
            }
            let pos = units[unit_idx..].iter().position(|(u, _)| *u == c)?;
            unit_idx += pos + 1;
            let value: f64 = number.parse().ok()?;
            secs += value * units[unit_idx - 1].1;
            number.clear();
            parsed_any = true;
        }
        number.is_empty().then_some(())
    };

    accumulate(date_part, &[('W', 604_800.0), ('D', 86_400.0)])?;
    if let Some(time) = time_part {
        accumulate(time, &[('H', 3_600.0), ('M', 60.0), ('S', 1.0)])?;
    }

    if !parsed_any {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

pub fn format_stay_time(seconds: u32) -> String {
    format!("PT{}S", seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_durations() {
        assert_eq!(parse_iso8601_duration("PT10S"), Some(Duration::from_secs(10)));
        assert_eq!(
            parse_iso8601_duration("PT1H30M"),
            Some(Duration::from_secs(5400))
        );
        assert_eq!(
            parse_iso8601_duration("P1DT2H"),
            Some(Duration::from_secs(93_600))
        );
        assert_eq!(
            parse_iso8601_duration("PT0.5S"),
            Some(Duration::from_millis(500))
        );
        assert_eq!(
            parse_iso8601_duration("PT86400S"),
            Some(Duration::from_secs(86_400))
        );
    }

    #[test]
    fn rejects_malformed_durations() {
        for raw in [
            "",
            "P",
            "PT",
            "10S",
            "PT10",
            "PTS",
            "PT5S10M",
            "P1Y",
            "PT1X",
            "PT99999999999999999999S",
            "P99999999999999999999W",
        ] {
            assert_eq!(parse_iso8601_duration(raw), None, "{raw}");
        }
    }

    #[test]
    fn operation_parsing_ignores_case() {
        assert_eq!(TourOperation::parse("start").unwrap(), TourOperation::Start);
        assert_eq!(TourOperation::parse("STOP").unwrap(), TourOperation::Stop);
        assert_eq!(TourOperation::parse(" Resume ").unwrap(), TourOperation::Resume);
        assert_eq!(TourOperation::Pause.as_ref(), "Pause");
        assert!(matches!(
            TourOperation::parse("rewind"),
            Err(TourError::InvalidOperation(_))
        ));
    }

    #[test]
    fn step_speed_must_be_normalized() {
        assert!(TourStep::new("preset_1", 0.5, 2).validate().is_ok());
        assert!(TourStep::new("preset_1", 1.5, 2).validate().is_err());
        assert!(TourStep::new("preset_1", f64::NAN, 2).validate().is_err());
        assert!(TourStep::new("  ", 0.5, 2).validate().is_err());
    }

    #[test]
    fn changes_apply_only_supplied_fields() {
        let mut def = TourDefinition {
            name: "Patrol".into(),
            steps: vec![TourStep::new("preset_1", 0.5, 2)],
            auto_start: false,
            starting_condition: StartingCondition::default(),
        };
        def.apply(TourChanges {
            auto_start: Some(true),
            ..Default::default()
        });
        assert!(def.auto_start);
        assert_eq!(def.steps.len(), 1);
        assert_eq!(def.starting_condition.recurring_duration, "PT10S");
    }

    #[test]
    fn zero_recurring_time_means_unbounded() {
        let mut cond = StartingCondition::default();
        assert_eq!(cond.cycle_limit(), None);
        cond.recurring_time = 3;
        assert_eq!(cond.cycle_limit(), Some(3));
        assert_eq!(cond.recurring_interval(), Some(Duration::from_secs(10)));
    }
}
