pub const PAN_TILT_RANGE: (f64, f64) = (-1.0, 1.0);
pub const ZOOM_RANGE: (f64, f64) = (0.0, 1.0);

/// Units per second covered by the simulator at speed 1.0.
pub const SIMULATED_BASE_SPEED: f64 = 2.0;
/// Floor applied to non-positive simulator speeds.
pub const MIN_SIMULATED_SPEED: f64 = 1e-3;

pub const MOTION_TICK_MS: u64 = 100;
pub const MOTION_POLL_MS: u64 = 100;
pub const DWELL_TICK_MS: u64 = 1000;
pub const STOP_JOIN_TIMEOUT_MS: u64 = 5000;
pub const SIMULATED_CONTINUOUS_MOVE_SECS: f64 = 2.0;

// Most devices stop a continuous move after ~10s unless told otherwise.
pub const CONTINUOUS_MOVE_DEVICE_TIMEOUT: &str = "PT86400S";
pub const DEFAULT_RECURRING_DURATION: &str = "PT10S";

pub const PRESET_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub const MANUAL_TOUR_TOKEN_PREFIX: &str = "ManualTour_";
pub const SIMULATED_PRESET_TOKEN_PREFIX: &str = "preset_";

/// (token, name, pan, tilt, zoom)
pub const SIMULATED_PRESETS: &[(&str, &str, f64, f64, f64)] = &[
    ("preset_1", "Home Position", 0.0, 0.0, 0.0),
    ("preset_2", "Entrance View", 0.5, 0.2, 0.3),
    ("preset_3", "Parking View", -0.3, -0.1, 0.5),
];

/// (token, name)
pub const SIMULATED_PROFILES: &[(&str, &str)] =
    &[("profile_1", "Main Stream"), ("profile_2", "Sub Stream")];
