pub mod capability;
pub mod commands;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod registry;
pub mod session;
pub mod simulator;
pub mod tour;
pub mod types;

pub use commands::*;
pub use config::TourConfig;
pub use device::{DeviceClient, DeviceConnector, DeviceError, SimulatedConnector};
pub use error::{Result, TourError};
pub use orchestrator::TourOrchestrator;
pub use tour::{
    ExecutionMode, NewTour, PresetTour, RunState, StartingCondition, TourChanges, TourOperation,
    TourStep,
};
pub use types::{DeviceSessionKey, PositionState, Preset, Profile, PtzVector, Reply};
