use crate::device::DeviceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TourError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already running: {0}")]
    AlreadyRunning(String),

    #[error("Not running: {0}")]
    NotRunning(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TourError>;
