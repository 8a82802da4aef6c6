pub mod device_info;
pub mod motion;
pub mod presets;
pub mod tours;

pub use device_info::{DeviceInfo, PtzCapabilities};
pub use motion::Motion;
pub use presets::Presets;
pub use tours::PresetTours;
