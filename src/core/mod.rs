//! Core types and constants for the localization engine

pub mod types;
pub mod constants;
pub mod device;
pub mod zone;

pub use types::*;
pub use constants::*;
pub use device::Device;
pub use zone::Zone;
