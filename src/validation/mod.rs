//! Error taxonomy and accuracy measurement

pub mod accuracy;
pub mod error;

pub use accuracy::{AccuracyStatistics, AccuracyValidator};
pub use error::{LocalizationError, LocalizationResult};
