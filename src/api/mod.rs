//! Public engine API and the headcount document store

pub mod engine;
pub mod headcount;

pub use engine::{ErrorScanReport, ErrorScanStep, HeadcountSample, LocalizationEngine, PassSummary};
pub use headcount::{HeadcountError, HeadcountStore};
