//! Domain models - core types for convoy detection
//!
//! This module contains the canonical data types used throughout the system:
//! - `ReadEvent` / `ReaderInfo` - input supplied by the read provider and reader directory
//! - `PlatePair` / `CoOccurrence` - evidence accumulated during one run
//! - `ConvoyResult` / `DetectionReport` - what a run returns
//! - `DetectionRequest` - caller configuration and filters
//! - `DetectionError` - fatal error taxonomy

pub mod error;
pub mod request;
pub mod types;

// Re-export commonly used types at module level
pub use error::DetectionError;
pub use request::{DetectionParams, DetectionRequest, ReadFilter};
pub use types::{
    CoOccurrence, ConvoyDetail, ConvoyResult, DetectionReport, PlatePair, ReadEvent, ReadId,
    ReaderInfo, RunStats, TargetRead,
};
