//! Services - convoy detection pipeline
//!
//! This module contains the detection stages and the service wrapper:
//! - `pairing` - Windowed scan nominating co-travelling reads
//! - `aggregator` - Per-pair co-occurrence histories
//! - `significance` - Distinct reader/day floors and passing-order check
//! - `assembler` - Enriched, chronologically sorted result
//! - `detector` - Pure pipeline over one case's reads
//! - `runner` - Request validation, density guard, timeout and metrics

pub mod aggregator;
pub mod assembler;
pub mod detector;
pub mod pairing;
pub mod runner;
pub mod significance;

// Re-export commonly used types
pub use aggregator::{ConvoyCandidate, PairAggregator};
pub use detector::detect;
pub use pairing::PairingEngine;
pub use runner::{block_on_detached, DetectionLimits, DetectionRunner, RunOutcome};
pub use significance::{SignificanceFilter, Verdict};
