//! IO modules - external collaborators
//!
//! This module contains the file-backed collaborators around the engine:
//! - `reads` - read provider (JSONL ALPR reads, case/source/date/time filtering)
//! - `readers` - reader directory (per-reader direction, road, coordinates)
//! - `report` - detection report egress (JSON to file or stdout)

pub mod readers;
pub mod reads;
pub mod report;

// Re-export commonly used types
pub use readers::{InMemoryReaderDirectory, ReaderDirectory};
pub use reads::{JsonlReadSource, LoadStats, LoadedReads, ReadProvider, ReadQuery};
pub use report::{ReportTarget, ReportWriter};
