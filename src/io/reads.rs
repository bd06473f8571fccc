//! Read provider - ALPR read events for one case
//!
//! Reads are stored one JSON object per line:
//! `{"id": 1, "plate": "1234ABC", "reader_id": "CAM001", "timestamp": "2024-03-01 10:00:00",
//!   "source_type": "LPR", "case_id": 7}`
//!
//! Lines that cannot be used (bad JSON, bad timestamp, blank plate, no reader)
//! are skipped with a warning and counted. Reads from other cases or from
//! non-LPR sources are excluded silently.

use crate::domain::request::ReadFilter;
use crate::domain::types::ReadEvent;
use anyhow::Context;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// Only reads from this source type feed convoy detection
pub const LPR_SOURCE_TYPE: &str = "LPR";

const TIMESTAMP_FORMATS: [&str; 4] =
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Which reads a caller wants
#[derive(Debug, Clone, Default)]
pub struct ReadQuery {
    /// Restrict to one case; `None` accepts every line
    pub case_id: Option<i64>,
    pub filter: ReadFilter,
}

/// Counters from one load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub lines_total: u64,
    pub accepted: u64,
    pub skipped_malformed: u64,
    pub excluded_case: u64,
    pub excluded_source_type: u64,
    pub excluded_filter: u64,
}

/// Reads plus load diagnostics
#[derive(Debug, Clone, Default)]
pub struct LoadedReads {
    pub events: Vec<ReadEvent>,
    pub stats: LoadStats,
}

/// Source of read events
pub trait ReadProvider {
    fn load(&self, query: &ReadQuery) -> anyhow::Result<LoadedReads>;
}

/// Read record as stored on disk
#[derive(Debug, Deserialize)]
struct ReadRecord {
    id: i64,
    plate: String,
    #[serde(default)]
    reader_id: Option<String>,
    timestamp: String,
    #[serde(default)]
    source_type: Option<String>,
    #[serde(default)]
    case_id: Option<i64>,
}

/// Parse a read timestamp. Offsets are dropped: reads are compared in the
/// reader's local clock.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts);
        }
    }
    DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.naive_local())
}

/// JSONL-backed read provider
pub struct JsonlReadSource {
    path: String,
}

impl JsonlReadSource {
    pub fn new(path: &str) -> Self {
        Self { path: path.to_string() }
    }

    /// Parse reads from any buffered reader
    pub fn parse<R: BufRead>(input: R, query: &ReadQuery) -> anyhow::Result<LoadedReads> {
        let mut loaded = LoadedReads::default();

        for (index, line) in input.lines().enumerate() {
            let line_no = index + 1;
            let line = line.with_context(|| format!("Failed to read line {line_no}"))?;
            if line.trim().is_empty() {
                continue;
            }
            loaded.stats.lines_total += 1;

            let record: ReadRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(line = %line_no, error = %e, "read_line_malformed");
                    loaded.stats.skipped_malformed += 1;
                    continue;
                }
            };

            if query.case_id.is_some_and(|case_id| record.case_id != Some(case_id)) {
                loaded.stats.excluded_case += 1;
                continue;
            }

            let source_type = record.source_type.as_deref().unwrap_or(LPR_SOURCE_TYPE);
            if !source_type.eq_ignore_ascii_case(LPR_SOURCE_TYPE) {
                loaded.stats.excluded_source_type += 1;
                continue;
            }

            let Some(timestamp) = parse_timestamp(&record.timestamp) else {
                warn!(
                    read_id = %record.id,
                    timestamp = %record.timestamp,
                    "read_timestamp_malformed"
                );
                loaded.stats.skipped_malformed += 1;
                continue;
            };

            let plate = record.plate.trim();
            let reader_id = record.reader_id.as_deref().map(str::trim).unwrap_or_default();
            if plate.is_empty() || reader_id.is_empty() {
                warn!(
                    read_id = %record.id,
                    plate = %plate,
                    reader_id = %reader_id,
                    "read_missing_plate_or_reader"
                );
                loaded.stats.skipped_malformed += 1;
                continue;
            }

            if !query.filter.matches(&timestamp) {
                loaded.stats.excluded_filter += 1;
                continue;
            }

            loaded.events.push(ReadEvent::new(record.id, plate, reader_id, timestamp));
            loaded.stats.accepted += 1;
        }

        debug!(
            lines = %loaded.stats.lines_total,
            accepted = %loaded.stats.accepted,
            malformed = %loaded.stats.skipped_malformed,
            "reads_parsed"
        );
        Ok(loaded)
    }
}

impl ReadProvider for JsonlReadSource {
    fn load(&self, query: &ReadQuery) -> anyhow::Result<LoadedReads> {
        let path = Path::new(&self.path);
        let file = File::open(path)
            .with_context(|| format!("Failed to open reads file {}", path.display()))?;
        let loaded = Self::parse(BufReader::new(file), query)
            .with_context(|| format!("Failed to load reads file {}", path.display()))?;

        info!(
            path = %self.path,
            case_id = ?query.case_id,
            accepted = %loaded.stats.accepted,
            skipped_malformed = %loaded.stats.skipped_malformed,
            excluded_case = %loaded.stats.excluded_case,
            excluded_source_type = %loaded.stats.excluded_source_type,
            excluded_filter = %loaded.stats.excluded_filter,
            "reads_loaded"
        );
        Ok(loaded)
    }
}
