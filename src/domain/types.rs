//! Shared types for convoy detection

use crate::domain::error::DetectionError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;

/// Newtype wrapper for read ids to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(transparent)]
pub struct ReadId(pub i64);

impl fmt::Display for ReadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single ALPR sighting: one plate seen by one reader at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct ReadEvent {
    pub id: ReadId,
    pub plate: String,
    pub reader_id: String,
    pub timestamp: NaiveDateTime,
}

impl ReadEvent {
    pub fn new(id: i64, plate: &str, reader_id: &str, timestamp: NaiveDateTime) -> Self {
        Self {
            id: ReadId(id),
            plate: plate.to_string(),
            reader_id: reader_id.to_string(),
            timestamp,
        }
    }
}

/// Static metadata for one reader (camera)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReaderInfo {
    pub reader_id: String,
    /// Travel direction covered by the reader, e.g. "Norte"
    pub direction: Option<String>,
    pub orientation: Option<String>,
    /// Road the reader sits on, used for passing-order checks
    pub road: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ReaderInfo {
    pub fn new(reader_id: &str) -> Self {
        Self { reader_id: reader_id.to_string(), ..Self::default() }
    }

    pub fn with_direction(mut self, direction: &str) -> Self {
        self.direction = Some(direction.to_string());
        self
    }

    pub fn with_orientation(mut self, orientation: &str) -> Self {
        self.orientation = Some(orientation.to_string());
        self
    }

    pub fn with_road(mut self, road: &str) -> Self {
        self.road = Some(road.to_string());
        self
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Direction usable for matching; blank labels count as missing
    #[inline]
    pub fn resolved_direction(&self) -> Option<&str> {
        self.direction.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }

    /// Road usable for passing-order checks; blank labels count as missing
    #[inline]
    pub fn resolved_road(&self) -> Option<&str> {
        self.road.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }
}

/// Canonical key for exactly two distinct plates, stored as (min, max)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlatePair(String, String);

impl PlatePair {
    /// Build the canonical pair. Equal plates are a programming defect upstream.
    pub fn new(plate_a: &str, plate_b: &str) -> Result<Self, DetectionError> {
        if plate_a == plate_b {
            return Err(DetectionError::InternalInvariant(format!(
                "pair key needs two distinct plates, got '{plate_a}' twice"
            )));
        }
        if plate_a < plate_b {
            Ok(Self(plate_a.to_string(), plate_b.to_string()))
        } else {
            Ok(Self(plate_b.to_string(), plate_a.to_string()))
        }
    }

    #[inline]
    pub fn first(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn second(&self) -> &str {
        &self.1
    }

    #[inline]
    pub fn contains(&self, plate: &str) -> bool {
        self.0 == plate || self.1 == plate
    }

    /// Re-check the two-distinct-plates invariant
    pub fn verify(&self) -> Result<(), DetectionError> {
        if self.0 < self.1 {
            Ok(())
        } else {
            Err(DetectionError::InternalInvariant(format!(
                "pair key ({}, {}) is not two ordered distinct plates",
                self.0, self.1
            )))
        }
    }
}

impl fmt::Display for PlatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.0, self.1)
    }
}

impl Serialize for PlatePair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.0.as_str(), self.1.as_str()].serialize(serializer)
    }
}

/// One matched pair of reads. The `_a` fields belong to `pair.first()`,
/// the `_b` fields to `pair.second()`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoOccurrence {
    pub pair: PlatePair,
    /// Reader of the anchor read that produced the match
    pub reader_id: String,
    /// Reader of the nominated read; differs from `reader_id` for
    /// cross-reader matches
    pub candidate_reader_id: String,
    pub timestamp_a: NaiveDateTime,
    pub timestamp_b: NaiveDateTime,
    pub read_id_a: ReadId,
    pub read_id_b: ReadId,
}

impl CoOccurrence {
    /// Both reads were taken by the same reader
    #[inline]
    pub fn is_same_reader(&self) -> bool {
        self.reader_id == self.candidate_reader_id
    }

    #[inline]
    pub fn earliest(&self) -> NaiveDateTime {
        self.timestamp_a.min(self.timestamp_b)
    }

    #[inline]
    pub fn latest(&self) -> NaiveDateTime {
        self.timestamp_a.max(self.timestamp_b)
    }

    /// Calendar day the co-occurrence is attributed to
    #[inline]
    pub fn day(&self) -> NaiveDate {
        self.timestamp_a.date()
    }

    /// Absolute gap between the two reads in seconds
    #[inline]
    pub fn gap_secs(&self) -> i64 {
        (self.timestamp_b - self.timestamp_a).num_seconds().abs()
    }
}

/// A co-occurrence enriched with the anchor reader's metadata, as reported
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvoyDetail {
    pub reader_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub direction: Option<String>,
    pub orientation: Option<String>,
    pub plate_pair: PlatePair,
    pub timestamp_a: NaiveDateTime,
    pub timestamp_b: NaiveDateTime,
    pub read_id_a: ReadId,
    pub read_id_b: ReadId,
}

impl ConvoyDetail {
    #[inline]
    pub fn earliest(&self) -> NaiveDateTime {
        self.timestamp_a.min(self.timestamp_b)
    }
}

/// One read of the target plate, enriched like a detail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetRead {
    pub read_id: ReadId,
    pub plate: String,
    pub reader_id: String,
    pub timestamp: NaiveDateTime,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub direction: Option<String>,
    pub orientation: Option<String>,
}

/// Plates involved in accepted convoys plus the evidence behind them
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConvoyResult {
    pub flagged_plates: Vec<String>,
    pub details: Vec<ConvoyDetail>,
    /// Reads of the target plate, in time order. Only filled when a target
    /// plate was requested.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub target_reads: Vec<TargetRead>,
}

impl ConvoyResult {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.flagged_plates.is_empty()
    }
}

/// Per-run diagnostics, returned next to the result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub events_scanned: u64,
    /// Anchors whose reader direction could not be resolved
    pub anchors_skipped: u64,
    /// Candidate reads skipped for unresolved reader direction
    pub candidates_skipped_unresolved: u64,
    /// Candidate reads closer than the echo gap to their anchor
    pub echo_suppressed: u64,
    pub nominations_total: u64,
    pub nominations_duplicate: u64,
    pub pairs_considered: u64,
    pub pairs_rejected_floor: u64,
    pub pairs_rejected_inconsistent: u64,
    pub pairs_accepted: u64,
}

impl RunStats {
    /// Total data-quality skips (warnings) during the run
    #[inline]
    pub fn data_quality_skips(&self) -> u64 {
        self.anchors_skipped + self.candidates_skipped_unresolved
    }
}

/// Output of one detection run. Identical inputs give identical reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    #[serde(flatten)]
    pub result: ConvoyResult,
    pub stats: RunStats,
}
