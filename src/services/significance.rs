//! Significance filtering - decides which pairs are genuine convoys
//!
//! A pair is kept if either:
//! - it was seen together at >= max(min_coincidences, 3) distinct readers, or
//! - it was seen together on >= max(min_coincidences, 2) distinct days
//!
//! and its evidence is temporally consistent: along one road, both vehicles
//! pass the readers in the same order. Only same-reader co-occurrences say
//! where each vehicle was, so cross-reader matches are left out of the check.
//! One inconsistency rejects the pair.

use crate::domain::types::CoOccurrence;
use crate::io::readers::ReaderDirectory;
use crate::services::aggregator::ConvoyCandidate;
use std::cmp::Ordering;
use tracing::debug;

/// Fixed floor on distinct readers, regardless of configuration
pub const MIN_DISTINCT_READERS: usize = 3;

/// Fixed floor on distinct days, regardless of configuration
pub const MIN_DISTINCT_DAYS: usize = 2;

/// Outcome for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted { by_readers: bool, by_days: bool },
    BelowFloor,
    /// Index (in chronological order of same-reader evidence) of the first
    /// co-occurrence that breaks passing order
    Inconsistent { at: usize },
}

impl Verdict {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accepted { .. } => "accepted",
            Verdict::BelowFloor => "below_floor",
            Verdict::Inconsistent { .. } => "inconsistent",
        }
    }
}

/// Chronological order used for consistency checks and reporting
pub fn chronological(a: &CoOccurrence, b: &CoOccurrence) -> Ordering {
    a.earliest()
        .cmp(&b.earliest())
        .then_with(|| a.latest().cmp(&b.latest()))
        .then_with(|| a.reader_id.cmp(&b.reader_id))
}

pub struct SignificanceFilter<'a> {
    min_coincidences: usize,
    directory: &'a dyn ReaderDirectory,
}

impl<'a> SignificanceFilter<'a> {
    pub fn new(min_coincidences: u32, directory: &'a dyn ReaderDirectory) -> Self {
        let min_coincidences = usize::try_from(min_coincidences).unwrap_or(usize::MAX);
        Self { min_coincidences, directory }
    }

    /// Distinct-reader / distinct-day acceptance rule
    pub fn passes_floors(&self, distinct_readers: usize, distinct_days: usize) -> (bool, bool) {
        let by_readers =
            distinct_readers >= self.min_coincidences && distinct_readers >= MIN_DISTINCT_READERS;
        let by_days = distinct_days >= self.min_coincidences && distinct_days >= MIN_DISTINCT_DAYS;
        (by_readers, by_days)
    }

    fn road_of(&self, reader_id: &str) -> Option<&'a str> {
        self.directory.lookup(reader_id).and_then(|r| r.resolved_road())
    }

    /// Check passing order over same-reader evidence. Returns the
    /// chronological index of the first violation, if any.
    pub fn first_inconsistency(&self, co_occurrences: &[CoOccurrence]) -> Option<usize> {
        let mut ordered: Vec<&CoOccurrence> =
            co_occurrences.iter().filter(|co| co.is_same_reader()).collect();
        ordered.sort_by(|a, b| chronological(a, b));

        ordered.windows(2).position(|w| {
            let (prev, next) = (w[0], w[1]);
            let same_road = match (self.road_of(&prev.reader_id), self.road_of(&next.reader_id)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            same_road
                && (next.timestamp_a < prev.timestamp_a || next.timestamp_b < prev.timestamp_b)
        })
        .map(|i| i + 1)
    }

    pub fn evaluate(&self, candidate: &ConvoyCandidate) -> Verdict {
        let distinct_readers = candidate.distinct_readers();
        let distinct_days = candidate.distinct_days();
        let (by_readers, by_days) = self.passes_floors(distinct_readers, distinct_days);

        if !by_readers && !by_days {
            debug!(
                pair = %candidate.pair,
                distinct_readers = %distinct_readers,
                distinct_days = %distinct_days,
                "pair_below_floor"
            );
            return Verdict::BelowFloor;
        }

        if let Some(at) = self.first_inconsistency(&candidate.co_occurrences) {
            debug!(
                pair = %candidate.pair,
                co_occurrences = %candidate.co_occurrences.len(),
                at = %at,
                "pair_temporally_inconsistent"
            );
            return Verdict::Inconsistent { at };
        }

        debug!(
            pair = %candidate.pair,
            distinct_readers = %distinct_readers,
            distinct_days = %distinct_days,
            by_readers = %by_readers,
            by_days = %by_days,
            "pair_accepted"
        );
        Verdict::Accepted { by_readers, by_days }
    }
}
