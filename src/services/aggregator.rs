//! Pair aggregation - per-pair co-occurrence histories
//!
//! Append-only: nominations are kept in arrival order per pair, with their
//! originating read ids, for auditing.

use crate::domain::error::DetectionError;
use crate::domain::types::{CoOccurrence, PlatePair};
use chrono::NaiveDate;
use rustc_hash::{FxHashMap, FxHashSet};

/// All evidence for one pair of plates
#[derive(Debug, Clone, PartialEq)]
pub struct ConvoyCandidate {
    pub pair: PlatePair,
    pub co_occurrences: Vec<CoOccurrence>,
}

impl ConvoyCandidate {
    /// Number of distinct readers the pair was seen together at
    pub fn distinct_readers(&self) -> usize {
        self.co_occurrences.iter().map(|co| co.reader_id.as_str()).collect::<FxHashSet<_>>().len()
    }

    /// Number of distinct calendar days the pair was seen together on
    pub fn distinct_days(&self) -> usize {
        self.co_occurrences.iter().map(CoOccurrence::day).collect::<FxHashSet<NaiveDate>>().len()
    }
}

/// Map from pair key to its co-occurrences, built once per run
#[derive(Debug, Default)]
pub struct PairAggregator {
    pairs: FxHashMap<PlatePair, Vec<CoOccurrence>>,
}

impl PairAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one co-occurrence to its pair's history
    pub fn push(&mut self, co: CoOccurrence) {
        self.pairs.entry(co.pair.clone()).or_default().push(co);
    }

    /// Number of distinct pairs
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn co_occurrence_count(&self) -> usize {
        self.pairs.values().map(Vec::len).sum()
    }

    /// Drain into candidates sorted by pair key. Every history must be keyed by
    /// a valid pair and hold only that pair's co-occurrences.
    pub fn into_candidates(self) -> Result<Vec<ConvoyCandidate>, DetectionError> {
        let mut candidates = Vec::with_capacity(self.pairs.len());

        for (pair, co_occurrences) in self.pairs {
            pair.verify()?;
            if let Some(stray) = co_occurrences.iter().find(|co| co.pair != pair) {
                return Err(DetectionError::InternalInvariant(format!(
                    "co-occurrence for {} stored under {}",
                    stray.pair, pair
                )));
            }
            candidates.push(ConvoyCandidate { pair, co_occurrences });
        }

        candidates.sort_unstable_by(|a, b| a.pair.cmp(&b.pair));
        Ok(candidates)
    }
}
