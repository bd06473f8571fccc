//! Result assembly - flattens accepted pairs into the report
//!
//! Reader metadata is resolved once per distinct reader, then every
//! co-occurrence is enriched and the list is sorted by its earlier timestamp.
//! When a target plate was requested, its own reads are listed alongside.

use crate::domain::error::DetectionError;
use crate::domain::types::{ConvoyDetail, ConvoyResult, ReadEvent, ReaderInfo, TargetRead};
use crate::io::readers::ReaderDirectory;
use crate::services::aggregator::ConvoyCandidate;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use tracing::debug;

/// Build the final result from accepted candidates
pub fn assemble(
    accepted: Vec<ConvoyCandidate>,
    directory: &dyn ReaderDirectory,
) -> Result<ConvoyResult, DetectionError> {
    let mut flagged = BTreeSet::new();
    let mut readers: FxHashMap<String, Option<&ReaderInfo>> = FxHashMap::default();

    for candidate in &accepted {
        candidate.pair.verify()?;
        flagged.insert(candidate.pair.first().to_string());
        flagged.insert(candidate.pair.second().to_string());
        for co in &candidate.co_occurrences {
            if !readers.contains_key(&co.reader_id) {
                readers.insert(co.reader_id.clone(), directory.lookup(&co.reader_id));
            }
        }
    }

    let mut details = Vec::with_capacity(accepted.iter().map(|c| c.co_occurrences.len()).sum());
    for candidate in accepted {
        for co in candidate.co_occurrences {
            let reader = readers.get(&co.reader_id).copied().flatten();
            details.push(ConvoyDetail {
                latitude: reader.and_then(|r| r.latitude),
                longitude: reader.and_then(|r| r.longitude),
                direction: reader.and_then(|r| r.direction.clone()),
                orientation: reader.and_then(|r| r.orientation.clone()),
                reader_id: co.reader_id,
                plate_pair: co.pair,
                timestamp_a: co.timestamp_a,
                timestamp_b: co.timestamp_b,
                read_id_a: co.read_id_a,
                read_id_b: co.read_id_b,
            });
        }
    }

    details.sort_by(|a, b| {
        a.earliest()
            .cmp(&b.earliest())
            .then_with(|| a.timestamp_a.max(a.timestamp_b).cmp(&b.timestamp_a.max(b.timestamp_b)))
            .then_with(|| a.plate_pair.cmp(&b.plate_pair))
            .then_with(|| a.reader_id.cmp(&b.reader_id))
            .then_with(|| (a.read_id_a, a.read_id_b).cmp(&(b.read_id_a, b.read_id_b)))
    });

    debug!(
        flagged_plates = %flagged.len(),
        details = %details.len(),
        readers_resolved = %readers.len(),
        "result_assembled"
    );

    Ok(ConvoyResult {
        flagged_plates: flagged.into_iter().collect(),
        details,
        target_reads: Vec::new(),
    })
}

/// Enriched reads of `target`, in the (time) order of `events`
pub fn target_reads(
    events: &[ReadEvent],
    target: &str,
    directory: &dyn ReaderDirectory,
) -> Vec<TargetRead> {
    let mut readers: FxHashMap<&str, Option<&ReaderInfo>> = FxHashMap::default();

    events
        .iter()
        .filter(|e| e.plate == target)
        .map(|e| {
            let reader = *readers
                .entry(e.reader_id.as_str())
                .or_insert_with(|| directory.lookup(&e.reader_id));
            TargetRead {
                read_id: e.id,
                plate: e.plate.clone(),
                reader_id: e.reader_id.clone(),
                timestamp: e.timestamp,
                latitude: reader.and_then(|r| r.latitude),
                longitude: reader.and_then(|r| r.longitude),
                direction: reader.and_then(|r| r.direction.clone()),
                orientation: reader.and_then(|r| r.orientation.clone()),
            }
        })
        .collect()
}
