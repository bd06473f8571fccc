//! Convoy detection pipeline
//!
//! Pure function of (reads, reader directory, parameters). Stages:
//! pairing -> aggregation -> significance -> assembly. Holds no state across
//! calls and performs no IO; identical inputs give identical reports.

use crate::domain::error::DetectionError;
use crate::domain::request::DetectionParams;
use crate::domain::types::{DetectionReport, ReadEvent, RunStats};
use crate::io::readers::ReaderDirectory;
use crate::services::aggregator::PairAggregator;
use crate::services::assembler::{assemble, target_reads};
use crate::services::pairing::PairingEngine;
use crate::services::significance::{SignificanceFilter, Verdict};
use std::borrow::Cow;
use std::time::Instant;
use tracing::info;

#[inline]
fn is_time_sorted(events: &[ReadEvent]) -> bool {
    events.windows(2).all(|w| (w[0].timestamp, w[0].id) <= (w[1].timestamp, w[1].id))
}

/// Sort once on entry unless the caller already did
fn time_sorted(events: &[ReadEvent]) -> Cow<'_, [ReadEvent]> {
    if is_time_sorted(events) {
        Cow::Borrowed(events)
    } else {
        let mut sorted = events.to_vec();
        sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Cow::Owned(sorted)
    }
}

/// Run convoy detection over one case's reads
pub fn detect(
    events: &[ReadEvent],
    directory: &dyn ReaderDirectory,
    params: &DetectionParams,
) -> Result<DetectionReport, DetectionError> {
    let started = Instant::now();
    let events = time_sorted(events);

    let mut aggregator = PairAggregator::new();
    let pairing = PairingEngine::new(directory, params).scan(&events, &mut aggregator)?;

    let filter = SignificanceFilter::new(params.min_coincidences, directory);
    let candidates = aggregator.into_candidates()?;
    let mut stats = RunStats {
        events_scanned: pairing.events_scanned,
        anchors_skipped: pairing.anchors_skipped,
        candidates_skipped_unresolved: pairing.candidates_skipped_unresolved,
        echo_suppressed: pairing.echo_suppressed,
        nominations_total: pairing.nominations_total,
        nominations_duplicate: pairing.nominations_duplicate,
        pairs_considered: candidates.len() as u64,
        ..RunStats::default()
    };

    let mut accepted = Vec::new();
    for candidate in candidates {
        match filter.evaluate(&candidate) {
            Verdict::Accepted { .. } => accepted.push(candidate),
            Verdict::BelowFloor => stats.pairs_rejected_floor += 1,
            Verdict::Inconsistent { .. } => stats.pairs_rejected_inconsistent += 1,
        }
    }
    stats.pairs_accepted = accepted.len() as u64;

    let mut result = assemble(accepted, directory)?;
    if let Some(target) = params.target_plate.as_deref() {
        result.target_reads = target_reads(&events, target, directory);
    }

    info!(
        events = %stats.events_scanned,
        window_secs = %params.window_seconds(),
        min_coincidences = %params.min_coincidences,
        target_plate = ?params.target_plate,
        nominations = %stats.nominations_total,
        pairs_considered = %stats.pairs_considered,
        pairs_accepted = %stats.pairs_accepted,
        flagged_plates = %result.flagged_plates.len(),
        target_reads = %result.target_reads.len(),
        data_quality_skips = %stats.data_quality_skips(),
        elapsed_ms = %started.elapsed().as_millis(),
        "convoy_detection_complete"
    );

    Ok(DetectionReport { result, stats })
}
