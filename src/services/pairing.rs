//! Windowed pairing - nominates co-travelling reads
//!
//! Scans a time-sorted read buffer. For each anchor read, walks forward while
//! reads fall inside the window and nominates reads of other plates seen at a
//! reader covering the same travel direction. Matching rules:
//! - Direction: exact label equality between the two readers
//! - Echo: reads less than 10s apart are one sighting seen twice, not evidence
//! - Dedup: a (reader, ts_a, ts_b) triple counts once per pair

use crate::domain::error::DetectionError;
use crate::domain::request::DetectionParams;
use crate::domain::types::{CoOccurrence, PlatePair, ReadEvent, ReaderInfo};
use crate::io::readers::ReaderDirectory;
use crate::services::aggregator::PairAggregator;
use chrono::NaiveDateTime;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

/// Reads closer than this (seconds) are treated as sensor echo
pub const MIN_PAIR_GAP_SECS: i64 = 10;

/// Counters from one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairingStats {
    pub events_scanned: u64,
    pub anchors_skipped: u64,
    pub candidates_skipped_unresolved: u64,
    pub echo_suppressed: u64,
    pub nominations_total: u64,
    pub nominations_duplicate: u64,
}

type DedupKey<'a> = (PlatePair, &'a str, NaiveDateTime, NaiveDateTime);

/// Forward-window scanner over one sorted read buffer
pub struct PairingEngine<'a> {
    directory: &'a dyn ReaderDirectory,
    params: &'a DetectionParams,
    /// Reader id -> resolved direction, filled lazily and kept for the run
    directions: FxHashMap<&'a str, Option<&'a str>>,
    seen: FxHashSet<DedupKey<'a>>,
    stats: PairingStats,
}

impl<'a> PairingEngine<'a> {
    pub fn new(directory: &'a dyn ReaderDirectory, params: &'a DetectionParams) -> Self {
        Self {
            directory,
            params,
            directions: FxHashMap::default(),
            seen: FxHashSet::default(),
            stats: PairingStats::default(),
        }
    }

    /// Resolve a reader's direction once per run. Unresolved readers are
    /// reported the first time they are seen.
    fn direction_of(&mut self, reader_id: &'a str) -> Option<&'a str> {
        let directory = self.directory;
        *self.directions.entry(reader_id).or_insert_with(|| {
            let reader = directory.lookup(reader_id);
            let direction = reader.and_then(ReaderInfo::resolved_direction);
            if direction.is_none() {
                warn!(
                    reader_id = %reader_id,
                    known_reader = %reader.is_some(),
                    "reader_direction_unresolved"
                );
            }
            direction
        })
    }

    #[inline]
    fn admits_pair(&self, anchor: &ReadEvent, candidate: &ReadEvent) -> bool {
        match self.params.target_plate.as_deref() {
            Some(target) => anchor.plate == target || candidate.plate == target,
            None => true,
        }
    }

    /// Scan `events` (sorted ascending by timestamp) and push every accepted
    /// nomination into `aggregator`.
    pub fn scan(
        mut self,
        events: &'a [ReadEvent],
        aggregator: &mut PairAggregator,
    ) -> Result<PairingStats, DetectionError> {
        let window = self.params.window;

        for (i, anchor) in events.iter().enumerate() {
            self.stats.events_scanned += 1;

            let Some(direction_a) = self.direction_of(&anchor.reader_id) else {
                debug!(read_id = %anchor.id, reader_id = %anchor.reader_id, "anchor_skipped");
                self.stats.anchors_skipped += 1;
                continue;
            };

            // past the representable range the window runs to the end of input
            let window_end = anchor.timestamp.checked_add_signed(window);

            for candidate in events[i + 1..]
                .iter()
                .take_while(|e| window_end.map_or(true, |end| e.timestamp < end))
            {
                if candidate.plate == anchor.plate || !self.admits_pair(anchor, candidate) {
                    continue;
                }

                let Some(direction_b) = self.direction_of(&candidate.reader_id) else {
                    self.stats.candidates_skipped_unresolved += 1;
                    continue;
                };
                if direction_b != direction_a {
                    continue;
                }

                let gap_ms = (candidate.timestamp - anchor.timestamp).num_milliseconds().abs();
                if gap_ms < MIN_PAIR_GAP_SECS * 1000 {
                    self.stats.echo_suppressed += 1;
                    continue;
                }

                let co = nominate(anchor, candidate)?;
                let key =
                    (co.pair.clone(), anchor.reader_id.as_str(), co.timestamp_a, co.timestamp_b);
                if !self.seen.insert(key) {
                    debug!(
                        pair = %co.pair,
                        reader_id = %co.reader_id,
                        read_id_a = %co.read_id_a,
                        read_id_b = %co.read_id_b,
                        "nomination_duplicate"
                    );
                    self.stats.nominations_duplicate += 1;
                    continue;
                }

                aggregator.push(co);
                self.stats.nominations_total += 1;
            }
        }

        debug!(
            events = %self.stats.events_scanned,
            nominations = %self.stats.nominations_total,
            duplicates = %self.stats.nominations_duplicate,
            readers_cached = %self.directions.len(),
            "pairing_scan_complete"
        );
        Ok(self.stats)
    }
}

/// Build a co-occurrence with timestamps and read ids aligned to the
/// canonical plate order. The reader is the anchor's.
fn nominate(anchor: &ReadEvent, candidate: &ReadEvent) -> Result<CoOccurrence, DetectionError> {
    let pair = PlatePair::new(&anchor.plate, &candidate.plate)?;
    let (first, second) =
        if pair.first() == anchor.plate { (anchor, candidate) } else { (candidate, anchor) };

    Ok(CoOccurrence {
        reader_id: anchor.reader_id.clone(),
        candidate_reader_id: candidate.reader_id.clone(),
        timestamp_a: first.timestamp,
        timestamp_b: second.timestamp,
        read_id_a: first.id,
        read_id_b: second.id,
        pair,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ReadId;
    use crate::io::readers::InMemoryReaderDirectory;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    fn directory() -> InMemoryReaderDirectory {
        [
            ReaderInfo::new("R1").with_direction("Norte"),
            ReaderInfo::new("R2").with_direction("Norte"),
            ReaderInfo::new("R3").with_direction("Sur"),
            ReaderInfo::new("R4"),
        ]
        .into_iter()
        .collect()
    }

    fn scan(events: &[ReadEvent], params: &DetectionParams) -> (PairAggregator, PairingStats) {
        let directory = directory();
        let mut aggregator = PairAggregator::new();
        let stats = PairingEngine::new(&directory, params).scan(events, &mut aggregator).unwrap();
        (aggregator, stats)
    }

    #[test]
    fn test_same_direction_pair_nominated() {
        let events = vec![
            ReadEvent::new(1, "BBB2222", "R1", ts(10, 0, 0)),
            ReadEvent::new(2, "AAA1111", "R2", ts(10, 0, 30)),
        ];
        let (aggregator, stats) = scan(&events, &DetectionParams::default());

        assert_eq!(stats.nominations_total, 1);
        let candidates = aggregator.into_candidates().unwrap();
        assert_eq!(candidates.len(), 1);
        let co = &candidates[0].co_occurrences[0];
        assert_eq!(co.pair.first(), "AAA1111");
        // aligned to canonical order, reader is the anchor's
        assert_eq!(co.read_id_a, ReadId(2));
        assert_eq!(co.timestamp_a, ts(10, 0, 30));
        assert_eq!(co.read_id_b, ReadId(1));
        assert_eq!(co.reader_id, "R1");
        assert_eq!(co.candidate_reader_id, "R2");
        assert!(!co.is_same_reader());
    }

    #[test]
    fn test_window_beyond_calendar_range_scans_to_end() {
        let params = DetectionParams::new(10_000_000_000_000, 2).unwrap();
        let events = vec![
            ReadEvent::new(1, "AAA1111", "R1", ts(10, 0, 0)),
            ReadEvent::new(2, "BBB2222", "R1", ts(23, 0, 0)),
        ];
        let (aggregator, stats) = scan(&events, &params);

        assert_eq!(stats.nominations_total, 1);
        assert_eq!(aggregator.co_occurrence_count(), 1);
    }

    #[test]
    fn test_echo_reads_suppressed() {
        let events = vec![
            ReadEvent::new(1, "AAA1111", "R1", ts(10, 0, 0)),
            ReadEvent::new(2, "BBB2222", "R1", ts(10, 0, 5)),
        ];
        let (aggregator, stats) = scan(&events, &DetectionParams::default());

        assert_eq!(stats.echo_suppressed, 1);
        assert_eq!(stats.nominations_total, 0);
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_exactly_ten_seconds_counts() {
        let events = vec![
            ReadEvent::new(1, "AAA1111", "R1", ts(10, 0, 0)),
            ReadEvent::new(2, "BBB2222", "R1", ts(10, 0, 10)),
        ];
        let (_, stats) = scan(&events, &DetectionParams::default());
        assert_eq!(stats.nominations_total, 1);
    }

    #[test]
    fn test_window_end_is_exclusive() {
        let params = DetectionParams::new(60, 2).unwrap();
        let events = vec![
            ReadEvent::new(1, "AAA1111", "R1", ts(10, 0, 0)),
            ReadEvent::new(2, "BBB2222", "R1", ts(10, 0, 59)),
            ReadEvent::new(3, "CCC3333", "R1", ts(10, 1, 0)),
        ];
        let (aggregator, _) = scan(&events, &params);

        let pairs: Vec<String> =
            aggregator.into_candidates().unwrap().iter().map(|c| c.pair.to_string()).collect();
        // A-C is exactly 60s apart: outside; B-C is 1s apart: echo
        assert_eq!(pairs, vec!["AAA1111+BBB2222"]);
    }

    #[test]
    fn test_direction_mismatch_ignored() {
        let events = vec![
            ReadEvent::new(1, "AAA1111", "R1", ts(10, 0, 0)),
            ReadEvent::new(2, "BBB2222", "R3", ts(10, 1, 0)),
        ];
        let (aggregator, stats) = scan(&events, &DetectionParams::default());

        assert!(aggregator.is_empty());
        assert_eq!(stats.candidates_skipped_unresolved, 0);
    }

    #[test]
    fn test_unresolved_readers_skipped_and_counted() {
        let events = vec![
            ReadEvent::new(1, "AAA1111", "R1", ts(10, 0, 0)),
            ReadEvent::new(2, "BBB2222", "UNKNOWN", ts(10, 1, 0)),
            ReadEvent::new(3, "CCC3333", "R4", ts(10, 2, 0)),
        ];
        let (aggregator, stats) = scan(&events, &DetectionParams::default());

        assert!(aggregator.is_empty());
        // events 2 and 3 cannot anchor
        assert_eq!(stats.anchors_skipped, 2);
        // both are also skipped as candidates of event 1
        assert_eq!(stats.candidates_skipped_unresolved, 2);
        assert_eq!(stats.events_scanned, 3);
    }

    #[test]
    fn test_same_plate_never_paired() {
        let events = vec![
            ReadEvent::new(1, "AAA1111", "R1", ts(10, 0, 0)),
            ReadEvent::new(2, "AAA1111", "R2", ts(10, 1, 0)),
        ];
        let (aggregator, stats) = scan(&events, &DetectionParams::default());
        assert!(aggregator.is_empty());
        assert_eq!(stats.nominations_total, 0);
    }

    #[test]
    fn test_duplicate_reads_deduplicated() {
        // same sighting imported twice under different ids
        let events = vec![
            ReadEvent::new(1, "AAA1111", "R1", ts(10, 0, 0)),
            ReadEvent::new(2, "AAA1111", "R1", ts(10, 0, 0)),
            ReadEvent::new(3, "BBB2222", "R1", ts(10, 1, 0)),
        ];
        let (aggregator, stats) = scan(&events, &DetectionParams::default());

        assert_eq!(stats.nominations_total, 1);
        assert_eq!(stats.nominations_duplicate, 1);
        assert_eq!(aggregator.co_occurrence_count(), 1);
    }

    #[test]
    fn test_target_plate_restricts_pairs() {
        let params = DetectionParams::default().with_target_plate("BBB2222");
        let events = vec![
            ReadEvent::new(1, "AAA1111", "R1", ts(10, 0, 0)),
            ReadEvent::new(2, "BBB2222", "R1", ts(10, 0, 30)),
            ReadEvent::new(3, "CCC3333", "R1", ts(10, 1, 0)),
        ];
        let (aggregator, _) = scan(&events, &params);

        let candidates = aggregator.into_candidates().unwrap();
        let pairs: Vec<String> = candidates.iter().map(|c| c.pair.to_string()).collect();
        assert_eq!(pairs, vec!["AAA1111+BBB2222", "BBB2222+CCC3333"]);
    }
}
