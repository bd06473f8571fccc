//! Integration tests for convoy detection properties and reference scenarios

use chrono::{Duration, NaiveDate, NaiveDateTime};
use convoy_detector::domain::{DetectionParams, ReadEvent, ReaderInfo};
use convoy_detector::io::InMemoryReaderDirectory;
use convoy_detector::services::detect;

const A: &str = "AAA1111";
const B: &str = "BBB2222";
const C: &str = "CCC3333";

fn ts(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap().and_hms_opt(h, m, s).unwrap()
}

fn directory() -> InMemoryReaderDirectory {
    [
        ReaderInfo::new("R1").with_direction("Norte").with_road("A-4"),
        ReaderInfo::new("R2").with_direction("Norte").with_road("A-4"),
        ReaderInfo::new("R3").with_direction("Norte").with_road("A-4"),
        ReaderInfo::new("R4").with_direction("Norte").with_road("A-4"),
        ReaderInfo::new("S1").with_direction("Sur").with_road("A-4"),
    ]
    .into_iter()
    .collect()
}

fn params(window_seconds: i64, min_coincidences: i64) -> DetectionParams {
    DetectionParams::new(window_seconds, min_coincidences).unwrap()
}

/// Reads for `plates` passing `readers` 20 minutes apart, 30s between vehicles
fn convoy(plates: &[&str], readers: &[&str], day: u32, first_id: i64) -> Vec<ReadEvent> {
    convoy_spaced(plates, readers, day, first_id, 20)
}

/// Same as `convoy`, with readers `spacing_minutes` apart
fn convoy_spaced(
    plates: &[&str],
    readers: &[&str],
    day: u32,
    first_id: i64,
    spacing_minutes: i64,
) -> Vec<ReadEvent> {
    let mut events = Vec::new();
    let mut id = first_id;
    for (r, reader) in readers.iter().enumerate() {
        let base = ts(day, 10, 0, 0) + Duration::minutes(spacing_minutes * r as i64);
        for (p, plate) in plates.iter().enumerate() {
            events.push(ReadEvent::new(id, plate, reader, base + Duration::seconds(30 * p as i64)));
            id += 1;
        }
    }
    events
}

fn rename(events: &[ReadEvent], from: &str, to: &str) -> Vec<ReadEvent> {
    events
        .iter()
        .map(|e| {
            let plate = if e.plate == from { to } else { e.plate.as_str() };
            ReadEvent::new(e.id.0, plate, &e.reader_id, e.timestamp)
        })
        .collect()
}

// ============================================================================
// Reference scenarios
// ============================================================================

#[test]
fn test_scenario_a_single_sighting_below_floors() {
    let events = vec![
        ReadEvent::new(1, A, "R1", ts(1, 10, 0, 0)),
        ReadEvent::new(2, B, "R1", ts(1, 10, 0, 30)),
    ];
    let report = detect(&events, &directory(), &params(300, 2)).unwrap();
    assert!(report.result.is_empty());
    assert!(report.result.details.is_empty());
    assert_eq!(report.stats.pairs_considered, 1);
    assert_eq!(report.stats.pairs_rejected_floor, 1);
}

#[test]
fn test_scenario_b_three_readers_same_day() {
    let events = convoy(&[A, B], &["R1", "R2", "R3"], 1, 1);
    let report = detect(&events, &directory(), &params(300, 2)).unwrap();

    assert_eq!(report.result.flagged_plates, vec![A, B]);
    assert_eq!(report.result.details.len(), 3);
    let readers: Vec<&str> = report.result.details.iter().map(|d| d.reader_id.as_str()).collect();
    assert_eq!(readers, vec!["R1", "R2", "R3"]);
    assert_eq!(report.result.details[0].direction.as_deref(), Some("Norte"));
}

#[test]
fn test_scenario_b_readers_closer_than_window() {
    // 2 minutes between readers: reads at different readers also pair up
    let events = convoy_spaced(&[A, B], &["R1", "R2", "R3"], 1, 1, 2);
    let report = detect(&events, &directory(), &params(300, 2)).unwrap();

    assert_eq!(report.result.flagged_plates, vec![A, B]);
    assert_eq!(report.stats.nominations_total, 9);
    assert_eq!(report.stats.pairs_rejected_inconsistent, 0);
    assert_eq!(report.result.details.len(), 9);
    let readers: std::collections::BTreeSet<&str> =
        report.result.details.iter().map(|d| d.reader_id.as_str()).collect();
    assert_eq!(readers.len(), 3);
}

#[test]
fn test_scenario_b_overtake_between_readers_still_consistent() {
    // B falls behind, then passes A before R3; both still visit R1, R2, R3 in order
    let events = vec![
        ReadEvent::new(1, A, "R1", ts(1, 10, 0, 0)),
        ReadEvent::new(2, B, "R1", ts(1, 10, 0, 30)),
        ReadEvent::new(3, A, "R2", ts(1, 10, 2, 0)),
        ReadEvent::new(4, B, "R2", ts(1, 10, 2, 50)),
        ReadEvent::new(5, B, "R3", ts(1, 10, 4, 0)),
        ReadEvent::new(6, A, "R3", ts(1, 10, 4, 20)),
    ];
    let report = detect(&events, &directory(), &params(300, 2)).unwrap();
    assert_eq!(report.result.flagged_plates, vec![A, B]);
    assert_eq!(report.stats.pairs_rejected_inconsistent, 0);
}

#[test]
fn test_scenario_c_one_reader_two_days() {
    let mut events = convoy(&[A, B], &["R1"], 1, 1);
    events.extend(convoy(&[A, B], &["R1"], 2, 10));
    let report = detect(&events, &directory(), &params(300, 2)).unwrap();

    assert_eq!(report.result.flagged_plates, vec![A, B]);
    assert_eq!(report.result.details.len(), 2);
}

#[test]
fn test_scenario_d_echo_within_ten_seconds() {
    let events = vec![
        ReadEvent::new(1, A, "R1", ts(1, 10, 0, 0)),
        ReadEvent::new(2, B, "R1", ts(1, 10, 0, 5)),
    ];
    let report = detect(&events, &directory(), &params(300, 2)).unwrap();
    assert!(report.result.is_empty());
    assert_eq!(report.stats.nominations_total, 0);
    assert_eq!(report.stats.echo_suppressed, 1);
}

#[test]
fn test_scenario_e_unknown_reader_skipped() {
    let events = vec![
        ReadEvent::new(1, A, "R1", ts(1, 10, 0, 0)),
        ReadEvent::new(2, B, "GHOST", ts(1, 10, 0, 30)),
    ];
    let report = detect(&events, &directory(), &params(300, 2)).unwrap();
    assert!(report.result.is_empty());
    assert_eq!(report.stats.nominations_total, 0);
    assert_eq!(report.stats.candidates_skipped_unresolved, 1);
    assert_eq!(report.stats.anchors_skipped, 1);
    assert_eq!(report.stats.data_quality_skips(), 2);
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_no_self_pairing() {
    // one plate seen everywhere, repeatedly, on several days
    let mut events = convoy(&[A], &["R1", "R2", "R3"], 1, 1);
    events.extend(convoy(&[A], &["R1", "R2", "R3"], 2, 100));
    events.push(ReadEvent::new(200, A, "R1", ts(1, 10, 1, 0)));
    let report = detect(&events, &directory(), &params(300, 0)).unwrap();
    assert!(report.result.is_empty());
    assert_eq!(report.stats.nominations_total, 0);

    let mut events = convoy(&[A, B, C], &["R1", "R2", "R3"], 1, 1);
    events.push(ReadEvent::new(300, A, "R1", ts(1, 10, 0, 45)));
    let report = detect(&events, &directory(), &params(300, 2)).unwrap();
    for detail in &report.result.details {
        assert_ne!(detail.plate_pair.first(), detail.plate_pair.second());
    }
}

#[test]
fn test_gap_bounds_hold_for_every_detail() {
    let window = 120;
    let mut events = convoy(&[A, B, C], &["R1", "R2", "R3", "R4"], 1, 1);
    events.extend(convoy(&[A, C], &["R1", "R2"], 2, 100));
    let report = detect(&events, &directory(), &params(window, 2)).unwrap();

    assert!(!report.result.details.is_empty());
    for detail in &report.result.details {
        let gap = (detail.timestamp_b - detail.timestamp_a).num_seconds().abs();
        assert!(gap >= 10, "gap {gap}s below echo threshold");
        assert!(gap <= window, "gap {gap}s beyond window");
    }
}

#[test]
fn test_gap_bounds_hold_with_close_readers() {
    let window = 120;
    let events = convoy_spaced(&[A, B, C], &["R1", "R2", "R3", "R4"], 1, 1, 2);
    let report = detect(&events, &directory(), &params(window, 2)).unwrap();

    assert_eq!(report.result.flagged_plates, vec![A, B, C]);
    // more evidence than one detail per reader per pair
    assert!(report.result.details.len() > 3 * 4);
    for detail in &report.result.details {
        let gap = (detail.timestamp_b - detail.timestamp_a).num_seconds().abs();
        assert!(gap >= 10, "gap {gap}s below echo threshold");
        assert!(gap <= window, "gap {gap}s beyond window");
    }
}

#[test]
fn test_window_excludes_distant_reads() {
    // 60s apart: outside a 60s window (end exclusive), inside a 61s one
    let mut events = Vec::new();
    for (i, reader) in ["R1", "R2", "R3"].iter().enumerate() {
        let base = ts(1, 10, 0, 0) + Duration::minutes(20 * i as i64);
        events.push(ReadEvent::new(2 * i as i64, A, reader, base));
        events.push(ReadEvent::new(2 * i as i64 + 1, B, reader, base + Duration::seconds(60)));
    }
    assert!(detect(&events, &directory(), &params(60, 2)).unwrap().result.is_empty());
    assert_eq!(detect(&events, &directory(), &params(61, 2)).unwrap().result.details.len(), 3);
}

#[test]
fn test_idempotent_and_order_stable() {
    let mut events = convoy(&[A, B, C], &["R1", "R2", "R3"], 1, 1);
    events.extend(convoy(&[A, B], &["R1"], 2, 100));

    let first = detect(&events, &directory(), &params(300, 2)).unwrap();
    let second = detect(&events, &directory(), &params(300, 2)).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );

    let mut reversed = events.clone();
    reversed.reverse();
    let third = detect(&reversed, &directory(), &params(300, 2)).unwrap();
    assert_eq!(first.result, third.result);
}

#[test]
fn test_monotonic_in_min_coincidences() {
    let mut events = convoy(&[A, B], &["R1", "R2", "R3"], 1, 1);
    events.extend(convoy(&[A, C], &["R1", "R2", "R3", "R4"], 3, 100));
    events.extend(convoy(&[B, C], &["R1"], 5, 200));
    events.extend(convoy(&[B, C], &["R1"], 6, 300));

    let mut previous: Option<Vec<String>> = None;
    for k in 0..=6 {
        let plates = detect(&events, &directory(), &params(300, k)).unwrap().result.flagged_plates;
        if let Some(prev) = &previous {
            assert!(plates.iter().all(|p| prev.contains(p)), "k={k}: {plates:?} not in {prev:?}");
        }
        previous = Some(plates);
    }
    let strict = detect(&events, &directory(), &params(300, 4)).unwrap();
    assert_eq!(strict.result.flagged_plates, vec![A, C]);
    assert!(detect(&events, &directory(), &params(300, 5)).unwrap().result.is_empty());
}

fn swap_plates(events: &[ReadEvent]) -> Vec<ReadEvent> {
    let swapped = rename(&rename(events, A, "TMP"), B, A);
    rename(&swapped, "TMP", B)
}

#[test]
fn test_symmetric_in_plate_labels() {
    let events = convoy(&[A, B], &["R1", "R2", "R3"], 1, 1);
    // swap which plate leads by renaming A <-> B
    let swapped = swap_plates(&events);

    let original = detect(&events, &directory(), &params(300, 2)).unwrap();
    let mirrored = detect(&swapped, &directory(), &params(300, 2)).unwrap();

    assert_eq!(original.result.flagged_plates, mirrored.result.flagged_plates);
    assert_eq!(original.result.details.len(), mirrored.result.details.len());
    for (o, m) in original.result.details.iter().zip(&mirrored.result.details) {
        assert_eq!(o.plate_pair, m.plate_pair);
        assert_eq!(o.reader_id, m.reader_id);
        assert_eq!((o.timestamp_a, o.timestamp_b), (m.timestamp_b, m.timestamp_a));
    }
}

#[test]
fn test_symmetric_with_close_readers() {
    let events = convoy_spaced(&[A, B], &["R1", "R2", "R3"], 1, 1, 2);
    let original = detect(&events, &directory(), &params(300, 2)).unwrap();
    let mirrored = detect(&swap_plates(&events), &directory(), &params(300, 2)).unwrap();

    assert_eq!(original.result.flagged_plates, vec![A, B]);
    assert_eq!(original.result.flagged_plates, mirrored.result.flagged_plates);
    assert_eq!(original.stats, mirrored.stats);
    assert_eq!(original.result.details.len(), mirrored.result.details.len());
    for (o, m) in original.result.details.iter().zip(&mirrored.result.details) {
        assert_eq!(o.reader_id, m.reader_id);
        assert_eq!((o.timestamp_a, o.timestamp_b), (m.timestamp_b, m.timestamp_a));
    }
}

// ============================================================================
// Matching rules
// ============================================================================

#[test]
fn test_duplicated_reads_counted_once() {
    let events = convoy(&[A, B], &["R1", "R2", "R3"], 1, 1);
    let mut doubled = events.clone();
    doubled.extend(
        events.iter().map(|e| ReadEvent::new(e.id.0 + 1000, &e.plate, &e.reader_id, e.timestamp)),
    );

    let report = detect(&doubled, &directory(), &params(300, 2)).unwrap();
    assert_eq!(report.result.details.len(), 3);
    assert!(report.stats.nominations_duplicate > 0);
}

#[test]
fn test_direction_mismatch_never_pairs() {
    let events = vec![
        ReadEvent::new(1, A, "R1", ts(1, 10, 0, 0)),
        ReadEvent::new(2, B, "S1", ts(1, 10, 0, 30)),
        ReadEvent::new(3, A, "R2", ts(1, 10, 20, 0)),
        ReadEvent::new(4, B, "S1", ts(1, 10, 20, 30)),
        ReadEvent::new(5, A, "R3", ts(1, 10, 40, 0)),
        ReadEvent::new(6, B, "S1", ts(1, 10, 40, 30)),
    ];
    let report = detect(&events, &directory(), &params(300, 2)).unwrap();
    assert!(report.result.is_empty());
    assert_eq!(report.stats.nominations_total, 0);
}

#[test]
fn test_cross_reader_same_direction_pairs() {
    // different readers covering the same direction; the anchor's reader is reported
    let events = vec![
        ReadEvent::new(1, A, "R1", ts(1, 10, 0, 0)),
        ReadEvent::new(2, B, "R2", ts(1, 10, 1, 0)),
    ];
    let directory = directory();
    let report = detect(&events, &directory, &params(300, 0)).unwrap();
    assert_eq!(report.stats.nominations_total, 1);
    assert!(report.result.is_empty());
}

#[test]
fn test_target_plate_restricts_pairs() {
    let events = convoy(&[A, B, C], &["R1", "R2", "R3"], 1, 1);
    let report = detect(&events, &directory(), &params(300, 2).with_target_plate(B)).unwrap();

    assert_eq!(report.result.flagged_plates, vec![A, B, C]);
    for detail in &report.result.details {
        assert!(detail.plate_pair.contains(B));
    }
    assert_eq!(report.stats.pairs_accepted, 2);

    let target_ids: Vec<i64> = report.result.target_reads.iter().map(|r| r.read_id.0).collect();
    let expected: Vec<i64> = events.iter().filter(|e| e.plate == B).map(|e| e.id.0).collect();
    assert_eq!(target_ids, expected);
    assert!(report.result.target_reads.iter().all(|r| r.plate == B));
}

#[test]
fn test_passing_order_violation_rejects_pair() {
    let events = vec![
        ReadEvent::new(1, A, "R1", ts(1, 10, 0, 0)),
        ReadEvent::new(2, B, "R1", ts(1, 10, 0, 30)),
        ReadEvent::new(3, A, "R2", ts(1, 10, 20, 0)),
        // B shows up further along the road before passing R2
        ReadEvent::new(4, B, "R3", ts(1, 10, 20, 20)),
        ReadEvent::new(5, A, "R3", ts(1, 10, 20, 40)),
        ReadEvent::new(6, B, "R2", ts(1, 10, 20, 50)),
    ];
    let report = detect(&events, &directory(), &params(300, 2)).unwrap();
    assert!(report.result.is_empty());
    assert_eq!(report.stats.pairs_rejected_inconsistent, 1);
}
