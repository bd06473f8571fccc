//! Convoy Case Simulator - synthetic ALPR cases for local testing
//!
//! Writes a reader directory (JSON array) and a read file (JSONL) with
//! background traffic and, depending on the scenario, a planted convoy.
//! Output is fully determined by the seed.
//!
//! Scenarios:
//! - convoy: two plates travel together past three readers on two days
//! - noise: background traffic only (expected result is empty)
//! - dense: a burst of reads inside one window (trips the density guard)
//!
//! Usage:
//!   cargo run --bin convoy-sim -- --scenario convoy --out-dir sim-case
//!   cargo run --bin convoy-detector -- --reads sim-case/reads.jsonl --readers sim-case/readers.json

use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use clap::{Parser, ValueEnum};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const CASE_ID: i64 = 1;
const CONVOY_LEADER: &str = "1111AAA";
const CONVOY_FOLLOWER: &str = "2222BBB";

/// (reader_id, direction, orientation, road, latitude, longitude)
const READERS: [(&str, &str, &str, &str, f64, f64); 8] = [
    ("CAM-A4-01", "Norte", "Creciente", "A-4", 40.3010, -3.6930),
    ("CAM-A4-02", "Norte", "Creciente", "A-4", 40.3320, -3.6890),
    ("CAM-A4-03", "Norte", "Creciente", "A-4", 40.3650, -3.6850),
    ("CAM-A4-04", "Sur", "Decreciente", "A-4", 40.3655, -3.6845),
    ("CAM-M30-01", "Este", "Creciente", "M-30", 40.4100, -3.6700),
    ("CAM-M30-02", "Este", "Creciente", "M-30", 40.4200, -3.6600),
    ("CAM-M40-01", "Oeste", "Decreciente", "M-40", 40.3900, -3.7500),
    ("CAM-URB-01", "", "", "", 40.4168, -3.7038),
];

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    Convoy,
    Noise,
    Dense,
}

#[derive(Parser, Debug)]
#[command(name = "convoy-sim")]
#[command(about = "Generate synthetic ALPR cases for convoy detection")]
struct Args {
    /// Scenario to generate
    #[arg(short, long, value_enum, default_value = "convoy")]
    scenario: Scenario,

    /// Output directory for readers.json and reads.jsonl
    #[arg(short, long, default_value = "sim-case")]
    out_dir: String,

    /// Background vehicles per day
    #[arg(long, default_value = "200")]
    vehicles: usize,

    /// Days of traffic to generate
    #[arg(long, default_value = "3")]
    days: u32,

    /// PRNG seed
    #[arg(long, default_value = "42")]
    seed: u64,
}

// ============================================================================
// Generation
// ============================================================================

struct Read {
    plate: String,
    reader_id: &'static str,
    timestamp: NaiveDateTime,
}

fn plate(rng: &mut ChaCha8Rng) -> String {
    const LETTERS: &[u8] = b"BCDFGHJKLMNPRSTVWXYZ";
    let digits: u32 = rng.gen_range(0..10_000);
    let letters: String =
        (0..3).map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char).collect();
    format!("{digits:04}{letters}")
}

fn day_start(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.checked_add_days(chrono::Days::new(day as u64)))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn background(rng: &mut ChaCha8Rng, vehicles: usize, days: u32, reads: &mut Vec<Read>) {
    for day in 0..days {
        for _ in 0..vehicles {
            let plate = plate(rng);
            // each vehicle passes one to three readers, minutes apart
            let mut at = day_start(day) + Duration::seconds(rng.gen_range(0..86_400 - 7_200));
            for _ in 0..rng.gen_range(1..=3) {
                let reader = READERS[rng.gen_range(0..READERS.len())].0;
                reads.push(Read { plate: plate.clone(), reader_id: reader, timestamp: at });
                at += Duration::seconds(rng.gen_range(300..2_100));
            }
        }
    }
}

fn planted_convoy(rng: &mut ChaCha8Rng, days: u32, reads: &mut Vec<Read>) {
    let route = ["CAM-A4-01", "CAM-A4-02", "CAM-A4-03"];
    for day in 0..days.min(2) {
        let mut at = day_start(day) + Duration::hours(8) + Duration::minutes(rng.gen_range(0..60));
        for reader in route {
            let follow = Duration::seconds(rng.gen_range(20..120));
            reads.push(Read { plate: CONVOY_LEADER.to_string(), reader_id: reader, timestamp: at });
            reads.push(Read {
                plate: CONVOY_FOLLOWER.to_string(),
                reader_id: reader,
                timestamp: at + follow,
            });
            at += Duration::minutes(rng.gen_range(6..10));
        }
    }
}

fn dense_burst(rng: &mut ChaCha8Rng, reads: &mut Vec<Read>) {
    let start = day_start(0) + Duration::hours(18);
    for _ in 0..20_000 {
        reads.push(Read {
            plate: plate(rng),
            reader_id: "CAM-M30-01",
            timestamp: start + Duration::seconds(rng.gen_range(0..120)),
        });
    }
}

// ============================================================================
// Output
// ============================================================================

fn write_readers(path: &Path) -> anyhow::Result<()> {
    let readers: Vec<_> = READERS
        .iter()
        .map(|(id, direction, orientation, road, lat, lon)| {
            json!({
                "reader_id": id,
                "direction": direction,
                "orientation": orientation,
                "road": road,
                "latitude": lat,
                "longitude": lon,
            })
        })
        .collect();
    let content = serde_json::to_string_pretty(&readers)?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

fn write_reads(path: &Path, reads: &[Read]) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for (i, read) in reads.iter().enumerate() {
        let line = json!({
            "id": i as i64 + 1,
            "plate": read.plate,
            "reader_id": read.reader_id,
            "timestamp": read.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            "source_type": "LPR",
            "case_id": CASE_ID,
        });
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let mut reads = Vec::new();

    background(&mut rng, args.vehicles, args.days, &mut reads);
    match args.scenario {
        Scenario::Convoy => planted_convoy(&mut rng, args.days, &mut reads),
        Scenario::Noise => {}
        Scenario::Dense => dense_burst(&mut rng, &mut reads),
    }
    reads.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    let out_dir = Path::new(&args.out_dir);
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    write_readers(&out_dir.join("readers.json"))?;
    write_reads(&out_dir.join("reads.jsonl"), &reads)?;

    info!(
        scenario = ?args.scenario,
        out_dir = %out_dir.display(),
        readers = %READERS.len(),
        reads = %reads.len(),
        seed = %args.seed,
        "sim_case_written"
    );
    Ok(())
}
