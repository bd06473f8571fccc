//! Detection runner - service wrapper around the pure detector
//!
//! Validates the request, loads the case's reads, applies the density guard and
//! runs detection on the blocking pool under a wall-clock timeout. An abandoned
//! worker holds no shared state, so nothing needs cleaning up after a timeout,
//! but the runtime that owns it must not wait for it on shutdown (see
//! `block_on_detached`).

use crate::domain::error::DetectionError;
use crate::domain::request::{DetectionParams, DetectionRequest};
use crate::domain::types::{DetectionReport, ReadEvent};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::readers::ReaderDirectory;
use crate::io::reads::{LoadStats, ReadProvider, ReadQuery};
use crate::services::detector::detect;
use chrono::NaiveDateTime;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Resource limits for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionLimits {
    pub max_events: usize,
    pub max_events_per_window: usize,
    pub timeout: Duration,
}

impl DetectionLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_events: config.max_events(),
            max_events_per_window: config.max_events_per_window(),
            timeout: Duration::from_secs(config.timeout_secs()),
        }
    }
}

impl Default for DetectionLimits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Report plus diagnostics from the read provider
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub report: DetectionReport,
    pub load_stats: LoadStats,
}

/// Largest number of reads falling inside any `[t, t + window)` interval.
///
/// Two-pointer scan over sorted timestamps.
pub fn densest_window(events: &[ReadEvent], window: chrono::Duration) -> usize {
    let mut timestamps: Vec<NaiveDateTime> = events.iter().map(|e| e.timestamp).collect();
    timestamps.sort_unstable();

    let mut densest = 0;
    let mut left = 0;
    for right in 0..timestamps.len() {
        while timestamps[right] - timestamps[left] >= window {
            left += 1;
        }
        densest = densest.max(right - left + 1);
    }
    densest
}

/// Drive `future` on a fresh multi-thread runtime, then shut it down without
/// waiting for blocking workers abandoned by a timeout.
pub fn block_on_detached<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}

pub struct DetectionRunner {
    limits: DetectionLimits,
    metrics: Arc<Metrics>,
}

impl DetectionRunner {
    pub fn new(limits: DetectionLimits, metrics: Arc<Metrics>) -> Self {
        Self { limits, metrics }
    }

    pub fn limits(&self) -> &DetectionLimits {
        &self.limits
    }

    /// Reject inputs whose size or local density would blow the time budget
    pub fn check_density(
        &self,
        events: &[ReadEvent],
        window: chrono::Duration,
    ) -> Result<(), DetectionError> {
        if events.len() > self.limits.max_events {
            return Err(DetectionError::InputTooDense {
                reason: "events",
                observed: events.len(),
                limit: self.limits.max_events,
            });
        }

        let densest = densest_window(events, window);
        if densest > self.limits.max_events_per_window {
            return Err(DetectionError::InputTooDense {
                reason: "events per window",
                observed: densest,
                limit: self.limits.max_events_per_window,
            });
        }
        Ok(())
    }

    /// Run a blocking job on the blocking pool under the wall-clock timeout
    async fn run_blocking<T, F>(&self, job: F) -> Result<T, DetectionError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, DetectionError> + Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(job);
        match tokio::time::timeout(self.limits.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(DetectionError::InternalInvariant(format!(
                "detection worker failed: {join_err}"
            ))),
            Err(_) => Err(DetectionError::Timeout { timeout_secs: self.limits.timeout.as_secs() }),
        }
    }

    /// Run detection over already-loaded reads
    pub async fn run<D>(
        &self,
        run_id: &str,
        events: Vec<ReadEvent>,
        directory: Arc<D>,
        params: DetectionParams,
    ) -> Result<DetectionReport, DetectionError>
    where
        D: ReaderDirectory + Send + Sync + 'static,
    {
        let started = Instant::now();

        let outcome = match self.check_density(&events, params.window) {
            Ok(()) => self.run_blocking(move || detect(&events, &*directory, &params)).await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(report) => {
                self.metrics.record_run(&report.stats, started.elapsed().as_millis() as u64);
            }
            Err(e) => {
                warn!(
                    run_id = %run_id,
                    kind = %e.kind(),
                    error = %e,
                    elapsed_ms = %started.elapsed().as_millis(),
                    "convoy_detection_failed"
                );
                self.metrics.record_failure(e);
            }
        }
        outcome
    }

    /// Validate a request, load its reads and run detection
    pub async fn run_request<P, D>(
        &self,
        request: &DetectionRequest,
        provider: &P,
        case_id: Option<i64>,
        directory: Arc<D>,
    ) -> anyhow::Result<RunOutcome>
    where
        P: ReadProvider,
        D: ReaderDirectory + Send + Sync + 'static,
    {
        let (params, filter) = request.validate().inspect_err(|e| {
            warn!(kind = %e.kind(), error = %e, "detection_request_rejected");
            self.metrics.record_failure(e);
        })?;

        let run_id = Uuid::now_v7().to_string();
        let query = ReadQuery { case_id, filter };
        let loaded = provider.load(&query)?;

        info!(
            run_id = %run_id,
            case_id = ?case_id,
            reads = %loaded.events.len(),
            window_secs = %params.window_seconds(),
            min_coincidences = %params.min_coincidences,
            "detection_request_accepted"
        );

        let report = self.run(&run_id, loaded.events, directory, params).await?;
        Ok(RunOutcome { run_id, report, load_stats: loaded.stats })
    }
}
