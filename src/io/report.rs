//! Report egress - writes a detection report as JSON
//!
//! Writes to a file (parent directories are created) or to stdout. The run id
//! is stamped on at egress; the report itself carries none.

use crate::domain::types::DetectionReport;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Where reports go
#[derive(Debug, Clone, PartialEq)]
pub enum ReportTarget {
    Stdout,
    File(String),
}

impl ReportTarget {
    /// `None` or `-` means stdout
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None | Some("-") => ReportTarget::Stdout,
            Some(path) => ReportTarget::File(path.to_string()),
        }
    }
}

/// Report as written out
#[derive(Serialize)]
struct StampedReport<'a> {
    run_id: &'a str,
    #[serde(flatten)]
    report: &'a DetectionReport,
}

/// Egress writer for detection reports
pub struct ReportWriter {
    target: ReportTarget,
    pretty: bool,
}

impl ReportWriter {
    pub fn new(target: ReportTarget, pretty: bool) -> Self {
        Self { target, pretty }
    }

    /// Serialize a report
    pub fn render(&self, run_id: &str, report: &DetectionReport) -> serde_json::Result<String> {
        let stamped = StampedReport { run_id, report };
        if self.pretty {
            serde_json::to_string_pretty(&stamped)
        } else {
            serde_json::to_string(&stamped)
        }
    }

    /// Write the report to the configured target
    pub fn write(&self, run_id: &str, report: &DetectionReport) -> std::io::Result<()> {
        let json = self.render(run_id, report)?;

        match &self.target {
            ReportTarget::Stdout => {
                let stdout = std::io::stdout();
                let mut handle = stdout.lock();
                writeln!(handle, "{}", json)?;
            }
            ReportTarget::File(file_path) => {
                let path = Path::new(file_path);
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let mut file =
                    OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
                writeln!(file, "{}", json)?;
                debug!(file = %file_path, bytes = %json.len(), "report_written");
            }
        }

        info!(
            run_id = %run_id,
            flagged_plates = %report.result.flagged_plates.len(),
            details = %report.result.details.len(),
            target = ?self.target,
            "report_egressed"
        );
        Ok(())
    }
}
