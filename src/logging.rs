/// Structured logging for the income map pipeline
///
/// Installs the `tracing` subscriber (console or append-only log file),
/// classifies pipeline failures by how alarming they are, and logs the
/// join-quality summary at a level that reflects how much data matched.

use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

use crate::analysis::join::JoinReport;
use crate::config::LoggingConfig;
use crate::model::{PipelineError, Stage};

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `config.level`. With `config.file` set, output is
/// appended to that file without ANSI colours; otherwise it goes to stderr.
/// Calling this twice is harmless: the second subscriber is discarded.
pub fn init_logging(config: &LoggingConfig) -> Result<(), PipelineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| {
            PipelineError::Config(format!("invalid log level '{}': {}", config.level, e))
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| PipelineError::io(path, e))?;
            registry
                .with(
                    tracing_fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()
        }
        None => registry
            .with(tracing_fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    if installed.is_err() {
        debug!(stage = "SYS", "global subscriber already installed, keeping it");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - service in maintenance or throttling us
    Expected,
    /// Unexpected failure - contract change, bad configuration or a bug
    Unexpected,
    /// Unknown - could be transient, could be persistent
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify a pipeline failure by its kind and, for HTTP failures, status.
pub fn classify_failure(err: &PipelineError) -> FailureType {
    match err {
        // 503 during maintenance windows, 429 when throttled
        PipelineError::Upstream {
            status: Some(503 | 429),
            ..
        } => FailureType::Expected,
        PipelineError::Upstream {
            status: Some(s), ..
        } if *s >= 500 => FailureType::Unknown,
        // 4xx or an unparseable payload: our request or their format changed
        PipelineError::Upstream { .. } => FailureType::Unexpected,
        PipelineError::Network { .. } | PipelineError::Io { .. } => FailureType::Unknown,
        PipelineError::Schema(_)
        | PipelineError::DataProcessing(_)
        | PipelineError::Config(_) => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a stage failure with automatic classification
pub fn log_stage_failure(stage: Stage, operation: &str, err: &PipelineError) {
    let failure_type = classify_failure(err);
    let stage = stage.to_string();

    match failure_type {
        FailureType::Expected => {
            debug!(stage = %stage, "{} failed [{}]: {}", operation, failure_type, err)
        }
        FailureType::Unexpected => {
            error!(stage = %stage, "{} failed [{}]: {}", operation, failure_type, err)
        }
        FailureType::Unknown => {
            warn!(stage = %stage, "{} failed [{}]: {}", operation, failure_type, err)
        }
    }
}

// ---------------------------------------------------------------------------
// Join Summary Logging
// ---------------------------------------------------------------------------

/// Level the join summary is logged at.
///
/// Nothing matched → ERROR; some regions fell out on either side → WARN;
/// a perfect match → INFO.
pub fn join_summary_level(report: &JoinReport) -> Level {
    if report.result_rows == 0 {
        Level::ERROR
    } else if !report.is_complete() {
        Level::WARN
    } else {
        Level::INFO
    }
}

/// Log a summary of the boundary/statistics join
pub fn log_join_summary(report: &JoinReport, min_match_ratio: f64) {
    let message = format!(
        "Join complete: {} rows; boundaries {}/{} matched, statistics {}/{} matched",
        report.result_rows,
        report.boundaries_matched,
        report.boundaries_total,
        report.statistics_matched,
        report.statistics_total
    );

    let level = join_summary_level(report);
    if level == Level::ERROR {
        error!(stage = "JOIN", "{}", message);
    } else if level == Level::WARN {
        warn!(
            stage = "JOIN",
            unmatched_boundaries = report.unmatched_boundaries,
            unmatched_statistics = report.unmatched_statistics,
            "{}",
            message
        );
    } else {
        info!(stage = "JOIN", "{}", message);
    }

    if report.result_rows > 0 && report.is_degraded(min_match_ratio) {
        warn!(
            stage = "JOIN",
            "match ratio {:.2} is below the configured minimum {:.2}; check region name encoding",
            report.match_ratio(),
            min_match_ratio
        );
    }
    if report.duplicate_boundaries > 0 || report.duplicate_statistics > 0 {
        warn!(
            stage = "JOIN",
            "duplicate region names ignored: {} boundaries, {} statistics rows",
            report.duplicate_boundaries,
            report.duplicate_statistics
        );
    }
}
