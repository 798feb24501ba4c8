/// Remote data acquisition.
///
/// Each source sits behind a small trait so the pipeline can run against
/// the live services, local files, or test doubles.
///
/// Submodules:
/// - `wfs` — region boundaries from the Helsinki map service (WFS 2.0.0).
/// - `pxweb` — income statistics from the Helsinki PX-Web API.
/// - `offline` — the same payloads read from local files.

pub mod offline;
pub mod pxweb;
pub mod wfs;

use geojson::FeatureCollection;

use crate::model::{PipelineError, Stage, StatisticsTable, Year};

/// Anything that can produce the raw boundary feature collection.
pub trait BoundarySource {
    fn fetch_boundaries(&self) -> Result<FeatureCollection, PipelineError>;

    /// Human-readable origin, for logs and verification reports.
    fn describe(&self) -> String;
}

/// Anything that can produce the parsed statistics table for `years`.
///
/// An empty table means the source answered but had no data to give.
pub trait StatisticsSource {
    fn fetch_statistics(&self, years: &[Year]) -> Result<StatisticsTable, PipelineError>;

    fn describe(&self) -> String;
}

/// Classifies a `reqwest` failure into the pipeline error taxonomy.
pub(crate) fn transport_error(stage: Stage, err: reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        PipelineError::Network {
            stage,
            message: format!("request timed out: {}", err),
        }
    } else if err.is_status() {
        PipelineError::Upstream {
            stage,
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    } else if err.is_decode() || err.is_body() {
        PipelineError::Upstream {
            stage,
            status: None,
            message: format!("could not read response body: {}", err),
        }
    } else {
        PipelineError::Network {
            stage,
            message: err.to_string(),
        }
    }
}

/// First `limit` characters of a response body, for error messages.
pub(crate) fn snippet(body: &str, limit: usize) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        assert_eq!(snippet("  äöå  ", 10), "äöå");
        assert_eq!(snippet("äöåäöå", 3), "äöå…");
    }
}
