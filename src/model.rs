/// Core data types for the regional income map service.
///
/// This module defines the shared domain model imported by all other modules:
/// the boundary, income and joined-series types, the pipeline stages, and the
/// error taxonomy. It contains no I/O.

use std::collections::BTreeMap;
use std::fmt;

use geo::Geometry;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Source constants
// ---------------------------------------------------------------------------

/// PX-Web indicator code for median household taxable income ("Median_svatv").
pub const INDICATOR_MEDIAN_INCOME: &str = "Median_svatv";

/// Placeholder the statistics service writes for suppressed/unavailable cells.
pub const MISSING_VALUE_SENTINEL: &str = "..";

/// Substring marking a district-aggregate ("peruspiiri") row in the area label.
pub const DISTRICT_MARKER: &str = "piiri";

/// Boundary property holding the region name (the join key).
pub const PROP_REGION_NAME: &str = "nimi";

/// Boundary property holding the three-digit municipality code.
pub const PROP_MUNICIPALITY: &str = "kunta";

/// A calendar year as requested from the statistics service.
pub type Year = u16;

// ---------------------------------------------------------------------------
// Boundary types
// ---------------------------------------------------------------------------

/// A single optimized sub-region boundary.
///
/// Produced by `boundary::optimize` (or read back from the cache artifact).
/// The geometry is always a `Polygon` or `MultiPolygon` in `crs`, with
/// coordinates already simplified and rounded.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionBoundary {
    pub region_name: String,
    pub municipality_code: String,
    pub geometry: Geometry<f64>,
    pub source_crs: String,
    pub crs: String,
}

// ---------------------------------------------------------------------------
// Statistics types
// ---------------------------------------------------------------------------

/// One parsed statistics row before cleaning: the compound area label and
/// one nullable value per requested year.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsRow {
    pub area: String,
    pub values: BTreeMap<Year, Option<f64>>,
}

/// The parsed statistics response.
///
/// An empty table (no years, no rows) is the explicit "no data" result the
/// fetcher returns when the service answered with a non-success status.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatisticsTable {
    pub years: Vec<Year>,
    pub rows: Vec<StatisticsRow>,
}

impl StatisticsTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A cleaned statistics row for a single genuine sub-region.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomeRow {
    pub municipality_number: String,
    pub region_number: String,
    pub region_name: String,
    pub values: BTreeMap<Year, Option<f64>>,
}

/// One (region, year) income observation.
///
/// `value` is `None` when the source suppressed the figure.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomeRecord {
    pub region_name: String,
    pub year: Year,
    pub value: Option<f64>,
    pub municipality_number: String,
    pub region_number: String,
}

impl IncomeRow {
    /// Flattens the row into one record per year, in ascending year order.
    pub fn records(&self) -> Vec<IncomeRecord> {
        self.values
            .iter()
            .map(|(&year, &value)| IncomeRecord {
                region_name: self.region_name.clone(),
                year,
                value,
                municipality_number: self.municipality_number.clone(),
                region_number: self.region_number.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Joined output
// ---------------------------------------------------------------------------

/// A region that exists in both the boundary set and the statistics set.
///
/// Owns its geometry; renderers read it but never mutate it.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRegionSeries {
    pub region_name: String,
    pub municipality_code: String,
    pub region_number: String,
    pub geometry: Geometry<f64>,
    pub values: BTreeMap<Year, Option<f64>>,
}

impl JoinedRegionSeries {
    /// Income for `year`, or `None` if suppressed or not requested.
    pub fn value(&self, year: Year) -> Option<f64> {
        self.values.get(&year).copied().flatten()
    }
}

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

/// Pipeline stage an error or log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    BoundaryFetch,
    BoundaryOptimize,
    BoundaryCache,
    StatisticsFetch,
    StatisticsClean,
    Join,
    System,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::BoundaryFetch => write!(f, "WFS"),
            Stage::BoundaryOptimize => write!(f, "GEOM"),
            Stage::BoundaryCache => write!(f, "CACHE"),
            Stage::StatisticsFetch => write!(f, "PXWEB"),
            Stage::StatisticsClean => write!(f, "CLEAN"),
            Stage::Join => write!(f, "JOIN"),
            Stage::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while acquiring or reconciling the income dataset.
///
/// `Clone` so that the run-once result cell can hand the same failure to
/// every reader.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Transport failure or timeout reaching a remote service.
    #[error("network error [{stage}]: {message}")]
    Network { stage: Stage, message: String },

    /// Non-success HTTP status or malformed payload from a remote service.
    #[error("upstream error [{stage}]{}: {message}", .status.map(|s| format!(" HTTP {}", s)).unwrap_or_default())]
    Upstream {
        stage: Stage,
        status: Option<u16>,
        message: String,
    },

    /// An expected column is missing or a value could not be coerced.
    #[error("schema error: {0}")]
    Schema(String),

    /// Geometry parsing/reprojection failure or an empty filter result.
    #[error("data processing error: {0}")]
    DataProcessing(String),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Local file I/O failure (cache artifact, offline sources, exports).
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

impl PipelineError {
    pub fn io(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    /// The stage that produced the error, where one is recorded.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Network { stage, .. } | PipelineError::Upstream { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_income_row_records_are_in_year_order() {
        let row = IncomeRow {
            municipality_number: "091".to_string(),
            region_number: "220".to_string(),
            region_name: "Jollas".to_string(),
            values: BTreeMap::from([(2006, None), (2005, Some(41_000.0))]),
        };
        let records = row.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].year, 2005);
        assert_eq!(records[0].value, Some(41_000.0));
        assert_eq!(records[1].year, 2006);
        assert_eq!(records[1].value, None, "suppressed value must stay None");
        assert!(records.iter().all(|r| r.region_name == "Jollas"));
    }

    #[test]
    fn test_upstream_error_display_includes_status() {
        let err = PipelineError::Upstream {
            stage: Stage::StatisticsFetch,
            status: Some(503),
            message: "service unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "upstream error [PXWEB] HTTP 503: service unavailable"
        );
        assert_eq!(err.stage(), Some(Stage::StatisticsFetch));
    }

    #[test]
    fn test_upstream_error_display_without_status() {
        let err = PipelineError::Upstream {
            stage: Stage::BoundaryFetch,
            status: None,
            message: "body is not GeoJSON".to_string(),
        };
        assert_eq!(err.to_string(), "upstream error [WFS]: body is not GeoJSON");
    }

    #[test]
    fn test_statistics_table_empty_is_no_data() {
        assert!(StatisticsTable::empty().is_empty());
    }
}
