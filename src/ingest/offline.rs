/// File-backed sources for offline runs.
///
/// When the live services are unreachable (or during development), point
/// the pipeline at a saved WFS response and a saved PX-Web CSV export.
/// The payloads go through exactly the same parsing as the live ones.

use std::fs;
use std::path::{Path, PathBuf};

use geojson::FeatureCollection;
use tracing::info;

use crate::config::StatisticsConfig;
use crate::ingest::pxweb::parse_statistics_csv;
use crate::ingest::wfs::parse_feature_collection;
use crate::ingest::{BoundarySource, StatisticsSource};
use crate::model::{PipelineError, StatisticsTable, Year};

/// A saved GetFeature response (GeoJSON, source CRS).
pub struct FileBoundarySource {
    path: PathBuf,
}

impl FileBoundarySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BoundarySource for FileBoundarySource {
    fn fetch_boundaries(&self) -> Result<FeatureCollection, PipelineError> {
        info!(stage = "WFS", "reading boundaries from {}", self.path.display());
        let body = read(&self.path)?;
        parse_feature_collection(&body)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// A saved PX-Web CSV response.
pub struct FileStatisticsSource {
    path: PathBuf,
    area_column: String,
    missing_sentinel: String,
}

impl FileStatisticsSource {
    pub fn new(path: impl Into<PathBuf>, config: &StatisticsConfig) -> Self {
        Self {
            path: path.into(),
            area_column: config.area_column.clone(),
            missing_sentinel: config.missing_sentinel.clone(),
        }
    }
}

impl StatisticsSource for FileStatisticsSource {
    fn fetch_statistics(&self, years: &[Year]) -> Result<StatisticsTable, PipelineError> {
        info!(stage = "PXWEB", "reading statistics from {}", self.path.display());
        let text = read(&self.path)?;
        parse_statistics_csv(&text, years, &self.area_column, &self.missing_sentinel)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

fn read(path: &Path) -> Result<String, PipelineError> {
    fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))
}
