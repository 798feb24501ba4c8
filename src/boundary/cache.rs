//! Cache-first persistence of the optimized boundary artifact.
//!
//! The artifact's presence on disk is the "already computed" signal: when it
//! exists, the fetch and all optimization steps are skipped. Writes go to a
//! sibling temp file that is renamed into place, so a reader never observes
//! a half-written artifact and a failed build leaves nothing behind.

use std::fs;
use std::path::{Path, PathBuf};

use geojson::FeatureCollection;
use tracing::info;

use crate::model::PipelineError;

/// Where the optimized collection came from on this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Built,
}

#[derive(Debug, Clone)]
pub struct BoundaryCache {
    path: PathBuf,
}

impl BoundaryCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Reads and parses the artifact.
    pub fn read(&self) -> Result<FeatureCollection, PipelineError> {
        let text = fs::read_to_string(&self.path).map_err(|e| PipelineError::io(&self.path, e))?;
        text.parse::<FeatureCollection>().map_err(|e| {
            PipelineError::DataProcessing(format!(
                "boundary cache {} is not a feature collection: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Persists `collection` atomically, creating parent directories.
    pub fn write(&self, collection: &FeatureCollection) -> Result<(), PipelineError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        let tmp = self.temp_path();
        fs::write(&tmp, collection.to_string()).map_err(|e| PipelineError::io(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(PipelineError::io(&self.path, e));
        }
        Ok(())
    }

    /// Returns the cached collection, or runs `build` and persists its result.
    ///
    /// `build` is not called at all on a cache hit; that is the only place
    /// the boundary fetch happens, so a hit issues no network request.
    pub fn load_or_build<F>(&self, build: F) -> Result<(FeatureCollection, CacheOutcome), PipelineError>
    where
        F: FnOnce() -> Result<FeatureCollection, PipelineError>,
    {
        if self.exists() {
            info!(stage = "CACHE", "using cached boundaries from {}", self.path.display());
            return Ok((self.read()?, CacheOutcome::Hit));
        }

        info!(stage = "CACHE", "no boundary cache at {}, building", self.path.display());
        let collection = build()?;
        self.write(&collection)?;
        info!(
            stage = "CACHE",
            "optimized boundaries saved to {} ({} features)",
            self.path.display(),
            collection.features.len()
        );
        Ok((collection, CacheOutcome::Built))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".partial");
        self.path.with_file_name(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
