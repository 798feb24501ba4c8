/// Run-once orchestration of the income dataset.
///
/// `IncomePipeline::load` fetches and optimizes the boundaries (cache
/// first), fetches and cleans the statistics, joins them and stores the
/// outcome. The outcome, success or failure, is computed at most once per
/// pipeline object; every later call returns the same value.

use std::path::Path;
use std::sync::OnceLock;

use tracing::{debug, info};

use crate::analysis::cleaning::clean_statistics;
use crate::analysis::join::join_datasets;
use crate::analysis::series::IncomeDataset;
use crate::boundary::optimize::boundaries_from_collection;
use crate::boundary::{BoundaryCache, CacheOutcome, OptimizeOptions, optimize_boundaries};
use crate::config::PipelineConfig;
use crate::ingest::offline::{FileBoundarySource, FileStatisticsSource};
use crate::ingest::pxweb::PxWebClient;
use crate::ingest::wfs::WfsClient;
use crate::ingest::{BoundarySource, StatisticsSource};
use crate::logging::{log_join_summary, log_stage_failure};
use crate::model::{IncomeRow, PipelineError, RegionBoundary, Stage, Year};

pub struct IncomePipeline<B, S> {
    config: PipelineConfig,
    boundaries: B,
    statistics: S,
    cache: BoundaryCache,
    result: OnceLock<Result<IncomeDataset, PipelineError>>,
}

impl IncomePipeline<WfsClient, PxWebClient> {
    /// Pipeline against the live WFS and PX-Web services.
    pub fn live(config: PipelineConfig) -> Result<Self, PipelineError> {
        let client = config.http.build_client()?;
        let boundaries = WfsClient::new(client.clone(), &config.boundaries);
        let statistics = PxWebClient::new(client, &config.statistics);
        Ok(Self::new(config, boundaries, statistics))
    }
}

impl IncomePipeline<FileBoundarySource, FileStatisticsSource> {
    /// Pipeline replaying a saved GetFeature response and a saved CSV export.
    pub fn offline(config: PipelineConfig, boundaries_path: &Path, statistics_path: &Path) -> Self {
        let boundaries = FileBoundarySource::new(boundaries_path);
        let statistics = FileStatisticsSource::new(statistics_path, &config.statistics);
        Self::new(config, boundaries, statistics)
    }
}

impl<B: BoundarySource, S: StatisticsSource> IncomePipeline<B, S> {
    pub fn new(config: PipelineConfig, boundaries: B, statistics: S) -> Self {
        let cache = BoundaryCache::new(config.boundaries.cache_path.clone());
        Self {
            config,
            boundaries,
            statistics,
            cache,
            result: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn boundary_source(&self) -> &B {
        &self.boundaries
    }

    pub fn statistics_source(&self) -> &S {
        &self.statistics
    }

    pub fn cache(&self) -> &BoundaryCache {
        &self.cache
    }

    /// The joined dataset, computed on first call.
    ///
    /// A failed run is not retried: the same error is returned to every
    /// caller for the life of this object. Build a new pipeline to retry.
    pub fn load(&self) -> Result<&IncomeDataset, PipelineError> {
        self.result
            .get_or_init(|| self.run())
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn is_loaded(&self) -> bool {
        self.result.get().is_some()
    }

    fn run(&self) -> Result<IncomeDataset, PipelineError> {
        info!(
            stage = "SYS",
            "loading income dataset: boundaries from {}, statistics from {}",
            self.boundaries.describe(),
            self.statistics.describe()
        );

        let boundaries = self
            .load_boundaries()
            .inspect_err(|e| log_stage_failure(e.stage().unwrap_or(Stage::BoundaryOptimize), "boundary load", e))?;

        let years = self.config.statistics.years();
        let rows = self
            .load_statistics(&years)
            .inspect_err(|e| log_stage_failure(e.stage().unwrap_or(Stage::StatisticsClean), "statistics load", e))?;

        let outcome = join_datasets(boundaries, &rows);
        log_join_summary(&outcome.report, self.config.join.min_match_ratio);
        if !outcome.unmatched_boundary_names.is_empty() {
            debug!(stage = "JOIN", "boundaries without statistics: {:?}", outcome.unmatched_boundary_names);
        }
        if !outcome.unmatched_statistics_names.is_empty() {
            debug!(stage = "JOIN", "statistics without boundaries: {:?}", outcome.unmatched_statistics_names);
        }

        if outcome.series.is_empty() {
            let err = PipelineError::DataProcessing(format!(
                "no region matched between {} boundaries and {} statistics rows",
                outcome.report.boundaries_total, outcome.report.statistics_total
            ));
            log_stage_failure(Stage::Join, "join", &err);
            return Err(err);
        }

        Ok(IncomeDataset::new(&years, outcome, self.config.boundaries.target_crs.clone()))
    }

    /// Optimized boundaries, from the cache artifact if one exists.
    ///
    /// On a miss the raw collection is fetched, optimized and persisted
    /// before being read back; on a hit the source is never called.
    pub fn load_boundaries(&self) -> Result<Vec<RegionBoundary>, PipelineError> {
        let options = OptimizeOptions::from_config(&self.config.boundaries)?;
        let (collection, outcome) = self.cache.load_or_build(|| {
            let raw = self.boundaries.fetch_boundaries()?;
            let (optimized, _summary) = optimize_boundaries(&raw, &options)?;
            Ok(optimized)
        })?;
        if outcome == CacheOutcome::Hit {
            debug!(stage = "CACHE", "boundary source not contacted");
        }
        boundaries_from_collection(&collection, &self.config.boundaries)
    }

    /// Cleaned statistics rows for `years`.
    ///
    /// The fetcher reports an unavailable service as an empty table; here
    /// that becomes an `Upstream` error so the run cannot succeed on
    /// missing data.
    pub fn load_statistics(&self, years: &[Year]) -> Result<Vec<IncomeRow>, PipelineError> {
        let table = self.statistics.fetch_statistics(years)?;
        if table.is_empty() {
            return Err(PipelineError::Upstream {
                stage: Stage::StatisticsFetch,
                status: None,
                message: format!("no statistics rows returned by {}", self.statistics.describe()),
            });
        }
        let (rows, _summary) = clean_statistics(&table, &self.config.statistics.district_marker);
        Ok(rows)
    }
}
