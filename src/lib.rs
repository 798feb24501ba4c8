//! Median household income by sub-region for Helsinki, Espoo and Vantaa.
//!
//! Fetches the sub-region boundary layer (WFS) and the median-income table
//! (PX-Web), reduces the boundaries to a small cached WGS84 artifact,
//! cleans the statistics and joins the two on region name. Renderers
//! consume the resulting `IncomeDataset`.

pub mod analysis;
pub mod boundary;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod regions;
pub mod verify;

pub use analysis::{IncomeDataset, JoinReport, SeriesPoint};
pub use config::PipelineConfig;
pub use model::{JoinedRegionSeries, PipelineError, Stage, Year};
pub use pipeline::IncomePipeline;
