/// Boundary geometry processing.
///
/// Submodules:
/// - `projection` — Transverse Mercator ↔ WGS84 coordinate transforms.
/// - `optimize` — filter, reproject, simplify, round and strip features.
/// - `cache` — cache-first persistence of the optimized collection.

pub mod cache;
pub mod optimize;
pub mod projection;

pub use cache::{BoundaryCache, CacheOutcome};
pub use optimize::{OptimizeOptions, OptimizeSummary, optimize_boundaries};
