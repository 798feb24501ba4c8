/// Statistics reshaping and reconciliation with the boundary set.
///
/// Submodules:
/// - `cleaning` — compound area labels → genuine sub-region rows.
/// - `join` — inner join on region name, with match counts.
/// - `series` — read-only queries renderers run against the joined data.

pub mod cleaning;
pub mod join;
pub mod series;

pub use cleaning::{CleanSummary, clean_statistics};
pub use join::{JoinOutcome, JoinReport, join_datasets};
pub use series::{IncomeDataset, SeriesPoint};
