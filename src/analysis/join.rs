//! Inner join of region boundaries and cleaned statistics on region name.
//!
//! Names are compared with exact string equality. Regions present on only
//! one side are dropped, and every drop is counted in the `JoinReport` so a
//! systematic name mismatch (encoding, spelling) shows up as a data-quality
//! warning instead of a silently shrunken map.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::{IncomeRow, JoinedRegionSeries, RegionBoundary};

/// Match counts for one join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct JoinReport {
    pub boundaries_total: usize,
    pub statistics_total: usize,
    pub boundaries_matched: usize,
    pub statistics_matched: usize,
    pub unmatched_boundaries: usize,
    pub unmatched_statistics: usize,
    pub duplicate_boundaries: usize,
    pub duplicate_statistics: usize,
    pub result_rows: usize,
}

impl JoinReport {
    /// Joined rows as a share of the larger input side (0.0 for empty inputs).
    pub fn match_ratio(&self) -> f64 {
        let denominator = self.boundaries_total.max(self.statistics_total);
        if denominator == 0 {
            0.0
        } else {
            self.result_rows as f64 / denominator as f64
        }
    }

    /// True when the match ratio falls below `min_ratio`.
    pub fn is_degraded(&self, min_ratio: f64) -> bool {
        self.match_ratio() < min_ratio
    }

    pub fn is_complete(&self) -> bool {
        self.unmatched_boundaries == 0 && self.unmatched_statistics == 0
    }
}

/// The join result plus the names that fell out on each side.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    /// Joined regions, sorted by region name.
    pub series: Vec<JoinedRegionSeries>,
    pub report: JoinReport,
    pub unmatched_boundary_names: Vec<String>,
    pub unmatched_statistics_names: Vec<String>,
}

/// Joins `boundaries` (consumed; geometries move into the result) with
/// `statistics`.
///
/// Duplicate names keep their first occurrence on each side and are
/// counted separately from unmatched ones.
pub fn join_datasets(boundaries: Vec<RegionBoundary>, statistics: &[IncomeRow]) -> JoinOutcome {
    let mut report = JoinReport {
        boundaries_total: boundaries.len(),
        statistics_total: statistics.len(),
        ..Default::default()
    };

    let mut by_name: BTreeMap<&str, &IncomeRow> = BTreeMap::new();
    for row in statistics {
        if by_name.contains_key(row.region_name.as_str()) {
            report.duplicate_statistics += 1;
        } else {
            by_name.insert(row.region_name.as_str(), row);
        }
    }

    let mut seen_boundaries: BTreeSet<String> = BTreeSet::new();
    let mut matched_names: BTreeSet<String> = BTreeSet::new();
    let mut unmatched_boundary_names = Vec::new();
    let mut series = Vec::new();

    for boundary in boundaries {
        if !seen_boundaries.insert(boundary.region_name.clone()) {
            report.duplicate_boundaries += 1;
            continue;
        }
        match by_name.get(boundary.region_name.as_str()) {
            Some(row) => {
                matched_names.insert(boundary.region_name.clone());
                series.push(JoinedRegionSeries {
                    region_name: boundary.region_name,
                    municipality_code: boundary.municipality_code,
                    region_number: row.region_number.clone(),
                    geometry: boundary.geometry,
                    values: row.values.clone(),
                });
            }
            None => unmatched_boundary_names.push(boundary.region_name),
        }
    }

    let unmatched_statistics_names: Vec<String> = by_name
        .keys()
        .filter(|name| !matched_names.contains(**name))
        .map(|name| name.to_string())
        .collect();

    series.sort_by(|a, b| a.region_name.cmp(&b.region_name));
    unmatched_boundary_names.sort();

    report.boundaries_matched = series.len();
    report.statistics_matched = matched_names.len();
    report.unmatched_boundaries = unmatched_boundary_names.len();
    report.unmatched_statistics = unmatched_statistics_names.len();
    report.result_rows = series.len();

    JoinOutcome {
        series,
        report,
        unmatched_boundary_names,
        unmatched_statistics_names,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
