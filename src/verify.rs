//! Data Source Verification Module
//!
//! Queries the boundary and statistics sources once each and reports
//! whether they answer, how much they return, and how well the region
//! names on the two sides line up. Nothing is optimized or cached.
//!
//! Use this before pointing the pipeline at a new layer, table or year range.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::analysis::cleaning::clean_statistics;
use crate::config::{BoundaryConfig, PipelineConfig, StatisticsConfig};
use crate::ingest::{BoundarySource, StatisticsSource};
use crate::model::{IncomeRow, Year};
use crate::regions::{find_municipality, normalize_municipality_code};

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub boundaries: BoundaryVerification,
    pub statistics: StatisticsVerification,
    /// Present only when both sources produced names.
    pub name_match: Option<NameMatchSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryVerification {
    pub source: String,
    pub status: VerificationStatus,
    pub features_total: usize,
    pub features_allowed: usize,
    /// Feature count per allowed municipality code (zero if absent).
    pub features_per_municipality: BTreeMap<String, usize>,
    pub error_message: Option<String>,
    #[serde(skip)]
    region_names: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsVerification {
    pub source: String,
    pub status: VerificationStatus,
    pub years_requested: usize,
    /// Requested years where every row is suppressed.
    pub years_without_data: Vec<Year>,
    pub rows_total: usize,
    pub sub_region_rows: usize,
    pub suppressed_cells: usize,
    pub error_message: Option<String>,
    #[serde(skip)]
    region_names: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NameMatchSummary {
    pub matched: usize,
    pub boundaries_only: Vec<String>,
    pub statistics_only: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

// ============================================================================
// Boundary Verification
// ============================================================================

pub fn verify_boundaries<B: BoundarySource>(source: &B, config: &BoundaryConfig) -> BoundaryVerification {
    let mut result = BoundaryVerification {
        source: source.describe(),
        status: VerificationStatus::Failed,
        features_total: 0,
        features_allowed: 0,
        features_per_municipality: config
            .allowed_municipalities
            .iter()
            .map(|code| (code.clone(), 0))
            .collect(),
        error_message: None,
        region_names: BTreeSet::new(),
    };

    let collection = match source.fetch_boundaries() {
        Ok(collection) => collection,
        Err(e) => {
            result.error_message = Some(e.to_string());
            return result;
        }
    };
    result.features_total = collection.features.len();

    for feature in &collection.features {
        let Some(code) = feature
            .property(&config.municipality_property)
            .and_then(normalize_municipality_code)
        else {
            continue;
        };
        let Some(count) = result.features_per_municipality.get_mut(&code) else {
            continue;
        };
        *count += 1;
        result.features_allowed += 1;
        if let Some(name) = feature.property(&config.name_property).and_then(|v| v.as_str()) {
            result.region_names.insert(name.trim().to_string());
        }
    }

    result.status = if result.features_allowed == 0 {
        result.error_message = Some("no features in the allowed municipalities".to_string());
        VerificationStatus::Failed
    } else if result.features_per_municipality.values().any(|&n| n == 0) {
        VerificationStatus::PartialSuccess
    } else {
        VerificationStatus::Success
    };
    result
}

// ============================================================================
// Statistics Verification
// ============================================================================

pub fn verify_statistics<S: StatisticsSource>(source: &S, config: &StatisticsConfig) -> StatisticsVerification {
    let years = config.years();
    let mut result = StatisticsVerification {
        source: source.describe(),
        status: VerificationStatus::Failed,
        years_requested: years.len(),
        years_without_data: Vec::new(),
        rows_total: 0,
        sub_region_rows: 0,
        suppressed_cells: 0,
        error_message: None,
        region_names: BTreeSet::new(),
    };

    let table = match source.fetch_statistics(&years) {
        Ok(table) if table.is_empty() => {
            result.error_message = Some("service returned no data".to_string());
            return result;
        }
        Ok(table) => table,
        Err(e) => {
            result.error_message = Some(e.to_string());
            return result;
        }
    };
    result.rows_total = table.rows.len();

    let (rows, _) = clean_statistics(&table, &config.district_marker);
    result.sub_region_rows = rows.len();
    result.suppressed_cells = rows
        .iter()
        .flat_map(IncomeRow::records)
        .filter(|record| record.value.is_none())
        .count();
    result.years_without_data = years
        .iter()
        .copied()
        .filter(|year| rows.iter().all(|r| r.values.get(year).copied().flatten().is_none()))
        .collect();
    result.region_names = rows.into_iter().map(|r| r.region_name).collect();

    result.status = if result.sub_region_rows == 0 {
        result.error_message = Some("no sub-region rows after cleaning".to_string());
        VerificationStatus::Failed
    } else if !result.years_without_data.is_empty() {
        VerificationStatus::PartialSuccess
    } else {
        VerificationStatus::Success
    };
    result
}

// ============================================================================
// Full Verification
// ============================================================================

pub fn name_match(boundary_names: &BTreeSet<String>, statistics_names: &BTreeSet<String>) -> NameMatchSummary {
    NameMatchSummary {
        matched: boundary_names.intersection(statistics_names).count(),
        boundaries_only: boundary_names.difference(statistics_names).cloned().collect(),
        statistics_only: statistics_names.difference(boundary_names).cloned().collect(),
    }
}

pub fn run_verification<B, S>(boundaries: &B, statistics: &S, config: &PipelineConfig) -> VerificationReport
where
    B: BoundarySource,
    S: StatisticsSource,
{
    let boundaries = verify_boundaries(boundaries, &config.boundaries);
    let statistics = verify_statistics(statistics, &config.statistics);

    let matched = if boundaries.region_names.is_empty() || statistics.region_names.is_empty() {
        None
    } else {
        Some(name_match(&boundaries.region_names, &statistics.region_names))
    };

    VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        boundaries,
        statistics,
        name_match: matched,
    }
}

fn status_mark(status: &VerificationStatus) -> &'static str {
    match status {
        VerificationStatus::Success => "✓",
        VerificationStatus::PartialSuccess => "⚠",
        VerificationStatus::Failed => "✗",
    }
}

pub fn print_summary(report: &VerificationReport) {
    let b = &report.boundaries;
    let s = &report.statistics;

    println!("\n════════════════════════════════════════════════════════════");
    println!("VERIFICATION SUMMARY  ({})", report.timestamp);
    println!("════════════════════════════════════════════════════════════");
    println!();
    println!("{} Boundaries:  {}", status_mark(&b.status), b.source);
    println!("    {} features, {} in allowed municipalities", b.features_total, b.features_allowed);
    for (code, count) in &b.features_per_municipality {
        let name = find_municipality(code).map(|m| m.name).unwrap_or("?");
        println!("    {} {:<10} {}", code, name, count);
    }
    if let Some(msg) = &b.error_message {
        println!("    error: {}", msg);
    }
    println!();
    println!("{} Statistics:  {}", status_mark(&s.status), s.source);
    println!(
        "    {} rows, {} sub-regions, {} suppressed cells over {} years",
        s.rows_total, s.sub_region_rows, s.suppressed_cells, s.years_requested
    );
    if !s.years_without_data.is_empty() {
        println!("    years without data: {:?}", s.years_without_data);
    }
    if let Some(msg) = &s.error_message {
        println!("    error: {}", msg);
    }
    println!();
    match &report.name_match {
        Some(m) => {
            println!(
                "Name match: {} matched, {} boundary-only, {} statistics-only",
                m.matched,
                m.boundaries_only.len(),
                m.statistics_only.len()
            );
            for name in m.boundaries_only.iter().take(10) {
                println!("    boundary only:   {}", name);
            }
            for name in m.statistics_only.iter().take(10) {
                println!("    statistics only: {}", name);
            }
        }
        None => println!("Name match: not available"),
    }
    println!("════════════════════════════════════════════════════════════");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PipelineError, Stage, StatisticsRow, StatisticsTable};
    use geojson::FeatureCollection;
    use std::collections::BTreeMap;

    struct CannedBoundaries(&'static str);

    impl BoundarySource for CannedBoundaries {
        fn fetch_boundaries(&self) -> Result<FeatureCollection, PipelineError> {
            Ok(self.0.parse().unwrap())
        }
        fn describe(&self) -> String {
            "canned".to_string()
        }
    }

    struct CannedStatistics(Vec<(&'static str, Option<f64>)>);

    impl StatisticsSource for CannedStatistics {
        fn fetch_statistics(&self, years: &[Year]) -> Result<StatisticsTable, PipelineError> {
            Ok(StatisticsTable {
                years: years.to_vec(),
                rows: self
                    .0
                    .iter()
                    .map(|(area, value)| StatisticsRow {
                        area: area.to_string(),
                        values: years.iter().map(|&y| (y, *value)).collect::<BTreeMap<_, _>>(),
                    })
                    .collect(),
            })
        }
        fn describe(&self) -> String {
            "canned".to_string()
        }
    }

    struct Unreachable;

    impl StatisticsSource for Unreachable {
        fn fetch_statistics(&self, _years: &[Year]) -> Result<StatisticsTable, PipelineError> {
            Err(PipelineError::Network {
                stage: Stage::StatisticsFetch,
                message: "connection refused".to_string(),
            })
        }
        fn describe(&self) -> String {
            "unreachable".to_string()
        }
    }

    const TWO_HELSINKI_FEATURES: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","geometry":null,"properties":{"nimi":"Jollas","kunta":"091"}},
        {"type":"Feature","geometry":null,"properties":{"nimi":"Laajasalo","kunta":91}},
        {"type":"Feature","geometry":null,"properties":{"nimi":"Kauniainen","kunta":"235"}}
    ]}"#;

    #[test]
    fn test_boundaries_partial_when_a_municipality_is_missing() {
        let result = verify_boundaries(&CannedBoundaries(TWO_HELSINKI_FEATURES), &BoundaryConfig::default());
        assert_eq!(result.features_total, 3);
        assert_eq!(result.features_allowed, 2, "235 is not an allowed municipality");
        assert_eq!(result.features_per_municipality["091"], 2);
        assert_eq!(result.features_per_municipality["049"], 0);
        assert_eq!(result.status, VerificationStatus::PartialSuccess);
    }

    #[test]
    fn test_unreachable_statistics_is_failed() {
        let result = verify_statistics(&Unreachable, &StatisticsConfig::default());
        assert_eq!(result.status, VerificationStatus::Failed);
        assert!(result.error_message.unwrap().contains("connection refused"));
    }

    #[test]
    fn test_statistics_counts_sub_regions_and_suppressed_cells() {
        let mut config = StatisticsConfig::default();
        config.first_year = 2021;
        config.last_year = 2022;
        let source = CannedStatistics(vec![
            ("091 piiri Keskinen", Some(1.0)),
            ("091 220 Jollas", Some(50_000.0)),
            ("091 221 Laajasalo", None),
        ]);
        let result = verify_statistics(&source, &config);
        assert_eq!(result.rows_total, 3);
        assert_eq!(result.sub_region_rows, 2);
        assert_eq!(result.suppressed_cells, 2);
        assert!(result.years_without_data.is_empty());
        assert_eq!(result.status, VerificationStatus::Success);
    }

    #[test]
    fn test_full_report_includes_name_match() {
        let source = CannedStatistics(vec![("091 220 Jollas", Some(50_000.0)), ("049 111 Otaniemi", Some(1.0))]);
        let report = run_verification(
            &CannedBoundaries(TWO_HELSINKI_FEATURES),
            &source,
            &PipelineConfig::default(),
        );
        let m = report.name_match.as_ref().expect("both sides produced names");
        assert_eq!(m.matched, 1);
        assert_eq!(m.boundaries_only, vec!["Laajasalo"]);
        assert_eq!(m.statistics_only, vec!["Otaniemi"]);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("boundaries").is_some());
        assert!(json["boundaries"].get("region_names").is_none());
    }

    #[test]
    fn test_no_name_match_when_a_source_fails() {
        let report = run_verification(
            &CannedBoundaries(TWO_HELSINKI_FEATURES),
            &Unreachable,
            &PipelineConfig::default(),
        );
        assert!(report.name_match.is_none());
    }
}
