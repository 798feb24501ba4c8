//! Statistics cleaning: compound area labels → one row per sub-region.
//!
//! The PX-Web table mixes three kinds of rows under the `Alue` label:
//! municipality totals, district aggregates ("091 2 Eteläinen suurpiiri",
//! "091 piiri …") and the sub-regions we actually want ("091 220 Jollas").
//! Only the last kind survives.

use tracing::{debug, info};

use crate::model::{IncomeRow, StatisticsTable};

/// The three parts of an area label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaLabel<'a> {
    pub municipality_number: &'a str,
    pub region_number: &'a str,
    pub region_name: &'a str,
}

/// Splits a label into at most three whitespace-separated parts.
///
/// The region name is everything after the first two tokens, so names
/// containing spaces stay intact. Returns `None` for a single-token label.
pub fn split_area_label(label: &str) -> Option<AreaLabel<'_>> {
    let (municipality_number, rest) = label.trim().split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    let (region_number, region_name) = match rest.split_once(char::is_whitespace) {
        Some((number, name)) => (number, name.trim()),
        None => (rest, ""),
    };
    Some(AreaLabel {
        municipality_number,
        region_number,
        region_name,
    })
}

fn is_numeric_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(char::is_numeric)
}

/// Row counts from one cleaning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanSummary {
    pub input: usize,
    pub district_rows: usize,
    pub malformed_rows: usize,
    pub kept: usize,
}

/// Reduces the parsed table to genuine sub-region rows.
///
/// In order: drop labels containing `district_marker`, split the label,
/// drop rows whose region number is not numeric (or that carry no name),
/// attach the split parts and discard the compound label. Deterministic;
/// only logs.
pub fn clean_statistics(table: &StatisticsTable, district_marker: &str) -> (Vec<IncomeRow>, CleanSummary) {
    let mut summary = CleanSummary {
        input: table.rows.len(),
        ..Default::default()
    };
    let mut rows = Vec::with_capacity(table.rows.len());

    for row in &table.rows {
        if row.area.contains(district_marker) {
            summary.district_rows += 1;
            continue;
        }

        let label = match split_area_label(&row.area) {
            Some(label) if is_numeric_token(label.region_number) && !label.region_name.is_empty() => {
                label
            }
            _ => {
                debug!(stage = "CLEAN", "dropping non-sub-region row '{}'", row.area);
                summary.malformed_rows += 1;
                continue;
            }
        };

        rows.push(IncomeRow {
            municipality_number: label.municipality_number.to_string(),
            region_number: label.region_number.to_string(),
            region_name: label.region_name.to_string(),
            values: row.values.clone(),
        });
    }
    summary.kept = rows.len();

    info!(
        stage = "CLEAN",
        input = summary.input,
        districts = summary.district_rows,
        malformed = summary.malformed_rows,
        "cleaned statistics: {} sub-regions",
        summary.kept
    );
    (rows, summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DISTRICT_MARKER, StatisticsRow};
    use std::collections::BTreeMap;

    fn table(areas: &[&str]) -> StatisticsTable {
        StatisticsTable {
            years: vec![2022],
            rows: areas
                .iter()
                .map(|area| StatisticsRow {
                    area: area.to_string(),
                    values: BTreeMap::from([(2022, Some(50_000.0))]),
                })
                .collect(),
        }
    }

    #[test]
    fn test_split_standard_label() {
        let label = split_area_label("091 220 Jollas").unwrap();
        assert_eq!(label.municipality_number, "091");
        assert_eq!(label.region_number, "220");
        assert_eq!(label.region_name, "Jollas");
    }

    #[test]
    fn test_split_keeps_spaces_in_region_name() {
        let label = split_area_label("049 311 Etelä Leppävaara").unwrap();
        assert_eq!(label.region_name, "Etelä Leppävaara");
    }

    #[test]
    fn test_split_single_token_is_none() {
        assert!(split_area_label("091").is_none());
        assert!(split_area_label("").is_none());
    }

    #[test]
    fn test_district_row_is_dropped() {
        let (rows, summary) = clean_statistics(&table(&["091 piiri Keskinen"]), DISTRICT_MARKER);
        assert!(rows.is_empty(), "district aggregate must never be emitted");
        assert_eq!(summary.district_rows, 1);
    }

    #[test]
    fn test_sub_region_row_is_split() {
        let (rows, _) = clean_statistics(&table(&["091 220 Jollas"]), DISTRICT_MARKER);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].municipality_number, "091");
        assert_eq!(rows[0].region_number, "220");
        assert_eq!(rows[0].region_name, "Jollas");
        assert_eq!(rows[0].values[&2022], Some(50_000.0));
    }

    #[test]
    fn test_non_sub_region_rows_are_dropped() {
        let (rows, summary) = clean_statistics(
            &table(&["091 piiri", "091 abc Name", "091 Helsinki", "091", "091 220 Jollas"]),
            DISTRICT_MARKER,
        );
        let names: Vec<&str> = rows.iter().map(|r| r.region_name.as_str()).collect();
        assert_eq!(names, vec!["Jollas"]);
        assert_eq!(summary.district_rows, 1);
        assert_eq!(summary.malformed_rows, 3);
        assert_eq!(summary.kept, 1);
    }

    #[test]
    fn test_numbered_district_row_is_dropped_by_marker() {
        // Numbered like a sub-region, but the marker makes it an aggregate.
        let (rows, _) = clean_statistics(&table(&["091 2 Eteläinen suurpiiri"]), DISTRICT_MARKER);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_cleaning_is_deterministic() {
        let input = table(&["091 220 Jollas", "049 111 Otaniemi", "092 piiri Myyrmäki"]);
        assert_eq!(
            clean_statistics(&input, DISTRICT_MARKER),
            clean_statistics(&input, DISTRICT_MARKER)
        );
    }
}
