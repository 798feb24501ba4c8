//! Read-side queries over the joined dataset.
//!
//! Renderers (choropleth, comparison chart, data explorer) never touch the
//! pipeline directly: they receive an `IncomeDataset` and use the queries
//! here. Everything is read-only.

use std::collections::BTreeSet;
use std::io::Write;

use chrono::{DateTime, Utc};
use geojson::FeatureCollection;
use serde::Serialize;

use crate::analysis::join::{JoinOutcome, JoinReport};
use crate::boundary::optimize::collection_from_boundaries;
use crate::model::{JoinedRegionSeries, PROP_MUNICIPALITY, PROP_REGION_NAME, Year};

/// One point of the long-format (region, year, value) series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub region_name: String,
    pub year: Year,
    pub value: Option<f64>,
}

/// The immutable result of one successful pipeline run.
#[derive(Debug, Clone)]
pub struct IncomeDataset {
    /// Requested years, ascending.
    pub years: Vec<Year>,
    /// Joined regions, sorted by name.
    pub regions: Vec<JoinedRegionSeries>,
    pub report: JoinReport,
    /// CRS of every geometry in `regions`.
    pub crs: String,
    /// When the run that produced this dataset finished joining.
    pub loaded_at: DateTime<Utc>,
}

impl IncomeDataset {
    pub fn new(years: &[Year], outcome: JoinOutcome, crs: impl Into<String>) -> Self {
        let mut years = years.to_vec();
        years.sort_unstable();
        years.dedup();
        Self {
            years,
            regions: outcome.series,
            report: outcome.report,
            crs: crs.into(),
            loaded_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Region names in display order (the dropdown options).
    pub fn region_names(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.region_name.as_str()).collect()
    }

    pub fn region(&self, name: &str) -> Option<&JoinedRegionSeries> {
        self.regions
            .binary_search_by(|r| r.region_name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.regions[idx])
    }

    /// Long-format points for every selected region and every requested
    /// year, ordered by region then year. Unknown names are ignored; a
    /// single selection is just a one-element set.
    pub fn series_for(&self, selected: &BTreeSet<String>) -> Vec<SeriesPoint> {
        selected
            .iter()
            .filter_map(|name| self.region(name))
            .flat_map(|region| {
                self.years.iter().map(move |&year| SeriesPoint {
                    region_name: region.region_name.clone(),
                    year,
                    value: region.value(year),
                })
            })
            .collect()
    }

    /// (region, value) pairs for one animation frame, or `None` when `year`
    /// was not requested.
    pub fn frame(&self, year: Year) -> Option<Vec<(&str, Option<f64>)>> {
        if !self.years.contains(&year) {
            return None;
        }
        Some(
            self.regions
                .iter()
                .map(|r| (r.region_name.as_str(), r.value(year)))
                .collect(),
        )
    }

    /// The first `limit` table rows.
    pub fn preview(&self, limit: usize) -> &[JoinedRegionSeries] {
        &self.regions[..limit.min(self.regions.len())]
    }

    /// Smallest and largest non-null income over all regions and years.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.regions
            .iter()
            .flat_map(|r| r.values.values().filter_map(|v| *v))
            .fold(None, |range, v| match range {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Geometries keyed by region name, for the choropleth layer.
    pub fn geometry_collection(&self) -> FeatureCollection {
        collection_from_boundaries(
            self.regions.iter().map(|r| {
                (
                    r.region_name.as_str(),
                    r.municipality_code.as_str(),
                    &r.geometry,
                )
            }),
            PROP_REGION_NAME,
            PROP_MUNICIPALITY,
        )
    }

    /// Writes the table surface: `region_name` followed by one column per
    /// requested year. Suppressed values are empty cells.
    pub fn write_table_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut out = csv::Writer::from_writer(writer);

        let mut header = vec!["region_name".to_string()];
        header.extend(self.years.iter().map(|y| y.to_string()));
        out.write_record(&header)?;

        for region in &self.regions {
            let mut record = vec![region.region_name.clone()];
            record.extend(
                self.years
                    .iter()
                    .map(|&y| region.value(y).map(|v| v.to_string()).unwrap_or_default()),
            );
            out.write_record(&record)?;
        }
        out.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::join::join_datasets;
    use crate::model::{IncomeRow, RegionBoundary};
    use geo::{Geometry, polygon};

    fn dataset() -> IncomeDataset {
        let square = Geometry::Polygon(polygon![
            (x: 24.9, y: 60.1),
            (x: 24.91, y: 60.1),
            (x: 24.91, y: 60.11),
            (x: 24.9, y: 60.1),
        ]);
        let boundaries = ["Laajasalo", "Jollas", "Otaniemi"]
            .iter()
            .map(|name| RegionBoundary {
                region_name: name.to_string(),
                municipality_code: if *name == "Otaniemi" { "049" } else { "091" }.to_string(),
                geometry: square.clone(),
                source_crs: "EPSG:3879".to_string(),
                crs: "EPSG:4326".to_string(),
            })
            .collect();
        let rows = vec![
            IncomeRow {
                municipality_number: "091".to_string(),
                region_number: "220".to_string(),
                region_name: "Jollas".to_string(),
                values: [(2005, Some(41_000.0)), (2006, Some(43_000.0))].into(),
            },
            IncomeRow {
                municipality_number: "091".to_string(),
                region_number: "221".to_string(),
                region_name: "Laajasalo".to_string(),
                values: [(2005, None), (2006, Some(35_500.0))].into(),
            },
            IncomeRow {
                municipality_number: "049".to_string(),
                region_number: "111".to_string(),
                region_name: "Otaniemi".to_string(),
                values: [(2005, Some(22_000.0)), (2006, Some(23_000.0))].into(),
            },
        ];
        IncomeDataset::new(&[2006, 2005], join_datasets(boundaries, &rows), "EPSG:4326")
    }

    #[test]
    fn test_loaded_at_is_stamped_on_construction() {
        let before = Utc::now();
        let data = dataset();
        assert!(
            before <= data.loaded_at && data.loaded_at <= Utc::now(),
            "loaded_at should be taken when the dataset is built"
        );
    }

    #[test]
    fn test_region_names_are_sorted() {
        let data = dataset();
        assert_eq!(data.region_names(), vec!["Jollas", "Laajasalo", "Otaniemi"]);
        assert_eq!(data.years, vec![2005, 2006], "years must be ascending");
    }

    #[test]
    fn test_series_for_singleton_and_multiple_selection() {
        let data = dataset();

        let single = data.series_for(&BTreeSet::from(["Jollas".to_string()]));
        assert_eq!(single.len(), 2);
        assert_eq!(single[0].year, 2005);
        assert_eq!(single[1].value, Some(43_000.0));

        let many = data.series_for(&BTreeSet::from([
            "Laajasalo".to_string(),
            "Jollas".to_string(),
            "Nowhere".to_string(),
        ]));
        assert_eq!(many.len(), 4, "unknown names must be ignored");
        assert_eq!(many[2].region_name, "Laajasalo");
        assert_eq!(many[2].value, None, "suppressed values stay null in the series");
    }

    #[test]
    fn test_frame_for_requested_and_unrequested_year() {
        let data = dataset();
        let frame = data.frame(2005).unwrap();
        assert_eq!(frame[0], ("Jollas", Some(41_000.0)));
        assert_eq!(frame[1], ("Laajasalo", None));
        assert!(data.frame(2010).is_none());
    }

    #[test]
    fn test_preview_is_bounded() {
        let data = dataset();
        assert_eq!(data.preview(2).len(), 2);
        assert_eq!(data.preview(20).len(), 3);
        assert!(data.preview(0).is_empty());
    }

    #[test]
    fn test_value_range_skips_nulls() {
        assert_eq!(dataset().value_range(), Some((22_000.0, 43_000.0)));
    }

    #[test]
    fn test_geometry_collection_keyed_by_name() {
        let collection = dataset().geometry_collection();
        assert_eq!(collection.features.len(), 3);
        let first = &collection.features[0];
        assert_eq!(
            first.property(PROP_REGION_NAME).and_then(|v| v.as_str()),
            Some("Jollas")
        );
        assert_eq!(
            first.property(PROP_MUNICIPALITY).and_then(|v| v.as_str()),
            Some("091")
        );
        assert!(first.geometry.is_some());
    }

    #[test]
    fn test_table_csv_has_one_column_per_year() {
        let mut out = Vec::new();
        dataset().write_table_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "region_name,2005,2006");
        assert_eq!(lines[1], "Jollas,41000,43000");
        assert_eq!(lines[2], "Laajasalo,,35500", "null must be an empty cell, not zero");
        assert_eq!(lines.len(), 4);
    }
}
