/// PX-Web client for the Helsinki regional statistics database.
///
/// Retrieves median household taxable income by sub-region for a set of
/// years. The table is queried with a JSON POST and answered as CSV.
///
/// Table: Aluesarjat / tul / astul / alu_astul_006f.px
/// API documentation: https://stat.hel.fi/api/v1/fi/Aluesarjat

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::StatisticsConfig;
use crate::ingest::{StatisticsSource, snippet, transport_error};
use crate::model::{PipelineError, Stage, StatisticsRow, StatisticsTable, Year};

// ============================================================================
// Query body
// ============================================================================

/// Top-level PX-Web query document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PxQuery {
    pub query: Vec<PxDimensionFilter>,
    pub response: PxResponseFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PxDimensionFilter {
    pub code: String,
    pub selection: PxSelection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PxSelection {
    pub filter: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PxResponseFormat {
    pub format: String,
}

/// Builds the query selecting `years` and the configured income indicator.
pub fn build_query(config: &StatisticsConfig, years: &[Year]) -> PxQuery {
    PxQuery {
        query: vec![
            PxDimensionFilter {
                code: config.year_dimension.clone(),
                selection: PxSelection {
                    filter: "item".to_string(),
                    values: years.iter().map(|y| y.to_string()).collect(),
                },
            },
            PxDimensionFilter {
                code: config.indicator_dimension.clone(),
                selection: PxSelection {
                    filter: "item".to_string(),
                    values: vec![config.indicator.clone()],
                },
            },
        ],
        response: PxResponseFormat {
            format: "csv".to_string(),
        },
    }
}

// ============================================================================
// CSV parsing
// ============================================================================

/// Reduces a raw header to its first whitespace-delimited token.
///
/// PX-Web CSV headers embed the year and a human-readable label, e.g.
/// `"2022 Valtionveronalaisten tulojen mediaani, euroa"` → `"2022"`.
pub fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string()
}

/// Parses a PX-Web CSV response into a `StatisticsTable`.
///
/// - headers are normalized with `normalize_header`
/// - a cell equal to `sentinel` (or blank) becomes `None`
/// - rows with no value in any requested year are dropped
/// - remaining year cells must parse as `f64`, otherwise `SchemaError`
///
/// A missing area column or year column is also a `SchemaError`; an
/// unreadable CSV record is an `UpstreamError`.
pub fn parse_statistics_csv(
    text: &str,
    years: &[Year],
    area_column: &str,
    sentinel: &str,
) -> Result<StatisticsTable, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| malformed_csv(&e))?
        .iter()
        .map(normalize_header)
        .collect();

    let area_idx = headers
        .iter()
        .position(|h| h == area_column)
        .ok_or_else(|| {
            PipelineError::Schema(format!(
                "column '{}' missing from statistics response (headers: {:?})",
                area_column, headers
            ))
        })?;

    let mut year_columns = Vec::with_capacity(years.len());
    for &year in years {
        let token = year.to_string();
        let idx = headers.iter().position(|h| *h == token).ok_or_else(|| {
            PipelineError::Schema(format!("year column '{}' missing from statistics response", year))
        })?;
        year_columns.push((year, idx));
    }

    let mut rows = Vec::new();
    let mut dropped_empty = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| malformed_csv(&e))?;
        let area = record.get(area_idx).unwrap_or("").trim().to_string();

        let cells: Vec<(Year, Option<&str>)> = year_columns
            .iter()
            .map(|&(year, idx)| {
                let cell = record.get(idx).map(str::trim).unwrap_or("");
                if cell.is_empty() || cell == sentinel {
                    (year, None)
                } else {
                    (year, Some(cell))
                }
            })
            .collect();

        if cells.iter().all(|(_, cell)| cell.is_none()) {
            dropped_empty += 1;
            continue;
        }

        let mut values = BTreeMap::new();
        for (year, cell) in cells {
            let value = match cell {
                None => None,
                Some(raw) => Some(raw.parse::<f64>().map_err(|_| {
                    PipelineError::Schema(format!(
                        "year column '{}' is not numeric: '{}' for area '{}'",
                        year, raw, area
                    ))
                })?),
            };
            values.insert(year, value);
        }
        rows.push(StatisticsRow { area, values });
    }

    if dropped_empty > 0 {
        debug!(stage = "PXWEB", "dropped {} rows with no values in any requested year", dropped_empty);
    }

    Ok(StatisticsTable {
        years: years.to_vec(),
        rows,
    })
}

fn malformed_csv(err: &csv::Error) -> PipelineError {
    PipelineError::Upstream {
        stage: Stage::StatisticsFetch,
        status: None,
        message: format!("malformed CSV: {}", err),
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct PxWebClient {
    client: reqwest::blocking::Client,
    config: StatisticsConfig,
}

impl PxWebClient {
    pub fn new(client: reqwest::blocking::Client, config: &StatisticsConfig) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }
}

impl StatisticsSource for PxWebClient {
    /// POSTs the query and parses the CSV answer.
    ///
    /// A non-success status is not an error here: it is logged and an empty
    /// table is returned, which the pipeline turns into "no data".
    fn fetch_statistics(&self, years: &[Year]) -> Result<StatisticsTable, PipelineError> {
        let query = build_query(&self.config, years);
        info!(stage = "PXWEB", "requesting {} for {} years", self.config.indicator, years.len());

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&query)
            .send()
            .map_err(|e| transport_error(Stage::StatisticsFetch, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            error!(
                stage = "PXWEB",
                "statistics request failed: HTTP {}: {}",
                status,
                snippet(&body, 200)
            );
            return Ok(StatisticsTable::empty());
        }

        let text = response
            .text()
            .map_err(|e| transport_error(Stage::StatisticsFetch, e))?;
        let table = parse_statistics_csv(
            &text,
            years,
            &self.config.area_column,
            &self.config.missing_sentinel,
        )?;
        if table.is_empty() {
            warn!(stage = "PXWEB", "statistics response contained no data rows");
        } else {
            info!(stage = "PXWEB", "received {} statistics rows", table.rows.len());
        }
        Ok(table)
    }

    fn describe(&self) -> String {
        format!("PX-Web {}", self.config.api_url)
    }
}

// ============================================================================
// Tests
// ============================================================================
