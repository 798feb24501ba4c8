//! Pipeline configuration.
//!
//! Every setting has a built-in default matching the live Helsinki region
//! services, so running without a config file is valid. A TOML file (path
//! from the CLI or `INCOME_MAP_CONFIG`, optionally set through `.env`)
//! overrides any subset of the defaults.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::boundary::projection::Transform;
use crate::model::{
    DISTRICT_MARKER, INDICATOR_MEDIAN_INCOME, MISSING_VALUE_SENTINEL, PROP_MUNICIPALITY,
    PROP_REGION_NAME, PipelineError, Year,
};
use crate::regions;

/// Environment variable naming the TOML config file.
pub const ENV_CONFIG_PATH: &str = "INCOME_MAP_CONFIG";
/// Environment variable overriding `boundaries.cache_path`.
pub const ENV_CACHE_PATH: &str = "INCOME_MAP_CACHE_PATH";

const MAX_PRECISION: u32 = 15;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub boundaries: BoundaryConfig,
    pub statistics: StatisticsConfig,
    pub http: HttpConfig,
    pub join: JoinConfig,
    pub logging: LoggingConfig,
}

/// WFS request parameters and optimizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub wfs_url: String,
    pub layer: String,
    pub output_format: String,
    pub source_crs: String,
    pub target_crs: String,
    pub allowed_municipalities: BTreeSet<String>,
    pub name_property: String,
    pub municipality_property: String,
    pub essential_properties: BTreeSet<String>,
    /// Simplification tolerance in target-CRS units (degrees for EPSG:4326).
    pub simplify_tolerance: f64,
    /// Decimal digits kept after simplification.
    pub coordinate_precision: u32,
    pub cache_path: PathBuf,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            wfs_url: "https://kartta.hel.fi/ws/geoserver/avoindata/wfs".to_string(),
            layer: "avoindata:Seutukartta_aluejako_pienalue".to_string(),
            output_format: "application/json".to_string(),
            source_crs: "EPSG:3879".to_string(),
            target_crs: "EPSG:4326".to_string(),
            allowed_municipalities: regions::default_allowed_codes(),
            name_property: PROP_REGION_NAME.to_string(),
            municipality_property: PROP_MUNICIPALITY.to_string(),
            essential_properties: [PROP_REGION_NAME, PROP_MUNICIPALITY]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            simplify_tolerance: 0.00001,
            coordinate_precision: 6,
            cache_path: PathBuf::from("assets/helsinki_regions.json"),
        }
    }
}

/// PX-Web query parameters and cleaning markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub api_url: String,
    pub year_dimension: String,
    pub indicator_dimension: String,
    pub indicator: String,
    pub first_year: Year,
    pub last_year: Year,
    pub area_column: String,
    pub missing_sentinel: String,
    pub district_marker: String,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://stat.hel.fi:443/api/v1/fi/Aluesarjat/tul/astul/alu_astul_006f.px"
                .to_string(),
            year_dimension: "Vuosi".to_string(),
            indicator_dimension: "Tiedot".to_string(),
            indicator: INDICATOR_MEDIAN_INCOME.to_string(),
            first_year: 2005,
            last_year: 2023,
            area_column: "Alue".to_string(),
            missing_sentinel: MISSING_VALUE_SENTINEL.to_string(),
            district_marker: DISTRICT_MARKER.to_string(),
        }
    }
}

impl StatisticsConfig {
    /// Every year in `first_year..=last_year`, ascending.
    pub fn years(&self) -> Vec<Year> {
        (self.first_year..=self.last_year).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("income_map_service/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builds the blocking client shared by both remote sources.
    pub fn build_client(&self) -> Result<reqwest::blocking::Client, PipelineError> {
        reqwest::blocking::Client::builder()
            .timeout(self.timeout())
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Below this share of matched regions the join is reported as degraded.
    pub min_match_ratio: f64,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self { min_match_ratio: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Append log lines to this file instead of the console.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl PipelineConfig {
    /// Parses a TOML document; missing keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Resolves the configuration in priority order:
    /// 1. explicit `path` argument
    /// 2. `INCOME_MAP_CONFIG` (environment or `.env`)
    /// 3. built-in defaults
    ///
    /// `INCOME_MAP_CACHE_PATH` then overrides the artifact location, and the
    /// result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        dotenv::dotenv().ok();

        let env_path = std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };

        if let Ok(cache_path) = std::env::var(ENV_CACHE_PATH) {
            config.boundaries.cache_path = PathBuf::from(cache_path);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let b = &self.boundaries;
        if b.allowed_municipalities.is_empty() {
            return Err(PipelineError::Config(
                "boundaries.allowed_municipalities must not be empty".to_string(),
            ));
        }
        if b.coordinate_precision > MAX_PRECISION {
            return Err(PipelineError::Config(format!(
                "boundaries.coordinate_precision must be at most {}, got {}",
                MAX_PRECISION, b.coordinate_precision
            )));
        }
        if !b.simplify_tolerance.is_finite() || b.simplify_tolerance < 0.0 {
            return Err(PipelineError::Config(format!(
                "boundaries.simplify_tolerance must be a non-negative number, got {}",
                b.simplify_tolerance
            )));
        }
        if !b.essential_properties.contains(&b.name_property) {
            return Err(PipelineError::Config(format!(
                "boundaries.essential_properties must keep the name property '{}'",
                b.name_property
            )));
        }
        Transform::between(&b.source_crs, &b.target_crs)?;

        let s = &self.statistics;
        if s.first_year > s.last_year {
            return Err(PipelineError::Config(format!(
                "statistics.first_year ({}) is after statistics.last_year ({})",
                s.first_year, s.last_year
            )));
        }
        if s.missing_sentinel.is_empty() || s.district_marker.is_empty() {
            return Err(PipelineError::Config(
                "statistics.missing_sentinel and statistics.district_marker must not be empty"
                    .to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.join.min_match_ratio) {
            return Err(PipelineError::Config(format!(
                "join.min_match_ratio must be within 0..=1, got {}",
                self.join.min_match_ratio
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_live_services() {
        let config = PipelineConfig::default();
        assert_eq!(config.boundaries.source_crs, "EPSG:3879");
        assert_eq!(config.boundaries.target_crs, "EPSG:4326");
        assert_eq!(config.boundaries.coordinate_precision, 6);
        assert_eq!(config.statistics.indicator, "Median_svatv");
        assert_eq!(config.statistics.years().len(), 19, "2005..=2023 is 19 years");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [boundaries]
            coordinate_precision = 5
            cache_path = "/tmp/regions.json"

            [statistics]
            first_year = 2020
            last_year = 2022
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.boundaries.coordinate_precision, 5);
        assert_eq!(config.boundaries.cache_path, PathBuf::from("/tmp/regions.json"));
        assert_eq!(config.boundaries.layer, BoundaryConfig::default().layer);
        assert_eq!(config.statistics.years(), vec![2020, 2021, 2022]);
        assert_eq!(config.http.timeout_secs, 30);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = PipelineConfig::from_toml_str("[boundaries\nlayer = ");
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_reversed_years() {
        let mut config = PipelineConfig::default();
        config.statistics.first_year = 2023;
        config.statistics.last_year = 2005;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_excess_precision_and_bad_tolerance() {
        let mut config = PipelineConfig::default();
        config.boundaries.coordinate_precision = 16;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.boundaries.simplify_tolerance = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unsupported_crs() {
        let mut config = PipelineConfig::default();
        config.boundaries.source_crs = "EPSG:27700".to_string();
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validate_requires_name_property_to_survive_stripping() {
        let mut config = PipelineConfig::default();
        config.boundaries.essential_properties = ["kunta".to_string()].into_iter().collect();
        assert!(config.validate().is_err());
    }
}
