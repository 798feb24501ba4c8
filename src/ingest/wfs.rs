/// WFS client for the Helsinki region map service.
///
/// Retrieves the sub-region ("pienalue") boundary layer as GeoJSON in the
/// service's native projection. One synchronous GET per call, no retries.
///
/// Service: https://kartta.hel.fi/ws/geoserver/avoindata/wfs

use geojson::FeatureCollection;
use reqwest::Url;
use tracing::{debug, error, info};

use crate::config::BoundaryConfig;
use crate::ingest::{BoundarySource, snippet, transport_error};
use crate::model::{PipelineError, Stage};

// ============================================================================
// Request
// ============================================================================

/// GetFeature request parameters for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct WfsRequest {
    pub base_url: String,
    pub layer: String,
    pub output_format: String,
    pub srs_name: String,
}

impl WfsRequest {
    pub fn from_config(config: &BoundaryConfig) -> Self {
        Self {
            base_url: config.wfs_url.clone(),
            layer: config.layer.clone(),
            output_format: config.output_format.clone(),
            srs_name: config.source_crs.clone(),
        }
    }

    /// Query string parameters, in the order the service documents them.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("service", "WFS".to_string()),
            ("version", "2.0.0".to_string()),
            ("request", "GetFeature".to_string()),
            ("typeNames", self.layer.clone()),
            ("outputFormat", self.output_format.clone()),
            ("srsName", self.srs_name.clone()),
        ]
    }

    /// Full request URL.
    pub fn url(&self) -> Result<Url, PipelineError> {
        Url::parse_with_params(&self.base_url, self.query_params()).map_err(|e| {
            PipelineError::Config(format!("invalid WFS URL '{}': {}", self.base_url, e))
        })
    }
}

// ============================================================================
// Response
// ============================================================================

/// Parses a GetFeature response body.
///
/// GeoServer answers some failures with an XML exception report and a 200
/// status, so anything that is not a GeoJSON feature collection is an
/// upstream error rather than a parse panic further down.
pub fn parse_feature_collection(body: &str) -> Result<FeatureCollection, PipelineError> {
    body.parse::<FeatureCollection>().map_err(|e| PipelineError::Upstream {
        stage: Stage::BoundaryFetch,
        status: None,
        message: format!("response is not a GeoJSON feature collection ({}): {}", e, snippet(body, 120)),
    })
}

// ============================================================================
// Client
// ============================================================================

pub struct WfsClient {
    client: reqwest::blocking::Client,
    request: WfsRequest,
}

impl WfsClient {
    pub fn new(client: reqwest::blocking::Client, config: &BoundaryConfig) -> Self {
        Self {
            client,
            request: WfsRequest::from_config(config),
        }
    }

    pub fn request(&self) -> &WfsRequest {
        &self.request
    }
}

impl BoundarySource for WfsClient {
    fn fetch_boundaries(&self) -> Result<FeatureCollection, PipelineError> {
        let url = self.request.url()?;
        info!(stage = "WFS", "downloading boundaries for layer {}", self.request.layer);
        debug!(stage = "WFS", "GET {}", url);

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| transport_error(Stage::BoundaryFetch, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            error!(stage = "WFS", "boundary request failed: HTTP {}", status);
            return Err(PipelineError::Upstream {
                stage: Stage::BoundaryFetch,
                status: Some(status.as_u16()),
                message: snippet(&body, 200),
            });
        }

        let body = response
            .text()
            .map_err(|e| transport_error(Stage::BoundaryFetch, e))?;
        let collection = parse_feature_collection(&body)?;
        info!(stage = "WFS", "received {} features", collection.features.len());
        Ok(collection)
    }

    fn describe(&self) -> String {
        format!("WFS {} ({})", self.request.base_url, self.request.layer)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_carries_all_getfeature_params() {
        let request = WfsRequest::from_config(&BoundaryConfig::default());
        let url = request.url().unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let expect = |key: &str, value: &str| {
            assert!(
                pairs.iter().any(|(k, v)| k == key && v == value),
                "missing {}={} in {}",
                key,
                value,
                url
            );
        };
        expect("service", "WFS");
        expect("version", "2.0.0");
        expect("request", "GetFeature");
        expect("typeNames", "avoindata:Seutukartta_aluejako_pienalue");
        expect("outputFormat", "application/json");
        expect("srsName", "EPSG:3879");
        assert_eq!(url.host_str(), Some("kartta.hel.fi"));
    }

    #[test]
    fn test_parse_feature_collection_accepts_geojson() {
        let body = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":null,"properties":{"nimi":"Jollas","kunta":"091"}}
        ]}"#;
        let collection = parse_feature_collection(body).unwrap();
        assert_eq!(collection.features.len(), 1);
    }

    #[test]
    fn test_exception_report_is_upstream_error() {
        let body = r#"<?xml version="1.0"?><ows:ExceptionReport><ows:Exception exceptionCode="InvalidParameterValue"/></ows:ExceptionReport>"#;
        match parse_feature_collection(body) {
            Err(PipelineError::Upstream { stage, status, message }) => {
                assert_eq!(stage, Stage::BoundaryFetch);
                assert_eq!(status, None);
                assert!(message.contains("ExceptionReport"), "{}", message);
            }
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let mut config = BoundaryConfig::default();
        config.wfs_url = "not a url".to_string();
        let request = WfsRequest::from_config(&config);
        assert!(matches!(request.url(), Err(PipelineError::Config(_))));
    }
}
