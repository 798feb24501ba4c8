//! Boundary optimization: filter, reproject, simplify, round, strip.
//!
//! Turns the raw WFS feature collection into the compact collection that is
//! persisted as the cache artifact. The steps always run in this order;
//! rounding happens after simplification because it is lossy.

use std::collections::BTreeSet;

use geo::{
    Coord, Geometry, Intersects, Line, LineString, MapCoords, MultiPolygon, Polygon, Simplify,
    SimplifyVwPreserve,
};
use geojson::{Feature, FeatureCollection, JsonObject};
use tracing::{debug, info, warn};

use crate::boundary::projection::Transform;
use crate::config::BoundaryConfig;
use crate::model::{PipelineError, RegionBoundary};
use crate::regions::normalize_municipality_code;

/// Settings for one optimization run, resolved from `BoundaryConfig`.
#[derive(Debug, Clone)]
pub struct OptimizeOptions {
    pub allowed_municipalities: BTreeSet<String>,
    pub transform: Transform,
    pub source_crs: String,
    pub target_crs: String,
    pub simplify_tolerance: f64,
    pub coordinate_precision: u32,
    pub name_property: String,
    pub municipality_property: String,
    pub essential_properties: BTreeSet<String>,
}

impl OptimizeOptions {
    pub fn from_config(config: &BoundaryConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            allowed_municipalities: config.allowed_municipalities.clone(),
            transform: Transform::between(&config.source_crs, &config.target_crs)?,
            source_crs: config.source_crs.clone(),
            target_crs: config.target_crs.clone(),
            simplify_tolerance: config.simplify_tolerance,
            coordinate_precision: config.coordinate_precision,
            name_property: config.name_property.clone(),
            municipality_property: config.municipality_property.clone(),
            essential_properties: config.essential_properties.clone(),
        })
    }
}

/// Counts from one optimization run, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptimizeSummary {
    pub input: usize,
    pub filtered_out: usize,
    pub kept: usize,
    pub coordinates_before: usize,
    pub coordinates_after: usize,
}

// ---------------------------------------------------------------------------
// Pipeline entry point
// ---------------------------------------------------------------------------

/// Runs the five optimization steps over a raw collection.
///
/// Fails with `DataProcessing` if no feature survives the municipality
/// filter or if any surviving geometry is missing, unparseable, not
/// polygonal, or cannot be reprojected. Nothing is returned on failure, so
/// the caller never persists a partial artifact.
pub fn optimize_boundaries(
    raw: &FeatureCollection,
    options: &OptimizeOptions,
) -> Result<(FeatureCollection, OptimizeSummary), PipelineError> {
    let mut summary = OptimizeSummary {
        input: raw.features.len(),
        ..Default::default()
    };

    // 1. Municipality filter
    let allowed: Vec<&Feature> = raw
        .features
        .iter()
        .filter(|feature| {
            let code = feature
                .property(&options.municipality_property)
                .and_then(normalize_municipality_code);
            match code {
                Some(code) => options.allowed_municipalities.contains(&code),
                None => false,
            }
        })
        .collect();
    summary.filtered_out = summary.input - allowed.len();

    if allowed.is_empty() {
        return Err(PipelineError::DataProcessing(format!(
            "no features matched municipalities {:?} ({} features in response)",
            options.allowed_municipalities, summary.input
        )));
    }

    let mut features = Vec::with_capacity(allowed.len());
    for (index, feature) in allowed.into_iter().enumerate() {
        let label = feature_label(feature, &options.name_property, index);
        let geometry = parse_polygonal(feature, &label)?;
        summary.coordinates_before += coordinate_count(&geometry);

        // 2. Reproject
        let projected = reproject(&geometry, &options.transform)
            .map_err(|e| PipelineError::DataProcessing(format!("{}: {}", label, e)))?;
        // 3. Simplify
        let simplified = simplify(&projected, options.simplify_tolerance);
        // 4. Round
        let rounded = round_geometry(&simplified, options.coordinate_precision);
        summary.coordinates_after += coordinate_count(&rounded);

        // 5. Strip properties
        let properties = strip_properties(feature, options);

        features.push(Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&rounded))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }
    summary.kept = features.len();

    info!(
        stage = "GEOM",
        input = summary.input,
        kept = summary.kept,
        filtered_out = summary.filtered_out,
        "optimized boundaries: {} → {} coordinates",
        summary.coordinates_before,
        summary.coordinates_after
    );

    Ok((
        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
        summary,
    ))
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

fn feature_label(feature: &Feature, name_property: &str, index: usize) -> String {
    match feature.property(name_property).and_then(|v| v.as_str()) {
        Some(name) => format!("feature '{}'", name),
        None => format!("feature #{}", index),
    }
}

/// Converts a GeoJSON feature geometry into a `Polygon` or `MultiPolygon`.
fn parse_polygonal(feature: &Feature, label: &str) -> Result<Geometry<f64>, PipelineError> {
    let geometry = feature.geometry.as_ref().ok_or_else(|| {
        PipelineError::DataProcessing(format!("{} has no geometry", label))
    })?;
    let parsed = Geometry::<f64>::try_from(geometry.value.clone()).map_err(|e| {
        PipelineError::DataProcessing(format!("{} has an invalid geometry: {}", label, e))
    })?;
    match parsed {
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => Ok(parsed),
        other => Err(PipelineError::DataProcessing(format!(
            "{} has unsupported geometry type {}",
            label,
            geometry_type_name(&other)
        ))),
    }
}

fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

fn reproject(geometry: &Geometry<f64>, transform: &Transform) -> Result<Geometry<f64>, PipelineError> {
    match geometry {
        Geometry::Polygon(p) => Ok(Geometry::Polygon(transform.apply_geometry(p)?)),
        Geometry::MultiPolygon(mp) => Ok(Geometry::MultiPolygon(transform.apply_geometry(mp)?)),
        _ => Ok(geometry.clone()),
    }
}

/// Douglas-Peucker simplification bounded by `tolerance`, a distance in
/// target-CRS units, applied ring by ring.
///
/// A ring that would collapse below four coordinates keeps its original
/// shape. If the simplified rings cross themselves or each other, the
/// topology-preserving Visvalingam-Whyatt result (area threshold
/// `tolerance²`) is used for that polygon instead. A zero tolerance leaves
/// the geometry untouched.
pub fn simplify(geometry: &Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    if tolerance <= 0.0 {
        return geometry.clone();
    }
    match geometry {
        Geometry::Polygon(p) => Geometry::Polygon(simplify_polygon(p, tolerance)),
        Geometry::MultiPolygon(mp) => Geometry::MultiPolygon(MultiPolygon::new(
            mp.0.iter().map(|p| simplify_polygon(p, tolerance)).collect(),
        )),
        other => other.clone(),
    }
}

fn simplify_ring(ring: &LineString<f64>, tolerance: f64) -> LineString<f64> {
    let simplified = ring.simplify(&tolerance);
    if simplified.0.len() < 4 {
        ring.clone()
    } else {
        simplified
    }
}

fn simplify_polygon(polygon: &Polygon<f64>, tolerance: f64) -> Polygon<f64> {
    let candidate = Polygon::new(
        simplify_ring(polygon.exterior(), tolerance),
        polygon
            .interiors()
            .iter()
            .map(|ring| simplify_ring(ring, tolerance))
            .collect(),
    );
    if rings_are_simple(&candidate) {
        candidate
    } else {
        debug!(stage = "GEOM", "distance simplification broke ring topology, using area threshold");
        polygon.simplify_vw_preserve(&(tolerance * tolerance))
    }
}

/// True when no ring crosses itself and no two rings touch.
fn rings_are_simple(polygon: &Polygon<f64>) -> bool {
    let rings: Vec<Vec<Line<f64>>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| ring.lines().collect())
        .collect();

    for (i, segments) in rings.iter().enumerate() {
        let n = segments.len();
        for a in 0..n {
            for b in (a + 2)..n {
                // first and last segment share the closing vertex
                if a == 0 && b == n - 1 {
                    continue;
                }
                if segments[a].intersects(&segments[b]) {
                    return false;
                }
            }
        }
        for other in &rings[i + 1..] {
            if segments.iter().any(|s| other.iter().any(|o| s.intersects(o))) {
                return false;
            }
        }
    }
    true
}

/// Rounds `value` to `precision` decimal digits.
pub fn round_coordinate(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (value * scale).round() / scale
}

/// Rounds every coordinate of `geometry`. Idempotent for a fixed precision.
pub fn round_geometry(geometry: &Geometry<f64>, precision: u32) -> Geometry<f64> {
    geometry.map_coords(|c| Coord {
        x: round_coordinate(c.x, precision),
        y: round_coordinate(c.y, precision),
    })
}

fn strip_properties(feature: &Feature, options: &OptimizeOptions) -> JsonObject {
    let mut kept = JsonObject::new();
    if let Some(properties) = &feature.properties {
        for (key, value) in properties {
            if options.essential_properties.contains(key) {
                kept.insert(key.clone(), value.clone());
            }
        }
    }
    // The filter accepted numeric codes too; store the normalized string.
    if let Some(code) = feature
        .property(&options.municipality_property)
        .and_then(normalize_municipality_code)
    {
        if options.essential_properties.contains(&options.municipality_property) {
            kept.insert(
                options.municipality_property.clone(),
                serde_json::Value::String(code),
            );
        }
    }
    kept
}

fn coordinate_count(geometry: &Geometry<f64>) -> usize {
    fn polygon_count(p: &Polygon<f64>) -> usize {
        p.exterior().0.len() + p.interiors().iter().map(|r| r.0.len()).sum::<usize>()
    }
    match geometry {
        Geometry::Polygon(p) => polygon_count(p),
        Geometry::MultiPolygon(mp) => mp.0.iter().map(polygon_count).sum(),
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Artifact → domain
// ---------------------------------------------------------------------------

/// Reads optimized features back into `RegionBoundary` values.
///
/// Features without a name are skipped with a warning: they can never take
/// part in the join. A missing or non-polygonal geometry is an error.
pub fn boundaries_from_collection(
    collection: &FeatureCollection,
    config: &BoundaryConfig,
) -> Result<Vec<RegionBoundary>, PipelineError> {
    let mut boundaries = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.iter().enumerate() {
        let Some(name) = feature
            .property(&config.name_property)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            warn!(stage = "GEOM", "feature #{} has no '{}' property, skipped", index, config.name_property);
            continue;
        };
        let label = format!("feature '{}'", name);
        let geometry = parse_polygonal(feature, &label)?;
        let municipality_code = feature
            .property(&config.municipality_property)
            .and_then(normalize_municipality_code)
            .unwrap_or_default();

        boundaries.push(RegionBoundary {
            region_name: name.to_string(),
            municipality_code,
            geometry,
            source_crs: config.source_crs.clone(),
            crs: config.target_crs.clone(),
        });
    }
    debug!(stage = "GEOM", "loaded {} region boundaries", boundaries.len());
    Ok(boundaries)
}

/// Builds the GeoJSON collection renderers use, keyed by `name_property`.
pub fn collection_from_boundaries<'a, I>(
    boundaries: I,
    name_property: &str,
    municipality_property: &str,
) -> FeatureCollection
where
    I: IntoIterator<Item = (&'a str, &'a str, &'a Geometry<f64>)>,
{
    let features = boundaries
        .into_iter()
        .map(|(name, code, geometry)| {
            let mut properties = JsonObject::new();
            properties.insert(name_property.to_string(), name.into());
            properties.insert(municipality_property.to_string(), code.into());
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
