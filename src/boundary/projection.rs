//! Coordinate reference system transforms.
//!
//! The boundary service publishes ETRS89 Gauss-Krüger coordinates
//! (EPSG:3879, GK25FIN); the map layer wants geographic WGS84 (EPSG:4326).
//! ETRS89 and WGS84 agree to well under the precision kept in the artifact,
//! so the transform is a pure Transverse Mercator inverse on the GRS80
//! ellipsoid, evaluated with the Krüger series to third order in `n`
//! (sub-millimetre over the Finnish zones).
//!
//! Supported projected systems: EPSG:3067 (ETRS-TM35FIN) and EPSG:3873–3885
//! (ETRS-GK19FIN … ETRS-GK31FIN).

use geo::{Coord, MapCoords};

use crate::model::PipelineError;

const GRS80_A: f64 = 6_378_137.0;
const GRS80_INV_F: f64 = 298.257_222_101;

/// Transverse Mercator projection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransverseMercator {
    pub central_meridian_deg: f64,
    pub scale_factor: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

impl TransverseMercator {
    /// ETRS-GKn zone: central meridian n°E, scale 1, false easting n·10⁶ + 500 000.
    pub fn gauss_kruger(zone: u32) -> Self {
        Self {
            central_meridian_deg: zone as f64,
            scale_factor: 1.0,
            false_easting: zone as f64 * 1_000_000.0 + 500_000.0,
            false_northing: 0.0,
        }
    }

    /// ETRS-TM35FIN (EPSG:3067).
    pub fn tm35fin() -> Self {
        Self {
            central_meridian_deg: 27.0,
            scale_factor: 0.9996,
            false_easting: 500_000.0,
            false_northing: 0.0,
        }
    }

    /// Projected (easting, northing) → geographic (lon, lat) in degrees.
    pub fn inverse(&self, easting: f64, northing: f64) -> (f64, f64) {
        let k = Series::grs80();
        let xi = (northing - self.false_northing) / (self.scale_factor * k.a_rect);
        let eta = (easting - self.false_easting) / (self.scale_factor * k.a_rect);

        let mut xi_p = xi;
        let mut eta_p = eta;
        for (j, beta) in k.beta.iter().enumerate() {
            let m = 2.0 * (j + 1) as f64;
            xi_p -= beta * (m * xi).sin() * (m * eta).cosh();
            eta_p -= beta * (m * xi).cos() * (m * eta).sinh();
        }

        let chi = (xi_p.sin() / eta_p.cosh()).asin();
        let mut lat = chi;
        for (j, delta) in k.delta.iter().enumerate() {
            lat += delta * (2.0 * (j + 1) as f64 * chi).sin();
        }
        let lon = self.central_meridian_deg.to_radians() + eta_p.sinh().atan2(xi_p.cos());

        (lon.to_degrees(), lat.to_degrees())
    }

    /// Geographic (lon, lat) in degrees → projected (easting, northing).
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let k = Series::grs80();
        let phi = lat_deg.to_radians();
        let dlam = lon_deg.to_radians() - self.central_meridian_deg.to_radians();

        let c = 2.0 * k.n.sqrt() / (1.0 + k.n);
        let t = (phi.sin().atanh() - c * (c * phi.sin()).atanh()).sinh();
        let xi_p = t.atan2(dlam.cos());
        let eta_p = (dlam.sin() / (1.0 + t * t).sqrt()).atanh();

        let mut xi = xi_p;
        let mut eta = eta_p;
        for (j, alpha) in k.alpha.iter().enumerate() {
            let m = 2.0 * (j + 1) as f64;
            xi += alpha * (m * xi_p).sin() * (m * eta_p).cosh();
            eta += alpha * (m * xi_p).cos() * (m * eta_p).sinh();
        }

        (
            self.false_easting + self.scale_factor * k.a_rect * eta,
            self.false_northing + self.scale_factor * k.a_rect * xi,
        )
    }
}

/// Krüger series coefficients for one ellipsoid.
struct Series {
    n: f64,
    a_rect: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
}

impl Series {
    fn grs80() -> Self {
        let f = 1.0 / GRS80_INV_F;
        let n = f / (2.0 - f);
        let n2 = n * n;
        let n3 = n2 * n;
        Self {
            n,
            a_rect: GRS80_A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0),
            alpha: [
                n / 2.0 - 2.0 / 3.0 * n2 + 5.0 / 16.0 * n3,
                13.0 / 48.0 * n2 - 3.0 / 5.0 * n3,
                61.0 / 240.0 * n3,
            ],
            beta: [
                n / 2.0 - 2.0 / 3.0 * n2 + 37.0 / 96.0 * n3,
                n2 / 48.0 + n3 / 15.0,
                17.0 / 480.0 * n3,
            ],
            delta: [
                2.0 * n - 2.0 / 3.0 * n2 - 2.0 * n3,
                7.0 / 3.0 * n2 - 8.0 / 5.0 * n3,
                56.0 / 15.0 * n3,
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// CRS codes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Crs {
    Wgs84,
    Projected(TransverseMercator),
}

fn parse_crs(code: &str) -> Option<Crs> {
    let upper = code.trim().to_ascii_uppercase();
    let number: u32 = upper
        .strip_prefix("EPSG:")
        .or_else(|| upper.strip_prefix("URN:OGC:DEF:CRS:EPSG::"))?
        .parse()
        .ok()?;
    match number {
        4326 | 4258 => Some(Crs::Wgs84),
        3067 => Some(Crs::Projected(TransverseMercator::tm35fin())),
        3873..=3885 => Some(Crs::Projected(TransverseMercator::gauss_kruger(number - 3854))),
        _ => None,
    }
}

/// A resolved source → target coordinate transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    source: Crs,
    target: Crs,
}

impl Transform {
    /// Resolves a transform between two EPSG codes, or fails with
    /// `PipelineError::Config` if either is unsupported.
    pub fn between(source: &str, target: &str) -> Result<Self, PipelineError> {
        let resolve = |code: &str| {
            parse_crs(code)
                .ok_or_else(|| PipelineError::Config(format!("unsupported CRS '{}'", code)))
        };
        Ok(Self {
            source: resolve(source)?,
            target: resolve(target)?,
        })
    }

    pub fn is_identity(&self) -> bool {
        self.source == self.target
    }

    /// Transforms one coordinate, failing on non-finite output.
    pub fn apply(&self, c: Coord<f64>) -> Result<Coord<f64>, PipelineError> {
        if self.is_identity() {
            return Ok(c);
        }
        let (lon, lat) = match self.source {
            Crs::Wgs84 => (c.x, c.y),
            Crs::Projected(tm) => tm.inverse(c.x, c.y),
        };
        let (x, y) = match self.target {
            Crs::Wgs84 => (lon, lat),
            Crs::Projected(tm) => tm.forward(lon, lat),
        };
        if x.is_finite() && y.is_finite() {
            Ok(Coord { x, y })
        } else {
            Err(PipelineError::DataProcessing(format!(
                "coordinate ({}, {}) could not be reprojected",
                c.x, c.y
            )))
        }
    }

    /// Transforms every coordinate of a geometry.
    pub fn apply_geometry<G>(&self, geometry: &G) -> Result<G::Output, PipelineError>
    where
        G: MapCoords<f64, f64>,
    {
        geometry.try_map_coords(|c| self.apply(c))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
