//! Pure-Rust coordinate transforms between a small set of CRSs.
//!
//! Supported: WGS84 geographic (EPSG:4326), Web Mercator (EPSG:3857) and
//! WGS84 / UTM zones (EPSG:326xx north, 327xx south). Transforms between two
//! projected systems go through geographic coordinates. Any other pair of
//! distinct CRSs has no transformation path.
//!
//! UTM formulas follow Snyder (1987), USGS Prof. Paper 1395, pp. 61-64.

use super::CRS;
use crate::error::{Error, Result};
use geo_types::Coord;

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0; // semi-major axis (m)
const F: f64 = 1.0 / 298.257_223_563; // flattening
const E2: f64 = 2.0 * F - F * F; // eccentricity squared
const E_PRIME2: f64 = E2 / (1.0 - E2); // second eccentricity squared
const K0: f64 = 0.9996; // UTM scale factor
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Latitude limit of the Web Mercator square
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Projection {
    Geographic,
    WebMercator,
    Utm { zone: u32, north: bool },
}

impl Projection {
    fn for_crs(crs: &CRS) -> Option<Self> {
        match crs.epsg()? {
            4326 => Some(Projection::Geographic),
            3857 | 900913 => Some(Projection::WebMercator),
            code => parse_utm_epsg(code).map(|(zone, north)| Projection::Utm { zone, north }),
        }
    }

    /// Projected (x, y) → (lon, lat) degrees
    fn to_geographic(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Projection::Geographic => (x, y),
            Projection::WebMercator => {
                let lon = (x / A).to_degrees();
                let lat = (2.0 * (y / A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
                (lon, lat)
            }
            Projection::Utm { zone, north } => utm_to_wgs84(x, y, zone, north),
        }
    }

    /// (lon, lat) degrees → projected (x, y)
    fn from_geographic(self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        if !(-90.0..=90.0).contains(&lat) {
            return None;
        }
        match self {
            Projection::Geographic => Some((lon, lat)),
            Projection::WebMercator => {
                if lat.abs() > MERCATOR_MAX_LAT {
                    return None;
                }
                let x = A * lon.to_radians();
                let y = A * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
                Some((x, y))
            }
            Projection::Utm { zone, north } => {
                if lat.abs() > 84.5 {
                    return None;
                }
                Some(wgs84_to_utm(lon, lat, zone, north))
            }
        }
    }
}

/// A resolved transformation path between two CRSs
#[derive(Debug, Clone)]
pub struct CrsTransform {
    source: CRS,
    target: CRS,
    path: Option<(Projection, Projection)>,
}

impl CrsTransform {
    /// Resolve a transformation from `source` to `target`.
    ///
    /// Equivalent CRSs yield an identity transform. Fails with
    /// [`Error::Crs`] when no transformation path exists.
    pub fn new(source: &CRS, target: &CRS) -> Result<Self> {
        if source.is_equivalent(target) {
            return Ok(Self {
                source: source.clone(),
                target: target.clone(),
                path: None,
            });
        }

        let from = Projection::for_crs(source);
        let to = Projection::for_crs(target);
        match (from, to) {
            (Some(from), Some(to)) => Ok(Self {
                source: source.clone(),
                target: target.clone(),
                path: Some((from, to)),
            }),
            _ => Err(Error::Crs {
                source_crs: source.identifier(),
                target_crs: target.identifier(),
                reason: "no transformation path between these systems".into(),
            }),
        }
    }

    pub fn source(&self) -> &CRS {
        &self.source
    }

    pub fn target(&self) -> &CRS {
        &self.target
    }

    /// Whether this transform leaves coordinates untouched
    pub fn is_identity(&self) -> bool {
        self.path.is_none()
    }

    /// Transform a single (x, y) pair
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let Some((from, to)) = self.path else {
            return Ok((x, y));
        };

        let (lon, lat) = from.to_geographic(x, y);
        let out = to
            .from_geographic(lon, lat)
            .filter(|(tx, ty)| tx.is_finite() && ty.is_finite());

        out.ok_or_else(|| Error::Crs {
            source_crs: self.source.identifier(),
            target_crs: self.target.identifier(),
            reason: format!("coordinate ({}, {}) outside projection domain", x, y),
        })
    }

    /// Transform a geo-types coordinate
    pub fn transform_coord(&self, c: Coord<f64>) -> Result<Coord<f64>> {
        let (x, y) = self.transform(c.x, c.y)?;
        Ok(Coord { x, y })
    }
}

/// Parse an EPSG code into UTM zone info: `Some((zone, is_north))`.
///
/// - EPSG 326xx → zone xx, North hemisphere
/// - EPSG 327xx → zone xx, South hemisphere
pub(crate) fn parse_utm_epsg(epsg: u32) -> Option<(u32, bool)> {
    if (32601..=32660).contains(&epsg) {
        Some((epsg - 32600, true))
    } else if (32701..=32760).contains(&epsg) {
        Some((epsg - 32700, false))
    } else {
        None
    }
}

fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

/// Convert WGS84 (longitude, latitude) in degrees to UTM (easting, northing)
/// in metres for the given zone and hemisphere.
fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let lon0 = central_meridian(zone);

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a_coeff = cos_lat * (lon - lon0);

    let m = meridional_arc(lat);

    let a2 = a_coeff * a_coeff;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    // Snyder eq. 8-9
    let easting = K0 * n
        * (a_coeff
            + (1.0 - t + c) * a2 * a_coeff / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a_coeff / 120.0)
        + FALSE_EASTING;

    // Snyder eq. 8-10
    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    let northing = if north {
        northing
    } else {
        northing + FALSE_NORTHING_SOUTH
    };

    (easting, northing)
}

/// Convert UTM (easting, northing) in metres to WGS84 (longitude, latitude)
/// in degrees. Snyder eqs. 8-12 to 8-25.
fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sqrt_1_e2 = (1.0 - E2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    // Footpoint latitude (eq. 3-26)
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = E_PRIME2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let denom = 1.0 - E2 * sin_phi1 * sin_phi1;
    let n1 = A / denom.sqrt();
    let r1 = A * (1.0 - E2) / denom.powf(1.5);
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d2 * d2;
    let d5 = d4 * d;
    let d6 = d4 * d2;

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * E_PRIME2
                    - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1) * d5
                / 120.0)
            / cos_phi1;

    (lon.to_degrees(), lat.to_degrees())
}

/// Meridional arc from equator to latitude `lat` (radians).
/// Snyder eq. 3-21.
fn meridional_arc(lat: f64) -> f64 {
    let e2 = E2;
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    A * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}
