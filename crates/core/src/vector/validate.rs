//! Geometry validity checks applied at load time

use crate::error::{Error, Result};
use geo::line_intersection::{line_intersection, LineIntersection};
use geo::CoordsIter;
use geo_types::{Coord, Geometry, Line, LineString, Polygon};

/// Check that a geometry is usable as a zone or sample location.
///
/// - every coordinate is finite
/// - line strings have at least two distinct positions
/// - polygon rings have at least three distinct positions and do not
///   self-intersect
///
/// Ring checks are pairwise over segments, which is fine for
/// administrative boundaries but quadratic in ring length.
pub fn validate_geometry(geometry: &Geometry<f64>) -> Result<()> {
    if geometry.coords_iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(Error::format("non-finite coordinate"));
    }

    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) | Geometry::Rect(_) => Ok(()),
        Geometry::Line(l) => {
            if l.start == l.end {
                Err(Error::format("zero-length line"))
            } else {
                Ok(())
            }
        }
        Geometry::LineString(ls) => validate_line_string(ls),
        Geometry::MultiLineString(mls) => mls.0.iter().try_for_each(validate_line_string),
        Geometry::Polygon(p) => validate_polygon(p),
        Geometry::MultiPolygon(mp) => mp.0.iter().try_for_each(validate_polygon),
        Geometry::Triangle(t) => validate_polygon(&t.to_polygon()),
        Geometry::GeometryCollection(gc) => gc.0.iter().try_for_each(validate_geometry),
    }
}

fn validate_line_string(ls: &LineString<f64>) -> Result<()> {
    if dedup(ls).len() < 2 {
        return Err(Error::format("line string needs at least two distinct positions"));
    }
    Ok(())
}

fn validate_polygon(polygon: &Polygon<f64>) -> Result<()> {
    validate_ring(polygon.exterior(), "exterior ring")?;
    for (i, ring) in polygon.interiors().iter().enumerate() {
        validate_ring(ring, &format!("interior ring {}", i))?;
    }
    Ok(())
}

fn validate_ring(ring: &LineString<f64>, what: &str) -> Result<()> {
    if !ring.is_closed() {
        return Err(Error::format(format!("{} is not closed", what)));
    }

    let coords = dedup(ring);
    // Closed ring: first == last, so a triangle has 4 positions
    if coords.len() < 4 {
        return Err(Error::format(format!("{} has fewer than 3 distinct positions", what)));
    }

    let segments: Vec<Line<f64>> = coords.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    let n = segments.len();

    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(segments[i], segments[j]) {
                None => {}
                Some(LineIntersection::Collinear { .. }) => {
                    return Err(Error::format(format!("{} has overlapping segments", what)));
                }
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(LineIntersection::SinglePoint { .. }) => {
                    return Err(Error::format(format!("{} self-intersects", what)));
                }
            }
        }
    }

    Ok(())
}

/// Coordinates with consecutive duplicates removed
fn dedup(ls: &LineString<f64>) -> Vec<Coord<f64>> {
    let mut coords: Vec<Coord<f64>> = ls.0.clone();
    coords.dedup();
    coords
}
