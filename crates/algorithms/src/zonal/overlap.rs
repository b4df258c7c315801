//! Overlap of zone geometries with grid cells
//!
//! Clips rings against a cell rectangle (Sutherland-Hodgman) and line
//! segments against it (Cohen-Sutherland) to measure how much of a zone
//! falls inside the cell.

use geo::{Coord, Geometry, LineString, Polygon, Rect};

/// Edge of the clipping rectangle
#[derive(Debug, Clone, Copy)]
enum Edge {
    Left,
    Right,
    Bottom,
    Top,
}

impl Edge {
    fn is_inside(&self, p: &Coord<f64>, rect: &Rect<f64>) -> bool {
        match self {
            Edge::Left => p.x >= rect.min().x,
            Edge::Right => p.x <= rect.max().x,
            Edge::Bottom => p.y >= rect.min().y,
            Edge::Top => p.y <= rect.max().y,
        }
    }

    fn intersect(&self, p: &Coord<f64>, q: &Coord<f64>, rect: &Rect<f64>) -> Coord<f64> {
        let dx = q.x - p.x;
        let dy = q.y - p.y;

        match self {
            Edge::Left => {
                let t = (rect.min().x - p.x) / dx;
                Coord { x: rect.min().x, y: p.y + t * dy }
            }
            Edge::Right => {
                let t = (rect.max().x - p.x) / dx;
                Coord { x: rect.max().x, y: p.y + t * dy }
            }
            Edge::Bottom => {
                let t = (rect.min().y - p.y) / dy;
                Coord { x: p.x + t * dx, y: rect.min().y }
            }
            Edge::Top => {
                let t = (rect.max().y - p.y) / dy;
                Coord { x: p.x + t * dx, y: rect.max().y }
            }
        }
    }
}

/// Clip a ring against one edge (Sutherland-Hodgman step)
fn clip_ring_edge(vertices: &[Coord<f64>], edge: Edge, rect: &Rect<f64>) -> Vec<Coord<f64>> {
    let n = vertices.len();
    let mut output = Vec::with_capacity(n + 4);

    for i in 0..n {
        let current = &vertices[i];
        let next = &vertices[(i + 1) % n];

        match (edge.is_inside(current, rect), edge.is_inside(next, rect)) {
            (true, true) => output.push(*next),
            (true, false) => output.push(edge.intersect(current, next, rect)),
            (false, true) => {
                output.push(edge.intersect(current, next, rect));
                output.push(*next);
            }
            (false, false) => {}
        }
    }

    output
}

/// Unsigned area of the part of `ring` inside `rect`
fn clipped_ring_area(ring: &LineString<f64>, rect: &Rect<f64>) -> f64 {
    let mut vertices: Vec<Coord<f64>> = ring.0.clone();
    if vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }

    for edge in [Edge::Left, Edge::Right, Edge::Bottom, Edge::Top] {
        vertices = clip_ring_edge(&vertices, edge, rect);
        if vertices.len() < 3 {
            return 0.0;
        }
    }

    // Shoelace
    let n = vertices.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (vertices[i], vertices[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice.abs() / 2.0
}

/// Area of `polygon` inside `rect`; holes are subtracted
pub fn polygon_overlap_area(polygon: &Polygon<f64>, rect: &Rect<f64>) -> f64 {
    let outer = clipped_ring_area(polygon.exterior(), rect);
    if outer == 0.0 {
        return 0.0;
    }
    let holes: f64 = polygon.interiors().iter().map(|r| clipped_ring_area(r, rect)).sum();
    (outer - holes).max(0.0)
}

/// Cohen-Sutherland region codes
const INSIDE: u8 = 0b0000;
const LEFT: u8 = 0b0001;
const RIGHT: u8 = 0b0010;
const BOTTOM: u8 = 0b0100;
const TOP: u8 = 0b1000;

fn outcode(p: Coord<f64>, rect: &Rect<f64>) -> u8 {
    let mut code = INSIDE;
    if p.x < rect.min().x { code |= LEFT; }
    if p.x > rect.max().x { code |= RIGHT; }
    if p.y < rect.min().y { code |= BOTTOM; }
    if p.y > rect.max().y { code |= TOP; }
    code
}

fn clip_segment(
    mut p0: Coord<f64>,
    mut p1: Coord<f64>,
    rect: &Rect<f64>,
) -> Option<(Coord<f64>, Coord<f64>)> {
    let mut code0 = outcode(p0, rect);
    let mut code1 = outcode(p1, rect);

    loop {
        if (code0 | code1) == 0 {
            return Some((p0, p1));
        }
        if (code0 & code1) != 0 {
            return None;
        }

        let code_out = if code0 != 0 { code0 } else { code1 };
        let dx = p1.x - p0.x;
        let dy = p1.y - p0.y;

        let new_point = if code_out & TOP != 0 {
            let t = (rect.max().y - p0.y) / dy;
            Coord { x: p0.x + t * dx, y: rect.max().y }
        } else if code_out & BOTTOM != 0 {
            let t = (rect.min().y - p0.y) / dy;
            Coord { x: p0.x + t * dx, y: rect.min().y }
        } else if code_out & RIGHT != 0 {
            let t = (rect.max().x - p0.x) / dx;
            Coord { x: rect.max().x, y: p0.y + t * dy }
        } else {
            let t = (rect.min().x - p0.x) / dx;
            Coord { x: rect.min().x, y: p0.y + t * dy }
        };

        if code_out == code0 {
            p0 = new_point;
            code0 = outcode(p0, rect);
        } else {
            p1 = new_point;
            code1 = outcode(p1, rect);
        }
    }
}

/// Length of `line` inside `rect`
pub fn line_overlap_length(line: &LineString<f64>, rect: &Rect<f64>) -> f64 {
    line.0
        .windows(2)
        .filter_map(|w| clip_segment(w[0], w[1], rect))
        .map(|(a, b)| (b.x - a.x).hypot(b.y - a.y))
        .sum()
}

/// Whether `geometry` shares more than a boundary with `rect`.
///
/// Polygons need positive overlap area and lines positive overlap length,
/// both measured relative to the cell size. Points count when they lie in
/// the closed rectangle.
pub fn overlaps_cell(geometry: &Geometry<f64>, rect: &Rect<f64>) -> bool {
    let (w, h) = (rect.width(), rect.height());
    let area_eps = 1e-12 * w * h;
    let length_eps = 1e-12 * w.hypot(h);
    let in_rect = |c: Coord<f64>| {
        c.x >= rect.min().x && c.x <= rect.max().x && c.y >= rect.min().y && c.y <= rect.max().y
    };

    match geometry {
        Geometry::Point(p) => in_rect(p.0),
        Geometry::MultiPoint(mp) => mp.iter().any(|p| in_rect(p.0)),
        Geometry::Line(l) => line_overlap_length(&LineString::new(vec![l.start, l.end]), rect) > length_eps,
        Geometry::LineString(ls) => line_overlap_length(ls, rect) > length_eps,
        Geometry::MultiLineString(mls) => mls.iter().any(|ls| line_overlap_length(ls, rect) > length_eps),
        Geometry::Polygon(p) => polygon_overlap_area(p, rect) > area_eps,
        Geometry::MultiPolygon(mp) => mp.iter().any(|p| polygon_overlap_area(p, rect) > area_eps),
        Geometry::Rect(r) => polygon_overlap_area(&r.to_polygon(), rect) > area_eps,
        Geometry::Triangle(t) => polygon_overlap_area(&t.to_polygon(), rect) > area_eps,
        Geometry::GeometryCollection(gc) => gc.iter().any(|g| overlaps_cell(g, rect)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{coord, polygon, line_string, Point};

    fn unit_rect() -> Rect<f64> {
        Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 })
    }

    #[test]
    fn polygon_fully_inside() {
        let poly = polygon![(x: 2.0, y: 2.0), (x: 8.0, y: 2.0), (x: 8.0, y: 8.0), (x: 2.0, y: 8.0)];
        assert_relative_eq!(polygon_overlap_area(&poly, &unit_rect()), 36.0, epsilon = 1e-10);
    }

    #[test]
    fn polygon_partial() {
        let poly = polygon![(x: -5.0, y: -5.0), (x: 5.0, y: -5.0), (x: 5.0, y: 5.0), (x: -5.0, y: 5.0)];
        assert_relative_eq!(polygon_overlap_area(&poly, &unit_rect()), 25.0, epsilon = 1e-10);
    }

    #[test]
    fn polygon_hole_is_subtracted() {
        let poly = polygon!(
            exterior: [(x: -1.0, y: -1.0), (x: 11.0, y: -1.0), (x: 11.0, y: 11.0), (x: -1.0, y: 11.0)],
            interiors: [[(x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 5.0, y: 10.0), (x: 0.0, y: 10.0)]],
        );
        assert_relative_eq!(polygon_overlap_area(&poly, &unit_rect()), 50.0, epsilon = 1e-10);
    }

    #[test]
    fn touching_polygon_does_not_overlap() {
        let neighbour = Geometry::Polygon(polygon![
            (x: 10.0, y: 0.0), (x: 20.0, y: 0.0), (x: 20.0, y: 10.0), (x: 10.0, y: 10.0)
        ]);
        assert!(!overlaps_cell(&neighbour, &unit_rect()));
    }

    #[test]
    fn polygon_fully_outside() {
        let poly = polygon![(x: 20.0, y: 20.0), (x: 30.0, y: 20.0), (x: 30.0, y: 30.0), (x: 20.0, y: 30.0)];
        assert_eq!(polygon_overlap_area(&poly, &unit_rect()), 0.0);
    }

    #[test]
    fn line_partial() {
        let line = line_string![(x: -5.0, y: 5.0), (x: 15.0, y: 5.0)];
        assert_relative_eq!(line_overlap_length(&line, &unit_rect()), 10.0, epsilon = 1e-10);
    }

    #[test]
    fn line_outside() {
        let line = Geometry::LineString(line_string![(x: -5.0, y: 20.0), (x: 15.0, y: 20.0)]);
        assert!(!overlaps_cell(&line, &unit_rect()));
    }

    #[test]
    fn point_on_boundary_counts() {
        assert!(overlaps_cell(&Geometry::Point(Point::new(10.0, 5.0)), &unit_rect()));
        assert!(!overlaps_cell(&Geometry::Point(Point::new(15.0, 5.0)), &unit_rect()));
    }
}
