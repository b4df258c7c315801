//! Spatial predicate engine: which field samples belong to which zone
//!
//! Membership is computed in two phases. Each zone first collects its
//! candidate samples independently (in parallel, per `ProcessingMode`).
//! A sequential pass then resolves samples claimed by more than one zone so
//! every sample ends up in at most one membership set.

use super::overlap::overlaps_cell;
use geo::{BoundingRect, Coord, Distance, Euclidean, Geometry, Intersects, Point, Rect};
use geozonal_core::crs::ensure_same;
use geozonal_core::vector::Feature;
use geozonal_core::{Field, FeatureId, GeometryStore, Raster, Result};
use geozonal_core::{Error, PointSet};
use geozonal_parallel::{CancellationToken, ParallelStrategy, ProcessingMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rule deciding whether a sample belongs to a zone
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Cell center (or point) lies in the zone, boundary included
    #[default]
    CenterInside,
    /// Cell rectangle shares area with the zone; same as `CenterInside` for points
    AnyOverlap,
    /// Sample location within this distance of the zone, in CRS units
    WithinDistance(f64),
}

/// Which zone keeps a sample claimed by several zones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Zone with the lowest identity
    #[default]
    LowestId,
    /// Zone appearing first in the store
    FirstInOrder,
}

/// Reference to one sample of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SampleRef {
    Cell { row: usize, col: usize },
    Point(usize),
}

/// Samples assigned to one zone, in row-major or input order
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipSet {
    pub zone_id: FeatureId,
    pub samples: Vec<SampleRef>,
}

impl MembershipSet {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Parameters for membership computation
#[derive(Debug, Clone, Default)]
pub struct MembershipParams {
    pub predicate: Predicate,
    pub tie_break: TieBreak,
    pub mode: ProcessingMode,
    /// Checked before each zone's candidate search
    pub cancel: Option<CancellationToken>,
}

/// Assign field samples to zones.
///
/// Returns one set per zone, in store order. Zones and field must declare
/// the same CRS; otherwise this fails with [`Error::Crs`] before any
/// geometry is examined. A cancelled token stops the candidate search and
/// yields [`Error::Cancelled`].
pub fn membership(
    zones: &GeometryStore,
    field: &Field,
    params: &MembershipParams,
) -> Result<Vec<MembershipSet>> {
    ensure_same(Some(zones.crs()), field.crs())?;

    if let Predicate::WithinDistance(d) = params.predicate {
        if !d.is_finite() || d < 0.0 {
            return Err(Error::InvalidParameter {
                name: "predicate",
                value: d.to_string(),
                reason: "distance must be finite and non-negative".into(),
            });
        }
    }

    let features = zones.features();
    let cancelled = || params.cancel.as_ref().is_some_and(CancellationToken::is_cancelled);
    let searched: Vec<Option<Vec<SampleRef>>> = params.mode.par_map(0..features.len(), |i| {
        if cancelled() {
            return None;
        }
        let zone = &features[i];
        Some(match field {
            Field::Grid(raster) => grid_candidates(zone, raster, params.predicate),
            Field::Points(points) => point_candidates(zone, points, params.predicate),
        })
    });
    let Some(candidates) = searched.into_iter().collect::<Option<Vec<_>>>() else {
        tracing::debug!("membership cancelled");
        return Err(Error::Cancelled {
            completed: 0,
            total: features.len(),
        });
    };

    let sets = resolve_conflicts(features, candidates, params.tie_break);
    tracing::debug!(
        "membership: {} zones, {} samples assigned",
        sets.len(),
        sets.iter().map(MembershipSet::len).sum::<usize>()
    );
    Ok(sets)
}

/// Keep each sample in exactly one zone
fn resolve_conflicts(
    features: &[Feature],
    candidates: Vec<Vec<SampleRef>>,
    tie_break: TieBreak,
) -> Vec<MembershipSet> {
    let mut owner: HashMap<SampleRef, usize> = HashMap::new();

    for (zone, samples) in candidates.iter().enumerate() {
        for &sample in samples {
            owner
                .entry(sample)
                .and_modify(|current| {
                    if tie_break == TieBreak::LowestId && features[zone].id() < features[*current].id() {
                        *current = zone;
                    }
                })
                .or_insert(zone);
        }
    }

    candidates
        .into_iter()
        .enumerate()
        .map(|(zone, samples)| MembershipSet {
            zone_id: features[zone].id().clone(),
            samples: samples
                .into_iter()
                .filter(|s| owner.get(s) == Some(&zone))
                .collect(),
        })
        .collect()
}

/// Search window in pixel space covering `rect`, clamped to the grid
fn cell_window(raster: &Raster<f64>, rect: Rect<f64>) -> Option<(usize, usize, usize, usize)> {
    let (rows, cols) = raster.shape();
    if rows == 0 || cols == 0 {
        return None;
    }
    let t = raster.transform();
    let corners = [
        t.geo_to_pixel(rect.min().x, rect.min().y),
        t.geo_to_pixel(rect.min().x, rect.max().y),
        t.geo_to_pixel(rect.max().x, rect.min().y),
        t.geo_to_pixel(rect.max().x, rect.max().y),
    ];
    if corners.iter().any(|(c, r)| !c.is_finite() || !r.is_finite()) {
        return None;
    }

    let (min_c, max_c, min_r, max_r) = corners.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
        |(a, b, c, d), &(col, row)| (a.min(col), b.max(col), c.min(row), d.max(row)),
    );
    if max_c < 0.0 || max_r < 0.0 || min_c > cols as f64 || min_r > rows as f64 {
        return None;
    }

    // One extra cell on each side covers boundary-touching centers
    let col0 = (min_c.floor() - 1.0).max(0.0) as usize;
    let row0 = (min_r.floor() - 1.0).max(0.0) as usize;
    let col1 = ((max_c.ceil() + 1.0) as usize).min(cols);
    let row1 = ((max_r.ceil() + 1.0) as usize).min(rows);
    Some((row0, row1, col0, col1))
}

fn grid_candidates(zone: &Feature, raster: &Raster<f64>, predicate: Predicate) -> Vec<SampleRef> {
    let geometry = zone.geometry();
    let Some(mut bbox) = geometry.bounding_rect() else {
        return Vec::new();
    };
    if let Predicate::WithinDistance(d) = predicate {
        bbox = expand(bbox, d);
    }
    let Some((row0, row1, col0, col1)) = cell_window(raster, bbox) else {
        return Vec::new();
    };

    let transform = raster.transform();
    let mut samples = Vec::new();
    for row in row0..row1 {
        for col in col0..col1 {
            let hit = match predicate {
                Predicate::CenterInside => {
                    let (x, y) = raster.cell_center(row, col);
                    geometry.intersects(&Point::new(x, y))
                }
                Predicate::AnyOverlap => {
                    let cell = transform.cell_rect(col, row);
                    cell.intersects(&bbox) && overlaps_cell(geometry, &cell)
                }
                Predicate::WithinDistance(d) => {
                    let (x, y) = raster.cell_center(row, col);
                    distance_to(geometry, Coord { x, y }) <= d
                }
            };
            if hit {
                samples.push(SampleRef::Cell { row, col });
            }
        }
    }
    samples
}

fn point_candidates(zone: &Feature, points: &PointSet, predicate: Predicate) -> Vec<SampleRef> {
    let geometry = zone.geometry();
    let Some(mut bbox) = geometry.bounding_rect() else {
        return Vec::new();
    };
    let max_distance = match predicate {
        Predicate::WithinDistance(d) => d,
        Predicate::CenterInside | Predicate::AnyOverlap => 0.0,
    };
    bbox = expand(bbox, max_distance);

    points
        .iter()
        .enumerate()
        .filter(|(_, obs)| {
            let c = obs.coord();
            bbox.intersects(&c)
                && if max_distance > 0.0 {
                    distance_to(geometry, c) <= max_distance
                } else {
                    geometry.intersects(&Point::from(c))
                }
        })
        .map(|(i, _)| SampleRef::Point(i))
        .collect()
}

fn expand(rect: Rect<f64>, d: f64) -> Rect<f64> {
    Rect::new(
        Coord { x: rect.min().x - d, y: rect.min().y - d },
        Coord { x: rect.max().x + d, y: rect.max().y + d },
    )
}

/// Euclidean distance from a location to a geometry; zero inside or on it
pub(crate) fn distance_to(geometry: &Geometry<f64>, c: Coord<f64>) -> f64 {
    Euclidean::distance(&Point::from(c), geometry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{line_string, polygon};
    use geozonal_core::{GeoTransform, PointObservation, CRS};

    fn square(x0: f64, y0: f64, size: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
        ])
    }

    /// 4x4 grid of unit cells covering (0,0)-(4,4), values 0..16 row-major
    fn grid() -> Field {
        let raster = Raster::from_vec((0..16).map(f64::from).collect(), 4, 4)
            .unwrap()
            .with_transform(GeoTransform::new(0.0, 4.0, 1.0, -1.0))
            .with_crs(CRS::utm(30, true));
        Field::Grid(raster)
    }

    fn zones(features: Vec<(i64, Geometry<f64>)>) -> GeometryStore {
        GeometryStore::new(
            CRS::utm(30, true),
            features
                .into_iter()
                .map(|(id, g)| Feature::new(id, g).unwrap())
                .collect(),
        )
        .unwrap()
    }

    fn cells(set: &MembershipSet) -> Vec<(usize, usize)> {
        set.samples
            .iter()
            .map(|s| match s {
                SampleRef::Cell { row, col } => (*row, *col),
                SampleRef::Point(_) => panic!("expected cell"),
            })
            .collect()
    }

    #[test]
    fn center_inside_selects_row_major_cells() {
        let store = zones(vec![(1, square(0.0, 2.0, 2.0))]);
        let sets = membership(&store, &grid(), &MembershipParams::default()).unwrap();
        assert_eq!(cells(&sets[0]), vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn any_overlap_includes_partially_covered_cells() {
        let store = zones(vec![(1, square(0.6, 2.6, 0.8))]);
        let center = membership(&store, &grid(), &MembershipParams::default()).unwrap();
        assert!(center[0].is_empty());

        let params = MembershipParams {
            predicate: Predicate::AnyOverlap,
            ..Default::default()
        };
        let overlap = membership(&store, &grid(), &params).unwrap();
        assert_eq!(cells(&overlap[0]), vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn within_distance_reaches_neighbours() {
        // Tiny zone around the center of cell (1, 1)
        let store = zones(vec![(1, square(1.4, 2.4, 0.2))]);
        let params = MembershipParams {
            predicate: Predicate::WithinDistance(1.0),
            ..Default::default()
        };
        let sets = membership(&store, &grid(), &params).unwrap();
        assert_eq!(
            cells(&sets[0]),
            vec![(0, 1), (1, 0), (1, 1), (1, 2), (2, 1)]
        );
    }

    #[test]
    fn negative_distance_rejected() {
        let store = zones(vec![(1, square(0.0, 0.0, 1.0))]);
        let params = MembershipParams {
            predicate: Predicate::WithinDistance(-1.0),
            ..Default::default()
        };
        assert!(matches!(
            membership(&store, &grid(), &params),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn tie_break_lowest_id_and_first_in_order() {
        // Zone 5 comes first, zone 2 second; both cover the whole grid
        let store = zones(vec![(5, square(0.0, 0.0, 4.0)), (2, square(0.0, 0.0, 4.0))]);

        let lowest = membership(&store, &grid(), &MembershipParams::default()).unwrap();
        assert!(lowest[0].is_empty());
        assert_eq!(lowest[1].len(), 16);

        let params = MembershipParams {
            tie_break: TieBreak::FirstInOrder,
            ..Default::default()
        };
        let first = membership(&store, &grid(), &params).unwrap();
        assert_eq!(first[0].len(), 16);
        assert!(first[1].is_empty());
    }

    #[test]
    fn shared_boundary_cells_go_to_one_zone() {
        // Shared edge x = 1.5 runs through cell centers
        let store = zones(vec![(1, square(0.0, 0.0, 1.5)), (2, square(1.5, 0.0, 1.5))]);
        let sets = membership(&store, &grid(), &MembershipParams::default()).unwrap();
        let all: Vec<_> = sets.iter().flat_map(cells).collect();
        let mut unique = all.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(all.len(), unique.len());
        // Centers on x = 1.5 belong to zone 1 (lowest id)
        assert!(cells(&sets[0]).contains(&(3, 1)));
        assert!(!cells(&sets[1]).contains(&(3, 1)));
    }

    #[test]
    fn modes_agree() {
        let store = zones(vec![
            (1, square(0.0, 0.0, 2.5)),
            (2, square(1.0, 1.0, 3.0)),
            (3, square(2.0, 0.0, 2.0)),
        ]);
        let run = |mode| {
            let params = MembershipParams { mode, ..Default::default() };
            membership(&store, &grid(), &params).unwrap()
        };
        let seq = run(ProcessingMode::Sequential);
        assert_eq!(seq, run(ProcessingMode::Parallel));
        assert_eq!(seq, run(ProcessingMode::ParallelWith(2)));
    }

    #[test]
    fn points_in_zones() {
        let points = PointSet::new(
            CRS::utm(30, true),
            vec![
                PointObservation::new(10, 0.5, 0.5).unwrap(),
                PointObservation::new(11, 3.5, 2.5).unwrap(),
                PointObservation::new(12, 1.0, 0.5).unwrap(),
                PointObservation::new(13, 9.0, 9.0).unwrap(),
            ],
        )
        .unwrap();
        let store = zones(vec![(1, square(0.0, 0.0, 1.0)), (2, square(1.0, 0.0, 3.0))]);
        let sets = membership(&store, &Field::Points(points), &MembershipParams::default()).unwrap();

        // Point 12 sits on the shared edge and goes to zone 1
        assert_eq!(sets[0].samples, vec![SampleRef::Point(0), SampleRef::Point(2)]);
        assert_eq!(sets[1].samples, vec![SampleRef::Point(1)]);
    }

    #[test]
    fn crs_mismatch_fails_first() {
        let store = GeometryStore::new(
            CRS::wgs84(),
            vec![Feature::new(1, square(0.0, 0.0, 1.0)).unwrap()],
        )
        .unwrap();
        let err = membership(&store, &grid(), &MembershipParams::default()).unwrap_err();
        assert!(matches!(err, Error::Crs { .. }));
    }

    #[test]
    fn missing_field_crs_is_an_error() {
        let raster = Raster::from_vec(vec![1.0; 4], 2, 2).unwrap();
        let store = zones(vec![(1, square(0.0, 0.0, 1.0))]);
        let err = membership(&store, &Field::Grid(raster), &MembershipParams::default()).unwrap_err();
        assert!(matches!(err, Error::Crs { .. }));
    }

    #[test]
    fn distance_helper() {
        let sq = square(0.0, 0.0, 2.0);
        assert_eq!(distance_to(&sq, Coord { x: 1.0, y: 1.0 }), 0.0);
        assert_relative_eq!(distance_to(&sq, Coord { x: 5.0, y: 1.0 }), 3.0);
        assert_relative_eq!(distance_to(&sq, Coord { x: 5.0, y: 6.0 }), 5.0);
        let pt = Geometry::Point(Point::new(0.0, 0.0));
        assert_relative_eq!(distance_to(&pt, Coord { x: 3.0, y: 4.0 }), 5.0);
        let line = Geometry::LineString(geo::line_string![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0)]);
        assert_relative_eq!(distance_to(&line, Coord { x: 2.0, y: -1.5 }), 1.5);
        assert_relative_eq!(distance_to(&line, Coord { x: 7.0, y: 4.0 }), 5.0);
    }

    #[test]
    fn cancelled_token_stops_candidate_search() {
        let store = zones(vec![(1, square(0.0, 0.0, 2.0)), (2, square(2.0, 2.0, 2.0))]);
        let token = CancellationToken::new();
        token.cancel();
        let params = MembershipParams {
            cancel: Some(token),
            ..Default::default()
        };
        let err = membership(&store, &grid(), &params).unwrap_err();
        assert!(matches!(err, Error::Cancelled { completed: 0, total: 2 }));
    }
}
