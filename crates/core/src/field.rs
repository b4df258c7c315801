//! Field sources: the values aggregated into zones

use crate::crs::CRS;
use crate::raster::Raster;
use crate::vector::PointSet;
use geo_types::{coord, Rect};

/// A continuous grid or a set of discrete observations
#[derive(Debug, Clone)]
pub enum Field {
    Grid(Raster<f64>),
    Points(PointSet),
}

impl Field {
    /// CRS of the field, if declared. Grids may lack one; point sets always carry one.
    pub fn crs(&self) -> Option<&CRS> {
        match self {
            Field::Grid(r) => r.crs(),
            Field::Points(p) => Some(p.crs()),
        }
    }

    /// Number of addressable samples (cells or observations)
    pub fn sample_count(&self) -> usize {
        match self {
            Field::Grid(r) => r.len(),
            Field::Points(p) => p.len(),
        }
    }

    pub fn bounds(&self) -> Option<Rect<f64>> {
        match self {
            Field::Grid(r) => {
                let (min_x, min_y, max_x, max_y) = r.bounds();
                Some(Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y }))
            }
            Field::Points(p) => p.bounds(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Field::Grid(_) => "grid",
            Field::Points(_) => "points",
        }
    }
}

impl From<Raster<f64>> for Field {
    fn from(r: Raster<f64>) -> Self {
        Field::Grid(r)
    }
}

impl From<PointSet> for Field {
    fn from(p: PointSet) -> Self {
        Field::Points(p)
    }
}
