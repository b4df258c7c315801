//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::{Array2, ArrayView2};

/// A georeferenced 2D grid field.
///
/// `Raster<T>` stores values of type `T` in row-major order together with
/// the affine transform, the CRS and an optional nodata sentinel.
///
/// # Example
///
/// ```ignore
/// use geozonal_core::{Raster, GeoTransform, CRS};
///
/// let mut field = Raster::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2)?;
/// field.set_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0));
/// field.set_crs(Some(CRS::from_epsg(32630)));
///
/// let sample = field.sample_at(0.5, 1.5)?;
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    data: Array2<T>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<T>,
}

/// Outcome of sampling a grid at an in-bounds location
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample<T> {
    /// A valid measurement
    Value(T),
    /// The cell holds the nodata sentinel
    Nodata,
}

impl<T> Sample<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Sample::Value(v) => Some(v),
            Sample::Nodata => None,
        }
    }

    pub fn is_nodata(&self) -> bool {
        matches!(self, Sample::Nodata)
    }
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from row-major data.
    ///
    /// Fails unless `data.len() == rows * cols`.
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Builder-style transform setter
    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Builder-style CRS setter
    pub fn with_crs(mut self, crs: CRS) -> Self {
        self.crs = Some(crs);
        self
    }

    /// Builder-style nodata setter
    pub fn with_nodata(mut self, nodata: T) -> Self {
        self.nodata = Some(nodata);
        self
    }

    // Dimensions

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        let (rows, cols) = self.shape();
        match self.data.get_mut((row, col)) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Error::IndexOutOfBounds { row, col, rows, cols }),
        }
    }

    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    // Metadata

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Map bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    // Coordinate conversion

    /// Map coordinates of the center of cell (row, col)
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Locate the cell containing a map coordinate.
    ///
    /// Cells are half-open towards increasing pixel index, except that the
    /// outer edge of the grid belongs to the last row/column so the extent
    /// is closed. Returns `None` outside the extent or for non-finite input.
    pub fn locate(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if !x.is_finite() || !y.is_finite() || self.is_empty() {
            return None;
        }
        let (col_f, row_f) = self.transform.geo_to_pixel(x, y);
        let (rows, cols) = self.shape();
        if !(0.0..=cols as f64).contains(&col_f) || !(0.0..=rows as f64).contains(&row_f) {
            return None;
        }
        let col = (col_f.floor() as usize).min(cols - 1);
        let row = (row_f.floor() as usize).min(rows - 1);
        Some((row, col))
    }

    /// Sample the field at a map coordinate.
    ///
    /// Distinguishes a nodata cell ([`Sample::Nodata`]) from a location
    /// outside the extent ([`Error::OutOfBounds`]).
    pub fn sample_at(&self, x: f64, y: f64) -> Result<Sample<T>> {
        let (row, col) = self.locate(x, y).ok_or(Error::OutOfBounds { x, y })?;
        let value = self.get(row, col)?;
        if self.is_nodata(value) {
            Ok(Sample::Nodata)
        } else {
            Ok(Sample::Value(value))
        }
    }

    // Value checks

    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Convert to an `f64` field, mapping nodata cells to NaN
    pub fn to_f64(&self) -> Raster<f64> {
        let data = self.data.mapv(|v| {
            if self.is_nodata(v) {
                f64::NAN
            } else {
                v.to_f64().unwrap_or(f64::NAN)
            }
        });
        Raster {
            data,
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: self.nodata.and_then(|nd| nd.to_f64()),
        }
    }

    // Statistics

    /// Whole-grid summary (min, max, mean, valid and nodata counts)
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum = 0.0;
        let mut count = 0usize;

        for &value in self.data.iter().filter(|v| !self.is_nodata(**v)) {
            if min.map_or(true, |m| value < m) {
                min = Some(value);
            }
            if max.map_or(true, |m| value > m) {
                max = Some(value);
            }
            if let Some(v) = value.to_f64() {
                sum += v;
                count += 1;
            }
        }

        RasterStatistics {
            min,
            max,
            mean: (count > 0).then(|| sum / count as f64),
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_two() -> Raster<f64> {
        Raster::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2)
            .unwrap()
            .with_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0))
            .with_crs(CRS::from_epsg(32630))
    }

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f32> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
    }

    #[test]
    fn test_from_vec_dimension_mismatch() {
        let err = Raster::from_vec(vec![1.0_f64; 5], 2, 3).unwrap_err();
        assert!(matches!(err, Error::InvalidDimensions { width: 3, height: 2 }));
    }

    #[test]
    fn test_raster_access() {
        let mut raster: Raster<f32> = Raster::new(10, 10);
        raster.set(5, 5, 42.0).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 42.0);
        assert!(raster.set(10, 0, 1.0).is_err());
    }

    #[test]
    fn test_sample_at_values() {
        let field = two_by_two();
        assert_eq!(field.sample_at(0.5, 1.5).unwrap(), Sample::Value(1.0));
        assert_eq!(field.sample_at(1.5, 1.5).unwrap(), Sample::Value(2.0));
        assert_eq!(field.sample_at(0.5, 0.5).unwrap(), Sample::Value(3.0));
        assert_eq!(field.sample_at(1.5, 0.5).unwrap(), Sample::Value(4.0));
    }

    #[test]
    fn test_sample_at_outer_edge_is_inside() {
        let field = two_by_two();
        assert_eq!(field.sample_at(2.0, 0.0).unwrap(), Sample::Value(4.0));
        assert_eq!(field.sample_at(0.0, 2.0).unwrap(), Sample::Value(1.0));
    }

    #[test]
    fn test_sample_at_out_of_bounds_is_distinct_from_nodata() {
        let mut field = two_by_two().with_nodata(-9999.0);
        field.set(0, 0, -9999.0).unwrap();

        assert_eq!(field.sample_at(0.5, 1.5).unwrap(), Sample::Nodata);
        let err = field.sample_at(5.0, 5.0).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds { .. }));
        assert!(err.is_recoverable());
        assert!(field.sample_at(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_to_f64_maps_nodata_to_nan() {
        let raster = Raster::from_vec(vec![1_i32, -1, 3, 4], 2, 2)
            .unwrap()
            .with_nodata(-1);
        let field = raster.to_f64();
        assert!(field.get(0, 1).unwrap().is_nan());
        assert_eq!(field.get(1, 1).unwrap(), 4.0);
    }

    #[test]
    fn test_raster_statistics() {
        let mut raster: Raster<f32> = Raster::new(10, 10);
        for i in 0..10 {
            for j in 0..10 {
                raster.set(i, j, (i * 10 + j) as f32).unwrap();
            }
        }
        raster.set(0, 0, f32::NAN).unwrap();

        let stats = raster.statistics();
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(99.0));
        assert_eq!(stats.valid_count, 99);
        assert_eq!(stats.nodata_count, 1);
    }
}
