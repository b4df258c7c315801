//! # geozonal core
//!
//! Core types and I/O for the geozonal zone-aggregation pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced grid field with nodata handling
//! - `GeometryStore` / `PointSet`: validated vector features and observations
//! - `CRS` and `CrsTransform`: identifiers and pure-Rust reprojection
//! - GeoTIFF and GeoJSON readers/writers with bounded-time loading

pub mod crs;
pub mod error;
pub mod field;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use field::Field;
pub use raster::{GeoTransform, Raster, RasterElement, Sample};
pub use vector::{Feature, FeatureId, GeometryStore, PointObservation, PointSet};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::field::Field;
    pub use crate::raster::{GeoTransform, Raster, RasterElement, Sample};
    pub use crate::vector::{
        AttributeValue, Feature, FeatureId, GeometryKind, GeometryStore, PointObservation,
        PointSet,
    };
    pub use crate::Algorithm;
}

/// Common interface for geozonal algorithms.
///
/// Algorithms are pure functions from input data and parameters to output.
pub trait Algorithm {
    type Input;
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
