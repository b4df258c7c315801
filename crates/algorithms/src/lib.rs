//! # geozonal algorithms
//!
//! Spatial joins between vector zones and value fields.
//!
//! ## Modules
//!
//! - **zonal**: membership predicates, aggregation, result tables, pipeline
//! - **sampling**: grid values at point locations

pub mod sampling;
pub mod zonal;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::sampling::{attach_samples, extract_at_points, PointSample, SampledValue};
    pub use crate::zonal::{
        membership, reduce, zonal_statistics, MembershipParams, MembershipSet, Predicate,
        ResultTable, Statistic, TieBreak, ZonalParams, ZonalPipeline, ZonalRun, ZonalStatistics,
        ZoneStatistic,
    };
    pub use geozonal_core::prelude::*;
    pub use geozonal_parallel::{CancellationToken, ProcessingMode};
}
