//! Zonal statistics over vector zones
//!
//! - **predicate**: which samples belong to which zone
//! - **aggregate**: per-zone reduction of member values
//! - **table**: results joined back onto the zones
//! - **pipeline**: the three steps above as one run

mod aggregate;
mod overlap;
mod pipeline;
mod predicate;
mod table;

pub use aggregate::{neumaier_sum, reduce, Statistic, ZoneStatistic, ZoneValues};
pub use overlap::{line_overlap_length, overlaps_cell, polygon_overlap_area};
pub use pipeline::{zonal_statistics, ZonalParams, ZonalPipeline, ZonalRun, ZonalStatistics};
pub use predicate::{membership, MembershipParams, MembershipSet, Predicate, SampleRef, TieBreak};
pub use table::{ResultTable, ZoneRow, NODATA_COUNT_ATTRIBUTE, SAMPLE_COUNT_ATTRIBUTE};
