//! # geozonal parallel
//!
//! Execution strategies for per-zone work.
//!
//! This crate provides:
//! - `ProcessingMode`: sequential, rayon-parallel or fixed-size pool
//! - `CancellationToken`: cooperative cancellation between work units
//!
//! Without the `parallel` feature every mode runs sequentially.

pub mod cancel;
pub mod strategy;

pub use cancel::CancellationToken;
pub use strategy::{num_cpus, ParallelStrategy, ProcessingMode};
