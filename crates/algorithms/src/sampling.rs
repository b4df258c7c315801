//! Grid sampling at point locations

use geozonal_core::crs::ensure_same;
use geozonal_core::{Error, FeatureId, PointSet, Raster, Result, Sample};
use serde::Serialize;

/// Outcome of sampling a grid at one location
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampledValue {
    Value(f64),
    Nodata,
    /// Location outside the grid extent
    OutOfBounds,
}

impl SampledValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            SampledValue::Value(v) => Some(*v),
            _ => None,
        }
    }
}

/// One observation with the grid value beneath it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointSample {
    pub id: FeatureId,
    pub x: f64,
    pub y: f64,
    pub value: SampledValue,
}

/// Sample `raster` at every observation of `points`, in input order.
///
/// Points outside the grid are reported as [`SampledValue::OutOfBounds`]
/// and logged; they do not abort the run.
pub fn extract_at_points(raster: &Raster<f64>, points: &PointSet) -> Result<Vec<PointSample>> {
    ensure_same(Some(points.crs()), raster.crs())?;

    let mut outside = 0usize;
    let samples = points
        .iter()
        .map(|obs| {
            let c = obs.coord();
            let value = match raster.sample_at(c.x, c.y) {
                Ok(Sample::Value(v)) => SampledValue::Value(v),
                Ok(Sample::Nodata) => SampledValue::Nodata,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("observation {}: {}", obs.id(), e);
                    outside += 1;
                    SampledValue::OutOfBounds
                }
                Err(e) => return Err(e),
            };
            Ok(PointSample {
                id: obs.id().clone(),
                x: c.x,
                y: c.y,
                value,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if outside > 0 {
        tracing::debug!("{} of {} observations outside the grid", outside, points.len());
    }
    Ok(samples)
}

/// Add sampled values to the observations as attribute `name`
pub fn attach_samples(points: &PointSet, samples: &[PointSample], name: &str) -> Result<PointSet> {
    if samples.len() != points.len() {
        return Err(Error::InvalidParameter {
            name: "samples",
            value: samples.len().to_string(),
            reason: format!("expected one sample per observation ({})", points.len()),
        });
    }
    let observations = points
        .iter()
        .zip(samples)
        .map(|(obs, s)| obs.clone().with_attribute(name, s.value.value()))
        .collect();
    PointSet::new(points.crs().clone(), observations)
}
