//! Aggregation of membership sets into per-zone statistics

use super::predicate::{MembershipSet, SampleRef};
use geozonal_core::{Error, FeatureId, Field, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Available zone statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Mean,
    Sum,
    Count,
    Min,
    Max,
    /// Population standard deviation (divisor N)
    StdDev,
    Median,
    Range,
}

impl Statistic {
    pub const ALL: [Statistic; 8] = [
        Statistic::Mean,
        Statistic::Sum,
        Statistic::Count,
        Statistic::Min,
        Statistic::Max,
        Statistic::StdDev,
        Statistic::Median,
        Statistic::Range,
    ];

    /// Column / attribute name
    pub fn name(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Sum => "sum",
            Statistic::Count => "count",
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::StdDev => "std_dev",
            Statistic::Median => "median",
            Statistic::Range => "range",
        }
    }

    /// Reduce valid values; `None` when there are none
    pub fn compute(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let value = match self {
            Statistic::Count => n,
            Statistic::Sum => neumaier_sum(values.iter().copied()),
            Statistic::Mean => neumaier_sum(values.iter().copied()) / n,
            Statistic::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Statistic::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Statistic::Range => {
                let (lo, hi) = values
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
                hi - lo
            }
            Statistic::StdDev => {
                let mean = neumaier_sum(values.iter().copied()) / n;
                let var = neumaier_sum(values.iter().map(|v| (v - mean) * (v - mean))) / n;
                var.sqrt()
            }
            Statistic::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
        };
        Some(value)
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Statistic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "stddev" | "std" => return Ok(Statistic::StdDev),
            "avg" => return Ok(Statistic::Mean),
            _ => {}
        }
        Statistic::ALL
            .into_iter()
            .find(|stat| stat.name() == lower)
            .ok_or_else(|| Error::InvalidParameter {
                name: "statistic",
                value: s.to_string(),
                reason: "expected one of mean, sum, count, min, max, std_dev, median, range".into(),
            })
    }
}

/// Neumaier compensated sum, accumulated in iteration order
pub fn neumaier_sum(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut compensation = 0.0;
    for v in values {
        let t = sum + v;
        if sum.abs() >= v.abs() {
            compensation += (sum - t) + v;
        } else {
            compensation += (v - t) + sum;
        }
        sum = t;
    }
    sum + compensation
}

/// One statistic for one zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneStatistic {
    pub zone_id: FeatureId,
    pub statistic: Statistic,
    /// `None` when no valid sample contributed
    pub value: Option<f64>,
    /// Samples that contributed a value
    pub count: usize,
    /// Member samples excluded as nodata
    pub nodata_count: usize,
}

/// Valid values of one membership set, in membership order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneValues {
    pub values: Vec<f64>,
    pub nodata_count: usize,
}

impl ZoneValues {
    /// Gather the values referenced by `set`.
    ///
    /// Point fields read `value_attribute`; a missing, null or non-numeric
    /// attribute counts as nodata.
    pub fn collect(set: &MembershipSet, field: &Field, value_attribute: Option<&str>) -> Result<Self> {
        let mut out = ZoneValues::default();
        for sample in &set.samples {
            let value = match (field, sample) {
                (Field::Grid(raster), SampleRef::Cell { row, col }) => {
                    let v = raster.get(*row, *col)?;
                    (!raster.is_nodata(v)).then_some(v)
                }
                (Field::Points(points), SampleRef::Point(i)) => {
                    let attribute = require_attribute(value_attribute)?;
                    let obs = points.observations().get(*i).ok_or_else(|| {
                        Error::Other(format!("point sample {} outside field of {}", i, points.len()))
                    })?;
                    obs.value(attribute)
                }
                _ => {
                    return Err(Error::Other(format!(
                        "sample {:?} does not address a {} field",
                        sample,
                        field.kind_name()
                    )))
                }
            };
            match value {
                Some(v) => out.values.push(v),
                None => out.nodata_count += 1,
            }
        }
        Ok(out)
    }

    pub fn record(&self, zone_id: &FeatureId, statistic: Statistic) -> ZoneStatistic {
        ZoneStatistic {
            zone_id: zone_id.clone(),
            statistic,
            value: statistic.compute(&self.values),
            count: self.values.len(),
            nodata_count: self.nodata_count,
        }
    }
}

fn require_attribute(value_attribute: Option<&str>) -> Result<&str> {
    value_attribute.ok_or_else(|| Error::InvalidParameter {
        name: "value_attribute",
        value: "none".into(),
        reason: "point fields need the attribute holding sample values".into(),
    })
}

/// Reduce every membership set to one record of `statistic`, in membership order
pub fn reduce(
    memberships: &[MembershipSet],
    field: &Field,
    statistic: Statistic,
    value_attribute: Option<&str>,
) -> Result<Vec<ZoneStatistic>> {
    if matches!(field, Field::Points(_)) {
        require_attribute(value_attribute)?;
    }
    memberships
        .iter()
        .map(|set| {
            ZoneValues::collect(set, field, value_attribute).map(|v| v.record(&set.zone_id, statistic))
        })
        .collect()
}
