//! Point observations: discrete samples of a field

use super::{AttributeValue, Attributes, FeatureId};
use crate::crs::{CrsTransform, CRS};
use crate::error::{Error, Result};
use geo_types::{Coord, Rect};
use std::collections::HashSet;

/// A single observation: identity, location and attribute values
#[derive(Debug, Clone, PartialEq)]
pub struct PointObservation {
    id: FeatureId,
    coord: Coord<f64>,
    pub attributes: Attributes,
}

impl PointObservation {
    /// Create an observation; the coordinate must be finite
    pub fn new(id: impl Into<FeatureId>, x: f64, y: f64) -> Result<Self> {
        let id = id.into();
        if !x.is_finite() || !y.is_finite() {
            return Err(Error::format(format!(
                "observation {}: non-finite coordinate ({}, {})",
                id, x, y
            )));
        }
        Ok(Self {
            id,
            coord: Coord { x, y },
            attributes: Attributes::new(),
        })
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &FeatureId {
        &self.id
    }

    pub fn coord(&self) -> Coord<f64> {
        self.coord
    }

    /// Numeric value of `attribute`; missing, null or non-numeric is `None`
    pub fn value(&self, attribute: &str) -> Option<f64> {
        self.attributes.get(attribute).and_then(AttributeValue::as_f64)
    }
}

/// Ordered set of observations in one CRS
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    crs: CRS,
    observations: Vec<PointObservation>,
}

impl PointSet {
    /// Build a set, rejecting duplicate identities
    pub fn new(crs: CRS, observations: Vec<PointObservation>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(observations.len());
        if let Some(dup) = observations.iter().find(|o| !seen.insert(&o.id)) {
            return Err(Error::format(format!("duplicate observation id {}", dup.id)));
        }
        Ok(Self { crs, observations })
    }

    pub fn crs(&self) -> &CRS {
        &self.crs
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PointObservation> {
        self.observations.iter()
    }

    pub fn observations(&self) -> &[PointObservation] {
        &self.observations
    }

    /// Bounding rectangle of all observations
    pub fn bounds(&self) -> Option<Rect<f64>> {
        let first = self.observations.first()?.coord;
        let (min, max) = self.observations.iter().fold((first, first), |(min, max), o| {
            (
                Coord { x: min.x.min(o.coord.x), y: min.y.min(o.coord.y) },
                Coord { x: max.x.max(o.coord.x), y: max.y.max(o.coord.y) },
            )
        });
        Some(Rect::new(min, max))
    }

    /// Transform every location into `target`
    pub fn reproject(&self, target: &CRS) -> Result<Self> {
        let transform = CrsTransform::new(&self.crs, target)?;
        let observations = self
            .observations
            .iter()
            .map(|o| {
                Ok(PointObservation {
                    coord: transform.transform_coord(o.coord)?,
                    ..o.clone()
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            crs: target.clone(),
            observations,
        })
    }

    /// Subsequence of observations matching `predicate`
    pub fn filter<P>(&self, predicate: P) -> Self
    where
        P: Fn(&PointObservation) -> bool,
    {
        Self {
            crs: self.crs.clone(),
            observations: self.observations.iter().filter(|o| predicate(o)).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rejects_non_finite_coordinates() {
        assert!(PointObservation::new(1, f64::INFINITY, 0.0).is_err());
        assert!(PointObservation::new(1, 0.0, f64::NAN).is_err());
    }

    #[test]
    fn value_lookup_is_typed() {
        let obs = PointObservation::new("clinic-1", 0.0, 0.0)
            .unwrap()
            .with_attribute("cases", 12)
            .with_attribute("rate", 0.25)
            .with_attribute("name", "north")
            .with_attribute("missing", AttributeValue::Null);

        assert_eq!(obs.value("cases"), Some(12.0));
        assert_eq!(obs.value("rate"), Some(0.25));
        assert_eq!(obs.value("name"), None);
        assert_eq!(obs.value("missing"), None);
        assert_eq!(obs.value("absent"), None);
    }

    #[test]
    fn reproject_roundtrip() {
        let set = PointSet::new(
            CRS::wgs84(),
            vec![
                PointObservation::new(1, -3.70, 40.41).unwrap(),
                PointObservation::new(2, -3.68, 40.45).unwrap(),
            ],
        )
        .unwrap();

        let back = set
            .reproject(&CRS::utm(30, true))
            .and_then(|s| s.reproject(&CRS::wgs84()))
            .unwrap();

        for (a, b) in set.iter().zip(back.iter()) {
            assert_eq!(a.id(), b.id());
            assert_abs_diff_eq!(a.coord().x, b.coord().x, epsilon = 1e-6);
            assert_abs_diff_eq!(a.coord().y, b.coord().y, epsilon = 1e-6);
        }
    }

    #[test]
    fn rejects_duplicate_ids() {
        let obs = vec![
            PointObservation::new(1, 0.0, 0.0).unwrap(),
            PointObservation::new(1, 1.0, 1.0).unwrap(),
        ];
        assert!(PointSet::new(CRS::wgs84(), obs).is_err());
    }
}
