//! Vector data: features, geometry stores and point observations

mod points;
mod validate;

pub use points::{PointObservation, PointSet};
pub use validate::validate_geometry;

use crate::crs::{CrsTransform, CRS};
use crate::error::{Error, Result};
use geo::{BoundingRect, MapCoords};
use geo_types::{Geometry, Rect};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Numeric view of the value; strings are not coerced
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) if v.is_finite() => Some(*v),
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Int(v.into())
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(AttributeValue::Null, Into::into)
    }
}

/// Typed attribute map, ordered by name
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Feature identity.
///
/// Identities are totally ordered: integers compare numerically and sort
/// before strings, strings compare lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
    Int(i64),
    Text(String),
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureId::Int(v) => write!(f, "{}", v),
            FeatureId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FeatureId {
    fn from(v: i64) -> Self {
        FeatureId::Int(v)
    }
}

impl From<i32> for FeatureId {
    fn from(v: i32) -> Self {
        FeatureId::Int(v.into())
    }
}

impl From<&str> for FeatureId {
    fn from(v: &str) -> Self {
        FeatureId::Text(v.to_string())
    }
}

impl From<String> for FeatureId {
    fn from(v: String) -> Self {
        FeatureId::Text(v)
    }
}

/// Dimensional family of a geometry; multi-part forms map onto their base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

impl GeometryKind {
    /// Classify a geometry. Collections have no single kind.
    pub fn of(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Some(GeometryKind::Point),
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Some(GeometryKind::Line)
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => Some(GeometryKind::Polygon),
            Geometry::GeometryCollection(_) => None,
        }
    }
}

/// A zone or other vector feature: identity, valid geometry, attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    id: FeatureId,
    geometry: Geometry<f64>,
    /// Feature attributes
    pub properties: Attributes,
}

impl Feature {
    /// Create a feature, validating its geometry
    pub fn new(id: impl Into<FeatureId>, geometry: Geometry<f64>) -> Result<Self> {
        let id = id.into();
        validate_geometry(&geometry)
            .map_err(|e| Error::format(format!("feature {}: {}", id, e)))?;
        Ok(Self {
            id,
            geometry,
            properties: Attributes::new(),
        })
    }

    /// Builder-style attribute setter
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &FeatureId {
        &self.id
    }

    pub fn geometry(&self) -> &Geometry<f64> {
        &self.geometry
    }

    pub fn kind(&self) -> Option<GeometryKind> {
        GeometryKind::of(&self.geometry)
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// An ordered collection of features sharing one CRS and geometry kind
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryStore {
    crs: CRS,
    kind: Option<GeometryKind>,
    features: Vec<Feature>,
}

impl GeometryStore {
    /// Build a store, checking that geometry kinds agree and identities are unique
    pub fn new(crs: CRS, features: Vec<Feature>) -> Result<Self> {
        let mut kind = None;
        let mut seen = HashSet::with_capacity(features.len());

        for feature in &features {
            let this = feature.kind().ok_or_else(|| {
                Error::format(format!("feature {}: geometry collections are not supported", feature.id))
            })?;
            match kind {
                None => kind = Some(this),
                Some(k) if k != this => {
                    return Err(Error::format(format!(
                        "inconsistent geometry types: {:?} and {:?} (feature {})",
                        k, this, feature.id
                    )));
                }
                Some(_) => {}
            }
            if !seen.insert(&feature.id) {
                return Err(Error::format(format!("duplicate feature id {}", feature.id)));
            }
        }

        Ok(Self { crs, kind, features })
    }

    pub fn crs(&self) -> &CRS {
        &self.crs
    }

    /// Geometry kind shared by all features (`None` when empty)
    pub fn kind(&self) -> Option<GeometryKind> {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn get(&self, id: &FeatureId) -> Option<&Feature> {
        self.features.iter().find(|f| &f.id == id)
    }

    /// Bounding rectangle of all features
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.features
            .iter()
            .filter_map(|f| f.geometry.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                    (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
                )
            })
    }

    /// Transform every geometry into `target`.
    ///
    /// Fails with [`Error::Crs`] when no transformation path exists or a
    /// coordinate falls outside the target projection's domain.
    pub fn reproject(&self, target: &CRS) -> Result<Self> {
        let transform = CrsTransform::new(&self.crs, target)?;
        if transform.is_identity() {
            return Ok(Self {
                crs: target.clone(),
                ..self.clone()
            });
        }

        let features = self
            .features
            .iter()
            .map(|f| {
                let geometry = f.geometry.try_map_coords(|c| transform.transform_coord(c))?;
                Ok(Feature {
                    id: f.id.clone(),
                    geometry,
                    properties: f.properties.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            crs: target.clone(),
            kind: self.kind,
            features,
        })
    }

    /// Subsequence of features matching `predicate`, order and identities preserved
    pub fn filter<P>(&self, predicate: P) -> Self
    where
        P: Fn(&Feature) -> bool,
    {
        let features: Vec<Feature> = self.features.iter().filter(|f| predicate(f)).cloned().collect();
        let kind = if features.is_empty() { None } else { self.kind };
        Self {
            crs: self.crs.clone(),
            kind,
            features,
        }
    }

    pub fn into_features(self) -> Vec<Feature> {
        self.features
    }
}

impl<'a> IntoIterator for &'a GeometryStore {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}
