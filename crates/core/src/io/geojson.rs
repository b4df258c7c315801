//! GeoJSON reading and writing for geometry stores and point sets.
//!
//! Only `FeatureCollection` documents are accepted. The CRS is taken from
//! the caller, then from the legacy top-level `crs` member, then defaults
//! to EPSG:4326 as RFC 7946 prescribes.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Attributes, Feature, FeatureId, GeometryStore, PointObservation, PointSet};
use geo_types::{
    Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

/// Options for reading vector sources
#[derive(Debug, Clone, Default)]
pub struct VectorReadOptions {
    /// Declared CRS, overrides the document's `crs` member
    pub crs: Option<CRS>,
    /// Property to use as identity when features carry no `id`
    pub id_field: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<RawFeature>,
    crs: Option<RawCrs>,
}

#[derive(Debug, Deserialize)]
struct RawCrs {
    properties: Option<RawCrsProperties>,
}

#[derive(Debug, Deserialize)]
struct RawCrsProperties {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    id: Option<Value>,
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

/// Read a geometry store from a GeoJSON file
pub fn read_geometry_store<P: AsRef<Path>>(path: P, options: &VectorReadOptions) -> Result<GeometryStore> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_geometry_store(&text, options)
}

/// Parse a geometry store from GeoJSON text
pub fn parse_geometry_store(text: &str, options: &VectorReadOptions) -> Result<GeometryStore> {
    let (crs, raw) = parse_collection(text, options)?;
    let features = raw
        .into_iter()
        .enumerate()
        .map(|(index, f)| {
            let (id, geometry, properties) = decode_feature(index, f, options)?;
            let mut feature = Feature::new(id, geometry)?;
            feature.properties = properties;
            Ok(feature)
        })
        .collect::<Result<Vec<_>>>()?;
    GeometryStore::new(crs, features)
}

/// Read point observations from a GeoJSON file of `Point` features
pub fn read_point_set<P: AsRef<Path>>(path: P, options: &VectorReadOptions) -> Result<PointSet> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_point_set(&text, options)
}

/// Parse point observations from GeoJSON text
pub fn parse_point_set(text: &str, options: &VectorReadOptions) -> Result<PointSet> {
    let (crs, raw) = parse_collection(text, options)?;
    let observations = raw
        .into_iter()
        .enumerate()
        .map(|(index, f)| {
            let (id, geometry, attributes) = decode_feature(index, f, options)?;
            let Geometry::Point(p) = geometry else {
                return Err(Error::format(format!(
                    "observation {}: expected Point geometry",
                    id
                )));
            };
            let mut obs = PointObservation::new(id, p.x(), p.y())?;
            obs.attributes = attributes;
            Ok(obs)
        })
        .collect::<Result<Vec<_>>>()?;
    PointSet::new(crs, observations)
}

fn parse_collection(text: &str, options: &VectorReadOptions) -> Result<(CRS, Vec<RawFeature>)> {
    let raw: RawCollection =
        serde_json::from_str(text).map_err(|e| Error::format(format!("invalid GeoJSON: {}", e)))?;
    if raw.kind != "FeatureCollection" {
        return Err(Error::format(format!(
            "expected a FeatureCollection, found '{}'",
            raw.kind
        )));
    }

    let crs = match (&options.crs, raw.crs.and_then(|c| c.properties).and_then(|p| p.name)) {
        (Some(declared), _) => declared.clone(),
        (None, Some(name)) => name.parse()?,
        (None, None) => CRS::wgs84(),
    };

    Ok((crs, raw.features))
}

fn decode_feature(
    index: usize,
    raw: RawFeature,
    options: &VectorReadOptions,
) -> Result<(FeatureId, Geometry<f64>, Attributes)> {
    let properties: Attributes = raw
        .properties
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, attribute_from_json(v)))
        .collect();

    let id = match (&raw.id, &options.id_field) {
        (Some(value), _) => id_from_json(value)?,
        (None, Some(field)) => match properties.get(field) {
            Some(AttributeValue::Int(v)) => FeatureId::Int(*v),
            Some(AttributeValue::String(s)) => FeatureId::Text(s.clone()),
            _ => {
                return Err(Error::format(format!(
                    "feature #{}: id field '{}' missing or not an integer/string",
                    index, field
                )))
            }
        },
        (None, None) => FeatureId::Int(index as i64),
    };

    let geometry = raw
        .geometry
        .ok_or_else(|| Error::format(format!("feature {}: null geometry", id)))
        .and_then(|g| geometry_from_json(&g))
        .map_err(|e| match e {
            Error::Format(msg) if !msg.starts_with("feature") => {
                Error::format(format!("feature {}: {}", id, msg))
            }
            other => other,
        })?;

    Ok((id, geometry, properties))
}

fn id_from_json(value: &Value) -> Result<FeatureId> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(FeatureId::Int)
            .ok_or_else(|| Error::format(format!("feature id {} is not an integer", n))),
        Value::String(s) => Ok(FeatureId::Text(s.clone())),
        other => Err(Error::format(format!("unsupported feature id {}", other))),
    }
}

fn attribute_from_json(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => n.as_f64().map_or(AttributeValue::Null, AttributeValue::Float),
        },
        Value::String(s) => AttributeValue::String(s),
        // Nested structures are kept verbatim as text
        nested => AttributeValue::String(nested.to_string()),
    }
}

fn geometry_from_json(raw: &RawGeometry) -> Result<Geometry<f64>> {
    let c = &raw.coordinates;
    let geometry = match raw.kind.as_str() {
        "Point" => Geometry::Point(Point::from(position(c)?)),
        "MultiPoint" => Geometry::MultiPoint(MultiPoint::new(
            positions(c)?.into_iter().map(Point::from).collect(),
        )),
        "LineString" => Geometry::LineString(LineString::new(positions(c)?)),
        "MultiLineString" => Geometry::MultiLineString(MultiLineString::new(
            array(c)?.iter().map(|l| positions(l).map(LineString::new)).collect::<Result<_>>()?,
        )),
        "Polygon" => Geometry::Polygon(polygon(c)?),
        "MultiPolygon" => Geometry::MultiPolygon(MultiPolygon::new(
            array(c)?.iter().map(polygon).collect::<Result<_>>()?,
        )),
        other => return Err(Error::format(format!("unsupported geometry type '{}'", other))),
    };
    Ok(geometry)
}

fn array(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| Error::format("coordinates must be an array"))
}

fn position(value: &Value) -> Result<Coord<f64>> {
    let arr = array(value)?;
    let num = |i: usize| arr.get(i).and_then(Value::as_f64);
    match (num(0), num(1)) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(Error::format(format!("invalid position {}", value))),
    }
}

fn positions(value: &Value) -> Result<Vec<Coord<f64>>> {
    array(value)?.iter().map(position).collect()
}

fn polygon(value: &Value) -> Result<Polygon<f64>> {
    let mut rings = array(value)?.iter().map(|r| positions(r).map(LineString::new));
    let exterior = rings
        .next()
        .ok_or_else(|| Error::format("polygon without exterior ring"))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    if !exterior.is_closed() || interiors.iter().any(|r| !r.is_closed()) {
        return Err(Error::format("polygon ring is not closed"));
    }
    Ok(Polygon::new(exterior, interiors))
}

/// Serialize a geometry store as a GeoJSON `FeatureCollection`
pub fn geometry_store_to_string(store: &GeometryStore) -> Result<String> {
    let features = store
        .iter()
        .map(|f| feature_json(f.id(), geometry_to_json(f.geometry()), &f.properties))
        .collect();
    collection_to_string(features, store.crs())
}

/// Write a geometry store to a GeoJSON file
pub fn write_geometry_store<P: AsRef<Path>>(store: &GeometryStore, path: P) -> Result<()> {
    fs::write(path.as_ref(), geometry_store_to_string(store)?)?;
    Ok(())
}

/// Serialize point observations as a GeoJSON `FeatureCollection` of points
pub fn point_set_to_string(points: &PointSet) -> Result<String> {
    let features = points
        .iter()
        .map(|o| {
            let c = o.coord();
            let geometry = json!({ "type": "Point", "coordinates": [c.x, c.y] });
            feature_json(o.id(), geometry, &o.attributes)
        })
        .collect();
    collection_to_string(features, points.crs())
}

/// Write point observations to a GeoJSON file
pub fn write_point_set<P: AsRef<Path>>(points: &PointSet, path: P) -> Result<()> {
    fs::write(path.as_ref(), point_set_to_string(points)?)?;
    Ok(())
}

fn feature_json(id: &FeatureId, geometry: Value, properties: &Attributes) -> Value {
    json!({
        "type": "Feature",
        "id": id_to_json(id),
        "geometry": geometry,
        "properties": attributes_to_json(properties),
    })
}

fn collection_to_string(features: Vec<Value>, crs: &CRS) -> Result<String> {
    let mut doc = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    // RFC 7946 drops `crs`; keep it for anything that is not lon/lat
    if crs.epsg() != Some(4326) {
        let name = crs.definition().ok_or_else(|| Error::Crs {
            source_crs: crs.identifier(),
            target_crs: "GeoJSON crs member".into(),
            reason: "CRS has no text form that reads back".into(),
        })?;
        doc["crs"] = json!({
            "type": "name",
            "properties": { "name": name },
        });
    }

    serde_json::to_string_pretty(&doc).map_err(|e| Error::Other(e.to_string()))
}

fn id_to_json(id: &FeatureId) -> Value {
    match id {
        FeatureId::Int(v) => json!(v),
        FeatureId::Text(s) => json!(s),
    }
}

fn attributes_to_json(attrs: &Attributes) -> Value {
    let map: Map<String, Value> = attrs
        .iter()
        .map(|(k, v)| {
            let value = match v {
                AttributeValue::Null => Value::Null,
                AttributeValue::Bool(b) => json!(b),
                AttributeValue::Int(i) => json!(i),
                // Non-finite floats have no JSON form
                AttributeValue::Float(f) if f.is_finite() => json!(f),
                AttributeValue::Float(_) => Value::Null,
                AttributeValue::String(s) => json!(s),
            };
            (k.clone(), value)
        })
        .collect();
    Value::Object(map)
}

fn coords_json(ls: &LineString<f64>) -> Value {
    Value::Array(ls.coords().map(|c| json!([c.x, c.y])).collect())
}

fn polygon_json(p: &Polygon<f64>) -> Value {
    let mut rings = vec![coords_json(p.exterior())];
    rings.extend(p.interiors().iter().map(coords_json));
    Value::Array(rings)
}

fn geometry_to_json(geometry: &Geometry<f64>) -> Value {
    match geometry {
        Geometry::Point(p) => json!({ "type": "Point", "coordinates": [p.x(), p.y()] }),
        Geometry::MultiPoint(mp) => json!({
            "type": "MultiPoint",
            "coordinates": mp.iter().map(|p| json!([p.x(), p.y()])).collect::<Vec<_>>(),
        }),
        Geometry::Line(l) => json!({
            "type": "LineString",
            "coordinates": [[l.start.x, l.start.y], [l.end.x, l.end.y]],
        }),
        Geometry::LineString(ls) => json!({ "type": "LineString", "coordinates": coords_json(ls) }),
        Geometry::MultiLineString(mls) => json!({
            "type": "MultiLineString",
            "coordinates": mls.iter().map(coords_json).collect::<Vec<_>>(),
        }),
        Geometry::Polygon(p) => json!({ "type": "Polygon", "coordinates": polygon_json(p) }),
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.iter().map(polygon_json).collect::<Vec<_>>(),
        }),
        Geometry::Rect(r) => geometry_to_json(&Geometry::Polygon(r.to_polygon())),
        Geometry::Triangle(t) => geometry_to_json(&Geometry::Polygon(t.to_polygon())),
        Geometry::GeometryCollection(gc) => json!({
            "type": "GeometryCollection",
            "geometries": gc.iter().map(geometry_to_json).collect::<Vec<_>>(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::GeometryKind;

    const DISTRICTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": 7,
                "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]},
                "properties": {"name": "north", "population": 1200, "rate": 0.5, "flag": true, "note": null}
            },
            {
                "type": "Feature",
                "id": "d-2",
                "geometry": {"type": "MultiPolygon", "coordinates": [[[[1,0],[2,0],[2,1],[1,1],[1,0]]]]},
                "properties": {"name": "south", "tags": ["a", "b"]}
            }
        ]
    }"#;

    #[test]
    fn parses_features_with_typed_attributes() {
        let store = parse_geometry_store(DISTRICTS, &VectorReadOptions::default()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.crs().epsg(), Some(4326));
        assert_eq!(store.kind(), Some(GeometryKind::Polygon));

        let first = &store.features()[0];
        assert_eq!(first.id(), &FeatureId::Int(7));
        assert_eq!(first.get_property("population"), Some(&AttributeValue::Int(1200)));
        assert_eq!(first.get_property("rate"), Some(&AttributeValue::Float(0.5)));
        assert_eq!(first.get_property("flag"), Some(&AttributeValue::Bool(true)));
        assert_eq!(first.get_property("note"), Some(&AttributeValue::Null));

        let second = &store.features()[1];
        assert_eq!(second.id(), &FeatureId::from("d-2"));
        assert_eq!(
            second.get_property("tags"),
            Some(&AttributeValue::String("[\"a\",\"b\"]".into()))
        );
    }

    #[test]
    fn legacy_crs_member_is_honoured() {
        let doc = r#"{"type":"FeatureCollection",
            "crs":{"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::32630"}},
            "features":[]}"#;
        let store = parse_geometry_store(doc, &VectorReadOptions::default()).unwrap();
        assert_eq!(store.crs().epsg(), Some(32630));

        let declared = VectorReadOptions {
            crs: Some(CRS::from_epsg(3857)),
            ..Default::default()
        };
        let store = parse_geometry_store(doc, &declared).unwrap();
        assert_eq!(store.crs().epsg(), Some(3857));
    }

    #[test]
    fn id_field_and_index_fallbacks() {
        let doc = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"Point","coordinates":[0,0]},"properties":{"code":"A"}},
            {"type":"Feature","geometry":{"type":"Point","coordinates":[1,1]},"properties":{"code":"B"}}
        ]}"#;
        let by_index = parse_point_set(doc, &VectorReadOptions::default()).unwrap();
        let ids: Vec<_> = by_index.iter().map(|o| o.id().clone()).collect();
        assert_eq!(ids, vec![FeatureId::Int(0), FeatureId::Int(1)]);

        let options = VectorReadOptions {
            id_field: Some("code".into()),
            ..Default::default()
        };
        let by_field = parse_point_set(doc, &options).unwrap();
        assert_eq!(by_field.observations()[1].id(), &FeatureId::from("B"));
    }

    #[test]
    fn malformed_inputs_are_format_errors() {
        let cases = [
            "not json",
            r#"{"type":"Feature","geometry":null,"properties":{}}"#,
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":null}]}"#,
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1]]]}}]}"#,
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":{"type":"Circle","coordinates":[0,0]}}]}"#,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":{"type":"Point","coordinates":[0,0]}},
                {"type":"Feature","geometry":{"type":"LineString","coordinates":[[0,0],[1,1]]}}]}"#,
        ];
        for doc in cases {
            let err = parse_geometry_store(doc, &VectorReadOptions::default()).unwrap_err();
            assert!(matches!(err, Error::Format(_)), "{} -> {:?}", doc, err);
        }
    }

    #[test]
    fn points_require_point_geometry() {
        let doc = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"LineString","coordinates":[[0,0],[1,1]]}}]}"#;
        assert!(matches!(
            parse_point_set(doc, &VectorReadOptions::default()),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn write_then_read_preserves_store() {
        let store = parse_geometry_store(DISTRICTS, &VectorReadOptions::default()).unwrap();
        let text = geometry_store_to_string(&store).unwrap();
        let back = parse_geometry_store(&text, &VectorReadOptions::default()).unwrap();
        assert_eq!(back, store);
    }

    #[test]
    fn point_set_roundtrip() {
        let doc = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","id":"s1","geometry":{"type":"Point","coordinates":[1.5,2.5]},"properties":{"pm25":12.5}}
        ]}"#;
        let points = parse_point_set(doc, &VectorReadOptions::default()).unwrap();
        let back = parse_point_set(&point_set_to_string(&points).unwrap(), &VectorReadOptions::default()).unwrap();
        assert_eq!(back, points);
        assert_eq!(back.observations()[0].value("pm25"), Some(12.5));
    }

    #[test]
    fn projected_store_writes_crs_member() {
        let doc = r#"{"type":"FeatureCollection","crs":{"type":"name","properties":{"name":"EPSG:32630"}},"features":[]}"#;
        let store = parse_geometry_store(doc, &VectorReadOptions::default()).unwrap();
        let text = geometry_store_to_string(&store).unwrap();
        assert!(text.contains("EPSG:32630"));
    }

    #[test]
    fn wkt_crs_survives_write_and_read() {
        let wkt = format!("PROJCS[\"Local grid\",GEOGCS[\"WGS 84\"],{}]", "PARAMETER[\"k\",1],".repeat(8));
        let store = GeometryStore::new(
            CRS::from_wkt(wkt.clone()),
            vec![Feature::new(1, Geometry::Point(Point::new(1.0, 2.0))).unwrap()],
        )
        .unwrap();
        let text = geometry_store_to_string(&store).unwrap();
        let back = parse_geometry_store(&text, &VectorReadOptions::default()).unwrap();
        assert_eq!(back.crs().wkt(), Some(wkt.as_str()));
    }

    #[test]
    fn unwritable_crs_is_rejected() {
        let store = GeometryStore::new(
            CRS::from_wkt("LOCAL_CS[\"site\"]"),
            vec![Feature::new(1, Geometry::Point(Point::new(1.0, 2.0))).unwrap()],
        )
        .unwrap();
        assert!(matches!(geometry_store_to_string(&store), Err(Error::Crs { .. })));
    }
}
