use std::borrow::Borrow;

use anyhow::{anyhow, bail, Context, Result};
use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde_json::{json, Value};

use crate::geom::BBox;
use crate::types::{Feature, FeatureCollection};

/// Read a FeatureCollection from GeoJSON bytes.
pub fn read_from_geojson_bytes(bytes: &[u8]) -> Result<FeatureCollection> {
    let value: Value = serde_json::from_slice(bytes).context("Failed to parse GeoJSON bytes")?;
    parse_feature_collection(&value)
}

/// Parse a FeatureCollection (or a lone Feature) from a GeoJSON value.
pub(crate) fn parse_feature_collection(value: &Value) -> Result<FeatureCollection> {
    match value["type"].as_str() {
        Some("FeatureCollection") => {
            let features = value["features"].as_array()
                .ok_or_else(|| anyhow!("Invalid FeatureCollection: missing features array"))?;
            let features = features.iter()
                .enumerate()
                .map(|(i, f)| parse_feature(f).with_context(|| format!("Invalid feature at index {i}")))
                .collect::<Result<Vec<_>>>()?;
            Ok(FeatureCollection::new(features))
        }
        Some("Feature") => Ok(FeatureCollection::new(vec![parse_feature(value)?])),
        other => bail!("Expected FeatureCollection, got {other:?}"),
    }
}

/// Parse a single GeoJSON Feature.
pub(crate) fn parse_feature(value: &Value) -> Result<Feature> {
    if value["type"].as_str() != Some("Feature") {
        bail!("Expected Feature, got {:?}", value["type"]);
    }

    let id = match &value["id"] {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    let geometry = parse_geometry(&value["geometry"])?;
    let properties = value["properties"].as_object().cloned().unwrap_or_default();
    let bbox = match &value["bbox"] {
        Value::Null => None,
        other => Some(serde_json::from_value::<BBox>(other.clone()).context("Invalid feature bbox")?),
    };

    Ok(Feature { id, geometry, properties, bbox })
}

/// Parse a GeoJSON geometry object; JSON null yields `None`.
pub(crate) fn parse_geometry(value: &Value) -> Result<Option<Geometry<f64>>> {
    if value.is_null() {
        return Ok(None);
    }
    let coords = &value["coordinates"];
    let geometry = match value["type"].as_str() {
        Some("Point") => Geometry::Point(Point(parse_position(coords)?)),
        Some("MultiPoint") => Geometry::MultiPoint(MultiPoint(
            as_array(coords)?.iter().map(|c| parse_position(c).map(Point)).collect::<Result<_>>()?
        )),
        Some("LineString") => Geometry::LineString(LineString(parse_positions(coords)?)),
        Some("MultiLineString") => Geometry::MultiLineString(MultiLineString(
            as_array(coords)?.iter().map(|c| parse_positions(c).map(LineString)).collect::<Result<_>>()?
        )),
        Some("Polygon") => Geometry::Polygon(parse_polygon_coords(coords)?),
        Some("MultiPolygon") => Geometry::MultiPolygon(MultiPolygon(
            as_array(coords)?.iter().map(parse_polygon_coords).collect::<Result<_>>()?
        )),
        other => bail!("Unsupported geometry type: {other:?}"),
    };
    Ok(Some(geometry))
}

fn as_array(value: &Value) -> Result<&Vec<Value>> {
    value.as_array().ok_or_else(|| anyhow!("Invalid coordinates: expected array, got {value}"))
}

/// Parse polygon coordinates: `[exterior, hole, hole, ...]`.
fn parse_polygon_coords(coords: &Value) -> Result<Polygon<f64>> {
    let rings = as_array(coords)?;
    let Some((exterior, interiors)) = rings.split_first() else {
        return Ok(Polygon::new(LineString(vec![]), vec![]));
    };

    let exterior = parse_ring_coords(exterior)
        .context("Invalid Polygon: bad exterior ring")?;
    let interiors = interiors.iter()
        .map(parse_ring_coords)
        .collect::<Result<Vec<_>>>()?;

    Ok(Polygon::new(exterior, interiors))
}

/// Parse a ring (exterior or interior), closing it if needed.
fn parse_ring_coords(coords: &Value) -> Result<LineString<f64>> {
    let mut points = parse_positions(coords)?;

    // Ensure ring is closed (first point == last point)
    if !points.is_empty() && points[0] != points[points.len() - 1] {
        points.push(points[0]);
    }

    Ok(LineString(points))
}

fn parse_positions(coords: &Value) -> Result<Vec<Coord<f64>>> {
    as_array(coords)?.iter().map(parse_position).collect()
}

fn parse_position(coord: &Value) -> Result<Coord<f64>> {
    let pair = as_array(coord)?;
    if pair.len() < 2 {
        bail!("Invalid coordinate: expected at least 2 values, got {}", pair.len());
    }
    let x = pair[0].as_f64().ok_or_else(|| anyhow!("Invalid coordinate: x must be a number"))?;
    let y = pair[1].as_f64().ok_or_else(|| anyhow!("Invalid coordinate: y must be a number"))?;
    Ok(Coord { x, y })
}

fn ring_to_value(ring: &LineString<f64>) -> Value {
    Value::Array(ring.coords().map(|c| json!([c.x, c.y])).collect())
}

fn polygon_to_value(polygon: &Polygon<f64>) -> Value {
    let mut rings = vec![ring_to_value(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_to_value));
    Value::Array(rings)
}

/// Serialize a geometry as a GeoJSON geometry object.
pub(crate) fn geometry_to_value(geometry: &Geometry<f64>) -> Value {
    match geometry {
        Geometry::Point(p) => json!({ "type": "Point", "coordinates": [p.x(), p.y()] }),
        Geometry::MultiPoint(mp) => json!({
            "type": "MultiPoint",
            "coordinates": mp.iter().map(|p| json!([p.x(), p.y()])).collect::<Vec<_>>()
        }),
        Geometry::LineString(ls) => json!({ "type": "LineString", "coordinates": ring_to_value(ls) }),
        Geometry::MultiLineString(mls) => json!({
            "type": "MultiLineString",
            "coordinates": mls.iter().map(ring_to_value).collect::<Vec<_>>()
        }),
        Geometry::Polygon(p) => json!({ "type": "Polygon", "coordinates": polygon_to_value(p) }),
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.iter().map(polygon_to_value).collect::<Vec<_>>()
        }),
        Geometry::Rect(r) => geometry_to_value(&Geometry::Polygon(r.to_polygon())),
        Geometry::Triangle(t) => geometry_to_value(&Geometry::Polygon(t.to_polygon())),
        Geometry::Line(l) => geometry_to_value(&Geometry::LineString(LineString(vec![l.start, l.end]))),
        Geometry::GeometryCollection(gc) => json!({
            "type": "GeometryCollection",
            "geometries": gc.iter().map(geometry_to_value).collect::<Vec<_>>()
        }),
    }
}

/// Serialize a feature as a GeoJSON Feature object.
pub(crate) fn feature_to_value(feature: &Feature) -> Value {
    let mut value = json!({
        "type": "Feature",
        "properties": feature.properties,
        "geometry": feature.geometry.as_ref().map(geometry_to_value),
    });
    if let Some(id) = &feature.id {
        value["id"] = json!(id);
    }
    if let Some(bbox) = &feature.bbox {
        value["bbox"] = json!(<[f64; 4]>::from(*bbox));
    }
    value
}

/// Serialize features as a GeoJSON FeatureCollection.
pub fn features_to_value<F: Borrow<Feature>>(features: &[F]) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": features.iter().map(|f| feature_to_value(f.borrow())).collect::<Vec<_>>(),
    })
}

/// Write features to GeoJSON bytes.
pub fn write_to_geojson_bytes<F: Borrow<Feature>>(features: &[F]) -> Result<Vec<u8>> {
    serde_json::to_vec(&features_to_value(features)).context("Failed to serialize GeoJSON to bytes")
}
