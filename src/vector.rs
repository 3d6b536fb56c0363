//! Point layers stored as GeoJSON feature collections.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{BlockError, Result};

/// Vector formats that point layers can be written to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorFormat {
    #[default]
    #[serde(rename = "GeoJSON")]
    GeoJson,
}

impl VectorFormat {
    pub fn from_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "geojson" | "json" => Ok(Self::GeoJson),
            _ => Err(BlockError::Configuration(format!(
                "vector format '{s}' is not supported; use GeoJSON"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointFeature {
    pub id: Option<Value>,
    pub x: f64,
    pub y: f64,
    pub properties: Map<String, Value>,
}

impl PointFeature {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            id: None,
            x,
            y,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Numeric value of column `name`; `None` if missing or not a number.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.properties.get(name)?.as_f64()
    }

    /// Store a numeric column. Non-finite values are written as `null`.
    pub fn set_number(&mut self, name: &str, value: f64) {
        let v = serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number);
        self.properties.insert(name.to_string(), v);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointLayer {
    pub name: Option<String>,
    /// The collection's `crs` member, carried through untouched.
    pub crs: Option<Value>,
    pub features: Vec<PointFeature>,
}

impl PointLayer {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct RawCollection {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crs: Option<Value>,
    features: Vec<RawFeature>,
}

#[derive(Serialize, Deserialize)]
struct RawFeature {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(default)]
    geometry: Option<Value>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

fn point_coords(idx: usize, geometry: Option<&Value>) -> Result<(f64, f64)> {
    let geom = geometry
        .filter(|g| !g.is_null())
        .ok_or_else(|| BlockError::InputValue(format!("feature {idx} has no geometry")))?;
    let kind = geom.get("type").and_then(Value::as_str).unwrap_or("unknown");
    if kind != "Point" {
        return Err(BlockError::InputValue(format!(
            "feature {idx} has a {kind} geometry; only points can be sampled"
        )));
    }
    let coords = geom
        .get("coordinates")
        .and_then(Value::as_array)
        .filter(|c| c.len() >= 2);
    match coords.map(|c| (c[0].as_f64(), c[1].as_f64())) {
        Some((Some(x), Some(y))) => Ok((x, y)),
        _ => Err(BlockError::InputValue(format!(
            "feature {idx} has malformed point coordinates"
        ))),
    }
}

/// Parse a GeoJSON FeatureCollection of points.
pub fn parse_geojson(text: &str) -> Result<PointLayer> {
    let raw: RawCollection = serde_json::from_str(text)?;
    if raw.type_ != "FeatureCollection" {
        return Err(BlockError::InputValue(format!(
            "expected a FeatureCollection, found '{}'",
            raw.type_
        )));
    }
    let features = raw
        .features
        .into_iter()
        .enumerate()
        .map(|(idx, f)| {
            let (x, y) = point_coords(idx, f.geometry.as_ref())?;
            Ok(PointFeature {
                id: f.id,
                x,
                y,
                properties: f.properties.unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(PointLayer {
        name: raw.name,
        crs: raw.crs,
        features,
    })
}

pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<PointLayer> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| BlockError::io_with(format!("could not read {}", path.display()), e))?;
    let layer = parse_geojson(&text)?;
    debug!(path = %path.display(), features = layer.len(), "read point layer");
    Ok(layer)
}

pub fn to_geojson(layer: &PointLayer, layer_name: Option<&str>) -> Result<String> {
    let raw = RawCollection {
        type_: "FeatureCollection".into(),
        name: layer_name.map(str::to_string).or_else(|| layer.name.clone()),
        crs: layer.crs.clone(),
        features: layer
            .features
            .iter()
            .map(|f| RawFeature {
                type_: "Feature".into(),
                id: f.id.clone(),
                geometry: Some(serde_json::json!({
                    "type": "Point",
                    "coordinates": [f.x, f.y],
                })),
                properties: Some(f.properties.clone()),
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&raw)?)
}

/// Write `layer` to `path`, replacing any existing file.
pub fn write_layer<P: AsRef<Path>>(
    layer: &PointLayer,
    path: P,
    format: VectorFormat,
    layer_name: Option<&str>,
) -> Result<()> {
    let path = path.as_ref();
    let text = match format {
        VectorFormat::GeoJson => to_geojson(layer, layer_name)?,
    };
    fs::write(path, text)
        .map_err(|e| BlockError::io_with(format!("could not write {}", path.display()), e))?;
    debug!(path = %path.display(), features = layer.len(), "wrote point layer");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINTS: &str = r#"{
        "type": "FeatureCollection",
        "name": "plots",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::27700" } },
        "features": [
            { "type": "Feature", "id": 7, "geometry": { "type": "Point", "coordinates": [100.0, 200.0] },
              "properties": { "plot": "a", "xbox": 5, "ybox": 3 } },
            { "type": "Feature", "geometry": { "type": "Point", "coordinates": [110.5, 190.0, 12.0] },
              "properties": null }
        ]
    }"#;

    #[test]
    fn test_parse_points() {
        let layer = parse_geojson(POINTS).unwrap();
        assert_eq!(layer.name.as_deref(), Some("plots"));
        assert_eq!(layer.len(), 2);
        let f = &layer.features[0];
        assert_eq!((f.x, f.y), (100.0, 200.0));
        assert_eq!(f.id, Some(Value::from(7)));
        assert_eq!(f.number("xbox"), Some(5.0));
        assert_eq!(f.number("plot"), None);
        assert!(layer.features[1].properties.is_empty());
    }

    #[test]
    fn test_non_point_geometry() {
        let text = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"LineString","coordinates":[[0,0],[1,1]]},"properties":{}}]}"#;
        assert!(matches!(parse_geojson(text), Err(BlockError::InputValue(_))));
        let text = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":null,"properties":{}}]}"#;
        assert!(matches!(parse_geojson(text), Err(BlockError::InputValue(_))));
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        let mut layer = parse_geojson(POINTS).unwrap();
        layer.features[0].set_number("mean", 2.5);
        layer.features[1].set_number("mean", f64::NAN);
        write_layer(&layer, &path, VectorFormat::GeoJson, Some("sampled")).unwrap();

        let back = read_geojson(&path).unwrap();
        assert_eq!(back.name.as_deref(), Some("sampled"));
        assert_eq!(back.crs, layer.crs);
        assert_eq!(back.features[0].number("mean"), Some(2.5));
        assert_eq!(back.features[0].properties["plot"], Value::from("a"));
        assert_eq!(back.features[1].properties["mean"], Value::Null);
        assert_eq!((back.features[1].x, back.features[1].y), (110.5, 190.0));
    }

    #[test]
    fn test_formats() {
        assert_eq!(VectorFormat::from_name("GeoJSON").unwrap(), VectorFormat::GeoJson);
        assert!(matches!(
            VectorFormat::from_name("GPKG"),
            Err(BlockError::Configuration(_))
        ));
    }
}
