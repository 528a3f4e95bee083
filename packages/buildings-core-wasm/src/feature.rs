use geo::{Coord, Geometry, LineString, MapCoordsInPlace, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde_json::Value;
use std::collections::VecDeque;

use crate::cancellation::CancellationToken;
use crate::error::BuildError;
use crate::extent::GeoExtent;
use crate::srs::SpatialRef;
use crate::tile::TileKey;

pub type FeatureId = u64;
pub type Attributes = serde_json::Map<String, Value>;

/// A vector feature handed out by a feature source.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub fid: FeatureId,
    pub geometry: Option<Geometry<f64>>,
    pub srs: SpatialRef,
    pub attributes: Attributes,
}

impl Feature {
    pub fn new(fid: FeatureId, geometry: impl Into<Geometry<f64>>, srs: SpatialRef) -> Self {
        Self {
            fid,
            geometry: Some(geometry.into()),
            srs,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Numeric view of an attribute; numeric strings count.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.attributes.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Reproject the geometry in place.
    pub fn transform(&mut self, to: &SpatialRef) -> Result<(), BuildError> {
        if self.srs == *to {
            return Ok(());
        }
        let from = self.srs;
        // Fails up front for incompatible pairs, so the geometry is never half-converted
        from.transform(Coord { x: 0.0, y: 0.0 }, to)?;

        if let Some(geometry) = self.geometry.as_mut() {
            geometry.map_coords_in_place(|c| from.transform(c, to).unwrap_or(c));
        }
        self.srs = *to;
        Ok(())
    }

    /// Parse one GeoJSON `Feature` object. `fallback_fid` is used when it carries no id.
    pub fn from_geojson(value: &Value, srs: SpatialRef, fallback_fid: FeatureId) -> Result<Self, BuildError> {
        let fid = value
            .get("id")
            .and_then(parse_fid)
            .or_else(|| value.get("properties").and_then(|p| p.get("id")).and_then(parse_fid))
            .unwrap_or(fallback_fid);

        let geometry = match value.get("geometry") {
            None | Some(Value::Null) => None,
            Some(g) => Some(parse_geometry(g)?),
        };

        let attributes = match value.get("properties") {
            Some(Value::Object(map)) => map.clone(),
            _ => Attributes::new(),
        };

        Ok(Self {
            fid,
            geometry,
            srs,
            attributes,
        })
    }
}

/// Parse a GeoJSON `FeatureCollection`, a bare array of features, or a single feature.
pub fn features_from_geojson(value: &Value, srs: SpatialRef) -> Result<Vec<Feature>, BuildError> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(obj) => match obj.get("features") {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => vec![value],
        },
        _ => return Err(BuildError::GeoJson("expected a feature collection".into())),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| Feature::from_geojson(item, srs, i as FeatureId))
        .collect()
}

fn parse_fid(value: &Value) -> Option<FeatureId> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn parse_position(value: &Value) -> Result<Coord<f64>, BuildError> {
    let pair = value
        .as_array()
        .filter(|a| a.len() >= 2)
        .ok_or_else(|| BuildError::GeoJson("position needs at least two numbers".into()))?;
    match (pair[0].as_f64(), pair[1].as_f64()) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(BuildError::GeoJson("position is not numeric".into())),
    }
}

fn parse_line(value: &Value) -> Result<LineString<f64>, BuildError> {
    let points = value
        .as_array()
        .ok_or_else(|| BuildError::GeoJson("expected an array of positions".into()))?;
    points
        .iter()
        .map(parse_position)
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn parse_polygon(value: &Value) -> Result<Polygon<f64>, BuildError> {
    let rings = value
        .as_array()
        .ok_or_else(|| BuildError::GeoJson("expected an array of rings".into()))?;
    let mut rings = rings.iter().map(parse_line).collect::<Result<Vec<_>, _>>()?;
    if rings.is_empty() {
        return Err(BuildError::GeoJson("polygon has no rings".into()));
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

fn parse_geometry(value: &Value) -> Result<Geometry<f64>, BuildError> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| BuildError::GeoJson("geometry has no type".into()))?;
    let coords = value
        .get("coordinates")
        .ok_or_else(|| BuildError::GeoJson(format!("{} has no coordinates", kind)))?;
    let many = |v: &Value| -> Result<Vec<Value>, BuildError> {
        v.as_array()
            .cloned()
            .ok_or_else(|| BuildError::GeoJson(format!("{} coordinates must be an array", kind)))
    };

    let geometry = match kind {
        "Point" => Geometry::Point(Point::from(parse_position(coords)?)),
        "MultiPoint" => Geometry::MultiPoint(MultiPoint::new(
            many(coords)?
                .iter()
                .map(|p| parse_position(p).map(Point::from))
                .collect::<Result<_, _>>()?,
        )),
        "LineString" => Geometry::LineString(parse_line(coords)?),
        "MultiLineString" => Geometry::MultiLineString(MultiLineString::new(
            many(coords)?.iter().map(parse_line).collect::<Result<_, _>>()?,
        )),
        "Polygon" => Geometry::Polygon(parse_polygon(coords)?),
        "MultiPolygon" => Geometry::MultiPolygon(MultiPolygon::new(
            many(coords)?.iter().map(parse_polygon).collect::<Result<_, _>>()?,
        )),
        other => return Err(BuildError::GeoJson(format!("unsupported geometry type {}", other))),
    };
    Ok(geometry)
}

/// Sequential access to the features of one query.
pub trait FeatureCursor: Send {
    fn has_more(&self) -> bool;
    fn next_feature(&mut self) -> Option<Feature>;
}

/// Drain a cursor, stopping early if the token fires.
pub fn collect_features(cursor: &mut dyn FeatureCursor, progress: &CancellationToken) -> Vec<Feature> {
    let mut features = Vec::new();
    while cursor.has_more() && !progress.is_cancelled() {
        if let Some(feature) = cursor.next_feature() {
            features.push(feature);
        }
    }
    features
}

/// A cursor over features already in memory.
#[derive(Default)]
pub struct VecFeatureCursor {
    features: VecDeque<Feature>,
}

impl VecFeatureCursor {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            features: features.into(),
        }
    }
}

impl FeatureCursor for VecFeatureCursor {
    fn has_more(&self) -> bool {
        !self.features.is_empty()
    }

    fn next_feature(&mut self) -> Option<Feature> {
        self.features.pop_front()
    }
}

/// What a pager asks a feature source for.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub tile_key: Option<TileKey>,
    pub extent: Option<GeoExtent>,
}

impl Query {
    pub fn for_tile(key: TileKey, extent: GeoExtent) -> Self {
        Self {
            tile_key: Some(key),
            extent: Some(extent),
        }
    }
}

pub trait FeatureSource: Send + Sync {
    /// `None` means the source could not serve the query at all.
    fn create_cursor(&self, query: &Query, progress: &CancellationToken) -> Option<Box<dyn FeatureCursor>>;
}

/// Feature source over a fixed set of features, filtered by query extent.
#[derive(Clone, Debug, Default)]
pub struct InMemoryFeatureSource {
    features: Vec<Feature>,
}

impl InMemoryFeatureSource {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn from_geojson(value: &Value, srs: SpatialRef) -> Result<Self, BuildError> {
        Ok(Self::new(features_from_geojson(value, srs)?))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn matches(feature: &Feature, extent: &GeoExtent) -> bool {
        let Some(geometry) = feature.geometry.as_ref() else {
            return false;
        };
        if !extent.is_valid() {
            return true;
        }
        if feature.srs == extent.srs {
            return extent.intersects_geometry(geometry);
        }

        // Bring the query extent into the feature's reference instead
        let lo = extent.srs.transform(Coord { x: extent.xmin, y: extent.ymin }, &feature.srs);
        let hi = extent.srs.transform(Coord { x: extent.xmax, y: extent.ymax }, &feature.srs);
        match (lo, hi) {
            (Ok(lo), Ok(hi)) => {
                GeoExtent::new(feature.srs, lo.x, lo.y, hi.x, hi.y).intersects_geometry(geometry)
            }
            _ => true,
        }
    }
}

impl FeatureSource for InMemoryFeatureSource {
    fn create_cursor(&self, query: &Query, _progress: &CancellationToken) -> Option<Box<dyn FeatureCursor>> {
        let selected: Vec<Feature> = match query.extent.as_ref() {
            Some(extent) => self
                .features
                .iter()
                .filter(|f| Self::matches(f, extent))
                .cloned()
                .collect(),
            None => self.features.clone(),
        };
        Some(Box::new(VecFeatureCursor::new(selected)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collection() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "id": 42,
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]]]
                    },
                    "properties": { "height": "21.5", "name": "hall" }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "LineString", "coordinates": [[50.0, 50.0], [60.0, 60.0]] },
                    "properties": {}
                },
                { "type": "Feature", "geometry": null, "properties": { "id": "7" } }
            ]
        })
    }

    #[test]
    fn parses_feature_collection() {
        let features = features_from_geojson(&collection(), SpatialRef::Cartesian).unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0].fid, 42);
        assert_eq!(features[0].get_f64("height"), Some(21.5));
        assert!(matches!(features[0].geometry, Some(Geometry::Polygon(_))));
        assert_eq!(features[1].fid, 1);
        assert!(matches!(features[1].geometry, Some(Geometry::LineString(_))));
        assert_eq!(features[2].fid, 7);
        assert!(features[2].geometry.is_none());
    }

    #[test]
    fn rejects_unknown_geometry_types() {
        let bad = json!({ "type": "Feature", "geometry": { "type": "Circle", "coordinates": [] } });
        assert!(matches!(
            Feature::from_geojson(&bad, SpatialRef::Geographic, 0),
            Err(BuildError::GeoJson(_))
        ));
    }

    #[test]
    fn in_memory_source_filters_by_extent() {
        let source = InMemoryFeatureSource::from_geojson(&collection(), SpatialRef::Cartesian).unwrap();
        let query = Query {
            tile_key: None,
            extent: Some(GeoExtent::new(SpatialRef::Cartesian, 5.0, 5.0, 20.0, 20.0)),
        };
        let mut cursor = source.create_cursor(&query, &CancellationToken::none()).unwrap();
        let features = collect_features(cursor.as_mut(), &CancellationToken::none());
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].fid, 42);
    }

    #[test]
    fn transform_reprojects_in_place() {
        let mut feature = Feature::new(
            1,
            Point::new(180.0, 0.0),
            SpatialRef::Geographic,
        );
        feature.transform(&SpatialRef::SphericalMercator).unwrap();
        assert_eq!(feature.srs, SpatialRef::SphericalMercator);
        let Some(Geometry::Point(p)) = feature.geometry else {
            panic!("expected point");
        };
        assert!((p.x() - 20_037_508.34).abs() < 0.01);

        let mut flat = Feature::new(2, Point::new(1.0, 1.0), SpatialRef::Cartesian);
        assert!(flat.transform(&SpatialRef::Geographic).is_err());
        assert_eq!(flat.srs, SpatialRef::Cartesian);
    }
}
