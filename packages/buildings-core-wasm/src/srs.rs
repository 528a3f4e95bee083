use geo::Coord;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::error::BuildError;

pub const WGS84_A: f64 = 6_378_137.0;
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

// Web mercator stops at the latitude where the projected world becomes square
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Spatial reference of feature coordinates.
///
/// Geographic coordinates map to earth-centered world space (ECEF); projected
/// references are already a flat world plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpatialRef {
    /// WGS84 longitude/latitude in degrees
    #[default]
    #[serde(rename = "geographic", alias = "EPSG:4326", alias = "wgs84")]
    Geographic,
    /// Spherical (web) mercator in meters
    #[serde(rename = "mercator", alias = "EPSG:3857", alias = "spherical-mercator")]
    SphericalMercator,
    /// A flat local plane in meters; cannot be reprojected
    #[serde(rename = "cartesian", alias = "local")]
    Cartesian,
}

impl SpatialRef {
    pub fn is_geographic(&self) -> bool {
        matches!(self, SpatialRef::Geographic)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SpatialRef::Geographic => "EPSG:4326",
            SpatialRef::SphericalMercator => "EPSG:3857",
            SpatialRef::Cartesian => "cartesian",
        }
    }

    /// South-west corner of the whole world, if the reference has one.
    pub fn world_min(&self) -> Option<Coord<f64>> {
        match self {
            SpatialRef::Geographic => Some(Coord { x: -180.0, y: -90.0 }),
            SpatialRef::SphericalMercator => {
                let edge = -WGS84_A * std::f64::consts::PI;
                Some(Coord { x: edge, y: edge })
            }
            SpatialRef::Cartesian => None,
        }
    }

    /// Convert a coordinate at height `z` into world space.
    pub fn to_world(&self, coord: Coord<f64>, z: f64) -> Point3<f64> {
        match self {
            SpatialRef::Geographic => geodetic_to_ecef(coord.x, coord.y, z),
            SpatialRef::SphericalMercator | SpatialRef::Cartesian => {
                Point3::new(coord.x, coord.y, z)
            }
        }
    }

    /// Reproject a 2D coordinate into `to`.
    pub fn transform(&self, coord: Coord<f64>, to: &SpatialRef) -> Result<Coord<f64>, BuildError> {
        match (self, to) {
            (a, b) if a == b => Ok(coord),
            (SpatialRef::Geographic, SpatialRef::SphericalMercator) => Ok(lnglat_to_mercator(coord)),
            (SpatialRef::SphericalMercator, SpatialRef::Geographic) => Ok(mercator_to_lnglat(coord)),
            _ => Err(BuildError::UnsupportedSrs(format!(
                "{} -> {}",
                self.name(),
                to.name()
            ))),
        }
    }
}

pub fn geodetic_to_ecef(lon_deg: f64, lat_deg: f64, height: f64) -> Point3<f64> {
    let lon = lon_deg.to_radians();
    let lat = lat_deg.to_radians();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    Point3::new(
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - WGS84_E2) + height) * sin_lat,
    )
}

pub fn lnglat_to_mercator(coord: Coord<f64>) -> Coord<f64> {
    let lat = coord.y.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
    Coord {
        x: WGS84_A * coord.x.to_radians(),
        y: WGS84_A * (FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

pub fn mercator_to_lnglat(coord: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (coord.x / WGS84_A).to_degrees(),
        y: (2.0 * (coord.y / WGS84_A).exp().atan() - FRAC_PI_2).to_degrees(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equator_prime_meridian_sits_on_the_x_axis() {
        let p = geodetic_to_ecef(0.0, 0.0, 0.0);
        assert!((p.x - WGS84_A).abs() < 1e-6);
        assert!(p.y.abs() < 1e-6 && p.z.abs() < 1e-6);

        let pole = geodetic_to_ecef(0.0, 90.0, 0.0);
        let b = WGS84_A * (1.0 - WGS84_F);
        assert!((pole.z - b).abs() < 1e-3);
    }

    #[test]
    fn mercator_round_trip() {
        let c = Coord { x: 13.405, y: 52.52 };
        let m = SpatialRef::Geographic
            .transform(c, &SpatialRef::SphericalMercator)
            .unwrap();
        assert!((m.x - 1_492_232.0).abs() < 10.0);
        let back = SpatialRef::SphericalMercator
            .transform(m, &SpatialRef::Geographic)
            .unwrap();
        assert!((back.x - c.x).abs() < 1e-9);
        assert!((back.y - c.y).abs() < 1e-9);
    }

    #[test]
    fn cartesian_cannot_be_reprojected() {
        let err = SpatialRef::Cartesian
            .transform(Coord { x: 1.0, y: 2.0 }, &SpatialRef::Geographic)
            .unwrap_err();
        assert!(matches!(err, BuildError::UnsupportedSrs(_)));
        assert!(SpatialRef::Cartesian
            .transform(Coord { x: 1.0, y: 2.0 }, &SpatialRef::Cartesian)
            .is_ok());
    }

    #[test]
    fn deserializes_epsg_aliases() {
        let srs: SpatialRef = serde_json::from_str("\"EPSG:3857\"").unwrap();
        assert_eq!(srs, SpatialRef::SphericalMercator);
        let srs: SpatialRef = serde_json::from_str("\"local\"").unwrap();
        assert_eq!(srs, SpatialRef::Cartesian);
    }
}
