use geo::Coord;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::extent::GeoExtent;
use crate::srs::SpatialRef;

/// One quadrant of the tiling at one level of detail. Row 0 is the northmost.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileKey {
    pub lod: u32,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(lod: u32, x: u32, y: u32) -> Self {
        Self { lod, x, y }
    }

    pub fn str(&self) -> String {
        format!("{}/{}/{}", self.lod, self.x, self.y)
    }

    /// Style names are the LOD as text.
    pub fn style_name(&self) -> String {
        self.lod.to_string()
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.lod, self.x, self.y)
    }
}

/// Tiling scheme. Both produce extents in geographic coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// Two 180x180 degree tiles at LOD 0
    #[default]
    GlobalGeodetic,
    /// One web mercator tile at LOD 0
    SphericalMercator,
}

impl Profile {
    pub fn tile_count(&self, lod: u32) -> (u32, u32) {
        let n = 1u32 << lod.min(31);
        match self {
            Profile::GlobalGeodetic => (n.saturating_mul(2), n),
            Profile::SphericalMercator => (n, n),
        }
    }

    pub fn tile_extent(&self, key: &TileKey) -> GeoExtent {
        match self {
            Profile::GlobalGeodetic => {
                let (cols, rows) = self.tile_count(key.lod);
                let w = 360.0 / cols as f64;
                let h = 180.0 / rows as f64;
                let xmin = -180.0 + key.x as f64 * w;
                let ymax = 90.0 - key.y as f64 * h;
                GeoExtent::new(SpatialRef::Geographic, xmin, ymax - h, xmin + w, ymax)
            }
            Profile::SphericalMercator => GeoExtent::new(
                SpatialRef::Geographic,
                tile_x_to_lng(key.x, key.lod),
                tile_y_to_lat(key.y + 1, key.lod),
                tile_x_to_lng(key.x + 1, key.lod),
                tile_y_to_lat(key.y, key.lod),
            ),
        }
    }

    /// The tile at `lod` whose extent holds a geographic `point`.
    pub fn tile_key_at(&self, lod: u32, point: Coord<f64>) -> TileKey {
        let (cols, rows) = self.tile_count(lod);
        let fx = (point.x + 180.0) / 360.0;
        let fy = match self {
            Profile::GlobalGeodetic => (90.0 - point.y) / 180.0,
            Profile::SphericalMercator => {
                let lat = point.y.to_radians();
                (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0
            }
        };
        let index = |f: f64, n: u32| ((f * n as f64).floor().max(0.0) as u32).min(n - 1);
        TileKey::new(lod, index(fx, cols), index(fy, rows))
    }

    /// Radius of a sphere around the tile's footprint on the ellipsoid, in meters.
    pub fn bounding_radius(&self, key: &TileKey) -> f64 {
        let extent = self.tile_extent(key);
        let center = SpatialRef::Geographic.to_world(extent.center(), 0.0);

        let xs = [extent.xmin, (extent.xmin + extent.xmax) * 0.5, extent.xmax];
        let ys = [extent.ymin, (extent.ymin + extent.ymax) * 0.5, extent.ymax];

        let mut radius: f64 = 0.0;
        for &x in &xs {
            for &y in &ys {
                let p = SpatialRef::Geographic.to_world(Coord { x, y }, 0.0);
                radius = radius.max((p - center).norm());
            }
        }
        radius
    }
}

// Convert a tile X coordinate to longitude
pub fn tile_x_to_lng(x: u32, z: u32) -> f64 {
    let n = 2.0_f64.powi(z as i32);
    (x as f64 / n) * 360.0 - 180.0
}

// Convert a tile Y coordinate to latitude (web mercator rows, north first)
pub fn tile_y_to_lat(y: u32, z: u32) -> f64 {
    let n = 2.0_f64.powi(z as i32);
    let lat_rad = std::f64::consts::PI * (1.0 - 2.0 * y as f64 / n);
    lat_rad.sinh().atan().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geodetic_root_tiles_split_the_globe() {
        let west = Profile::GlobalGeodetic.tile_extent(&TileKey::new(0, 0, 0));
        let east = Profile::GlobalGeodetic.tile_extent(&TileKey::new(0, 1, 0));
        assert_eq!((west.xmin, west.ymin, west.xmax, west.ymax), (-180.0, -90.0, 0.0, 90.0));
        assert_eq!((east.xmin, east.xmax), (0.0, 180.0));
    }

    #[test]
    fn mercator_tile_extent_matches_slippy_math() {
        let extent = Profile::SphericalMercator.tile_extent(&TileKey::new(1, 1, 0));
        assert!((extent.xmin - 0.0).abs() < 1e-9);
        assert!((extent.xmax - 180.0).abs() < 1e-9);
        assert!(extent.ymin.abs() < 1e-9);
        assert!((extent.ymax - 85.0511287798).abs() < 1e-6);
    }

    #[test]
    fn deeper_tiles_have_smaller_bounds() {
        let coarse = Profile::GlobalGeodetic.bounding_radius(&TileKey::new(10, 1000, 300));
        let fine = Profile::GlobalGeodetic.bounding_radius(&TileKey::new(14, 16000, 4800));
        assert!(coarse > fine);
        assert!(fine > 0.0);
    }

    #[test]
    fn every_world_edge_point_lands_in_one_tile() {
        let profile = Profile::GlobalGeodetic;
        let (cols, rows) = profile.tile_count(1);
        let points = [
            Coord { x: -180.0, y: -90.0 },
            Coord { x: -180.0, y: 0.0 },
            Coord { x: 0.0, y: -90.0 },
            Coord { x: 180.0, y: 90.0 },
            Coord { x: 0.0, y: 0.0 },
        ];
        for point in points {
            let hits = (0..cols)
                .flat_map(|x| (0..rows).map(move |y| TileKey::new(1, x, y)))
                .filter(|key| profile.tile_extent(key).contains(point))
                .count();
            assert_eq!(hits, 1, "{:?}", point);
        }
    }

    #[test]
    fn tile_key_at_round_trips_through_the_extent() {
        let point = Coord { x: 10.0005, y: 44.9995 };
        for profile in [Profile::GlobalGeodetic, Profile::SphericalMercator] {
            let key = profile.tile_key_at(14, point);
            assert!(profile.tile_extent(&key).contains(point), "{:?} {}", profile, key);
        }
        assert_eq!(Profile::GlobalGeodetic.tile_key_at(0, Coord { x: 180.0, y: -90.0 }), TileKey::new(0, 1, 0));
    }

    #[test]
    fn style_name_is_the_lod() {
        let key = TileKey::new(14, 3, 9);
        assert_eq!(key.style_name(), "14");
        assert_eq!(key.str(), "14/3/9");
        assert_eq!(key.to_string(), "14/3/9");
    }
}
