use geo::{BoundingRect, Coord, Geometry, MapCoordsInPlace};
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::srs::SpatialRef;

/// Local tangent-plane reference frame anchored at a footprint's centre.
///
/// Building construction happens in this frame so that all geometry stays small
/// and cartesian; `local_to_world` places the result back on the globe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalFrame {
    local_to_world: Matrix4<f64>,
    world_to_local: Matrix4<f64>,
}

impl LocalFrame {
    /// Frame at `anchor` (in `srs`), elevation zero.
    pub fn at(srs: &SpatialRef, anchor: Coord<f64>) -> Self {
        let origin = srs.to_world(anchor, 0.0);
        let basis = if srs.is_geographic() {
            enu_basis(anchor.x, anchor.y)
        } else {
            Matrix3::identity()
        };
        Self::from_basis(basis, origin)
    }

    /// Frame at the centre of the geometry's bounding box.
    pub fn for_geometry(geometry: &Geometry<f64>, srs: &SpatialRef) -> Option<Self> {
        let rect = geometry.bounding_rect()?;
        Some(Self::at(srs, rect.center()))
    }

    fn from_basis(basis: Matrix3<f64>, origin: Point3<f64>) -> Self {
        let mut local_to_world = basis.to_homogeneous();
        local_to_world
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&origin.coords);

        // Orthonormal basis: the inverse is the transpose plus a back-rotated translation
        let rt = basis.transpose();
        let mut world_to_local = rt.to_homogeneous();
        world_to_local
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&(-(rt * origin.coords)));

        Self {
            local_to_world,
            world_to_local,
        }
    }

    pub fn local_to_world(&self) -> &Matrix4<f64> {
        &self.local_to_world
    }

    pub fn world_to_local(&self) -> &Matrix4<f64> {
        &self.world_to_local
    }

    pub fn to_local(&self, world: &Point3<f64>) -> Point3<f64> {
        self.world_to_local.transform_point(world)
    }

    pub fn to_world(&self, local: &Point3<f64>) -> Point3<f64> {
        self.local_to_world.transform_point(local)
    }

    /// Rewrite every vertex of every ring of `geometry` from `srs` into this frame.
    ///
    /// Local heights are dropped: footprints are planar and the tangent-plane
    /// deviation across a building is sub-millimetre.
    pub fn localize(&self, geometry: &mut Geometry<f64>, srs: &SpatialRef) {
        geometry.map_coords_in_place(|c| {
            let local = self.to_local(&srs.to_world(c, 0.0));
            Coord {
                x: local.x,
                y: local.y,
            }
        });
    }
}

/// East-north-up axes (as columns) on the WGS84 ellipsoid at lon/lat degrees.
fn enu_basis(lon_deg: f64, lat_deg: f64) -> Matrix3<f64> {
    let (sin_lon, cos_lon) = lon_deg.to_radians().sin_cos();
    let (sin_lat, cos_lat) = lat_deg.to_radians().sin_cos();

    let east = Vector3::new(-sin_lon, cos_lon, 0.0);
    let north = Vector3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
    let up = Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);
    Matrix3::from_columns(&[east, north, up])
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use proptest::prelude::*;

    #[test]
    fn geographic_frame_is_east_north_up() {
        let frame = LocalFrame::at(&SpatialRef::Geographic, Coord { x: 10.0, y: 45.0 });

        let north = SpatialRef::Geographic.to_world(Coord { x: 10.0, y: 45.001 }, 0.0);
        let east = SpatialRef::Geographic.to_world(Coord { x: 10.001, y: 45.0 }, 0.0);
        let up = SpatialRef::Geographic.to_world(Coord { x: 10.0, y: 45.0 }, 100.0);

        let n = frame.to_local(&north);
        assert!(n.y > 100.0 && n.x.abs() < 1e-3);
        let e = frame.to_local(&east);
        assert!(e.x > 70.0 && e.y.abs() < 0.01);
        let u = frame.to_local(&up);
        assert!((u.z - 100.0).abs() < 1e-6 && u.x.abs() < 1e-6 && u.y.abs() < 1e-6);
    }

    #[test]
    fn cartesian_square_is_centred() {
        let mut geometry: Geometry<f64> =
            polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)].into();
        let frame = LocalFrame::for_geometry(&geometry, &SpatialRef::Cartesian).unwrap();
        frame.localize(&mut geometry, &SpatialRef::Cartesian);

        let Geometry::Polygon(p) = geometry else {
            panic!("expected polygon");
        };
        assert_eq!(p.exterior().0[0], Coord { x: -5.0, y: -5.0 });
        assert_eq!(p.exterior().0[2], Coord { x: 5.0, y: 5.0 });
    }

    #[test]
    fn inverse_composes_to_identity() {
        let frame = LocalFrame::at(&SpatialRef::Geographic, Coord { x: -122.4, y: 37.8 });
        let product = frame.local_to_world() * frame.world_to_local();
        assert!((product - Matrix4::identity()).amax() < 1e-6);
    }

    proptest! {
        #[test]
        fn world_local_world_round_trip(
            lon in -179.0f64..179.0,
            lat in -85.0f64..85.0,
            dx in -500.0f64..500.0,
            dy in -500.0f64..500.0,
            dz in -50.0f64..300.0,
        ) {
            let frame = LocalFrame::at(&SpatialRef::Geographic, Coord { x: lon, y: lat });
            let local = Point3::new(dx, dy, dz);
            let world = frame.to_world(&local);
            let back = frame.to_local(&world);
            prop_assert!((back - local).norm() < 1e-5);

            let again = frame.to_world(&back);
            prop_assert!((again - world).norm() < 1e-5);
        }
    }
}
