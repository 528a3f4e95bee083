use geo::Coord;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::feature::FeatureId;
use crate::footprint::{inset_ring, Footprint};
use crate::frame::LocalFrame;
use crate::style::{Color, SkinResource};
use crate::console_debug;

/// One vertical edge of a wall face.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    pub lower: Point3<f64>,
    pub upper: Point3<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WallFace {
    pub left: Corner,
    pub right: Corner,
}

impl WallFace {
    pub fn corners_mut(&mut self) -> [&mut Corner; 2] {
        [&mut self.left, &mut self.right]
    }

    pub fn width(&self) -> f64 {
        let d = self.right.lower - self.left.lower;
        d.x.hypot(d.y)
    }
}

/// The faces laid along one ring of a footprint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub faces: Vec<WallFace>,
    /// Faces look into the footprint (parapet inner side)
    #[serde(default)]
    pub inward: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoofType {
    #[default]
    Flat,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Roof {
    pub roof_type: RoofType,
    pub skin: Option<SkinResource>,
    pub color: Color,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElevationKind {
    #[default]
    Standard,
    /// A low wall ring around the roof edge
    Parapet { width: f64 },
}

/// A vertical section of a building.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Elevation {
    pub height: f64,
    pub num_floors: u32,
    pub roof: Option<Roof>,
    pub wall_skin: Option<SkinResource>,
    pub color: Color,
    pub kind: ElevationKind,
    /// Fills the gap between the lowest and highest terrain sample
    #[serde(default)]
    pub basement: bool,
    /// Empty means "same as the parent"
    pub footprint: Footprint,
    /// Local z of the section's base, assigned by `build`
    pub bottom: f64,
    pub walls: Vec<Wall>,
    pub elevations: Vec<Elevation>,
}

impl Default for Elevation {
    fn default() -> Self {
        Self {
            height: 0.0,
            num_floors: 1,
            roof: None,
            wall_skin: None,
            color: Color::WHITE,
            kind: ElevationKind::Standard,
            basement: false,
            footprint: Footprint::default(),
            bottom: 0.0,
            walls: Vec::new(),
            elevations: Vec::new(),
        }
    }
}

impl Elevation {
    pub fn new(footprint: Footprint, height: f64, num_floors: u32) -> Self {
        Self {
            footprint,
            height,
            num_floors: num_floors.max(1),
            ..Default::default()
        }
    }

    pub fn parapet(width: f64, height: f64) -> Self {
        Self {
            height,
            kind: ElevationKind::Parapet { width },
            ..Default::default()
        }
    }

    pub fn top(&self) -> f64 {
        self.bottom + self.height
    }

    /// Height of this section plus its tallest stack of children.
    pub fn total_height(&self) -> f64 {
        self.height
            + self
                .elevations
                .iter()
                .map(Elevation::total_height)
                .fold(0.0, f64::max)
    }

    /// Lay walls along the footprint from `base` upward, then stack the children on top.
    fn build(&mut self, parent: Option<&Footprint>, base: f64) {
        if self.footprint.exterior.is_empty() {
            if let Some(parent) = parent {
                self.footprint = parent.clone();
            }
        }
        self.bottom = base;
        let top = base + self.height;

        self.walls = self
            .footprint
            .rings()
            .map(|ring| Wall {
                faces: ring_faces(ring, base, top),
                inward: false,
            })
            .collect();

        if let ElevationKind::Parapet { width } = self.kind {
            match inset_ring(&self.footprint.exterior, width) {
                Some(mut inner) => {
                    inner.reverse();
                    self.walls.push(Wall {
                        faces: ring_faces(&inner, base, top),
                        inward: true,
                    });
                }
                None => console_debug!("parapet inset of {} collapses, outer walls only", width),
            }
        }

        for child in &mut self.elevations {
            child.build(Some(&self.footprint), top);
        }
    }

    fn visit_mut<F: FnMut(&mut Elevation)>(&mut self, visitor: &mut F) {
        visitor(self);
        for child in &mut self.elevations {
            child.visit_mut(visitor);
        }
    }

    fn visit<F: FnMut(&Elevation)>(&self, visitor: &mut F) {
        visitor(self);
        for child in &self.elevations {
            child.visit(visitor);
        }
    }
}

fn ring_faces(ring: &[Coord<f64>], bottom: f64, top: f64) -> Vec<WallFace> {
    let n = ring.len();
    if n < 2 {
        return Vec::new();
    }
    let corner = |c: Coord<f64>| Corner {
        lower: Point3::new(c.x, c.y, bottom),
        upper: Point3::new(c.x, c.y, top),
    };
    (0..n)
        .map(|i| WallFace {
            left: corner(ring[i]),
            right: corner(ring[(i + 1) % n]),
        })
        .collect()
}

/// A generated building in its own local frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Building {
    /// Id of the source feature
    pub uid: FeatureId,
    /// Stable id derived from the source feature and polygon component
    pub id: Uuid,
    pub frame: LocalFrame,
    pub elevations: Vec<Elevation>,
    /// Sit on the highest terrain sample and fill down to the lowest one
    #[serde(default)]
    pub wants_basement: bool,
}

impl Building {
    pub fn new(uid: FeatureId, component: usize, frame: LocalFrame) -> Self {
        Self {
            uid,
            id: building_id(uid, component),
            frame,
            elevations: Vec::new(),
            wants_basement: false,
        }
    }

    /// Put a basement under the base footprint, spanning `bottom..bottom + height`.
    ///
    /// Nothing is added for a non-positive height or a building with no footprint.
    pub fn add_basement(&mut self, bottom: f64, height: f64) -> bool {
        if height.is_nan() || height <= 0.0 {
            return false;
        }
        let Some(footprint) = self
            .elevations
            .iter()
            .find(|e| !e.basement)
            .map(|e| e.footprint.clone())
        else {
            return false;
        };
        let mut basement = Elevation::new(footprint, height, 1);
        basement.basement = true;
        basement.color = Color::GRAY;
        basement.build(None, bottom);
        self.elevations.insert(0, basement);
        true
    }

    /// Construct the walls of every elevation, starting at local z = 0.
    pub fn build(&mut self) {
        for elevation in &mut self.elevations {
            elevation.build(None, 0.0);
        }
    }

    /// Call `visitor` once for every elevation in the tree, parents before children.
    pub fn visit_elevations_mut<F: FnMut(&mut Elevation)>(&mut self, mut visitor: F) {
        for elevation in &mut self.elevations {
            elevation.visit_mut(&mut visitor);
        }
    }

    pub fn visit_elevations<F: FnMut(&Elevation)>(&self, mut visitor: F) {
        for elevation in &self.elevations {
            elevation.visit(&mut visitor);
        }
    }

    pub fn height(&self) -> f64 {
        self.elevations
            .iter()
            .map(Elevation::total_height)
            .fold(0.0, f64::max)
    }
}

pub fn building_id(uid: FeatureId, component: usize) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("building/{}/{}", uid, component).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srs::SpatialRef;

    fn square(half: f64) -> Footprint {
        Footprint {
            exterior: vec![
                Coord { x: -half, y: -half },
                Coord { x: half, y: -half },
                Coord { x: half, y: half },
                Coord { x: -half, y: half },
            ],
            holes: vec![],
        }
    }

    fn building() -> Building {
        let mut b = Building::new(7, 0, LocalFrame::at(&SpatialRef::Cartesian, Coord { x: 0.0, y: 0.0 }));
        let mut body = Elevation::new(square(5.0), 12.0, 4);
        body.elevations.push(Elevation::parapet(2.0, 2.0));
        b.elevations.push(body);
        b.build();
        b
    }

    #[test]
    fn walls_follow_the_footprint_and_children_stack() {
        let b = building();
        let body = &b.elevations[0];
        assert_eq!(body.walls.len(), 1);
        assert_eq!(body.walls[0].faces.len(), 4);
        let face = body.walls[0].faces[0];
        assert_eq!(face.left.lower.z, 0.0);
        assert_eq!(face.left.upper.z, 12.0);
        assert_eq!(face.width(), 10.0);

        let parapet = &body.elevations[0];
        assert_eq!(parapet.bottom, 12.0);
        assert_eq!(parapet.footprint, body.footprint);
        // outer ring plus the inset inner ring
        assert_eq!(parapet.walls.len(), 2);
        assert!(parapet.walls[1].inward);
        let inner = parapet.walls[1].faces[0];
        assert!((inner.left.lower.x.abs() - 3.0).abs() < 1e-6);
        assert_eq!(inner.left.upper.z, 14.0);
        assert_eq!(b.height(), 14.0);
    }

    #[test]
    fn visitor_sees_each_elevation_once() {
        let mut b = building();
        let mut seen = 0;
        b.visit_elevations_mut(|e| {
            seen += 1;
            e.color = Color::GRAY;
        });
        assert_eq!(seen, 2);

        let mut gray = 0;
        b.visit_elevations(|e| {
            if e.color == Color::GRAY {
                gray += 1;
            }
        });
        assert_eq!(gray, 2);
    }

    #[test]
    fn basement_goes_under_the_base_footprint() {
        let mut b = building();
        assert!(!b.add_basement(0.0, 0.0));
        assert!(b.add_basement(-4.0, 4.0));

        let basement = &b.elevations[0];
        assert!(basement.basement);
        assert_eq!(basement.footprint, b.elevations[1].footprint);
        assert_eq!(basement.bottom, -4.0);
        let face = basement.walls[0].faces[0];
        assert_eq!((face.left.lower.z, face.left.upper.z), (-4.0, 0.0));
    }

    #[test]
    fn ids_are_stable_per_component() {
        assert_eq!(building_id(3, 0), building_id(3, 0));
        assert_ne!(building_id(3, 0), building_id(3, 1));
        assert_ne!(building_id(3, 0), building_id(4, 0));
    }
}
