use geo::{BoundingRect, Coord, Geometry, LineString};
use serde::{Deserialize, Serialize};

use crate::srs::SpatialRef;

/// Axis-aligned extent in a spatial reference.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoExtent {
    pub srs: SpatialRef,
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl GeoExtent {
    pub fn new(srs: SpatialRef, xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self { srs, xmin, ymin, xmax, ymax }
    }

    /// An extent that fails `is_valid`; cropping against it always passes.
    pub fn invalid() -> Self {
        Self::new(SpatialRef::default(), f64::NAN, f64::NAN, f64::NAN, f64::NAN)
    }

    pub fn is_valid(&self) -> bool {
        [self.xmin, self.ymin, self.xmax, self.ymax]
            .iter()
            .all(|v| v.is_finite())
            && self.xmax >= self.xmin
            && self.ymax >= self.ymin
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn center(&self) -> Coord<f64> {
        Coord {
            x: (self.xmin + self.xmax) * 0.5,
            y: (self.ymin + self.ymax) * 0.5,
        }
    }

    /// Half-open containment: `(min, max]` on both axes.
    ///
    /// Adjacent extents share an edge; a point on it belongs to the lower/left
    /// extent only, so every point lands in exactly one of a tiling. The west
    /// and south edges of the world itself have no neighbour and are closed.
    pub fn contains(&self, point: Coord<f64>) -> bool {
        let world = self.srs.world_min();
        let west_closed = world.is_some_and(|w| self.xmin <= w.x);
        let south_closed = world.is_some_and(|w| self.ymin <= w.y);

        let in_x = (point.x > self.xmin || (west_closed && point.x == self.xmin)) && point.x <= self.xmax;
        let in_y = (point.y > self.ymin || (south_closed && point.y == self.ymin)) && point.y <= self.ymax;
        in_x && in_y
    }

    /// Closed containment, used for intersection tests.
    pub fn contains_closed(&self, point: Coord<f64>) -> bool {
        point.x >= self.xmin && point.x <= self.xmax && point.y >= self.ymin && point.y <= self.ymax
    }

    pub fn intersects_geometry(&self, geometry: &Geometry<f64>) -> bool {
        let Some(rect) = geometry.bounding_rect() else {
            return false;
        };
        // Quick rejection on the bounding boxes first
        if rect.max().x < self.xmin
            || rect.min().x > self.xmax
            || rect.max().y < self.ymin
            || rect.min().y > self.ymax
        {
            return false;
        }

        match geometry {
            Geometry::Polygon(p) => self.intersects_ring(p.exterior()),
            Geometry::MultiPolygon(mp) => mp.0.iter().any(|p| self.intersects_ring(p.exterior())),
            // Overlapping bounds is close enough for non-area geometries
            _ => true,
        }
    }

    fn intersects_ring(&self, ring: &LineString<f64>) -> bool {
        let points = &ring.0;
        if points.iter().any(|p| self.contains_closed(*p)) {
            return true;
        }

        let corners = [
            Coord { x: self.xmin, y: self.ymin },
            Coord { x: self.xmax, y: self.ymin },
            Coord { x: self.xmax, y: self.ymax },
            Coord { x: self.xmin, y: self.ymax },
        ];

        let n = points.len();
        for i in 0..n {
            let p1 = points[i];
            let p2 = points[(i + 1) % n];
            for k in 0..4 {
                if segments_intersect(p1, p2, corners[k], corners[(k + 1) % 4]) {
                    return true;
                }
            }
        }

        // The extent may sit entirely inside the ring
        corners.iter().any(|c| point_in_ring(*c, points))
    }
}

fn direction(p1: Coord<f64>, p2: Coord<f64>, p3: Coord<f64>) -> f64 {
    (p3.x - p1.x) * (p2.y - p1.y) - (p2.x - p1.x) * (p3.y - p1.y)
}

fn on_segment(p1: Coord<f64>, p2: Coord<f64>, p: Coord<f64>) -> bool {
    p.x >= p1.x.min(p2.x) && p.x <= p1.x.max(p2.x) && p.y >= p1.y.min(p2.y) && p.y <= p1.y.max(p2.y)
}

fn segments_intersect(p1: Coord<f64>, p2: Coord<f64>, p3: Coord<f64>, p4: Coord<f64>) -> bool {
    let d1 = direction(p3, p4, p1);
    let d2 = direction(p3, p4, p2);
    let d3 = direction(p1, p2, p3);
    let d4 = direction(p1, p2, p4);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(p3, p4, p1))
        || (d2 == 0.0 && on_segment(p3, p4, p2))
        || (d3 == 0.0 && on_segment(p1, p2, p3))
        || (d4 == 0.0 && on_segment(p1, p2, p4))
}

// Ray casting
fn point_in_ring(point: Coord<f64>, ring: &[Coord<f64>]) -> bool {
    let mut inside = false;
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        if ((a.y > point.y) != (b.y > point.y))
            && (point.x < (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x)
        {
            inside = !inside;
        }
    }
    inside
}
