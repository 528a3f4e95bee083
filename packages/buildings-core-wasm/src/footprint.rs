use cavalier_contours::polyline::{PlineCreation, PlineSource, PlineSourceMut, Polyline};
use geo::{Coord, Geometry, LineString, Polygon};
use serde::{Deserialize, Serialize};

/// Default tolerance for treating two footprint vertices as the same point.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// A building footprint: open rings, exterior counter-clockwise, holes clockwise.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub exterior: Vec<Coord<f64>>,
    pub holes: Vec<Vec<Coord<f64>>>,
}

impl Footprint {
    /// Copy the rings of `polygon` as they are (still closed, any winding).
    pub fn from_polygon(polygon: &Polygon<f64>) -> Self {
        Self {
            exterior: polygon.exterior().0.clone(),
            holes: polygon.interiors().iter().map(|r| r.0.clone()).collect(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.exterior.len() >= 3
    }

    pub fn area(&self) -> f64 {
        let holes: f64 = self.holes.iter().map(|h| signed_area(h).abs()).sum();
        (signed_area(&self.exterior).abs() - holes).max(0.0)
    }

    /// Open, deduplicate and rewind every ring in place.
    ///
    /// A ring left with fewer than 3 points is not an error here; the exterior
    /// shows up through `is_valid`, and degenerate holes are dropped.
    pub fn clean(&mut self, tolerance: f64) {
        clean_ring(&mut self.exterior, tolerance, true);
        for hole in &mut self.holes {
            clean_ring(hole, tolerance, false);
        }
        self.holes.retain(|h| h.len() >= 3);
    }

    /// All rings, exterior first.
    pub fn rings(&self) -> impl Iterator<Item = &Vec<Coord<f64>>> {
        std::iter::once(&self.exterior).chain(self.holes.iter())
    }
}

fn clean_ring(ring: &mut Vec<Coord<f64>>, tolerance: f64, ccw: bool) {
    open_ring(ring, tolerance);
    remove_duplicates(ring, tolerance);
    if ring.len() >= 3 {
        rewind(ring, ccw);
    }
}

fn same_point(a: Coord<f64>, b: Coord<f64>, tolerance: f64) -> bool {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy <= tolerance * tolerance
}

/// Drop trailing points that repeat the first one.
pub fn open_ring(ring: &mut Vec<Coord<f64>>, tolerance: f64) {
    while ring.len() > 1 && same_point(ring[0], ring[ring.len() - 1], tolerance) {
        ring.pop();
    }
}

/// Remove consecutive duplicates, including the wrap from last to first.
pub fn remove_duplicates(ring: &mut Vec<Coord<f64>>, tolerance: f64) {
    ring.dedup_by(|b, a| same_point(*a, *b, tolerance));
    open_ring(ring, tolerance);
}

/// Shoelace area; positive for counter-clockwise rings.
pub fn signed_area(ring: &[Coord<f64>]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        sum += ring[i].x * ring[j].y - ring[j].x * ring[i].y;
    }
    sum * 0.5
}

pub fn is_ccw(ring: &[Coord<f64>]) -> bool {
    signed_area(ring) > 0.0
}

pub fn rewind(ring: &mut [Coord<f64>], ccw: bool) {
    if ring.len() >= 3 && is_ccw(ring) != ccw {
        ring.reverse();
    }
}

/// Remove vertices that sit on the straight line between their neighbours.
///
/// `tolerance` bounds the sine of the turn angle. Rings never drop below 3 points.
pub fn remove_colinear_points(geometry: &mut Geometry<f64>, tolerance: f64) {
    match geometry {
        Geometry::Polygon(p) => simplify_polygon(p, tolerance),
        Geometry::MultiPolygon(mp) => {
            for p in mp.0.iter_mut() {
                simplify_polygon(p, tolerance);
            }
        }
        Geometry::LineString(ls) => {
            ls.0 = simplify_path(&ls.0, tolerance);
        }
        _ => {}
    }
}

fn simplify_polygon(polygon: &mut Polygon<f64>, tolerance: f64) {
    polygon.exterior_mut(|ring| simplify_closed(ring, tolerance));
    polygon.interiors_mut(|rings| {
        for ring in rings {
            simplify_closed(ring, tolerance);
        }
    });
}

fn simplify_closed(ring: &mut LineString<f64>, tolerance: f64) {
    let mut points = ring.0.clone();
    open_ring(&mut points, 0.0);

    loop {
        let n = points.len();
        if n <= 3 {
            break;
        }
        let hit = (0..n).find(|&i| {
            is_colinear(points[(i + n - 1) % n], points[i], points[(i + 1) % n], tolerance)
        });
        match hit {
            Some(i) => {
                points.remove(i);
            }
            None => break,
        }
    }

    if let Some(first) = points.first().copied() {
        points.push(first);
    }
    ring.0 = points;
}

fn simplify_path(path: &[Coord<f64>], tolerance: f64) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(path.len());
    for &p in path {
        while out.len() >= 2 && is_colinear(out[out.len() - 2], out[out.len() - 1], p, tolerance) {
            out.pop();
        }
        out.push(p);
    }
    out
}

fn is_colinear(prev: Coord<f64>, at: Coord<f64>, next: Coord<f64>, tolerance: f64) -> bool {
    let a = at - prev;
    let b = next - at;
    let la = a.x.hypot(a.y);
    let lb = b.x.hypot(b.y);
    if la == 0.0 || lb == 0.0 {
        return true;
    }
    let cross = a.x * b.y - a.y * b.x;
    cross.abs() <= tolerance * la * lb
}

/// Offset a counter-clockwise ring inward by `width`.
///
/// Returns `None` when the inset collapses or splits into several rings.
/// Arcs the offset puts at reflex corners are replaced by their chords.
pub fn inset_ring(ring: &[Coord<f64>], width: f64) -> Option<Vec<Coord<f64>>> {
    if ring.len() < 3 || width <= 0.0 {
        return None;
    }

    let mut outline = Polyline::with_capacity(ring.len(), true);
    for c in ring {
        outline.add(c.x, c.y, 0.0);
    }

    // Positive offsets run to the left of each segment, inside a CCW ring
    let mut parts = outline.parallel_offset(width);
    if parts.len() != 1 {
        return None;
    }
    let inset = parts.pop()?;

    let mut points: Vec<Coord<f64>> = inset.iter_vertexes().map(|v| Coord { x: v.x, y: v.y }).collect();
    remove_duplicates(&mut points, DEFAULT_TOLERANCE);
    if points.len() < 3 {
        return None;
    }
    rewind(&mut points, true);
    Some(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use proptest::prelude::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn clean_opens_dedups_and_rewinds() {
        let mut fp = Footprint {
            exterior: vec![
                c(0.0, 0.0),
                c(0.0, 10.0),
                c(0.0, 10.0),
                c(10.0, 10.0),
                c(10.0, 0.0),
                c(0.0, 0.0),
            ],
            holes: vec![],
        };
        fp.clean(DEFAULT_TOLERANCE);

        assert_eq!(fp.exterior.len(), 4);
        assert!(is_ccw(&fp.exterior));
        assert_ne!(fp.exterior.first(), fp.exterior.last());
        assert!((fp.area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn holes_are_wound_clockwise_and_degenerate_holes_dropped() {
        let mut fp = Footprint {
            exterior: vec![c(0.0, 0.0), c(10.0, 0.0), c(10.0, 10.0), c(0.0, 10.0)],
            holes: vec![
                vec![c(2.0, 2.0), c(4.0, 2.0), c(4.0, 4.0), c(2.0, 4.0), c(2.0, 2.0)],
                vec![c(5.0, 5.0), c(5.0, 5.0), c(6.0, 6.0)],
            ],
        };
        fp.clean(DEFAULT_TOLERANCE);
        assert_eq!(fp.holes.len(), 1);
        assert!(!is_ccw(&fp.holes[0]));
        assert!((fp.area() - 96.0).abs() < 1e-9);
    }

    #[test]
    fn two_distinct_points_stay_invalid() {
        let mut fp = Footprint {
            exterior: vec![c(1.0, 1.0), c(1.0, 1.0), c(2.0, 2.0), c(1.0, 1.0)],
            holes: vec![],
        };
        fp.clean(DEFAULT_TOLERANCE);
        assert!(!fp.is_valid());
        assert_eq!(fp.exterior.len(), 2);
    }

    #[test]
    fn tolerance_merges_near_duplicates() {
        let mut ring = vec![c(0.0, 0.0), c(1e-9, 0.0), c(5.0, 0.0), c(5.0, 5.0), c(1e-9, 1e-9)];
        remove_duplicates(&mut ring, 1e-6);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn colinear_points_are_removed_from_polygons() {
        let mut geometry: Geometry<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 5.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 5.0),
        ]
        .into();
        remove_colinear_points(&mut geometry, 1e-9);
        let Geometry::Polygon(p) = geometry else {
            panic!("expected polygon");
        };
        // four corners plus the closing point
        assert_eq!(p.exterior().0.len(), 5);
        assert!(p.exterior().is_closed());
    }

    #[test]
    fn colinear_removal_keeps_a_triangle() {
        let mut geometry: Geometry<f64> =
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 2.0, y: 0.0)].into();
        remove_colinear_points(&mut geometry, 1e-9);
        let Geometry::Polygon(p) = geometry else {
            panic!("expected polygon");
        };
        assert_eq!(p.exterior().0.len(), 4);
    }

    #[test]
    fn inset_square() {
        let ring = vec![c(-5.0, -5.0), c(5.0, -5.0), c(5.0, 5.0), c(-5.0, 5.0)];
        let inner = inset_ring(&ring, 2.0).unwrap();
        assert_eq!(inner.len(), 4);
        assert!(is_ccw(&inner));
        for p in &inner {
            assert!((p.x.abs() - 3.0).abs() < 1e-6 && (p.y.abs() - 3.0).abs() < 1e-6, "{:?}", p);
        }
        assert!((signed_area(&inner) - 36.0).abs() < 1e-6);

        assert!(inset_ring(&ring, 6.0).is_none());
    }

    #[test]
    fn inset_of_an_l_shape_stays_inside() {
        let ring = vec![
            c(0.0, 0.0),
            c(20.0, 0.0),
            c(20.0, 8.0),
            c(8.0, 8.0),
            c(8.0, 20.0),
            c(0.0, 20.0),
        ];
        let inner = inset_ring(&ring, 1.0).unwrap();
        assert!(is_ccw(&inner));
        assert!(signed_area(&inner) < signed_area(&ring));
        for p in &inner {
            assert!(p.x >= 1.0 - 1e-6 && p.y >= 1.0 - 1e-6 && p.x <= 19.0 + 1e-6 && p.y <= 19.0 + 1e-6);
        }

        // wider than any circle that fits inside the L
        assert!(inset_ring(&ring, 5.0).is_none());
    }

    fn arb_ring() -> impl Strategy<Value = Vec<Coord<f64>>> {
        // Star-shaped rings around the origin are simple by construction
        prop::collection::vec((1.0f64..50.0, 0.0f64..1.0), 3..12).prop_map(|mut spokes| {
            spokes.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
            spokes
                .iter()
                .enumerate()
                .map(|(i, (r, jitter))| {
                    let n = spokes.len() as f64;
                    let angle = (i as f64 + jitter * 0.5) / n * std::f64::consts::TAU;
                    c((r * angle.cos() * 1000.0).round() / 1000.0, (r * angle.sin() * 1000.0).round() / 1000.0)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn clean_is_canonical_and_idempotent(mut ring in arb_ring(), reverse in any::<bool>(), close in any::<bool>(), dup in 0usize..12) {
            if reverse {
                ring.reverse();
            }
            if !ring.is_empty() {
                let at = dup % ring.len();
                ring.insert(at, ring[at]);
            }
            if close {
                ring.push(ring[0]);
            }

            let mut fp = Footprint { exterior: ring, holes: vec![] };
            fp.clean(DEFAULT_TOLERANCE);
            if fp.is_valid() {
                prop_assert!(signed_area(&fp.exterior) >= 0.0);
                for i in 0..fp.exterior.len() {
                    let j = (i + 1) % fp.exterior.len();
                    prop_assert!(!same_point(fp.exterior[i], fp.exterior[j], DEFAULT_TOLERANCE));
                }
            }

            let once = fp.clone();
            fp.clean(DEFAULT_TOLERANCE);
            prop_assert_eq!(once, fp);
        }
    }
}
