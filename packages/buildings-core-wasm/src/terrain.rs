use geo::{Coord, CoordsIter, Geometry};

use crate::building::Building;
use crate::cancellation::CancellationToken;
use crate::error::BuildError;
use crate::extent::GeoExtent;
use crate::srs::SpatialRef;

/// Result of one elevation query: one entry per requested point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElevationSamples {
    /// `None` where the point could not be sampled
    pub elevations: Vec<Option<f64>>,
    /// Finest resolution of the data that answered the query
    pub max_resolution: f64,
}

/// Terrain height lookup.
pub trait ElevationQuery: Send + Sync {
    /// `None` when the query could not run at all.
    fn sample(
        &self,
        points: &[Coord<f64>],
        srs: &SpatialRef,
        progress: &CancellationToken,
    ) -> Option<ElevationSamples>;
}

/// Lowest and highest terrain height under the vertices of `geometry`.
///
/// Returns `(+inf, -inf)` when nothing could be sampled.
pub fn sample_min_max(
    query: &dyn ElevationQuery,
    geometry: &Geometry<f64>,
    srs: &SpatialRef,
    progress: &CancellationToken,
) -> (f64, f64) {
    let points: Vec<Coord<f64>> = geometry.coords_iter().collect();
    let empty = (f64::INFINITY, f64::NEG_INFINITY);
    if points.is_empty() {
        return empty;
    }

    match query.sample(&points, srs, progress) {
        Some(samples) => samples
            .elevations
            .iter()
            .flatten()
            .filter(|h| h.is_finite())
            .fold(empty, |(lo, hi), &h| (lo.min(h), hi.max(h))),
        None => empty,
    }
}

/// Shift a building onto the terrain.
///
/// Every wall corner of every elevation is raised by `min`. A building that wants
/// a basement is raised by `max` instead and gets a basement from `min` to `max`,
/// filling the gap under sloped ground.
pub fn apply_offset(building: &mut Building, min: f64, max: f64) {
    let basement = building.wants_basement && min < max;
    let lift = if basement { max } else { min };
    building.visit_elevations_mut(|elevation| {
        elevation.bottom += lift;
        for wall in &mut elevation.walls {
            for face in &mut wall.faces {
                for corner in face.corners_mut() {
                    corner.lower.z += lift;
                    corner.upper.z += lift;
                }
            }
        }
    });
    if basement {
        building.add_basement(min, max - min);
    }
}

/// Apply the terrain offset to a run of buildings when the sampled range is usable.
pub fn clamp_buildings(buildings: &mut [Building], min: f64, max: f64) -> bool {
    let usable = min < max;
    if !usable {
        return false;
    }
    for building in buildings.iter_mut() {
        apply_offset(building, min, max);
    }
    true
}

// Standard Mapbox Terrain-RGB encoding
// -10000 + ((R * 256² + G * 256 + B) * 0.1)
pub fn process_pixel_to_elevation(r: u8, g: u8, b: u8) -> f64 {
    let value = (r as u32) * 65536 + (g as u32) * 256 + (b as u32);
    -10000.0 + (value as f64) * 0.1
}

/// A regular elevation grid covering an extent, sampled bilinearly.
///
/// Row 0 runs along `ymin`; columns run from `xmin` to `xmax`.
#[derive(Clone, Debug)]
pub struct GridElevationQuery {
    extent: GeoExtent,
    grid: Vec<Vec<f64>>,
    width: usize,
    height: usize,
    no_data: Option<f64>,
}

impl GridElevationQuery {
    pub fn new(extent: GeoExtent, grid: Vec<Vec<f64>>) -> Result<Self, BuildError> {
        if !extent.is_valid() || extent.width() <= 0.0 || extent.height() <= 0.0 {
            return Err(BuildError::ElevationGrid("extent is empty or invalid".into()));
        }
        let height = grid.len();
        let width = grid.first().map(Vec::len).unwrap_or(0);
        if width < 2 || height < 2 {
            return Err(BuildError::ElevationGrid(format!(
                "need at least 2x2 samples, got {}x{}",
                width, height
            )));
        }
        if grid.iter().any(|row| row.len() != width) {
            return Err(BuildError::ElevationGrid("rows differ in length".into()));
        }
        Ok(Self {
            extent,
            grid,
            width,
            height,
            no_data: None,
        })
    }

    /// Decode an RGBA Terrain-RGB image (rows north first) covering `extent`.
    pub fn from_terrain_rgb(
        extent: GeoExtent,
        width: usize,
        height: usize,
        rgba: &[u8],
    ) -> Result<Self, BuildError> {
        if rgba.len() < width * height * 4 {
            return Err(BuildError::ElevationGrid(format!(
                "expected {} bytes of RGBA, got {}",
                width * height * 4,
                rgba.len()
            )));
        }
        let grid = (0..height)
            .rev()
            .map(|row| {
                (0..width)
                    .map(|col| {
                        let i = (row * width + col) * 4;
                        process_pixel_to_elevation(rgba[i], rgba[i + 1], rgba[i + 2])
                    })
                    .collect()
            })
            .collect();
        Self::new(extent, grid)
    }

    pub fn with_no_data(mut self, value: f64) -> Self {
        self.no_data = Some(value);
        self
    }

    pub fn extent(&self) -> &GeoExtent {
        &self.extent
    }

    fn value(&self, row: usize, col: usize) -> Option<f64> {
        let v = self.grid[row][col];
        match self.no_data {
            Some(nd) if v == nd => None,
            _ if !v.is_finite() => None,
            _ => Some(v),
        }
    }

    /// Bilinear height at a point in the grid's own spatial reference.
    pub fn sample_at(&self, point: Coord<f64>) -> Option<f64> {
        if !self.extent.contains_closed(point) {
            return None;
        }

        // Normalize coordinates to 0-1 range within the grid
        let nx = (point.x - self.extent.xmin) / self.extent.width();
        let ny = (point.y - self.extent.ymin) / self.extent.height();

        let x = (nx * (self.width - 1) as f64).clamp(0.0, (self.width - 1) as f64);
        let y = (ny * (self.height - 1) as f64).clamp(0.0, (self.height - 1) as f64);

        let x0 = (x.floor() as usize).min(self.width - 2);
        let y0 = (y.floor() as usize).min(self.height - 2);
        let dx = x - x0 as f64;
        let dy = y - y0 as f64;

        // Bilinear interpolation of elevation values
        let v00 = self.value(y0, x0)?;
        let v10 = self.value(y0, x0 + 1)?;
        let v01 = self.value(y0 + 1, x0)?;
        let v11 = self.value(y0 + 1, x0 + 1)?;

        let v0 = v00 * (1.0 - dx) + v10 * dx;
        let v1 = v01 * (1.0 - dx) + v11 * dx;
        Some(v0 * (1.0 - dy) + v1 * dy)
    }

    fn resolution(&self) -> f64 {
        let rx = self.extent.width() / (self.width - 1) as f64;
        let ry = self.extent.height() / (self.height - 1) as f64;
        rx.min(ry)
    }
}

impl ElevationQuery for GridElevationQuery {
    fn sample(
        &self,
        points: &[Coord<f64>],
        srs: &SpatialRef,
        progress: &CancellationToken,
    ) -> Option<ElevationSamples> {
        if progress.is_cancelled() {
            return None;
        }
        let grid_srs = self.extent.srs;
        let mut elevations = Vec::with_capacity(points.len());
        for &p in points {
            let local = srs.transform(p, &grid_srs).ok()?;
            elevations.push(self.sample_at(local));
        }
        Some(ElevationSamples {
            elevations,
            max_resolution: self.resolution(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::building::Elevation;
    use crate::footprint::Footprint;
    use crate::frame::LocalFrame;
    use geo::polygon;

    // height = x + 10 * y over a 3x3 grid on [0, 2] x [0, 2]
    fn ramp() -> GridElevationQuery {
        let grid = (0..3)
            .map(|y| (0..3).map(|x| x as f64 + 10.0 * y as f64).collect())
            .collect();
        GridElevationQuery::new(GeoExtent::new(SpatialRef::Cartesian, 0.0, 0.0, 2.0, 2.0), grid).unwrap()
    }

    #[test]
    fn bilinear_sampling_inside_and_outside() {
        let q = ramp();
        assert_eq!(q.sample_at(Coord { x: 0.5, y: 0.5 }), Some(5.5));
        assert_eq!(q.sample_at(Coord { x: 2.0, y: 2.0 }), Some(22.0));
        assert_eq!(q.sample_at(Coord { x: 2.5, y: 1.0 }), None);
    }

    #[test]
    fn min_max_over_footprint_vertices() {
        let q = ramp();
        let geometry: Geometry<f64> =
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)].into();
        let (lo, hi) = sample_min_max(&q, &geometry, &SpatialRef::Cartesian, &CancellationToken::none());
        assert_eq!((lo, hi), (0.0, 11.0));

        let outside: Geometry<f64> = polygon![(x: 5.0, y: 5.0), (x: 6.0, y: 5.0), (x: 6.0, y: 6.0)].into();
        let (lo, hi) = sample_min_max(&q, &outside, &SpatialRef::Cartesian, &CancellationToken::none());
        assert!(lo.is_infinite() && hi.is_infinite() && lo > hi);
    }

    #[test]
    fn incompatible_srs_is_not_sampled() {
        let q = ramp();
        let geometry: Geometry<f64> = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)].into();
        let (lo, hi) = sample_min_max(&q, &geometry, &SpatialRef::Geographic, &CancellationToken::none());
        assert!(lo > hi);
    }

    #[test]
    fn terrain_rgb_decoding() {
        assert!(process_pixel_to_elevation(1, 134, 160).abs() < 1e-9);
        // 2x2 image: north row at 10 m, south row at 0 m
        let north = [1u8, 135, 4, 255];
        let south = [1u8, 134, 160, 255];
        let rgba: Vec<u8> = [north, north, south, south].concat();
        let q = GridElevationQuery::from_terrain_rgb(
            GeoExtent::new(SpatialRef::Geographic, 0.0, 0.0, 1.0, 1.0),
            2,
            2,
            &rgba,
        )
        .unwrap();
        let h = q.sample_at(Coord { x: 0.5, y: 1.0 }).unwrap();
        assert!((h - 10.0).abs() < 1e-6);
        assert!(GridElevationQuery::new(*q.extent(), vec![vec![1.0]]).is_err());
    }

    fn square_building(wants_basement: bool) -> Building {
        let footprint = Footprint {
            exterior: vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 4.0, y: 0.0 }, Coord { x: 4.0, y: 4.0 }],
            holes: vec![],
        };
        let mut b = Building::new(1, 0, LocalFrame::at(&SpatialRef::Cartesian, Coord { x: 0.0, y: 0.0 }));
        b.elevations.push(Elevation::new(footprint, 9.0, 3));
        b.wants_basement = wants_basement;
        b.build();
        b
    }

    #[test]
    fn offset_raises_every_wall_by_the_minimum() {
        let mut b = square_building(false);
        assert!(!clamp_buildings(std::slice::from_mut(&mut b), 5.0, 5.0));
        assert_eq!(b.elevations[0].walls[0].faces[0].left.lower.z, 0.0);

        assert!(clamp_buildings(std::slice::from_mut(&mut b), 100.0, 104.0));
        assert_eq!(b.elevations.len(), 1);
        let face = b.elevations[0].walls[0].faces[0];
        assert_eq!((face.left.lower.z, face.left.upper.z), (100.0, 109.0));
        assert_eq!(b.elevations[0].bottom, 100.0);
    }

    #[test]
    fn basement_fills_the_terrain_gap_under_a_raised_body() {
        let mut flat = square_building(true);
        assert!(!clamp_buildings(std::slice::from_mut(&mut flat), 3.0, 3.0));
        assert_eq!(flat.elevations.len(), 1);

        let mut b = square_building(true);
        assert!(clamp_buildings(std::slice::from_mut(&mut b), 0.0, 6.0));
        assert_eq!(b.elevations.len(), 2);

        let basement = &b.elevations[0];
        assert!(basement.basement);
        assert_eq!(basement.height, 6.0);
        let face = basement.walls[0].faces[2];
        assert_eq!((face.right.lower.z, face.right.upper.z), (0.0, 6.0));

        let body = &b.elevations[1];
        assert_eq!(body.bottom, 6.0);
        let face = body.walls[0].faces[0];
        assert_eq!((face.left.lower.z, face.left.upper.z), (6.0, 15.0));
    }
}
