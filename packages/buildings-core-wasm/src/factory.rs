use geo::BoundingRect;
use rayon::prelude::*;
use std::sync::Arc;

use crate::building::Building;
use crate::cancellation::CancellationToken;
use crate::catalog::BuildingCatalog;
use crate::console::now_ms;
use crate::error::{BuildError, FeatureError};
use crate::extent::GeoExtent;
use crate::feature::{Feature, FeatureCursor, FeatureId};
use crate::footprint::remove_colinear_points;
use crate::session::Session;
use crate::srs::SpatialRef;
use crate::style::Style;
use crate::synthesizer::{BuildingSynthesizer, SynthesizerOptions};
use crate::terrain::{clamp_buildings, sample_min_max};
use crate::{console_debug, console_log, console_warn};

// Sine of the turn angle below which a vertex counts as co-linear
const COLINEAR_TOLERANCE: f64 = 1e-9;

// Vertical clearance a catalog archetype must offer on flat ground
const MIN_HEIGHT_MARGIN: f64 = 3.0;

/// A feature that produced no buildings, and why.
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedFeature {
    pub fid: FeatureId,
    pub reason: FeatureError,
}

/// Everything one `create` call produced.
#[derive(Clone, Debug, Default)]
pub struct BuildingBatch {
    pub buildings: Vec<Building>,
    pub skipped: Vec<SkippedFeature>,
    /// Features whose centroid fell outside the crop extent
    pub cropped: usize,
    /// Features the catalog had no archetype for
    pub unmatched: usize,
}

impl BuildingBatch {
    fn absorb(&mut self, outcome: FeatureOutcome) {
        match outcome {
            FeatureOutcome::Built(buildings) => self.buildings.extend(buildings),
            FeatureOutcome::Cropped => self.cropped += 1,
            FeatureOutcome::Unmatched(fid) => {
                console_debug!("Feature {}: no catalog archetype fits", fid);
                self.unmatched += 1;
            }
            FeatureOutcome::Skipped(skipped) => {
                console_warn!("Skipping feature {}: {}", skipped.fid, skipped.reason);
                self.skipped.push(skipped);
            }
        }
    }
}

enum FeatureOutcome {
    Built(Vec<Building>),
    Cropped,
    Unmatched(FeatureId),
    Skipped(SkippedFeature),
}

/// Turns features into buildings.
#[derive(Clone)]
pub struct BuildingFactory {
    session: Arc<Session>,
    catalog: Option<Arc<dyn BuildingCatalog>>,
    output_srs: Option<SpatialRef>,
    options: SynthesizerOptions,
}

impl BuildingFactory {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            catalog: None,
            output_srs: None,
            options: SynthesizerOptions::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: Option<Arc<dyn BuildingCatalog>>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Reproject features into `srs` before building.
    pub fn with_output_srs(mut self, srs: SpatialRef) -> Self {
        self.output_srs = Some(srs);
        self
    }

    pub fn with_options(mut self, options: SynthesizerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Build every feature the cursor yields, in cursor order.
    ///
    /// Only a missing cursor or cancellation fails the call; bad features are
    /// logged and listed in `BuildingBatch::skipped`.
    pub fn create(
        &self,
        cursor: Option<&mut dyn FeatureCursor>,
        crop: &GeoExtent,
        style: Option<&Style>,
        progress: &CancellationToken,
    ) -> Result<BuildingBatch, BuildError> {
        let cursor = cursor.ok_or(BuildError::MissingCursor)?;
        let start = now_ms();
        let mut batch = BuildingBatch::default();
        let mut seen = 0usize;

        while cursor.has_more() {
            progress.check()?;
            let Some(feature) = cursor.next_feature() else {
                break;
            };
            seen += 1;
            batch.absorb(self.process_feature(feature, crop, style, progress));
        }

        console_log!(
            "BuildingFactory: {} buildings from {} features ({} cropped, {} skipped) in {:.1} ms",
            batch.buildings.len(),
            seen,
            batch.cropped,
            batch.skipped.len(),
            now_ms() - start
        );
        Ok(batch)
    }

    /// Like `create`, but builds the features on the rayon pool.
    ///
    /// Results are concatenated in input order, so the output matches `create`.
    pub fn create_parallel(
        &self,
        features: Vec<Feature>,
        crop: &GeoExtent,
        style: Option<&Style>,
        progress: &CancellationToken,
    ) -> Result<BuildingBatch, BuildError> {
        progress.check()?;
        let start = now_ms();
        let count = features.len();

        let outcomes: Vec<Option<FeatureOutcome>> = features
            .into_par_iter()
            .map(|feature| {
                if progress.is_cancelled() {
                    None
                } else {
                    Some(self.process_feature(feature, crop, style, progress))
                }
            })
            .collect();
        progress.check()?;

        let mut batch = BuildingBatch::default();
        for outcome in outcomes.into_iter().flatten() {
            batch.absorb(outcome);
        }

        console_log!(
            "BuildingFactory (parallel): {} buildings from {} features in {:.1} ms",
            batch.buildings.len(),
            count,
            now_ms() - start
        );
        Ok(batch)
    }

    fn process_feature(
        &self,
        mut feature: Feature,
        crop: &GeoExtent,
        style: Option<&Style>,
        progress: &CancellationToken,
    ) -> FeatureOutcome {
        let fid = feature.fid;
        let skip = |reason: FeatureError| FeatureOutcome::Skipped(SkippedFeature { fid, reason });

        if let Some(geometry) = feature.geometry.as_mut() {
            remove_colinear_points(geometry, COLINEAR_TOLERANCE);
        }

        if let Some(srs) = self.output_srs {
            if let Err(e) = feature.transform(&srs) {
                return skip(FeatureError::Reprojection(e.to_string()));
            }
        }

        let Some(geometry) = feature.geometry.as_ref() else {
            return skip(FeatureError::NoGeometry);
        };

        if !in_crop(geometry, &feature.srs, crop) {
            return FeatureOutcome::Cropped;
        }

        let (min, max) = match (style, self.session.elevation()) {
            (Some(style), Some(query)) if style.needs_terrain_clamp() => {
                sample_min_max(query, geometry, &feature.srs, progress)
            }
            _ => (f64::INFINITY, f64::NEG_INFINITY),
        };
        let terrain_valid = min < max;

        let mut buildings = Vec::new();
        let built = match self.catalog.as_ref() {
            Some(catalog) => {
                let min_height = if terrain_valid {
                    max - min + MIN_HEIGHT_MARGIN
                } else {
                    MIN_HEIGHT_MARGIN
                };
                catalog.create_buildings(&feature, &self.session, style, min_height, &mut buildings, progress)
            }
            None => BuildingSynthesizer::new(&self.session, style, &self.options)
                .synthesize(&feature)
                .map(|built| buildings.extend(built)),
        };
        match built {
            Ok(()) => {}
            Err(FeatureError::NoCatalogMatch) => return FeatureOutcome::Unmatched(fid),
            Err(reason) => return skip(reason),
        }

        if terrain_valid {
            clamp_buildings(&mut buildings, min, max);
        }
        FeatureOutcome::Built(buildings)
    }
}

/// Whether the centre of the geometry's bounding box falls in `crop`.
///
/// An invalid crop extent accepts everything. A centre that cannot be brought
/// into the extent's reference is rejected.
fn in_crop(geometry: &geo::Geometry<f64>, srs: &SpatialRef, crop: &GeoExtent) -> bool {
    if !crop.is_valid() {
        return true;
    }
    let Some(rect) = geometry.bounding_rect() else {
        return false;
    };
    match srs.transform(rect.center(), &crop.srs) {
        Ok(centroid) => crop.contains(centroid),
        Err(_) => false,
    }
}
