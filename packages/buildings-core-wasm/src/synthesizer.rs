use geo::{Geometry, Polygon};
use serde::{Deserialize, Serialize};

use crate::building::{Building, Elevation, Roof, RoofType};
use crate::error::FeatureError;
use crate::feature::Feature;
use crate::footprint::{Footprint, DEFAULT_TOLERANCE};
use crate::frame::LocalFrame;
use crate::session::Session;
use crate::style::{BuildingSymbol, Color, SkinResource, Style};
use crate::console_warn;

/// Knobs for the default building recipe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesizerOptions {
    pub wall_skin: String,
    pub roof_skin: String,
    /// Used when no height expression gives a usable value
    pub default_height: f64,
    pub parapet_width: f64,
    pub parapet_height: f64,
    /// Vertices closer than this are merged while cleaning footprints
    pub tolerance: f64,
}

impl Default for SynthesizerOptions {
    fn default() -> Self {
        Self {
            wall_skin: "facade.commercial.1".to_string(),
            roof_skin: "roof.commercial.1".to_string(),
            default_height: 15.0,
            parapet_width: 2.0,
            parapet_height: 2.0,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// A cleaned polygon component in the feature's local frame.
#[derive(Clone, Debug)]
pub struct PreparedFootprint {
    pub component: usize,
    pub frame: LocalFrame,
    pub footprint: Footprint,
}

/// Localize and sanitize every polygon component of a feature.
///
/// All components share one frame centred on the whole feature. Components that
/// clean down to fewer than 3 points are dropped with a warning.
pub fn prepare_footprints(feature: &Feature, tolerance: f64) -> Result<Vec<PreparedFootprint>, FeatureError> {
    let geometry = feature.geometry.as_ref().ok_or(FeatureError::NoGeometry)?;
    if !matches!(geometry, Geometry::Polygon(_) | Geometry::MultiPolygon(_)) {
        return Err(FeatureError::NotPolygon);
    }

    let frame = LocalFrame::for_geometry(geometry, &feature.srs).ok_or(FeatureError::InvalidGeometry)?;
    let mut local = geometry.clone();
    frame.localize(&mut local, &feature.srs);

    let polygons: Vec<Polygon<f64>> = match local {
        Geometry::Polygon(p) => vec![p],
        Geometry::MultiPolygon(mp) => mp.0,
        _ => return Err(FeatureError::NotPolygon),
    };

    let mut prepared = Vec::with_capacity(polygons.len());
    for (component, polygon) in polygons.iter().enumerate() {
        let mut footprint = Footprint::from_polygon(polygon);
        footprint.clean(tolerance);
        if !footprint.is_valid() {
            console_warn!(
                "Feature {} component {}: degenerate footprint, skipped",
                feature.fid,
                component
            );
            continue;
        }
        prepared.push(PreparedFootprint {
            component,
            frame: frame.clone(),
            footprint,
        });
    }

    if prepared.is_empty() {
        return Err(FeatureError::DegenerateFootprint);
    }
    Ok(prepared)
}

/// Builds the default single-elevation, flat-roofed, parapeted building.
pub struct BuildingSynthesizer<'a> {
    session: &'a Session,
    style: Option<&'a Style>,
    options: &'a SynthesizerOptions,
}

impl<'a> BuildingSynthesizer<'a> {
    pub fn new(session: &'a Session, style: Option<&'a Style>, options: &'a SynthesizerOptions) -> Self {
        Self {
            session,
            style,
            options,
        }
    }

    /// The caller's style symbol, else the stylesheet's default one.
    fn symbol(&self) -> Option<&'a BuildingSymbol> {
        let session: &'a Session = self.session;
        self.style
            .and_then(|s| s.building.as_ref())
            .or_else(|| session.styles()?.default_style()?.building.as_ref())
    }

    fn skin(&self, name: &str) -> Option<SkinResource> {
        self.session
            .resource_library()
            .and_then(|lib| lib.get_skin(name))
            .cloned()
    }

    pub fn height_for(&self, feature: &Feature) -> f64 {
        self.symbol()
            .and_then(|s| s.height.as_ref())
            .and_then(|expr| expr.eval(feature))
            .filter(|h| h.is_finite() && *h > 0.0)
            .unwrap_or(self.options.default_height)
    }

    pub fn synthesize(&self, feature: &Feature) -> Result<Vec<Building>, FeatureError> {
        let prepared = prepare_footprints(feature, self.options.tolerance)?;

        let height = self.height_for(feature);
        let wall_skin = self.skin(&self.options.wall_skin);
        let roof_skin = self.skin(&self.options.roof_skin);
        let num_floors = floor_count(height, wall_skin.as_ref(), self.symbol());

        let buildings = prepared
            .into_iter()
            .map(|p| {
                let mut elevation = Elevation::new(p.footprint, height, num_floors);
                elevation.wall_skin = wall_skin.clone();
                elevation.roof = Some(Roof {
                    roof_type: RoofType::Flat,
                    skin: roof_skin.clone(),
                    color: Color::WHITE,
                });

                let mut parapet = Elevation::parapet(self.options.parapet_width, self.options.parapet_height);
                parapet.num_floors = 1;
                parapet.color = Color::GRAY.brightness(1.3);
                parapet.roof = Some(Roof {
                    roof_type: RoofType::Flat,
                    skin: roof_skin.clone(),
                    color: Color::GRAY.brightness(1.2),
                });
                elevation.elevations.push(parapet);

                let mut building = Building::new(feature.fid, p.component, p.frame);
                building.elevations.push(elevation);
                building.build();
                building
            })
            .collect();
        Ok(buildings)
    }
}

/// `max(1, round(height / unit))`; the unit is the wall skin's image height,
/// else the symbol's floor height. Without either the building has one floor.
pub fn floor_count(height: f64, wall_skin: Option<&SkinResource>, symbol: Option<&BuildingSymbol>) -> u32 {
    let unit = match (wall_skin, symbol) {
        (Some(skin), _) => skin.image_height,
        (None, Some(symbol)) => symbol.floor_height,
        (None, None) => return 1,
    };
    if unit.is_nan() || unit <= 0.0 || !height.is_finite() {
        return 1;
    }
    ((height / unit).round() as u32).max(1)
}
