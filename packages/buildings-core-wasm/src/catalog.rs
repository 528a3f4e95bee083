use serde::{Deserialize, Serialize};

use crate::building::{Building, Elevation, ElevationKind, Roof, RoofType};
use crate::cancellation::CancellationToken;
use crate::error::{BuildError, FeatureError};
use crate::feature::Feature;
use crate::footprint::{inset_ring, Footprint, DEFAULT_TOLERANCE};
use crate::session::Session;
use crate::style::{Color, Style};
use crate::synthesizer::{floor_count, prepare_footprints, PreparedFootprint};
use crate::console_debug;

/// Rule-driven alternative to the default synthesizer.
pub trait BuildingCatalog: Send + Sync {
    /// Append the buildings for `feature` to `output`.
    ///
    /// `min_height` is the vertical clearance the site needs (terrain relief plus
    /// a margin); archetypes lower than that are not eligible.
    fn create_buildings(
        &self,
        feature: &Feature,
        session: &Session,
        style: Option<&Style>,
        min_height: f64,
        output: &mut Vec<Building>,
        progress: &CancellationToken,
    ) -> Result<(), FeatureError>;
}

/// One stacked section of an archetype.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub height: f64,
    /// Inset from the tier below, in meters
    #[serde(default)]
    pub setback: f64,
    #[serde(default)]
    pub wall_skin: Option<String>,
    #[serde(default)]
    pub color: Option<Color>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParapetRule {
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeRule {
    pub name: String,
    /// Footprint area range `[min_area, max_area)` in square meters
    #[serde(default)]
    pub min_area: f64,
    #[serde(default)]
    pub max_area: Option<f64>,
    pub tiers: Vec<Tier>,
    #[serde(default)]
    pub parapet: Option<ParapetRule>,
    #[serde(default)]
    pub basement: bool,
    #[serde(default)]
    pub roof_skin: Option<String>,
}

impl ArchetypeRule {
    pub fn accepts_area(&self, area: f64) -> bool {
        area >= self.min_area && self.max_area.map_or(true, |max| area < max)
    }

    pub fn total_height(&self) -> f64 {
        self.tiers.iter().map(|t| t.height).sum::<f64>() + self.parapet.map_or(0.0, |p| p.height)
    }
}

/// Picks an archetype per footprint by area and height, deterministically by feature id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeCatalog {
    pub rules: Vec<ArchetypeRule>,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

impl ArchetypeCatalog {
    pub fn new(rules: Vec<ArchetypeRule>) -> Self {
        Self {
            rules,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        Ok(serde_json::from_str(json)?)
    }

    fn select(&self, feature: &Feature, prepared: &PreparedFootprint, min_height: f64) -> Option<&ArchetypeRule> {
        let area = prepared.footprint.area();
        let eligible: Vec<&ArchetypeRule> = self
            .rules
            .iter()
            .filter(|r| !r.tiers.is_empty() && r.accepts_area(area) && r.total_height() >= min_height)
            .collect();
        if eligible.is_empty() {
            return None;
        }
        let pick = (feature.fid as usize).wrapping_add(prepared.component) % eligible.len();
        Some(eligible[pick])
    }

    fn assemble(
        &self,
        rule: &ArchetypeRule,
        feature: &Feature,
        prepared: PreparedFootprint,
        session: &Session,
        style: Option<&Style>,
    ) -> Building {
        let library = session.resource_library();
        let symbol = style.and_then(|s| s.building.as_ref());
        let roof_skin = rule
            .roof_skin
            .as_deref()
            .and_then(|name| library.and_then(|lib| lib.get_skin(name)))
            .cloned();

        // Build the tier chain top-down so each tier can own the next as a child
        let mut footprints = Vec::with_capacity(rule.tiers.len());
        let mut current = prepared.footprint.clone();
        for tier in &rule.tiers {
            if tier.setback > 0.0 && !footprints.is_empty() {
                match inset_ring(&current.exterior, tier.setback) {
                    Some(exterior) => {
                        current = Footprint {
                            exterior,
                            holes: Vec::new(),
                        }
                    }
                    None => console_debug!("{}: setback {} collapses the footprint", rule.name, tier.setback),
                }
            }
            footprints.push(current.clone());
        }

        let mut child: Option<Elevation> = rule.parapet.map(|p| {
            let mut parapet = Elevation::parapet(p.width, p.height);
            parapet.color = Color::GRAY.brightness(1.3);
            parapet.roof = Some(Roof {
                roof_type: RoofType::Flat,
                skin: roof_skin.clone(),
                color: Color::GRAY.brightness(1.2),
            });
            parapet
        });

        for (tier, footprint) in rule.tiers.iter().zip(footprints).rev() {
            let wall_skin = tier
                .wall_skin
                .as_deref()
                .and_then(|name| library.and_then(|lib| lib.get_skin(name)))
                .cloned();
            let floors = floor_count(tier.height, wall_skin.as_ref(), symbol);
            let mut elevation = Elevation::new(footprint, tier.height, floors);
            elevation.wall_skin = wall_skin;
            elevation.color = tier.color.unwrap_or_default();
            elevation.elevations.extend(child.take());
            // Only the topmost tier is roofed; a parapet sits on that roof
            let covered = elevation
                .elevations
                .iter()
                .any(|e| e.kind == ElevationKind::Standard);
            if !covered {
                elevation.roof = Some(Roof {
                    roof_type: RoofType::Flat,
                    skin: roof_skin.clone(),
                    color: Color::WHITE,
                });
            }
            child = Some(elevation);
        }

        let mut building = Building::new(feature.fid, prepared.component, prepared.frame);
        // The basement itself is added when the building is clamped to terrain
        building.wants_basement = rule.basement;
        building.elevations.extend(child);
        building.build();
        building
    }
}

impl BuildingCatalog for ArchetypeCatalog {
    fn create_buildings(
        &self,
        feature: &Feature,
        session: &Session,
        style: Option<&Style>,
        min_height: f64,
        output: &mut Vec<Building>,
        progress: &CancellationToken,
    ) -> Result<(), FeatureError> {
        let before = output.len();
        for prepared in prepare_footprints(feature, self.tolerance)? {
            if progress.is_cancelled() {
                break;
            }
            match self.select(feature, &prepared, min_height) {
                Some(rule) => output.push(self.assemble(rule, feature, prepared, session, style)),
                None => console_debug!(
                    "Feature {} component {}: no archetype taller than {:.1}",
                    feature.fid,
                    prepared.component,
                    min_height
                ),
            }
        }

        if output.len() == before {
            return Err(FeatureError::NoCatalogMatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srs::SpatialRef;
    use geo::polygon;

    fn catalog() -> ArchetypeCatalog {
        ArchetypeCatalog::from_json(
            r#"{
                "rules": [
                    { "name": "shed", "max_area": 400, "tiers": [ { "height": 4 } ] },
                    {
                        "name": "tower",
                        "min_area": 400,
                        "tiers": [ { "height": 20 }, { "height": 30, "setback": 3 } ],
                        "parapet": { "width": 1, "height": 1.5 },
                        "basement": true
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    fn square(fid: u64, size: f64) -> Feature {
        Feature::new(
            fid,
            polygon![(x: 0.0, y: 0.0), (x: size, y: 0.0), (x: size, y: size), (x: 0.0, y: size)],
            SpatialRef::Cartesian,
        )
    }

    #[test]
    fn small_footprints_get_the_shed() {
        let session = Session::new(SpatialRef::Cartesian);
        let mut out = Vec::new();
        catalog()
            .create_buildings(&square(1, 10.0), &session, None, 3.0, &mut out, &CancellationToken::none())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].elevations.len(), 1);
        assert_eq!(out[0].elevations[0].height, 4.0);
        assert!(out[0].elevations[0].roof.is_some());
    }

    #[test]
    fn min_height_rejects_short_archetypes() {
        let session = Session::new(SpatialRef::Cartesian);
        let mut out = Vec::new();
        let result = catalog().create_buildings(
            &square(1, 10.0),
            &session,
            None,
            12.0,
            &mut out,
            &CancellationToken::none(),
        );
        assert_eq!(result, Err(FeatureError::NoCatalogMatch));
        assert!(out.is_empty());
    }

    #[test]
    fn towers_stack_tiers_with_setbacks() {
        let session = Session::new(SpatialRef::Cartesian);
        let mut out = Vec::new();
        catalog()
            .create_buildings(&square(2, 40.0), &session, None, 3.0, &mut out, &CancellationToken::none())
            .unwrap();
        let b = &out[0];
        assert_eq!(b.height(), 51.5);

        // no terrain relief yet, so no basement elevation
        assert!(b.wants_basement);
        assert_eq!(b.elevations.len(), 1);
        let base = &b.elevations[0];
        assert_eq!(base.height, 20.0);
        let upper = &base.elevations[0];
        assert_eq!(upper.bottom, 20.0);
        assert!((upper.footprint.area() - 34.0 * 34.0).abs() < 1e-6);
        let parapet = &upper.elevations[0];
        assert_eq!(parapet.kind, ElevationKind::Parapet { width: 1.0 });
        assert_eq!(parapet.bottom, 50.0);
        assert!(upper.roof.is_some());
        assert!(base.roof.is_none());
    }
}
