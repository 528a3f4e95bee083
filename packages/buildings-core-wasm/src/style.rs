use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::expression::NumericExpression;

// Struct to represent a color
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    #[serde(default = "opaque")]
    pub a: f32,
}

fn opaque() -> f32 {
    1.0
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const GRAY: Color = Color::rgb(0.5, 0.5, 0.5);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Color { r, g, b, a: 1.0 }
    }

    /// Scale the color channels, saturating at 1.
    pub fn brightness(&self, factor: f32) -> Self {
        Color {
            r: (self.r * factor).clamp(0.0, 1.0),
            g: (self.g * factor).clamp(0.0, 1.0),
            b: (self.b * factor).clamp(0.0, 1.0),
            a: self.a,
        }
    }

    // Parse a color string in hex format (#RRGGBB)
    pub fn from_hex(color_str: &str) -> Option<Self> {
        let hex = color_str.strip_prefix('#')?;
        if hex.len() < 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok().map(|v| v as f32 / 255.0);
        Some(Color::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// A texture that can skin walls or roofs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinResource {
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Real-world width covered by one repeat of the image, in meters
    #[serde(default = "default_image_extent")]
    pub image_width: f64,
    /// Real-world height covered by one repeat of the image, in meters
    #[serde(default = "default_image_extent")]
    pub image_height: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_image_extent() -> f64 {
    3.5
}

impl SkinResource {
    pub fn new(name: &str, image_height: f64) -> Self {
        Self {
            name: name.to_string(),
            image_url: None,
            image_width: default_image_extent(),
            image_height,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLibrary {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub skins: Vec<SkinResource>,
}

impl ResourceLibrary {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            skins: Vec::new(),
        }
    }

    pub fn with_skin(mut self, skin: SkinResource) -> Self {
        self.skins.push(skin);
        self
    }

    pub fn get_skin(&self, name: &str) -> Option<&SkinResource> {
        self.skins.iter().find(|s| s.name == name)
    }
}

/// How buildings are derived for a style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingSymbol {
    #[serde(default)]
    pub height: Option<NumericExpression>,
    #[serde(default = "default_floor_height")]
    pub floor_height: f64,
}

fn default_floor_height() -> f64 {
    3.5
}

impl Default for BuildingSymbol {
    fn default() -> Self {
        Self {
            height: None,
            floor_height: default_floor_height(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Clamping {
    None,
    #[default]
    Terrain,
    Relative,
    Absolute,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AltitudeSymbol {
    #[serde(default)]
    pub clamping: Clamping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub building: Option<BuildingSymbol>,
    #[serde(default)]
    pub altitude: Option<AltitudeSymbol>,
}

impl Style {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_building(mut self, symbol: BuildingSymbol) -> Self {
        self.building = Some(symbol);
        self
    }

    pub fn with_clamping(mut self, clamping: Clamping) -> Self {
        self.altitude = Some(AltitudeSymbol { clamping });
        self
    }

    /// An altitude symbol is present and asks for some kind of clamping.
    pub fn needs_terrain_clamp(&self) -> bool {
        self.altitude
            .map(|a| a.clamping != Clamping::None)
            .unwrap_or(false)
    }
}

/// Named styles plus the resource library they draw skins from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleSheet {
    #[serde(default)]
    pub styles: BTreeMap<String, Style>,
    /// Name of the style used when a caller asks for no particular one
    #[serde(default)]
    pub default_style: Option<String>,
    #[serde(default)]
    pub resource_library: Option<ResourceLibrary>,
}

impl StyleSheet {
    pub fn add_style(&mut self, mut style: Style) {
        if style.name.is_empty() {
            style.name = format!("style-{}", self.styles.len());
        }
        self.styles.insert(style.name.clone(), style);
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.add_style(style);
        self
    }

    pub fn with_resource_library(mut self, library: ResourceLibrary) -> Self {
        self.resource_library = Some(library);
        self
    }

    pub fn get_style(&self, name: &str) -> Option<&Style> {
        self.styles.get(name)
    }

    /// The named default style, else a style called "default", else the first style.
    pub fn default_style(&self) -> Option<&Style> {
        self.default_style
            .as_deref()
            .and_then(|n| self.styles.get(n))
            .or_else(|| self.styles.get("default"))
            .or_else(|| self.styles.values().next())
    }

    pub fn resource_library(&self) -> Option<&ResourceLibrary> {
        self.resource_library.as_ref()
    }

    /// Map keys double as style names when the style itself carries none.
    pub fn normalize_names(&mut self) {
        for (key, style) in self.styles.iter_mut() {
            if style.name.is_empty() {
                style.name = key.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_brightness_saturates() {
        let c = Color::GRAY.brightness(1.3);
        assert!((c.r - 0.65).abs() < 1e-6);
        let c = Color::GRAY.brightness(3.0);
        assert_eq!(c.r, 1.0);
        assert_eq!(Color::from_hex("#ff0000"), Some(Color::rgb(1.0, 0.0, 0.0)));
        assert_eq!(Color::from_hex("red"), None);
    }

    #[test]
    fn clamping_none_disables_terrain_sampling() {
        assert!(!Style::named("a").needs_terrain_clamp());
        assert!(!Style::named("b").with_clamping(Clamping::None).needs_terrain_clamp());
        assert!(Style::named("c").with_clamping(Clamping::Terrain).needs_terrain_clamp());
    }

    #[test]
    fn stylesheet_from_json() {
        let json = r#"{
            "styles": {
                "14": { "building": { "height": "[height] * 1.1" }, "altitude": { "clamping": "terrain" } },
                "16": { "building": { "height": 9, "floor_height": 3.0 } }
            },
            "default_style": "16",
            "resource_library": {
                "name": "us",
                "skins": [ { "name": "facade.commercial.1", "image_height": 4.0 } ]
            }
        }"#;
        let mut sheet: StyleSheet = serde_json::from_str(json).unwrap();
        sheet.normalize_names();

        assert!(sheet.get_style("14").unwrap().needs_terrain_clamp());
        let default = sheet.default_style().unwrap();
        assert_eq!(default.name, "16");
        assert_eq!(default.building.as_ref().unwrap().floor_height, 3.0);
        let skin = sheet.resource_library().unwrap().get_skin("facade.commercial.1").unwrap();
        assert_eq!(skin.image_height, 4.0);
        assert_eq!(skin.image_width, 3.5);
    }
}
