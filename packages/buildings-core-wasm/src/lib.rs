use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::to_value;
use std::sync::{Arc, Once};
use wasm_bindgen::prelude::*;

// Create a console module for logging
pub mod console;
pub mod error;
// Cooperative cancellation and the operation registry
pub mod cancellation;
// Spatial references, extents and tiling
pub mod srs;
pub mod extent;
pub mod tile;
pub mod frame;
// Vector input
pub mod feature;
pub mod footprint;
pub mod expression;
// Styling and configuration
pub mod style;
pub mod session;
// Building model and generation
pub mod building;
pub mod synthesizer;
pub mod terrain;
pub mod catalog;
pub mod factory;
// Tile paging
pub mod compiler;
pub mod pager;

// Logging macros; modules import them with `use crate::console_log;`
#[macro_export]
macro_rules! console_log {
    ($($t:tt)*) => ($crate::console::log(&format!($($t)*)))
}

#[macro_export]
macro_rules! console_warn {
    ($($t:tt)*) => ($crate::console::warn(&format!($($t)*)))
}

#[macro_export]
macro_rules! console_debug {
    ($($t:tt)*) => ($crate::console::debug(&format!($($t)*)))
}

pub use building::{Building, Corner, Elevation, ElevationKind, Roof, RoofType, Wall, WallFace};
pub use cancellation::CancellationToken;
pub use catalog::{ArchetypeCatalog, BuildingCatalog};
pub use compiler::{BuildingCompiler, CompilerOutput, CompilerSettings};
pub use error::{BuildError, FeatureError};
pub use extent::GeoExtent;
pub use factory::{BuildingBatch, BuildingFactory, SkippedFeature};
pub use feature::{Feature, FeatureCursor, FeatureSource, InMemoryFeatureSource, Query, VecFeatureCursor};
pub use footprint::Footprint;
pub use frame::LocalFrame;
pub use pager::{BuildingPager, PagerOptions, TileNode};
pub use session::Session;
pub use srs::SpatialRef;
pub use style::{Color, ResourceLibrary, SkinResource, Style, StyleSheet};
pub use synthesizer::{BuildingSynthesizer, SynthesizerOptions};
pub use terrain::{ElevationQuery, GridElevationQuery};
pub use tile::{Profile, TileKey};

// Enable better panic messages in console during development
#[cfg(feature = "console_error_panic_hook")]
pub use console_error_panic_hook::set_once as set_panic_hook;

static INIT: Once = Once::new();

// This sets up the wasm_bindgen start functionality
#[wasm_bindgen(start)]
pub fn start() {
    INIT.call_once(|| {
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        console_log!("buildings core initialized");
    });
}

/// A regular elevation grid passed in from the host.
#[derive(Debug, Deserialize)]
pub struct ElevationGridInput {
    pub extent: GeoExtent,
    /// Rows from `ymin` upward
    pub grid: Vec<Vec<f64>>,
    #[serde(default)]
    pub no_data: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateBuildingsInput {
    /// GeoJSON feature collection
    pub features: serde_json::Value,
    #[serde(default)]
    pub srs: SpatialRef,
    #[serde(default)]
    pub output_srs: Option<SpatialRef>,
    #[serde(default)]
    pub crop: Option<GeoExtent>,
    #[serde(default)]
    pub styles: Option<StyleSheet>,
    /// Name of the style to build with
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub elevation: Option<ElevationGridInput>,
    #[serde(default)]
    pub catalog: Option<ArchetypeCatalog>,
    #[serde(default)]
    pub options: SynthesizerOptions,
    #[serde(default)]
    pub parallel: bool,
    /// Registers the run so `cancel_operation` can stop it
    #[serde(default)]
    pub operation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SkippedOutput {
    pub fid: u64,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateBuildingsOutput {
    pub buildings: Vec<Building>,
    pub skipped: Vec<SkippedOutput>,
    pub cropped: usize,
    pub unmatched: usize,
}

/// Parse the request, build, and report. Usable without a JS host.
pub fn generate_buildings_from_json(input_json: &str) -> Result<GenerateBuildingsOutput, BuildError> {
    let input: GenerateBuildingsInput = serde_json::from_str(input_json)?;
    let features = feature::features_from_geojson(&input.features, input.srs)?;

    let mut session = Session::new(input.output_srs.unwrap_or(input.srs));
    if let Some(mut styles) = input.styles {
        styles.normalize_names();
        session = session.with_styles(styles);
    }
    if let Some(grid) = input.elevation {
        let mut query = GridElevationQuery::new(grid.extent, grid.grid)?;
        if let Some(no_data) = grid.no_data {
            query = query.with_no_data(no_data);
        }
        session = session.with_elevation(Arc::new(query));
    }
    let session = Arc::new(session);

    let style = input.style.as_deref().and_then(|name| {
        let found = session.styles().and_then(|s| s.get_style(name));
        if found.is_none() {
            console_warn!("Style '{}' not found, using defaults", name);
        }
        found
    });

    let mut factory = BuildingFactory::new(Arc::clone(&session)).with_options(input.options);
    if let Some(srs) = input.output_srs {
        factory = factory.with_output_srs(srs);
    }
    if let Some(catalog) = input.catalog {
        let catalog: Arc<dyn BuildingCatalog> = Arc::new(catalog);
        factory = factory.with_catalog(Some(catalog));
    }

    let crop = input.crop.unwrap_or_else(GeoExtent::invalid);
    let token = match input.operation_id.as_deref() {
        Some(id) => cancellation::register_operation(id),
        None => CancellationToken::none(),
    };

    let result = if input.parallel {
        factory.create_parallel(features, &crop, style, &token)
    } else {
        let mut cursor = VecFeatureCursor::new(features);
        factory.create(Some(&mut cursor), &crop, style, &token)
    };
    if let Some(id) = input.operation_id.as_deref() {
        cancellation::cleanup_operation(id);
    }
    let batch = result?;

    Ok(GenerateBuildingsOutput {
        buildings: batch.buildings,
        skipped: batch
            .skipped
            .into_iter()
            .map(|s| SkippedOutput {
                fid: s.fid,
                reason: s.reason.to_string(),
            })
            .collect(),
        cropped: batch.cropped,
        unmatched: batch.unmatched,
    })
}

// Generate buildings for a GeoJSON feature collection
#[wasm_bindgen]
pub fn generate_buildings(input_json: &str) -> Result<JsValue, JsValue> {
    let output = generate_buildings_from_json(input_json).map_err(|e| JsValue::from_str(&e.to_string()))?;
    to_value(&output).map_err(|e| JsValue::from_str(&format!("Failed to serialize buildings: {}", e)))
}
