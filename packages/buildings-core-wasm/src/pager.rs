use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::catalog::BuildingCatalog;
use crate::compiler::{BuildingCompiler, CompilerOutput, CompilerSettings};
use crate::console::now_ms;
use crate::error::BuildError;
use crate::factory::BuildingFactory;
use crate::feature::{collect_features, FeatureSource, Query};
use crate::session::Session;
use crate::synthesizer::SynthesizerOptions;
use crate::tile::{Profile, TileKey};
use crate::{console_debug, console_log, console_warn};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagerOptions {
    /// Visibility range as a multiple of the tile's bounding radius
    pub range_factor: f64,
    /// LOD styles "0" up to (not including) this level are looked up
    pub max_style_lod: u32,
    /// Build a tile's features on the rayon pool
    pub parallel: bool,
    pub profile: Profile,
}

impl Default for PagerOptions {
    fn default() -> Self {
        Self {
            range_factor: 6.0,
            max_style_lod: 30,
            parallel: false,
            profile: Profile::default(),
        }
    }
}

/// The compiled content of one tile.
#[derive(Clone, Debug, PartialEq)]
pub struct TileNode<N> {
    pub key: TileKey,
    /// Distance inside which the host should show this tile
    pub range: f64,
    pub building_count: usize,
    pub node: N,
}

type NodeOf<C> = <<C as BuildingCompiler>::Output as CompilerOutput>::Node;

/// Generates the buildings of a tile on demand.
///
/// Configure it first (`set_*` take `&mut self`), then share it; `create_node`
/// only reads the configuration and may run concurrently for different tiles.
pub struct BuildingPager<C: BuildingCompiler> {
    options: PagerOptions,
    session: Option<Arc<Session>>,
    feature_source: Option<Arc<dyn FeatureSource>>,
    catalog: Option<Arc<dyn BuildingCatalog>>,
    compiler: Option<Arc<C>>,
    compiler_settings: CompilerSettings,
    synthesizer_options: SynthesizerOptions,
    lod_range: Option<(u32, u32)>,
}

impl<C: BuildingCompiler> BuildingPager<C> {
    pub fn new(options: PagerOptions) -> Self {
        Self {
            options,
            session: None,
            feature_source: None,
            catalog: None,
            compiler: None,
            compiler_settings: CompilerSettings::default(),
            synthesizer_options: SynthesizerOptions::default(),
            lod_range: None,
        }
    }

    /// Install the session and find the LODs that have a style of their own.
    pub fn set_session(&mut self, session: Arc<Session>) {
        self.lod_range = session.styles().and_then(|styles| {
            (0..self.options.max_style_lod)
                .filter(|lod| styles.get_style(&lod.to_string()).is_some())
                .fold(None, |range, lod| match range {
                    None => Some((lod, lod)),
                    Some((lo, hi)) => Some((lo.min(lod), hi.max(lod))),
                })
        });
        if let Some((lo, hi)) = self.lod_range {
            console_debug!("BuildingPager: styled LODs {}..={}", lo, hi);
        }
        self.session = Some(session);
    }

    pub fn set_feature_source(&mut self, source: Arc<dyn FeatureSource>) {
        self.feature_source = Some(source);
    }

    pub fn set_catalog(&mut self, catalog: Arc<dyn BuildingCatalog>) {
        self.catalog = Some(catalog);
    }

    pub fn set_compiler(&mut self, compiler: Arc<C>) {
        self.compiler = Some(compiler);
    }

    pub fn set_compiler_settings(&mut self, settings: CompilerSettings) {
        self.compiler_settings = settings;
    }

    pub fn set_synthesizer_options(&mut self, options: SynthesizerOptions) {
        self.synthesizer_options = options;
    }

    pub fn options(&self) -> &PagerOptions {
        &self.options
    }

    /// Lowest LOD with a style, if any style matched.
    pub fn min_level(&self) -> Option<u32> {
        self.lod_range.map(|(lo, _)| lo)
    }

    pub fn max_level(&self) -> Option<u32> {
        self.lod_range.map(|(_, hi)| hi)
    }

    /// Build, compile and package the buildings of one tile.
    ///
    /// `None` covers both "nothing here" and failures; failures are logged.
    pub fn create_node(&self, key: &TileKey, progress: &CancellationToken) -> Option<TileNode<NodeOf<C>>> {
        let (Some(session), Some(compiler), Some(source)) =
            (self.session.as_ref(), self.compiler.as_ref(), self.feature_source.as_ref())
        else {
            console_warn!("BuildingPager {}: session, compiler and feature source must all be set", key);
            return None;
        };

        let style = session.styles().and_then(|s| s.get_style(&key.style_name()));
        let extent = self.options.profile.tile_extent(key);

        let mut cursor = source.create_cursor(&Query::for_tile(*key, extent), progress)?;
        if !cursor.has_more() {
            return None;
        }

        let factory = BuildingFactory::new(Arc::clone(session))
            .with_catalog(self.catalog.clone())
            .with_output_srs(session.map_srs())
            .with_options(self.synthesizer_options.clone());

        let start = now_ms();
        let batch = if self.options.parallel {
            let features = collect_features(cursor.as_mut(), progress);
            factory.create_parallel(features, &extent, style, progress)
        } else {
            factory.create(Some(cursor.as_mut()), &extent, style, progress)
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                console_warn!("BuildingPager {}: {}", key, e);
                return None;
            }
        };
        let factory_ms = now_ms() - start;

        if batch.buildings.is_empty() {
            console_debug!("BuildingPager {}: no buildings", key);
            return None;
        }

        let start = now_ms();
        let mut output = match compiler.compile(&batch.buildings, progress) {
            Ok(output) => output,
            Err(e) => {
                console_warn!("BuildingPager {}: {}", key, BuildError::Compile(e));
                return None;
            }
        };
        let compile_ms = now_ms() - start;

        if output.is_empty() {
            return None;
        }

        let range = self.options.profile.bounding_radius(key) * self.options.range_factor;
        output.set_range(range);
        let Some(node) = output.create_scene_graph(session, &self.compiler_settings) else {
            console_warn!("BuildingPager {}: build scene graph failed", key);
            return None;
        };

        console_log!(
            "BuildingPager {}: {} buildings, factory {:.1} ms, compile {:.1} ms",
            key,
            batch.buildings.len(),
            factory_ms,
            compile_ms
        );

        Some(TileNode {
            key: *key,
            range,
            building_count: batch.buildings.len(),
            node,
        })
    }
}
