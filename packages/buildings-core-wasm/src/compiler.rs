use serde::{Deserialize, Serialize};

use crate::building::Building;
use crate::cancellation::CancellationToken;
use crate::session::Session;

/// Settings forwarded untouched to `CompilerOutput::create_scene_graph`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Visibility ranges (in meters) for detail bins inside one tile
    pub lod_bins: Vec<f64>,
    /// Merge geometry that shares a skin into one drawable
    pub merge_by_skin: bool,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            lod_bins: vec![f64::MAX],
            merge_by_skin: true,
        }
    }
}

/// Turns buildings into something renderable.
pub trait BuildingCompiler: Send + Sync {
    type Output: CompilerOutput;

    fn compile(&self, buildings: &[Building], progress: &CancellationToken) -> Result<Self::Output, String>;
}

/// The compiled form of one tile's buildings.
pub trait CompilerOutput {
    type Node;

    /// Distance (meters) inside which the tile should be shown.
    fn set_range(&mut self, range: f64);

    fn is_empty(&self) -> bool;

    fn create_scene_graph(self, session: &Session, settings: &CompilerSettings) -> Option<Self::Node>;
}
