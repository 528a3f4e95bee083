use std::fmt;
use std::sync::Arc;

use crate::srs::SpatialRef;
use crate::style::{ResourceLibrary, StyleSheet};
use crate::terrain::ElevationQuery;

/// Configuration shared by every generation call.
///
/// Built once and handed around behind an `Arc`; nothing mutates it afterwards.
#[derive(Clone, Default)]
pub struct Session {
    styles: Option<Arc<StyleSheet>>,
    map_srs: SpatialRef,
    elevation: Option<Arc<dyn ElevationQuery>>,
}

impl Session {
    pub fn new(map_srs: SpatialRef) -> Self {
        Self {
            map_srs,
            ..Default::default()
        }
    }

    pub fn with_styles(mut self, styles: StyleSheet) -> Self {
        self.styles = Some(Arc::new(styles));
        self
    }

    pub fn with_shared_styles(mut self, styles: Arc<StyleSheet>) -> Self {
        self.styles = Some(styles);
        self
    }

    pub fn with_elevation(mut self, elevation: Arc<dyn ElevationQuery>) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn styles(&self) -> Option<&StyleSheet> {
        self.styles.as_deref()
    }

    pub fn resource_library(&self) -> Option<&ResourceLibrary> {
        self.styles.as_deref().and_then(StyleSheet::resource_library)
    }

    pub fn map_srs(&self) -> SpatialRef {
        self.map_srs
    }

    pub fn elevation(&self) -> Option<&dyn ElevationQuery> {
        self.elevation.as_deref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("styles", &self.styles.as_ref().map(|s| s.styles.len()))
            .field("map_srs", &self.map_srs)
            .field("elevation", &self.elevation.is_some())
            .finish()
    }
}
