use thiserror::Error;

/// Errors that abort a whole generation call.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The factory was handed no feature cursor
    #[error("No input feature cursor")]
    MissingCursor,

    /// A cancellation token fired between features
    #[error("Operation {0} was cancelled")]
    Cancelled(String),

    #[error("Compile failed: {0}")]
    Compile(String),

    #[error("Unsupported spatial reference: {0}")]
    UnsupportedSrs(String),

    #[error("Invalid expression '{expr}': {reason}")]
    Expression { expr: String, reason: String },

    #[error("Invalid elevation grid: {0}")]
    ElevationGrid(String),

    #[error("Invalid GeoJSON: {0}")]
    GeoJson(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Per-feature data errors. These skip one feature and never abort the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    #[error("feature has no geometry")]
    NoGeometry,

    #[error("feature is not a polygon")]
    NotPolygon,

    #[error("feature geometry is invalid")]
    InvalidGeometry,

    #[error("cannot reproject feature: {0}")]
    Reprojection(String),

    #[error("footprint has fewer than 3 distinct points")]
    DegenerateFootprint,

    #[error("catalog produced no buildings")]
    NoCatalogMatch,
}

pub type Result<T> = std::result::Result<T, BuildError>;
