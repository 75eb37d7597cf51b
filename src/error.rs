use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, measuring, or persisting amplifier data.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// An exposure, geometry, or metadata key is absent from the data store.
    #[error("missing data: {what}")]
    MissingData { what: String },
    /// Sensor geometry is malformed or a sampling window does not fit it.
    #[error("invalid geometry: {0}")]
    Geometry(String),
    /// Image planes disagree in shape.
    #[error("shape mismatch: {0}")]
    Shape(String),
    /// Caller asked for something that does not exist (scale type, colormap, ...).
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A stored file exists but does not hold what it should.
    #[error("cannot decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl AnalysisError {
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingData { what: what.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the data conditions that should become a gap instead of aborting.
    pub fn is_data_gap(&self) -> bool {
        matches!(
            self,
            Self::MissingData { .. } | Self::Decode { .. } | Self::Geometry(_) | Self::Shape(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
