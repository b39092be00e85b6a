use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the frame pipelines, the asset installer and the
/// camera view.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("asset not found: {name} (bundle {bundle})")]
    AssetNotFound { name: String, bundle: PathBuf },

    #[error("malformed cascade file {path}: {source}")]
    CascadeXml {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },

    #[error("invalid cascade file {path}: {reason}")]
    InvalidCascade { path: PathBuf, reason: String },

    #[error("camera view has not been enabled")]
    ViewNotEnabled,

    #[error("no frames available in {0}")]
    EmptySource(PathBuf),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
