use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid affine transform: {0}")]
    Affine(String),

    #[error("Grid mismatch: {0}")]
    GridMismatch(String),

    #[error("I/O error: {msg}")]
    Io {
        msg: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid input value: {0}")]
    InputValue(String),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl BlockError {
    pub(crate) fn io(msg: impl Into<String>) -> Self {
        Self::Io {
            msg: msg.into(),
            source: None,
        }
    }

    pub(crate) fn io_with(msg: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            msg: msg.into(),
            source: Some(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, BlockError>;
