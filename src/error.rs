//! Error types for the Maia serving library.
//!
//! Two layers are kept apart. [`MaiaError`] wraps everything that can go
//! wrong below the request pipeline: ONNX Runtime, chess parsing, tensor
//! shapes, model artifacts on disk. [`ServiceError`] is the taxonomy the
//! front-ends see; each variant maps to exactly one reporting path
//! (HTTP 400, HTTP 500, CLI re-prompt).

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::Device;

#[derive(Error, Debug)]
pub enum MaiaError {
    /// Wraps an error returned by the underlying ONNX Runtime bindings.
    #[error("ONNX Runtime error: {0}")]
    OrtError(#[from] ort::Error),

    /// The provided FEN string could not be parsed.
    #[error("Invalid FEN: {0}")]
    InvalidFen(#[from] shakmaty::fen::ParseFenError),

    /// A parsed position is invalid from the perspective of `shakmaty`.
    #[error("Invalid Chess Position: {0}")]
    InvalidPosition(#[from] shakmaty::PositionError<shakmaty::Chess>),

    /// Occurs when an ndarray has an unexpected shape during tensor
    /// preparation or extraction.
    #[error("Tensor shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    /// Input slices of a batched evaluation disagree on the batch size.
    #[error("Batch size mismatch: {positions} positions, {elo_selfs} self ratings, {elo_oppos} opponent ratings")]
    BatchMismatch {
        positions: usize,
        elo_selfs: usize,
        elo_oppos: usize,
    },

    /// The `.onnx` artifact for a variant is not where the loader expects it.
    #[error("Model artifact not found at {}", .0.display())]
    MissingArtifact(PathBuf),

    /// No inference backend compiled into this build can run on the device.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(Device),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Download failed with HTTP status {0}")]
    DownloadStatus(reqwest::StatusCode),

    #[error("Model produced a non-finite output")]
    NonFiniteOutput,

    /// A panic escaped a collaborator and was caught at the pipeline boundary.
    #[error("Panic: {0}")]
    Panic(String),
}

/// The request field an [`ServiceError::InvalidInput`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ModelType,
    Fen,
    Elo,
    Device,
    TopK,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::ModelType => "model_type",
            Field::Fen => "fen",
            Field::Elo => "elo",
            Field::Device => "device",
            Field::TopK => "top_k",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Client-caused; always recoverable.
    #[error("invalid input: {field}: {reason}")]
    InvalidInput { field: Field, reason: String },

    /// Infrastructure-caused: missing artifact, device unavailable, corrupt file.
    #[error("model load failed: {0}")]
    ModelLoadFailure(#[source] MaiaError),

    /// Runtime fault raised while predicting.
    #[error("inference failed: {0}")]
    InferenceFailure(#[source] MaiaError),
}

impl ServiceError {
    pub fn invalid(field: Field, reason: impl Into<String>) -> Self {
        ServiceError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// The offending field for client errors, `None` for server-side failures.
    pub fn field(&self) -> Option<Field> {
        match self {
            ServiceError::InvalidInput { field, .. } => Some(*field),
            _ => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, ServiceError::InvalidInput { .. })
    }
}

/// Errors raised while reading a [`crate::ServiceConfig`] from disk.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
