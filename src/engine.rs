//! Seams between the serving layer and the neural network.
//!
//! [`InferenceEngine`] is the prediction capability, [`ModelLoader`]
//! builds one for a `(variant, device)` pair. The shipped implementation
//! is [`OnnxLoader`], which opens `maia_<variant>.onnx` through ONNX
//! Runtime; tests substitute their own.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, OnceLock};

use serde::Deserialize;

use crate::{
    error::MaiaError,
    maia::Maia,
    moves::ALL_MOVES,
    position::Position,
    types::{Device, EvaluationResult, ModelVariant},
};

pub trait InferenceEngine: Send + Sync {
    /// Policy over legal moves and win probability for the side to move.
    fn predict(
        &self,
        position: &Position,
        elo_self: u32,
        elo_oppo: u32,
    ) -> Result<EvaluationResult, MaiaError>;
}

pub trait ModelLoader: Send + Sync {
    fn load(
        &self,
        variant: ModelVariant,
        device: Device,
    ) -> Result<Arc<dyn InferenceEngine>, MaiaError>;
}

/// Pure-Rust ONNX Runtime backend used to execute the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Tract,
    Candle,
}

static INSTALLED_BACKEND: OnceLock<Backend> = OnceLock::new();

/// Point `ort` at the chosen backend. Only the first call per process has
/// an effect; the backend that won is returned.
pub fn install_backend(backend: Backend) -> Backend {
    *INSTALLED_BACKEND.get_or_init(|| {
        match backend {
            Backend::Tract => ort::set_api(ort_tract::api()),
            Backend::Candle => ort::set_api(ort_candle::api()),
        };
        tracing::debug!(?backend, "installed ONNX backend");
        backend
    })
}

/// Loads Maia2 networks exported to ONNX from a directory.
#[derive(Debug, Clone)]
pub struct OnnxLoader {
    model_dir: PathBuf,
    backend: Backend,
}

impl OnnxLoader {
    pub fn new(model_dir: impl Into<PathBuf>, backend: Backend) -> Self {
        Self {
            model_dir: model_dir.into(),
            backend,
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn artifact_path(&self, variant: ModelVariant) -> PathBuf {
        self.model_dir.join(variant.artifact_name())
    }
}

impl ModelLoader for OnnxLoader {
    fn load(
        &self,
        variant: ModelVariant,
        device: Device,
    ) -> Result<Arc<dyn InferenceEngine>, MaiaError> {
        // tract and candle are both compiled CPU-only here
        if device != Device::Cpu {
            return Err(MaiaError::DeviceUnavailable(device));
        }
        let path = self.artifact_path(variant);
        if !path.is_file() {
            return Err(MaiaError::MissingArtifact(path));
        }
        install_backend(self.backend);
        let maia = Maia::from_file(&path)?;
        // build the move index now rather than on the first request
        let vocabulary = LazyLock::force(&ALL_MOVES).len();
        tracing::debug!(path = %path.display(), vocabulary, "opened ONNX session");
        Ok(Arc::new(maia))
    }
}
