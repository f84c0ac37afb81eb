//! Deterministic stand-ins for the ONNX model, shared by unit and
//! integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use shakmaty::{CastlingMode, Position as _};

use crate::{
    cache::ModelVariantCache,
    config::ServiceConfig,
    engine::{InferenceEngine, ModelLoader},
    error::MaiaError,
    pipeline::RequestPipeline,
    position::Position,
    types::{Device, EvaluationResult, ModelVariant, MoveProbability},
};

/// Rating that makes [`FakeEngine`] panic.
pub const PANIC_ELO: u32 = 777;

/// Linearly decreasing policy over legal moves in generation order, so
/// the first legal move is always ranked best.
pub struct FakeEngine {
    pub value: f32,
}

impl InferenceEngine for FakeEngine {
    fn predict(
        &self,
        position: &Position,
        elo_self: u32,
        _elo_oppo: u32,
    ) -> Result<EvaluationResult, MaiaError> {
        if elo_self == PANIC_ELO {
            panic!("engine blew up");
        }
        let moves = position.chess().legal_moves();
        let n = moves.len() as f32;
        let total = n * (n + 1.0) / 2.0;
        Ok(EvaluationResult {
            policy: moves
                .iter()
                .enumerate()
                .map(|(i, m)| MoveProbability {
                    uci: m.to_uci(CastlingMode::Standard),
                    probability: (n - i as f32) / total,
                })
                .collect(),
            value: self.value,
        })
    }
}

pub struct FakeLoader {
    pub value: f32,
    pub fail: bool,
    pub loads: Arc<AtomicUsize>,
}

impl FakeLoader {
    pub fn new(value: f32, fail: bool) -> Self {
        Self {
            value,
            fail,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ModelLoader for FakeLoader {
    fn load(
        &self,
        variant: ModelVariant,
        _: Device,
    ) -> Result<Arc<dyn InferenceEngine>, MaiaError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MaiaError::MissingArtifact(variant.artifact_name().into()));
        }
        Ok(Arc::new(FakeEngine { value: self.value }))
    }
}

pub fn fake_pipeline(value: f32, fail: bool) -> RequestPipeline {
    let cache = Arc::new(ModelVariantCache::new(FakeLoader::new(value, fail)));
    RequestPipeline::new(cache, &ServiceConfig::default())
}
