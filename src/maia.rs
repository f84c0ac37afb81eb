use std::path::Path;

use ndarray::{ArrayView1, Axis, Ix1, Ix2};
use ort::{session::Session, value::Tensor};
use parking_lot::Mutex;
use shakmaty::{CastlingMode, Chess, Position as _};

use crate::{
    engine::InferenceEngine,
    error::MaiaError,
    moves::ALL_MOVES,
    position::Position,
    tensor::{map_elos_to_categories, preprocess},
    types::{EvaluationResult, MoveProbability},
};

/// A Maia2 network running in an ONNX Runtime session.
///
/// `Session::run` needs exclusive access, so concurrent callers take
/// turns on the inner lock.
pub struct Maia {
    session: Mutex<Session>,
}

impl Maia {
    /// Initialize from a local `.onnx` file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MaiaError> {
        let session = Session::builder()?.commit_from_file(path)?;

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Initialize from raw bytes
    pub fn from_memory(model_bytes: &[u8]) -> Result<Self, MaiaError> {
        let session = Session::builder()?.commit_from_memory(model_bytes)?;

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    pub fn evaluate(
        &self,
        position: &Position,
        elo_self: u32,
        elo_oppo: u32,
    ) -> Result<EvaluationResult, MaiaError> {
        let mut results =
            self.batch_evaluate(std::slice::from_ref(position), &[elo_self], &[elo_oppo])?;
        results
            .pop()
            .ok_or(MaiaError::BatchMismatch {
                positions: 1,
                elo_selfs: 1,
                elo_oppos: 1,
            })
    }

    /// All three slices must have the same length, the batch size.
    /// Ratings are bucketed by [`map_elos_to_categories`].
    pub fn batch_evaluate(
        &self,
        positions: &[Position],
        elo_selfs: &[u32],
        elo_oppos: &[u32],
    ) -> Result<Vec<EvaluationResult>, MaiaError> {
        let batch_size = positions.len();
        if elo_selfs.len() != batch_size || elo_oppos.len() != batch_size {
            return Err(MaiaError::BatchMismatch {
                positions: batch_size,
                elo_selfs: elo_selfs.len(),
                elo_oppos: elo_oppos.len(),
            });
        }

        let data = preprocess(positions)?;
        let elo_selfs = map_elos_to_categories(elo_selfs);
        let elo_oppos = map_elos_to_categories(elo_oppos);

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs! {
                "boards" => Tensor::from_array(data.board_tensor)?,
                "elo_self" => Tensor::from_array(([batch_size], elo_selfs))?,
                "elo_oppo" => Tensor::from_array(([batch_size], elo_oppos))?,
        })?;

        let logits_maia = outputs["logits_maia"]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix2>()?;
        let logits_value = outputs["logits_value"]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix1>()?;

        let results = (0..batch_size)
            .map(|i| {
                Self::process_output(
                    logits_maia.index_axis(Axis(0), i),
                    logits_value[[i]],
                    &data.chess_positions[i],
                    data.mirrored[i],
                )
            })
            .collect();

        Ok(results)
    }

    /// Softmax over the legal moves only, in legal-move generation order.
    fn process_output(
        logits_maia: ArrayView1<f32>,
        raw_value: f32,
        chess: &Chess,
        mirrored: bool,
    ) -> EvaluationResult {
        // value head is from White's view; mirrored boards were Black to move
        let mut win_prob = (raw_value / 2.0 + 0.5).clamp(0.0, 1.0);
        if mirrored {
            win_prob = 1.0 - win_prob;
        }

        let legal_moves = chess.legal_moves();
        let mut max_logit = f32::NEG_INFINITY;
        let mut move_data = Vec::with_capacity(legal_moves.len());

        for m in &legal_moves {
            let uci = m.to_uci(CastlingMode::Standard);
            let Some(&idx) = ALL_MOVES.get(&uci) else {
                continue;
            };
            let logit = logits_maia[idx];
            max_logit = max_logit.max(logit);
            // report the move on the real, unmirrored board
            let actual_uci = if mirrored { uci.to_mirrored() } else { uci };
            move_data.push((actual_uci, logit));
        }

        let exps: Vec<f32> = move_data
            .iter()
            .map(|&(_, logit)| (logit - max_logit).exp())
            .collect();
        let sum_exp: f32 = exps.iter().sum();

        let policy = move_data
            .into_iter()
            .zip(exps)
            .map(|((uci, _), exp)| MoveProbability {
                uci,
                probability: exp / sum_exp,
            })
            .collect();

        EvaluationResult {
            policy,
            value: win_prob,
        }
    }
}

impl InferenceEngine for Maia {
    fn predict(
        &self,
        position: &Position,
        elo_self: u32,
        elo_oppo: u32,
    ) -> Result<EvaluationResult, MaiaError> {
        self.evaluate(position, elo_self, elo_oppo)
    }
}
