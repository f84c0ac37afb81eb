use crate::types::{EvaluationResult, InferenceResult, ModelVariant, RatingPair};

/// Rank the engine's policy and cut it to `top_k` entries.
///
/// `top_k` below 1 is treated as 1. The sort is stable, so moves with
/// equal probability stay in the order the engine emitted them.
pub fn assemble(
    variant: ModelVariant,
    ratings: RatingPair,
    evaluation: EvaluationResult,
    top_k: usize,
) -> InferenceResult {
    let mut ranked_moves = evaluation.policy;
    ranked_moves.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    ranked_moves.truncate(top_k.max(1));

    InferenceResult {
        variant,
        ratings,
        win_probability: evaluation.value.clamp(0.0, 1.0),
        ranked_moves,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MoveProbability;
    use shakmaty::uci::UciMove;

    const RATINGS: RatingPair = RatingPair {
        own: 1500,
        opponent: 1500,
    };

    fn evaluation(moves: &[(&str, f32)]) -> EvaluationResult {
        EvaluationResult {
            policy: moves
                .iter()
                .map(|(uci, p)| MoveProbability {
                    uci: uci.parse::<UciMove>().unwrap(),
                    probability: *p,
                })
                .collect(),
            value: 0.55,
        }
    }

    fn ucis(result: &InferenceResult) -> Vec<String> {
        result.ranked_moves.iter().map(|m| m.uci.to_string()).collect()
    }

    #[test]
    fn sorts_descending_and_truncates() {
        let eval = evaluation(&[("a2a3", 0.1), ("e2e4", 0.5), ("d2d4", 0.3), ("g1f3", 0.1)]);
        let result = assemble(ModelVariant::Rapid, RATINGS, eval, 3);

        assert_eq!(ucis(&result), ["e2e4", "d2d4", "a2a3"]);
        assert_eq!(result.win_probability, 0.55);
        assert_eq!(result.variant, ModelVariant::Rapid);
    }

    #[test]
    fn ties_keep_engine_order() {
        let eval = evaluation(&[("h2h3", 0.2), ("a2a3", 0.2), ("e2e4", 0.4), ("b2b3", 0.2)]);
        let result = assemble(ModelVariant::Blitz, RATINGS, eval, 10);
        assert_eq!(ucis(&result), ["e2e4", "h2h3", "a2a3", "b2b3"]);
    }

    #[test]
    fn length_is_min_of_top_k_and_distribution() {
        let moves = [("a2a3", 0.05), ("b2b3", 0.25), ("c2c3", 0.15), ("d2d3", 0.35), ("e2e3", 0.2)];
        for top_k in 0..8 {
            let result = assemble(ModelVariant::Rapid, RATINGS, evaluation(&moves), top_k);
            assert_eq!(result.ranked_moves.len(), top_k.max(1).min(moves.len()));
            assert!(
                result
                    .ranked_moves
                    .windows(2)
                    .all(|w| w[0].probability >= w[1].probability)
            );
        }
    }

    #[test]
    fn empty_distribution_and_out_of_range_value() {
        let mut eval = evaluation(&[]);
        eval.value = 1.3;
        let result = assemble(ModelVariant::Rapid, RATINGS, eval, 5);
        assert!(result.ranked_moves.is_empty());
        assert_eq!(result.win_probability, 1.0);
    }
}
