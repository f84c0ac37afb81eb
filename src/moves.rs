use std::{collections::HashMap, sync::LazyLock};

use shakmaty::{Bitboard, Role, Square, attacks, uci::UciMove};

/// Size of the Maia2 policy head.
pub const VOCABULARY_SIZE: usize = 1880;

/// The fixed move vocabulary of the Maia2 policy head, in output order.
///
/// For every square (a1, b1, ..., h8) the moves of a lone white queen
/// and then a lone white knight standing there, each sorted by target
/// square descending; followed by the 7th-to-8th rank pawn promotions per
/// file (push, capture left, capture right; each to queen, rook, bishop,
/// knight). Promotions for Black are covered by mirroring the board.
pub static ALL_MOVES_ORDERED: LazyLock<Vec<UciMove>> = LazyLock::new(|| {
    let mut all = Vec::with_capacity(VOCABULARY_SIZE);

    for from in Square::ALL {
        for targets in [
            attacks::queen_attacks(from, Bitboard::EMPTY),
            attacks::knight_attacks(from),
        ] {
            let mut to_squares: Vec<Square> = targets.into_iter().collect();
            to_squares.reverse();
            all.extend(to_squares.into_iter().map(|to| UciMove::Normal {
                from,
                to,
                promotion: None,
            }));
        }
    }

    let seventh = &Square::ALL[48..56];
    let eighth = &Square::ALL[56..64];
    for file in 0..8 {
        let from = seventh[file];
        let mut targets = vec![eighth[file]];
        if file > 0 {
            targets.push(eighth[file - 1]);
        }
        if file < 7 {
            targets.push(eighth[file + 1]);
        }
        for to in targets {
            for role in [Role::Queen, Role::Rook, Role::Bishop, Role::Knight] {
                all.push(UciMove::Normal {
                    from,
                    to,
                    promotion: Some(role),
                });
            }
        }
    }

    all
});

/// Mapping from `UciMove` to the corresponding output index.
///
/// Lazily initialized on first access; loaders force it so the first
/// request does not pay for it.
pub static ALL_MOVES: LazyLock<HashMap<UciMove, usize>> = LazyLock::new(|| {
    ALL_MOVES_ORDERED
        .iter()
        .enumerate()
        .map(|(idx, uci)| (uci.clone(), idx))
        .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(uci: &str) -> usize {
        ALL_MOVES[&uci.parse::<UciMove>().unwrap()]
    }

    #[test]
    fn test_all_moves_loaded() {
        assert_eq!(ALL_MOVES_ORDERED.len(), VOCABULARY_SIZE);
        assert_eq!(ALL_MOVES.len(), VOCABULARY_SIZE);
    }

    #[test]
    fn vocabulary_order_starts_from_a1_descending() {
        // queen from a1: h8 is the highest reachable square
        assert_eq!(idx("a1h8"), 0);
        assert_eq!(idx("a1a8"), 1);
        assert_eq!(ALL_MOVES_ORDERED[VOCABULARY_SIZE - 1].to_string(), "h7g8n");
        assert_eq!(idx("a7a8q"), VOCABULARY_SIZE - 22 * 4);
    }

    #[test]
    fn common_moves_are_present() {
        for uci in ["e2e4", "g1f3", "e7e8q", "b7a8n", "e1g1"] {
            assert!(ALL_MOVES.contains_key(&uci.parse::<UciMove>().unwrap()), "{uci}");
        }
    }
}
