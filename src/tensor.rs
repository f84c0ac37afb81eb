use ndarray::{Array4, ArrayViewMut3, Axis};
use shakmaty::{CastlingMode, Chess, Role, Setup, Square};

use crate::{error::MaiaError, position::Position};

/// Data produced by the preprocessing step, ready for model consumption.
///
/// - `board_tensor` has shape `[B, 18, 8, 8]` where `B` is the batch
///   size.  The 18 channels encode piece locations, turn, castling
///   rights, and en passant information.
/// - `mirrored` tracks which positions were mirrored to force the
///   model's perspective to always be White.
/// - `chess_positions` holds the corresponding `Chess` objects after
///   any mirroring has been applied.  This is needed when converting
///   the model's output back into UCI moves.
pub struct PreprocessedData {
    pub board_tensor: Array4<f32>,
    pub mirrored: Vec<bool>,
    pub chess_positions: Vec<Chess>,
}

/// Convert ratings to the discrete category indices used by Maia2
/// (0..=10).
///
/// - Ratings below 1100 map to `0`.
/// - Ratings 1100–1999 are bucketed in 100‑point increments.
/// - Ratings 2000 and above map to `10`.
pub fn map_elos_to_categories(elo: &[u32]) -> Vec<i64> {
    elo.iter()
        .map(|&e| {
            if e < 1100 {
                0
            } else if e >= 2000 {
                10
            } else {
                ((e - 1100) / 100 + 1) as i64
            }
        })
        .collect()
}

/// Encode validated positions into the input tensor of the Maia2 model.
pub fn preprocess(positions: &[Position]) -> Result<PreprocessedData, MaiaError> {
    let batch_size = positions.len();
    let mut board_tensor = Array4::<f32>::zeros((batch_size, 18, 8, 8));
    let mut mirrored = Vec::with_capacity(batch_size);
    let mut chess_positions = Vec::with_capacity(batch_size);

    for (i, position) in positions.iter().enumerate() {
        let mut setup = position.setup();
        // Black to move is flipped so the network always sees White to
        // move; outputs are mirrored back afterwards.
        let flip = setup.turn.is_black();
        if flip {
            setup.mirror();
        }
        board_to_tensor(&setup, board_tensor.index_axis_mut(Axis(0), i));
        chess_positions.push(setup.position(CastlingMode::Standard)?);
        mirrored.push(flip);
    }

    Ok(PreprocessedData {
        board_tensor,
        mirrored,
        chess_positions,
    })
}

fn board_to_tensor(setup: &Setup, mut tensor: ArrayViewMut3<f32>) {
    // Piece planes 0..11: white pawn..king, then black pawn..king.
    for sq in Square::ALL {
        if let Some(piece) = setup.board.piece_at(sq) {
            let color_offset = if piece.color.is_white() { 0 } else { 6 };
            let role_offset = match piece.role {
                Role::Pawn => 0,
                Role::Knight => 1,
                Role::Bishop => 2,
                Role::Rook => 3,
                Role::Queen => 4,
                Role::King => 5,
            };
            // rank 1 -> row 0, file a -> column 0
            tensor[[color_offset + role_offset, sq.rank() as usize, sq.file() as usize]] = 1.0;
        }
    }

    tensor
        .index_axis_mut(Axis(0), 12)
        .fill(setup.turn.is_white() as u8 as f32);

    // Castling planes 13..16 are keyed by the original rook squares.
    let castling_rights = [
        setup.castling_rights.contains(Square::H1), // K
        setup.castling_rights.contains(Square::A1), // Q
        setup.castling_rights.contains(Square::H8), // k
        setup.castling_rights.contains(Square::A8), // q
    ];
    for (i, &has_right) in castling_rights.iter().enumerate() {
        tensor
            .index_axis_mut(Axis(0), 13 + i)
            .fill(has_right as u8 as f32);
    }

    if let Some(ep_sq) = setup.ep_square {
        tensor[[17, ep_sq.rank() as usize, ep_sq.file() as usize]] = 1.0;
    }
}
