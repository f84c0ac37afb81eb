use std::fmt;

use shakmaty::{
    CastlingMode, Chess, Color, EnPassantMode, Position as _, Setup,
    fen::Fen,
};

use crate::error::MaiaError;

/// A board state that passed FEN parsing and legality checks.
///
/// The only ways in are [`Position::parse`] and [`Position::from_chess`];
/// there are no mutating methods.
#[derive(Debug, Clone)]
pub struct Position {
    fen: Fen,
    chess: Chess,
}

impl Position {
    /// Parse and validate a FEN string. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self, MaiaError> {
        let fen: Fen = raw.trim().parse()?;
        let chess: Chess = fen.clone().into_setup().position(CastlingMode::Standard)?;
        Ok(Self { fen, chess })
    }

    /// Wrap a position reached by playing legal moves.
    pub fn from_chess(chess: Chess) -> Self {
        let fen = Fen::from_position(&chess, EnPassantMode::Legal);
        Self { fen, chess }
    }

    pub fn fen(&self) -> String {
        self.fen.to_string()
    }

    /// The raw setup, used for tensor encoding.
    pub fn setup(&self) -> Setup {
        self.fen.clone().into_setup()
    }

    pub fn chess(&self) -> &Chess {
        &self.chess
    }

    pub fn turn(&self) -> Color {
        self.chess.turn()
    }

    pub fn turn_name(&self) -> &'static str {
        if self.turn().is_white() { "white" } else { "black" }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.fen, f)
    }
}
