//! Interactive terminal session.
//!
//! `assist` prints the model's suggestions for whoever is to move;
//! `play` lets the model answer for one side with its top-ranked move.
//! Every prediction goes through [`RequestPipeline::handle`] with the same
//! clamping and validation as the HTTP APIs.

use std::io::{self, BufRead, Write};

use serde_json::Value;
use shakmaty::{CastlingMode, Chess, Color, Move, Position as _, Square, san::San, uci::UciMove};

use crate::{
    error::ServiceError,
    pipeline::{PredictRequest, RequestPipeline},
    position::Position,
    types::InferenceResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Assist,
    Play,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub mode: Mode,
    /// Side the model plays in [`Mode::Play`].
    pub ai_color: Color,
    pub white_elo: i64,
    pub black_elo: i64,
    pub model_type: Option<String>,
    pub device: Option<String>,
    pub top_k: i64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Assist,
            ai_color: Color::Black,
            white_elo: 1500,
            black_elo: 1500,
            model_type: None,
            device: None,
            top_k: 5,
        }
    }
}

enum Command {
    Quit,
    Suggest,
    Undo,
    Play(Move),
    Invalid,
}

fn parse_move(raw: &str, chess: &Chess) -> Option<Move> {
    if let Some(m) = raw.parse::<San>().ok().and_then(|san| san.to_move(chess).ok()) {
        return Some(m);
    }
    raw.to_ascii_lowercase()
        .parse::<UciMove>()
        .ok()
        .and_then(|uci| uci.to_move(chess).ok())
}

fn parse_command(raw: &str, chess: &Chess) -> Command {
    match raw.to_ascii_lowercase().as_str() {
        "quit" | "exit" => Command::Quit,
        "suggest" => Command::Suggest,
        "undo" => Command::Undo,
        _ => parse_move(raw, chess).map_or(Command::Invalid, Command::Play),
    }
}

fn side_name(color: Color) -> &'static str {
    if color.is_white() { "white" } else { "black" }
}

fn render_board(chess: &Chess) -> String {
    let board = chess.board();
    let mut out = String::new();
    for rank in Square::ALL.chunks(8).rev() {
        let row: Vec<String> = rank
            .iter()
            .map(|&sq| board.piece_at(sq).map_or('.', |p| p.char()).to_string())
            .collect();
        out.push_str(&row.join(" "));
        out.push('\n');
    }
    out
}

/// Key for repetition detection: placement, turn, castling, en passant.
fn repetition_key(chess: &Chess) -> String {
    Position::from_chess(chess.clone())
        .fen()
        .split_whitespace()
        .take(4)
        .collect::<Vec<_>>()
        .join(" ")
}

struct Ply {
    before: Chess,
    uci: UciMove,
}

pub struct Session<'a> {
    pipeline: &'a RequestPipeline,
    options: SessionOptions,
    chess: Chess,
    history: Vec<Ply>,
}

impl<'a> Session<'a> {
    /// Load the requested model up front; a failure here is the caller's
    /// cue to exit with an error.
    pub fn start(
        pipeline: &'a RequestPipeline,
        options: SessionOptions,
    ) -> Result<Self, ServiceError> {
        let model_type: Option<Value> = options.model_type.clone().map(Value::from);
        let device: Option<Value> = options.device.clone().map(Value::from);
        pipeline.init(model_type.as_ref(), device.as_ref())?;
        Ok(Self {
            pipeline,
            options,
            chess: Chess::default(),
            history: Vec::new(),
        })
    }

    /// Moves played so far, in UCI notation.
    pub fn moves(&self) -> Vec<String> {
        self.history.iter().map(|p| p.uci.to_string()).collect()
    }

    fn predict(&self) -> Result<InferenceResult, ServiceError> {
        let white = self.chess.turn().is_white();
        let (elo_self, elo_oppo) = if white {
            (self.options.white_elo, self.options.black_elo)
        } else {
            (self.options.black_elo, self.options.white_elo)
        };
        let mut request = PredictRequest::new(Position::from_chess(self.chess.clone()).fen())
            .elos(elo_self, elo_oppo)
            .top_k(self.options.top_k);
        if let Some(model_type) = &self.options.model_type {
            request = request.model_type(model_type.as_str());
        }
        if let Some(device) = &self.options.device {
            request = request.device(device.as_str());
        }
        self.pipeline.handle(&request)
    }

    fn is_ai_turn(&self) -> bool {
        self.options.mode == Mode::Play && self.chess.turn() == self.options.ai_color
    }

    fn push(&mut self, m: Move) {
        let before = self.chess.clone();
        let uci = m.to_uci(CastlingMode::Standard);
        self.chess.play_unchecked(m);
        self.history.push(Ply { before, uci });
    }

    fn pop(&mut self) -> Option<(UciMove, Color)> {
        let ply = self.history.pop()?;
        let mover = ply.before.turn();
        self.chess = ply.before;
        Some((ply.uci, mover))
    }

    fn game_over(&self) -> Option<(&'static str, &'static str)> {
        let chess = &self.chess;
        if chess.is_checkmate() {
            let result = if chess.turn().is_white() { "0-1" } else { "1-0" };
            return Some((result, "checkmate"));
        }
        if chess.is_stalemate() {
            return Some(("1/2-1/2", "stalemate"));
        }
        if chess.is_insufficient_material() {
            return Some(("1/2-1/2", "insufficient material"));
        }
        if chess.halfmoves() >= 100 {
            return Some(("1/2-1/2", "fifty-move rule"));
        }
        let key = repetition_key(chess);
        let seen = self
            .history
            .iter()
            .filter(|ply| repetition_key(&ply.before) == key)
            .count();
        if seen >= 2 {
            return Some(("1/2-1/2", "threefold repetition"));
        }
        None
    }

    fn print_suggestions<W: Write>(&self, out: &mut W, result: &InferenceResult) -> io::Result<()> {
        writeln!(
            out,
            "Estimated win probability for {}: {:.3}",
            side_name(self.chess.turn()),
            result.win_probability
        )?;
        for (idx, m) in result.ranked_moves.iter().enumerate() {
            writeln!(out, "  {}. {} ({:.3})", idx + 1, m.uci, m.probability)?;
        }
        Ok(())
    }

    fn undo<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        let Some(first) = self.pop() else {
            return writeln!(out, "Nothing to undo.");
        };
        let mut undone = vec![first];
        if self.options.mode == Mode::Play {
            undone.extend(self.pop());
        }
        for (uci, mover) in undone {
            if self.options.mode == Mode::Play && mover == self.options.ai_color {
                writeln!(out, "Undid Maia2 move {uci}.")?;
            } else {
                writeln!(out, "Undid {uci}.")?;
            }
        }
        Ok(())
    }

    /// Run until the game ends, the user quits, or input is exhausted.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut out: W) -> io::Result<()> {
        writeln!(out, "Maia2 session started. Type 'quit' to leave.")?;

        'turns: loop {
            writeln!(out)?;
            write!(out, "{}", render_board(&self.chess))?;
            writeln!(out, "FEN: {}", Position::from_chess(self.chess.clone()))?;

            if let Some((result, reason)) = self.game_over() {
                writeln!(out, "Game over: {result} ({reason}).")?;
                break;
            }

            let prediction = match self.predict() {
                Ok(result) => Some(result),
                Err(e) => {
                    writeln!(out, "Prediction unavailable: {e}")?;
                    None
                }
            };

            if self.is_ai_turn() {
                let best = prediction.as_ref().and_then(|result| {
                    let top = result.ranked_moves.first()?;
                    let m = top.uci.to_move(&self.chess).ok()?;
                    Some((m, top.probability))
                });
                let Some((m, probability)) = best else {
                    writeln!(out, "Maia2 cannot move; ending the session.")?;
                    break;
                };
                if let Some(result) = &prediction {
                    self.print_suggestions(&mut out, result)?;
                }
                writeln!(
                    out,
                    "Maia2 plays {} (p={:.3}).",
                    m.to_uci(CastlingMode::Standard),
                    probability
                )?;
                self.push(m);
                continue;
            }

            if self.options.mode == Mode::Assist {
                if let Some(result) = &prediction {
                    self.print_suggestions(&mut out, result)?;
                }
            }

            loop {
                write!(out, "Your move (SAN or UCI, 'suggest', 'undo', 'quit'): ")?;
                out.flush()?;
                let mut line = String::new();
                if input.read_line(&mut line)? == 0 {
                    writeln!(out)?;
                    writeln!(out, "Session ended.")?;
                    break 'turns;
                }
                let raw = line.trim();
                if raw.is_empty() {
                    continue;
                }
                match parse_command(raw, &self.chess) {
                    Command::Quit => {
                        writeln!(out, "Session ended.")?;
                        break 'turns;
                    }
                    Command::Suggest => match &prediction {
                        Some(result) => self.print_suggestions(&mut out, result)?,
                        None => writeln!(out, "No suggestions available.")?,
                    },
                    Command::Undo => {
                        self.undo(&mut out)?;
                        continue 'turns;
                    }
                    Command::Play(m) => {
                        self.push(m);
                        continue 'turns;
                    }
                    Command::Invalid => writeln!(out, "Invalid move. Try again.")?,
                }
            }
        }

        writeln!(out, "Thanks for using Maia2.")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{PANIC_ELO, fake_pipeline};

    fn play(options: SessionOptions, script: &str) -> (Vec<String>, String) {
        let pipeline = fake_pipeline(0.5, false);
        let mut session = Session::start(&pipeline, options).unwrap();
        let mut out = Vec::new();
        session.run(script.as_bytes(), &mut out).unwrap();
        (session.moves(), String::from_utf8(out).unwrap())
    }

    #[test]
    fn assist_mode_suggests_and_undoes() {
        let (moves, out) = play(SessionOptions::default(), "e4\nsuggest\nundo\nundo\nquit\n");
        assert!(moves.is_empty());
        assert!(out.contains("Estimated win probability for white: 0.500"));
        assert!(out.contains("  5. "));
        assert!(!out.contains("  6. "));
        assert!(out.contains("Undid e2e4."));
        assert!(out.contains("Nothing to undo."));
        assert!(out.contains("Session ended."));
    }

    #[test]
    fn accepts_uci_and_rejects_illegal_moves() {
        let (moves, out) = play(SessionOptions::default(), "e2e5\nE2E4\ne7e5\nquit\n");
        assert_eq!(moves, ["e2e4", "e7e5"]);
        assert!(out.contains("Invalid move. Try again."));
    }

    #[test]
    fn play_mode_engine_opens_as_white() {
        let options = SessionOptions {
            mode: Mode::Play,
            ai_color: Color::White,
            ..SessionOptions::default()
        };
        let (moves, out) = play(options, "quit\n");
        assert_eq!(moves.len(), 1);
        assert!(out.contains("Maia2 plays"));
    }

    #[test]
    fn play_mode_undo_also_pops_engine_reply() {
        let options = SessionOptions {
            mode: Mode::Play,
            ai_color: Color::Black,
            ..SessionOptions::default()
        };
        let (moves, out) = play(options, "e2e4\nundo\nquit\n");
        assert!(moves.is_empty());
        assert!(out.contains("Undid Maia2 move"));
        assert!(out.contains("Undid e2e4."));
    }

    #[test]
    fn checkmate_ends_the_session() {
        let (moves, out) = play(SessionOptions::default(), "f3\ne5\ng4\nQh4\n");
        assert_eq!(moves.len(), 4);
        assert!(out.contains("Game over: 0-1 (checkmate)."));
        assert!(!out.contains("Session ended."));
    }

    #[test]
    fn eof_ends_the_session() {
        let (_, out) = play(SessionOptions::default(), "");
        assert!(out.contains("Session ended."));
        assert!(out.ends_with("Thanks for using Maia2.\n"));
    }

    #[test]
    fn inference_failure_is_not_fatal() {
        let options = SessionOptions {
            white_elo: PANIC_ELO as i64,
            ..SessionOptions::default()
        };
        let (moves, out) = play(options, "e4\nquit\n");
        assert_eq!(moves, ["e2e4"]);
        assert!(out.contains("Prediction unavailable"));
        assert!(out.contains("Estimated win probability for black"));
    }

    #[test]
    fn out_of_range_elo_is_clamped() {
        let options = SessionOptions {
            white_elo: 99_999,
            ..SessionOptions::default()
        };
        let (_, out) = play(options, "quit\n");
        assert!(!out.contains("Prediction unavailable"));
    }

    #[test]
    fn load_failure_prevents_start() {
        let pipeline = fake_pipeline(0.5, true);
        let err = Session::start(&pipeline, SessionOptions::default()).err().unwrap();
        assert!(matches!(err, ServiceError::ModelLoadFailure(_)));
    }

    #[test]
    fn threefold_repetition_is_detected() {
        let script = "Nf3\nNf6\nNg1\nNg8\nNf3\nNf6\nNg1\nNg8\n";
        let (moves, out) = play(SessionOptions::default(), script);
        assert_eq!(moves.len(), 8);
        assert!(out.contains("threefold repetition"));
    }
}
