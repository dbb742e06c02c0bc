//! Game service — the authoritative Amdavad board state.
//!
//! DESIGN
//! ======
//! `GameStore` owns the single `GameState` for the process and exposes the
//! four operations clients can trigger: roll, move/place, reset, snapshot.
//! Every operation is synchronous and completes before the caller releases
//! the channel lock, so mutations are applied one at a time in arrival order.
//!
//! Operations return the payload the dispatcher broadcasts (`DiceRolled`,
//! `TokensUpdated`, or the full state) rather than sending anything
//! themselves.
//!
//! INVARIANTS
//! ==========
//! - `white_count` always equals the number of white faces in `dice`.
//! - `roll_history` holds at most `HISTORY_LIMIT` entries, oldest first.
//! - Token centres stay within `[radius, extent - radius]` on both axes.
//! - Per color, `available_tokens + placed tokens == tokens_per_color`.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::BoardGeometry;
use crate::frame::Frame;
use crate::services::hub::Store;

// =============================================================================
// CONSTANTS
// =============================================================================

pub const DICE_COUNT: usize = 4;

/// Maximum retained roll entries.
pub const HISTORY_LIMIT: usize = 5;

/// Steps awarded for a roll that shows no white face.
pub const ZERO_WHITE_SCORE: u8 = 8;

pub const EVENT_GAME_STATE: &str = "game_state";
pub const EVENT_DICE_ROLLED: &str = "dice_rolled";
pub const EVENT_TOKENS_UPDATED: &str = "tokens_updated";
pub const EVENT_GAME_RESET: &str = "game_reset";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Blue,
    Green,
    Yellow,
}

impl Color {
    pub const ALL: [Color; 4] = [Color::Red, Color::Blue, Color::Green, Color::Yellow];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Blue => "blue",
            Color::Green => "green",
            Color::Yellow => "yellow",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a two-faced die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Face {
    White,
    Black,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub color: Color,
    pub x: f64,
    pub y: f64,
}

/// Immutable record of one roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollEntry {
    pub roll_number: u64,
    pub dice: [Face; DICE_COUNT],
    /// White faces showing.
    pub count: u8,
    /// Steps the roll is worth: `count`, or `ZERO_WHITE_SCORE` for no whites.
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub tokens: Vec<Token>,
    pub dice: [Face; DICE_COUNT],
    pub roll_history: VecDeque<RollEntry>,
    pub white_count: u8,
    pub move_count: u64,
    /// Tokens of each color not yet placed on the board.
    pub available_tokens: BTreeMap<Color, u32>,
}

impl GameState {
    /// Initial state: empty board, full pools, all dice white, no history.
    #[must_use]
    pub fn new(tokens_per_color: u32) -> Self {
        Self {
            tokens: Vec::new(),
            dice: [Face::White; DICE_COUNT],
            roll_history: VecDeque::with_capacity(HISTORY_LIMIT),
            white_count: 0,
            move_count: 0,
            available_tokens: Color::ALL.iter().map(|&c| (c, tokens_per_color)).collect(),
        }
    }
}

/// A validated `move_token` request.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenMove {
    /// Take a token of `color` from the pool and drop it at `(x, y)`.
    Place { color: Color, x: f64, y: f64 },
    /// Reposition an already placed token.
    Move { token_id: String, x: f64, y: f64 },
}

/// Broadcast payload for `dice_rolled`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiceRolled {
    pub dice: [Face; DICE_COUNT],
    pub white_count: u8,
    pub score: u8,
    pub move_count: u64,
    pub roll_history: Vec<RollEntry>,
}

/// Broadcast payload for `tokens_updated`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokensUpdated {
    pub tokens: Vec<Token>,
    pub move_count: u64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GameError {
    #[error("no {0} tokens left to place")]
    PoolExhausted(Color),
    #[error("token not found: {0}")]
    TokenNotFound(String),
}

impl crate::frame::ErrorCode for GameError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::PoolExhausted(_) => "E_POOL_EXHAUSTED",
            Self::TokenNotFound(_) => "E_TOKEN_NOT_FOUND",
        }
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Single owner of the game state.
#[derive(Debug, Clone)]
pub struct GameStore {
    state: GameState,
    geometry: BoardGeometry,
    tokens_per_color: u32,
}

impl GameStore {
    #[must_use]
    pub fn new(geometry: BoardGeometry, tokens_per_color: u32) -> Self {
        Self { state: GameState::new(tokens_per_color), geometry, tokens_per_color }
    }

    /// Current full snapshot.
    #[cfg(test)]
    #[must_use]
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Remaining pool for `color`.
    #[must_use]
    pub fn available(&self, color: Color) -> u32 {
        self.state
            .available_tokens
            .get(&color)
            .copied()
            .unwrap_or(0)
    }

    /// Roll all dice with the thread-local RNG.
    pub fn roll_dice(&mut self) -> DiceRolled {
        self.roll_dice_with(&mut rand::rng())
    }

    /// Roll all dice with a caller-supplied RNG. Each die is a fair coin.
    pub fn roll_dice_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> DiceRolled {
        let dice = std::array::from_fn(|_| if rng.random::<bool>() { Face::White } else { Face::Black });
        self.apply_roll(dice)
    }

    /// Record a roll with known faces.
    pub fn apply_roll(&mut self, dice: [Face; DICE_COUNT]) -> DiceRolled {
        let white_count = count_white(&dice);
        let score = score_for(white_count);

        self.state.dice = dice;
        self.state.white_count = white_count;
        self.state.move_count += 1;

        if self.state.roll_history.len() == HISTORY_LIMIT {
            self.state.roll_history.pop_front();
        }
        self.state.roll_history.push_back(RollEntry {
            roll_number: self.state.move_count,
            dice,
            count: white_count,
            score,
        });

        DiceRolled {
            dice,
            white_count,
            score,
            move_count: self.state.move_count,
            roll_history: self.state.roll_history.iter().cloned().collect(),
        }
    }

    /// Place a new token or reposition an existing one.
    ///
    /// # Errors
    ///
    /// `PoolExhausted` when placing a color with nothing left; `TokenNotFound`
    /// when moving an id that is not on the board. Neither changes state.
    pub fn move_token(&mut self, request: TokenMove) -> Result<TokensUpdated, GameError> {
        match request {
            TokenMove::Place { color, x, y } => {
                let remaining = self.available(color);
                if remaining == 0 {
                    return Err(GameError::PoolExhausted(color));
                }
                let index = self.tokens_per_color.saturating_sub(remaining);
                let (x, y) = self.clamp(x, y);
                self.state.available_tokens.insert(color, remaining - 1);
                self.state.tokens.push(Token { id: format!("{color}-{index}"), color, x, y });
            }
            TokenMove::Move { token_id, x, y } => {
                let Some(pos) = self.state.tokens.iter().position(|t| t.id == token_id) else {
                    return Err(GameError::TokenNotFound(token_id));
                };
                let (x, y) = self.clamp(x, y);
                let mut token = self.state.tokens.remove(pos);
                token.x = x;
                token.y = y;
                self.state.tokens.push(token);
            }
        }

        Ok(TokensUpdated { tokens: self.state.tokens.clone(), move_count: self.state.move_count })
    }

    /// Restore the initial state.
    pub fn reset(&mut self) -> &GameState {
        self.state = GameState::new(self.tokens_per_color);
        &self.state
    }

    /// Clamp a token centre so the whole token stays on the canvas.
    #[must_use]
    pub fn clamp(&self, x: f64, y: f64) -> (f64, f64) {
        let BoardGeometry { width, height, token_radius: r } = self.geometry;
        (x.max(r).min(width - r), y.max(r).min(height - r))
    }
}

impl Store for GameStore {
    fn snapshot(&self) -> Frame {
        Frame::from_payload(EVENT_GAME_STATE, &self.state)
    }
}

fn count_white(dice: &[Face]) -> u8 {
    let whites = dice.iter().filter(|&&d| d == Face::White).count();
    u8::try_from(whites).unwrap_or(u8::MAX)
}

/// Steps a roll is worth.
#[must_use]
pub fn score_for(white_count: u8) -> u8 {
    if white_count == 0 { ZERO_WHITE_SCORE } else { white_count }
}

#[cfg(test)]
#[path = "game_test.rs"]
mod tests;
