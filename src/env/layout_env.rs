//! Placement environment for one layout session.
//!
//! Cards are placed strictly in input order; each step only chooses the cell
//! for the card under the cursor. An instance belongs to exactly one session
//! and is never shared between running episodes.

use crate::config::{RlConfig, Strictness};
use crate::env::card::{Card, CardLookup, UserProfile};
use crate::env::grid::GridState;
use crate::env::reward::{calculate_reward, Feedback};
use crate::env::state::{fit_state_dim, StateRecord};
use crate::{LayoutRlError, Result};

/// Why a step ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Placed,
    OutOfRange,
    Occupied,
    /// Every selected card is already on the grid
    NoCardsLeft,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepInfo {
    pub outcome: StepOutcome,
    pub placed_card_id: Option<String>,
    pub row: usize,
    pub col: usize,
    pub order_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub next_state: Vec<f32>,
    pub reward: f32,
    pub done: bool,
    pub info: StepInfo,
}

pub struct LayoutEnvironment {
    config: RlConfig,
    user_id: String,
    cards: Vec<Card>,
    state: StateRecord,
}

impl LayoutEnvironment {
    pub fn new(config: RlConfig) -> Self {
        let state = StateRecord::new(
            &UserProfile::default(),
            &[],
            config.max_cards,
            GridState::empty(config.rows, config.cols),
        );
        Self {
            config,
            user_id: String::new(),
            cards: Vec::new(),
            state,
        }
    }

    pub fn config(&self) -> &RlConfig {
        &self.config
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Selected cards that resolved in the lookup, in placement order
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn cursor(&self) -> usize {
        self.state.cursor
    }

    pub fn grid(&self) -> &GridState {
        &self.state.grid
    }

    /// Structured state, e.g. as the starting point of layout inference
    pub fn state_record(&self) -> &StateRecord {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        self.state.cursor >= self.cards.len()
    }

    /// Start a new episode and return its initial state vector.
    ///
    /// Ids missing from `card_lookup` are dropped, or rejected under
    /// [`Strictness::FailFast`].
    pub fn reset(
        &mut self,
        user_id: &str,
        card_ids: &[String],
        card_lookup: &CardLookup,
        profile: &UserProfile,
    ) -> Result<Vec<f32>> {
        let mut cards = Vec::with_capacity(card_ids.len());
        for id in card_ids {
            match card_lookup.get(id) {
                Some(card) => cards.push(card.clone()),
                None if self.config.strictness == Strictness::FailFast => {
                    return Err(LayoutRlError::MissingData(format!("card {id} not found")));
                }
                None => log::debug!("Card {} not in lookup, dropped", id),
            }
        }

        self.user_id = user_id.to_string();
        self.state = StateRecord::new(
            profile,
            &cards,
            self.config.max_cards,
            GridState::empty(self.config.rows, self.config.cols),
        );
        self.cards = cards;

        log::debug!(
            "🎮 Environment reset for user {} with {} cards",
            user_id,
            self.cards.len()
        );
        Ok(self.state_vector())
    }

    /// Current observation, always exactly `config.state_dim()` floats
    pub fn state_vector(&self) -> Vec<f32> {
        fit_state_dim(self.state.serialize(), self.config.state_dim())
    }

    /// Cell of `action` if it lies on the grid and is still free
    pub fn check_action(&self, action: usize) -> Result<(usize, usize)> {
        let grid = &self.state.grid;
        let (row, col) = grid.decode(action);
        if !grid.in_bounds(row, col) {
            return Err(LayoutRlError::InvalidAction {
                action,
                reason: format!("({row}, {col}) is outside the {}x{} grid", grid.rows(), grid.cols()),
            });
        }
        if grid.is_occupied(row, col) {
            return Err(LayoutRlError::InvalidAction {
                action,
                reason: format!("cell ({row}, {col}) is already occupied"),
            });
        }
        Ok((row, col))
    }

    /// Place the card under the cursor at cell `action`
    pub fn step(&mut self, action: usize) -> StepResult {
        let (row, col) = self.state.grid.decode(action);
        let mut info = StepInfo {
            outcome: StepOutcome::Placed,
            placed_card_id: None,
            row,
            col,
            order_index: None,
        };

        let (reward, done) = if let Err(e) = self.check_action(action) {
            log::warn!("⚠️ {}", e);
            info.outcome = if self.state.grid.in_bounds(row, col) {
                StepOutcome::Occupied
            } else {
                StepOutcome::OutOfRange
            };
            (self.config.reward_invalid_action, true)
        } else if self.is_done() {
            log::warn!("Step after all {} cards were placed", self.cards.len());
            info.outcome = StepOutcome::NoCardsLeft;
            (0.0, true)
        } else {
            let order_index = self.state.cursor;
            self.state.grid.occupy(row, col);
            self.state.cursor += 1;
            info.placed_card_id = Some(self.cards[order_index].id.clone());
            info.order_index = Some(order_index);
            (self.config.placement_reward, self.is_done())
        };

        StepResult {
            next_state: self.state_vector(),
            reward,
            done,
            info,
        }
    }

    /// Terminal reward for the session's feedback
    pub fn calculate_reward(&self, feedback: &Feedback) -> f32 {
        calculate_reward(&self.config, feedback)
    }
}
