//! Structured environment state and its fixed-length vector encoding.
//!
//! Vector layout (`max_cards = M`, grid `R x C`):
//!
//! ```text
//! [ satisfaction, diaries/100 | cursor/M | count/M | M x (has_image, has_content) | R*C grid bits ]
//! ```
//!
//! Inference and replay mutate the record and call [`StateRecord::serialize`]
//! again rather than patching offsets in an existing vector.

use crate::config::{NUM_CARD_FEATURES, NUM_USER_FEATURES};
use crate::env::card::{Card, UserProfile};
use crate::env::grid::GridState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub user: [f32; NUM_USER_FEATURES],
    /// Index of the next card awaiting placement
    pub cursor: usize,
    /// Features of the selected cards, in placement order
    pub cards: Vec<[f32; NUM_CARD_FEATURES]>,
    pub max_cards: usize,
    pub grid: GridState,
}

impl StateRecord {
    pub fn new(profile: &UserProfile, cards: &[Card], max_cards: usize, grid: GridState) -> Self {
        Self {
            user: profile.features(),
            cursor: 0,
            cards: cards.iter().map(Card::features).collect(),
            max_cards,
            grid,
        }
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    /// Length of the vector produced by [`serialize`](Self::serialize)
    pub fn encoded_len(&self) -> usize {
        NUM_USER_FEATURES + 2 + self.max_cards * NUM_CARD_FEATURES + self.grid.len()
    }

    /// Encode the record; the card block is zero-padded or truncated to `max_cards`
    pub fn serialize(&self) -> Vec<f32> {
        let scale = self.max_cards.max(1) as f32;
        let mut out = Vec::with_capacity(self.encoded_len());

        out.extend_from_slice(&self.user);
        out.push(self.cursor as f32 / scale);
        out.push(self.card_count() as f32 / scale);

        let card_block = self.max_cards * NUM_CARD_FEATURES;
        let start = out.len();
        out.extend(self.cards.iter().flatten().copied().take(card_block));
        out.resize(start + card_block, 0.0);

        out.extend(self.grid.features());
        out
    }
}

/// Pad with zeros or truncate `vector` to exactly `dim`, warning on mismatch
pub fn fit_state_dim(mut vector: Vec<f32>, dim: usize) -> Vec<f32> {
    if vector.len() != dim {
        log::warn!(
            "⚠️ State vector dimension mismatch: expected {}, got {}",
            dim,
            vector.len()
        );
        vector.resize(dim, 0.0);
    }
    vector
}
