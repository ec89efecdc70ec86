use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Final position of one card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPlacement {
    pub row: usize,
    pub col: usize,
    /// Position of the card in placement order
    pub order_index: usize,
}

/// card id -> placement
pub type Layout = BTreeMap<String, CellPlacement>;

/// How far a user-edited layout drifted from the suggested one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutComparison {
    pub avg_row_diff: f32,
    pub avg_col_diff: f32,
    /// `avg_row_diff + avg_col_diff`
    pub layout_difference: f32,
    /// `-layout_difference * scale`
    pub layout_reward: f32,
    pub compared_cards: usize,
}

/// Compare the cards present in both layouts; cards only in one are ignored
pub fn compare_layouts(suggested: &Layout, final_layout: &Layout, scale: f32) -> LayoutComparison {
    let (row_total, col_total, compared) = suggested
        .iter()
        .filter_map(|(id, ai)| final_layout.get(id).map(|user| (ai, user)))
        .fold((0usize, 0usize, 0usize), |(r, c, n), (ai, user)| {
            (r + ai.row.abs_diff(user.row), c + ai.col.abs_diff(user.col), n + 1)
        });

    if compared == 0 {
        return LayoutComparison {
            avg_row_diff: 0.0,
            avg_col_diff: 0.0,
            layout_difference: 0.0,
            layout_reward: 0.0,
            compared_cards: 0,
        };
    }

    let avg_row_diff = row_total as f32 / compared as f32;
    let avg_col_diff = col_total as f32 / compared as f32;
    let layout_difference = avg_row_diff + avg_col_diff;
    LayoutComparison {
        avg_row_diff,
        avg_col_diff,
        layout_difference,
        layout_reward: -layout_difference * scale,
        compared_cards: compared,
    }
}
