//! Rows of the feedback and layout logs.

use crate::env::placement::{CellPlacement, Layout};
use crate::env::reward::{Feedback, LayoutDetails};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A row type stored in its own rotating CSV log
pub trait LogRecord: Serialize + DeserializeOwned + Send {
    /// File name prefix, e.g. `reward_events` for `reward_events_20260101.csv`
    const PREFIX: &'static str;

    fn session_id(&self) -> &str;
}

/// Terminal feedback for one layout session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardEvent {
    pub session_id: String,
    pub feedback_type: String,
    #[serde(default)]
    pub layout_difference: Option<f32>,
    #[serde(default)]
    pub layout_reward: Option<f32>,
    #[serde(default)]
    pub related_card_id: Option<String>,
    /// Reward computed when the feedback was recorded
    #[serde(default)]
    pub reward_value: Option<f32>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl RewardEvent {
    pub fn new(session_id: impl Into<String>, feedback: &Feedback) -> Self {
        let details = feedback.details().cloned().unwrap_or_default();
        Self {
            session_id: session_id.into(),
            feedback_type: feedback.feedback_type().to_string(),
            layout_difference: details.layout_difference,
            layout_reward: details.layout_reward,
            related_card_id: details.related_card_id,
            reward_value: None,
            created_at: None,
        }
    }

    pub fn with_reward(mut self, reward: f32) -> Self {
        self.reward_value = Some(reward);
        self
    }

    pub fn feedback(&self) -> Feedback {
        Feedback::from_parts(
            &self.feedback_type,
            LayoutDetails {
                layout_difference: self.layout_difference,
                layout_reward: self.layout_reward,
                related_card_id: self.related_card_id.clone(),
            },
        )
    }
}

impl LogRecord for RewardEvent {
    const PREFIX: &'static str = "reward_events";

    fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Final position of one card in a session's layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEvent {
    pub session_id: String,
    pub user_id: String,
    pub card_id: String,
    pub row: usize,
    pub col: usize,
    pub order_index: usize,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl LayoutEvent {
    pub fn placement(&self) -> CellPlacement {
        CellPlacement {
            row: self.row,
            col: self.col,
            order_index: self.order_index,
        }
    }

    /// One row per card, in placement order
    pub fn from_layout(session_id: &str, user_id: &str, layout: &Layout) -> Vec<Self> {
        let mut events: Vec<Self> = layout
            .iter()
            .map(|(card_id, placement)| Self {
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
                card_id: card_id.clone(),
                row: placement.row,
                col: placement.col,
                order_index: placement.order_index,
                created_at: None,
            })
            .collect();
        events.sort_by_key(|e| e.order_index);
        events
    }
}

impl LogRecord for LayoutEvent {
    const PREFIX: &'static str = "layout_events";

    fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_event_feedback() {
        let event = RewardEvent {
            session_id: "s1".into(),
            feedback_type: "modify".into(),
            layout_difference: Some(2.0),
            layout_reward: None,
            related_card_id: Some("c1".into()),
            reward_value: None,
            created_at: None,
        };
        let feedback = event.feedback();
        assert_eq!(feedback.feedback_type(), "modify");
        assert_eq!(feedback.details().unwrap().layout_difference, Some(2.0));
        assert_eq!(RewardEvent::new("s1", &feedback), event);
    }

    #[test]
    fn test_layout_events_sorted_by_order() {
        let mut layout = Layout::new();
        layout.insert("z".into(), CellPlacement { row: 0, col: 0, order_index: 0 });
        layout.insert("a".into(), CellPlacement { row: 1, col: 2, order_index: 1 });
        let events = LayoutEvent::from_layout("s", "u", &layout);
        assert_eq!(events[0].card_id, "z");
        assert_eq!(events[1].placement(), CellPlacement { row: 1, col: 2, order_index: 1 });
    }
}
