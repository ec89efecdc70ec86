//! Terminal user feedback and its scalar reward.

use crate::config::RlConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Optional layout metrics attached to a feedback event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutDetails {
    pub layout_difference: Option<f32>,
    pub layout_reward: Option<f32>,
    pub related_card_id: Option<String>,
}

/// User response to a suggested layout
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    Save(LayoutDetails),
    Modify(LayoutDetails),
    Regenerate(LayoutDetails),
    /// Any other feedback type; rewarded with 0
    Unknown(String),
}

impl Feedback {
    /// Build from the `feedback_type` string stored in the reward log.
    ///
    /// Only the exact lowercase names are recognised; anything else is
    /// [`Feedback::Unknown`] and earns no reward.
    pub fn from_parts(feedback_type: &str, details: LayoutDetails) -> Self {
        match feedback_type {
            "save" => Feedback::Save(details),
            "modify" => Feedback::Modify(details),
            "regenerate" => Feedback::Regenerate(details),
            other => Feedback::Unknown(other.to_string()),
        }
    }

    pub fn feedback_type(&self) -> &str {
        match self {
            Feedback::Save(_) => "save",
            Feedback::Modify(_) => "modify",
            Feedback::Regenerate(_) => "regenerate",
            Feedback::Unknown(kind) => kind,
        }
    }

    pub fn details(&self) -> Option<&LayoutDetails> {
        match self {
            Feedback::Save(d) | Feedback::Modify(d) | Feedback::Regenerate(d) => Some(d),
            Feedback::Unknown(_) => None,
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.feedback_type())
    }
}

/// Reward for one completed session.
///
/// - `save`: base reward plus `layout_reward` when the user moved cards
///   (`layout_difference > 0`), otherwise plus the AI-followed bonus
/// - `modify`: base penalty minus `layout_difference * modify_penalty_factor`
/// - `regenerate`: fixed penalty
/// - anything else: 0
pub fn calculate_reward(config: &RlConfig, feedback: &Feedback) -> f32 {
    match feedback {
        Feedback::Save(details) => match details.layout_difference {
            Some(diff) if diff > 0.0 => {
                let reward = config.reward_save + details.layout_reward.unwrap_or(0.0);
                log::debug!(
                    "🎯 Save with layout changes: diff={}, reward={}",
                    diff,
                    reward
                );
                reward
            }
            _ => {
                log::debug!("🎯 Save of unchanged suggestion, bonus applied");
                config.reward_save + config.ai_followed_bonus
            }
        },
        Feedback::Modify(details) => {
            let penalty = details
                .layout_difference
                .map_or(0.0, |diff| diff * config.modify_penalty_factor);
            config.reward_modify - penalty
        }
        Feedback::Regenerate(_) => config.reward_regenerate,
        Feedback::Unknown(kind) => {
            log::debug!("Unknown feedback type '{}', reward 0", kind);
            0.0
        }
    }
}
