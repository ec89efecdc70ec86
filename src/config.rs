//! Environment and PPO configuration
//!
//! Both structs are plain serde records with defaults matching the deployed
//! recommender. They are built once at startup (optionally from a JSON file)
//! and shared read-only afterwards.

use crate::{LayoutRlError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of user features in the state vector (satisfaction, diary count)
pub const NUM_USER_FEATURES: usize = 2;

/// Number of features per card (has_image, has_content)
pub const NUM_CARD_FEATURES: usize = 2;

/// How missing card ids or user profiles are treated during reset and replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Drop the unresolved card or session and keep going
    #[default]
    SilentSkip,
    /// Return `LayoutRlError::MissingData`
    FailFast,
}

/// Grid layout and reward configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RlConfig {
    /// Grid rows
    pub rows: usize,
    /// Grid columns
    pub cols: usize,
    /// Card slots in the state vector; extra cards are truncated
    pub max_cards: usize,

    // ========== Feedback rewards ==========
    /// Layout saved by the user
    pub reward_save: f32,
    /// Layout modified before saving
    pub reward_modify: f32,
    /// User asked for a new layout
    pub reward_regenerate: f32,
    /// Bonus on save when the suggestion was kept as-is
    pub ai_followed_bonus: f32,
    /// Penalty per unit of layout difference on modify
    pub modify_penalty_factor: f32,
    /// Reward per unit of layout difference when comparing layouts
    pub layout_reward_scale: f32,

    // ========== Step rewards ==========
    /// Out-of-range or occupied cell
    pub reward_invalid_action: f32,
    /// Successful placement of one card
    pub placement_reward: f32,

    /// Missing lookup handling
    pub strictness: Strictness,
}

impl Default for RlConfig {
    fn default() -> Self {
        Self {
            rows: 3,
            cols: 4,
            max_cards: 12,
            reward_save: 100.0,
            reward_modify: -50.0,
            reward_regenerate: -100.0,
            ai_followed_bonus: 20.0,
            modify_penalty_factor: 10.0,
            layout_reward_scale: 20.0,
            reward_invalid_action: -1000.0,
            placement_reward: 1.0,
            strictness: Strictness::SilentSkip,
        }
    }
}

impl RlConfig {
    /// Config for an arbitrary grid, with one card slot per cell
    pub fn with_grid(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            max_cards: rows * cols,
            ..Default::default()
        }
    }

    pub fn grid_cells(&self) -> usize {
        self.rows * self.cols
    }

    /// Size of the discrete action space (one action per cell)
    pub fn action_dim(&self) -> usize {
        self.grid_cells()
    }

    /// `user + cursor + card count + card block + grid`
    pub fn state_dim(&self) -> usize {
        NUM_USER_FEATURES + 1 + 1 + self.max_cards * NUM_CARD_FEATURES + self.grid_cells()
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(LayoutRlError::Config(format!(
                "grid must be non-empty, got {}x{}",
                self.rows, self.cols
            )));
        }
        if self.max_cards == 0 {
            return Err(LayoutRlError::Config("max_cards must be positive".into()));
        }
        Ok(())
    }
}

/// PPO training hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PpoConfig {
    /// Discount factor
    pub gamma: f32,
    /// GAE lambda
    pub gae_lambda: f32,
    /// Ratio clipping range
    pub clip_epsilon: f64,
    /// Passes over the rollout buffer per update
    pub ppo_epochs: usize,
    /// Minibatch size
    pub batch_size: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Entropy bonus weight
    pub entropy_beta: f64,
    /// Weight of the policy term in `simple_update`
    pub simple_policy_weight: f64,
    /// Element-wise gradient clamp applied before each optimizer step
    pub grad_clip: f64,
    /// Hidden layer widths, shared by actor and critic
    pub hidden_sizes: Vec<i64>,
    /// Seed for minibatch shuffling
    pub seed: u64,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_epsilon: 0.2,
            ppo_epochs: 10,
            batch_size: 64,
            learning_rate: 3e-4,
            entropy_beta: 0.01,
            simple_policy_weight: 0.5,
            grad_clip: 1.0,
            hidden_sizes: vec![256, 128],
            seed: 42,
        }
    }
}

impl PpoConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.gamma) || !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(LayoutRlError::Config(
                "gamma and gae_lambda must lie in [0, 1]".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(LayoutRlError::Config("batch_size must be positive".into()));
        }
        if self.clip_epsilon <= 0.0 {
            return Err(LayoutRlError::Config("clip_epsilon must be positive".into()));
        }
        Ok(())
    }
}

/// Everything read from `--config`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub rl: RlConfig,
    pub ppo: PpoConfig,
}

impl AppConfig {
    /// Load from a JSON file; absent keys keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        log::info!("⚙️ Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.rl.validate()?;
        self.ppo.validate()
    }
}
