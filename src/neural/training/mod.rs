pub mod gae;
pub mod gradient_clipping;
pub mod trainer;

pub use gae::compute_advantages_and_returns;
pub use trainer::{ppo_update, simple_update, RolloutBatch};
