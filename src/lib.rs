//! # Card Layout RL
//!
//! Sequential card-placement recommender for a grid layout, trained with a
//! PPO-style policy-gradient loop from replayed user feedback.
//!
//! ## Features
//!
//! - **Environment**: grid occupancy MDP with a fixed-length state encoding
//! - **Actor-Critic**: masked action selection and sequential layout inference
//! - **Training**: GAE, a single-sample online update and a clipped PPO update
//! - **Replay**: trajectory reconstruction from append-only feedback logs
//!
//! ## Usage
//!
//! ```rust,no_run
//! use card_layout_rl::{
//!     config::{PpoConfig, RlConfig},
//!     env::LayoutEnvironment,
//!     neural::PolicyManager,
//! };
//! ```

// ============================================================================
// PUBLIC API MODULES
// ============================================================================

/// Grid, reward and PPO configuration
pub mod config;

/// Placement environment, state encoding and feedback rewards
pub mod env;

/// Actor-critic network, inference and training
pub mod neural;

/// Trajectory reconstruction from feedback logs
pub mod data;

/// Append-only feedback logs and lookup files
pub mod recording;

/// Offline and online training pipelines
pub mod training;

/// Logger initialisation for binaries
pub mod logging;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use config::{AppConfig, PpoConfig, RlConfig, Strictness};
pub use env::{Card, CellPlacement, Feedback, Layout, LayoutEnvironment, UserProfile};
pub use neural::{PolicyManager, SharedPolicy};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Main error type for the layout recommender
#[derive(Debug, thiserror::Error)]
pub enum LayoutRlError {
    #[error("Invalid action {action}: {reason}")]
    InvalidAction { action: usize, reason: String },

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("State dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Model IO error: {0}")]
    ModelIo(String),

    #[error("Training sample error: {0}")]
    TrainingSample(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Torch error: {0}")]
    Tch(#[from] tch::TchError),

    #[error("Logger error: {0}")]
    Logging(#[from] flexi_logger::FlexiLoggerError),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, LayoutRlError>;

// ============================================================================
// LIBRARY VERSION INFO
// ============================================================================

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
