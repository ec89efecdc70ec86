//! Training data reconstructed from recorded sessions.

pub mod trajectory;

pub use trajectory::{Episode, ReplayReport, SessionOutcome, SkipReason, TrajectoryBuilder, Transition};
