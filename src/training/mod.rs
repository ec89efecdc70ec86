pub mod pipeline;

pub use pipeline::{
    batch_train, learn_from_feedback, learning_status, suggest_layout, train_from_episodes,
    train_from_logs, BatchSample, BatchSummary, FeedbackOutcome, LearningStatus, TrainingSummary,
};
