pub mod actor_critic;
pub mod manager;
pub mod model_io;
pub mod policy;
pub mod tensor_conversion;
pub mod training;

// Re-export key components for convenience
pub use actor_critic::ActorCriticNet;
pub use manager::{PolicyManager, SharedPolicy};
pub use policy::ActionChoice;
pub use training::RolloutBatch;
