pub mod card;
pub mod grid;
pub mod layout_env;
pub mod placement;
pub mod reward;
pub mod state;

pub use card::{Card, CardLookup, CardRecord, UserProfile};
pub use grid::GridState;
pub use layout_env::{LayoutEnvironment, StepInfo, StepOutcome, StepResult};
pub use placement::{compare_layouts, CellPlacement, Layout, LayoutComparison};
pub use reward::{calculate_reward, Feedback, LayoutDetails};
pub use state::{fit_state_dim, StateRecord};
