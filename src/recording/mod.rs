//! Feedback recording for offline training.
//!
//! # Components
//!
//! - `events`: reward and layout log rows
//! - `csv_log`: append-only CSV logs with daily rotation
//! - `lookups`: user profile, card and layout JSON files
//! - `recorder`: writes one session's feedback to both logs

pub mod csv_log;
pub mod events;
pub mod lookups;
pub mod recorder;

pub use csv_log::{load_events, log_files, read_events, EventLog};
pub use events::{LayoutEvent, LogRecord, RewardEvent};
pub use lookups::{load_cards, load_layout, load_profiles, ProfileLookup, Suggestion};
pub use recorder::FeedbackRecorder;
