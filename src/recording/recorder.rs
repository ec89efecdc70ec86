//! Writes one session's feedback to the reward and layout logs.

use crate::config::RlConfig;
use crate::env::placement::Layout;
use crate::env::reward::{calculate_reward, Feedback};
use crate::recording::csv_log::EventLog;
use crate::recording::events::{LayoutEvent, RewardEvent};
use crate::Result;
use chrono::Utc;
use std::path::Path;

pub struct FeedbackRecorder {
    config: RlConfig,
    rewards: EventLog<RewardEvent>,
    layouts: EventLog<LayoutEvent>,
}

impl FeedbackRecorder {
    /// Both logs live in `log_dir`; rewards are computed with `config`
    pub fn new<P: AsRef<Path>>(log_dir: P, config: &RlConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            rewards: EventLog::new(&log_dir)?,
            layouts: EventLog::new(&log_dir)?,
        })
    }

    /// Append the reward row, and the final layout rows when a layout is given.
    ///
    /// The reward row stores the reward computed now, so later config
    /// changes do not rewrite history.
    pub fn record(
        &mut self,
        session_id: &str,
        user_id: &str,
        feedback: &Feedback,
        final_layout: Option<&Layout>,
    ) -> Result<()> {
        let created_at = Utc::now().to_rfc3339();

        if let Some(layout) = final_layout {
            let mut rows = LayoutEvent::from_layout(session_id, user_id, layout);
            for row in &mut rows {
                row.created_at = Some(created_at.clone());
            }
            self.layouts.append_all(&rows)?;
            log::debug!("💾 Layout log: {} cards for session {}", rows.len(), session_id);
        }

        let reward = calculate_reward(&self.config, feedback);
        let mut event = RewardEvent::new(session_id, feedback).with_reward(reward);
        event.created_at = Some(created_at);
        self.rewards.append(&event)?;
        log::info!("💾 Reward log: {} ({}) for session {}", feedback, reward, session_id);

        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.rewards.close()?;
        self.layouts.close()
    }
}
