//! Episode reconstruction from the feedback and layout logs.
//!
//! Each rewarded session is replayed through a fresh [`LayoutEnvironment`]:
//! the logged final position of every card is taken as the chosen action, in
//! `order_index` order. The session's feedback reward is added onto the last
//! transition.

use crate::config::{RlConfig, Strictness};
use crate::env::card::CardLookup;
use crate::env::layout_env::{LayoutEnvironment, StepOutcome};
use crate::recording::events::{LayoutEvent, LogRecord, RewardEvent};
use crate::recording::lookups::ProfileLookup;
use crate::{LayoutRlError, Result};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Vec<f32>,
    pub action: usize,
    pub reward: f32,
    pub done: bool,
    /// Free cells when the action was taken
    pub available: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub session_id: String,
    pub user_id: String,
    pub transitions: Vec<Transition>,
    /// `false` when a logged position collided or fell outside the grid
    pub valid: bool,
    pub feedback_reward: f32,
}

impl Episode {
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn states(&self) -> Vec<Vec<f32>> {
        self.transitions.iter().map(|t| t.state.clone()).collect()
    }

    pub fn actions(&self) -> Vec<usize> {
        self.transitions.iter().map(|t| t.action).collect()
    }

    pub fn rewards(&self) -> Vec<f32> {
        self.transitions.iter().map(|t| t.reward).collect()
    }

    pub fn dones(&self) -> Vec<bool> {
        self.transitions.iter().map(|t| t.done).collect()
    }

    pub fn masks(&self) -> Vec<Vec<usize>> {
        self.transitions.iter().map(|t| t.available.clone()).collect()
    }

    pub fn total_reward(&self) -> f32 {
        self.transitions.iter().map(|t| t.reward).sum()
    }
}

/// Why a rewarded session produced no episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoLayout,
    NoProfile,
    NoCards,
    /// The first logged position was already outside the grid
    NoPlacements,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Replayed(Episode),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Distinct rewarded sessions
    pub total: usize,
    /// Sessions that produced an episode
    pub processed: usize,
    pub skipped_no_layout: usize,
    pub skipped_no_profile: usize,
    pub skipped_no_cards: usize,
    pub skipped_no_placements: usize,
    /// Processed episodes flagged invalid
    pub invalid: usize,
}

impl ReplayReport {
    fn record(&mut self, outcome: &SessionOutcome) {
        match outcome {
            SessionOutcome::Replayed(episode) => {
                self.processed += 1;
                if !episode.valid {
                    self.invalid += 1;
                }
            }
            SessionOutcome::Skipped(SkipReason::NoLayout) => self.skipped_no_layout += 1,
            SessionOutcome::Skipped(SkipReason::NoProfile) => self.skipped_no_profile += 1,
            SessionOutcome::Skipped(SkipReason::NoCards) => self.skipped_no_cards += 1,
            SessionOutcome::Skipped(SkipReason::NoPlacements) => self.skipped_no_placements += 1,
        }
    }
}

impl fmt::Display for ReplayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {} of {} sessions (no layout: {}, no profile: {}, no cards: {}, no placements: {}, invalid: {})",
            self.processed,
            self.total,
            self.skipped_no_layout,
            self.skipped_no_profile,
            self.skipped_no_cards,
            self.skipped_no_placements,
            self.invalid
        )
    }
}

/// Joins reward and layout logs into training episodes
pub struct TrajectoryBuilder<'a> {
    config: &'a RlConfig,
    profiles: &'a ProfileLookup,
    cards: &'a CardLookup,
}

impl<'a> TrajectoryBuilder<'a> {
    pub fn new(config: &'a RlConfig, profiles: &'a ProfileLookup, cards: &'a CardLookup) -> Self {
        Self {
            config,
            profiles,
            cards,
        }
    }

    /// Replay every rewarded session, in parallel.
    ///
    /// A session rewarded more than once uses its last reward event. Episodes
    /// come back in the log order of those events.
    pub fn build(
        &self,
        rewards: &[RewardEvent],
        layouts: &[LayoutEvent],
    ) -> Result<(Vec<Episode>, ReplayReport)> {
        let sessions = latest_rewards(rewards);
        let grouped = group_layouts(layouts);

        let outcomes: Vec<SessionOutcome> = sessions
            .par_iter()
            .map(|reward| {
                let events = grouped.get(reward.session_id.as_str()).map(Vec::as_slice);
                self.replay_session(reward, events.unwrap_or(&[]))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut report = ReplayReport {
            total: sessions.len(),
            ..Default::default()
        };
        let mut episodes = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            report.record(&outcome);
            if let SessionOutcome::Replayed(episode) = outcome {
                episodes.push(episode);
            }
        }

        log::info!("🔁 Replay: {}", report);
        Ok((episodes, report))
    }

    /// Replay one session from its layout rows (any order)
    pub fn replay_session(&self, reward: &RewardEvent, events: &[&LayoutEvent]) -> Result<SessionOutcome> {
        let session_id = reward.session_id.as_str();
        let fail_fast = self.config.strictness == Strictness::FailFast;

        let Some(first) = events.first() else {
            if fail_fast {
                return Err(LayoutRlError::MissingData(format!("no layout for session {session_id}")));
            }
            log::debug!("Session {} has no layout rows, skipped", session_id);
            return Ok(SessionOutcome::Skipped(SkipReason::NoLayout));
        };
        let user_id = first.user_id.as_str();

        let Some(profile) = self.profiles.get(user_id) else {
            if fail_fast {
                return Err(LayoutRlError::MissingData(format!(
                    "no profile for user {user_id} (session {session_id})"
                )));
            }
            log::debug!("Session {}: user {} not found, skipped", session_id, user_id);
            return Ok(SessionOutcome::Skipped(SkipReason::NoProfile));
        };

        let mut ordered: Vec<&LayoutEvent> = events.to_vec();
        ordered.sort_by_key(|e| e.order_index);
        let mut seen = HashSet::new();
        ordered.retain(|e| seen.insert(e.card_id.as_str()));

        let card_ids: Vec<String> = ordered.iter().map(|e| e.card_id.clone()).collect();
        let mut env = LayoutEnvironment::new(self.config.clone());
        env.reset(user_id, &card_ids, self.cards, profile)?;

        // the environment dropped unknown cards; their logged positions go too
        ordered.retain(|e| self.cards.contains_key(&e.card_id));
        if ordered.is_empty() {
            log::debug!("Session {}: no known cards, skipped", session_id);
            return Ok(SessionOutcome::Skipped(SkipReason::NoCards));
        }

        let mut transitions: Vec<Transition> = Vec::with_capacity(ordered.len());
        let mut valid = true;

        for event in &ordered {
            let state = env.state_vector();
            let available = env.grid().available_actions();

            let Some(action) = env.grid().encode(event.row, event.col) else {
                log::warn!(
                    "⚠️ Session {}: card {} logged at ({}, {}), outside the grid",
                    session_id,
                    event.card_id,
                    event.row,
                    event.col
                );
                valid = false;
                if let Some(last) = transitions.last_mut() {
                    last.done = true;
                }
                break;
            };

            let result = env.step(action);
            let placed = result.info.outcome == StepOutcome::Placed;
            transitions.push(Transition {
                state,
                action,
                reward: result.reward,
                done: result.done,
                available,
            });

            if !placed {
                log::warn!(
                    "⚠️ Session {}: card {} collides at ({}, {})",
                    session_id,
                    event.card_id,
                    event.row,
                    event.col
                );
                valid = false;
                break;
            }
            if result.done {
                break;
            }
        }

        let Some(last) = transitions.last_mut() else {
            log::debug!("Session {}: no placement could be replayed, skipped", session_id);
            return Ok(SessionOutcome::Skipped(SkipReason::NoPlacements));
        };
        let feedback_reward = env.calculate_reward(&reward.feedback());
        last.reward += feedback_reward;

        Ok(SessionOutcome::Replayed(Episode {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            transitions,
            valid,
            feedback_reward,
        }))
    }
}

/// One reward event per session (the last logged), ordered by that event's position
fn latest_rewards(rewards: &[RewardEvent]) -> Vec<&RewardEvent> {
    let mut last: HashMap<&str, usize> = HashMap::new();
    for (idx, event) in rewards.iter().enumerate() {
        last.insert(event.session_id(), idx);
    }
    let mut indices: Vec<usize> = last.into_values().collect();
    indices.sort_unstable();
    indices.into_iter().map(|idx| &rewards[idx]).collect()
}

fn group_layouts(layouts: &[LayoutEvent]) -> HashMap<&str, Vec<&LayoutEvent>> {
    let mut grouped: HashMap<&str, Vec<&LayoutEvent>> = HashMap::new();
    for event in layouts {
        grouped.entry(event.session_id()).or_default().push(event);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::card::{Card, UserProfile};
    use assert_matches::assert_matches;

    fn fixtures() -> (ProfileLookup, CardLookup) {
        let profiles = [("u1".to_string(), UserProfile::default())].into_iter().collect();
        let cards = ["a", "b", "c"]
            .iter()
            .map(|id| (id.to_string(), Card::new(*id, true, false)))
            .collect();
        (profiles, cards)
    }

    fn reward(session: &str, kind: &str) -> RewardEvent {
        RewardEvent {
            session_id: session.into(),
            feedback_type: kind.into(),
            layout_difference: Some(0.0),
            layout_reward: None,
            related_card_id: None,
            reward_value: None,
            created_at: None,
        }
    }

    fn layout(session: &str, card: &str, row: usize, col: usize, order_index: usize) -> LayoutEvent {
        LayoutEvent {
            session_id: session.into(),
            user_id: "u1".into(),
            card_id: card.into(),
            row,
            col,
            order_index,
            created_at: None,
        }
    }

    #[test]
    fn test_valid_replay() {
        let config = RlConfig::default();
        let (profiles, cards) = fixtures();
        let builder = TrajectoryBuilder::new(&config, &profiles, &cards);
        let layouts = vec![layout("s", "b", 0, 1, 1), layout("s", "a", 0, 0, 0), layout("s", "c", 2, 3, 2)];

        let (episodes, report) = builder.build(&[reward("s", "save")], &layouts).unwrap();
        assert_eq!(report.processed, 1);
        let episode = &episodes[0];
        assert!(episode.valid);
        assert_eq!(episode.actions(), vec![0, 1, 11]);
        assert_eq!(episode.dones(), vec![false, false, true]);
        assert_eq!(episode.rewards(), vec![1.0, 1.0, 121.0]);
        assert_eq!(episode.transitions[1].available.len(), 11);
        assert!(!episode.transitions[1].available.contains(&0));
    }

    #[test]
    fn test_collision_marks_episode_invalid() {
        let config = RlConfig::default();
        let (profiles, cards) = fixtures();
        let builder = TrajectoryBuilder::new(&config, &profiles, &cards);
        let layouts = vec![layout("s", "a", 1, 1, 0), layout("s", "b", 1, 1, 1), layout("s", "c", 0, 0, 2)];

        let (episodes, report) = builder.build(&[reward("s", "regenerate")], &layouts).unwrap();
        assert_eq!(report.invalid, 1);
        let episode = &episodes[0];
        assert!(!episode.valid);
        assert_eq!(episode.len(), 2);
        assert_eq!(episode.rewards(), vec![1.0, -1100.0]);
        assert_eq!(episode.dones(), vec![false, true]);
    }

    #[test]
    fn test_out_of_grid_position_ends_episode() {
        let config = RlConfig::default();
        let (profiles, cards) = fixtures();
        let builder = TrajectoryBuilder::new(&config, &profiles, &cards);
        let layouts = vec![layout("s", "a", 0, 0, 0), layout("s", "b", 5, 0, 1)];

        let (episodes, _) = builder.build(&[reward("s", "save")], &layouts).unwrap();
        let episode = &episodes[0];
        assert!(!episode.valid);
        assert_eq!(episode.len(), 1);
        assert!(episode.transitions[0].done);
        assert_eq!(episode.transitions[0].reward, 121.0);
    }

    #[test]
    fn test_skip_reasons() {
        let config = RlConfig::default();
        let (profiles, cards) = fixtures();
        let builder = TrajectoryBuilder::new(&config, &profiles, &cards);
        let mut stranger = layout("s2", "a", 0, 0, 0);
        stranger.user_id = "ghost".into();
        let layouts = vec![stranger, layout("s3", "zzz", 0, 0, 0)];
        let rewards = vec![reward("s1", "save"), reward("s2", "save"), reward("s3", "save")];

        let (episodes, report) = builder.build(&rewards, &layouts).unwrap();
        assert!(episodes.is_empty());
        assert_eq!(report.total, 3);
        assert_eq!(report.skipped_no_layout, 1);
        assert_eq!(report.skipped_no_profile, 1);
        assert_eq!(report.skipped_no_cards, 1);
        assert_eq!(report.to_string(), "processed 0 of 3 sessions (no layout: 1, no profile: 1, no cards: 1, no placements: 0, invalid: 0)");
    }

    #[test]
    fn test_fail_fast_on_missing_layout() {
        let config = RlConfig {
            strictness: Strictness::FailFast,
            ..Default::default()
        };
        let (profiles, cards) = fixtures();
        let builder = TrajectoryBuilder::new(&config, &profiles, &cards);
        let result = builder.build(&[reward("s1", "save")], &[]);
        assert_matches!(result, Err(LayoutRlError::MissingData(_)));
    }

    #[test]
    fn test_last_reward_event_wins() {
        let config = RlConfig::default();
        let (profiles, cards) = fixtures();
        let builder = TrajectoryBuilder::new(&config, &profiles, &cards);
        let rewards = vec![reward("s", "save"), reward("t", "save"), reward("s", "regenerate")];
        let layouts = vec![layout("s", "a", 0, 0, 0), layout("t", "b", 0, 0, 0)];

        let (episodes, report) = builder.build(&rewards, &layouts).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(episodes[0].session_id, "t");
        assert_eq!(episodes[1].session_id, "s");
        assert_eq!(episodes[1].feedback_reward, -100.0);
    }

    #[test]
    fn test_unknown_cards_are_dropped_from_replay() {
        let config = RlConfig::default();
        let (profiles, cards) = fixtures();
        let builder = TrajectoryBuilder::new(&config, &profiles, &cards);
        let layouts = vec![layout("s", "a", 0, 0, 0), layout("s", "nope", 0, 1, 1), layout("s", "b", 0, 2, 2)];

        let (episodes, _) = builder.build(&[reward("s", "save")], &layouts).unwrap();
        assert_eq!(episodes[0].actions(), vec![0, 2]);
        assert!(episodes[0].valid);
    }

    #[test]
    fn test_first_position_outside_grid_is_skipped() {
        let config = RlConfig::default();
        let (profiles, cards) = fixtures();
        let builder = TrajectoryBuilder::new(&config, &profiles, &cards);
        let layouts = vec![layout("s", "a", 3, 0, 0), layout("s", "b", 0, 0, 1)];

        let (episodes, report) = builder.build(&[reward("s", "save")], &layouts).unwrap();
        assert!(episodes.is_empty());
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped_no_placements, 1);
        assert_matches!(
            builder.replay_session(&reward("s", "save"), &layouts.iter().collect::<Vec<_>>()),
            Ok(SessionOutcome::Skipped(SkipReason::NoPlacements))
        );
    }
}
