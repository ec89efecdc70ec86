//! Training and inference flows built on the policy manager.
//!
//! - offline: replay the logs into episodes, estimate advantages per
//!   episode, run one PPO update over the concatenated rollout
//! - online: turn one feedback event into a reward and run `simple_update`
//! - batch: `simple_update` over the initial states of several sessions

use crate::config::RlConfig;
use crate::data::trajectory::{Episode, ReplayReport, TrajectoryBuilder};
use crate::env::card::{CardLookup, UserProfile};
use crate::env::layout_env::LayoutEnvironment;
use crate::env::placement::{compare_layouts, Layout};
use crate::env::reward::{calculate_reward, Feedback, LayoutDetails};
use crate::neural::manager::PolicyManager;
use crate::neural::training::gae::compute_advantages_and_returns;
use crate::neural::training::trainer::RolloutBatch;
use crate::recording::csv_log::load_events;
use crate::recording::events::{LayoutEvent, RewardEvent};
use crate::recording::lookups::ProfileLookup;
use crate::Result;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrainingSummary {
    pub episodes: usize,
    pub invalid_episodes: usize,
    pub transitions: usize,
    pub mean_episode_reward: f32,
    pub loss: f64,
}

impl fmt::Display for TrainingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} episodes ({} invalid), {} transitions, mean reward {:.2}, loss {:.4}",
            self.episodes, self.invalid_episodes, self.transitions, self.mean_episode_reward, self.loss
        )
    }
}

/// Rollout of one episode under the current policy.
///
/// Old log-probabilities and values come from the current network, with the
/// same availability masks as the replay.
pub fn episode_rollout(policy: &PolicyManager, episode: &Episode) -> RolloutBatch {
    let states = episode.states();
    let actions = episode.actions();
    let masks = episode.masks();

    let values = policy.values(&states);
    let old_log_probs = policy.log_probs(&states, &actions, Some(masks.as_slice()));
    let ppo = policy.ppo_config();
    let (advantages, returns) =
        compute_advantages_and_returns(&episode.rewards(), &values, &episode.dones(), ppo.gamma, ppo.gae_lambda);

    RolloutBatch {
        states,
        actions,
        old_log_probs,
        advantages,
        returns,
        masks: Some(masks),
    }
}

/// One PPO update over every non-empty episode
pub fn train_from_episodes(policy: &mut PolicyManager, episodes: &[Episode]) -> TrainingSummary {
    let usable: Vec<&Episode> = episodes.iter().filter(|e| !e.is_empty()).collect();
    if usable.is_empty() {
        log::warn!("⚠️ No training episodes, skipping update");
        return TrainingSummary::default();
    }

    let mut batch = RolloutBatch::default();
    for episode in &usable {
        batch.extend(episode_rollout(policy, episode));
    }

    log::info!("🚀 PPO training on {} transitions from {} episodes", batch.len(), usable.len());
    let loss = policy.update(&batch);

    let summary = TrainingSummary {
        episodes: usable.len(),
        invalid_episodes: usable.iter().filter(|e| !e.valid).count(),
        transitions: batch.len(),
        mean_episode_reward: usable.iter().map(|e| e.total_reward()).sum::<f32>() / usable.len() as f32,
        loss,
    };
    log::info!("✅ Training finished: {}", summary);
    summary
}

/// Replay every log in `logs_dir` and train on the result
pub fn train_from_logs<P: AsRef<Path>>(
    policy: &mut PolicyManager,
    logs_dir: P,
    profiles: &ProfileLookup,
    cards: &CardLookup,
) -> Result<(TrainingSummary, ReplayReport)> {
    let rewards: Vec<RewardEvent> = load_events(&logs_dir)?;
    let layouts: Vec<LayoutEvent> = load_events(&logs_dir)?;
    log::info!("📂 Loaded {} reward events and {} layout events", rewards.len(), layouts.len());

    let config = policy.rl_config().clone();
    let (episodes, report) = TrajectoryBuilder::new(&config, profiles, cards).build(&rewards, &layouts)?;
    Ok((train_from_episodes(policy, &episodes), report))
}

/// Reset `env` for a session and let the policy place its cards.
///
/// Unknown card ids are dropped by the environment before inference.
pub fn suggest_layout(
    policy: &PolicyManager,
    env: &mut LayoutEnvironment,
    user_id: &str,
    card_ids: &[String],
    cards: &CardLookup,
    profile: &UserProfile,
) -> Result<Layout> {
    env.reset(user_id, card_ids, cards, profile)?;
    let placed: Vec<String> = env.cards().iter().map(|c| c.id.clone()).collect();
    let layout = policy.predict_layout(env.state_record(), &placed);
    log::info!("🧩 Suggested layout for {}: {} of {} cards placed", user_id, layout.len(), card_ids.len());
    Ok(layout)
}

/// Fill in `layout_difference` / `layout_reward` from the two layouts when absent
pub fn with_layout_metrics(
    config: &RlConfig,
    details: LayoutDetails,
    suggested: Option<&Layout>,
    final_layout: Option<&Layout>,
) -> LayoutDetails {
    match (suggested, final_layout, details.layout_difference) {
        (Some(suggested), Some(final_layout), None) => {
            let comparison = compare_layouts(suggested, final_layout, config.layout_reward_scale);
            LayoutDetails {
                layout_difference: Some(comparison.layout_difference),
                layout_reward: details.layout_reward.or(Some(comparison.layout_reward)),
                ..details
            }
        }
        _ => details,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackOutcome {
    pub reward: f32,
    pub loss: f64,
}

/// Online update from the state a suggestion was made in and the user's response
pub fn learn_from_feedback(policy: &mut PolicyManager, state: &[f32], feedback: &Feedback) -> FeedbackOutcome {
    let reward = calculate_reward(policy.rl_config(), feedback);
    log::info!("🎓 Learning from feedback '{}', reward {}", feedback, reward);
    let loss = policy.simple_update(&[state.to_vec()], &[reward]);
    FeedbackOutcome { reward, loss }
}

/// One session of a batch-training request
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSample {
    pub user_id: String,
    pub card_ids: Vec<String>,
    pub reward: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchSummary {
    pub requested: usize,
    pub processed: usize,
    pub avg_loss: f64,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "processed {} of {} samples, avg loss {:.4}", self.processed, self.requested, self.avg_loss)
    }
}

/// `simple_update` on the initial state of each sample.
///
/// Users without a profile get the default one; samples whose reset fails
/// are skipped.
pub fn batch_train(
    policy: &mut PolicyManager,
    samples: &[BatchSample],
    profiles: &ProfileLookup,
    cards: &CardLookup,
) -> BatchSummary {
    let mut env = LayoutEnvironment::new(policy.rl_config().clone());
    let default_profile = UserProfile::default();
    let mut states = Vec::with_capacity(samples.len());
    let mut rewards = Vec::with_capacity(samples.len());

    for sample in samples {
        let profile = profiles.get(&sample.user_id).unwrap_or(&default_profile);
        match env.reset(&sample.user_id, &sample.card_ids, cards, profile) {
            Ok(state) => {
                states.push(state);
                rewards.push(sample.reward);
            }
            Err(e) => log::warn!("⚠️ Skipping batch sample for {}: {}", sample.user_id, e),
        }
    }

    let summary = BatchSummary {
        requested: samples.len(),
        processed: states.len(),
        avg_loss: policy.simple_update(&states, &rewards),
    };
    log::info!("✅ Batch training: {}", summary);
    summary
}

/// Counts over the most recent reward events
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LearningStatus {
    pub total_feedback: usize,
    pub positive_feedback: usize,
    pub negative_feedback: usize,
    pub average_reward: f32,
}

/// Rows carrying a logged reward use it; older rows are scored with `config`
pub fn learning_status(config: &RlConfig, events: &[RewardEvent], recent: usize) -> LearningStatus {
    let window = &events[events.len().saturating_sub(recent)..];
    if window.is_empty() {
        return LearningStatus::default();
    }

    let feedback: Vec<Feedback> = window.iter().map(RewardEvent::feedback).collect();
    let positive = feedback.iter().filter(|f| matches!(f, Feedback::Save(_))).count();
    let negative = feedback
        .iter()
        .filter(|f| matches!(f, Feedback::Modify(_) | Feedback::Regenerate(_)))
        .count();
    let total_reward: f32 = window
        .iter()
        .zip(&feedback)
        .map(|(event, f)| event.reward_value.unwrap_or_else(|| calculate_reward(config, f)))
        .sum();

    LearningStatus {
        total_feedback: window.len(),
        positive_feedback: positive,
        negative_feedback: negative,
        average_reward: total_reward / window.len() as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PpoConfig;
    use crate::data::trajectory::Transition;
    use crate::env::card::Card;
    use crate::env::placement::CellPlacement;

    fn policy() -> PolicyManager {
        tch::manual_seed(11);
        let ppo = PpoConfig {
            hidden_sizes: vec![32],
            ppo_epochs: 2,
            ..Default::default()
        };
        PolicyManager::new(RlConfig::default(), ppo).unwrap()
    }

    fn cards(n: usize) -> (Vec<String>, CardLookup) {
        let ids: Vec<String> = (0..n).map(|i| format!("c{i}")).collect();
        let lookup = ids.iter().map(|id| (id.clone(), Card::new(id.clone(), true, true))).collect();
        (ids, lookup)
    }

    fn episode(actions: &[usize], feedback_reward: f32) -> Episode {
        let n = actions.len();
        let mut free: Vec<usize> = (0..12).collect();
        let transitions = actions
            .iter()
            .enumerate()
            .map(|(i, &action)| {
                let available = free.clone();
                free.retain(|&a| a != action);
                Transition {
                    state: vec![i as f32 / 10.0; 40],
                    action,
                    reward: if i + 1 == n { 1.0 + feedback_reward } else { 1.0 },
                    done: i + 1 == n,
                    available,
                }
            })
            .collect();
        Episode {
            session_id: "s".into(),
            user_id: "u".into(),
            transitions,
            valid: true,
            feedback_reward,
        }
    }

    #[test]
    fn test_episode_rollout_shapes() {
        let policy = policy();
        let rollout = episode_rollout(&policy, &episode(&[0, 5, 7], 120.0));
        assert!(rollout.is_consistent());
        assert_eq!(rollout.len(), 3);
        assert!(rollout.old_log_probs.iter().all(|&lp| lp <= 0.0));
        // terminal step: return equals its reward
        assert!((rollout.returns[2] - 121.0).abs() < 1e-3);
    }

    #[test]
    fn test_train_from_episodes() {
        let mut policy = policy();
        let episodes = vec![episode(&[0, 1], 120.0), episode(&[3], -100.0), episode(&[], 0.0)];
        let summary = train_from_episodes(&mut policy, &episodes);
        assert_eq!(summary.episodes, 2);
        assert_eq!(summary.transitions, 3);
        assert!(summary.loss.is_finite());
        assert!((summary.mean_episode_reward - (122.0 - 99.0) / 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_train_without_episodes() {
        let mut policy = policy();
        assert_eq!(train_from_episodes(&mut policy, &[]), TrainingSummary::default());
    }

    #[test]
    fn test_suggest_layout_drops_unknown_cards() {
        let policy = policy();
        let (mut ids, lookup) = cards(3);
        ids.push("ghost".into());
        let mut env = LayoutEnvironment::new(RlConfig::default());
        let layout = suggest_layout(&policy, &mut env, "u", &ids, &lookup, &UserProfile::default()).unwrap();
        assert_eq!(layout.len(), 3);
        assert!(!layout.contains_key("ghost"));
    }

    #[test]
    fn test_learn_from_feedback_reward() {
        let mut policy = policy();
        let feedback = Feedback::Modify(LayoutDetails {
            layout_difference: Some(2.0),
            ..Default::default()
        });
        let outcome = learn_from_feedback(&mut policy, &[0.1f32; 40], &feedback);
        assert_eq!(outcome.reward, -70.0);
        assert!(outcome.loss > 0.0);
    }

    #[test]
    fn test_layout_metrics_filled_from_layouts() {
        let config = RlConfig::default();
        let mut suggested = Layout::new();
        suggested.insert("a".into(), CellPlacement { row: 0, col: 0, order_index: 0 });
        let mut edited = Layout::new();
        edited.insert("a".into(), CellPlacement { row: 1, col: 2, order_index: 0 });

        let details = with_layout_metrics(&config, LayoutDetails::default(), Some(&suggested), Some(&edited));
        assert_eq!(details.layout_difference, Some(3.0));
        assert_eq!(details.layout_reward, Some(-60.0));

        let given = LayoutDetails {
            layout_difference: Some(0.5),
            ..Default::default()
        };
        assert_eq!(with_layout_metrics(&config, given.clone(), Some(&suggested), Some(&edited)), given);
    }

    #[test]
    fn test_batch_train_counts() {
        let mut policy = policy();
        let (ids, lookup) = cards(3);
        let config = RlConfig {
            strictness: crate::config::Strictness::FailFast,
            ..Default::default()
        };
        let mut strict = PolicyManager::new(config, PpoConfig { hidden_sizes: vec![8], ..Default::default() }).unwrap();
        let samples = vec![
            BatchSample { user_id: "u".into(), card_ids: ids.clone(), reward: 120.0 },
            BatchSample { user_id: "v".into(), card_ids: vec!["ghost".into()], reward: -100.0 },
        ];

        let summary = batch_train(&mut policy, &samples, &ProfileLookup::new(), &lookup);
        assert_eq!((summary.processed, summary.requested), (2, 2));

        let summary = batch_train(&mut strict, &samples, &ProfileLookup::new(), &lookup);
        assert_eq!((summary.processed, summary.requested), (1, 2));
        assert_eq!(summary.to_string().split(',').next(), Some("processed 1 of 2 samples"));
    }

    #[test]
    fn test_learning_status_window() {
        let config = RlConfig::default();
        let event = |kind: &str| RewardEvent {
            session_id: "s".into(),
            feedback_type: kind.into(),
            layout_difference: None,
            layout_reward: None,
            related_card_id: None,
            reward_value: None,
            created_at: None,
        };
        let events = vec![event("regenerate"), event("save"), event("modify"), event("other")];
        let status = learning_status(&config, &events, 3);
        assert_eq!(status.total_feedback, 3);
        assert_eq!(status.positive_feedback, 1);
        assert_eq!(status.negative_feedback, 1);
        assert!((status.average_reward - (120.0 - 50.0) / 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_learning_status_prefers_logged_rewards() {
        let feedback = Feedback::Save(LayoutDetails::default());
        let logged = RewardEvent::new("s1", &feedback).with_reward(120.0);
        let legacy = RewardEvent::new("s2", &feedback);

        let changed = RlConfig {
            reward_save: 10.0,
            ..Default::default()
        };
        let status = learning_status(&changed, &[logged, legacy], 10);
        assert_eq!(status.total_feedback, 2);
        assert!((status.average_reward - (120.0 + 30.0) / 2.0).abs() < 1e-4);
    }
}
