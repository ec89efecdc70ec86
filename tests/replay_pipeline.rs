//! Record feedback, replay it into episodes and train on them

use card_layout_rl::data::TrajectoryBuilder;
use card_layout_rl::env::reward::LayoutDetails;
use card_layout_rl::env::{Card, CardLookup, CellPlacement, Feedback, Layout, LayoutEnvironment, UserProfile};
use card_layout_rl::recording::{load_events, FeedbackRecorder, LayoutEvent, ProfileLookup, RewardEvent};
use card_layout_rl::training::{learning_status, suggest_layout, train_from_logs};
use card_layout_rl::{PolicyManager, PpoConfig, Result, RlConfig};
use tempfile::tempdir;

fn small_policy() -> PolicyManager {
    let ppo = PpoConfig {
        hidden_sizes: vec![16],
        batch_size: 4,
        ppo_epochs: 2,
        ..Default::default()
    };
    PolicyManager::new(RlConfig::default(), ppo).expect("policy")
}

fn lookups() -> (CardLookup, ProfileLookup) {
    let cards = ["a", "b", "c"]
        .iter()
        .map(|id| (id.to_string(), Card::new(*id, true, true)))
        .collect();
    let mut profiles = ProfileLookup::new();
    profiles.insert(
        "u1".into(),
        UserProfile {
            average_satisfaction: 0.8,
            total_diaries: 12,
        },
    );
    (cards, profiles)
}

fn layout(cells: &[(&str, usize, usize)]) -> Layout {
    cells
        .iter()
        .enumerate()
        .map(|(order_index, &(id, row, col))| (id.to_string(), CellPlacement { row, col, order_index }))
        .collect()
}

#[test]
fn test_recorded_sessions_replay_into_episodes() -> Result<()> {
    let dir = tempdir()?;
    let (cards, profiles) = lookups();

    let mut recorder = FeedbackRecorder::new(dir.path(), &RlConfig::default())?;
    recorder.record(
        "s1",
        "u1",
        &Feedback::Save(LayoutDetails::default()),
        Some(&layout(&[("a", 0, 0), ("b", 0, 1)])),
    )?;
    recorder.record(
        "s2",
        "u1",
        &Feedback::Save(LayoutDetails::default()),
        Some(&layout(&[("a", 1, 1), ("c", 1, 1)])),
    )?;
    recorder.record("s3", "u1", &Feedback::Regenerate(LayoutDetails::default()), None)?;
    recorder.record("s4", "nobody", &Feedback::Save(LayoutDetails::default()), Some(&layout(&[("a", 2, 2)])))?;
    recorder.close()?;

    let rewards: Vec<RewardEvent> = load_events(dir.path())?;
    let layouts: Vec<LayoutEvent> = load_events(dir.path())?;
    let config = RlConfig::default();
    let (episodes, report) = TrajectoryBuilder::new(&config, &profiles, &cards).build(&rewards, &layouts)?;

    assert_eq!(report.total, 4);
    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped_no_layout, 1);
    assert_eq!(report.skipped_no_profile, 1);
    assert_eq!(report.invalid, 1);

    let valid = episodes.iter().find(|e| e.session_id == "s1").expect("s1 replayed");
    assert!(valid.valid);
    assert_eq!(valid.rewards(), vec![1.0, 121.0]);
    assert_eq!(valid.actions(), vec![0, 1]);
    assert_eq!(valid.dones(), vec![false, true]);

    let collided = episodes.iter().find(|e| e.session_id == "s2").expect("s2 replayed");
    assert!(!collided.valid);
    assert_eq!(collided.rewards(), vec![1.0, -1000.0 + 120.0]);
    Ok(())
}

#[test]
fn test_train_from_logs_updates_the_model() -> Result<()> {
    let dir = tempdir()?;
    let (cards, profiles) = lookups();

    let mut recorder = FeedbackRecorder::new(dir.path(), &RlConfig::default())?;
    recorder.record(
        "s1",
        "u1",
        &Feedback::Save(LayoutDetails::default()),
        Some(&layout(&[("a", 0, 0), ("b", 0, 1), ("c", 1, 0)])),
    )?;
    recorder.record(
        "s2",
        "u1",
        &Feedback::Modify(LayoutDetails {
            layout_difference: Some(2.0),
            ..Default::default()
        }),
        Some(&layout(&[("c", 2, 3), ("a", 0, 2)])),
    )?;
    recorder.close()?;

    let mut policy = small_policy();
    let (summary, report) = train_from_logs(&mut policy, dir.path(), &profiles, &cards)?;

    assert_eq!(report.processed, 2);
    assert_eq!(summary.episodes, 2);
    assert_eq!(summary.transitions, 5);
    assert!(summary.loss.is_finite());
    Ok(())
}

#[test]
fn test_train_from_empty_logs_is_a_no_op() -> Result<()> {
    let dir = tempdir()?;
    let (cards, profiles) = lookups();
    let mut policy = small_policy();

    let (summary, report) = train_from_logs(&mut policy, dir.path(), &profiles, &cards)?;
    assert_eq!(report.total, 0);
    assert_eq!(summary.episodes, 0);
    assert_eq!(summary.loss, 0.0);
    Ok(())
}

#[test]
fn test_suggested_layout_uses_distinct_cells() -> Result<()> {
    let (cards, profiles) = lookups();
    let policy = small_policy();
    let mut env = LayoutEnvironment::new(policy.rl_config().clone());
    let ids: Vec<String> = ["a", "b", "c", "missing"].iter().map(|s| s.to_string()).collect();

    let layout = suggest_layout(&policy, &mut env, "u1", &ids, &cards, &profiles["u1"])?;
    assert_eq!(layout.len(), 3);
    assert!(!layout.contains_key("missing"));

    let mut cells: Vec<(usize, usize)> = layout.values().map(|p| (p.row, p.col)).collect();
    cells.sort();
    cells.dedup();
    assert_eq!(cells.len(), 3);
    assert!(cells.iter().all(|&(row, col)| row < 3 && col < 4));
    Ok(())
}

#[test]
fn test_learning_status_over_recorded_feedback() -> Result<()> {
    let dir = tempdir()?;
    let mut recorder = FeedbackRecorder::new(dir.path(), &RlConfig::default())?;
    recorder.record("s1", "u1", &Feedback::Save(LayoutDetails::default()), None)?;
    recorder.record("s2", "u1", &Feedback::Regenerate(LayoutDetails::default()), None)?;
    recorder.close()?;

    let events: Vec<RewardEvent> = load_events(dir.path())?;
    let status = learning_status(&RlConfig::default(), &events, 10);
    assert_eq!(status.total_feedback, 2);
    assert_eq!(status.positive_feedback, 1);
    assert_eq!(status.negative_feedback, 1);
    assert!((status.average_reward - 10.0).abs() < 1e-4);
    Ok(())
}
