use clap::Parser;
use std::path::{Path, PathBuf};

use card_layout_rl::config::AppConfig;
use card_layout_rl::env::card::CardLookup;
use card_layout_rl::env::reward::LayoutDetails;
use card_layout_rl::env::{Feedback, Layout, LayoutEnvironment, UserProfile};
use card_layout_rl::logging::setup_logging;
use card_layout_rl::neural::PolicyManager;
use card_layout_rl::recording::{
    load_cards, load_events, load_layout, load_profiles, FeedbackRecorder, ProfileLookup, RewardEvent, Suggestion,
};
use card_layout_rl::training::pipeline::{
    learn_from_feedback, learning_status, suggest_layout, train_from_logs, with_layout_metrics,
};

#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Eq)]
enum Mode {
    /// Suggest a layout for a set of cards
    Suggest,
    /// Replay the feedback logs and run a PPO update
    Train,
    /// Record one feedback event and learn from it
    Feedback,
    /// Print model and feedback statistics
    Status,
}

#[derive(Parser, Debug)]
#[command(name = "card_layout_rl")]
struct Config {
    #[arg(long, value_enum, default_value = "suggest")]
    mode: Mode,

    /// JSON file overriding the grid, reward and PPO defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model weights (safetensors)
    #[arg(long, default_value = "model_weights/layout_policy.safetensors")]
    model_path: PathBuf,

    /// Directory holding the reward and layout logs
    #[arg(long, default_value = "data/feedback_logs")]
    logs_dir: PathBuf,

    /// Card lookup (JSON array)
    #[arg(long, default_value = "data/cards.json")]
    cards: PathBuf,

    /// User profile lookup (JSON object keyed by user id)
    #[arg(long, default_value = "data/profiles.json")]
    profiles: PathBuf,

    #[arg(long, default_value = "anonymous")]
    user_id: String,

    /// Generated when absent
    #[arg(long)]
    session_id: Option<String>,

    /// Selected cards, in placement order
    #[arg(long, value_delimiter = ',')]
    card_ids: Vec<String>,

    /// save, modify or regenerate
    #[arg(long, default_value = "save")]
    feedback_type: String,

    #[arg(long)]
    layout_difference: Option<f32>,

    #[arg(long)]
    layout_reward: Option<f32>,

    #[arg(long)]
    related_card_id: Option<String>,

    /// Suggested layout (`suggest` output or a bare layout), used to compute the layout difference
    #[arg(long)]
    suggested_layout: Option<PathBuf>,

    /// Layout as saved by the user (JSON), also written to the layout log
    #[arg(long)]
    final_layout: Option<PathBuf>,

    /// Number of recent reward events considered by `status`
    #[arg(long, default_value_t = 10)]
    recent: usize,

    /// Write rotating log files here instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn load_profiles_or_default(path: &Path) -> Result<ProfileLookup, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(load_profiles(path)?)
    } else {
        log::warn!("⚠️ No profile file at {}, using default profiles", path.display());
        Ok(ProfileLookup::new())
    }
}

fn profile_for(profiles: &ProfileLookup, user_id: &str) -> UserProfile {
    profiles.get(user_id).cloned().unwrap_or_else(|| {
        log::info!("ℹ️ No profile for user {}, using defaults", user_id);
        UserProfile::default()
    })
}

fn run_suggest(config: &Config, policy: &PolicyManager, cards: &CardLookup) -> Result<(), Box<dyn std::error::Error>> {
    let profiles = load_profiles_or_default(&config.profiles)?;
    let profile = profile_for(&profiles, &config.user_id);
    let session_id = config
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut env = LayoutEnvironment::new(policy.rl_config().clone());
    let layout = suggest_layout(policy, &mut env, &config.user_id, &config.card_ids, cards, &profile)?;

    log::info!("🧩 Session {}: {} cards placed", session_id, layout.len());
    println!("{}", serde_json::to_string_pretty(&Suggestion { session_id, layout })?);
    Ok(())
}

fn run_feedback(config: &Config, policy: &mut PolicyManager, cards: &CardLookup) -> Result<(), Box<dyn std::error::Error>> {
    let session_id = config
        .session_id
        .clone()
        .ok_or("--session-id is required for feedback")?;
    let suggested: Option<Layout> = config.suggested_layout.as_deref().map(load_layout).transpose()?;
    let final_layout: Option<Layout> = config.final_layout.as_deref().map(load_layout).transpose()?;

    let details = with_layout_metrics(
        policy.rl_config(),
        LayoutDetails {
            layout_difference: config.layout_difference,
            layout_reward: config.layout_reward,
            related_card_id: config.related_card_id.clone(),
        },
        suggested.as_ref(),
        final_layout.as_ref(),
    );
    let feedback = Feedback::from_parts(&config.feedback_type, details);

    let mut recorder = FeedbackRecorder::new(&config.logs_dir, policy.rl_config())?;
    recorder.record(&session_id, &config.user_id, &feedback, final_layout.as_ref())?;
    recorder.close()?;

    // learn from the state the suggestion was made in
    let profiles = load_profiles_or_default(&config.profiles)?;
    let profile = profile_for(&profiles, &config.user_id);
    let mut env = LayoutEnvironment::new(policy.rl_config().clone());
    let state = env.reset(&config.user_id, &config.card_ids, cards, &profile)?;
    let outcome = learn_from_feedback(policy, &state, &feedback);

    policy.save_model(&config.model_path);
    println!("feedback '{}': reward {:.2}, loss {:.4}", feedback, outcome.reward, outcome.loss);
    Ok(())
}

fn run_train(config: &Config, policy: &mut PolicyManager, cards: &CardLookup) -> Result<(), Box<dyn std::error::Error>> {
    let profiles = load_profiles_or_default(&config.profiles)?;
    let (summary, report) = train_from_logs(policy, &config.logs_dir, &profiles, cards)?;

    println!("{}", report);
    if summary.episodes == 0 {
        println!("No training episodes, model left unchanged");
        return Ok(());
    }
    println!("{}", summary);

    if !policy.save_model(&config.model_path) {
        return Err(format!("could not save model to {}", config.model_path.display()).into());
    }
    Ok(())
}

fn run_status(config: &Config, policy: &PolicyManager) -> Result<(), Box<dyn std::error::Error>> {
    let rl = policy.rl_config();
    let size = std::fs::metadata(&config.model_path).map(|m| m.len()).ok();

    println!("Model Status:");
    println!("  📂 Path:        {}", config.model_path.display());
    match size {
        Some(bytes) => println!("  💾 Saved:       yes ({} bytes)", bytes),
        None => println!("  💾 Saved:       no"),
    }
    println!("  📐 Grid:        {}x{}", rl.rows, rl.cols);
    println!("  🔢 State dim:   {}, actions: {}", rl.state_dim(), rl.action_dim());
    println!("  🧠 Parameters:  {}", policy.parameter_count());
    println!("  🎯 LR:          {:.1e}", policy.ppo_config().learning_rate);

    let events: Vec<RewardEvent> = if config.logs_dir.exists() {
        load_events(&config.logs_dir)?
    } else {
        Vec::new()
    };
    let status = learning_status(rl, &events, config.recent);
    println!("Learning Progress (last {}):", config.recent);
    println!("  Feedback:       {}", status.total_feedback);
    println!("  Positive:       {}", status.positive_feedback);
    println!("  Negative:       {}", status.negative_feedback);
    println!("  Average reward: {:.2}", status.average_reward);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    let _logger = setup_logging(config.log_dir.as_deref())?;

    let app = match &config.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    app.validate()?;

    let mut policy = PolicyManager::new(app.rl, app.ppo)?;
    policy.load_model(&config.model_path);

    let cards = if matches!(config.mode, Mode::Status) {
        CardLookup::new()
    } else {
        load_cards(&config.cards)?
    };

    match config.mode {
        Mode::Suggest => run_suggest(&config, &policy, &cards)?,
        Mode::Train => run_train(&config, &mut policy, &cards)?,
        Mode::Feedback => run_feedback(&config, &mut policy, &cards)?,
        Mode::Status => run_status(&config, &policy)?,
    }
    Ok(())
}
