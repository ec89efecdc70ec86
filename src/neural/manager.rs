//! Policy Manager
//!
//! Owns the actor-critic network together with its VarStore and optimizer.
//! Training and inference go through this type; loading and saving weights
//! never fail the caller.

use crate::config::{PpoConfig, RlConfig};
use crate::env::placement::Layout;
use crate::env::state::StateRecord;
use crate::neural::actor_critic::ActorCriticNet;
use crate::neural::model_io::{load_varstore, read_metadata, save_varstore};
use crate::neural::policy::ActionChoice;
use crate::neural::tensor_conversion::{actions_to_tensor, masks_to_tensor, states_to_tensor};
use crate::neural::training::trainer::{ppo_update, simple_update, RolloutBatch};
use crate::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tch::nn::OptimizerConfig;
use tch::{nn, Device, Tensor};

/// Policy handle shared between request handlers.
///
/// tch optimizers are not `Sync`, so readers and the training writer share
/// one lock; an update is never observed half-applied.
pub type SharedPolicy = Arc<Mutex<PolicyManager>>;

pub struct PolicyManager {
    rl: RlConfig,
    ppo: PpoConfig,
    vs: nn::VarStore,
    net: ActorCriticNet,
    optimizer: nn::Optimizer,
}

impl PolicyManager {
    /// Fresh network on CPU
    pub fn new(rl: RlConfig, ppo: PpoConfig) -> Result<Self> {
        Self::with_device(rl, ppo, Device::Cpu)
    }

    pub fn with_device(rl: RlConfig, ppo: PpoConfig, device: Device) -> Result<Self> {
        log::info!("🧠 Initializing policy manager...");
        log::debug!(
            "Policy config: grid={}x{}, state_dim={}, lr={:.1e}, device={:?}",
            rl.rows,
            rl.cols,
            rl.state_dim(),
            ppo.learning_rate,
            device
        );

        let vs = nn::VarStore::new(device);
        let net = ActorCriticNet::new(&vs, rl.state_dim(), rl.action_dim(), &ppo.hidden_sizes);
        let optimizer = nn::Adam::default().build(&vs, ppo.learning_rate)?;

        log::info!("✅ Policy manager initialized ({} parameters)", count_parameters(&vs));

        Ok(Self {
            rl,
            ppo,
            vs,
            net,
            optimizer,
        })
    }

    /// Wrap into the shared handle
    pub fn shared(self) -> SharedPolicy {
        Arc::new(Mutex::new(self))
    }

    pub fn rl_config(&self) -> &RlConfig {
        &self.rl
    }

    pub fn ppo_config(&self) -> &PpoConfig {
        &self.ppo
    }

    pub fn net(&self) -> &ActorCriticNet {
        &self.net
    }

    pub fn varstore(&self) -> &nn::VarStore {
        &self.vs
    }

    pub fn parameter_count(&self) -> i64 {
        count_parameters(&self.vs)
    }

    pub fn forward(&self, states: &Tensor) -> (Tensor, Tensor) {
        self.net.forward(states)
    }

    pub fn predict_action(&self, state: &[f32], available: &[usize]) -> Option<ActionChoice> {
        self.net.predict_action(state, available)
    }

    pub fn predict_layout(&self, initial: &StateRecord, card_ids: &[String]) -> Layout {
        self.net.predict_layout(initial, card_ids)
    }

    /// Critic value of each state, without gradients
    pub fn values(&self, states: &[Vec<f32>]) -> Vec<f32> {
        if states.is_empty() {
            return Vec::new();
        }
        tch::no_grad(|| {
            let input = states_to_tensor(states, self.net.state_dim());
            let (_, values) = self.net.forward(&input);
            Vec::<f32>::try_from(&values.flatten(0, -1)).unwrap_or_else(|e| {
                log::error!("⚠️ Failed to read critic values: {}", e);
                vec![0.0; states.len()]
            })
        })
    }

    /// Log-probabilities of `actions` under the current policy, without gradients
    pub fn log_probs(&self, states: &[Vec<f32>], actions: &[usize], masks: Option<&[Vec<usize>]>) -> Vec<f32> {
        if states.is_empty() || states.len() != actions.len() {
            return Vec::new();
        }
        tch::no_grad(|| {
            let input = states_to_tensor(states, self.net.state_dim());
            let mask = masks.map(|m| masks_to_tensor(m, self.net.action_dim()));
            let (log_probs, _, _) =
                self.net
                    .evaluate_actions(&input, &actions_to_tensor(actions), mask.as_ref());
            Vec::<f32>::try_from(&log_probs).unwrap_or_else(|e| {
                log::error!("⚠️ Failed to read log-probabilities: {}", e);
                vec![0.0; states.len()]
            })
        })
    }

    pub fn simple_update(&mut self, states: &[Vec<f32>], rewards: &[f32]) -> f64 {
        simple_update(&self.vs, &self.net, &mut self.optimizer, states, rewards, &self.ppo)
    }

    pub fn update(&mut self, batch: &RolloutBatch) -> f64 {
        ppo_update(&self.vs, &self.net, &mut self.optimizer, batch, &self.ppo)
    }

    /// Write the weights to `path`, creating its directory.
    ///
    /// Returns `false` (and logs) on failure.
    pub fn save_model(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("❌ Cannot create model directory {}: {}", parent.display(), e);
                return false;
            }
        }

        let metadata: HashMap<String, String> = [
            ("state_dim".to_string(), self.net.state_dim().to_string()),
            ("action_dim".to_string(), self.net.action_dim().to_string()),
        ]
        .into_iter()
        .collect();

        match save_varstore(&self.vs, path, Some(metadata)) {
            Ok(()) => {
                log::info!("💾 Model saved to {}", path.display());
                true
            }
            Err(e) => {
                log::error!("❌ Failed to save model to {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Load weights from `path` if it exists.
    ///
    /// A missing file keeps the fresh initialisation; an unreadable or
    /// incompatible file keeps the current weights. Returns whether weights
    /// were loaded.
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("📁 No model at {}, using fresh weights", path.display());
            return false;
        }

        if let Ok(metadata) = read_metadata(path) {
            if let Some(dim) = metadata.get("state_dim") {
                if dim != &self.net.state_dim().to_string() {
                    log::warn!(
                        "⚠️ Model at {} was saved with state_dim={}, expected {}",
                        path.display(),
                        dim,
                        self.net.state_dim()
                    );
                }
            }
        }

        match load_varstore(&mut self.vs, path) {
            Ok(()) => {
                log::info!("✅ Model loaded from {}", path.display());
                true
            }
            Err(e) => {
                log::error!("❌ Failed to load model from {}, keeping current weights: {}", path.display(), e);
                false
            }
        }
    }
}

fn count_parameters(vs: &nn::VarStore) -> i64 {
    vs.trainable_variables().iter().map(|t| t.numel() as i64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::card::{Card, UserProfile};
    use crate::env::grid::GridState;
    use tempfile::tempdir;

    fn small() -> PolicyManager {
        let ppo = PpoConfig {
            hidden_sizes: vec![16],
            ..Default::default()
        };
        PolicyManager::new(RlConfig::default(), ppo).unwrap()
    }

    fn first_weight(manager: &PolicyManager) -> Tensor {
        manager.varstore().variables()["actor.head.weight"].copy()
    }

    #[test]
    fn test_manager_creation() {
        let manager = small();
        assert_eq!(manager.net().state_dim(), 40);
        assert_eq!(manager.net().action_dim(), 12);
        // 40*16 + 16 + 16*12 + 12 + 40*16 + 16 + 16*1 + 1
        assert_eq!(manager.parameter_count(), 1533);
    }

    #[test]
    fn test_values_and_log_probs_lengths() {
        let manager = small();
        let states = vec![vec![0.0f32; 40]; 3];
        assert_eq!(manager.values(&states).len(), 3);
        assert_eq!(manager.log_probs(&states, &[0, 1, 2], None).len(), 3);
        assert!(manager.log_probs(&states, &[0], None).is_empty());
    }

    #[test]
    fn test_predict_layout_through_manager() {
        let manager = small();
        let cards = vec![Card::new("a", true, true), Card::new("b", false, true)];
        let record = StateRecord::new(&UserProfile::default(), &cards, 12, GridState::empty(3, 4));
        let layout = manager.predict_layout(&record, &["a".into(), "b".into()]);
        assert_eq!(layout.len(), 2);
    }

    #[test]
    fn test_save_creates_directory_and_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/models/policy.safetensors");
        let manager = small();
        assert!(manager.save_model(&path));

        let mut other = small();
        assert!(other.load_model(&path));
        assert!(first_weight(&manager).allclose(&first_weight(&other), 1e-6, 1e-6, false));
    }

    #[test]
    fn test_missing_model_keeps_weights() {
        let dir = tempdir().unwrap();
        let mut manager = small();
        let before = first_weight(&manager);
        assert!(!manager.load_model(dir.path().join("absent.safetensors")));
        assert!(first_weight(&manager).equal(&before));
    }

    #[test]
    fn test_corrupt_model_keeps_weights() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.safetensors");
        std::fs::write(&path, b"definitely not safetensors").unwrap();

        let mut manager = small();
        let before = first_weight(&manager);
        assert!(!manager.load_model(&path));
        assert!(first_weight(&manager).equal(&before));
    }

    #[test]
    fn test_shared_handle() {
        let shared = small().shared();
        let clone = Arc::clone(&shared);
        let handle = std::thread::spawn(move || clone.lock().unwrap().parameter_count());
        assert_eq!(handle.join().unwrap(), shared.lock().unwrap().parameter_count());
    }
}
