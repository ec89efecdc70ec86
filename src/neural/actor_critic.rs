use tch::nn::Module;
use tch::{nn, Tensor};

/// Actor-critic over the flat state vector.
///
/// Actor and critic are independent MLPs with no shared weights and no
/// recurrence: every bit of sequential context (cursor, occupied cells) comes
/// from the state vector itself.
#[derive(Debug)]
pub struct ActorCriticNet {
    actor: nn::Sequential,
    critic: nn::Sequential,
    state_dim: usize,
    action_dim: usize,
}

fn mlp(p: nn::Path, input_dim: i64, hidden: &[i64], output_dim: i64) -> nn::Sequential {
    let mut seq = nn::seq();
    let mut in_dim = input_dim;
    for (idx, &width) in hidden.iter().enumerate() {
        seq = seq
            .add(nn::linear(&p / format!("fc{idx}"), in_dim, width, Default::default()))
            .add_fn(|x| x.relu());
        in_dim = width;
    }
    seq.add(nn::linear(&p / "head", in_dim, output_dim, Default::default()))
}

impl ActorCriticNet {
    pub fn new(vs: &nn::VarStore, state_dim: usize, action_dim: usize, hidden: &[i64]) -> Self {
        let p = vs.root();
        let actor = mlp(&p / "actor", state_dim as i64, hidden, action_dim as i64);
        let critic = mlp(&p / "critic", state_dim as i64, hidden, 1);

        initialize_weights(vs);
        log::info!(
            "🔧 ActorCritic created: state_dim={}, action_dim={}, hidden={:?}",
            state_dim,
            action_dim,
            hidden
        );

        Self {
            actor,
            critic,
            state_dim,
            action_dim,
        }
    }

    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    /// `[batch, state_dim] -> ([batch, action_dim] logits, [batch, 1] value)`
    pub fn forward(&self, states: &Tensor) -> (Tensor, Tensor) {
        (self.actor.forward(states), self.critic.forward(states))
    }
}

/// Xavier-uniform weights, zero biases
pub fn initialize_weights(vs: &nn::VarStore) {
    for (name, mut param) in vs.variables() {
        let size = param.size();

        if size.len() == 2 {
            let fan_in = size[1] as f64;
            let fan_out = size[0] as f64;
            let bound = (6.0 / (fan_in + fan_out)).sqrt();
            tch::no_grad(|| {
                let _ = param.uniform_(-bound, bound);
            });
        } else if size.len() == 1 {
            tch::no_grad(|| {
                let _ = param.zero_();
            });
        }

        if param.isnan().any().double_value(&[]) > 0.0 {
            log::error!("🚨 NaN detected in {} after initialization!", name);
        }
    }
}
