use crate::config::PpoConfig;
use crate::neural::actor_critic::ActorCriticNet;
use crate::neural::tensor_conversion::{actions_to_tensor, masks_to_tensor, states_to_tensor};
use crate::neural::training::gradient_clipping::clip_gradients;
use crate::{LayoutRlError, Result};
use rand::prelude::*;
use rand::rngs::StdRng;
use tch::nn::Optimizer;
use tch::{nn, Kind, Reduction, Tensor};

/// Flattened rollout consumed by [`ppo_update`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RolloutBatch {
    pub states: Vec<Vec<f32>>,
    pub actions: Vec<usize>,
    pub old_log_probs: Vec<f32>,
    pub advantages: Vec<f32>,
    pub returns: Vec<f32>,
    /// Available cells per step, as used when the action was taken
    pub masks: Option<Vec<Vec<usize>>>,
}

impl RolloutBatch {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// All buffers share one length
    pub fn is_consistent(&self) -> bool {
        let n = self.states.len();
        self.actions.len() == n
            && self.old_log_probs.len() == n
            && self.advantages.len() == n
            && self.returns.len() == n
            && self.masks.as_ref().is_none_or(|m| m.len() == n)
    }

    /// Append another rollout; masks survive only if both sides carry them
    pub fn extend(&mut self, other: RolloutBatch) {
        let had_steps = !self.is_empty();
        self.states.extend(other.states);
        self.actions.extend(other.actions);
        self.old_log_probs.extend(other.old_log_probs);
        self.advantages.extend(other.advantages);
        self.returns.extend(other.returns);
        self.masks = match (self.masks.take(), other.masks) {
            (Some(mut mine), Some(theirs)) => {
                mine.extend(theirs);
                Some(mine)
            }
            (None, theirs) if !had_steps => theirs,
            _ => None,
        };
    }
}

fn finite_loss(loss: &Tensor) -> Result<f64> {
    let value = f64::try_from(loss)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(LayoutRlError::TrainingSample(format!("non-finite loss {value}")))
    }
}

fn simple_sample_loss(net: &ActorCriticNet, state: &[f32], reward: f32, policy_weight: f64) -> Result<Tensor> {
    if state.len() != net.state_dim() {
        return Err(LayoutRlError::DimensionMismatch {
            expected: net.state_dim(),
            actual: state.len(),
        });
    }

    let input = Tensor::f_from_slice(state)?.f_view([1, state.len() as i64])?;
    let (logits, value) = net.forward(&input);
    let target = Tensor::f_from_slice(&[reward])?.f_view([1, 1])?;
    let value_loss = value.f_mse_loss(&target, Reduction::Mean)?;

    let log_probs = logits.f_log_softmax(-1, Kind::Float)?;
    let action = tch::no_grad(|| log_probs.detach().exp().f_multinomial(1, true))?;
    let log_prob = log_probs.f_gather(1, &action, false)?.f_sum(Kind::Float)?;
    let policy_loss = -log_prob * f64::from(reward);

    Ok(value_loss + policy_loss * policy_weight)
}

/// Loss, backward pass and optimizer step for one sample; nothing is
/// stepped when any of them fails
fn simple_step(
    vs: &nn::VarStore,
    net: &ActorCriticNet,
    optimizer: &mut Optimizer,
    state: &[f32],
    reward: f32,
    config: &PpoConfig,
) -> Result<f64> {
    let loss = simple_sample_loss(net, state, reward, config.simple_policy_weight)?;
    let value = finite_loss(&loss)?;

    optimizer.zero_grad();
    loss.f_backward()?;
    clip_gradients(vs, config.grad_clip);
    optimizer.step();
    Ok(value)
}

/// Online update, one optimizer step per `(state, reward)` pair.
///
/// Value loss is the MSE against the reward; the policy term is the
/// REINFORCE loss of an action sampled from the current policy. Samples that
/// fail (wrong dimension, non-finite loss, torch error) are skipped and left
/// out of the returned average.
pub fn simple_update(
    vs: &nn::VarStore,
    net: &ActorCriticNet,
    optimizer: &mut Optimizer,
    states: &[Vec<f32>],
    rewards: &[f32],
    config: &PpoConfig,
) -> f64 {
    if states.is_empty() || rewards.is_empty() {
        return 0.0;
    }
    if states.len() != rewards.len() {
        log::warn!(
            "⚠️ simple_update got {} states and {} rewards, using the common prefix",
            states.len(),
            rewards.len()
        );
    }

    let mut total_loss = 0.0;
    let mut updates = 0usize;

    for (idx, (state, &reward)) in states.iter().zip(rewards).enumerate() {
        match simple_step(vs, net, optimizer, state, reward, config) {
            Ok(value) => {
                total_loss += value;
                updates += 1;
            }
            Err(e) => log::warn!("⚠️ Skipping sample {}: {}", idx, e),
        }
    }

    if updates == 0 {
        return 0.0;
    }
    let avg = total_loss / updates as f64;
    log::info!("🎯 simple_update: {} of {} samples, avg loss {:.4}", updates, states.len().min(rewards.len()), avg);
    avg
}

/// Clipped-objective PPO over `config.ppo_epochs` passes of shuffled
/// minibatches.
///
/// Returns the mean total loss over optimizer steps. An empty or
/// inconsistent batch returns 0.0 and leaves the weights untouched.
pub fn ppo_update(
    vs: &nn::VarStore,
    net: &ActorCriticNet,
    optimizer: &mut Optimizer,
    batch: &RolloutBatch,
    config: &PpoConfig,
) -> f64 {
    if batch.is_empty() {
        return 0.0;
    }
    if !batch.is_consistent() {
        log::warn!("⚠️ Rollout buffers have different lengths, skipping PPO update");
        return 0.0;
    }

    let n = batch.len();
    let states = states_to_tensor(&batch.states, net.state_dim());
    let actions = actions_to_tensor(&batch.actions);
    let old_log_probs = Tensor::from_slice(&batch.old_log_probs);
    let advantages = Tensor::from_slice(&batch.advantages);
    let returns = Tensor::from_slice(&batch.returns);
    let masks = batch
        .masks
        .as_ref()
        .map(|m| masks_to_tensor(m, net.action_dim()));

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut indices: Vec<i64> = (0..n as i64).collect();
    let batch_size = config.batch_size.max(1);

    let mut total_loss = 0.0;
    let mut steps = 0usize;

    for epoch in 0..config.ppo_epochs {
        indices.shuffle(&mut rng);

        for chunk in indices.chunks(batch_size) {
            let idx = Tensor::from_slice(chunk);
            let mb_masks = masks.as_ref().map(|m| m.index_select(0, &idx));
            let (new_log_probs, values, entropy) = net.evaluate_actions(
                &states.index_select(0, &idx),
                &actions.index_select(0, &idx),
                mb_masks.as_ref(),
            );
            let mb_advantages = advantages.index_select(0, &idx);

            let ratio = (new_log_probs - old_log_probs.index_select(0, &idx)).exp();
            let surr1 = &ratio * &mb_advantages;
            let surr2 = ratio.clamp(1.0 - config.clip_epsilon, 1.0 + config.clip_epsilon) * &mb_advantages;
            let policy_loss = -surr1.min_other(&surr2).mean(Kind::Float);
            let value_loss = values.mse_loss(&returns.index_select(0, &idx), Reduction::Mean);
            let entropy = entropy.mean(Kind::Float);

            let loss = policy_loss + value_loss - entropy * config.entropy_beta;
            let value = match finite_loss(&loss) {
                Ok(value) => value,
                Err(e) => {
                    log::error!("⚠️ Epoch {}: {}, skipping minibatch", epoch, e);
                    continue;
                }
            };

            optimizer.zero_grad();
            if let Err(e) = loss.f_backward() {
                log::error!("⚠️ Epoch {}: backward failed ({}), skipping minibatch", epoch, e);
                continue;
            }
            clip_gradients(vs, config.grad_clip);
            optimizer.step();

            total_loss += value;
            steps += 1;
        }
    }

    if steps == 0 {
        return 0.0;
    }
    let avg = total_loss / steps as f64;
    log::info!(
        "🎯 PPO update complete | {} steps over {} transitions, mean loss {:.4}",
        steps,
        n,
        avg
    );
    avg
}
