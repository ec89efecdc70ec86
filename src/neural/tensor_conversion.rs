//! Conversions between plain state/action buffers and tensors.

use crate::env::state::fit_state_dim;
use tch::{Kind, Tensor};

/// Logit bias applied to unavailable cells
pub const MASK_VALUE: f32 = -1e9;

/// `[n, dim]` float tensor; rows of the wrong length are padded or truncated
pub fn states_to_tensor(states: &[Vec<f32>], dim: usize) -> Tensor {
    let flat: Vec<f32> = states
        .iter()
        .flat_map(|s| {
            if s.len() == dim {
                s.clone()
            } else {
                fit_state_dim(s.clone(), dim)
            }
        })
        .collect();
    Tensor::from_slice(&flat).view([states.len() as i64, dim as i64])
}

/// `[1, dim]` tensor for a single state
pub fn state_to_tensor(state: &[f32], dim: usize) -> Tensor {
    let state = if state.len() == dim {
        state.to_vec()
    } else {
        fit_state_dim(state.to_vec(), dim)
    };
    Tensor::from_slice(&state).view([1, dim as i64])
}

/// Additive mask: 0 for available actions, [`MASK_VALUE`] elsewhere
pub fn action_mask(available: &[usize], action_dim: usize) -> Vec<f32> {
    let mut mask = vec![MASK_VALUE; action_dim];
    for &a in available {
        if a < action_dim {
            mask[a] = 0.0;
        }
    }
    mask
}

/// `[n, action_dim]` additive mask tensor
pub fn masks_to_tensor(masks: &[Vec<usize>], action_dim: usize) -> Tensor {
    let flat: Vec<f32> = masks
        .iter()
        .flat_map(|available| action_mask(available, action_dim))
        .collect();
    Tensor::from_slice(&flat).view([masks.len() as i64, action_dim as i64])
}

/// `[n]` int64 tensor of action indices
pub fn actions_to_tensor(actions: &[usize]) -> Tensor {
    let actions: Vec<i64> = actions.iter().map(|&a| a as i64).collect();
    Tensor::from_slice(&actions).to_kind(Kind::Int64)
}
