//! Masked action selection and sequential layout inference.

use crate::env::placement::{CellPlacement, Layout};
use crate::env::state::{fit_state_dim, StateRecord};
use crate::neural::actor_critic::ActorCriticNet;
use crate::neural::tensor_conversion::{action_mask, state_to_tensor};
use tch::{Kind, Tensor};

/// Sampled cell and its log-probability under the masked policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionChoice {
    pub action: usize,
    pub log_prob: f64,
}

impl ActorCriticNet {
    /// Sample a cell among `available`.
    ///
    /// Every other cell gets a large negative logit bias, so it carries no
    /// probability mass. Returns `None` when no available action is in range.
    pub fn predict_action(&self, state: &[f32], available: &[usize]) -> Option<ActionChoice> {
        let action_dim = self.action_dim();
        let valid: Vec<usize> = available.iter().copied().filter(|&a| a < action_dim).collect();
        if valid.is_empty() {
            return None;
        }

        tch::no_grad(|| {
            let input = state_to_tensor(state, self.state_dim());
            let (logits, _) = self.forward(&input);
            let mask = Tensor::from_slice(&action_mask(&valid, action_dim)).view([1, action_dim as i64]);
            let log_probs = (logits + mask).log_softmax(-1, Kind::Float);

            if log_probs.isnan().any().double_value(&[]) > 0.0 {
                log::error!("⚠️ NaN in policy output, falling back to first available cell");
                return Some(ActionChoice {
                    action: valid[0],
                    log_prob: -(valid.len() as f64).ln(),
                });
            }

            let sampled = log_probs.exp().multinomial(1, true).int64_value(&[0, 0]) as usize;
            let action = if valid.contains(&sampled) {
                sampled
            } else {
                // Only reachable through float underflow; take the most likely valid cell
                valid
                    .iter()
                    .copied()
                    .max_by(|&a, &b| {
                        let pa = log_probs.double_value(&[0, a as i64]);
                        let pb = log_probs.double_value(&[0, b as i64]);
                        pa.partial_cmp(&pb).unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .unwrap_or(valid[0])
            };

            Some(ActionChoice {
                action,
                log_prob: log_probs.double_value(&[0, action as i64]),
            })
        })
    }

    /// Place `card_ids` one by one, starting from `initial`.
    ///
    /// After each decision the chosen cell is marked in the record's grid and
    /// the cursor advances before the next card is encoded. Stops early when
    /// the grid is full; a repeated card id is placed only once.
    pub fn predict_layout(&self, initial: &StateRecord, card_ids: &[String]) -> Layout {
        let mut record = initial.clone();
        let mut layout = Layout::new();

        for card_id in card_ids {
            if layout.contains_key(card_id) {
                log::debug!("Card {} listed twice, keeping first placement", card_id);
                continue;
            }

            let available = record.grid.available_actions();
            if available.is_empty() {
                log::info!("No more available cells to place card {}", card_id);
                break;
            }

            let state = fit_state_dim(record.serialize(), self.state_dim());
            let Some(choice) = self.predict_action(&state, &available) else {
                log::info!("No action in range for card {}", card_id);
                break;
            };

            let (row, col) = record.grid.decode(choice.action);
            let order_index = layout.len();
            record.grid.occupy(row, col);
            record.cursor = order_index + 1;
            layout.insert(
                card_id.clone(),
                CellPlacement {
                    row,
                    col,
                    order_index,
                },
            );
        }

        layout
    }

    /// Log-probability, value and entropy of `actions` in `states`.
    ///
    /// `masks` is an additive `[batch, action_dim]` bias; pass the same
    /// masks that were used when the actions were chosen.
    pub fn evaluate_actions(
        &self,
        states: &Tensor,
        actions: &Tensor,
        masks: Option<&Tensor>,
    ) -> (Tensor, Tensor, Tensor) {
        let (logits, values) = self.forward(states);
        let logits = match masks {
            Some(mask) => logits + mask,
            None => logits,
        };
        let log_probs = logits.log_softmax(-1, Kind::Float);
        let action_log_probs = log_probs
            .gather(1, &actions.unsqueeze(-1), false)
            .squeeze_dim(-1);
        let entropy = -(log_probs.exp() * &log_probs).sum_dim_intlist(-1, false, Kind::Float);
        (action_log_probs, values.squeeze_dim(-1), entropy)
    }
}
