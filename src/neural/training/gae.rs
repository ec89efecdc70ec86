//! Generalized advantage estimation over one rollout

/// Backward GAE pass.
///
/// The bootstrap value is 0 at a terminal last step and `values[t]` at a
/// non-terminal last step. Elsewhere it is `values[t + 1]`, gated by
/// `1 - dones[t + 1]`. Returns `(advantages, returns)` with
/// `returns[t] = advantages[t] + values[t]`.
///
/// Inputs of different lengths are truncated to the shortest one.
pub fn compute_advantages_and_returns(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    gamma: f32,
    gae_lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let n = rewards.len().min(values.len()).min(dones.len());
    if n != rewards.len() || n != values.len() || n != dones.len() {
        log::warn!(
            "⚠️ GAE input lengths differ (rewards={}, values={}, dones={}), truncating to {}",
            rewards.len(),
            values.len(),
            dones.len(),
            n
        );
    }

    let mut advantages = vec![0.0f32; n];
    let mut last_gae = 0.0f32;

    for t in (0..n).rev() {
        let (next_value, next_non_terminal) = if t == n - 1 {
            let non_terminal = if dones[t] { 0.0 } else { 1.0 };
            (if dones[t] { 0.0 } else { values[t] }, non_terminal)
        } else {
            (values[t + 1], if dones[t + 1] { 0.0 } else { 1.0 })
        };

        let delta = rewards[t] + gamma * next_value * next_non_terminal - values[t];
        last_gae = delta + gamma * gae_lambda * next_non_terminal * last_gae;
        advantages[t] = last_gae;
    }

    let returns = advantages
        .iter()
        .zip(values)
        .map(|(adv, value)| adv + value)
        .collect();

    (advantages, returns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_terminal_step() {
        let (adv, ret) = compute_advantages_and_returns(&[5.0], &[2.0], &[true], 0.99, 0.95);
        assert!((adv[0] - 3.0).abs() < 1e-6);
        assert!((ret[0] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_non_terminal_step_bootstraps_from_own_value() {
        let (adv, _) = compute_advantages_and_returns(&[1.0], &[2.0], &[false], 0.5, 0.95);
        // 1 + 0.5 * 2 - 2
        assert!((adv[0] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_two_steps_accumulate() {
        let gamma = 0.9;
        let lambda = 0.8;
        let (adv, ret) =
            compute_advantages_and_returns(&[1.0, 2.0], &[0.5, 0.25], &[false, false], gamma, lambda);
        let adv1 = 2.0 + gamma * 0.25 - 0.25;
        let adv0 = 1.0 + gamma * 0.25 - 0.5 + gamma * lambda * adv1;
        assert!((adv[1] - adv1).abs() < 1e-5);
        assert!((adv[0] - adv0).abs() < 1e-5);
        assert!((ret[0] - (adv0 + 0.5)).abs() < 1e-5);
    }

    #[test]
    fn test_terminal_next_step_cuts_bootstrap() {
        let (adv, _) =
            compute_advantages_and_returns(&[1.0, 10.0], &[0.0, 3.0], &[false, true], 0.99, 0.95);
        assert!((adv[1] - 7.0).abs() < 1e-6);
        assert!((adv[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mismatched_lengths_truncate() {
        let (adv, ret) =
            compute_advantages_and_returns(&[1.0, 1.0, 1.0], &[0.0, 0.0], &[true], 0.99, 0.95);
        assert_eq!(adv.len(), 1);
        assert_eq!(ret.len(), 1);
    }

    #[test]
    fn test_empty() {
        let (adv, ret) = compute_advantages_and_returns(&[], &[], &[], 0.99, 0.95);
        assert!(adv.is_empty() && ret.is_empty());
    }
}
