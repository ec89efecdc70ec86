//! Gradient clamping applied between `backward()` and the optimizer step

use tch::nn;

/// Clamp every gradient element of `vs` to `[-max_value, max_value]`.
///
/// Returns the largest gradient norm seen before clamping.
pub fn clip_gradients(vs: &nn::VarStore, max_value: f64) -> f64 {
    let mut max_grad: f64 = 0.0;

    tch::no_grad(|| {
        for (_name, tensor) in vs.variables() {
            let mut grad = tensor.grad();
            if grad.defined() {
                let grad_norm = grad.norm().double_value(&[]);
                max_grad = max_grad.max(grad_norm);
                let _ = grad.clamp_(-max_value, max_value);
            }
        }
    });

    if max_grad > 2.0 * max_value {
        log::debug!("High gradient norm: {:.4}", max_grad);
    }

    max_grad
}
