//! Gradient-based optimizers over named parameter dictionaries.
//!
//! The engine treats the optimizer as a black box: it initializes a state
//! from parameters, reads parameters back out, and folds gradients in. All
//! three operations are pure; `update` returns a fresh state.

use crate::tree::Params;

pub trait Optimizer: Send + Sync {
    type State: Clone + Send + Sync;

    fn init(&self, params: Params) -> Self::State;

    fn get_params(&self, state: &Self::State) -> Params;

    /// Fold one gradient step into the state. Gradients are descent
    /// directions; `grads` must cover exactly the parameters held in `state`.
    fn update(&self, grads: &Params, state: &Self::State) -> Self::State;
}

/// Settings for the Adam optimizer
#[derive(Debug, Clone, Copy)]
pub struct AdamOptions {
    /// First moment decay rate (default: 0.9)
    pub beta1: f64,
    /// Second moment decay rate (default: 0.999)
    pub beta2: f64,
    /// Small constant for numerical stability (default: 1e-8)
    pub epsilon: f64,
    /// Learning rate (default: 0.001)
    pub learning_rate: f64,
}

impl Default for AdamOptions {
    fn default() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            learning_rate: 0.001,
        }
    }
}

/// Adam with elementwise first and second moment estimates per parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Adam {
    options: AdamOptions,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            options: AdamOptions {
                learning_rate,
                ..AdamOptions::default()
            },
        }
    }

    pub fn with_options(options: AdamOptions) -> Self {
        Self { options }
    }
}

#[derive(Debug, Clone)]
pub struct AdamState {
    step: u64,
    params: Params,
    first_moment: Params,
    second_moment: Params,
}

impl Optimizer for Adam {
    type State = AdamState;

    fn init(&self, params: Params) -> AdamState {
        let first_moment = params.iter().map(|(k, v)| (k.clone(), v.zeros_like())).collect();
        let second_moment = params.iter().map(|(k, v)| (k.clone(), v.zeros_like())).collect();
        AdamState {
            step: 0,
            params,
            first_moment,
            second_moment,
        }
    }

    fn get_params(&self, state: &AdamState) -> Params {
        state.params.clone()
    }

    fn update(&self, grads: &Params, state: &AdamState) -> AdamState {
        let AdamOptions {
            beta1,
            beta2,
            epsilon,
            learning_rate,
        } = self.options;
        let step = state.step + 1;
        let bias1 = 1.0 - beta1.powi(step as i32);
        let bias2 = 1.0 - beta2.powi(step as i32);

        let mut params = Params::new();
        let mut first_moment = Params::new();
        let mut second_moment = Params::new();
        for (name, value) in &state.params {
            let grad = grads
                .get(name)
                .unwrap_or_else(|| panic!("missing gradient for parameter `{name}`"));
            let m = state.first_moment[name].zip_map(grad, |m, g| beta1 * m + (1.0 - beta1) * g);
            let v = state.second_moment[name].zip_map(grad, |v, g| beta2 * v + (1.0 - beta2) * g * g);
            let new_value = value.zip_map(&m.zip_map(&v, |m, v| {
                let m_hat = m / bias1;
                let v_hat = v / bias2;
                m_hat / (v_hat.sqrt() + epsilon)
            }), |p, step_dir| p - learning_rate * step_dir);
            params.insert(name.clone(), new_value);
            first_moment.insert(name.clone(), m);
            second_moment.insert(name.clone(), v);
        }
        AdamState {
            step,
            params,
            first_moment,
            second_moment,
        }
    }
}

/// Plain gradient descent with a fixed learning rate.
#[derive(Debug, Clone, Copy)]
pub struct Sgd {
    learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

#[derive(Debug, Clone)]
pub struct SgdState {
    params: Params,
}

impl Optimizer for Sgd {
    type State = SgdState;

    fn init(&self, params: Params) -> SgdState {
        SgdState { params }
    }

    fn get_params(&self, state: &SgdState) -> Params {
        state.params.clone()
    }

    fn update(&self, grads: &Params, state: &SgdState) -> SgdState {
        let params = state
            .params
            .iter()
            .map(|(name, value)| {
                let grad = grads
                    .get(name)
                    .unwrap_or_else(|| panic!("missing gradient for parameter `{name}`"));
                (name.clone(), value.zip_map(grad, |p, g| p - self.learning_rate * g))
            })
            .collect();
        SgdState { params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;
    use approx::assert_abs_diff_eq;

    fn params_of(value: f64) -> Params {
        let mut params = Params::new();
        params.insert("w".to_string(), Tensor::scalar(value));
        params
    }

    #[test]
    fn adam_first_step_matches_hand_computation() {
        let optim = Adam::new(0.1);
        let state = optim.init(params_of(1.0));
        let next = optim.update(&params_of(2.0), &state);

        // t=1: m = 0.1*2 = 0.2, v = 0.001*4, bias-corrected m_hat = 2,
        // v_hat = 4, step = lr * 2 / (2 + eps) ~= lr
        let expected = 1.0 - 0.1 * 2.0 / (2.0 + 1e-8);
        assert_abs_diff_eq!(optim.get_params(&next)["w"].item(), expected, epsilon = 1e-12);
    }

    #[test]
    fn adam_descends_a_quadratic() {
        // minimize (w - 3)^2 from w = 0
        let optim = Adam::new(0.05);
        let mut state = optim.init(params_of(0.0));
        for _ in 0..2000 {
            let w = optim.get_params(&state)["w"].item();
            state = optim.update(&params_of(2.0 * (w - 3.0)), &state);
        }
        assert_abs_diff_eq!(optim.get_params(&state)["w"].item(), 3.0, epsilon = 1e-2);
    }

    #[test]
    fn sgd_takes_plain_steps() {
        let optim = Sgd::new(0.5);
        let state = optim.init(params_of(1.0));
        let next = optim.update(&params_of(0.4), &state);
        assert_abs_diff_eq!(optim.get_params(&next)["w"].item(), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn update_leaves_the_old_state_intact() {
        let optim = Sgd::new(0.5);
        let state = optim.init(params_of(1.0));
        let _ = optim.update(&params_of(1.0), &state);
        assert_abs_diff_eq!(optim.get_params(&state)["w"].item(), 1.0, epsilon = 1e-12);
    }

    #[test]
    #[should_panic]
    fn missing_gradient_is_a_programming_error() {
        let optim = Sgd::new(0.1);
        let state = optim.init(params_of(1.0));
        optim.update(&Params::new(), &state);
    }
}
