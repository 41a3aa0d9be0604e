//! Central-difference gradients.
//!
//! The differentiated closures constrain their parameters internally, so the
//! transform Jacobians enter the gradient through the chain rule exactly as
//! they would under automatic differentiation.

use anyhow::Result;

/// Gradient of `f` at `x`, written into `out`.
///
/// The per-coordinate step is scaled to the coordinate's magnitude and is a
/// pure function of `x`, so repeated calls are bit-identical.
pub(crate) fn central_diff<F>(f: &F, x: &[f64], out: &mut [f64]) -> Result<()>
where
    F: Fn(&[f64]) -> Result<f64>,
{
    assert!(x.len() == out.len());
    let step_scale = f64::EPSILON.cbrt();
    let mut probe = x.to_vec();
    for (i, out) in out.iter_mut().enumerate() {
        let step = step_scale * x[i].abs().max(1.0);
        probe[i] = x[i] + step;
        let high = f(&probe)?;
        probe[i] = x[i] - step;
        let low = f(&probe)?;
        probe[i] = x[i];
        *out = (high - low) / (2.0 * step);
    }
    Ok(())
}
