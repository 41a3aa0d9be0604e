//! Fit a conjugate-normal posterior with a handful of Stein particles.

use anyhow::Result;
use svgd_rs::{
    Adam, AutoDelta, Handler, Normal, Program, RbfKernelBuilder, RngKey, Svgd, SvgdSettings,
    Tensor,
};

/// `latent ~ Normal(0, 1)`, one unit-noise observation at 1.0. The exact
/// posterior is `Normal(0.5, sqrt(0.5))`.
struct ConjugateNormal;

impl Program for ConjugateNormal {
    type Args = ();

    fn eval(&self, handler: &mut Handler<'_>, _args: &()) -> Result<()> {
        let latent = handler.sample("latent", &Normal::scalar(0.0, 1.0))?;
        let lik = Normal::new(latent, Tensor::scalar(1.0));
        handler.observe("y", &lik, &Tensor::scalar(1.0))?;
        Ok(())
    }
}

fn main() -> Result<()> {
    let engine = Svgd::new(
        ConjugateNormal,
        AutoDelta::new(ConjugateNormal),
        Adam::new(0.05),
        RbfKernelBuilder::default(),
        SvgdSettings {
            num_stein_particles: 8,
            num_loss_particles: 1,
        },
    )?;

    let mut state = engine.init(RngKey::new(42), &())?;
    for step in 0..500 {
        let (next, loss) = engine.update(&state, &())?;
        state = next;
        if step % 100 == 0 {
            println!("step {step:>4}  loss {loss:8.4}");
        }
    }

    let particles = engine.get_params(&state)["latent_auto_loc"].clone();
    let mean = particles.data().iter().sum::<f64>() / particles.len() as f64;
    println!("posterior mean estimate {mean:.3} (exact 0.5)");
    println!("particles {:?}", particles.data());
    Ok(())
}
