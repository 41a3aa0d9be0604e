//! The Stein force calculator.
//!
//! One step's numerical core: evaluate the per-particle log-joint through a
//! seeded guide trace replayed onto the model, differentiate it with respect
//! to each particle's monolithic vector and the model-owned parameters,
//! combine the kernel-weighted attractive term with the kernel-gradient
//! repulsive term, and hand back a descent-compatible loss and gradient
//! dictionary.

use faer::Col;
use rayon::prelude::*;

use crate::effects::Handler;
use crate::grad::central_diff;
use crate::kernel::{Kernel, KernelBuilder};
use crate::math::axpy;
use crate::program::{Guide, Program};
use crate::ravel::ravel_tree;
use crate::rng::RngKey;
use crate::svgd::{Setup, SvgdError, SvgdSettings};
use crate::tensor::{DType, Tensor};
use crate::tree::{ParamTree, Params};

pub(crate) fn loss_and_grads<M, G, K>(
    model: &M,
    guide: &G,
    kernel_builder: &K,
    settings: &SvgdSettings,
    setup: &Setup,
    key: RngKey,
    uparams: &Params,
    args: &M::Args,
) -> Result<(f64, Params), SvgdError>
where
    M: Program,
    G: Guide + Program<Args = M::Args>,
    K: KernelBuilder,
{
    let num_particles = settings.num_stein_particles;

    // 1. split along the fixed partition; only particle-owned parameters
    // feel the Stein forces
    let (guide_uparams, model_uparams): (Params, Params) = uparams
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .partition(|(name, _)| setup.partition().is_particle_site(name));

    // 2. monolithic particle vectors, one flat layout shared by all particles
    let (flat, ravel) = ravel_tree(&ParamTree::from_params(&guide_uparams), 1);
    let dim = ravel.event_total();
    if ravel.num_leaves() > 0 {
        assert!(
            flat.shape()[0] == num_particles,
            "particle axis {} does not match num_stein_particles {}",
            flat.shape()[0],
            num_particles
        );
    }
    let particles: Vec<Col<f64>> = (0..num_particles)
        .map(|i| {
            let mut particle = Col::zeros(dim);
            if dim > 0 {
                particle
                    .try_as_col_major_mut().unwrap().as_slice_mut()
                    .copy_from_slice(&flat.data()[i * dim..(i + 1) * dim]);
            }
            particle
        })
        .collect();

    // 3. per-particle log-joint: seed independent model/guide keys, take the
    // guide's point-mass trace, replay it onto the model
    let single_ljp = |key: RngKey, params: &Params| -> anyhow::Result<f64> {
        let (model_key, guide_key) = key.split2();
        let mut guide_handler = Handler::new(guide_key, params);
        guide.eval(&mut guide_handler, args)?;
        let guide_trace = guide_handler.into_trace();
        let mut model_handler = Handler::with_replay(model_key, params, &guide_trace);
        model.eval(&mut model_handler, args)?;
        Ok(model_handler.log_density())
    };
    let log_joint = |key: RngKey, params: &Params| -> anyhow::Result<f64> {
        if settings.num_loss_particles == 1 {
            single_ljp(key, params)
        } else {
            let mut total = 0.0;
            for draw_key in key.split_n(settings.num_loss_particles) {
                total += single_ljp(draw_key, params)?;
            }
            Ok(total / settings.num_loss_particles as f64)
        }
    };
    let merged_constrained = |model_values: &Params, particle: &[f64]| -> Params {
        let mut merged = model_values.clone();
        merged.extend(ravel.unravel(particle).into_params());
        setup.transforms().constrain(&merged)
    };

    let particle_keys = key.split_n(num_particles);

    // 4. loss and scores, fanned out over independent per-particle closures
    let per_particle: Vec<(f64, Col<f64>)> = particles
        .par_iter()
        .zip(particle_keys.par_iter())
        .map(|(particle, &particle_key)| -> Result<(f64, Col<f64>), SvgdError> {
            let objective =
                |x: &[f64]| log_joint(particle_key, &merged_constrained(&model_uparams, x));
            let log_prob = objective(particle.try_as_col_major().unwrap().as_slice())?;
            let mut score = Col::zeros(dim);
            central_diff(&objective, particle.try_as_col_major().unwrap().as_slice(), score.try_as_col_major_mut().unwrap().as_slice_mut())?;
            Ok((log_prob, score))
        })
        .collect::<Result<_, _>>()?;
    let loss =
        per_particle.iter().map(|(log_prob, _)| log_prob).sum::<f64>() / num_particles as f64;

    // gradient of the particle-averaged log-joint in the model-owned
    // parameters
    let model_grads = if model_uparams.is_empty() {
        Params::new()
    } else {
        let (model_flat, model_ravel) = ravel_tree(&ParamTree::from_params(&model_uparams), 0);
        let averaged = |values: &[f64]| -> anyhow::Result<f64> {
            let model_values = model_ravel.unravel(values).into_params();
            let mut total = 0.0;
            for (particle, &particle_key) in particles.iter().zip(&particle_keys) {
                total += log_joint(
                    particle_key,
                    &merged_constrained(&model_values, particle.try_as_col_major().unwrap().as_slice()),
                )?;
            }
            Ok(total / num_particles as f64)
        };
        let mut grad = vec![0.0; model_ravel.event_total()];
        central_diff(&averaged, model_flat.data(), &mut grad)?;
        model_ravel.unravel(&grad).into_params()
    };

    // 5. the kernel sees the full particle set, so adaptive bandwidths can
    // track the current spread
    let kernel = kernel_builder.build(&particles);

    // 6. attractive and repulsive terms, both summed over every particle
    // including the particle itself
    let forces: Vec<Col<f64>> = per_particle
        .par_iter()
        .zip(particles.par_iter())
        .map(|((_, score), particle)| {
            let x = particle.try_as_col_major().unwrap().as_slice();
            let mut force = Col::<f64>::zeros(dim);
            let mut kernel_grad = vec![0f64; dim];
            let mut weight = 0.0;
            for other in &particles {
                let y = other.try_as_col_major().unwrap().as_slice();
                weight += kernel.eval(x, y);
                kernel.grad_second(x, y, &mut kernel_grad);
                axpy(&kernel_grad, force.try_as_col_major_mut().unwrap().as_slice_mut(), 1.0);
            }
            // the particle's own score, scaled by its total kernel weight
            axpy(score.try_as_col_major().unwrap().as_slice(), force.try_as_col_major_mut().unwrap().as_slice_mut(), weight);
            force
        })
        .collect();

    // 7. decompose the force matrix back into named per-particle gradients
    let guide_grads = if ravel.num_leaves() == 0 {
        Params::new()
    } else {
        let mut force_data = vec![0f64; num_particles * dim];
        for (i, force) in forces.iter().enumerate() {
            force_data[i * dim..(i + 1) * dim].copy_from_slice(force.try_as_col_major().unwrap().as_slice());
        }
        let force_flat = Tensor::new(vec![num_particles, dim], DType::F64, force_data);
        ravel.unravel_batched(&force_flat).into_params()
    };

    // 8. forces are ascent directions; the optimizer descends
    let mut grads = Params::new();
    for (name, grad) in model_grads.into_iter().chain(guide_grads) {
        grads.insert(name, grad.map(|g| -g));
    }
    Ok((-loss, grads))
}
