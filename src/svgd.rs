//! Stein variational gradient descent.
//!
//! The orchestrator owns the model, guide, optimizer and kernel builder, and
//! threads an immutable [`SvgdState`] through `init`, `update` and
//! `evaluate`. The site partition and the compiled transform table are fixed
//! by `init` and carried inside the state as one shared immutable value.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::constraint::{biject_to, TransformTable};
use crate::effects::Handler;
use crate::force;
use crate::kernel::KernelBuilder;
use crate::optimizer::Optimizer;
use crate::program::{Guide, Program, VariationalFamily};
use crate::rng::RngKey;
use crate::tree::Params;

#[derive(Error, Debug)]
pub enum SvgdError {
    #[error("guide must be a point-mass (delta) family")]
    GuideNotPointMass,
    #[error("particle initializer produced values for unknown site `{0}`")]
    UnknownInitSite(String),
    #[error("no initial particle values for particle-owned site `{0}`")]
    MissingParticleInit(String),
    #[error(transparent)]
    Program(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct SvgdSettings {
    /// Number of Stein particles. More particles capture more of the
    /// posterior.
    pub num_stein_particles: usize,
    /// Number of Monte Carlo draws per particle when evaluating the
    /// log-joint. More draws reduce loss variance; one draw skips the
    /// averaging entirely.
    pub num_loss_particles: usize,
}

impl Default for SvgdSettings {
    fn default() -> Self {
        Self {
            num_stein_particles: 10,
            num_loss_particles: 2,
        }
    }
}

/// Disjoint split of the discovered parameter sites.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub(crate) model_sites: BTreeSet<String>,
    pub(crate) particle_sites: BTreeSet<String>,
}

impl Partition {
    pub fn is_particle_site(&self, name: &str) -> bool {
        self.particle_sites.contains(name)
    }

    /// Sites appearing in the model's trace.
    pub fn model_sites(&self) -> &BTreeSet<String> {
        &self.model_sites
    }

    /// Guide-introduced sites, one value per particle.
    pub fn particle_sites(&self) -> &BTreeSet<String> {
        &self.particle_sites
    }
}

/// Everything `init` fixes for the lifetime of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Setup {
    partition: Partition,
    transforms: TransformTable,
}

impl Setup {
    pub(crate) fn new(partition: Partition, transforms: TransformTable) -> Self {
        Self {
            partition,
            transforms,
        }
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn transforms(&self) -> &TransformTable {
        &self.transforms
    }
}

/// The only state carried between steps. Replaced wholesale by every
/// `update`; never mutated in place.
#[derive(Debug, Clone)]
pub struct SvgdState<S> {
    pub(crate) optim_state: S,
    pub(crate) rng_key: RngKey,
    pub(crate) setup: Arc<Setup>,
}

impl<S> SvgdState<S> {
    pub fn rng_key(&self) -> RngKey {
        self.rng_key
    }

    pub fn setup(&self) -> &Setup {
        &self.setup
    }
}

pub struct Svgd<M, G, O, K> {
    model: M,
    guide: G,
    optim: O,
    kernel: K,
    settings: SvgdSettings,
}

impl<M, G, O, K> Svgd<M, G, O, K>
where
    M: Program,
    G: Guide + Program<Args = M::Args>,
    O: Optimizer,
    K: KernelBuilder,
{
    /// Rejects guides outside the point-mass family before any computation
    /// runs.
    pub fn new(
        model: M,
        guide: G,
        optim: O,
        kernel: K,
        settings: SvgdSettings,
    ) -> Result<Self, SvgdError> {
        assert!(settings.num_stein_particles >= 1);
        assert!(settings.num_loss_particles >= 1);
        if guide.family() != VariationalFamily::PointMass {
            return Err(SvgdError::GuideNotPointMass);
        }
        Ok(Self {
            model,
            guide,
            optim,
            kernel,
            settings,
        })
    }

    /// Discover the parameter sites, fix the partition and transforms, and
    /// build the opening state.
    pub fn init(&self, key: RngKey, args: &M::Args) -> Result<SvgdState<O::State>, SvgdError> {
        let (key, model_seed, guide_seed) = key.split3();

        // seeded discovery traces; no values substituted yet
        let empty = Params::new();
        let mut guide_handler = Handler::new(guide_seed, &empty);
        self.guide.eval(&mut guide_handler, args)?;
        let guide_trace = guide_handler.into_trace();
        let mut model_handler = Handler::new(model_seed, &empty);
        self.model.eval(&mut model_handler, args)?;
        let model_trace = model_handler.into_trace();

        let mut particle_keys = key.split_n(1 + self.settings.num_stein_particles);
        let key = particle_keys.remove(0);
        let init_values = self.guide.find_init(&particle_keys, args)?;

        for name in init_values.keys() {
            if guide_trace.param(name).is_none() && model_trace.param(name).is_none() {
                return Err(SvgdError::UnknownInitSite(name.clone()));
            }
        }

        // model sites first so guide values win on shared names
        let mut partition = Partition::default();
        let mut transforms = TransformTable::default();
        let mut uparams = Params::new();
        for site in model_trace.params().chain(guide_trace.params()) {
            let transform = biject_to(site.constraint);
            transforms.insert(site.name.as_str(), transform);
            let value = init_values.get(&site.name).unwrap_or(&site.value);
            uparams.insert(site.name.clone(), transform.inverse(value));
            if model_trace.contains(&site.name) {
                partition.model_sites.insert(site.name.clone());
            } else {
                partition.particle_sites.insert(site.name.clone());
            }
        }
        for name in &partition.particle_sites {
            if !init_values.contains_key(name) {
                return Err(SvgdError::MissingParticleInit(name.clone()));
            }
        }

        let setup = Arc::new(Setup::new(partition, transforms));
        Ok(SvgdState {
            optim_state: self.optim.init(uparams),
            rng_key: key,
            setup,
        })
    }

    /// Take one Stein step. Returns the successor state and the loss.
    pub fn update(
        &self,
        state: &SvgdState<O::State>,
        args: &M::Args,
    ) -> Result<(SvgdState<O::State>, f64), SvgdError> {
        let (key, step_key) = state.rng_key.split2();
        let uparams = self.optim.get_params(&state.optim_state);
        let (loss, grads) = force::loss_and_grads(
            &self.model,
            &self.guide,
            &self.kernel,
            &self.settings,
            &state.setup,
            step_key,
            &uparams,
            args,
        )?;
        let optim_state = self.optim.update(&grads, &state.optim_state);
        Ok((
            SvgdState {
                optim_state,
                rng_key: key,
                setup: state.setup.clone(),
            },
            loss,
        ))
    }

    /// Loss at the current state, without advancing it. Splits the carried
    /// key exactly as `update` would, so the evaluation sees the same
    /// randomness a step from this state would see.
    pub fn evaluate(&self, state: &SvgdState<O::State>, args: &M::Args) -> Result<f64, SvgdError> {
        let (_, step_key) = state.rng_key.split2();
        let uparams = self.optim.get_params(&state.optim_state);
        let (loss, _) = force::loss_and_grads(
            &self.model,
            &self.guide,
            &self.kernel,
            &self.settings,
            &state.setup,
            step_key,
            &uparams,
            args,
        )?;
        Ok(loss)
    }

    /// Constrained values of every parameter site, model- and
    /// particle-owned.
    pub fn get_params(&self, state: &SvgdState<O::State>) -> Params {
        state
            .setup
            .transforms()
            .constrain(&self.optim.get_params(&state.optim_state))
    }
}
