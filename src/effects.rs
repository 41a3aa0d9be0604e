//! Typed trace records and the effect handler programs evaluate under.
//!
//! A probabilistic program is interpreted by calling back into a [`Handler`],
//! which decides what each site primitive does: draw from the seeded
//! generator, reuse a value from a replayed trace, or substitute a current
//! parameter value. Every site is recorded in declaration order and the joint
//! log-density accumulates as evaluation proceeds.

use thiserror::Error;

use crate::constraint::Constraint;
use crate::dist::Distribution;
use crate::rng::RngKey;
use crate::tensor::Tensor;
use crate::tree::Params;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("site `{0}` recorded twice in one trace")]
    DuplicateSite(String),
}

/// A latent or observed stochastic site.
#[derive(Debug, Clone)]
pub struct SampleSite {
    pub name: String,
    pub value: Tensor,
    pub log_prob: f64,
    pub support: Constraint,
    pub observed: bool,
}

/// A learnable parameter site with its declared constraint.
#[derive(Debug, Clone)]
pub struct ParamSite {
    pub name: String,
    pub value: Tensor,
    pub constraint: Constraint,
}

#[derive(Debug, Clone)]
pub enum Site {
    Sample(SampleSite),
    Param(ParamSite),
}

impl Site {
    pub fn name(&self) -> &str {
        match self {
            Site::Sample(site) => &site.name,
            Site::Param(site) => &site.name,
        }
    }
}

/// Sites recorded during one program evaluation, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    sites: Vec<Site>,
}

impl Trace {
    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sites.iter().any(|site| site.name() == name)
    }

    pub fn sample(&self, name: &str) -> Option<&SampleSite> {
        self.samples().find(|site| site.name == name)
    }

    pub fn param(&self, name: &str) -> Option<&ParamSite> {
        self.params().find(|site| site.name == name)
    }

    pub fn samples(&self) -> impl Iterator<Item = &SampleSite> {
        self.sites.iter().filter_map(|site| match site {
            Site::Sample(site) => Some(site),
            Site::Param(_) => None,
        })
    }

    pub fn params(&self) -> impl Iterator<Item = &ParamSite> {
        self.sites.iter().filter_map(|site| match site {
            Site::Param(site) => Some(site),
            Site::Sample(_) => None,
        })
    }

    fn push(&mut self, site: Site) -> Result<(), ModelError> {
        if self.contains(site.name()) {
            return Err(ModelError::DuplicateSite(site.name().to_string()));
        }
        self.sites.push(site);
        Ok(())
    }
}

/// Evaluation context handed to a program.
pub struct Handler<'a> {
    rng: ChaCha8Rng,
    values: &'a Params,
    replay: Option<&'a Trace>,
    trace: Trace,
    log_density: f64,
}

impl<'a> Handler<'a> {
    /// Seeded evaluation with parameter values substituted from `values`.
    pub fn new(key: RngKey, values: &'a Params) -> Self {
        Self {
            rng: key.rng(),
            values,
            replay: None,
            trace: Trace::default(),
            log_density: 0.0,
        }
    }

    /// Like [`Handler::new`], but sample sites present in `replay` reuse the
    /// replayed value instead of drawing a fresh one.
    pub fn with_replay(key: RngKey, values: &'a Params, replay: &'a Trace) -> Self {
        Self {
            rng: key.rng(),
            values,
            replay: Some(replay),
            trace: Trace::default(),
            log_density: 0.0,
        }
    }

    /// Declare a latent site. Returns the realized value.
    pub fn sample<D: Distribution>(&mut self, name: &str, dist: &D) -> Result<Tensor, ModelError> {
        let value = match self.replay.and_then(|trace| trace.sample(name)) {
            Some(site) => site.value.clone(),
            None => dist.sample(&mut self.rng),
        };
        let log_prob = dist.log_prob(&value);
        self.log_density += log_prob;
        self.trace.push(Site::Sample(SampleSite {
            name: name.to_string(),
            value: value.clone(),
            log_prob,
            support: dist.support(),
            observed: false,
        }))?;
        Ok(value)
    }

    /// Condition on an observed value.
    pub fn observe<D: Distribution>(
        &mut self,
        name: &str,
        dist: &D,
        value: &Tensor,
    ) -> Result<(), ModelError> {
        let log_prob = dist.log_prob(value);
        self.log_density += log_prob;
        self.trace.push(Site::Sample(SampleSite {
            name: name.to_string(),
            value: value.clone(),
            log_prob,
            support: dist.support(),
            observed: true,
        }))
    }

    /// Declare a learnable parameter site. The substituted value wins over
    /// `default` when one is present.
    pub fn param(
        &mut self,
        name: &str,
        default: &Tensor,
        constraint: Constraint,
    ) -> Result<Tensor, ModelError> {
        let value = self.values.get(name).cloned().unwrap_or_else(|| default.clone());
        self.trace.push(Site::Param(ParamSite {
            name: name.to_string(),
            value: value.clone(),
            constraint,
        }))?;
        Ok(value)
    }

    /// Derive an independent key for a nested evaluation.
    pub fn split_key(&mut self) -> RngKey {
        RngKey::new(self.rng.random())
    }

    /// Joint log-density accumulated so far.
    pub fn log_density(&self) -> f64 {
        self.log_density
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn into_trace(self) -> Trace {
        self.trace
    }
}
