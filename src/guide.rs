//! Point-mass autoguide.
//!
//! [`AutoDelta`] derives a guide from a model automatically: every latent
//! sample site of the model gets one learnable location parameter carrying
//! the site's support, and the guide's sample statement collapses to a point
//! mass at that location.

use anyhow::Result;
use rand_distr::{Distribution as RandDistribution, StandardNormal};

use crate::constraint::biject_to;
use crate::dist::Delta;
use crate::effects::{Handler, SampleSite};
use crate::program::{Guide, Program, VariationalFamily};
use crate::rng::RngKey;
use crate::tensor::Tensor;
use crate::tree::Params;

/// Suffix appended to a latent site's name to form its location parameter.
const AUTO_LOC_SUFFIX: &str = "_auto_loc";

pub struct AutoDelta<M> {
    model: M,
    noise_scale: f64,
}

impl<M: Program> AutoDelta<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            noise_scale: 1.0,
        }
    }

    /// Scale of the unconstrained-space jitter [`Guide::find_init`] adds
    /// around each particle's seeded location.
    pub fn with_noise_scale(mut self, noise_scale: f64) -> Self {
        assert!(noise_scale >= 0.0);
        self.noise_scale = noise_scale;
        self
    }

    /// Latent sample sites discovered by a seeded trace of the model.
    fn latent_sites(&self, key: RngKey, args: &M::Args) -> Result<Vec<SampleSite>> {
        let empty = Params::new();
        let mut inner = Handler::new(key, &empty);
        self.model.eval(&mut inner, args)?;
        Ok(inner
            .into_trace()
            .samples()
            .filter(|site| !site.observed)
            .cloned()
            .collect())
    }
}

impl<M: Program> Program for AutoDelta<M> {
    type Args = M::Args;

    fn eval(&self, handler: &mut Handler<'_>, args: &Self::Args) -> Result<()> {
        let key = handler.split_key();
        for site in self.latent_sites(key, args)? {
            let name = format!("{}{}", site.name, AUTO_LOC_SUFFIX);
            let location = handler.param(&name, &site.value, site.support)?;
            handler.sample(&site.name, &Delta::new(location))?;
        }
        Ok(())
    }
}

impl<M: Program> Guide for AutoDelta<M> {
    fn family(&self) -> VariationalFamily {
        VariationalFamily::PointMass
    }

    fn find_init(&self, keys: &[RngKey], args: &Self::Args) -> Result<Params> {
        let mut columns: Params = Params::new();
        let mut per_site: std::collections::BTreeMap<String, Vec<Tensor>> = Default::default();
        for &key in keys {
            let (trace_key, noise_key) = key.split2();
            let mut noise_rng = noise_key.rng();
            // independent seeded location per particle, jittered in
            // unconstrained space, then mapped back onto the support
            for site in self.latent_sites(trace_key, args)? {
                let transform = biject_to(site.support);
                let location = transform.inverse(&site.value);
                let jittered = location.map(|v| {
                    let z: f64 = StandardNormal.sample(&mut noise_rng);
                    v + self.noise_scale * z
                });
                per_site
                    .entry(format!("{}{}", site.name, AUTO_LOC_SUFFIX))
                    .or_default()
                    .push(transform.forward(&jittered));
            }
        }
        for (name, particles) in per_site {
            assert!(
                particles.len() == keys.len(),
                "site `{name}` missing from some particle traces"
            );
            columns.insert(name, Tensor::stack(&particles));
        }
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use crate::dist::{Exponential, Normal};
    use crate::effects::Site;

    struct ScaleLocModel;

    impl Program for ScaleLocModel {
        type Args = ();

        fn eval(&self, handler: &mut Handler<'_>, _args: &()) -> Result<()> {
            let scale = handler.sample("scale", &Exponential::scalar(1.0))?;
            let loc = handler.sample("loc", &Normal::scalar(0.0, 1.0))?;
            let lik = Normal::new(loc, scale);
            handler.observe("y", &lik, &Tensor::scalar(0.4))?;
            Ok(())
        }
    }

    #[test]
    fn declares_one_location_param_per_latent() {
        let guide = AutoDelta::new(ScaleLocModel);
        let empty = Params::new();
        let mut handler = Handler::new(RngKey::new(0), &empty);
        guide.eval(&mut handler, &()).unwrap();

        let trace = handler.into_trace();
        let params: Vec<_> = trace.params().collect();
        assert_eq!(params.len(), 2);
        assert_eq!(trace.param("scale_auto_loc").unwrap().constraint, Constraint::Positive);
        assert_eq!(trace.param("loc_auto_loc").unwrap().constraint, Constraint::Real);
        // the observed site never becomes latent
        assert!(!trace.contains("y_auto_loc"));
        assert!(trace.sample("scale").is_some() && trace.sample("loc").is_some());
        assert_eq!(trace.sites().iter().filter(|s| matches!(s, Site::Sample(_))).count(), 2);
    }

    #[test]
    fn find_init_disperses_particles_on_their_support() {
        let guide = AutoDelta::new(ScaleLocModel);
        let keys = RngKey::new(7).split_n(5);
        let init = guide.find_init(&keys, &()).unwrap();

        let scales = &init["scale_auto_loc"];
        assert_eq!(scales.shape(), &[5]);
        assert!(scales.data().iter().all(|&s| s > 0.0));

        let locs = &init["loc_auto_loc"];
        let spread = locs.data().iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            - locs.data().iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(spread > 0.0, "particles must not start collapsed");

        // same keys, same initialization
        let again = guide.find_init(&keys, &()).unwrap();
        assert_eq!(init, again);
    }
}
