//! Distributions for model and guide authoring.
//!
//! The engine only needs a sampling rule, a log-density, and a declared
//! support per distribution; anything beyond that lives with the caller.

use rand::Rng;
use rand_distr::{Distribution as RandDistribution, Exp1, StandardNormal};

use crate::constraint::Constraint;
use crate::tensor::Tensor;

pub trait Distribution: Send + Sync {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Tensor;

    /// Joint log-density of all elements of `value`.
    fn log_prob(&self, value: &Tensor) -> f64;

    fn support(&self) -> Constraint {
        Constraint::Real
    }
}

/// Elementwise independent normal.
#[derive(Debug, Clone)]
pub struct Normal {
    loc: Tensor,
    scale: Tensor,
}

impl Normal {
    pub fn new(loc: Tensor, scale: Tensor) -> Self {
        assert!(
            loc.shape() == scale.shape(),
            "loc shape {:?} does not match scale shape {:?}",
            loc.shape(),
            scale.shape()
        );
        assert!(scale.data().iter().all(|&s| s > 0.0), "scale must be positive");
        Self { loc, scale }
    }

    /// Scalar normal from plain floats.
    pub fn scalar(loc: f64, scale: f64) -> Self {
        Self::new(Tensor::scalar(loc), Tensor::scalar(scale))
    }
}

impl Distribution for Normal {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Tensor {
        self.loc.zip_map(&self.scale, |loc, scale| {
            let z: f64 = StandardNormal.sample(rng);
            loc + scale * z
        })
    }

    fn log_prob(&self, value: &Tensor) -> f64 {
        assert!(
            value.shape() == self.loc.shape(),
            "value shape {:?} does not match event shape {:?}",
            value.shape(),
            self.loc.shape()
        );
        const HALF_LOG_TWO_PI: f64 = 0.9189385332046727;
        itertools::izip!(value.data(), self.loc.data(), self.scale.data())
            .map(|(&x, &loc, &scale)| {
                let z = (x - loc) / scale;
                -HALF_LOG_TWO_PI - scale.ln() - 0.5 * z * z
            })
            .sum()
    }
}

/// Elementwise independent exponential with positive support.
#[derive(Debug, Clone)]
pub struct Exponential {
    rate: Tensor,
}

impl Exponential {
    pub fn new(rate: Tensor) -> Self {
        assert!(rate.data().iter().all(|&r| r > 0.0), "rate must be positive");
        Self { rate }
    }

    pub fn scalar(rate: f64) -> Self {
        Self::new(Tensor::scalar(rate))
    }
}

impl Distribution for Exponential {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Tensor {
        self.rate.map(|rate| {
            let e: f64 = Exp1.sample(rng);
            e / rate
        })
    }

    fn log_prob(&self, value: &Tensor) -> f64 {
        assert!(value.shape() == self.rate.shape());
        value
            .data()
            .iter()
            .zip(self.rate.data())
            .map(|(&x, &rate)| {
                if x < 0.0 {
                    f64::NEG_INFINITY
                } else {
                    rate.ln() - rate * x
                }
            })
            .sum()
    }

    fn support(&self) -> Constraint {
        Constraint::Positive
    }
}

/// Point mass: the family a particle guide degenerates to.
#[derive(Debug, Clone)]
pub struct Delta {
    value: Tensor,
}

impl Delta {
    pub fn new(value: Tensor) -> Self {
        Self { value }
    }
}

impl Distribution for Delta {
    fn sample<R: Rng + ?Sized>(&self, _rng: &mut R) -> Tensor {
        self.value.clone()
    }

    fn log_prob(&self, value: &Tensor) -> f64 {
        if value == &self.value {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    }
}
