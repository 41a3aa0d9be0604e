//! Parameter constraints and the bijections that remove them.
//!
//! Optimization happens in unconstrained space; each discovered site carries
//! a constraint describing its valid support, and [`biject_to`] builds the
//! transform mapping unconstrained values onto that support. The per-site
//! transforms are compiled once at initialization into a [`TransformTable`],
//! an explicit immutable value reused for every subsequent step.

use std::collections::BTreeMap;

use crate::tensor::Tensor;
use crate::tree::Params;

/// Support of a parameter site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    Real,
    Positive,
    Interval { low: f64, high: f64 },
}

/// Bijection from unconstrained reals onto a constrained support.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Identity,
    /// `exp` onto the positive reals.
    Exp,
    /// Scaled logistic onto a bounded interval.
    Sigmoid { low: f64, high: f64 },
}

/// The transform whose image is the given constraint's support.
pub fn biject_to(constraint: Constraint) -> Transform {
    match constraint {
        Constraint::Real => Transform::Identity,
        Constraint::Positive => Transform::Exp,
        Constraint::Interval { low, high } => {
            assert!(low < high, "empty interval [{low}, {high}]");
            Transform::Sigmoid { low, high }
        }
    }
}

impl Transform {
    fn forward_value(&self, u: f64) -> f64 {
        match *self {
            Transform::Identity => u,
            Transform::Exp => u.exp(),
            Transform::Sigmoid { low, high } => low + (high - low) / (1.0 + (-u).exp()),
        }
    }

    fn inverse_value(&self, x: f64) -> f64 {
        match *self {
            Transform::Identity => x,
            Transform::Exp => x.ln(),
            Transform::Sigmoid { low, high } => {
                let unit = (x - low) / (high - low);
                (unit / (1.0 - unit)).ln()
            }
        }
    }

    /// Map an unconstrained tensor onto the constrained support.
    pub fn forward(&self, unconstrained: &Tensor) -> Tensor {
        unconstrained.map(|v| self.forward_value(v))
    }

    /// Map a constrained tensor back to unconstrained space.
    pub fn inverse(&self, constrained: &Tensor) -> Tensor {
        constrained.map(|v| self.inverse_value(v))
    }
}

/// Per-site transforms, applied as a pure function of a parameter dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformTable {
    transforms: BTreeMap<String, Transform>,
}

impl TransformTable {
    pub fn insert(&mut self, name: impl Into<String>, transform: Transform) {
        self.transforms.insert(name.into(), transform);
    }

    pub fn get(&self, name: &str) -> Option<Transform> {
        self.transforms.get(name).copied()
    }

    /// Apply the forward transforms; sites without an entry pass through.
    pub fn constrain(&self, params: &Params) -> Params {
        params
            .iter()
            .map(|(name, value)| {
                let value = match self.transforms.get(name) {
                    Some(transform) => transform.forward(value),
                    None => value.clone(),
                };
                (name.clone(), value)
            })
            .collect()
    }
}
