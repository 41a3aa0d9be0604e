//! Core abstractions for probabilistic programs and guides.
//!
//! Provides the `Program` trait, the seam between the engine and user
//! models: a program is evaluated under a [`Handler`] that interprets its
//! site declarations, and may carry per-call arguments (e.g. minibatches).

use anyhow::Result;

use crate::effects::Handler;
use crate::rng::RngKey;
use crate::tree::Params;

/// A probabilistic program: model or guide.
///
/// Implementations declare their sites through the handler and bubble
/// arbitrary errors; the engine decides the evaluation mode (seeded,
/// substituted, replayed) through the handler it passes in.
pub trait Program: Send + Sync {
    /// Per-call arguments threaded through every evaluation.
    type Args: Sync;

    fn eval(&self, handler: &mut Handler<'_>, args: &Self::Args) -> Result<()>;
}

/// Variational family a guide belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariationalFamily {
    /// One concrete value per particle. The only family the Stein engine
    /// accepts.
    PointMass,
    /// Anything richer than a point mass.
    Full,
}

/// A guide program with the extra capabilities particle inference needs.
pub trait Guide: Program {
    fn family(&self) -> VariationalFamily;

    /// Initial constrained values for the guide's parameter sites, one
    /// independent key per particle. Returned tensors carry a leading
    /// particle axis; implementations may perturb a shared location estimate
    /// so particles start dispersed.
    fn find_init(&self, keys: &[RngKey], args: &Self::Args) -> Result<Params>;
}
