//! Approximate Bayesian posteriors with Stein variational gradient descent.

pub(crate) mod constraint;
pub(crate) mod dist;
pub(crate) mod effects;
pub(crate) mod force;
pub(crate) mod grad;
pub(crate) mod guide;
pub(crate) mod kernel;
pub(crate) mod math;
pub(crate) mod optimizer;
pub(crate) mod program;
pub(crate) mod ravel;
pub(crate) mod rng;
pub(crate) mod svgd;
pub(crate) mod tensor;
pub(crate) mod tree;

pub use constraint::{biject_to, Constraint, Transform, TransformTable};
pub use dist::{Delta, Distribution, Exponential, Normal};
pub use effects::{Handler, ModelError, ParamSite, SampleSite, Site, Trace};
pub use guide::AutoDelta;
pub use kernel::{Kernel, KernelBuilder, RbfKernel, RbfKernelBuilder};
pub use optimizer::{Adam, AdamOptions, AdamState, Optimizer, Sgd, SgdState};
pub use program::{Guide, Program, VariationalFamily};
pub use ravel::{ravel_tree, TreeRavel};
pub use rng::RngKey;
pub use svgd::{Partition, Setup, Svgd, SvgdError, SvgdSettings, SvgdState};
pub use tensor::{DType, Tensor};
pub use tree::{ParamTree, Params, TreeDef};
