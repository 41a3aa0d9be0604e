//! Stein kernels.
//!
//! A kernel is a differentiable similarity between two monolithic particle
//! vectors; the engine needs its value and its gradient in the second
//! argument. Kernels are built fresh each step from the full particle set so
//! adaptive choices (e.g. a bandwidth derived from the current spread) see
//! every particle, not just a pair.

use faer::Col;

use crate::math::squared_distance;

pub trait Kernel: Send + Sync {
    fn eval(&self, x: &[f64], y: &[f64]) -> f64;

    /// Gradient with respect to the second argument, written into `out`.
    fn grad_second(&self, x: &[f64], y: &[f64], out: &mut [f64]);
}

/// Builds the kernel used for one step from the current particle matrix.
pub trait KernelBuilder: Send + Sync {
    type Kernel: Kernel;

    fn build(&self, particles: &[Col<f64>]) -> Self::Kernel;
}

/// Radial basis function kernel builder.
///
/// With no fixed bandwidth, each build uses the median pairwise distance
/// between the particles handed in.
#[derive(Debug, Clone, Copy, Default)]
pub struct RbfKernelBuilder {
    pub bandwidth: Option<f64>,
}

impl RbfKernelBuilder {
    pub fn with_bandwidth(bandwidth: f64) -> Self {
        assert!(bandwidth > 0.0);
        Self {
            bandwidth: Some(bandwidth),
        }
    }
}

impl KernelBuilder for RbfKernelBuilder {
    type Kernel = RbfKernel;

    fn build(&self, particles: &[Col<f64>]) -> RbfKernel {
        RbfKernel {
            bandwidth: self.bandwidth.unwrap_or_else(|| median_bandwidth(particles)),
            arch: pulp::Arch::new(),
        }
    }
}

/// `k(x, y) = exp(-||x - y||^2 / (2 h^2))`
#[derive(Debug, Clone, Copy)]
pub struct RbfKernel {
    bandwidth: f64,
    arch: pulp::Arch,
}

impl Kernel for RbfKernel {
    fn eval(&self, x: &[f64], y: &[f64]) -> f64 {
        let h2 = self.bandwidth * self.bandwidth;
        self.arch
            .dispatch(|| (-squared_distance(x, y) / (2.0 * h2)).exp())
    }

    fn grad_second(&self, x: &[f64], y: &[f64], out: &mut [f64]) {
        assert!(x.len() == y.len() && y.len() == out.len());
        let h2 = self.bandwidth * self.bandwidth;
        let value = self.eval(x, y);
        self.arch.dispatch(|| {
            itertools::izip!(out.iter_mut(), x, y)
                .for_each(|(out, &x, &y)| *out = value * (x - y) / h2);
        });
    }
}

/// Median pairwise distance between particles; 1 when there are fewer than
/// two of them.
fn median_bandwidth(particles: &[Col<f64>]) -> f64 {
    let n = particles.len();
    if n <= 1 {
        return 1.0;
    }
    let mut distances = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            distances
                .push(squared_distance(particles[i].try_as_col_major().unwrap().as_slice(), particles[j].try_as_col_major().unwrap().as_slice()).sqrt());
        }
    }
    distances.sort_unstable_by(f64::total_cmp);
    distances[distances.len() / 2]
}
