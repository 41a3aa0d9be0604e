use criterion::{black_box, criterion_group, criterion_main, Criterion};
use svgd_rs::{
    Adam, AutoDelta, Handler, Normal, Program, RbfKernelBuilder, RngKey, Svgd, SvgdSettings,
    Tensor,
};

struct ConjugateNormal;

impl Program for ConjugateNormal {
    type Args = ();

    fn eval(&self, handler: &mut Handler<'_>, _args: &()) -> anyhow::Result<()> {
        let latent = handler.sample("latent", &Normal::scalar(0.0, 1.0))?;
        let lik = Normal::new(latent, Tensor::scalar(1.0));
        handler.observe("y", &lik, &Tensor::scalar(1.0))?;
        Ok(())
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    for num_particles in [4, 32] {
        let engine = Svgd::new(
            ConjugateNormal,
            AutoDelta::new(ConjugateNormal),
            Adam::new(0.05),
            RbfKernelBuilder::default(),
            SvgdSettings {
                num_stein_particles: num_particles,
                num_loss_particles: 1,
            },
        )
        .unwrap();
        let state = engine.init(RngKey::new(0), &()).unwrap();

        c.bench_function(&format!("update {num_particles} particles"), |b| {
            b.iter(|| engine.update(black_box(&state), &()).unwrap())
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
