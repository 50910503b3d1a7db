use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stochastic_taylor::finite_diff::{DiffusionField, DriftField};
use stochastic_taylor::{
    check_convergence, ConvergenceConfig, FiniteDifference, FiniteL0, FiniteLL, StochasticSystem,
    SystemConfig, SystemKind,
};

fn benchmark_finite_differences(c: &mut Criterion) {
    for kind in [SystemKind::Closed, SystemKind::Open] {
        let config = SystemConfig { kind, heterodyne: true, ..SystemConfig::default() };
        let mut system = config.build().expect("default configuration");
        let state = config.initial_state().expect("initial state");
        system.set_state(0.0, &state);
        let system = system.as_ref();

        c.bench_function(&format!("{kind}_finite_l0_drift"), |b| {
            let op = FiniteL0::new(system, DriftField::new(system));
            b.iter(|| op.apply(0.0, black_box(&state), 1e-4));
        });

        c.bench_function(&format!("{kind}_finite_ll_diffusion"), |b| {
            let op = FiniteLL::new(system, 1, 0, DiffusionField::new(system, 1));
            b.iter(|| op.apply(0.0, black_box(&state), 1e-4));
        });

        c.bench_function(&format!("{kind}_convergence_liljbk"), |b| {
            let op = FiniteLL::new(system, 1, 0, DiffusionField::new(system, 1));
            let target = system.liljbk(1, 0, 1);
            let sweep = ConvergenceConfig::default();
            b.iter(|| check_convergence(&op, &target, 0.0, black_box(&state), &sweep));
        });
    }
}

fn benchmark_full_check(c: &mut Criterion) {
    c.bench_function("sse_derivative_check", |b| {
        let config = SystemConfig::default();
        b.iter(|| config.run(&ConvergenceConfig::default()).expect("run"));
    });
}

criterion_group!(benches, benchmark_finite_differences, benchmark_full_check);
criterion_main!(benches);
