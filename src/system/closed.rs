//! Closed system: the normalised stochastic Schrödinger equation (SSE).
//!
//! The state is the doubled ket y = (z, w) with z = ψ and w = ψ̄ on the
//! physical slice. Each coupling c enters through two bilinear forms,
//!
//!   g = wᵀ M z,   ḡ = wᵀ M' z
//!
//! and, with K = -iH - ½ Σ c†c,
//!
//!   a_z = Kz + Σ (α ḡ cz - β g ḡ z)      b_z = ω (cz - γ g z)
//!   a_w = K̄w + Σ (α g c̄w - β g ḡ w)      b_w = ω̄ (c̄w - γ ḡ w)
//!
//! | detection  | M, M'          | α | β | γ | channel weights ω |
//! |------------|----------------|---|---|---|-------------------|
//! | homodyne   | c + c†, c + c† | ½ | ⅛ | ½ | 1                 |
//! | heterodyne | c, c†          | 1 | ½ | 1 | 1/√2, -i/√2       |
//!
//! Homodyne gives the usual `½ e c ψ - ⅛ e² ψ` drift with e = ⟨c + c†⟩.
//! Heterodyne records both quadratures of `(c - ⟨c⟩)ψ` as two real channels.
//! On w = z̄ the two halves of every field stay conjugate, and off it every
//! field is a polynomial in (z, w).

use std::borrow::Cow;
use std::f64::consts::FRAC_1_SQRT_2;

use num_complex::Complex64;
use num_traits::One;

use super::{Field, StateCache, StochasticSystem};
use crate::linalg::{real, Matrix, StateVector, I};
use crate::operator::TimeOperator;

/// Index of the ψ half.
const Z: usize = 0;
/// Index of the ψ̄ half.
const W: usize = 1;

/// The two halves of a doubled vector.
type Halves = [StateVector; 2];

fn split(x: &StateVector) -> Halves {
    let n = x.len() / 2;
    [x.rows(0, n).into_owned(), x.rows(n, n).into_owned()]
}

/// (ω·z, ω̄·w)
fn join(halves: &Halves, omega: Complex64) -> StateVector {
    let n = halves[Z].len();
    let mut out = StateVector::zeros(2 * n);
    out.rows_mut(0, n).copy_from(&(&halves[Z] * omega));
    out.rows_mut(n, n).copy_from(&(&halves[W] * omega.conj()));
    out
}

/// wᵀ M z
fn form(m: &Matrix, x: &Halves) -> Complex64 {
    x[W].dot(&(m * &x[Z]))
}

/// D_v (wᵀ M z) at x. Also the second derivative D²(wᵀ M z)(x, v).
fn form_d(m: &Matrix, x: &Halves, v: &Halves) -> Complex64 {
    v[W].dot(&(m * &x[Z])) + x[W].dot(&(m * &v[Z]))
}

#[derive(Debug, Clone, Copy)]
struct Scheme {
    alpha: f64,
    beta: f64,
    gamma: f64,
    weights: &'static [Complex64],
}

const HOMODYNE_WEIGHTS: [Complex64; 1] = [Complex64::new(1.0, 0.0)];

const HETERODYNE_WEIGHTS: [Complex64; 2] =
    [Complex64::new(FRAC_1_SQRT_2, 0.0), Complex64::new(0.0, -FRAC_1_SQRT_2)];

impl Scheme {
    const HOMODYNE: Scheme =
        Scheme { alpha: 0.5, beta: 0.125, gamma: 0.5, weights: &HOMODYNE_WEIGHTS };

    const HETERODYNE: Scheme =
        Scheme { alpha: 1.0, beta: 0.5, gamma: 1.0, weights: &HETERODYNE_WEIGHTS };
}

/// One coupling, with every matrix given for the z half and the w half.
#[derive(Debug, Clone)]
struct Coupling {
    c: [Matrix; 2],
    dc: [Matrix; 2],
    /// M, M'
    m: [Matrix; 2],
    /// ∂_t M, ∂_t M'
    dm: [Matrix; 2],
}

impl Coupling {
    /// [g, ḡ]
    fn forms(&self, x: &Halves) -> [Complex64; 2] {
        [form(&self.m[Z], x), form(&self.m[W], x)]
    }

    /// [D_v g, D_v ḡ]
    fn forms_d(&self, x: &Halves, v: &Halves) -> [Complex64; 2] {
        [form_d(&self.m[Z], x, v), form_d(&self.m[W], x, v)]
    }

    /// [∂_t g, ∂_t ḡ]
    fn forms_dt(&self, x: &Halves) -> [Complex64; 2] {
        [form(&self.dm[Z], x), form(&self.dm[W], x)]
    }
}

/// Operators frozen at one instant.
#[derive(Debug, Clone)]
struct Snapshot {
    k: [Matrix; 2],
    dk: [Matrix; 2],
    couplings: Vec<Coupling>,
}

/// Pure-state stochastic system with homodyne or heterodyne detection.
#[derive(Debug, Clone)]
pub struct StochasticClosedSystem {
    hamiltonian: TimeOperator,
    c_ops: Vec<TimeOperator>,
    heterodyne: bool,
    scheme: Scheme,
    snapshot: Snapshot,
    cache: StateCache,
}

impl StochasticClosedSystem {
    /// Build from a Hamiltonian and measured coupling operators.
    ///
    /// With `heterodyne`, every coupling contributes two noise channels.
    pub fn new(hamiltonian: TimeOperator, c_ops: Vec<TimeOperator>, heterodyne: bool) -> Self {
        let scheme = if heterodyne { Scheme::HETERODYNE } else { Scheme::HOMODYNE };
        let dim = 2 * hamiltonian.dim();
        let snapshot = Self::snapshot_of(&hamiltonian, &c_ops, heterodyne, 0.0);
        let cache = StateCache::empty(dim, c_ops.len() * scheme.weights.len());
        Self { hamiltonian, c_ops, heterodyne, scheme, snapshot, cache }
    }

    pub fn heterodyne(&self) -> bool {
        self.heterodyne
    }

    fn snapshot_of(
        hamiltonian: &TimeOperator,
        c_ops: &[TimeOperator],
        heterodyne: bool,
        t: f64,
    ) -> Snapshot {
        let mut k = hamiltonian.at(t) * -I;
        let mut dk = hamiltonian.time_derivative(t) * -I;
        let half = real(0.5);
        let couplings = c_ops
            .iter()
            .map(|op| {
                let c = op.at(t);
                let dc = op.time_derivative(t);
                let c_dag = c.adjoint();
                let dc_dag = dc.adjoint();
                // K -= ½ c†c,  ∂_t K -= ½ (∂c† c + c† ∂c)
                k -= (&c_dag * &c) * half;
                dk -= (&dc_dag * &c + &c_dag * &dc) * half;
                let (m, dm) = if heterodyne {
                    ([c.clone(), c_dag], [dc.clone(), dc_dag])
                } else {
                    let m = &c + c_dag;
                    let dm = &dc + dc_dag;
                    ([m.clone(), m], [dm.clone(), dm])
                };
                let (c_bar, dc_bar) = (c.conjugate(), dc.conjugate());
                Coupling { c: [c, c_bar], dc: [dc, dc_bar], m, dm }
            })
            .collect();
        let (k_bar, dk_bar) = (k.conjugate(), dk.conjugate());
        Snapshot { k: [k, k_bar], dk: [dk, dk_bar], couplings }
    }

    /// Coupling and weight behind noise channel `channel`.
    fn channel(&self, channel: usize) -> (&Coupling, Complex64) {
        let weights = self.scheme.weights;
        (&self.snapshot.couplings[channel / weights.len()], weights[channel % weights.len()])
    }

    fn drift_at(&self, snapshot: &Snapshot, x: &Halves) -> StateVector {
        let Scheme { alpha, beta, .. } = self.scheme;
        let one = Complex64::one();
        let mut out = [&snapshot.k[Z] * &x[Z], &snapshot.k[W] * &x[W]];
        for cp in &snapshot.couplings {
            let g = cp.forms(x);
            let p = g[Z] * g[W];
            for h in [Z, W] {
                out[h].axpy(real(alpha) * g[1 - h], &(&cp.c[h] * &x[h]), one);
                out[h].axpy(real(-beta) * p, &x[h], one);
            }
        }
        join(&out, one)
    }

    fn diffusion_at(&self, snapshot: &Snapshot, x: &Halves) -> Vec<StateVector> {
        let gamma = real(self.scheme.gamma);
        let mut out = Vec::with_capacity(snapshot.couplings.len() * self.scheme.weights.len());
        for cp in &snapshot.couplings {
            let g = cp.forms(x);
            let centred = [Z, W].map(|h| {
                let mut b = &cp.c[h] * &x[h];
                b.axpy(-gamma * g[h], &x[h], Complex64::one());
                b
            });
            out.extend(self.scheme.weights.iter().map(|&omega| join(&centred, omega)));
        }
        out
    }

    /// Operators at `t`, reusing the cached ones when `t` is the cached time.
    fn snapshot_at(&self, t: f64) -> Cow<'_, Snapshot> {
        if t == self.cache.t {
            Cow::Borrowed(&self.snapshot)
        } else {
            Cow::Owned(Self::snapshot_of(&self.hamiltonian, &self.c_ops, self.heterodyne, t))
        }
    }
}

impl StochasticSystem for StochasticClosedSystem {
    fn dim(&self) -> usize {
        2 * self.hamiltonian.dim()
    }

    fn num_collapse(&self) -> usize {
        self.c_ops.len() * self.scheme.weights.len()
    }

    fn drift(&self, t: f64, state: &StateVector) -> StateVector {
        self.drift_at(&self.snapshot_at(t), &split(state))
    }

    fn diffusion(&self, t: f64, state: &StateVector) -> Vec<StateVector> {
        self.diffusion_at(&self.snapshot_at(t), &split(state))
    }

    fn drift_increment(&self, t: f64, state: &StateVector, step: &StateVector) -> StateVector {
        let Scheme { alpha, beta, .. } = self.scheme;
        let one = Complex64::one();
        let snapshot = self.snapshot_at(t);
        let (x, d) = (split(state), split(step));
        let moved = split(&(state + step));
        let mut out = [&snapshot.k[Z] * &d[Z], &snapshot.k[W] * &d[W]];
        for cp in &snapshot.couplings {
            let g = cp.forms(&x);
            let dg = increment_forms(cp, &x, &d);
            let g1 = [g[Z] + dg[Z], g[W] + dg[W]];
            let p = g[Z] * g[W];
            let dp = dg[Z] * g[W] + g1[Z] * dg[W];
            for h in [Z, W] {
                out[h].axpy(real(alpha) * dg[1 - h], &(&cp.c[h] * &x[h]), one);
                out[h].axpy(real(alpha) * g1[1 - h], &(&cp.c[h] * &d[h]), one);
                out[h].axpy(real(-beta) * dp, &moved[h], one);
                out[h].axpy(real(-beta) * p, &d[h], one);
            }
        }
        join(&out, one)
    }

    fn diffusion_increment(
        &self,
        t: f64,
        state: &StateVector,
        step: &StateVector,
    ) -> Vec<StateVector> {
        let gamma = real(self.scheme.gamma);
        let snapshot = self.snapshot_at(t);
        let (x, d) = (split(state), split(step));
        let moved = split(&(state + step));
        let mut out = Vec::with_capacity(self.num_collapse());
        for cp in &snapshot.couplings {
            let g = cp.forms(&x);
            let dg = increment_forms(cp, &x, &d);
            let centred = [Z, W].map(|h| {
                let mut b = &cp.c[h] * &d[h];
                b.axpy(-gamma * dg[h], &moved[h], Complex64::one());
                b.axpy(-gamma * g[h], &d[h], Complex64::one());
                b
            });
            out.extend(self.scheme.weights.iter().map(|&omega| join(&centred, omega)));
        }
        out
    }

    fn set_state(&mut self, t: f64, state: &StateVector) {
        self.snapshot = Self::snapshot_of(&self.hamiltonian, &self.c_ops, self.heterodyne, t);
        self.cache = StateCache::evaluate(&*self, t, state);
    }

    fn cache(&self) -> &StateCache {
        &self.cache
    }

    fn time_derivative(&self, field: Field) -> StateVector {
        let x = split(&self.cache.state);
        let one = Complex64::one();
        match field {
            Field::Drift => {
                let Scheme { alpha, beta, .. } = self.scheme;
                let snapshot = &self.snapshot;
                let mut out = [&snapshot.dk[Z] * &x[Z], &snapshot.dk[W] * &x[W]];
                for cp in &snapshot.couplings {
                    let g = cp.forms(&x);
                    let dg = cp.forms_dt(&x);
                    let dp = dg[Z] * g[W] + g[Z] * dg[W];
                    for h in [Z, W] {
                        out[h].axpy(real(alpha) * dg[1 - h], &(&cp.c[h] * &x[h]), one);
                        out[h].axpy(real(alpha) * g[1 - h], &(&cp.dc[h] * &x[h]), one);
                        out[h].axpy(real(-beta) * dp, &x[h], one);
                    }
                }
                join(&out, one)
            }
            Field::Diffusion(k) => {
                let (cp, omega) = self.channel(k);
                let dg = cp.forms_dt(&x);
                let gamma = real(self.scheme.gamma);
                let out = [Z, W].map(|h| {
                    let mut b = &cp.dc[h] * &x[h];
                    b.axpy(-gamma * dg[h], &x[h], one);
                    b
                });
                join(&out, omega)
            }
        }
    }

    fn first_derivative(&self, field: Field, v: &StateVector) -> StateVector {
        let x = split(&self.cache.state);
        let v = split(v);
        let one = Complex64::one();
        match field {
            Field::Drift => {
                let Scheme { alpha, beta, .. } = self.scheme;
                let snapshot = &self.snapshot;
                let mut out = [&snapshot.k[Z] * &v[Z], &snapshot.k[W] * &v[W]];
                for cp in &snapshot.couplings {
                    let g = cp.forms(&x);
                    let dg = cp.forms_d(&x, &v);
                    let p = g[Z] * g[W];
                    let dp = dg[Z] * g[W] + g[Z] * dg[W];
                    for h in [Z, W] {
                        out[h].axpy(real(alpha) * dg[1 - h], &(&cp.c[h] * &x[h]), one);
                        out[h].axpy(real(alpha) * g[1 - h], &(&cp.c[h] * &v[h]), one);
                        out[h].axpy(real(-beta) * dp, &x[h], one);
                        out[h].axpy(real(-beta) * p, &v[h], one);
                    }
                }
                join(&out, one)
            }
            Field::Diffusion(k) => {
                let (cp, omega) = self.channel(k);
                let g = cp.forms(&x);
                let dg = cp.forms_d(&x, &v);
                let gamma = real(self.scheme.gamma);
                let out = [Z, W].map(|h| {
                    let mut b = &cp.c[h] * &v[h];
                    b.axpy(-gamma * dg[h], &x[h], one);
                    b.axpy(-gamma * g[h], &v[h], one);
                    b
                });
                join(&out, omega)
            }
        }
    }

    fn second_derivative(&self, field: Field, u: &StateVector, v: &StateVector) -> StateVector {
        let x = split(&self.cache.state);
        let (u, v) = (split(u), split(v));
        let one = Complex64::one();
        match field {
            Field::Drift => {
                let Scheme { alpha, beta, .. } = self.scheme;
                let mut out = [StateVector::zeros(x[Z].len()), StateVector::zeros(x[W].len())];
                for cp in &self.snapshot.couplings {
                    let g = cp.forms(&x);
                    let gu = cp.forms_d(&x, &u);
                    let gv = cp.forms_d(&x, &v);
                    let guv = cp.forms_d(&u, &v);
                    let pu = gu[Z] * g[W] + g[Z] * gu[W];
                    let pv = gv[Z] * g[W] + g[Z] * gv[W];
                    let puv = guv[Z] * g[W] + gu[Z] * gv[W] + gv[Z] * gu[W] + g[Z] * guv[W];
                    for h in [Z, W] {
                        let o = 1 - h;
                        out[h].axpy(real(alpha) * guv[o], &(&cp.c[h] * &x[h]), one);
                        out[h].axpy(real(alpha) * gu[o], &(&cp.c[h] * &v[h]), one);
                        out[h].axpy(real(alpha) * gv[o], &(&cp.c[h] * &u[h]), one);
                        out[h].axpy(real(-beta) * puv, &x[h], one);
                        out[h].axpy(real(-beta) * pu, &v[h], one);
                        out[h].axpy(real(-beta) * pv, &u[h], one);
                    }
                }
                join(&out, one)
            }
            Field::Diffusion(k) => {
                let (cp, omega) = self.channel(k);
                let gu = cp.forms_d(&x, &u);
                let gv = cp.forms_d(&x, &v);
                let guv = cp.forms_d(&u, &v);
                let gamma = real(-self.scheme.gamma);
                let out = [Z, W].map(|h| {
                    let mut b = &x[h] * (gamma * guv[h]);
                    b.axpy(gamma * gu[h], &v[h], one);
                    b.axpy(gamma * gv[h], &u[h], one);
                    b
                });
                join(&out, omega)
            }
        }
    }
}

/// [Δg, Δḡ] for a step d from x, expanded exactly.
fn increment_forms(cp: &Coupling, x: &Halves, d: &Halves) -> [Complex64; 2] {
    let dg = cp.forms_d(x, d);
    let dd = cp.forms(d);
    [dg[Z] + dd[Z], dg[W] + dd[W]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{basis, destroy, doubled, num, qeye};
    use crate::operator::Coefficient;
    use approx::assert_relative_eq;

    fn lossy_cavity(heterodyne: bool) -> StochasticClosedSystem {
        StochasticClosedSystem::new(
            TimeOperator::constant(num(4)),
            vec![TimeOperator::constant(destroy(4))],
            heterodyne,
        )
    }

    fn driven_cavity(heterodyne: bool) -> StochasticClosedSystem {
        let x = destroy(4) + destroy(4).adjoint();
        StochasticClosedSystem::new(
            TimeOperator::constant(num(4)),
            vec![
                TimeOperator::constant(num(4)).with_term(x, Coefficient::Linear),
                TimeOperator::constant(destroy(4) * destroy(4)),
            ],
            heterodyne,
        )
    }

    fn superposition() -> StateVector {
        let psi = (basis(4, 1) + basis(4, 2) * I) * real(FRAC_1_SQRT_2);
        doubled(&psi)
    }

    /// The ψ half of a doubled vector.
    fn ket_half(y: &StateVector) -> StateVector {
        y.rows(0, y.len() / 2).into_owned()
    }

    #[test]
    fn heterodyne_doubles_the_noise_channels() {
        assert_eq!(lossy_cavity(false).num_collapse(), 1);
        let het = lossy_cavity(true);
        assert!(het.heterodyne());
        assert_eq!(het.num_collapse(), 2);
        assert_eq!(het.dim(), 8);
        assert_eq!(het.diffusion(0.0, &doubled(&basis(4, 2))).len(), 2);
    }

    #[test]
    fn free_evolution_is_a_phase_rotation() {
        let system = StochasticClosedSystem::new(TimeOperator::constant(qeye(3)), vec![], false);
        let y = doubled(&basis(3, 1));
        let a = system.drift(0.0, &y);
        // -iHψ with H = 𝟙, and its conjugate in the second half
        assert_relative_eq!(a[1].im, -1.0);
        assert_relative_eq!(a[1].re, 0.0);
        assert_relative_eq!(a[4].im, 1.0);
        assert!(system.diffusion(0.0, &y).is_empty());
    }

    #[test]
    fn homodyne_fields_match_the_ket_equation() {
        // a = Kψ + ½ e aψ - ⅛ e² ψ,  b = aψ - ½ e ψ,  e = ⟨a + a†⟩
        let system = lossy_cavity(false);
        let y = superposition();
        let psi = ket_half(&y);
        let c = destroy(4);
        let m = &c + c.adjoint();
        let e = psi.dotc(&(&m * &psi));
        let k = num(4) * -I - (c.adjoint() * &c) * real(0.5);
        let mut a = &k * &psi;
        a += (&c * &psi) * (real(0.5) * e) - &psi * (real(0.125) * e * e);
        let b = &c * &psi - &psi * (real(0.5) * e);
        assert!((ket_half(&system.drift(0.0, &y)) - a).norm() < 1e-14);
        assert!((ket_half(&system.diffusion(0.0, &y)[0]) - b).norm() < 1e-14);
    }

    #[test]
    fn heterodyne_channels_are_quadratures_of_the_centred_jump() {
        let system = lossy_cavity(true);
        let y = superposition();
        let psi = ket_half(&y);
        let c = destroy(4);
        let mean = psi.dotc(&(&c * &psi));
        let centred = &c * &psi - &psi * mean;
        let b = system.diffusion(0.0, &y);
        assert!((ket_half(&b[0]) - &centred * real(FRAC_1_SQRT_2)).norm() < 1e-14);
        assert!((ket_half(&b[1]) - &centred * Complex64::new(0.0, -FRAC_1_SQRT_2)).norm() < 1e-14);
    }

    #[test]
    fn fields_stay_on_the_physical_slice() {
        let system = driven_cavity(true);
        let y = superposition();
        let n = 4;
        for f in std::iter::once(system.drift(0.3, &y)).chain(system.diffusion(0.3, &y)) {
            for i in 0..n {
                assert_relative_eq!((f[i].conj() - f[i + n]).norm(), 0.0, epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn measurement_eigenstates_do_not_diffuse() {
        // c = n, ψ = |2⟩: e = ⟨2|2n|2⟩ = 4, b = nψ - 2ψ = 0
        let system = StochasticClosedSystem::new(
            TimeOperator::constant(qeye(4)),
            vec![TimeOperator::constant(num(4))],
            false,
        );
        let b = system.diffusion(0.0, &doubled(&basis(4, 2)));
        assert!(b[0].norm() < 1e-14);
    }

    #[test]
    fn set_state_caches_drift_and_diffusion() {
        let mut system = lossy_cavity(false);
        let y = doubled(&basis(4, 2));
        system.set_state(0.0, &y);
        assert_eq!(system.a(), &system.drift(0.0, &y));
        assert_eq!(system.bi(0), &system.diffusion(0.0, &y)[0]);
        assert_eq!(system.state(), &y);
    }

    #[test]
    fn increments_match_differences_of_evaluations() {
        for heterodyne in [false, true] {
            let system = driven_cavity(heterodyne);
            let y = superposition();
            let d = StateVector::from_fn(8, |i, _| Complex64::new(0.01 * i as f64 - 0.03, 0.02));
            let moved = &y + &d;
            let da = system.drift(0.2, &moved) - system.drift(0.2, &y);
            assert!((system.drift_increment(0.2, &y, &d) - da).norm() < 1e-13);
            let b0 = system.diffusion(0.2, &y);
            let b1 = system.diffusion(0.2, &moved);
            for (k, inc) in system.diffusion_increment(0.2, &y, &d).iter().enumerate() {
                assert!((inc - (&b1[k] - &b0[k])).norm() < 1e-13, "channel {k}");
            }
        }
    }

    #[test]
    fn derivatives_match_central_differences() {
        for heterodyne in [false, true] {
            let mut system = driven_cavity(heterodyne);
            let y = superposition();
            system.set_state(0.3, &y);
            let v = StateVector::from_fn(8, |i, _| Complex64::new(0.3 * i as f64 - 0.4, 0.1));
            let h = 1e-5;
            let last = system.num_collapse() - 1;
            for field in [Field::Drift, Field::Diffusion(0), Field::Diffusion(last)] {
                let eval = |t: f64, x: &StateVector| match field {
                    Field::Drift => system.drift(t, x),
                    Field::Diffusion(k) => system.diffusion(t, x).swap_remove(k),
                };
                let numeric = (eval(0.3, &(&y + &v * real(h))) - eval(0.3, &(&y - &v * real(h))))
                    * real(0.5 / h);
                let analytic = system.first_derivative(field, &v);
                assert!((&numeric - &analytic).norm() < 1e-8, "{field:?}: D");

                let numeric = (eval(0.3 + h, &y) - eval(0.3 - h, &y)) * real(0.5 / h);
                let analytic = system.time_derivative(field);
                assert!((&numeric - &analytic).norm() < 1e-8, "{field:?}: ∂_t");
            }
        }
    }

    #[test]
    fn second_derivative_is_symmetric() {
        let mut system = driven_cavity(true);
        system.set_state(0.0, &superposition());
        let u = StateVector::from_fn(8, |i, _| Complex64::new(i as f64, 1.0));
        let v = StateVector::from_fn(8, |i, _| Complex64::new(1.0, -(i as f64)));
        for field in [Field::Drift, Field::Diffusion(1)] {
            let uv = system.second_derivative(field, &u, &v);
            let vu = system.second_derivative(field, &v, &u);
            assert!((uv - vu).norm() < 1e-12);
        }
    }
}
