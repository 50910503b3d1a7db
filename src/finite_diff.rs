//! Finite-difference approximations of the Itô–Taylor generators.
//!
//! For a field `f(t, x)` and a system with drift `a` and diffusions `b_k`,
//! the operators below approximate
//!
//!   L0 f     = ∂_t f + J·a + ½ Σ_k Σ_ij ∂_i∂_j f ⟨e_i, b_k⟩⟨e_j, b_k⟩
//!   L^ii f   = J·b_ii
//!   L^ii L^jj f = Σ_ij ∂_i∂_j f ⟨e_i, b_ii⟩⟨e_j, b_jj⟩
//!               + Σ_ij ∂_j f ⟨e_i, b_ii⟩⟨e_j, ∂_i b_jj⟩
//!
//! from increments Δf(d) = f(x + d) - f(x) along the real basis
//! directions `e_i`. Every stencil is one-sided, so the error is first order
//! in `h`:
//!
//!   ∂_i f      ≈ Δf(h e_i) / h
//!   ∂_i∂_j f   ≈ [Δf(h e_i + h e_j) - Δf(h e_i) - Δf(h e_j)] / h²
//!
//! Since `e_i` is real, ⟨e_i, b⟩ = b[i]. Fields of a system take Δf from
//! [`StochasticSystem::drift_increment`] and
//! [`StochasticSystem::diffusion_increment`]; other fields subtract two
//! evaluations.
//!
//! Evaluations whose weight is exactly zero are skipped; the sums are
//! otherwise accumulated as written above.

use num_complex::Complex64;
use num_traits::{One, Zero};

use crate::linalg::{real, unit_step, Matrix, StateVector};
use crate::system::StochasticSystem;

/// Step used when the caller does not supply one.
pub const DEFAULT_STEP: f64 = 1e-6;

/// A vector field f(t, x).
pub trait VectorField: Sync {
    fn eval(&self, t: f64, state: &StateVector) -> StateVector;

    /// f(t, x + d) - f(t, x)
    fn increment(&self, t: f64, state: &StateVector, step: &StateVector) -> StateVector {
        self.eval(t, &(state + step)) - self.eval(t, state)
    }
}

/// Closure adapter for [`VectorField`].
#[derive(Debug, Clone, Copy)]
pub struct FnField<F>(F);

/// Wrap a closure as a [`VectorField`].
pub fn from_fn<F>(f: F) -> FnField<F>
where
    F: Fn(f64, &StateVector) -> StateVector + Sync,
{
    FnField(f)
}

impl<F> VectorField for FnField<F>
where
    F: Fn(f64, &StateVector) -> StateVector + Sync,
{
    fn eval(&self, t: f64, state: &StateVector) -> StateVector {
        (self.0)(t, state)
    }
}

/// The drift a(t, x) of a system, as a field.
#[derive(Debug)]
pub struct DriftField<'a, S: ?Sized> {
    system: &'a S,
}

impl<'a, S: StochasticSystem + ?Sized> DriftField<'a, S> {
    pub fn new(system: &'a S) -> Self {
        Self { system }
    }
}

impl<S: StochasticSystem + ?Sized> VectorField for DriftField<'_, S> {
    fn eval(&self, t: f64, state: &StateVector) -> StateVector {
        self.system.drift(t, state)
    }

    fn increment(&self, t: f64, state: &StateVector, step: &StateVector) -> StateVector {
        self.system.drift_increment(t, state, step)
    }
}

/// One diffusion channel b_k(t, x) of a system, as a field.
#[derive(Debug)]
pub struct DiffusionField<'a, S: ?Sized> {
    system: &'a S,
    channel: usize,
}

impl<'a, S: StochasticSystem + ?Sized> DiffusionField<'a, S> {
    pub fn new(system: &'a S, channel: usize) -> Self {
        Self { system, channel }
    }
}

impl<S: StochasticSystem + ?Sized> VectorField for DiffusionField<'_, S> {
    fn eval(&self, t: f64, state: &StateVector) -> StateVector {
        self.system.diffusion(t, state).swap_remove(self.channel)
    }

    fn increment(&self, t: f64, state: &StateVector, step: &StateVector) -> StateVector {
        self.system.diffusion_increment(t, state, step).swap_remove(self.channel)
    }
}

/// An operator evaluated at `(t, x)` with an explicit step size.
pub trait FiniteDifference: Sync {
    fn apply(&self, t: f64, state: &StateVector, dt: f64) -> StateVector;

    /// [`apply`](Self::apply) with [`DEFAULT_STEP`].
    fn apply_default(&self, t: f64, state: &StateVector) -> StateVector {
        self.apply(t, state, DEFAULT_STEP)
    }
}

/// Δf(h e_i) for every basis direction.
fn increments<F: VectorField + ?Sized>(
    field: &F,
    t: f64,
    state: &StateVector,
    dt: f64,
) -> Vec<StateVector> {
    let n = state.len();
    (0..n).map(|i| field.increment(t, state, &unit_step(n, i, dt))).collect()
}

/// Matrix whose column i is `scale·Δf_i`.
fn jacobian(steps: &[StateVector], scale: f64) -> Matrix {
    let rows = steps.first().map_or(0, |s| s.len());
    let mut jac = Matrix::zeros(rows, steps.len());
    for (i, step) in steps.iter().enumerate() {
        jac.set_column(i, &(step * real(scale)));
    }
    jac
}

/// Stencil for ∂_i∂_j f; `steps` holds Δf(h e_k) for every k.
fn second_difference<F: VectorField + ?Sized>(
    field: &F,
    (t, state): (f64, &StateVector),
    (i, j): (usize, usize),
    dt: f64,
    steps: &[StateVector],
) -> StateVector {
    let mut diagonal = unit_step(state.len(), i, dt);
    diagonal[j] += real(dt);
    let mut sec = field.increment(t, state, &diagonal) - &steps[i];
    sec -= &steps[j];
    sec * real(1.0 / (dt * dt))
}

/// Finite-difference L0 f.
pub struct FiniteL0<'a, S: ?Sized, F> {
    system: &'a S,
    field: F,
}

impl<'a, S: StochasticSystem + ?Sized, F: VectorField> FiniteL0<'a, S, F> {
    pub fn new(system: &'a S, field: F) -> Self {
        Self { system, field }
    }
}

impl<S: StochasticSystem + ?Sized, F: VectorField> FiniteDifference for FiniteL0<'_, S, F> {
    fn apply(&self, t: f64, state: &StateVector, dt: f64) -> StateVector {
        let one = Complex64::one();

        // ∂_t f
        let mut out = (self.field.eval(t + dt, state) - self.field.eval(t, state)) * real(1.0 / dt);

        // J·a
        let steps = increments(&self.field, t, state, dt);
        out += jacobian(&steps, 1.0 / dt) * self.system.drift(t, state);

        // ½ Σ_k ∂_i∂_j f b_k[i] b_k[j]
        let b = self.system.diffusion(t, state);
        let n = state.len();
        for i in 0..n {
            for j in 0..n {
                let weight: Complex64 = b.iter().map(|bk| bk[i] * bk[j]).sum();
                if weight.is_zero() {
                    continue;
                }
                let sec = second_difference(&self.field, (t, state), (i, j), dt, &steps);
                out.axpy(weight * real(0.5), &sec, one);
            }
        }
        out
    }
}

/// Finite-difference L^ii f.
pub struct FiniteL<'a, S: ?Sized, F> {
    system: &'a S,
    channel: usize,
    field: F,
}

impl<'a, S: StochasticSystem + ?Sized, F: VectorField> FiniteL<'a, S, F> {
    pub fn new(system: &'a S, channel: usize, field: F) -> Self {
        Self { system, channel, field }
    }
}

impl<S: StochasticSystem + ?Sized, F: VectorField> FiniteDifference for FiniteL<'_, S, F> {
    fn apply(&self, t: f64, state: &StateVector, dt: f64) -> StateVector {
        let steps = increments(&self.field, t, state, dt);
        let b = self.system.diffusion(t, state).swap_remove(self.channel);
        (jacobian(&steps, 1.0) * b) * real(1.0 / dt)
    }
}

/// Finite-difference L^ii L^jj f.
///
/// The second term differentiates b_jj itself along e_i, so the result is
/// the full composition L^ii(L^jj f) rather than the symmetric Hessian
/// contraction alone.
pub struct FiniteLL<'a, S: ?Sized, F> {
    system: &'a S,
    first: usize,
    second: usize,
    field: F,
}

impl<'a, S: StochasticSystem + ?Sized, F: VectorField> FiniteLL<'a, S, F> {
    /// L^first L^second f
    pub fn new(system: &'a S, first: usize, second: usize, field: F) -> Self {
        Self { system, first, second, field }
    }
}

impl<S: StochasticSystem + ?Sized, F: VectorField> FiniteDifference for FiniteLL<'_, S, F> {
    fn apply(&self, t: f64, state: &StateVector, dt: f64) -> StateVector {
        let one = Complex64::one();
        let n = state.len();
        let b = self.system.diffusion(t, state);
        let (bi, bj) = (&b[self.first], &b[self.second]);
        let steps = increments(&self.field, t, state, dt);
        let rows = steps.first().map_or(0, |s| s.len());
        let mut out = StateVector::from_element(rows, Complex64::zero());

        for i in 0..n {
            // both terms carry ⟨e_i, b_ii⟩
            if bi[i].is_zero() {
                continue;
            }
            let db = self
                .system
                .diffusion_increment(t, state, &unit_step(n, i, dt))
                .swap_remove(self.second)
                * real(1.0 / dt);
            for j in 0..n {
                let w_sec = bi[i] * bj[j];
                if !w_sec.is_zero() {
                    let sec = second_difference(&self.field, (t, state), (i, j), dt, &steps);
                    out.axpy(w_sec, &sec, one);
                }
                let w_df = bi[i] * db[j];
                if !w_df.is_zero() {
                    out.axpy(w_df * real(1.0 / dt), &steps[j], one);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{basis, destroy, doubled, ket2dm, num, qeye};
    use crate::operator::TimeOperator;
    use crate::system::{StochasticClosedSystem, StochasticOpenSystem};

    fn identity() -> FnField<impl Fn(f64, &StateVector) -> StateVector + Sync> {
        from_fn(|_t: f64, x: &StateVector| x.clone())
    }

    fn closed(n: usize) -> StochasticClosedSystem {
        StochasticClosedSystem::new(
            TimeOperator::constant(qeye(n)),
            vec![TimeOperator::constant(destroy(n))],
            false,
        )
    }

    fn two_channel_open(n: usize, heterodyne: bool) -> StochasticOpenSystem {
        StochasticOpenSystem::new(
            TimeOperator::constant(num(n)),
            vec![TimeOperator::constant(destroy(n)), TimeOperator::constant(num(n))],
            heterodyne,
        )
    }

    #[test]
    fn l0_of_identity_field_is_the_drift() {
        let system = closed(5);
        let y = doubled(&basis(5, 3));
        let l0 = FiniteL0::new(&system, identity()).apply_default(0.0, &y);
        let a = system.drift(0.0, &y);
        assert!((&l0 - &a).norm() < 1e-6, "L0(id) = {l0}, a = {a}");
    }

    #[test]
    fn l_of_identity_field_is_the_diffusion() {
        let system = StochasticClosedSystem::new(
            TimeOperator::constant(num(5)),
            vec![TimeOperator::constant(destroy(5)), TimeOperator::constant(num(5))],
            true,
        );
        let psi = (basis(5, 1) + basis(5, 3)) * real(std::f64::consts::FRAC_1_SQRT_2);
        let y = doubled(&psi);
        let b = system.diffusion(0.0, &y);
        for (k, bk) in b.iter().enumerate() {
            let lk = FiniteL::new(&system, k, identity()).apply_default(0.0, &y);
            assert!((&lk - bk).norm() < 1e-6, "channel {k}");
        }
    }

    #[test]
    fn l0_picks_up_explicit_time_dependence() {
        // f(t, x) = t·x at t = 0: ∂_t f = x, J = 0, Hessian = 0
        let system = closed(4);
        let y = doubled(&basis(4, 2));
        let field = from_fn(|t: f64, x: &StateVector| x * real(t));
        let l0 = FiniteL0::new(&system, field).apply(0.0, &y, 1e-4);
        assert!((&l0 - &y).norm() < 1e-10);
    }

    #[test]
    fn ll_of_identity_field_is_the_diffusion_derivative() {
        // L^i L^j x = Db_j·b_i
        let n = 3;
        let mut system = two_channel_open(n, false);
        let psi = (basis(n, 1) + basis(n, 2)) * real(std::f64::consts::FRAC_1_SQRT_2);
        let rho = system.coordinates(&ket2dm(&psi));
        system.set_state(0.0, &rho);
        for (i, j) in [(0, 0), (0, 1), (1, 0)] {
            let ll = FiniteLL::new(&system, i, j, identity()).apply(0.0, &rho, 1e-5);
            let expected = system.libj(i, j);
            assert!(
                (&ll - &expected).norm() < 1e-2 * (1.0 + expected.norm()),
                "LL({i}, {j}): {ll} vs {expected}"
            );
        }
    }

    #[test]
    fn system_fields_use_exact_increments() {
        let system = two_channel_open(4, true);
        let rho = system.coordinates(&ket2dm(&basis(4, 2)));
        let step = unit_step(16, 5, 1e-3);
        let field = DiffusionField::new(&system, 3);
        assert_eq!(
            field.increment(0.0, &rho, &step),
            system.diffusion_increment(0.0, &rho, &step).swap_remove(3)
        );
        let field = DriftField::new(&system);
        assert_eq!(field.increment(0.0, &rho, &step), system.drift_increment(0.0, &rho, &step));
    }

    #[test]
    fn small_steps_keep_second_differences_accurate() {
        let mut system = two_channel_open(5, true);
        let rho = system.coordinates(&ket2dm(&basis(5, 3)));
        system.set_state(0.0, &rho);
        let expected = system.l0a();
        let l0 = FiniteL0::new(&system, DriftField::new(&system)).apply(0.0, &rho, 1e-7);
        assert!((&l0 - &expected).norm() < 1e-3 * (1.0 + expected.norm()), "{l0} vs {expected}");
    }

    #[test]
    fn operators_are_pure_functions_of_their_arguments() {
        let system = closed(4);
        let y = doubled(&basis(4, 2));
        let drift = DriftField::new(&system);
        let op = FiniteL0::new(&system, drift);
        assert_eq!(op.apply(0.0, &y, 1e-3), op.apply(0.0, &y, 1e-3));
        let diffusion = DiffusionField::new(&system, 0);
        let op = FiniteLL::new(&system, 0, 0, diffusion);
        assert_eq!(op.apply(0.0, &y, 1e-3), op.apply(0.0, &y, 1e-3));
    }
}
