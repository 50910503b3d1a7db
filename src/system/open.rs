//! Open system: the stochastic master equation (SME) for a density matrix.
//!
//!   dρ = 𝓛ρ dt + Σ_k (c_k ρ + ρ c_k† - e_k ρ) dW_k,   e_k = tr((c_k + c_k†) ρ)
//!
//! with the Lindbladian
//!
//!   𝓛ρ = -i[H, ρ] + Σ_k (c_k ρ c_k† - ½{c_k†c_k, ρ})
//!
//! The state is the vector of generalised Gell-Mann coordinates of ρ
//! (see [`BlochFrame`]), so a Hermitian ρ has real coordinates and a step
//! along one coordinate moves ρ along a Hermitian direction. Drift and
//! diffusion are polynomials in those coordinates: 𝓛 is linear and b_k is
//! quadratic.
//!
//! Heterodyne detection splits each coupling c into two channels, `c/√2`
//! and `-i·c/√2`.

use std::borrow::Cow;

use num_complex::Complex64;

use super::{Field, StateCache, StochasticSystem};
use crate::linalg::{real, BlochFrame, Matrix, StateVector, I};
use crate::operator::TimeOperator;

/// Coupling operators for a measurement scheme.
fn measurement_channels(c_ops: Vec<TimeOperator>, heterodyne: bool) -> Vec<TimeOperator> {
    if !heterodyne {
        return c_ops;
    }
    let inv_sqrt2 = std::f64::consts::FRAC_1_SQRT_2;
    c_ops
        .iter()
        .flat_map(|c| [c.scaled(real(inv_sqrt2)), c.scaled(Complex64::new(0.0, -inv_sqrt2))])
        .collect()
}

#[derive(Debug, Clone)]
struct Channel {
    c: Matrix,
    dc: Matrix,
    c_dag: Matrix,
    dc_dag: Matrix,
    /// c†c
    cdc: Matrix,
    /// ∂_t (c†c)
    dcdc: Matrix,
    /// c + c†
    m: Matrix,
    /// ∂_t (c + c†)
    dm: Matrix,
}

#[derive(Debug, Clone)]
struct Snapshot {
    h: Matrix,
    dh: Matrix,
    channels: Vec<Channel>,
}

impl Snapshot {
    /// 𝓛ρ
    fn lindbladian(&self, rho: &Matrix) -> Matrix {
        let mut out = (&self.h * rho - rho * &self.h) * -I;
        let half = real(0.5);
        for ch in &self.channels {
            out += &ch.c * rho * &ch.c_dag;
            out -= (&ch.cdc * rho + rho * &ch.cdc) * half;
        }
        out
    }

    /// (∂_t 𝓛)ρ
    fn lindbladian_time_derivative(&self, rho: &Matrix) -> Matrix {
        let mut out = (&self.dh * rho - rho * &self.dh) * -I;
        let half = real(0.5);
        for ch in &self.channels {
            out += &ch.dc * rho * &ch.c_dag + &ch.c * rho * &ch.dc_dag;
            out -= (&ch.dcdc * rho + rho * &ch.dcdc) * half;
        }
        out
    }
}

/// c V + V c† - tr(M V) ρ - tr(M ρ) V, the derivative of `b` along V.
fn diffusion_derivative(ch: &Channel, rho: &Matrix, v: &Matrix) -> Matrix {
    let e = (&ch.m * rho).trace();
    let de = (&ch.m * v).trace();
    &ch.c * v + v * &ch.c_dag - rho * de - v * e
}

/// b(ρ + V) - b(ρ) = Db·V - tr(M V) V
fn diffusion_increment(ch: &Channel, rho: &Matrix, v: &Matrix) -> Matrix {
    let de = (&ch.m * v).trace();
    diffusion_derivative(ch, rho, v) - v * de
}

/// Mixed-state stochastic system with homodyne or heterodyne detection.
#[derive(Debug, Clone)]
pub struct StochasticOpenSystem {
    hamiltonian: TimeOperator,
    c_ops: Vec<TimeOperator>,
    heterodyne: bool,
    frame: BlochFrame,
    snapshot: Snapshot,
    cache: StateCache,
}

impl StochasticOpenSystem {
    /// Build from a Hamiltonian and measured coupling operators.
    ///
    /// With `heterodyne`, every coupling contributes two noise channels.
    pub fn new(hamiltonian: TimeOperator, sc_ops: Vec<TimeOperator>, heterodyne: bool) -> Self {
        let c_ops = measurement_channels(sc_ops, heterodyne);
        let n = hamiltonian.dim();
        let snapshot = Self::snapshot_of(&hamiltonian, &c_ops, 0.0);
        let cache = StateCache::empty(n * n, c_ops.len());
        Self { hamiltonian, c_ops, heterodyne, frame: BlochFrame::new(n), snapshot, cache }
    }

    pub fn heterodyne(&self) -> bool {
        self.heterodyne
    }

    fn snapshot_of(hamiltonian: &TimeOperator, c_ops: &[TimeOperator], t: f64) -> Snapshot {
        let channels = c_ops
            .iter()
            .map(|op| {
                let c = op.at(t);
                let dc = op.time_derivative(t);
                let c_dag = c.adjoint();
                let dc_dag = dc.adjoint();
                Channel {
                    cdc: &c_dag * &c,
                    dcdc: &dc_dag * &c + &c_dag * &dc,
                    m: &c + &c_dag,
                    dm: &dc + &dc_dag,
                    c,
                    dc,
                    c_dag,
                    dc_dag,
                }
            })
            .collect();
        Snapshot { h: hamiltonian.at(t), dh: hamiltonian.time_derivative(t), channels }
    }

    fn diffusion_with(&self, snapshot: &Snapshot, rho: &Matrix) -> Vec<StateVector> {
        snapshot
            .channels
            .iter()
            .map(|ch| {
                let e = (&ch.m * rho).trace();
                self.frame.coordinates(&(&ch.c * rho + rho * &ch.c_dag - rho * e))
            })
            .collect()
    }

    /// Operators at `t`, reusing the cached ones when `t` is the cached time.
    fn snapshot_at(&self, t: f64) -> Cow<'_, Snapshot> {
        if t == self.cache.t {
            Cow::Borrowed(&self.snapshot)
        } else {
            Cow::Owned(Self::snapshot_of(&self.hamiltonian, &self.c_ops, t))
        }
    }

    /// ρ at the cached point.
    pub fn rho(&self) -> Matrix {
        self.operator(&self.cache.state)
    }

    /// Operator with the given coordinates.
    pub fn operator(&self, coordinates: &StateVector) -> Matrix {
        self.frame.operator(coordinates)
    }

    /// Coordinates of an operator, in the order used for the state.
    pub fn coordinates(&self, op: &Matrix) -> StateVector {
        self.frame.coordinates(op)
    }
}

impl StochasticSystem for StochasticOpenSystem {
    fn dim(&self) -> usize {
        let n = self.hamiltonian.dim();
        n * n
    }

    fn num_collapse(&self) -> usize {
        self.c_ops.len()
    }

    fn drift(&self, t: f64, state: &StateVector) -> StateVector {
        let rho = self.frame.operator(state);
        self.frame.coordinates(&self.snapshot_at(t).lindbladian(&rho))
    }

    fn diffusion(&self, t: f64, state: &StateVector) -> Vec<StateVector> {
        self.diffusion_with(&self.snapshot_at(t), &self.frame.operator(state))
    }

    fn drift_increment(&self, t: f64, _state: &StateVector, step: &StateVector) -> StateVector {
        let v = self.frame.operator(step);
        self.frame.coordinates(&self.snapshot_at(t).lindbladian(&v))
    }

    fn diffusion_increment(
        &self,
        t: f64,
        state: &StateVector,
        step: &StateVector,
    ) -> Vec<StateVector> {
        let (rho, v) = (self.frame.operator(state), self.frame.operator(step));
        self.snapshot_at(t)
            .channels
            .iter()
            .map(|ch| self.frame.coordinates(&diffusion_increment(ch, &rho, &v)))
            .collect()
    }

    fn set_state(&mut self, t: f64, state: &StateVector) {
        self.snapshot = Self::snapshot_of(&self.hamiltonian, &self.c_ops, t);
        self.cache = StateCache::evaluate(&*self, t, state);
    }

    fn cache(&self) -> &StateCache {
        &self.cache
    }

    fn time_derivative(&self, field: Field) -> StateVector {
        let rho = self.rho();
        match field {
            Field::Drift => self.coordinates(&self.snapshot.lindbladian_time_derivative(&rho)),
            Field::Diffusion(k) => {
                let ch = &self.snapshot.channels[k];
                let de = (&ch.dm * &rho).trace();
                self.coordinates(&(&ch.dc * &rho + &rho * &ch.dc_dag - &rho * de))
            }
        }
    }

    fn first_derivative(&self, field: Field, v: &StateVector) -> StateVector {
        let v = self.frame.operator(v);
        match field {
            Field::Drift => self.coordinates(&self.snapshot.lindbladian(&v)),
            Field::Diffusion(k) => {
                let ch = &self.snapshot.channels[k];
                self.coordinates(&diffusion_derivative(ch, &self.rho(), &v))
            }
        }
    }

    fn second_derivative(&self, field: Field, u: &StateVector, v: &StateVector) -> StateVector {
        match field {
            Field::Drift => StateVector::zeros(u.len()),
            Field::Diffusion(k) => {
                // -tr(M U) V - tr(M V) U
                let m = &self.snapshot.channels[k].m;
                let u_op = self.frame.operator(u);
                let v_op = self.frame.operator(v);
                let du: Complex64 = (m * &u_op).trace();
                let dv: Complex64 = (m * &v_op).trace();
                self.coordinates(&(v_op * -du - u_op * dv))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{basis, destroy, ket2dm, num};
    use crate::operator::Coefficient;
    use approx::assert_relative_eq;

    fn damped_cavity(heterodyne: bool) -> StochasticOpenSystem {
        StochasticOpenSystem::new(
            TimeOperator::constant(num(4)),
            vec![TimeOperator::constant(destroy(4))],
            heterodyne,
        )
    }

    fn fock(system: &StochasticOpenSystem, k: usize) -> StateVector {
        system.coordinates(&ket2dm(&basis(4, k)))
    }

    #[test]
    fn state_space_is_the_gell_mann_coordinates() {
        let system = damped_cavity(true);
        assert_eq!(system.dim(), 16);
        assert_eq!(system.num_collapse(), 2);
        assert!(system.heterodyne());
        let rho = fock(&system, 2);
        assert_relative_eq!(rho[0].re, 1.0);
        assert!(rho.iter().all(|r| r.im == 0.0));
    }

    #[test]
    fn lindbladian_preserves_trace_and_decays_population() {
        let system = damped_cavity(false);
        let a = system.drift(0.0, &fock(&system, 2));
        assert_relative_eq!(a[0].norm(), 0.0, epsilon = 1e-14);
        let drho = system.operator(&a);
        // D[a]|2⟩⟨2| = 2|1⟩⟨1| - 2|2⟩⟨2|
        assert_relative_eq!(drho[(1, 1)].re, 2.0, epsilon = 1e-12);
        assert_relative_eq!(drho[(2, 2)].re, -2.0, epsilon = 1e-12);
    }

    #[test]
    fn diffusion_is_traceless_and_real() {
        let system = damped_cavity(true);
        let rho = (fock(&system, 1) + fock(&system, 2)) * real(0.5);
        for b in system.diffusion(0.0, &rho) {
            assert_relative_eq!(b[0].norm(), 0.0, epsilon = 1e-14);
            assert!(b.iter().all(|r| r.im.abs() < 1e-14));
        }
    }

    #[test]
    fn drift_derivative_is_the_lindbladian_itself() {
        let mut system = damped_cavity(false);
        let rho = fock(&system, 2);
        system.set_state(0.0, &rho);
        let v = fock(&system, 1);
        assert_eq!(system.first_derivative(Field::Drift, &v), system.drift(0.0, &v));
        assert_eq!(system.second_derivative(Field::Drift, &v, &rho).norm(), 0.0);
    }

    #[test]
    fn increments_match_differences_of_evaluations() {
        let x = destroy(4) + destroy(4).adjoint();
        let system = StochasticOpenSystem::new(
            TimeOperator::constant(num(4)).with_term(x, Coefficient::Linear),
            vec![TimeOperator::constant(destroy(4)), TimeOperator::constant(num(4))],
            true,
        );
        let rho = (fock(&system, 1) + fock(&system, 3)) * real(0.5);
        let d = StateVector::from_fn(16, |i, _| Complex64::new(0.01 * i as f64, -0.02));
        let moved = &rho + &d;
        let da = system.drift(0.4, &moved) - system.drift(0.4, &rho);
        assert!((system.drift_increment(0.4, &rho, &d) - da).norm() < 1e-13);
        let b0 = system.diffusion(0.4, &rho);
        let b1 = system.diffusion(0.4, &moved);
        for (k, inc) in system.diffusion_increment(0.4, &rho, &d).iter().enumerate() {
            assert!((inc - (&b1[k] - &b0[k])).norm() < 1e-13, "channel {k}");
        }
    }

    #[test]
    fn diffusion_derivative_matches_central_difference() {
        let mut system = damped_cavity(false);
        let rho = fock(&system, 1) * real(0.25) + fock(&system, 3) * real(0.75);
        system.set_state(0.0, &rho);
        let v = StateVector::from_fn(16, |i, _| Complex64::new(0.01 * i as f64, -0.02));
        let h = 1e-4;
        let plus = system.diffusion(0.0, &(&rho + &v * real(h))).swap_remove(0);
        let minus = system.diffusion(0.0, &(&rho - &v * real(h))).swap_remove(0);
        let numeric = (plus - minus) * real(0.5 / h);
        let analytic = system.first_derivative(Field::Diffusion(0), &v);
        assert!((numeric - analytic).norm() < 1e-8);
    }
}
