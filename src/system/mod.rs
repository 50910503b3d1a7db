//! Stochastic quantum systems and their Itô–Taylor generators.
//!
//! A system is an Itô SDE on a complex state vector,
//!
//!   dx = a(t, x) dt + Σ_k b_k(t, x) dW_k
//!
//! Higher-order solvers need, besides `a` and `b_k`, the generators
//!
//!   L0 f    = ∂_t f + Df·a + ½ Σ_k D²f(b_k, b_k)
//!   L^i f   = Df·b_i
//!   L^i L^j f = D²f(b_i, b_j) + Df·(Db_j·b_i)
//!
//! applied to `a` and `b_k`. Implementors only provide the three derivative
//! primitives of each field at the cached point (`∂_t`, `D`, `D²`); every
//! named generator (`L0a`, `Libj`, `LiLjbk`, ...) is assembled here once.
//!
//! # Coordinates
//!
//! Both systems choose state coordinates in which drift and diffusion are
//! polynomials, so `D` and `D²` are ordinary complex derivatives and a real
//! step `h·e_i` along any coordinate sees them in full. The closed system
//! acts on the doubled ket `(ψ, ψ̄)`; the open system on the Gell-Mann
//! coordinates of ρ.
//!
//! Systems also provide exact increments `f(x + d) - f(x)` of their fields,
//! which the finite-difference stencils use in place of differences of
//! nearby evaluations.

mod closed;
mod open;

pub use closed::StochasticClosedSystem;
pub use open::StochasticOpenSystem;

use num_complex::Complex64;

use crate::linalg::{real, StateVector};

/// A field of the SDE whose derivatives can be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// a(t, x)
    Drift,
    /// b_k(t, x)
    Diffusion(usize),
}

/// Values cached by [`StochasticSystem::set_state`].
#[derive(Debug, Clone)]
pub struct StateCache {
    pub t: f64,
    pub state: StateVector,
    pub a: StateVector,
    pub b: Vec<StateVector>,
}

impl StateCache {
    /// Evaluate drift and diffusion of `system` at `(t, state)`.
    pub fn evaluate<S>(system: &S, t: f64, state: &StateVector) -> Self
    where
        S: StochasticSystem + ?Sized,
    {
        Self {
            t,
            state: state.clone(),
            a: system.drift(t, state),
            b: system.diffusion(t, state),
        }
    }

    /// Placeholder cache at the origin, before any `set_state`.
    pub fn empty(dim: usize, num_collapse: usize) -> Self {
        Self {
            t: 0.0,
            state: StateVector::zeros(dim),
            a: StateVector::zeros(dim),
            b: vec![StateVector::zeros(dim); num_collapse],
        }
    }
}

/// Capability set of a stochastic system, as consumed by the derivative
/// checker.
pub trait StochasticSystem: Send + Sync {
    /// Length of the state vector.
    fn dim(&self) -> usize;

    /// Number of independent noise channels.
    fn num_collapse(&self) -> usize;

    /// a(t, x)
    fn drift(&self, t: f64, state: &StateVector) -> StateVector;

    /// [b_0(t, x), ..., b_{K-1}(t, x)]
    fn diffusion(&self, t: f64, state: &StateVector) -> Vec<StateVector>;

    /// a(t, x + d) - a(t, x)
    ///
    /// Implementors should expand the difference rather than subtract two
    /// evaluations.
    fn drift_increment(&self, t: f64, state: &StateVector, step: &StateVector) -> StateVector {
        self.drift(t, &(state + step)) - self.drift(t, state)
    }

    /// b_k(t, x + d) - b_k(t, x) for every channel.
    fn diffusion_increment(
        &self,
        t: f64,
        state: &StateVector,
        step: &StateVector,
    ) -> Vec<StateVector> {
        let moved = self.diffusion(t, &(state + step));
        moved.into_iter().zip(self.diffusion(t, state)).map(|(b1, b0)| b1 - b0).collect()
    }

    /// Move the evaluation point of the cached accessors and generators.
    fn set_state(&mut self, t: f64, state: &StateVector);

    /// Values at the current evaluation point.
    fn cache(&self) -> &StateCache;

    /// ∂_t f at the cached point.
    fn time_derivative(&self, field: Field) -> StateVector;

    /// Df·v at the cached point.
    fn first_derivative(&self, field: Field, v: &StateVector) -> StateVector;

    /// D²f(u, v) at the cached point; symmetric in `u`, `v`.
    fn second_derivative(&self, field: Field, u: &StateVector, v: &StateVector) -> StateVector;

    fn time(&self) -> f64 {
        self.cache().t
    }

    fn state(&self) -> &StateVector {
        &self.cache().state
    }

    /// Cached drift.
    fn a(&self) -> &StateVector {
        &self.cache().a
    }

    /// Cached diffusion of channel `i`.
    fn bi(&self, i: usize) -> &StateVector {
        &self.cache().b[i]
    }

    /// L0 f for a drift or diffusion field.
    fn l0(&self, field: Field) -> StateVector {
        let mut out = self.time_derivative(field);
        out += self.first_derivative(field, self.a());
        let half = real(0.5);
        for k in 0..self.num_collapse() {
            let bk = self.bi(k);
            out.axpy(half, &self.second_derivative(field, bk, bk), Complex64::new(1.0, 0.0));
        }
        out
    }

    /// L0 a
    fn l0a(&self) -> StateVector {
        self.l0(Field::Drift)
    }

    /// L0 b_i
    fn l0bi(&self, i: usize) -> StateVector {
        self.l0(Field::Diffusion(i))
    }

    /// L^i a
    fn lia(&self, i: usize) -> StateVector {
        self.first_derivative(Field::Drift, self.bi(i))
    }

    /// L^i b_j
    fn libj(&self, i: usize, j: usize) -> StateVector {
        self.first_derivative(Field::Diffusion(j), self.bi(i))
    }

    /// L^i L^j b_k
    fn liljbk(&self, i: usize, j: usize, k: usize) -> StateVector {
        let field = Field::Diffusion(k);
        let mut out = self.second_derivative(field, self.bi(i), self.bi(j));
        out += self.first_derivative(field, &self.libj(i, j));
        out
    }
}
