//! # stochastic-taylor
//!
//! Consistency checks for the analytic Itô–Taylor operators of quantum
//! stochastic systems.
//!
//! A strong-order solver for
//!
//! ```text
//! dx = a(t, x) dt + Σ_k b_k(t, x) dW_k
//! ```
//!
//! needs `a`, `b_k` and the generators `L0`, `L^i`, `L^i L^j` applied to
//! them. Systems implementing [`StochasticSystem`] provide these in closed
//! form; this crate rebuilds each one from first-order finite differences
//! of `a` and `b_k` alone, and accepts the analytic value when the
//! difference error vanishes linearly in the step size. The differences are
//! taken from exact field increments `f(x + d) - f(x)`.
//!
//! ```text
//! SystemConfig ─build─▶ StochasticSystem ──analytic──▶ L0a, Lia, Libj, LiLjbk
//!                              │                              │
//!                              └─ FiniteL0 / FiniteL / FiniteLL ─▶ check_convergence
//! ```
//!
//! Two systems are provided: the stochastic Schrödinger equation on the
//! doubled ket `(ψ, ψ̄)` ([`StochasticClosedSystem`]) and the stochastic
//! master equation on the Gell-Mann coordinates of a density matrix
//! ([`StochasticOpenSystem`]), each with homodyne or heterodyne detection.

pub mod convergence;
pub mod driver;
pub mod error;
pub mod fileio;
pub mod finite_diff;
pub mod linalg;
pub mod operator;
pub mod system;

pub use convergence::{
    check_convergence, check_equivalence, ConvergenceConfig, ConvergenceReport,
};
pub use driver::{
    configuration_matrix, run_derivative_check, run_derivative_check_with, Comparison,
    DerivativeReport, SystemConfig, SystemKind,
};
pub use error::{Error, Result};
pub use finite_diff::{FiniteDifference, FiniteL, FiniteL0, FiniteLL};
pub use operator::{OperatorFamily, TimeOperator};
pub use system::{StochasticClosedSystem, StochasticOpenSystem, StochasticSystem};
