//! First-order convergence check for finite-difference operators.
//!
//! An operator `op(t, x, dt)` that approximates `target` to first order has
//! `‖op - target‖ ≈ c·dt`, so `‖op - target‖ / dt` is flat in `dt`. A
//! least-squares line through `(dt, ‖op - target‖ / dt)` over a fixed sweep
//! of step sizes must then have a slope of modest magnitude. An operator
//! that does not converge to `target` has an error that stays finite as
//! `dt → 0`, and `error / dt` blows up at small steps, which drives the
//! fitted slope far below `-1`.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::finite_diff::FiniteDifference;
use crate::linalg::StateVector;

/// Sweep and acceptance parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// log10 of the smallest step.
    pub min_exponent: f64,
    /// log10 of the largest step.
    pub max_exponent: f64,
    /// Number of log-spaced steps, endpoints included.
    pub num_steps: usize,
    /// Pass iff `|slope| < slope_bound`.
    pub slope_bound: f64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self { min_exponent: -5.0, max_exponent: -1.0, num_steps: 9, slope_bound: 1.0 }
    }
}

impl ConvergenceConfig {
    /// `num_steps` values `10^e`, `e` evenly spaced from `min_exponent` to
    /// `max_exponent`.
    pub fn steps(&self) -> Vec<f64> {
        step_sweep(self.min_exponent, self.max_exponent, self.num_steps)
    }
}

/// Log-spaced steps between `10^lo` and `10^hi` inclusive.
pub fn step_sweep(lo: f64, hi: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![10f64.powf(lo)],
        _ => {
            let span = (hi - lo) / (count - 1) as f64;
            (0..count).map(|k| 10f64.powf(lo + span * k as f64)).collect()
        }
    }
}

/// Least-squares line `y = slope·x + intercept`.
///
/// Returns NaN for both when the abscissae are degenerate or any input is
/// non-finite.
pub fn linear_fit(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return (f64::NAN, f64::NAN);
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }
    if sxx == 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let slope = sxy / sxx;
    (slope, mean_y - slope * mean_x)
}

/// Outcome of one convergence check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub steps: Vec<f64>,
    /// `‖op(t, x, dt) - target‖ / dt` for each step.
    pub scaled_errors: Vec<f64>,
    pub slope: f64,
    pub intercept: f64,
    pub passed: bool,
}

fn scaled_error<Op: FiniteDifference + ?Sized>(
    op: &Op,
    target: &StateVector,
    t: f64,
    state: &StateVector,
    dt: f64,
) -> f64 {
    (op.apply(t, state, dt) - target).norm() / dt
}

/// Sweep `op` over the configured steps and fit the scaled error.
pub fn check_convergence<Op: FiniteDifference + ?Sized>(
    op: &Op,
    target: &StateVector,
    t: f64,
    state: &StateVector,
    config: &ConvergenceConfig,
) -> ConvergenceReport {
    let steps = config.steps();

    #[cfg(feature = "parallel")]
    let scaled_errors: Vec<f64> = {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
        steps.par_iter().map(|&dt| scaled_error(op, target, t, state, dt)).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let scaled_errors: Vec<f64> =
        steps.iter().map(|&dt| scaled_error(op, target, t, state, dt)).collect();

    let (slope, intercept) = linear_fit(&steps, &scaled_errors);
    // NaN compares false, so a non-finite fit fails
    let passed = slope.abs() < config.slope_bound;
    debug!("convergence: slope = {slope:.4e}, intercept = {intercept:.4e}, passed = {passed}");

    ConvergenceReport { steps, scaled_errors, slope, intercept, passed }
}

/// True iff `op` converges to `target` at first order under the default
/// sweep.
pub fn check_equivalence<Op: FiniteDifference + ?Sized>(
    op: &Op,
    target: &StateVector,
    t: f64,
    state: &StateVector,
) -> bool {
    check_convergence(op, target, t, state, &ConvergenceConfig::default()).passed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{basis, real};
    use approx::assert_relative_eq;

    /// `target` with `offset + linear·dt + quadratic·dt²` added to entry 0.
    struct Synthetic {
        target: StateVector,
        offset: f64,
        linear: f64,
        quadratic: f64,
    }

    impl FiniteDifference for Synthetic {
        fn apply(&self, _t: f64, _state: &StateVector, dt: f64) -> StateVector {
            let mut out = self.target.clone();
            out[0] += real(self.offset + self.linear * dt + self.quadratic * dt * dt);
            out
        }
    }

    fn synthetic(offset: f64, linear: f64, quadratic: f64) -> (Synthetic, StateVector) {
        let target = basis(3, 1);
        (Synthetic { target: target.clone(), offset, linear, quadratic }, target)
    }

    #[test]
    fn sweep_is_log_spaced_with_both_endpoints() {
        let steps = ConvergenceConfig::default().steps();
        assert_eq!(steps.len(), 9);
        assert_relative_eq!(steps[0], 1e-5, max_relative = 1e-12);
        assert_relative_eq!(steps[8], 1e-1, max_relative = 1e-12);
        for pair in steps.windows(2) {
            assert_relative_eq!(pair[1] / pair[0], 10f64.sqrt(), max_relative = 1e-12);
        }
        assert!(step_sweep(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn linear_fit_recovers_a_line() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys: Vec<f64> = xs.iter().map(|x| 2.5 * x - 1.0).collect();
        let (slope, intercept) = linear_fit(&xs, &ys);
        assert_relative_eq!(slope, 2.5, epsilon = 1e-12);
        assert_relative_eq!(intercept, -1.0, epsilon = 1e-12);
        assert!(linear_fit(&[1.0, 1.0], &[0.0, 2.0]).0.is_nan());
    }

    #[test]
    fn first_order_error_passes() {
        let (op, target) = synthetic(0.0, 3.0, 0.0);
        let report = check_convergence(&op, &target, 0.0, &target, &ConvergenceConfig::default());
        assert!(report.passed, "slope {}", report.slope);
        assert!(report.slope.abs() < 1e-6);
        assert_relative_eq!(report.intercept, 3.0, max_relative = 1e-9);
    }

    #[test]
    fn exact_operator_passes() {
        let (op, target) = synthetic(0.0, 0.0, 0.0);
        assert!(check_equivalence(&op, &target, 0.0, &target));
    }

    #[test]
    fn non_vanishing_error_fails() {
        let (op, target) = synthetic(1e-3, 0.0, 0.0);
        let report = check_convergence(&op, &target, 0.0, &target, &ConvergenceConfig::default());
        assert!(!report.passed);
        assert!(report.slope < -1.0);
    }

    #[test]
    fn large_second_order_error_fails() {
        // error/dt = 20·dt, slope 20
        let (op, target) = synthetic(0.0, 0.0, 20.0);
        assert!(!check_equivalence(&op, &target, 0.0, &target));
    }

    #[test]
    fn non_finite_error_fails() {
        let (op, target) = synthetic(f64::NAN, 0.0, 0.0);
        let report = check_convergence(&op, &target, 0.0, &target, &ConvergenceConfig::default());
        assert!(report.slope.is_nan());
        assert!(!report.passed);
    }

    #[test]
    fn checks_are_repeatable() {
        let (op, target) = synthetic(0.0, 1.5, 0.3);
        let config = ConvergenceConfig::default();
        let first = check_convergence(&op, &target, 0.0, &target, &config);
        let second = check_convergence(&op, &target, 0.0, &target, &config);
        assert_eq!(first, second);
    }
}
