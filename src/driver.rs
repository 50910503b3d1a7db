//! Derivative-consistency driver.
//!
//! [`run_derivative_check`] places a system at `(t = 0, x)` and compares
//! every analytic Itô–Taylor reference the system exposes against its
//! finite-difference counterpart:
//!
//! | reference              | finite difference        |
//! |------------------------|--------------------------|
//! | `L0a()`                | L0 applied to a          |
//! | `L0bi(i)`              | L0 applied to b_i        |
//! | `Lia(i)`               | L^i applied to a         |
//! | `Libj(j, i)`           | L^j applied to b_i       |
//! | `LiLjbk(k, j, i)`      | L^k L^j applied to b_i   |
//!
//! A comparison that does not converge is recorded in the returned
//! [`DerivativeReport`]; it never aborts the run.

use std::fmt;
use std::str::FromStr;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::convergence::{check_convergence, ConvergenceConfig, ConvergenceReport};
use crate::error::{Error, Result};
use crate::finite_diff::{
    DiffusionField, DriftField, FiniteDifference, FiniteL, FiniteL0, FiniteLL,
};
use crate::linalg::{basis, doubled, ket2dm, BlochFrame, StateVector};
use crate::operator::OperatorFamily;
use crate::system::{StochasticClosedSystem, StochasticOpenSystem, StochasticSystem};

/// Which equation a configuration builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemKind {
    /// Stochastic Schrödinger equation on a doubled ket.
    #[serde(rename = "sse")]
    Closed,
    /// Stochastic master equation on the Gell-Mann coordinates of ρ.
    #[serde(rename = "sme")]
    Open,
}

impl SystemKind {
    pub fn tag(self) -> &'static str {
        match self {
            SystemKind::Closed => "sse",
            SystemKind::Open => "sme",
        }
    }
}

impl FromStr for SystemKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sse" => Ok(SystemKind::Closed),
            "sme" => Ok(SystemKind::Open),
            other => Err(Error::UnknownSystemKind(other.to_string())),
        }
    }
}

impl fmt::Display for SystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Hamiltonian/coupling pairs exercised by [`configuration_matrix`].
const PAIRS: [(OperatorFamily, &[OperatorFamily]); 6] = [
    (OperatorFamily::Identity, &[OperatorFamily::Destroy]),
    (OperatorFamily::Tridiagonal, &[OperatorFamily::Destroy]),
    (OperatorFamily::Identity, &[OperatorFamily::Destroy, OperatorFamily::DestroySquared]),
    (OperatorFamily::TimeDependent, &[OperatorFamily::Destroy]),
    (OperatorFamily::Identity, &[OperatorFamily::TimeDependent]),
    (OperatorFamily::RandomHermitian, &[OperatorFamily::RandomHermitian]),
];

/// One point of the configuration matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Hilbert-space dimension N.
    pub dim: usize,
    pub hamiltonian: OperatorFamily,
    pub c_ops: Vec<OperatorFamily>,
    pub kind: SystemKind,
    pub heterodyne: bool,
    /// Seed for random operator families; the generator is seeded once per
    /// build.
    pub seed: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            dim: 5,
            hamiltonian: OperatorFamily::Identity,
            c_ops: vec![OperatorFamily::Destroy],
            kind: SystemKind::Closed,
            heterodyne: false,
            seed: 0,
        }
    }
}

impl SystemConfig {
    /// Configuration from string tags, e.g. `("qeye", ["destroy"], "sse")`.
    pub fn from_tags(
        dim: usize,
        hamiltonian: &str,
        c_ops: &[&str],
        kind: &str,
        heterodyne: bool,
    ) -> Result<Self> {
        Ok(Self {
            dim,
            hamiltonian: hamiltonian.parse()?,
            c_ops: c_ops.iter().map(|tag| tag.parse()).collect::<Result<_>>()?,
            kind: kind.parse()?,
            heterodyne,
            seed: 0,
        })
    }

    fn check_dim(&self) -> Result<()> {
        if self.dim < 2 {
            return Err(Error::InvalidDimension(self.dim));
        }
        Ok(())
    }

    /// Construct the system.
    pub fn build(&self) -> Result<Box<dyn StochasticSystem>> {
        self.check_dim()?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let h = self.hamiltonian.build(self.dim, &mut rng);
        let c_ops = self.c_ops.iter().map(|family| family.build(self.dim, &mut rng)).collect();
        Ok(match self.kind {
            SystemKind::Closed => Box::new(StochasticClosedSystem::new(h, c_ops, self.heterodyne)),
            SystemKind::Open => Box::new(StochasticOpenSystem::new(h, c_ops, self.heterodyne)),
        })
    }

    /// `|N-2⟩` as a doubled ket, or the coordinates of its projector for
    /// the open system.
    pub fn initial_state(&self) -> Result<StateVector> {
        self.check_dim()?;
        let psi = basis(self.dim, self.dim - 2);
        Ok(match self.kind {
            SystemKind::Closed => doubled(&psi),
            SystemKind::Open => BlochFrame::new(self.dim).coordinates(&ket2dm(&psi)),
        })
    }

    /// Short human-readable name, e.g. `sse qeye/[destroy, destroy2] homodyne N=5`.
    pub fn label(&self) -> String {
        let c_ops: Vec<&str> = self.c_ops.iter().map(|family| family.tag()).collect();
        let detection = if self.heterodyne { "heterodyne" } else { "homodyne" };
        let c_ops = c_ops.join(", ");
        format!("{} {}/[{c_ops}] {detection} N={}", self.kind, self.hamiltonian, self.dim)
    }

    /// Build, place at the initial state and check every derivative.
    pub fn run(&self, config: &ConvergenceConfig) -> Result<DerivativeReport> {
        let mut system = self.build()?;
        let state = self.initial_state()?;
        let report = run_derivative_check_with(system.as_mut(), &state, config)?;
        info!("{}: {}", self.label(), report.summary());
        Ok(report)
    }
}

/// Every operator pair for both system kinds and both detection schemes.
pub fn configuration_matrix(dim: usize) -> Vec<SystemConfig> {
    let mut configs = Vec::with_capacity(PAIRS.len() * 4);
    for (hamiltonian, c_ops) in PAIRS {
        for kind in [SystemKind::Closed, SystemKind::Open] {
            for heterodyne in [false, true] {
                configs.push(SystemConfig {
                    dim,
                    hamiltonian,
                    c_ops: c_ops.to_vec(),
                    kind,
                    heterodyne,
                    seed: 0,
                });
            }
        }
    }
    configs
}

/// One analytic reference checked against its finite difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Reference accessor, e.g. `LiLjbk`.
    pub operator: String,
    /// Accessor arguments, in call order.
    pub indices: Vec<usize>,
    pub report: ConvergenceReport,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.indices.iter().map(ToString::to_string).collect();
        let status = if self.report.passed { "ok" } else { "FAILED" };
        let args = args.join(", ");
        write!(f, "{}({args}): slope {:.3e} {status}", self.operator, self.report.slope)
    }
}

/// All comparisons made by one [`run_derivative_check`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivativeReport {
    pub comparisons: Vec<Comparison>,
}

impl DerivativeReport {
    /// True iff every comparison converged.
    pub fn passed(&self) -> bool {
        self.comparisons.iter().all(|c| c.report.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Comparison> {
        self.comparisons.iter().filter(|c| !c.report.passed)
    }

    /// Comparisons made for one accessor.
    pub fn by_operator<'a>(
        &'a self,
        operator: &'a str,
    ) -> impl Iterator<Item = &'a Comparison> + 'a {
        self.comparisons.iter().filter(move |c| c.operator == operator)
    }

    pub fn summary(&self) -> String {
        let failed = self.failures().count();
        let total = self.comparisons.len();
        format!("{}/{total} comparisons converged", total - failed)
    }

    fn record<Op: FiniteDifference + ?Sized>(
        &mut self,
        operator: &str,
        indices: Vec<usize>,
        op: &Op,
        target: &StateVector,
        (t, state): (f64, &StateVector),
        config: &ConvergenceConfig,
    ) {
        let report = check_convergence(op, target, t, state, config);
        let comparison = Comparison { operator: operator.to_string(), indices, report };
        if !comparison.report.passed {
            warn!("{comparison}");
        }
        self.comparisons.push(comparison);
    }
}

impl fmt::Display for DerivativeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for comparison in &self.comparisons {
            writeln!(f, "  {comparison}")?;
        }
        Ok(())
    }
}

/// [`run_derivative_check_with`] under the default step sweep.
pub fn run_derivative_check<S: StochasticSystem + ?Sized>(
    system: &mut S,
    state: &StateVector,
) -> Result<DerivativeReport> {
    run_derivative_check_with(system, state, &ConvergenceConfig::default())
}

/// Check every Itô–Taylor reference of `system` at `(0, state)`.
///
/// Fails only if the values cached by `set_state` disagree with a direct
/// evaluation at the same point. Non-convergent references are returned as
/// failed comparisons.
pub fn run_derivative_check_with<S: StochasticSystem + ?Sized>(
    system: &mut S,
    state: &StateVector,
    config: &ConvergenceConfig,
) -> Result<DerivativeReport> {
    let t = 0.0;
    system.set_state(t, state);
    let system: &S = system;

    if system.drift(t, state) != *system.a() {
        return Err(Error::cache_mismatch("a"));
    }
    for (i, bi) in system.diffusion(t, state).iter().enumerate() {
        if bi != system.bi(i) {
            return Err(Error::cache_mismatch(format!("bi({i})")));
        }
    }

    let at = (t, state);
    let n = system.num_collapse();
    let mut report = DerivativeReport::default();

    let op = FiniteL0::new(system, DriftField::new(system));
    report.record("L0a", vec![], &op, &system.l0a(), at, config);

    for i in 0..n {
        let op = FiniteL0::new(system, DiffusionField::new(system, i));
        report.record("L0bi", vec![i], &op, &system.l0bi(i), at, config);

        let op = FiniteL::new(system, i, DriftField::new(system));
        report.record("Lia", vec![i], &op, &system.lia(i), at, config);
    }

    for i in 0..n {
        for j in 0..n {
            let op = FiniteL::new(system, j, DiffusionField::new(system, i));
            report.record("Libj", vec![j, i], &op, &system.libj(j, i), at, config);
        }
    }

    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                let op = FiniteLL::new(system, k, j, DiffusionField::new(system, i));
                report.record("LiLjbk", vec![k, j, i], &op, &system.liljbk(k, j, i), at, config);
            }
        }
    }

    Ok(report)
}
