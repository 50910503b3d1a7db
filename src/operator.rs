//! Time-dependent operators and the operator families used to build test
//! systems.
//!
//! An operator is a sum of constant matrices weighted by scalar functions of
//! time:
//!
//!   O(t) = Σ_k f_k(t) · M_k
//!
//! Only the value `O(t)` and the time derivative `∂_t O(t)` are ever needed,
//! since the Itô–Taylor generator `L0` contains a single `∂_t` term.

use std::fmt;
use std::str::FromStr;

use num_complex::Complex64;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::linalg::{create, destroy, num, qeye, rand_herm, Matrix};

/// Scalar time dependence of one operator term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coefficient {
    /// f(t) = 1
    Constant,
    /// f(t) = t
    Linear,
}

impl Coefficient {
    /// f(t)
    pub fn value(self, t: f64) -> f64 {
        match self {
            Coefficient::Constant => 1.0,
            Coefficient::Linear => t,
        }
    }

    /// f'(t)
    pub fn derivative(self, _t: f64) -> f64 {
        match self {
            Coefficient::Constant => 0.0,
            Coefficient::Linear => 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Term {
    matrix: Matrix,
    coefficient: Coefficient,
}

/// Operator with explicit time dependence, O(t) = Σ f_k(t) M_k.
///
/// Coefficients are real, so the adjoint only acts on the matrices.
#[derive(Debug, Clone)]
pub struct TimeOperator {
    dim: usize,
    terms: Vec<Term>,
}

impl TimeOperator {
    /// Time-independent operator.
    pub fn constant(matrix: Matrix) -> Self {
        let dim = matrix.nrows();
        Self { dim, terms: vec![Term { matrix, coefficient: Coefficient::Constant }] }
    }

    /// Add a term `f(t)·matrix`.
    pub fn with_term(mut self, matrix: Matrix, coefficient: Coefficient) -> Self {
        self.terms.push(Term { matrix, coefficient });
        self
    }

    /// Hilbert-space dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// True when no term depends on time.
    pub fn is_constant(&self) -> bool {
        self.terms.iter().all(|term| term.coefficient == Coefficient::Constant)
    }

    /// O(t)
    pub fn at(&self, t: f64) -> Matrix {
        self.combine(|c| c.value(t))
    }

    /// ∂_t O(t)
    pub fn time_derivative(&self, t: f64) -> Matrix {
        self.combine(|c| c.derivative(t))
    }

    /// O†
    pub fn dag(&self) -> Self {
        let terms = self
            .terms
            .iter()
            .map(|term| Term { matrix: term.matrix.adjoint(), coefficient: term.coefficient })
            .collect();
        Self { dim: self.dim, terms }
    }

    /// s·O
    pub fn scaled(&self, s: Complex64) -> Self {
        let terms = self
            .terms
            .iter()
            .map(|term| Term { matrix: &term.matrix * s, coefficient: term.coefficient })
            .collect();
        Self { dim: self.dim, terms }
    }

    fn combine(&self, weight: impl Fn(Coefficient) -> f64) -> Matrix {
        let mut out = Matrix::zeros(self.dim, self.dim);
        for term in &self.terms {
            let w = weight(term.coefficient);
            if w != 0.0 {
                out += &term.matrix * Complex64::new(w, 0.0);
            }
        }
        out
    }
}

/// Operator families available to test configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OperatorFamily {
    /// 𝟙
    Identity,
    /// a
    Destroy,
    /// a²
    DestroySquared,
    /// a + n + a†
    Tridiagonal,
    /// n + t·(a + a†)
    TimeDependent,
    /// Seeded random Hermitian matrix.
    RandomHermitian,
}

type Constructor = fn(usize, &mut StdRng) -> TimeOperator;

/// Tag ↔ family ↔ constructor lookup table, indexed by discriminant.
const FAMILIES: [(OperatorFamily, &str, Constructor); 6] = [
    (OperatorFamily::Identity, "qeye", build_identity),
    (OperatorFamily::Destroy, "destroy", build_destroy),
    (OperatorFamily::DestroySquared, "destroy2", build_destroy_squared),
    (OperatorFamily::Tridiagonal, "tridiag", build_tridiagonal),
    (OperatorFamily::TimeDependent, "td", build_time_dependent),
    (OperatorFamily::RandomHermitian, "rand", build_random_hermitian),
];

fn build_identity(n: usize, _rng: &mut StdRng) -> TimeOperator {
    TimeOperator::constant(qeye(n))
}

fn build_destroy(n: usize, _rng: &mut StdRng) -> TimeOperator {
    TimeOperator::constant(destroy(n))
}

fn build_destroy_squared(n: usize, _rng: &mut StdRng) -> TimeOperator {
    let a = destroy(n);
    TimeOperator::constant(&a * &a)
}

fn build_tridiagonal(n: usize, _rng: &mut StdRng) -> TimeOperator {
    TimeOperator::constant(destroy(n) + num(n) + create(n))
}

fn build_time_dependent(n: usize, _rng: &mut StdRng) -> TimeOperator {
    TimeOperator::constant(num(n)).with_term(destroy(n) + create(n), Coefficient::Linear)
}

fn build_random_hermitian(n: usize, rng: &mut StdRng) -> TimeOperator {
    TimeOperator::constant(rand_herm(n, rng))
}

impl OperatorFamily {
    /// Every family, in table order.
    pub fn all() -> impl Iterator<Item = OperatorFamily> {
        FAMILIES.iter().map(|(family, _, _)| *family)
    }

    /// Short tag used in configuration strings.
    pub fn tag(self) -> &'static str {
        FAMILIES[self as usize].1
    }

    /// Build the operator in an `n`-level space. Random families draw from
    /// `rng`.
    pub fn build(self, n: usize, rng: &mut StdRng) -> TimeOperator {
        (FAMILIES[self as usize].2)(n, rng)
    }
}

impl FromStr for OperatorFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FAMILIES
            .iter()
            .find(|(_, tag, _)| *tag == s)
            .map(|(family, _, _)| *family)
            .ok_or_else(|| Error::UnknownFamily(s.to_string()))
    }
}

impl TryFrom<String> for OperatorFamily {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<OperatorFamily> for String {
    fn from(family: OperatorFamily) -> String {
        family.tag().to_string()
    }
}

impl fmt::Display for OperatorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
