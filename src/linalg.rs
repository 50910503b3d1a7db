//! Dense complex linear algebra vocabulary.
//!
//! Every system carries its state as one complex column vector:
//!
//! - a closed system stores the doubled ket `(ψ, ψ̄) ∈ ℂ^{2N}` ([`doubled`]);
//! - an open system stores the generalised Gell-Mann coordinates of ρ,
//!   a vector in ℂ^{N²} ([`BlochFrame`]).
//!
//! Ladder operators use the truncated Fock basis |0⟩,...,|N-1⟩:
//!   a|n⟩ = √n |n-1⟩,  a†|n⟩ = √(n+1) |n+1⟩

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use num_traits::{One, Zero};
use rand::Rng;

/// Complex column vector: a doubled ket or the coordinates of ρ.
pub type StateVector = DVector<Complex64>;

/// Dense complex operator.
pub type Matrix = DMatrix<Complex64>;

/// Imaginary unit.
pub const I: Complex64 = Complex64::new(0.0, 1.0);

/// Lift a real number to `Complex64`.
#[inline]
pub fn real(x: f64) -> Complex64 {
    Complex64::new(x, 0.0)
}

/// Standard basis ket |i⟩ in an `n`-dimensional space.
pub fn basis(n: usize, i: usize) -> StateVector {
    let mut v = StateVector::zeros(n);
    v[i] = Complex64::one();
    v
}

/// Identity operator.
pub fn qeye(n: usize) -> Matrix {
    Matrix::identity(n, n)
}

/// Annihilation operator a.
pub fn destroy(n: usize) -> Matrix {
    let mut m = Matrix::zeros(n, n);
    for k in 1..n {
        m[(k - 1, k)] = real((k as f64).sqrt());
    }
    m
}

/// Creation operator a†.
pub fn create(n: usize) -> Matrix {
    destroy(n).adjoint()
}

/// Number operator a†a = diag(0, 1, ..., N-1).
pub fn num(n: usize) -> Matrix {
    Matrix::from_fn(n, n, |i, j| if i == j { real(i as f64) } else { Complex64::zero() })
}

/// Random Hermitian matrix H = (A + A†) / (2√N), real and imaginary parts
/// of A uniform in [-1, 1).
///
/// Determinism is the caller's concern: pass a seeded generator.
pub fn rand_herm<R: Rng>(n: usize, rng: &mut R) -> Matrix {
    let a = Matrix::from_fn(n, n, |_, _| {
        Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
    });
    let scale = real(0.5 / (n as f64).sqrt());
    (&a + a.adjoint()) * scale
}

/// Projector |ψ⟩⟨ψ|.
pub fn ket2dm(psi: &StateVector) -> Matrix {
    psi * psi.adjoint()
}

/// The doubled ket (ψ, ψ̄) ∈ ℂ^{2N} on which the closed system acts.
pub fn doubled(psi: &StateVector) -> StateVector {
    let n = psi.len();
    StateVector::from_fn(2 * n, |i, _| if i < n { psi[i] } else { psi[i - n].conj() })
}

/// `step·e_index` in a space of dimension `n`.
#[inline]
pub fn unit_step(n: usize, index: usize, step: f64) -> StateVector {
    let mut out = StateVector::zeros(n);
    out[index] = real(step);
    out
}

/// Nonzero entries `(row, column, value)` of a sparse operator.
type Entries = Vec<(usize, usize, Complex64)>;

/// Generalised Gell-Mann coordinates for operators on ℂᴺ.
///
/// With λ_1, ..., λ_{N²-1} the generalised Gell-Mann matrices
/// (tr λ_k λ_l = 2δ_kl),
///
///   ρ = r_0 𝟙/N + Σ_k r_k λ_k/2,   r_0 = tr ρ,   r_k = tr(λ_k ρ)
///
/// The λ_k are ordered pairwise, symmetric before antisymmetric, for every
/// i < j, followed by the N-1 diagonal ones. Hermitian operators have real
/// coordinates. Each generator has at most N nonzero entries and is stored
/// sparsely.
#[derive(Debug, Clone)]
pub struct BlochFrame {
    n: usize,
    /// 𝟙/N, λ_k/2
    frame: Vec<Entries>,
    /// 𝟙, λ_k
    dual: Vec<Entries>,
}

impl BlochFrame {
    pub fn new(n: usize) -> Self {
        let one = Complex64::one();
        let mut dual: Vec<Entries> = Vec::with_capacity(n * n);
        dual.push((0..n).map(|i| (i, i, one)).collect());
        for i in 0..n {
            for j in i + 1..n {
                dual.push(vec![(i, j, one), (j, i, one)]);
                dual.push(vec![(i, j, -I), (j, i, I)]);
            }
        }
        for l in 1..n {
            let scale = (2.0 / (l * (l + 1)) as f64).sqrt();
            let mut diag: Entries = (0..l).map(|m| (m, m, real(scale))).collect();
            diag.push((l, l, real(-(l as f64) * scale)));
            dual.push(diag);
        }
        let frame = dual
            .iter()
            .enumerate()
            .map(|(k, entries)| {
                let w = if k == 0 { 1.0 / n as f64 } else { 0.5 };
                entries.iter().map(|&(i, j, v)| (i, j, v * w)).collect()
            })
            .collect();
        Self { n, frame, dual }
    }

    /// Number of coordinates, N².
    pub fn len(&self) -> usize {
        self.dual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dual.is_empty()
    }

    /// Σ_k r_k B_k
    pub fn operator(&self, coordinates: &StateVector) -> Matrix {
        let mut out = Matrix::zeros(self.n, self.n);
        for (&r, entries) in coordinates.iter().zip(&self.frame) {
            if r.is_zero() {
                continue;
            }
            for &(i, j, v) in entries {
                out[(i, j)] += r * v;
            }
        }
        out
    }

    /// [tr ρ, tr(λ_1 ρ), ...]
    pub fn coordinates(&self, op: &Matrix) -> StateVector {
        let traces = self
            .dual
            .iter()
            .map(|entries| entries.iter().map(|&(i, j, v)| v * op[(j, i)]).sum::<Complex64>());
        StateVector::from_iterator(self.len(), traces)
    }
}
