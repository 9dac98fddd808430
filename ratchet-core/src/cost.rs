//! Cost models: linear and linear+quadratic objective evaluation.
//!
//! The kernels work on a normalized copy of the costs: divided by the
//! L-infinity norm, then multiplied by a single random factor in
//! [0.5, 1.5) drawn once per solver, so that repeated runs walk the
//! same landscape at a different magnitude. The original costs are kept
//! for objective reporting.

use num_traits::{Float, NumCast};
use rand::Rng;

use crate::bitvec::BitVec;
use crate::problem::Objective;

/// Floating point type of the hot kernels.
pub trait SolverFloat:
    Float + NumCast + Default + Send + Sync + std::fmt::Debug + std::fmt::Display + 'static
{
}

impl SolverFloat for f32 {}
impl SolverFloat for f64 {}

/// Convert an f64 parameter into the kernel float type.
#[inline]
pub(crate) fn cast<F: SolverFloat>(v: f64) -> F {
    match F::from(v) {
        Some(f) => f,
        None => F::nan(),
    }
}


/// Evaluation of the objective restricted to one variable.
pub trait CostModel<F: SolverFloat>: Send + Sync {
    /// Normalized cost of variable `j` under the current assignment.
    ///
    /// For quadratic objectives this reads the neighbors of `j` in `x`;
    /// the value is recomputed on every call and never cached across rows.
    fn cost(&self, j: usize, x: &BitVec) -> F;

    /// Objective value of `x` on the original costs.
    fn results(&self, x: &BitVec, constant: f64) -> f64;

    /// Smallest nonzero |normalized cost|; feeds the automatic delta.
    fn min_abs_nonzero(&self) -> F;

    /// Original linear cost of variable `j`, used by the seeding policies.
    fn linear_cost(&self, j: usize) -> f64;
}

/// Linear objective costs.
#[derive(Debug, Clone)]
pub struct LinearCost<F> {
    original: Vec<f64>,
    normalized: Vec<F>,
}

impl<F: SolverFloat> LinearCost<F> {
    /// Build the per-variable cost vector of `objective` over `n`
    /// variables, normalized with `rng`.
    pub fn new<R: Rng>(objective: &Objective, n: usize, rng: &mut R) -> Self {
        let mut original = vec![0.0f64; n];
        for e in &objective.elements {
            original[e.var] += e.factor;
        }

        let normalized = normalize(&original, rng);

        Self {
            original,
            normalized,
        }
    }
}

impl<F: SolverFloat> CostModel<F> for LinearCost<F> {
    #[inline]
    fn cost(&self, j: usize, _x: &BitVec) -> F {
        self.normalized[j]
    }

    fn results(&self, x: &BitVec, constant: f64) -> f64 {
        let mut value = constant;
        for (j, &c) in self.original.iter().enumerate() {
            if x.get(j) {
                value += c;
            }
        }
        value
    }

    fn min_abs_nonzero(&self) -> F {
        min_abs_nonzero(&self.normalized)
    }

    fn linear_cost(&self, j: usize) -> f64 {
        self.original[j]
    }
}

/// Linear plus quadratic objective costs.
///
/// The quadratic part is stored as a per-variable adjacency: the cost of
/// `j` gains `factor * x[other]` for each quadratic element touching `j`.
#[derive(Debug, Clone)]
pub struct QuadraticCost<F> {
    linear_original: Vec<f64>,
    linear_normalized: Vec<F>,
    neighbors: Vec<Vec<(usize, F)>>,
    quad_original: Vec<(usize, usize, f64)>,
}

impl<F: SolverFloat> QuadraticCost<F> {
    /// Build the cost model of `objective` over `n` variables.
    pub fn new<R: Rng>(objective: &Objective, n: usize, rng: &mut R) -> Self {
        let mut linear_original = vec![0.0f64; n];
        for e in &objective.elements {
            linear_original[e.var] += e.factor;
        }

        // One multiplier shared by both parts so they stay commensurable
        // in the reduced costs.
        let k = random_scale(&linear_original, rng);
        let linear_normalized: Vec<F> =
            linear_original.iter().map(|&c| cast::<F>(c * k)).collect();

        let mut neighbors: Vec<Vec<(usize, F)>> = vec![Vec::new(); n];
        let mut quad_original = Vec::with_capacity(objective.qelements.len());

        for q in &objective.qelements {
            let f = cast::<F>(q.factor * k);
            if q.var_a == q.var_b {
                // x * x = x over binaries: fold into the linear part.
                neighbors[q.var_a].push((q.var_a, f));
            } else {
                neighbors[q.var_a].push((q.var_b, f));
                neighbors[q.var_b].push((q.var_a, f));
            }
            quad_original.push((q.var_a, q.var_b, q.factor));
        }

        Self {
            linear_original,
            linear_normalized,
            neighbors,
            quad_original,
        }
    }
}

impl<F: SolverFloat> CostModel<F> for QuadraticCost<F> {
    #[inline]
    fn cost(&self, j: usize, x: &BitVec) -> F {
        let mut value = self.linear_normalized[j];
        for &(other, factor) in &self.neighbors[j] {
            if other == j || x.get(other) {
                value = value + factor;
            }
        }
        value
    }

    fn results(&self, x: &BitVec, constant: f64) -> f64 {
        let mut value = constant;
        for (j, &c) in self.linear_original.iter().enumerate() {
            if x.get(j) {
                value += c;
            }
        }
        for &(a, b, factor) in &self.quad_original {
            if x.get(a) && x.get(b) {
                value += factor;
            }
        }
        value
    }

    fn min_abs_nonzero(&self) -> F {
        min_abs_nonzero(&self.linear_normalized)
    }

    fn linear_cost(&self, j: usize) -> f64 {
        self.linear_original[j]
    }
}

fn scale_of(costs: &[f64]) -> f64 {
    let norm = costs.iter().fold(0.0f64, |acc, c| acc.max(c.abs()));
    if norm > 0.0 {
        norm
    } else {
        1.0
    }
}

/// The multiplier taking an original cost to its normalized value:
/// division by the L-infinity norm and one random factor in [0.5, 1.5).
fn random_scale<R: Rng>(costs: &[f64], rng: &mut R) -> f64 {
    rng.gen_range(0.5..1.5) / scale_of(costs)
}

fn normalize<F: SolverFloat, R: Rng>(costs: &[f64], rng: &mut R) -> Vec<F> {
    let k = random_scale(costs, rng);
    costs.iter().map(|&c| cast::<F>(c * k)).collect()
}

fn min_abs_nonzero<F: SolverFloat>(costs: &[F]) -> F {
    let mut min = F::infinity();
    for &c in costs {
        let a = c.abs();
        if a > F::zero() && a < min {
            min = a;
        }
    }
    if min.is_infinite() {
        F::one()
    } else {
        min
    }
}

/// Automatic delta when the parameter is negative: a theta-scaled share
/// of the smallest cost step, clamped away from zero.
pub fn compute_delta<F: SolverFloat>(theta: f64, cost: &impl CostModel<F>) -> F {
    let floor = cast::<F>(1e-4);
    let share = cast::<F>(1.0 - theta).max(cast::<F>(0.1));
    let delta = share * cost.min_abs_nonzero();

    if delta.is_finite() && delta > floor {
        delta
    } else {
        floor
    }
}
