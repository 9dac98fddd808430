//! Row subproblem kernels.
//!
//! One specialized kernel per coefficient family: [`coeff01::Solver01`]
//! for pure 0/1 rows, [`coeff101::Solver101`] for rows with -1 factors,
//! [`coeffz::SolverZ`] for general integer factors. All three follow the
//! same row protocol: decay the row preferences, assemble the reduced
//! costs through column sweeps, sort with randomized tie-breaks, select a
//! cut index and affect the variables, the preferences and the row dual.
//!
//! The kernels are monomorphized over the float type and the optimization
//! direction; the runtime choice happens once per solve at the crate
//! entry points.

pub mod coeff01;
pub mod coeff101;
pub mod coeffz;

use rand::Rng;

use crate::bitvec::BitVec;
use crate::cost::{CostModel, SolverFloat};
use crate::sparse::SparseIncidence;

/// Optimization direction as a compile time tag.
pub trait ModeTag: Copy + Default + Send + Sync + 'static {
    /// True for maximization.
    const MAXIMIZE: bool;

    /// True when `a` should be selected before `b`.
    fn is_better<F: SolverFloat>(a: F, b: F) -> bool;

    /// True when a reduced cost at the scan point ends the selection.
    /// Values at zero flip a coin so that repeated ties explore both
    /// outcomes.
    fn stop_iterating<F: SolverFloat, R: Rng>(value: F, rng: &mut R) -> bool;

    /// True when objective `candidate` improves on `incumbent`.
    fn is_better_solution(candidate: f64, incumbent: f64) -> bool;
}

/// Minimization tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimizeTag;

/// Maximization tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaximizeTag;

impl ModeTag for MinimizeTag {
    const MAXIMIZE: bool = false;

    #[inline]
    fn is_better<F: SolverFloat>(a: F, b: F) -> bool {
        a < b
    }

    #[inline]
    fn stop_iterating<F: SolverFloat, R: Rng>(value: F, rng: &mut R) -> bool {
        if value == F::zero() {
            rng.gen_bool(0.5)
        } else {
            value > F::zero()
        }
    }

    #[inline]
    fn is_better_solution(candidate: f64, incumbent: f64) -> bool {
        candidate < incumbent
    }
}

impl ModeTag for MaximizeTag {
    const MAXIMIZE: bool = true;

    #[inline]
    fn is_better<F: SolverFloat>(a: F, b: F) -> bool {
        a > b
    }

    #[inline]
    fn stop_iterating<F: SolverFloat, R: Rng>(value: F, rng: &mut R) -> bool {
        if value == F::zero() {
            rng.gen_bool(0.5)
        } else {
            value < F::zero()
        }
    }

    #[inline]
    fn is_better_solution(candidate: f64, incumbent: f64) -> bool {
        candidate > incumbent
    }
}

/// One reduced cost entry.
///
/// `id` is the position of the entry in its row view, stable across the
/// sort; `factor` is the row coefficient of that position.
#[derive(Debug, Clone, Copy, Default)]
pub struct RcData<F> {
    /// Reduced cost
    pub value: F,

    /// Position in the row view
    pub id: usize,

    /// Row coefficient at that position
    pub factor: i32,
}

impl<F> RcData<F> {
    /// True when the sign-flip trick applies to this position.
    #[inline]
    pub fn is_negative_factor(&self) -> bool {
        self.factor < 0
    }
}

/// Relative tolerance under which two reduced costs count as tied.
const TIE_RELATIVE: f64 = 1e-6;

/// Absolute tolerance for ties around zero.
const TIE_ABSOLUTE: f64 = 1e-10;

fn essentially_equal<F: SolverFloat>(a: F, b: F) -> bool {
    let diff = (a - b).abs();
    let scale = a.abs().min(b.abs());

    diff <= scale * crate::cost::cast::<F>(TIE_RELATIVE)
        || diff < crate::cost::cast::<F>(TIE_ABSOLUTE)
}

/// Sort the reduced costs for selection, ascending under minimization
/// and descending under maximization, then reshuffle every run of
/// near-tied values with the worker RNG.
pub fn calculator_sort<F: SolverFloat, M: ModeTag, R: Rng>(r: &mut [RcData<F>], rng: &mut R) {
    if r.len() < 2 {
        return;
    }

    r.sort_by(|a, b| {
        if M::is_better(a.value, b.value) {
            std::cmp::Ordering::Less
        } else if M::is_better(b.value, a.value) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    });

    let mut begin = 0;
    while begin < r.len() {
        let mut end = begin + 1;
        while end < r.len() && essentially_equal(r[begin].value, r[end].value) {
            end += 1;
        }

        if end - begin > 1 {
            // Fisher-Yates over the tied run.
            for i in (begin + 1..end).rev() {
                let j = rng.gen_range(begin..=i);
                r.swap(i, j);
            }
        }

        begin = end;
    }
}

/// Apply the selection `selected` to row `k`: write the assignment
/// prefix, move the preferences by the kappa-amplified delta and update
/// the row dual. Returns whether `pi[k]` changed sign.
///
/// `selected < 0` turns the whole row off; `selected + 1 >= r_size`
/// turns it on entirely.
#[allow(clippy::too_many_arguments)]
pub fn affect_variables<F: SolverFloat>(
    x: &mut BitVec,
    p: &mut [F],
    pi: &mut [F],
    row_cols: &[usize],
    row_vals: &[usize],
    r: &[RcData<F>],
    r_size: usize,
    k: usize,
    selected: i32,
    kappa: F,
    delta: F,
) -> bool {
    let old_pi = pi[k];

    if selected < 0 {
        for entry in r.iter().take(r_size) {
            x.unset(row_cols[entry.id]);
            p[row_vals[entry.id]] = p[row_vals[entry.id]] - delta;
        }
    } else if selected as usize + 1 >= r_size {
        pi[k] = pi[k] + r[selected as usize].value;

        for entry in r.iter().take(r_size) {
            x.set(row_cols[entry.id]);
            p[row_vals[entry.id]] = p[row_vals[entry.id]] + delta;
        }
    } else {
        let s = selected as usize;
        let two = crate::cost::cast::<F>(2.0);

        pi[k] = pi[k] + (r[s].value + r[s + 1].value) / two;

        let d = delta + (kappa / (F::one() - kappa)) * (r[s + 1].value - r[s].value);

        for entry in r.iter().take(s + 1) {
            x.set(row_cols[entry.id]);
            p[row_vals[entry.id]] = p[row_vals[entry.id]] + d;
        }
        for entry in r.iter().take(r_size).skip(s + 1) {
            x.unset(row_cols[entry.id]);
            p[row_vals[entry.id]] = p[row_vals[entry.id]] - d;
        }
    }

    old_pi.is_sign_negative() != pi[k].is_sign_negative()
}

/// Equality selection: turn on the first `bk` sorted positions.
#[inline]
pub fn select_variables_equality(r_size: usize, bk: i32) -> i32 {
    bk.min(r_size as i32) - 1
}

/// Inequality selection: scan from the lower bound upward and stop at
/// the first reduced cost crossing the stop threshold.
pub fn select_variables_inequality<F: SolverFloat, M: ModeTag, R: Rng>(
    r: &[RcData<F>],
    r_size: usize,
    bkmin: i32,
    bkmax: i32,
    rng: &mut R,
) -> i32 {
    let bkmin = bkmin.min(r_size as i32).max(0);
    let bkmax = bkmax.min(r_size as i32);

    let mut i = bkmin;
    while i <= bkmax && (i as usize) < r_size {
        if M::stop_iterating::<F, R>(r[i as usize].value, rng) {
            return i - 1;
        }
        i += 1;
    }

    bkmax - 1
}

/// Common interface of the three family kernels.
///
/// The generic methods keep the kernels monomorphized end to end; the
/// dispatch over families happens once per solve.
pub trait RowSolver<F: SolverFloat>: Send {
    /// Number of rows.
    fn rows(&self) -> usize;

    /// Number of columns.
    fn cols(&self) -> usize;

    /// Zero the preferences and the duals for a fresh solve round.
    fn reset(&mut self);

    /// The row duals.
    fn pi(&self) -> &[F];

    /// The per-nonzero preferences.
    fn preferences(&self) -> &[F];

    /// The shared incidence.
    fn incidence(&self) -> &SparseIncidence;

    /// Tightened bounds of row `k`.
    fn bounds(&self, k: usize) -> (i32, i32);

    /// Left-hand side of row `k` under `x`.
    fn row_value(&self, k: usize, x: &BitVec) -> i32 {
        let (cols, vals) = self.incidence().row(k);
        let mut v = 0i32;
        for (&col, &val) in cols.iter().zip(vals) {
            if x.get(col) {
                v += self.factor(val);
            }
        }
        v
    }

    /// Row coefficient at nonzero `value`.
    fn factor(&self, value: usize) -> i32;

    /// True when row `k` is satisfied under `x`.
    fn is_satisfied(&self, k: usize, x: &BitVec) -> bool {
        let (min, max) = self.bounds(k);
        let v = self.row_value(k, x);
        min <= v && v <= max
    }

    /// Violation magnitude of row `k` under `x`; zero when satisfied.
    fn violation(&self, k: usize, x: &BitVec) -> i32 {
        let (min, max) = self.bounds(k);
        let v = self.row_value(k, x);
        if v < min {
            min - v
        } else if v > max {
            v - max
        } else {
            0
        }
    }

    /// Fill `out` with the violated rows in ascending order.
    fn compute_violated_constraints(&self, x: &BitVec, out: &mut Vec<usize>) -> usize {
        out.clear();
        for k in 0..self.rows() {
            if !self.is_satisfied(k, x) {
                out.push(k);
            }
        }
        out.len()
    }

    /// True when every row is satisfied under `x`.
    fn is_valid_solution(&self, x: &BitVec) -> bool {
        (0..self.rows()).all(|k| self.is_satisfied(k, x))
    }

    /// Run the §row protocol on row `k`. `obj_amp` is zero outside the
    /// push phase. Returns whether `pi[k]` changed sign.
    #[allow(clippy::too_many_arguments)]
    fn update_row<C: CostModel<F>, R: Rng>(
        &mut self,
        k: usize,
        x: &mut BitVec,
        cost: &C,
        rng: &mut R,
        kappa: F,
        delta: F,
        theta: F,
        obj_amp: F,
    ) -> bool;
}
