//! Embedded subsolvers for general-integer rows.
//!
//! The greedy prefix scan of the Z kernel fails when no prefix of the
//! sorted reduced costs hits the row bounds exactly; these solvers then
//! pick a feasible subset directly. All of them speak the selection
//! protocol of the kernels: the chosen subset is moved to the front of
//! the scratch and its size minus one is returned, `-1` meaning the
//! all-off row.

use rustc_hash::FxHashMap;

use crate::cost::SolverFloat;
use crate::kernel::{ModeTag, RcData};

/// Rows wider than this never go through the exhaustive enumerator.
pub const EXHAUSTIVE_MAX_WIDTH: usize = 32;

/// Weight budget above which the knapsack table is not built.
const KNAPSACK_MAX_WEIGHT: i64 = 4096;

/// Move the entries flagged in `take` (indexed by current scratch
/// position) to the front, keeping relative order on both sides, and
/// return the §selection index.
fn promote_subset<F: SolverFloat>(r: &mut [RcData<F>], r_size: usize, take: &[bool]) -> i32 {
    let mut chosen: Vec<RcData<F>> = Vec::with_capacity(r_size);
    let mut rest: Vec<RcData<F>> = Vec::with_capacity(r_size);

    for (i, entry) in r.iter().take(r_size).enumerate() {
        if take[i] {
            chosen.push(*entry);
        } else {
            rest.push(*entry);
        }
    }

    let count = chosen.len();
    for (i, entry) in chosen.into_iter().chain(rest).enumerate() {
        r[i] = entry;
    }

    count as i32 - 1
}

/// Exhaustive subset enumerator for narrow rows.
///
/// Feasibility of a subset only depends on the row factors and bounds,
/// both fixed at construction, so the feasible masks of every registered
/// row are enumerated once and reused every sweep.
#[derive(Debug, Default)]
pub struct ExhaustiveSolver {
    rows: FxHashMap<usize, Vec<u64>>,
}

impl ExhaustiveSolver {
    /// Create an empty enumerator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate and store the feasible masks of row `k`.
    ///
    /// `weights` are the positive selection weights of the row positions
    /// (factors after the sign flip), `bkmin..=bkmax` the shifted bounds.
    pub fn build_row(&mut self, k: usize, weights: &[i32], bkmin: i32, bkmax: i32) {
        debug_assert!(weights.len() <= EXHAUSTIVE_MAX_WIDTH);

        let mut feasible = Vec::new();
        let full: u64 = if weights.len() == 64 {
            u64::MAX
        } else {
            (1u64 << weights.len()) - 1
        };

        let mut mask = 0u64;
        loop {
            let sum: i64 = (0..weights.len())
                .filter(|&i| mask & (1 << i) != 0)
                .map(|i| i64::from(weights[i]))
                .sum();

            if i64::from(bkmin) <= sum && sum <= i64::from(bkmax) {
                feasible.push(mask);
            }

            if mask == full {
                break;
            }
            mask += 1;
        }

        self.rows.insert(k, feasible);
    }

    /// True when row `k` was registered.
    pub fn handles(&self, k: usize) -> bool {
        self.rows.contains_key(&k)
    }

    /// Pick the best feasible subset of row `k` under the current
    /// reduced costs.
    ///
    /// The scratch must be unsorted: position `i` holds the reduced cost
    /// of row position `i`.
    pub fn solve<F: SolverFloat, M: ModeTag>(&self, k: usize, r: &mut [RcData<F>], r_size: usize) -> i32 {
        let Some(masks) = self.rows.get(&k) else {
            return -1;
        };

        let mut best_mask: Option<u64> = None;
        let mut best_cost = F::zero();

        for &mask in masks {
            let cost = (0..r_size)
                .filter(|&i| mask & (1 << i) != 0)
                .fold(F::zero(), |acc, i| acc + r[i].value);

            if best_mask.is_none() || M::is_better(cost, best_cost) {
                best_mask = Some(mask);
                best_cost = cost;
            }
        }

        let Some(mask) = best_mask else {
            return -1;
        };

        let take: Vec<bool> = (0..r_size).map(|i| mask & (1 << r[i].id) != 0).collect();

        // With an unsorted scratch, id == position; keep the mapping
        // through ids anyway so callers may pre-permute.
        promote_subset(r, r_size, &take)
    }
}

/// Depth-first branch-and-bound over the sorted scratch.
///
/// Prunes a branch when the partial weight overshoots `bkmax`, when the
/// remaining weight cannot reach `bkmin`, or when the optimistic cost
/// completion cannot beat the incumbent subset.
#[derive(Debug, Default)]
pub struct BranchAndBoundSolver {
    take: Vec<bool>,
    best: Vec<bool>,
}

impl BranchAndBoundSolver {
    /// Create a solver with empty scratch buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the scratch for rows of up to `width` positions.
    pub fn reserve(&mut self, width: usize) {
        self.take.reserve(width);
        self.best.reserve(width);
    }

    /// Pick the best subset of `r[..r_size]` with total weight inside
    /// `bkmin..=bkmax`, weights being `|factor|`.
    pub fn solve<F: SolverFloat, M: ModeTag>(
        &mut self,
        r: &mut [RcData<F>],
        r_size: usize,
        bkmin: i32,
        bkmax: i32,
    ) -> i32 {
        self.take.clear();
        self.take.resize(r_size, false);
        self.best.clear();
        self.best.resize(r_size, false);

        // Suffix sums of the weights and of the profitable costs for the
        // two pruning rules.
        let weights: Vec<i64> = (0..r_size).map(|i| i64::from(r[i].factor.abs())).collect();

        let mut weight_left = vec![0i64; r_size + 1];
        let mut gain_left = vec![F::zero(); r_size + 1];
        for i in (0..r_size).rev() {
            weight_left[i] = weight_left[i + 1] + weights[i];
            let gain = if M::is_better(r[i].value, F::zero()) {
                r[i].value
            } else {
                F::zero()
            };
            gain_left[i] = gain_left[i + 1] + gain;
        }

        let mut state = SearchState {
            best_cost: F::zero(),
            found: false,
            bkmin: i64::from(bkmin),
            bkmax: i64::from(bkmax),
        };

        self.descend::<F, M>(
            r,
            &weights,
            &weight_left,
            &gain_left,
            0,
            0,
            F::zero(),
            &mut state,
        );

        if !state.found {
            return -1;
        }

        let take = std::mem::take(&mut self.best);
        let selected = promote_subset(r, r_size, &take);
        self.best = take;
        selected
    }

    #[allow(clippy::too_many_arguments)]
    fn descend<F: SolverFloat, M: ModeTag>(
        &mut self,
        r: &[RcData<F>],
        weights: &[i64],
        weight_left: &[i64],
        gain_left: &[F],
        depth: usize,
        weight: i64,
        cost: F,
        state: &mut SearchState<F>,
    ) {
        if weight > state.bkmax {
            return;
        }

        if weight + weight_left[depth] < state.bkmin {
            return;
        }

        // The best this branch can still reach.
        if state.found && !M::is_better(cost + gain_left[depth], state.best_cost) {
            return;
        }

        if depth == weights.len() {
            if weight >= state.bkmin && (!state.found || M::is_better(cost, state.best_cost)) {
                state.found = true;
                state.best_cost = cost;
                self.best.copy_from_slice(&self.take);
            }
            return;
        }

        self.take[depth] = true;
        self.descend::<F, M>(
            r,
            weights,
            weight_left,
            gain_left,
            depth + 1,
            weight + weights[depth],
            cost + r[depth].value,
            state,
        );

        self.take[depth] = false;
        self.descend::<F, M>(
            r,
            weights,
            weight_left,
            gain_left,
            depth + 1,
            weight,
            cost,
            state,
        );
    }
}

struct SearchState<F> {
    best_cost: F,
    found: bool,
    bkmin: i64,
    bkmax: i64,
}

/// Bounded 0/1 knapsack over exact total weights.
///
/// Builds a `(positions + 1) x (bkmax + 1)` table of the best subset
/// cost per exact weight, then picks the best weight in
/// `bkmin..=bkmax`. Only worth it when the weight budget is small;
/// returns `None` when the table would be too large so the caller can
/// fall back to branch-and-bound.
pub fn knapsack_dp<F: SolverFloat, M: ModeTag>(
    r: &mut [RcData<F>],
    r_size: usize,
    bkmin: i32,
    bkmax: i32,
) -> Option<i32> {
    if bkmax < 0 || i64::from(bkmax) > KNAPSACK_MAX_WEIGHT {
        return None;
    }

    let width = (bkmax + 1) as usize;
    let mut reachable = vec![false; (r_size + 1) * width];
    let mut cost = vec![F::zero(); (r_size + 1) * width];

    reachable[0] = true;

    for i in 0..r_size {
        let w = r[i].factor.unsigned_abs() as usize;
        for total in 0..width {
            let from = i * width + total;
            if !reachable[from] {
                continue;
            }

            // Skip position i.
            let skip = (i + 1) * width + total;
            if !reachable[skip] || M::is_better(cost[from], cost[skip]) {
                reachable[skip] = true;
                cost[skip] = cost[from];
            }

            // Take position i.
            if total + w < width {
                let take = (i + 1) * width + total + w;
                let taken = cost[from] + r[i].value;
                if !reachable[take] || M::is_better(taken, cost[take]) {
                    reachable[take] = true;
                    cost[take] = taken;
                }
            }
        }
    }

    let lo = bkmin.max(0) as usize;
    let mut best_weight: Option<usize> = None;
    for total in lo..width {
        let at = r_size * width + total;
        if !reachable[at] {
            continue;
        }
        match best_weight {
            None => best_weight = Some(total),
            Some(prev) => {
                if M::is_better(cost[at], cost[r_size * width + prev]) {
                    best_weight = Some(total);
                }
            }
        }
    }

    // No reachable weight inside the bounds: the row stays off.
    let Some(mut total) = best_weight else {
        return Some(-1);
    };

    // Walk the table back to recover the chosen positions.
    let mut take = vec![false; r_size];
    for i in (0..r_size).rev() {
        let w = r[i].factor.unsigned_abs() as usize;
        let skip = i * width + total;

        let took = if total >= w {
            let from = i * width + (total - w);
            if reachable[from] {
                let taken = cost[from] + r[i].value;
                !reachable[skip] || !M::is_better(cost[skip], taken)
            } else {
                false
            }
        } else {
            false
        };

        if took {
            take[i] = true;
            total -= w;
        }
    }

    Some(promote_subset(r, r_size, &take))
}
