//! Per-sweep ordering of the violated constraints.
//!
//! A sweep updates the currently violated rows; the policy decides in
//! which order. State is limited to the alternating flag of the
//! reversing policy, the permutation buffer and the pi-sign snapshot
//! consumed by the sign-change policy.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::bitvec::BitVec;
use crate::cost::SolverFloat;
use crate::kernel::RowSolver;
use crate::params::ConstraintOrder;

/// Computes the row visit order of every sweep.
#[derive(Debug)]
pub struct ComputeOrder {
    policy: ConstraintOrder,
    order: Vec<usize>,
    reversed: bool,
    pi_changed: Vec<bool>,
}

impl ComputeOrder {
    /// Create the order state for `m` rows.
    pub fn new(policy: ConstraintOrder, m: usize) -> Self {
        Self {
            policy,
            order: Vec::with_capacity(m),
            reversed: false,
            pi_changed: vec![false; m],
        }
    }

    /// Record whether row `k`'s dual changed sign during the last sweep.
    pub fn record_pi_change(&mut self, k: usize, changed: bool) {
        self.pi_changed[k] = changed;
    }

    /// Reset the per-solve state.
    pub fn reset(&mut self) {
        self.reversed = false;
        self.pi_changed.fill(false);
        self.order.clear();
    }

    /// Collect the violated rows and arrange them under the policy.
    /// Returns the rows to visit, in order.
    pub fn arrange<F, S, R>(&mut self, solver: &S, x: &BitVec, rng: &mut R) -> &[usize]
    where
        F: SolverFloat,
        S: RowSolver<F>,
        R: Rng,
    {
        solver.compute_violated_constraints(x, &mut self.order);
        self.apply_policy(solver, x, rng);
        &self.order
    }

    /// Arrange every row under the policy, violated or not. Push sweeps
    /// go through here: they rework satisfied rows too.
    pub fn arrange_all<F, S, R>(&mut self, solver: &S, x: &BitVec, rng: &mut R) -> &[usize]
    where
        F: SolverFloat,
        S: RowSolver<F>,
        R: Rng,
    {
        self.order.clear();
        self.order.extend(0..solver.rows());
        self.apply_policy(solver, x, rng);
        &self.order
    }

    fn apply_policy<F, S, R>(&mut self, solver: &S, x: &BitVec, rng: &mut R)
    where
        F: SolverFloat,
        S: RowSolver<F>,
        R: Rng,
    {
        match self.policy {
            ConstraintOrder::None => {}
            ConstraintOrder::Reversing => {
                if self.reversed {
                    self.order.reverse();
                }
                self.reversed = !self.reversed;
            }
            ConstraintOrder::RandomSorting => {
                self.order.shuffle(rng);
            }
            ConstraintOrder::InfeasibilityDecr => {
                self.order.sort_by_key(|&k| -solver.violation(k, x));
            }
            ConstraintOrder::InfeasibilityIncr => {
                self.order.sort_by_key(|&k| solver.violation(k, x));
            }
            ConstraintOrder::LagrangianDecr => {
                let pi = solver.pi();
                self.order.sort_by(|&a, &b| {
                    pi[b].abs()
                        .partial_cmp(&pi[a].abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            ConstraintOrder::LagrangianIncr => {
                let pi = solver.pi();
                self.order.sort_by(|&a, &b| {
                    pi[a].abs()
                        .partial_cmp(&pi[b].abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            ConstraintOrder::PiSignChange => {
                // Stable partition: rows that flipped first.
                let pi_changed = &self.pi_changed;
                self.order.sort_by_key(|&k| !pi_changed[k]);
            }
        }
    }
}
