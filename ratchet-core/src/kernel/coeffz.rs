//! Kernel for rows with general integer factors.
//!
//! Rows whose factors stay in {-1, 0, 1} follow the ±1 protocol. A row
//! with a wider factor goes through the sign-flip trick with the bounds
//! shifted by the absolute sum of its negative factors, then a greedy
//! prefix scan over the sorted reduced costs; when no prefix hits the
//! bounds the selection is delegated to an embedded subsolver: the
//! exhaustive enumerator for narrow rows, otherwise the knapsack table
//! or depth-first branch-and-bound.

use std::marker::PhantomData;

use rand::Rng;

use crate::bitvec::BitVec;
use crate::cost::{CostModel, SolverFloat};
use crate::merge::{reduced_costs_scratch_size, MergedConstraint};
use crate::sparse::SparseIncidence;
use crate::subsolver::{knapsack_dp, BranchAndBoundSolver, ExhaustiveSolver, EXHAUSTIVE_MAX_WIDTH};

use super::{
    affect_variables, calculator_sort, select_variables_equality, select_variables_inequality,
    ModeTag, RcData, RowSolver,
};

/// Row solver over general integer factors.
#[derive(Debug)]
pub struct SolverZ<F, M> {
    ap: SparseIncidence,
    a: Vec<i32>,
    p: Vec<F>,
    pi: Vec<F>,
    r: Vec<RcData<F>>,
    b: Vec<(i32, i32)>,

    /// Per row, the positions holding a negative factor.
    negatives: Vec<Vec<usize>>,

    /// Per row, the absolute sum of its negative factors.
    shifts: Vec<i32>,

    /// True for rows with a |factor| > 1.
    wide: Vec<bool>,

    exhaustive: ExhaustiveSolver,
    branch_and_bound: BranchAndBoundSolver,

    _mode: PhantomData<M>,
}

impl<F: SolverFloat, M: ModeTag> SolverZ<F, M> {
    /// Size every buffer from the merged constraints and pre-enumerate
    /// the feasible subsets of the narrow wide-factor rows.
    pub fn new(csts: &[MergedConstraint], n: usize) -> Self {
        let ap = SparseIncidence::new(csts, n);

        let mut a = Vec::with_capacity(ap.len());
        let mut b = Vec::with_capacity(csts.len());
        let mut negatives = Vec::with_capacity(csts.len());
        let mut shifts = Vec::with_capacity(csts.len());
        let mut wide = Vec::with_capacity(csts.len());

        let mut exhaustive = ExhaustiveSolver::new();
        let mut branch_and_bound = BranchAndBoundSolver::new();
        let mut widest = 0;

        for (k, cst) in csts.iter().enumerate() {
            let mut neg = Vec::new();
            let mut shift = 0i32;
            let mut is_wide = false;

            for (t, e) in cst.elements.iter().enumerate() {
                debug_assert_ne!(e.factor, 0);
                a.push(e.factor);
                if e.factor < 0 {
                    neg.push(t);
                    shift += -e.factor;
                }
                if e.factor.abs() > 1 {
                    is_wide = true;
                }
            }

            if is_wide {
                widest = widest.max(cst.elements.len());

                if cst.elements.len() <= EXHAUSTIVE_MAX_WIDTH {
                    let weights: Vec<i32> =
                        cst.elements.iter().map(|e| e.factor.abs()).collect();
                    exhaustive.build_row(k, &weights, cst.min + shift, cst.max + shift);
                }
            }

            negatives.push(neg);
            shifts.push(shift);
            wide.push(is_wide);
            b.push((cst.min, cst.max));
        }

        branch_and_bound.reserve(widest);

        let scratch = reduced_costs_scratch_size(csts);

        Self {
            p: vec![F::zero(); ap.len()],
            pi: vec![F::zero(); csts.len()],
            r: vec![RcData::default(); scratch],
            a,
            b,
            negatives,
            shifts,
            wide,
            exhaustive,
            branch_and_bound,
            ap,
            _mode: PhantomData,
        }
    }
}

/// Greedy prefix scan over the sorted scratch: the first prefix whose
/// weight lands inside the bounds, if any.
fn greedy_prefix<F: SolverFloat>(r: &[RcData<F>], r_size: usize, bkmin: i32, bkmax: i32) -> Option<i32> {
    let mut sum = 0i64;

    for (i, entry) in r.iter().take(r_size).enumerate() {
        sum += i64::from(entry.factor.abs());

        if i64::from(bkmin) <= sum && sum <= i64::from(bkmax) {
            return Some(i as i32);
        }

        if sum > i64::from(bkmax) {
            break;
        }
    }

    None
}

impl<F: SolverFloat, M: ModeTag> RowSolver<F> for SolverZ<F, M> {
    fn rows(&self) -> usize {
        self.ap.rows()
    }

    fn cols(&self) -> usize {
        self.ap.cols()
    }

    fn reset(&mut self) {
        self.p.fill(F::zero());
        self.pi.fill(F::zero());
    }

    fn pi(&self) -> &[F] {
        &self.pi
    }

    fn preferences(&self) -> &[F] {
        &self.p
    }

    fn incidence(&self) -> &SparseIncidence {
        &self.ap
    }

    fn bounds(&self, k: usize) -> (i32, i32) {
        self.b[k]
    }

    fn factor(&self, value: usize) -> i32 {
        self.a[value]
    }

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
    ) -> bool {
        let Self {
            ap,
            a,
            p,
            pi,
            r,
            b,
            negatives,
            shifts,
            wide,
            exhaustive,
            branch_and_bound,
            ..
        } = self;

        let (cols, vals) = ap.row(k);
        let r_size = cols.len();

        for &val in vals {
            p[val] = p[val] * theta;
        }

        for t in 0..r_size {
            let mut sum_a_pi = F::zero();
            let mut sum_a_p = F::zero();

            let (col_rows, col_vals) = ap.column(cols[t]);
            for (&row, &val) in col_rows.iter().zip(col_vals) {
                let f = crate::cost::cast::<F>(f64::from(a[val]));
                sum_a_pi = sum_a_pi + f * pi[row];
                sum_a_p = sum_a_p + f * p[val];
            }

            r[t] = RcData {
                value: cost.cost(cols[t], x) - sum_a_pi - sum_a_p,
                id: t,
                factor: a[vals[t]],
            };
        }

        if obj_amp != F::zero() {
            for t in 0..r_size {
                r[t].value = r[t].value + obj_amp * cost.cost(cols[r[t].id], x);
            }
        }

        // Sign-flip trick; the bounds move by the absolute sum of the
        // negated factors.
        let flipped = &negatives[k];
        for &t in flipped {
            r[t].value = -r[t].value;
            p[vals[t]] = -p[vals[t]];
        }
        let shift = shifts[k];

        let (bkmin, bkmax) = b[k];
        let (bkmin, bkmax) = (bkmin + shift, bkmax + shift);

        let selected = if wide[k] {
            if exhaustive.handles(k) {
                // The enumerator consumes the unsorted scratch.
                exhaustive.solve::<F, M>(k, &mut r[..r_size], r_size)
            } else {
                calculator_sort::<F, M, R>(&mut r[..r_size], rng);

                match greedy_prefix(&r[..r_size], r_size, bkmin, bkmax) {
                    Some(selected) => selected,
                    None => match knapsack_dp::<F, M>(&mut r[..r_size], r_size, bkmin, bkmax) {
                        Some(selected) => selected,
                        None => branch_and_bound.solve::<F, M>(
                            &mut r[..r_size],
                            r_size,
                            bkmin,
                            bkmax,
                        ),
                    },
                }
            }
        } else {
            calculator_sort::<F, M, R>(&mut r[..r_size], rng);

            if bkmin == bkmax {
                select_variables_equality(r_size, bkmin)
            } else {
                select_variables_inequality::<F, M, R>(&r[..r_size], r_size, bkmin, bkmax, rng)
            }
        };

        let changed = affect_variables(
            x,
            p,
            pi,
            cols,
            vals,
            &r[..r_size],
            r_size,
            k,
            selected,
            kappa,
            delta,
        );

        for &t in flipped {
            p[vals[t]] = -p[vals[t]];
            x.invert(cols[t]);
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::LinearCost;
    use crate::kernel::MinimizeTag;
    use crate::merge::make_merged_constraints;
    use crate::problem::{
        Constraint, ConstraintElement, Direction, ObjectiveElement, RawProblem, VarDomain, VarKind,
    };
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    fn z_problem() -> RawProblem {
        // minimize x0 + x1 + x2
        // s.t. 2 x0 + 3 x1 + 4 x2 >= 5
        //      x0 + x1 <= 1
        let mut pb = RawProblem {
            direction: Direction::Minimize,
            ..Default::default()
        };
        for j in 0..3 {
            pb.vars.names.push(format!("x{j}"));
            pb.vars.domains.push(VarDomain {
                min: 0,
                max: 1,
                kind: VarKind::Binary,
            });
            pb.objective.elements.push(ObjectiveElement {
                factor: 1.0,
                var: j,
            });
        }
        pb.greater_constraints.push(Constraint {
            label: "w".into(),
            id: 0,
            elements: vec![
                ConstraintElement { factor: 2, var: 0 },
                ConstraintElement { factor: 3, var: 1 },
                ConstraintElement { factor: 4, var: 2 },
            ],
            value: 5,
        });
        pb.less_constraints.push(Constraint {
            label: "c".into(),
            id: 1,
            elements: vec![
                ConstraintElement { factor: 1, var: 0 },
                ConstraintElement { factor: 1, var: 1 },
            ],
            value: 1,
        });
        pb
    }

    #[test]
    fn wide_rows_are_flagged_and_preenumerated() {
        let pb = z_problem();
        let csts = make_merged_constraints(&pb).unwrap();
        let slv: SolverZ<f64, MinimizeTag> = SolverZ::new(&csts, 3);

        assert!(slv.wide[0]);
        assert!(!slv.wide[1]);
        assert!(slv.exhaustive.handles(0));
        assert!(!slv.exhaustive.handles(1));
    }

    #[test]
    fn update_satisfies_the_wide_row() {
        let pb = z_problem();
        let csts = make_merged_constraints(&pb).unwrap();
        let mut rng = Xoshiro256StarStar::seed_from_u64(23);

        let cost: LinearCost<f64> = LinearCost::new(&pb.objective, 3, &mut rng);
        let mut slv: SolverZ<f64, MinimizeTag> = SolverZ::new(&csts, 3);
        let mut x = BitVec::zeros(3);

        slv.update_row(0, &mut x, &cost, &mut rng, 0.1, 0.01, 0.5, 0.0);
        assert!(slv.is_satisfied(0, &x));
    }

    #[test]
    fn negative_wide_factor_round_trips_through_the_flip() {
        // 3 x0 - 2 x1 = 1 has the single solution (1, 1).
        let mut pb = RawProblem {
            direction: Direction::Minimize,
            ..Default::default()
        };
        for j in 0..2 {
            pb.vars.names.push(format!("x{j}"));
            pb.vars.domains.push(VarDomain {
                min: 0,
                max: 1,
                kind: VarKind::Binary,
            });
            pb.objective.elements.push(ObjectiveElement {
                factor: 1.0,
                var: j,
            });
        }
        pb.equal_constraints.push(Constraint {
            label: "ct0".into(),
            id: 0,
            elements: vec![
                ConstraintElement { factor: 3, var: 0 },
                ConstraintElement { factor: -2, var: 1 },
            ],
            value: 1,
        });

        let csts = make_merged_constraints(&pb).unwrap();
        let mut rng = Xoshiro256StarStar::seed_from_u64(2);
        let cost: LinearCost<f64> = LinearCost::new(&pb.objective, 2, &mut rng);
        let mut slv: SolverZ<f64, MinimizeTag> = SolverZ::new(&csts, 2);
        let mut x = BitVec::zeros(2);

        slv.update_row(0, &mut x, &cost, &mut rng, 0.1, 0.01, 0.5, 0.0);

        assert!(x.get(0));
        assert!(x.get(1));
        assert!(slv.is_satisfied(0, &x));
    }

    #[test]
    fn greedy_prefix_hits_or_declines() {
        let r: Vec<RcData<f64>> = [(0.1, 2), (0.2, 3), (0.3, 4)]
            .iter()
            .enumerate()
            .map(|(id, &(value, factor))| RcData { value, id, factor })
            .collect();

        // 2 then 5: hits [5, 6] at prefix length 2.
        assert_eq!(greedy_prefix(&r, 3, 5, 6), Some(1));
        // Nothing sums to exactly 8 before overshooting.
        assert_eq!(greedy_prefix(&r, 3, 8, 8), None);
        // The empty-overshoot case: first element already too big.
        assert_eq!(greedy_prefix(&r, 3, 1, 1), None);
    }
}
