//! Kernel for rows whose factors are in {-1, 0, 1}.
//!
//! Rows carrying -1 factors go through the sign-flip trick: the reduced
//! costs and preferences of those positions are negated, the bounds are
//! shifted by the count of negated positions, and the flip is undone
//! after the affectation by restoring the preferences and inverting the
//! flipped assignment bits. The net effect is the all-non-negative
//! selection rule applied to an equivalent row.

use std::marker::PhantomData;

use rand::Rng;

use crate::bitvec::BitVec;
use crate::cost::{CostModel, SolverFloat};
use crate::merge::{reduced_costs_scratch_size, MergedConstraint};
use crate::sparse::SparseIncidence;

use super::{
    affect_variables, calculator_sort, select_variables_equality, select_variables_inequality,
    ModeTag, RcData, RowSolver,
};

/// Row solver over ±1 factors.
#[derive(Debug)]
pub struct Solver101<F, M> {
    ap: SparseIncidence,
    a: Vec<i32>,
    p: Vec<F>,
    pi: Vec<F>,
    r: Vec<RcData<F>>,
    b: Vec<(i32, i32)>,

    /// Per row, the positions holding a negative factor.
    negatives: Vec<Vec<usize>>,

    _mode: PhantomData<M>,
}

impl<F: SolverFloat, M: ModeTag> Solver101<F, M> {
    /// Size every buffer from the merged constraints.
    pub fn new(csts: &[MergedConstraint], n: usize) -> Self {
        let ap = SparseIncidence::new(csts, n);

        let mut a = Vec::with_capacity(ap.len());
        let mut b = Vec::with_capacity(csts.len());
        let mut negatives = Vec::with_capacity(csts.len());

        for cst in csts {
            let mut neg = Vec::new();
            for (t, e) in cst.elements.iter().enumerate() {
                debug_assert_eq!(e.factor.abs(), 1);
                a.push(e.factor);
                if e.factor < 0 {
                    neg.push(t);
                }
            }
            negatives.push(neg);
            b.push((cst.min, cst.max));
        }

        let scratch = reduced_costs_scratch_size(csts);

        Self {
            p: vec![F::zero(); ap.len()],
            pi: vec![F::zero(); csts.len()],
            r: vec![RcData::default(); scratch],
            a,
            b,
            negatives,
            ap,
            _mode: PhantomData,
        }
    }
}

impl<F: SolverFloat, M: ModeTag> RowSolver<F> for Solver101<F, M> {
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

        // Sign-flip trick: make every position a +1 position.
        let flipped = &negatives[k];
        for &t in flipped {
            r[t].value = -r[t].value;
            p[vals[t]] = -p[vals[t]];
        }
        let shift = flipped.len() as i32;

        calculator_sort::<F, M, R>(&mut r[..r_size], rng);

        let (bkmin, bkmax) = b[k];
        let selected = if bkmin == bkmax {
            select_variables_equality(r_size, bkmin + shift)
        } else {
            select_variables_inequality::<F, M, R>(
                &r[..r_size],
                r_size,
                bkmin + shift,
                bkmax + shift,
                rng,
            )
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

        // Undo the flip: restore the preferences and the polarity of the
        // negated positions.
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
    use crate::kernel::{MaximizeTag, MinimizeTag};
    use crate::merge::make_merged_constraints;
    use crate::problem::{
        Constraint, ConstraintElement, Direction, ObjectiveElement, RawProblem, VarDomain, VarKind,
    };
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    fn signed_problem() -> RawProblem {
        // maximize x0 - x1 + x2
        // s.t. x0 - x1 + x2 <= 1
        //      -x0 + x1 <= 0
        let mut pb = RawProblem {
            direction: Direction::Maximize,
            ..Default::default()
        };
        for j in 0..3 {
            pb.vars.names.push(format!("x{j}"));
            pb.vars.domains.push(VarDomain {
                min: 0,
                max: 1,
                kind: VarKind::Binary,
            });
        }
        pb.objective.elements = vec![
            ObjectiveElement { factor: 1.0, var: 0 },
            ObjectiveElement {
                factor: -1.0,
                var: 1,
            },
            ObjectiveElement { factor: 1.0, var: 2 },
        ];
        pb.less_constraints.push(Constraint {
            label: "a".into(),
            id: 0,
            elements: vec![
                ConstraintElement { factor: 1, var: 0 },
                ConstraintElement { factor: -1, var: 1 },
                ConstraintElement { factor: 1, var: 2 },
            ],
            value: 1,
        });
        pb.less_constraints.push(Constraint {
            label: "b".into(),
            id: 1,
            elements: vec![
                ConstraintElement { factor: -1, var: 0 },
                ConstraintElement { factor: 1, var: 1 },
            ],
            value: 0,
        });
        pb
    }

    #[test]
    fn construction_collects_negative_positions() {
        let pb = signed_problem();
        let csts = make_merged_constraints(&pb).unwrap();
        let slv: Solver101<f64, MaximizeTag> = Solver101::new(&csts, 3);

        assert_eq!(slv.negatives[0], vec![1]);
        assert_eq!(slv.negatives[1], vec![0]);
    }

    #[test]
    fn flip_restores_preferences_for_every_selection() {
        let pb = signed_problem();
        let csts = make_merged_constraints(&pb).unwrap();
        let mut rng = Xoshiro256StarStar::seed_from_u64(11);

        let cost: LinearCost<f64> = LinearCost::new(&pb.objective, 3, &mut rng);
        let mut slv: Solver101<f64, MaximizeTag> = Solver101::new(&csts, 3);
        let mut x = BitVec::zeros(3);

        // Whatever the selection, every row update must leave the updated
        // row satisfied, and preferences finite and consistent.
        for sweep in 0..20 {
            for k in 0..slv.rows() {
                slv.update_row(k, &mut x, &cost, &mut rng, 0.2, 0.05, 0.5, 0.0);
                assert!(
                    slv.is_satisfied(k, &x),
                    "row {k} violated after its own update (sweep {sweep})"
                );
            }
        }

        assert!(slv.preferences().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn equality_row_with_negative_factor_lands_on_target() {
        // x0 - x1 = 1 has the single solution (1, 0).
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
                ConstraintElement { factor: 1, var: 0 },
                ConstraintElement { factor: -1, var: 1 },
            ],
            value: 1,
        });

        let csts = make_merged_constraints(&pb).unwrap();
        let mut rng = Xoshiro256StarStar::seed_from_u64(5);
        let cost: LinearCost<f64> = LinearCost::new(&pb.objective, 2, &mut rng);
        let mut slv: Solver101<f64, MinimizeTag> = Solver101::new(&csts, 2);
        let mut x = BitVec::zeros(2);

        slv.update_row(0, &mut x, &cost, &mut rng, 0.1, 0.01, 0.5, 0.0);

        assert!(x.get(0));
        assert!(!x.get(1));
    }
}
