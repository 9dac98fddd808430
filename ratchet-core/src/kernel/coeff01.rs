//! Kernel for rows whose factors are all in {0, 1}.
//!
//! After element deduplication every stored factor is one, so the column
//! sweeps accumulate the duals and preferences without the factor
//! multiply.

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

/// Row solver over 0/1 factors.
#[derive(Debug)]
pub struct Solver01<F, M> {
    ap: SparseIncidence,
    a: Vec<i32>,
    p: Vec<F>,
    pi: Vec<F>,
    r: Vec<RcData<F>>,
    b: Vec<(i32, i32)>,
    _mode: PhantomData<M>,
}

impl<F: SolverFloat, M: ModeTag> Solver01<F, M> {
    /// Size every buffer from the merged constraints.
    pub fn new(csts: &[MergedConstraint], n: usize) -> Self {
        let ap = SparseIncidence::new(csts, n);

        let mut a = Vec::with_capacity(ap.len());
        let mut b = Vec::with_capacity(csts.len());

        for cst in csts {
            for e in &cst.elements {
                debug_assert_eq!(e.factor, 1);
                a.push(e.factor);
            }
            b.push((cst.min, cst.max));
        }

        let scratch = reduced_costs_scratch_size(csts);

        Self {
            p: vec![F::zero(); ap.len()],
            pi: vec![F::zero(); csts.len()],
            r: vec![RcData::default(); scratch],
            a,
            b,
            ap,
            _mode: PhantomData,
        }
    }
}

impl<F: SolverFloat, M: ModeTag> RowSolver<F> for Solver01<F, M> {
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
            ap, p, pi, r, b, ..
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
                sum_a_pi = sum_a_pi + pi[row];
                sum_a_p = sum_a_p + p[val];
            }

            r[t] = RcData {
                value: cost.cost(cols[t], x) - sum_a_pi - sum_a_p,
                id: t,
                factor: 1,
            };
        }

        if obj_amp != F::zero() {
            for t in 0..r_size {
                r[t].value = r[t].value + obj_amp * cost.cost(cols[r[t].id], x);
            }
        }

        calculator_sort::<F, M, R>(&mut r[..r_size], rng);

        let (bkmin, bkmax) = b[k];
        let selected = if bkmin == bkmax {
            select_variables_equality(r_size, bkmin)
        } else {
            select_variables_inequality::<F, M, R>(&r[..r_size], r_size, bkmin, bkmax, rng)
        };

        affect_variables(x, p, pi, cols, vals, &r[..r_size], r_size, k, selected, kappa, delta)
    }
}
