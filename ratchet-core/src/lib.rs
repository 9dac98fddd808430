//! Ratchet: a heuristic solver and optimizer for 0/1 linear programs.
//!
//! The solver reads CPLEX-style LP problems over binary (or bounded
//! integer, preprocessed to binary) variables and searches a feasible
//! assignment by iterating a per-row subproblem: reduced costs built
//! from Lagrangian-style row duals and per-nonzero preferences, a
//! randomized sort, and a cut-index selection writing the row back into
//! the assignment. An outer loop escalates the `kappa` pressure with the
//! remaining infeasibility; once feasible, push sweeps with an amplified
//! objective walk toward better solutions.
//!
//! Optimization mode restarts the loop across parallel workers seeded
//! from a shared pool of incumbents.
//!
//! # Example
//!
//! ```ignore
//! use ratchet_core::{read_problem, solve, SolverParams};
//!
//! let pb = read_problem("minimize\nx + y\nst\nx + y >= 1\nbinary\nx y\nend\n")?;
//! let result = solve(&pb, &SolverParams::default())?;
//!
//! println!("status: {}", result.status);
//! if let Some(best) = result.best() {
//!     println!("objective: {}", best.value);
//! }
//! ```

#![warn(clippy::all)]

pub mod bitvec;
pub mod cost;
pub mod error;
pub mod kernel;
pub mod lpformat;
pub mod merge;
pub mod observer;
pub mod optimize;
pub mod order;
pub mod params;
pub mod preprocess;
pub mod problem;
pub mod result;
pub mod run;
pub mod sparse;
pub mod subsolver;

use std::time::Instant;

use log::info;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

use crate::bitvec::BitVec;
use crate::cost::{cast, compute_delta, CostModel, LinearCost, QuadraticCost, SolverFloat};
use crate::error::{RatchetError, SolverError};
use crate::kernel::coeff01::Solver01;
use crate::kernel::coeff101::Solver101;
use crate::kernel::coeffz::SolverZ;
use crate::kernel::{MaximizeTag, MinimizeTag, ModeTag, RowSolver};
use crate::merge::MergedConstraint;
use crate::observer::make_observer;
use crate::optimize::optimize_all;
use crate::problem::{Direction, Objective, RawProblem, VarKind};
use crate::run::{init_assignment, solve_round, BestRecord, LoopOutcome, RoundScratch};

pub use crate::error::Result;
pub use crate::lpformat::{read_problem, write_problem};
pub use crate::params::{
    ConstraintOrder, FloatType, InitPolicy, ObserverType, PreprocessorLevel, SolverMode,
    SolverParams,
};
pub use crate::result::{
    compute_solution, is_valid_solution, write_best_solution, ResultStatus, RunResult, Solution,
};

/// Observer output basename for plain solves.
const OBSERVER_BASENAME: &str = "ratchet";

/// Search one feasible assignment of `pb`.
pub fn solve(pb: &RawProblem, params: &SolverParams) -> Result<RunResult> {
    entry(pb, params, false)
}

/// Search a feasible assignment of `pb` and improve its objective with
/// parallel restarts until the limits run out.
pub fn optimize(pb: &RawProblem, params: &SolverParams) -> Result<RunResult> {
    entry(pb, params, true)
}

fn entry(pb: &RawProblem, params: &SolverParams, is_optimize: bool) -> Result<RunResult> {
    pb.validate().map_err(RatchetError::Problem)?;

    if !params.mode.contains(SolverMode::DEFAULT) {
        return Err(RatchetError::Solver(SolverError::NoSolverAvailable(
            "only the default mode is backed by a solver".to_string(),
        )));
    }

    let pre = preprocess::preprocess(pb, params.preprocessor).map_err(RatchetError::Solver)?;

    for (name, domain) in pre.vars.names.iter().zip(&pre.vars.domains) {
        let binary = domain.kind == VarKind::Binary || (domain.min == 0 && domain.max == 1);
        if !binary {
            return Err(RatchetError::Solver(SolverError::NoSolverAvailable(
                format!("variable `{name}` is not binary after preprocessing"),
            )));
        }
    }

    let csts = merge::make_merged_constraints(&pre)?;

    // Classify on the merged rows: merging may widen a factor (summed
    // duplicates) past what the raw lists showed.
    let mut class = problem::CoeffClass::Binary;
    for cst in &csts {
        for e in &cst.elements {
            class.update(e.factor);
        }
    }

    info!(
        "problem: {} variables, {} merged rows, {}",
        pre.num_vars(),
        csts.len(),
        pre.family()
    );

    if pre.vars.is_empty() || csts.is_empty() {
        return Ok(trivial_result(&pre));
    }

    let result = match params.float_type {
        FloatType::Float32 => with_float::<f32>(&pre, csts, class, params, is_optimize),
        FloatType::Float64 | FloatType::Extended => {
            with_float::<f64>(&pre, csts, class, params, is_optimize)
        }
    };

    Ok(result)
}

/// Every row was fused away or no variable is left: any assignment
/// works, so report the objective-sign one.
fn trivial_result(pre: &RawProblem) -> RunResult {
    let n = pre.num_vars();
    let mut variables = vec![false; n];
    let mut value = pre.objective.constant;

    let mut linear = vec![0.0f64; n];
    for e in &pre.objective.elements {
        linear[e.var] += e.factor;
    }

    for j in 0..n {
        let on = match pre.direction {
            Direction::Minimize => linear[j] <= 0.0,
            Direction::Maximize => linear[j] >= 0.0,
        };
        variables[j] = on;
        if on {
            value += linear[j];
        }
    }

    for q in &pre.objective.qelements {
        if variables[q.var_a] && variables[q.var_b] {
            value += q.factor;
        }
    }

    RunResult {
        status: ResultStatus::Success,
        variable_names: pre.vars.names.clone(),
        affected_vars: pre.affected_vars.clone(),
        solutions: vec![Solution { variables, value }],
        remaining_constraints: 0,
        loops: 0,
        duration: 0.0,
        variables: n,
        constraints: 0,
    }
}

fn with_float<F: SolverFloat>(
    pre: &RawProblem,
    csts: Vec<MergedConstraint>,
    class: problem::CoeffClass,
    params: &SolverParams,
    is_optimize: bool,
) -> RunResult {
    match pre.direction {
        Direction::Minimize => with_mode::<F, MinimizeTag>(pre, csts, class, params, is_optimize),
        Direction::Maximize => with_mode::<F, MaximizeTag>(pre, csts, class, params, is_optimize),
    }
}

fn with_mode<F: SolverFloat, M: ModeTag>(
    pre: &RawProblem,
    csts: Vec<MergedConstraint>,
    class: problem::CoeffClass,
    params: &SolverParams,
    is_optimize: bool,
) -> RunResult {
    let quadratic = !pre.objective.qelements.is_empty();

    match (class, quadratic) {
        (problem::CoeffClass::Binary, false) => {
            execute::<F, M, Solver01<F, M>, LinearCost<F>, _, _>(
                pre,
                csts,
                params,
                is_optimize,
                Solver01::new,
                LinearCost::new,
            )
        }
        (problem::CoeffClass::Binary, true) => {
            execute::<F, M, Solver01<F, M>, QuadraticCost<F>, _, _>(
                pre,
                csts,
                params,
                is_optimize,
                Solver01::new,
                QuadraticCost::new,
            )
        }
        (problem::CoeffClass::Ternary, false) => {
            execute::<F, M, Solver101<F, M>, LinearCost<F>, _, _>(
                pre,
                csts,
                params,
                is_optimize,
                Solver101::new,
                LinearCost::new,
            )
        }
        (problem::CoeffClass::Ternary, true) => {
            execute::<F, M, Solver101<F, M>, QuadraticCost<F>, _, _>(
                pre,
                csts,
                params,
                is_optimize,
                Solver101::new,
                QuadraticCost::new,
            )
        }
        (problem::CoeffClass::Integer, false) => {
            execute::<F, M, SolverZ<F, M>, LinearCost<F>, _, _>(
                pre,
                csts,
                params,
                is_optimize,
                SolverZ::new,
                LinearCost::new,
            )
        }
        (problem::CoeffClass::Integer, true) => {
            execute::<F, M, SolverZ<F, M>, QuadraticCost<F>, _, _>(
                pre,
                csts,
                params,
                is_optimize,
                SolverZ::new,
                QuadraticCost::new,
            )
        }
    }
}

fn execute<F, M, S, C, FS, FC>(
    pre: &RawProblem,
    csts: Vec<MergedConstraint>,
    params: &SolverParams,
    is_optimize: bool,
    make_solver: FS,
    make_cost: FC,
) -> RunResult
where
    F: SolverFloat,
    M: ModeTag,
    S: RowSolver<F>,
    C: CostModel<F>,
    FS: Fn(&[MergedConstraint], usize) -> S + Sync,
    FC: Fn(&Objective, usize, &mut Xoshiro256StarStar) -> C + Sync,
{
    let n = pre.num_vars();
    let constant = pre.objective.constant;
    let base_seed = params.seed.unwrap_or_else(rand::random);

    let (best, outcome) = if is_optimize {
        let best = optimize_all::<F, M, S, C, FS, FC>(
            &csts,
            n,
            &pre.objective,
            constant,
            params,
            base_seed,
            make_solver,
            make_cost,
        );

        let outcome = if best.remaining == 0 {
            LoopOutcome::Feasible
        } else if params.time_limit > 0.0 {
            LoopOutcome::TimeLimitReached
        } else {
            LoopOutcome::LimitReached
        };

        (best, outcome)
    } else {
        solve_one::<F, M, S, C>(
            &csts,
            n,
            &pre.objective,
            constant,
            params,
            base_seed,
            &make_solver,
            &make_cost,
        )
    };

    let mut status = match outcome {
        LoopOutcome::Feasible | LoopOutcome::LimitReached => ResultStatus::LimitReached,
        LoopOutcome::KappaMaxReached => ResultStatus::KappaMaxReached,
        LoopOutcome::TimeLimitReached | LoopOutcome::Stopped => ResultStatus::TimeLimitReached,
    };
    if best.remaining == 0 && best.x.is_some() {
        status = ResultStatus::Success;
    }

    let solutions = match &best.x {
        Some(x) => vec![Solution {
            variables: x.to_vec(),
            value: best.value,
        }],
        None => Vec::new(),
    };

    RunResult {
        status,
        variable_names: pre.vars.names.clone(),
        affected_vars: pre.affected_vars.clone(),
        solutions,
        remaining_constraints: if best.remaining == usize::MAX {
            csts.len()
        } else {
            best.remaining
        },
        loops: best.loops,
        duration: best.duration,
        variables: n,
        constraints: csts.len(),
    }
}

/// The plain solve path: one worker, one round.
#[allow(clippy::too_many_arguments)]
fn solve_one<F, M, S, C>(
    csts: &[MergedConstraint],
    n: usize,
    objective: &Objective,
    constant: f64,
    params: &SolverParams,
    base_seed: u64,
    make_solver: &dyn Fn(&[MergedConstraint], usize) -> S,
    make_cost: &dyn Fn(&Objective, usize, &mut Xoshiro256StarStar) -> C,
) -> (BestRecord, LoopOutcome)
where
    F: SolverFloat,
    M: ModeTag,
    S: RowSolver<F>,
    C: CostModel<F>,
{
    let start = Instant::now();
    let mut rng = Xoshiro256StarStar::seed_from_u64(base_seed);

    let cost = make_cost(objective, n, &mut rng);
    let delta: F = if params.delta < 0.0 {
        compute_delta(params.theta, &cost)
    } else {
        cast(params.delta)
    };

    let mut slv = make_solver(csts, n);
    let mut x = BitVec::zeros(n);
    let mut scratch = RoundScratch::new(params, slv.rows());

    let worst = if M::MAXIMIZE {
        f64::NEG_INFINITY
    } else {
        f64::INFINITY
    };
    let mut best = BestRecord::new(worst);

    init_assignment::<F, M, S, C, _>(
        params.init_policy,
        &mut x,
        &mut slv,
        &cost,
        params.init_random,
        0,
        &[],
        &mut rng,
    );

    let mut observer = make_observer(params.observer, OBSERVER_BASENAME, slv.rows(), 0);
    let observing = params.observer != ObserverType::None;

    let outcome = solve_round::<F, M, S, C, _>(
        &mut slv,
        &mut x,
        &cost,
        constant,
        params,
        delta,
        &mut scratch,
        &mut rng,
        &mut best,
        observing.then(|| observer.as_mut() as &mut dyn observer::Observer),
        None,
        start,
    );
    observer.finish();

    // A zero iteration budget still reports the seeded assignment.
    if best.x.is_none() {
        let mut violated = Vec::new();
        let remaining = slv.compute_violated_constraints(&x, &mut violated);
        best = BestRecord::new(worst);
        best.x = Some(x.clone());
        best.remaining = remaining;
        if remaining == 0 {
            best.value = cost.results(&x, constant);
        }
    }

    (best, outcome)
}
