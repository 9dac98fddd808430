//! The outer solve loop: kappa escalation, best-so-far tracking and the
//! post-feasibility push phase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::debug;
use rand::Rng;

use crate::bitvec::BitVec;
use crate::cost::{cast, CostModel, SolverFloat};
use crate::kernel::{ModeTag, RowSolver};
use crate::observer::Observer;
use crate::order::ComputeOrder;
use crate::params::{InitPolicy, SolverParams};

/// Rows updated between two cancellation polls inside a sweep.
const STOP_POLL_STRIDE: usize = 1024;

/// Best assignment seen by one worker.
#[derive(Debug, Clone)]
pub struct BestRecord {
    /// Snapshot of the best assignment, if any was stored
    pub x: Option<BitVec>,

    /// Violated rows of the snapshot; zero means feasible
    pub remaining: usize,

    /// Objective of the snapshot when feasible
    pub value: f64,

    /// Outer iteration that produced the snapshot; negative values
    /// count push-phase sweeps
    pub loops: i64,

    /// Seconds from the solve start to the snapshot
    pub duration: f64,
}

impl BestRecord {
    /// An empty record; `worst` is the objective no candidate can lose
    /// to under the optimization direction.
    pub fn new(worst: f64) -> Self {
        Self {
            x: None,
            remaining: usize::MAX,
            value: worst,
            loops: 0,
            duration: 0.0,
        }
    }

    fn store_remaining(&mut self, x: &BitVec, remaining: usize, loops: i64, start: Instant) {
        if remaining < self.remaining {
            self.x = Some(x.clone());
            self.remaining = remaining;
            self.loops = loops;
            self.duration = start.elapsed().as_secs_f64();
        }
    }

    fn store_value<M: ModeTag>(&mut self, x: &BitVec, value: f64, loops: i64, start: Instant) {
        if self.remaining > 0 || M::is_better_solution(value, self.value) {
            self.x = Some(x.clone());
            self.remaining = 0;
            self.value = value;
            self.loops = loops;
            self.duration = start.elapsed().as_secs_f64();
        }
    }
}

/// Why a solve round returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// A feasible assignment was reached (push phase included)
    Feasible,

    /// The iteration limit ran out
    LimitReached,

    /// Kappa crossed its ceiling
    KappaMaxReached,

    /// The wall clock ran out
    TimeLimitReached,

    /// The shared stop flag was raised
    Stopped,
}

/// Reusable per-worker buffers of the solve loop.
#[derive(Debug)]
pub struct RoundScratch {
    order: ComputeOrder,
    sweep: Vec<usize>,
    violated: Vec<usize>,
    rows_since_poll: usize,
}

impl RoundScratch {
    /// Buffers for `m` rows under the configured ordering policy.
    pub fn new(params: &SolverParams, m: usize) -> Self {
        Self {
            order: ComputeOrder::new(params.order, m),
            sweep: Vec::with_capacity(m),
            violated: Vec::with_capacity(m),
            rows_since_poll: 0,
        }
    }

    /// Reset the sweep state between rounds.
    pub fn reset(&mut self) {
        self.order.reset();
        self.rows_since_poll = 0;
    }
}

fn time_limit_reached(params: &SolverParams, start: Instant) -> bool {
    params.time_limit > 0.0 && start.elapsed().as_secs_f64() > params.time_limit
}

/// One ordered pass over the rows: the violated ones in an ordinary
/// sweep, every row in a push (`full`) sweep. Returns the violation
/// count after the pass, or `None` when the stop flag interrupted it.
#[allow(clippy::too_many_arguments)]
fn sweep<F, M, S, C, R>(
    slv: &mut S,
    x: &mut BitVec,
    cost: &C,
    scratch: &mut RoundScratch,
    rng: &mut R,
    kappa: F,
    delta: F,
    theta: F,
    obj_amp: F,
    full: bool,
    stop: Option<&AtomicBool>,
) -> Option<usize>
where
    F: SolverFloat,
    M: ModeTag,
    S: RowSolver<F>,
    C: CostModel<F>,
    R: Rng,
{
    scratch.sweep.clear();
    if full {
        scratch
            .sweep
            .extend_from_slice(scratch.order.arrange_all(slv, x, rng));
    } else {
        scratch
            .sweep
            .extend_from_slice(scratch.order.arrange(slv, x, rng));
    }

    for at in 0..scratch.sweep.len() {
        let k = scratch.sweep[at];
        let changed = slv.update_row(k, x, cost, rng, kappa, delta, theta, obj_amp);
        scratch.order.record_pi_change(k, changed);

        scratch.rows_since_poll += 1;
        if scratch.rows_since_poll >= STOP_POLL_STRIDE {
            scratch.rows_since_poll = 0;
            if let Some(stop) = stop {
                if stop.load(Ordering::Relaxed) {
                    return None;
                }
            }
        }
    }

    Some(slv.compute_violated_constraints(x, &mut scratch.violated))
}

fn observe<F: SolverFloat, S: RowSolver<F>>(observer: &mut Option<&mut dyn Observer>, slv: &S) {
    if let Some(observer) = observer.as_mut() {
        let pi: Vec<f64> = slv.pi().iter().map(|v| v.to_f64().unwrap_or(0.0)).collect();
        let p: Vec<f64> = slv
            .preferences()
            .iter()
            .map(|v| v.to_f64().unwrap_or(0.0))
            .collect();
        observer.observe(&pi, &p, slv.incidence());
    }
}

/// Run one full solve round on `slv`: the kappa-escalation loop and,
/// once a feasible assignment shows up, the push phase.
///
/// `delta` must already be resolved (auto-computed upstream when the
/// parameter is negative). `start` is the clock the time limit is
/// measured against, shared by every worker of an optimization.
#[allow(clippy::too_many_arguments)]
pub fn solve_round<F, M, S, C, R>(
    slv: &mut S,
    x: &mut BitVec,
    cost: &C,
    cost_constant: f64,
    params: &SolverParams,
    delta: F,
    scratch: &mut RoundScratch,
    rng: &mut R,
    best: &mut BestRecord,
    mut observer: Option<&mut dyn Observer>,
    stop: Option<&AtomicBool>,
    start: Instant,
) -> LoopOutcome
where
    F: SolverFloat,
    M: ModeTag,
    S: RowSolver<F>,
    C: CostModel<F>,
    R: Rng,
{
    let m = slv.rows();
    if m == 0 {
        best.store_value::<M>(x, cost.results(x, cost_constant), 0, start);
        return LoopOutcome::Feasible;
    }

    let kappa_step = cast::<F>(params.kappa_step);
    let kappa_max = cast::<F>(params.kappa_max);
    let alpha = cast::<F>(params.alpha);
    let theta = cast::<F>(params.theta);
    let zero = F::zero();

    // A zero limit runs no sweep at all and reports the seeding as-is;
    // a negative limit removes the bound.
    let limit = if params.limit < 0 {
        i64::MAX
    } else {
        params.limit
    };
    let pushes_limit = if params.pushing_iteration_limit <= 0 {
        0
    } else {
        params.pushes_limit.max(0)
    };

    let mut kappa = cast::<F>(params.kappa_min);
    let mut feasible = false;

    let mut i: i64 = 0;
    while i != limit {
        if let Some(stop) = stop {
            if stop.load(Ordering::Relaxed) {
                return LoopOutcome::Stopped;
            }
        }

        let remaining = match sweep::<F, M, S, C, R>(
            slv, x, cost, scratch, rng, kappa, delta, theta, zero, false, stop,
        ) {
            Some(remaining) => remaining,
            None => return LoopOutcome::Stopped,
        };

        observe(&mut observer, slv);

        if params.debug {
            debug!("loop {i}: {remaining} violated, kappa {kappa}");
        }

        if remaining == 0 {
            best.store_value::<M>(x, cost.results(x, cost_constant), i, start);
            feasible = true;
            break;
        }

        best.store_remaining(x, remaining, i, start);

        if i > params.w {
            let ratio = cast::<F>(remaining as f64 / m as f64);
            kappa = kappa + kappa_step * ratio.powf(alpha);
        }

        if kappa > kappa_max {
            return LoopOutcome::KappaMaxReached;
        }

        if time_limit_reached(params, start) {
            return LoopOutcome::TimeLimitReached;
        }

        i += 1;
    }

    if !feasible {
        return LoopOutcome::LimitReached;
    }

    // Push phase: amplified sweeps biased toward better objectives.
    let push_kappa_factor = cast::<F>(params.pushing_k_factor);
    let obj_amp = cast::<F>(params.pushing_objective_amplifier);

    'pushes: for push in 0..pushes_limit {
        let remaining = match sweep::<F, M, S, C, R>(
            slv,
            x,
            cost,
            scratch,
            rng,
            push_kappa_factor * kappa,
            delta,
            theta,
            obj_amp,
            true,
            stop,
        ) {
            Some(remaining) => remaining,
            None => break 'pushes,
        };

        if remaining == 0 {
            let loops = -push * params.pushing_iteration_limit - 1;
            best.store_value::<M>(x, cost.results(x, cost_constant), loops, start);
        }

        if time_limit_reached(params, start) {
            break 'pushes;
        }

        for iter in 0..params.pushing_iteration_limit {
            let remaining = match sweep::<F, M, S, C, R>(
                slv, x, cost, scratch, rng, kappa, delta, theta, zero, false, stop,
            ) {
                Some(remaining) => remaining,
                None => break 'pushes,
            };

            if remaining == 0 {
                let loops = -push * params.pushing_iteration_limit - iter - 1;
                best.store_value::<M>(x, cost.results(x, cost_constant), loops, start);
                break;
            }

            if iter > params.w {
                let ratio = cast::<F>(remaining as f64 / m as f64);
                kappa = kappa + kappa_step * ratio.powf(alpha);
            }

            if kappa > kappa_max || time_limit_reached(params, start) {
                break 'pushes;
            }
        }
    }

    LoopOutcome::Feasible
}

/// Seed `x` before a solve round.
///
/// `pool` holds incumbent snapshots for the cycling policies; when it is
/// empty those fall back to the objective-sign initialization. `round`
/// indexes the round-robin pick.
#[allow(clippy::too_many_arguments)]
pub fn init_assignment<F, M, S, C, R>(
    policy: InitPolicy,
    x: &mut BitVec,
    slv: &mut S,
    cost: &C,
    init_random: f64,
    round: usize,
    pool: &[BitVec],
    rng: &mut R,
) where
    F: SolverFloat,
    M: ModeTag,
    S: RowSolver<F>,
    C: CostModel<F>,
    R: Rng,
{
    match policy {
        InitPolicy::Bastert => init_bastert::<F, M, C>(x, cost),
        InitPolicy::Cycle => {
            if pool.is_empty() {
                init_bastert::<F, M, C>(x, cost);
            } else {
                *x = pool[round % pool.len()].clone();
            }
        }
        InitPolicy::CrossoverCycle => {
            if pool.is_empty() {
                init_bastert::<F, M, C>(x, cost);
            } else {
                let a = &pool[rng.gen_range(0..pool.len())];
                let b = &pool[rng.gen_range(0..pool.len())];
                for j in 0..x.len() {
                    let pick = if rng.gen_bool(0.5) { a } else { b };
                    x.assign(j, pick.get(j));
                }
            }
        }
        InitPolicy::PessimisticSolve => {
            x.clear();
            presolve_sweep::<F, M, S, C, R>(x, slv, cost, rng);
        }
        InitPolicy::OptimisticSolve => {
            for j in 0..x.len() {
                x.set(j);
            }
            presolve_sweep::<F, M, S, C, R>(x, slv, cost, rng);
        }
    }

    if init_random > 0.0 {
        for j in 0..x.len() {
            if rng.gen_bool(init_random) {
                x.invert(j);
            }
        }
    }
}

/// Objective-sign initialization: turn a variable on when its cost
/// helps the optimization direction.
fn init_bastert<F: SolverFloat, M: ModeTag, C: CostModel<F>>(x: &mut BitVec, cost: &C) {
    for j in 0..x.len() {
        let c = cost.linear_cost(j);
        let favorable = if M::MAXIMIZE { c >= 0.0 } else { c <= 0.0 };
        x.assign(j, favorable);
    }
}

/// One neutral pass over every row against the given reference
/// assignment, leaving the multipliers untouched afterwards.
fn presolve_sweep<F, M, S, C, R>(x: &mut BitVec, slv: &mut S, cost: &C, rng: &mut R)
where
    F: SolverFloat,
    M: ModeTag,
    S: RowSolver<F>,
    C: CostModel<F>,
    R: Rng,
{
    for k in 0..slv.rows() {
        slv.update_row(k, x, cost, rng, F::zero(), F::zero(), F::one(), F::zero());
    }
    slv.reset();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::LinearCost;
    use crate::kernel::coeff01::Solver01;
    use crate::kernel::MinimizeTag;
    use crate::merge::make_merged_constraints;
    use crate::problem::{
        Constraint, ConstraintElement, Direction, ObjectiveElement, RawProblem, VarDomain, VarKind,
    };
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    fn cover_problem() -> RawProblem {
        let mut pb = RawProblem {
            direction: Direction::Minimize,
            ..Default::default()
        };
        for j in 0..4 {
            pb.vars.names.push(format!("x{j}"));
            pb.vars.domains.push(VarDomain {
                min: 0,
                max: 1,
                kind: VarKind::Binary,
            });
            pb.objective.elements.push(ObjectiveElement {
                factor: (j + 1) as f64,
                var: j,
            });
        }
        // x0 + x1 = 1 and x2 + x3 >= 1.
        pb.equal_constraints.push(Constraint {
            label: "ct0".into(),
            id: 0,
            elements: vec![
                ConstraintElement { factor: 1, var: 0 },
                ConstraintElement { factor: 1, var: 1 },
            ],
            value: 1,
        });
        pb.greater_constraints.push(Constraint {
            label: "ct1".into(),
            id: 1,
            elements: vec![
                ConstraintElement { factor: 1, var: 2 },
                ConstraintElement { factor: 1, var: 3 },
            ],
            value: 1,
        });
        pb
    }

    #[test]
    fn finds_a_feasible_cover() {
        let pb = cover_problem();
        let csts = make_merged_constraints(&pb).unwrap();
        let mut rng = Xoshiro256StarStar::seed_from_u64(42);

        let cost: LinearCost<f64> = LinearCost::new(&pb.objective, 4, &mut rng);
        let mut slv: Solver01<f64, MinimizeTag> = Solver01::new(&csts, 4);
        let mut x = BitVec::zeros(4);
        let params = SolverParams {
            limit: 100,
            ..Default::default()
        };
        let mut scratch = RoundScratch::new(&params, slv.rows());
        let mut best = BestRecord::new(f64::INFINITY);

        let outcome = solve_round::<f64, MinimizeTag, _, _, _>(
            &mut slv,
            &mut x,
            &cost,
            0.0,
            &params,
            0.01,
            &mut scratch,
            &mut rng,
            &mut best,
            None,
            None,
            Instant::now(),
        );

        assert_eq!(outcome, LoopOutcome::Feasible);
        assert_eq!(best.remaining, 0);
        let snapshot = best.x.unwrap();
        assert!(slv.is_valid_solution(&snapshot));
    }

    #[test]
    fn one_sweep_suffices_on_independent_rows() {
        let pb = cover_problem();
        let csts = make_merged_constraints(&pb).unwrap();
        let mut rng = Xoshiro256StarStar::seed_from_u64(42);

        let cost: LinearCost<f64> = LinearCost::new(&pb.objective, 4, &mut rng);
        let mut slv: Solver01<f64, MinimizeTag> = Solver01::new(&csts, 4);
        let mut x = BitVec::zeros(4);
        let params = SolverParams {
            limit: 1,
            kappa_max: 1e9,
            ..Default::default()
        };
        let mut scratch = RoundScratch::new(&params, slv.rows());
        let mut best = BestRecord::new(f64::INFINITY);

        let outcome = solve_round::<f64, MinimizeTag, _, _, _>(
            &mut slv,
            &mut x,
            &cost,
            0.0,
            &params,
            0.01,
            &mut scratch,
            &mut rng,
            &mut best,
            None,
            None,
            Instant::now(),
        );

        // One sweep over two independent rows already lands feasible.
        assert_eq!(outcome, LoopOutcome::Feasible);
    }

    #[test]
    fn kappa_ceiling_terminates_infeasible_runs() {
        // x0 + x1 = 1 fused with x0 + x1 = 2 is caught upstream, so make
        // kappa the binding limit on a satisfiable but slow problem.
        let pb = cover_problem();
        let csts = make_merged_constraints(&pb).unwrap();
        let mut rng = Xoshiro256StarStar::seed_from_u64(42);

        let cost: LinearCost<f64> = LinearCost::new(&pb.objective, 4, &mut rng);
        let mut slv: Solver01<f64, MinimizeTag> = Solver01::new(&csts, 4);
        let mut x = BitVec::zeros(4);
        let params = SolverParams {
            limit: 1000,
            w: 0,
            kappa_min: 0.0,
            kappa_step: 1e30,
            kappa_max: 0.5,
            ..Default::default()
        };
        let mut scratch = RoundScratch::new(&params, slv.rows());
        let mut best = BestRecord::new(f64::INFINITY);

        let outcome = solve_round::<f64, MinimizeTag, _, _, _>(
            &mut slv,
            &mut x,
            &cost,
            0.0,
            &params,
            0.01,
            &mut scratch,
            &mut rng,
            &mut best,
            None,
            None,
            Instant::now(),
        );

        // Either the solver lands feasible on the first sweeps or the
        // kappa ceiling fires; both terminate.
        assert!(matches!(
            outcome,
            LoopOutcome::Feasible | LoopOutcome::KappaMaxReached
        ));
    }

    #[test]
    fn bastert_follows_the_cost_signs() {
        let mut pb = cover_problem();
        pb.objective.elements[1].factor = -2.0;
        let mut rng = Xoshiro256StarStar::seed_from_u64(1);
        let cost: LinearCost<f64> = LinearCost::new(&pb.objective, 4, &mut rng);

        let mut x = BitVec::zeros(4);
        init_bastert::<f64, MinimizeTag, _>(&mut x, &cost);

        assert!(!x.get(0));
        assert!(x.get(1));
        assert!(!x.get(2));
        assert!(!x.get(3));
    }

    #[test]
    fn stop_flag_interrupts_the_loop() {
        let pb = cover_problem();
        let csts = make_merged_constraints(&pb).unwrap();
        let mut rng = Xoshiro256StarStar::seed_from_u64(42);

        let cost: LinearCost<f64> = LinearCost::new(&pb.objective, 4, &mut rng);
        let mut slv: Solver01<f64, MinimizeTag> = Solver01::new(&csts, 4);
        let mut x = BitVec::zeros(4);
        let params = SolverParams::default();
        let mut scratch = RoundScratch::new(&params, slv.rows());
        let mut best = BestRecord::new(f64::INFINITY);

        let stop = AtomicBool::new(true);
        let outcome = solve_round::<f64, MinimizeTag, _, _, _>(
            &mut slv,
            &mut x,
            &cost,
            0.0,
            &params,
            0.01,
            &mut scratch,
            &mut rng,
            &mut best,
            None,
            Some(&stop),
            Instant::now(),
        );

        assert_eq!(outcome, LoopOutcome::Stopped);
    }
}
