//! Restart/crossover optimization driver.
//!
//! Runs a fixed pool of workers, each iterating full solve rounds on its
//! own mutable state. Feasible incumbents flow through a mutex-protected
//! bounded pool that the seeding policies read back; the merged
//! constraints and coefficients are shared read-only.

use std::sync::atomic::AtomicBool;
use std::sync::Mutex;
use std::time::Instant;

use log::{debug, info};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

use crate::bitvec::BitVec;
use crate::cost::{cast, compute_delta, CostModel, SolverFloat};
use crate::kernel::{ModeTag, RowSolver};
use crate::merge::MergedConstraint;
use crate::observer::make_observer;
use crate::params::SolverParams;
use crate::problem::Objective;
use crate::run::{init_assignment, solve_round, BestRecord, LoopOutcome, RoundScratch};

/// Observer output basename for optimization runs.
const OBSERVER_BASENAME: &str = "ratchet";

/// Bounded best-k pool of feasible assignments.
#[derive(Debug)]
pub struct IncumbentPool {
    entries: Vec<(f64, BitVec)>,
    capacity: usize,
}

impl IncumbentPool {
    /// Pool keeping the best `capacity` distinct incumbents.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Insert a feasible assignment; keeps the entries sorted best
    /// first under `M`. Returns whether the pool changed.
    pub fn push<M: ModeTag>(&mut self, value: f64, x: &BitVec) -> bool {
        if self.entries.iter().any(|(v, _)| *v == value) {
            return false;
        }

        let at = self
            .entries
            .partition_point(|(v, _)| M::is_better_solution(*v, value));

        if at >= self.capacity {
            return false;
        }

        self.entries.insert(at, (value, x.clone()));
        self.entries.truncate(self.capacity);
        true
    }

    /// Copy the pooled assignments out, best first.
    pub fn snapshot(&self) -> Vec<BitVec> {
        self.entries.iter().map(|(_, x)| x.clone()).collect()
    }

    /// Number of pooled incumbents.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no incumbent was stored yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run the parallel optimization and return the best record over all
/// workers.
///
/// `make_solver` builds one kernel per worker over the shared merged
/// constraints; `make_cost` builds the per-worker cost model (its
/// normalization draws from the worker RNG).
pub fn optimize_all<F, M, S, C, FS, FC>(
    csts: &[MergedConstraint],
    n: usize,
    objective: &Objective,
    cost_constant: f64,
    params: &SolverParams,
    base_seed: u64,
    make_solver: FS,
    make_cost: FC,
) -> BestRecord
where
    F: SolverFloat,
    M: ModeTag,
    S: RowSolver<F>,
    C: CostModel<F>,
    FS: Fn(&[MergedConstraint], usize) -> S + Sync,
    FC: Fn(&Objective, usize, &mut Xoshiro256StarStar) -> C + Sync,
{
    let workers = params.thread.max(1);
    let pool = Mutex::new(IncumbentPool::new(workers.max(4)));
    let stop = AtomicBool::new(false);
    let start = Instant::now();

    info!(
        "optimizer: {} workers, seed {}, order {:?}, init {:?}",
        workers, base_seed, params.order, params.init_policy
    );

    let worst = if M::MAXIMIZE {
        f64::NEG_INFINITY
    } else {
        f64::INFINITY
    };

    let records: Vec<BestRecord> = std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);

        for worker in 0..workers {
            let pool = &pool;
            let stop = &stop;
            let make_solver = &make_solver;
            let make_cost = &make_cost;

            handles.push(scope.spawn(move || {
                let mut rng =
                    Xoshiro256StarStar::seed_from_u64(base_seed.wrapping_add(worker as u64));

                let cost = make_cost(objective, n, &mut rng);
                let delta: F = if params.delta < 0.0 {
                    compute_delta(params.theta, &cost)
                } else {
                    cast(params.delta)
                };

                let mut slv = make_solver(csts, n);
                let mut x = BitVec::zeros(n);
                let mut scratch = RoundScratch::new(params, slv.rows());
                let mut best = BestRecord::new(worst);
                let mut observer =
                    make_observer(params.observer, OBSERVER_BASENAME, slv.rows(), worker);
                let observing =
                    worker == 0 && params.observer != crate::params::ObserverType::None;

                let mut round = 0usize;
                loop {
                    if params.time_limit > 0.0
                        && start.elapsed().as_secs_f64() > params.time_limit
                    {
                        break;
                    }

                    let seeds = match pool.lock() {
                        Ok(pool) => pool.snapshot(),
                        Err(_) => break,
                    };

                    init_assignment::<F, M, S, C, _>(
                        params.init_policy,
                        &mut x,
                        &mut slv,
                        &cost,
                        params.init_random,
                        round,
                        &seeds,
                        &mut rng,
                    );
                    slv.reset();
                    scratch.reset();

                    let outcome = solve_round::<F, M, S, C, _>(
                        &mut slv,
                        &mut x,
                        &cost,
                        cost_constant,
                        params,
                        delta,
                        &mut scratch,
                        &mut rng,
                        &mut best,
                        observing.then(|| observer.as_mut() as &mut dyn crate::observer::Observer),
                        Some(stop),
                        start,
                    );

                    if best.remaining == 0 {
                        if let (Some(snapshot), Ok(mut pool)) = (best.x.as_ref(), pool.lock()) {
                            if pool.push::<M>(best.value, snapshot) {
                                debug!(
                                    "worker {worker}: pooled {} (round {round})",
                                    best.value
                                );
                            }
                        }
                    }

                    round += 1;

                    match outcome {
                        LoopOutcome::Stopped | LoopOutcome::TimeLimitReached => break,
                        _ => {}
                    }

                    // Without a clock a single round per worker is the
                    // whole budget.
                    if params.time_limit <= 0.0 {
                        break;
                    }
                }

                observer.finish();
                best
            }));
        }

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| BestRecord::new(worst)))
            .collect()
    });

    let mut best = BestRecord::new(worst);
    for record in records {
        if record.x.is_none() {
            continue;
        }

        let better = if record.remaining == 0 {
            best.remaining > 0 || M::is_better_solution(record.value, best.value)
        } else {
            record.remaining < best.remaining
        };

        if better {
            best = record;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{MaximizeTag, MinimizeTag};

    fn bits(pattern: &[bool]) -> BitVec {
        let mut x = BitVec::zeros(pattern.len());
        for (i, &b) in pattern.iter().enumerate() {
            if b {
                x.assign(i, b);
            }
        }
        x
    }

    #[test]
    fn pool_keeps_the_best_k_sorted() {
        let mut pool = IncumbentPool::new(2);

        assert!(pool.push::<MinimizeTag>(5.0, &bits(&[true, false])));
        assert!(pool.push::<MinimizeTag>(3.0, &bits(&[false, true])));
        assert!(pool.push::<MinimizeTag>(4.0, &bits(&[true, true])));
        assert_eq!(pool.len(), 2);

        // 5.0 was evicted; best-first order.
        let snapshot = pool.snapshot();
        assert_eq!(snapshot[0], bits(&[false, true]));
        assert_eq!(snapshot[1], bits(&[true, true]));
    }

    #[test]
    fn pool_rejects_duplicates_and_losers() {
        let mut pool = IncumbentPool::new(2);

        assert!(pool.push::<MinimizeTag>(1.0, &bits(&[true])));
        assert!(!pool.push::<MinimizeTag>(1.0, &bits(&[false])));
        assert!(pool.push::<MinimizeTag>(2.0, &bits(&[false])));
        assert!(!pool.push::<MinimizeTag>(9.0, &bits(&[true])));
    }

    #[test]
    fn pool_direction_awareness() {
        let mut pool = IncumbentPool::new(1);

        assert!(pool.push::<MaximizeTag>(1.0, &bits(&[false])));
        assert!(pool.push::<MaximizeTag>(2.0, &bits(&[true])));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.snapshot()[0], bits(&[true]));
    }
}
