//! Solve results and their serialization.

use std::io::{self, Write};

use serde::Serialize;

use crate::problem::{AffectedVars, RawProblem};
use rustc_hash::FxHashMap;

/// How a solve or optimize call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultStatus {
    /// No solve ran (empty problem)
    #[default]
    Uninitialized,

    /// A feasible assignment was found
    Success,

    /// The iteration limit was hit without a feasible assignment
    LimitReached,

    /// Kappa crossed its ceiling without a feasible assignment
    KappaMaxReached,

    /// The clock ran out without a feasible assignment
    TimeLimitReached,
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResultStatus::Uninitialized => "uninitialized",
            ResultStatus::Success => "success",
            ResultStatus::LimitReached => "limit-reached",
            ResultStatus::KappaMaxReached => "kappa-max-reached",
            ResultStatus::TimeLimitReached => "time-limit-reached",
        };
        write!(f, "{name}")
    }
}

/// One stored assignment with its objective value.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Values of the solved variables, by index
    pub variables: Vec<bool>,

    /// Objective value on the original costs
    pub value: f64,
}

/// Outcome of a solve or optimize call.
///
/// `solutions` is ordered worst to best; the last entry is the one the
/// status refers to. When no feasible assignment was found the vector
/// holds the best-effort assignment and `remaining_constraints` is
/// nonzero.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    /// Termination status
    pub status: ResultStatus,

    /// Names of the solved variables, by index
    pub variable_names: Vec<String>,

    /// Assignments forced before solving
    pub affected_vars: AffectedVars,

    /// Stored assignments, worst to best
    pub solutions: Vec<Solution>,

    /// Violated rows in the last stored assignment
    pub remaining_constraints: usize,

    /// Outer iterations of the loop that produced the best assignment
    pub loops: i64,

    /// Seconds spent until the best assignment
    pub duration: f64,

    /// Number of solved variables
    pub variables: usize,

    /// Number of merged constraints
    pub constraints: usize,
}

impl RunResult {
    /// True when a feasible assignment was stored.
    pub fn has_solution(&self) -> bool {
        self.status == ResultStatus::Success && !self.solutions.is_empty()
    }

    /// The best stored solution.
    pub fn best(&self) -> Option<&Solution> {
        self.solutions.last()
    }

    /// Serializable summary for the CLI.
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            status: self.status,
            value: self.best().map(|s| s.value),
            remaining_constraints: self.remaining_constraints,
            loops: self.loops,
            duration: self.duration,
            variables: self.variables,
            constraints: self.constraints,
        }
    }
}

/// JSON-friendly result digest.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSummary {
    /// Termination status
    pub status: ResultStatus,

    /// Objective of the best solution, if any
    pub value: Option<f64>,

    /// Violated rows in the last assignment
    pub remaining_constraints: usize,

    /// Loop count of the best assignment
    pub loops: i64,

    /// Seconds to the best assignment
    pub duration: f64,

    /// Solved variable count
    pub variables: usize,

    /// Merged constraint count
    pub constraints: usize,
}

/// Rebuild the full named assignment of `r` against the original
/// problem, merging the solver variables with the preprocessor-forced
/// ones.
fn assignment_by_name(pb: &RawProblem, r: &RunResult) -> Option<FxHashMap<String, bool>> {
    let solution = r.best()?;

    let mut cache = FxHashMap::default();

    for (name, &value) in r.affected_vars.names.iter().zip(&r.affected_vars.values) {
        cache.insert(name.clone(), value);
    }
    for (name, &value) in r.variable_names.iter().zip(&solution.variables) {
        cache.insert(name.clone(), value);
    }

    if pb.vars.names.iter().any(|name| !cache.contains_key(name)) {
        return None;
    }

    Some(cache)
}

/// Check a result against the original (unpreprocessed) problem.
pub fn is_valid_solution(pb: &RawProblem, r: &RunResult) -> bool {
    let Some(cache) = assignment_by_name(pb, r) else {
        return false;
    };

    let value = |cst: &crate::problem::Constraint| -> i64 {
        cst.elements
            .iter()
            .map(|e| {
                if cache[&pb.vars.names[e.var]] {
                    i64::from(e.factor)
                } else {
                    0
                }
            })
            .sum()
    };

    pb.equal_constraints
        .iter()
        .all(|cst| value(cst) == i64::from(cst.value))
        && pb
            .greater_constraints
            .iter()
            .all(|cst| value(cst) >= i64::from(cst.value))
        && pb
            .less_constraints
            .iter()
            .all(|cst| value(cst) <= i64::from(cst.value))
}

/// Recompute the objective of a result against the original problem.
pub fn compute_solution(pb: &RawProblem, r: &RunResult) -> Option<f64> {
    let cache = assignment_by_name(pb, r)?;

    let mut value = pb.objective.constant;
    for e in &pb.objective.elements {
        if cache[&pb.vars.names[e.var]] {
            value += e.factor;
        }
    }
    for q in &pb.objective.qelements {
        if cache[&pb.vars.names[q.var_a]] && cache[&pb.vars.names[q.var_b]] {
            value += q.factor;
        }
    }

    Some(value)
}

/// Write the best solution as LP-style comments plus `name=value` lines.
pub fn write_best_solution(out: &mut dyn Write, r: &RunResult) -> io::Result<()> {
    writeln!(out, "\\ solver status: {}", r.status)?;

    match r.best() {
        Some(solution) if r.status == ResultStatus::Success => {
            writeln!(out, "\\ objective: {}", solution.value)?;

            for (name, &value) in r.affected_vars.names.iter().zip(&r.affected_vars.values) {
                writeln!(out, "{name}={}", i32::from(value))?;
            }
            for (name, &value) in r.variable_names.iter().zip(&solution.variables) {
                writeln!(out, "{name}={}", i32::from(value))?;
            }
        }
        _ => {
            writeln!(out, "\\ no solution: {} violated", r.remaining_constraints)?;
        }
    }

    Ok(())
}
