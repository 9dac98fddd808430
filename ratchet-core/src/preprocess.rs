//! Forced-variable pre-affectation.
//!
//! Scans the constraints for variables whose value is implied by every
//! feasible assignment (singleton rows, rows whose bound equals the sum of
//! their positive or negative factors), fixes them, substitutes them out
//! of the remaining rows and repeats until a fixpoint. Fixed variables are
//! reported through `affected_vars` and folded into the objective
//! constant.

use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::error::SolverError;
use crate::params::PreprocessorLevel;
use crate::problem::{Constraint, Objective, ObjectiveElement, RawProblem, Variables};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Equal,
    Greater,
    Less,
}

/// Apply the pre-affectation pass to `pb`.
///
/// With `PreprocessorLevel::None` the problem is passed through
/// unchanged. Returns `UnrealisableConstraint` when a row admits no
/// assignment at all.
pub fn preprocess(pb: &RawProblem, level: PreprocessorLevel) -> Result<RawProblem, SolverError> {
    if level == PreprocessorLevel::None {
        return Ok(pb.clone());
    }

    let mut fixed: FxHashMap<usize, bool> = FxHashMap::default();

    loop {
        let mut changed = false;

        for (kind, cst) in rows(pb) {
            changed |= scan_row(kind, cst, &mut fixed)?;
        }

        if !changed {
            break;
        }
    }

    if fixed.is_empty() {
        debug!("preprocessor: nothing to fix");
        return Ok(pb.clone());
    }

    info!("preprocessor: {} variables fixed", fixed.len());

    rebuild(pb, &fixed)
}

fn rows(pb: &RawProblem) -> impl Iterator<Item = (RowKind, &Constraint)> {
    pb.equal_constraints
        .iter()
        .map(|c| (RowKind::Equal, c))
        .chain(pb.greater_constraints.iter().map(|c| (RowKind::Greater, c)))
        .chain(pb.less_constraints.iter().map(|c| (RowKind::Less, c)))
}

/// Inspect one row under the current fixing and record newly forced
/// variables. Returns whether anything new was fixed.
fn scan_row(
    kind: RowKind,
    cst: &Constraint,
    fixed: &mut FxHashMap<usize, bool>,
) -> Result<bool, SolverError> {
    // Substitute the already-fixed variables into the right-hand side,
    // summing duplicate appearances of a variable on the way.
    let mut value = i64::from(cst.value);
    let mut by_var: FxHashMap<usize, i64> = FxHashMap::default();

    for e in &cst.elements {
        match fixed.get(&e.var) {
            Some(&true) => value -= i64::from(e.factor),
            Some(&false) => {}
            None => *by_var.entry(e.var).or_insert(0) += i64::from(e.factor),
        }
    }

    let mut remaining: Vec<(usize, i64)> = by_var
        .into_iter()
        .filter(|&(_, f)| f != 0)
        .collect();
    remaining.sort_by_key(|&(var, _)| var);

    let pos_sum: i64 = remaining
        .iter()
        .filter(|&&(_, f)| f > 0)
        .map(|&(_, f)| f)
        .sum();
    let neg_sum: i64 = remaining
        .iter()
        .filter(|&&(_, f)| f < 0)
        .map(|&(_, f)| f)
        .sum();

    let infeasible = match kind {
        RowKind::Equal => value < neg_sum || value > pos_sum,
        RowKind::Greater => value > pos_sum,
        RowKind::Less => value < neg_sum,
    };
    if infeasible {
        return Err(SolverError::UnrealisableConstraint(cst.id));
    }

    let mut force = |fixed: &mut FxHashMap<usize, bool>, var: usize, val: bool| -> bool {
        match fixed.insert(var, val) {
            None => true,
            // Re-inserting the same value is a no-op; a conflict has
            // already been caught by the feasibility check above.
            Some(prev) => {
                debug_assert_eq!(prev, val);
                false
            }
        }
    };

    let mut changed = false;

    // A row pinned to one of its extremes forces every variable.
    let at_max = match kind {
        RowKind::Equal | RowKind::Greater => value == pos_sum,
        RowKind::Less => false,
    };
    let at_min = match kind {
        RowKind::Equal | RowKind::Less => value == neg_sum,
        RowKind::Greater => false,
    };

    if at_max && !remaining.is_empty() {
        for &(var, f) in &remaining {
            changed |= force(fixed, var, f > 0);
        }
        return Ok(changed);
    }

    if at_min && !remaining.is_empty() {
        for &(var, f) in &remaining {
            changed |= force(fixed, var, f < 0);
        }
        return Ok(changed);
    }

    // Singleton row: keep the variable only if a single value fits.
    if remaining.len() == 1 {
        let (var, f) = remaining[0];
        let fits = |x: i64| match kind {
            RowKind::Equal => f * x == value,
            RowKind::Greater => f * x >= value,
            RowKind::Less => f * x <= value,
        };

        match (fits(0), fits(1)) {
            (true, false) => changed |= force(fixed, var, false),
            (false, true) => changed |= force(fixed, var, true),
            (true, true) => {}
            (false, false) => return Err(SolverError::UnrealisableConstraint(cst.id)),
        }
    }

    Ok(changed)
}

/// Build the reduced problem once the fixing is complete.
fn rebuild(pb: &RawProblem, fixed: &FxHashMap<usize, bool>) -> Result<RawProblem, SolverError> {
    // Renumber the surviving variables.
    let mut remap: Vec<Option<usize>> = vec![None; pb.num_vars()];
    let mut vars = Variables::default();

    for j in 0..pb.num_vars() {
        if !fixed.contains_key(&j) {
            remap[j] = Some(vars.names.len());
            vars.names.push(pb.vars.names[j].clone());
            vars.domains.push(pb.vars.domains[j]);
        }
    }

    let mut affected_vars = pb.affected_vars.clone();
    for j in 0..pb.num_vars() {
        if let Some(&value) = fixed.get(&j) {
            affected_vars.push(pb.vars.names[j].clone(), value);
        }
    }

    // Fold the fixed variables into the objective.
    let mut objective = Objective {
        constant: pb.objective.constant,
        elements: Vec::new(),
        qelements: Vec::new(),
    };

    for e in &pb.objective.elements {
        match remap[e.var] {
            Some(var) => objective.elements.push(ObjectiveElement { factor: e.factor, var }),
            None => {
                if fixed[&e.var] {
                    objective.constant += e.factor;
                }
            }
        }
    }

    for q in &pb.objective.qelements {
        match (remap[q.var_a], remap[q.var_b]) {
            (Some(a), Some(b)) => objective.qelements.push(crate::problem::QuadElement {
                factor: q.factor,
                var_a: a,
                var_b: b,
            }),
            (Some(a), None) => {
                if fixed[&q.var_b] {
                    objective.elements.push(ObjectiveElement {
                        factor: q.factor,
                        var: a,
                    });
                }
            }
            (None, Some(b)) => {
                if fixed[&q.var_a] {
                    objective.elements.push(ObjectiveElement {
                        factor: q.factor,
                        var: b,
                    });
                }
            }
            (None, None) => {
                if fixed[&q.var_a] && fixed[&q.var_b] {
                    objective.constant += q.factor;
                }
            }
        }
    }

    // Substitute into the constraints, dropping the ones emptied out.
    let reduce = |list: &[Constraint], kind: RowKind| -> Result<Vec<Constraint>, SolverError> {
        let mut out = Vec::with_capacity(list.len());

        for cst in list {
            let mut value = i64::from(cst.value);
            let mut elements = Vec::with_capacity(cst.elements.len());

            for e in &cst.elements {
                match remap[e.var] {
                    Some(var) => elements.push(crate::problem::ConstraintElement {
                        factor: e.factor,
                        var,
                    }),
                    None => {
                        if fixed[&e.var] {
                            value -= i64::from(e.factor);
                        }
                    }
                }
            }

            if elements.is_empty() {
                let ok = match kind {
                    RowKind::Equal => value == 0,
                    RowKind::Greater => value <= 0,
                    RowKind::Less => value >= 0,
                };
                if !ok {
                    return Err(SolverError::UnrealisableConstraint(cst.id));
                }
                continue;
            }

            out.push(Constraint {
                label: cst.label.clone(),
                id: cst.id,
                elements,
                value: value as i32,
            });
        }

        Ok(out)
    };

    let mut reduced = RawProblem {
        direction: pb.direction,
        objective,
        vars,
        equal_constraints: reduce(&pb.equal_constraints, RowKind::Equal)?,
        greater_constraints: reduce(&pb.greater_constraints, RowKind::Greater)?,
        less_constraints: reduce(&pb.less_constraints, RowKind::Less)?,
        affected_vars,
        coefficient: pb.coefficient,
    };
    reduced.reclassify();

    Ok(reduced)
}
