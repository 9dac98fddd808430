//! Merged-constraint builder.
//!
//! Fuses the three typed constraint lists of a problem into a single list
//! of `[min, max]` rows: duplicate elements are summed, rows sharing the
//! same element map are merged by bound intersection, bounds are tightened
//! against what the row can algebraically reach, and rows satisfied by any
//! 0/1 assignment are dropped.

use log::debug;
use rustc_hash::FxHashMap;

use crate::error::{ProblemError, RatchetError, SolverError};
use crate::problem::{Constraint, ConstraintElement, RawProblem};

/// One merged row `min <= sum factor * var <= max`.
///
/// Elements are deduplicated and sorted by variable; equality rows have
/// `min == max`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedConstraint {
    /// Left-hand side elements, sorted by variable index
    pub elements: Vec<ConstraintElement>,

    /// Lower bound
    pub min: i32,

    /// Upper bound
    pub max: i32,

    /// Declaration id of the first constraint merged into this row
    pub id: usize,
}

/// Sentinel bounds before tightening.
const UNBOUNDED_MIN: i32 = i32::MIN;
const UNBOUNDED_MAX: i32 = i32::MAX;

/// Build the merged constraint list of `pb`.
///
/// Two rows over the same elements with disjoint bound intervals are a
/// problem definition error; a tightened row no 0/1 assignment can
/// satisfy is an unrealisable constraint.
pub fn make_merged_constraints(pb: &RawProblem) -> Result<Vec<MergedConstraint>, RatchetError> {
    let mut rows: Vec<MergedConstraint> = Vec::new();
    let mut index: FxHashMap<Vec<ConstraintElement>, usize> = FxHashMap::default();

    let mut push = |cst: &Constraint, min: i32, max: i32| -> Result<(), RatchetError> {
        let elements = normalize_elements(&cst.elements);
        if elements.is_empty() {
            // A constant row: realisable iff 0 lies in the interval.
            if min > 0 || max < 0 {
                return Err(SolverError::UnrealisableConstraint(cst.id).into());
            }
            return Ok(());
        }

        match index.get(&elements) {
            Some(&at) => {
                let row = &mut rows[at];
                row.min = row.min.max(min);
                row.max = row.max.min(max);
                if row.min > row.max {
                    return Err(ProblemError::IncompatibleConstraints(cst.id).into());
                }
            }
            None => {
                index.insert(elements.clone(), rows.len());
                rows.push(MergedConstraint {
                    elements,
                    min,
                    max,
                    id: cst.id,
                });
            }
        }

        Ok(())
    };

    for cst in &pb.equal_constraints {
        push(cst, cst.value, cst.value)?;
    }
    for cst in &pb.greater_constraints {
        push(cst, cst.value, UNBOUNDED_MAX)?;
    }
    for cst in &pb.less_constraints {
        push(cst, UNBOUNDED_MIN, cst.value)?;
    }

    let before = rows.len();
    let mut merged = Vec::with_capacity(rows.len());

    for mut row in rows {
        // The row's algebraic reach over 0/1 assignments.
        let mut reach_min = 0i64;
        let mut reach_max = 0i64;
        for e in &row.elements {
            if e.factor < 0 {
                reach_min += i64::from(e.factor);
            } else {
                reach_max += i64::from(e.factor);
            }
        }

        let min = i64::from(row.min).max(reach_min);
        let max = i64::from(row.max).min(reach_max);

        if min > max {
            return Err(SolverError::UnrealisableConstraint(row.id).into());
        }

        if min == reach_min && max == reach_max {
            // Satisfied by any assignment.
            continue;
        }

        row.min = min as i32;
        row.max = max as i32;
        merged.push(row);
    }

    debug!(
        "merged constraints: {} rows from {} ({} trivial or fused)",
        merged.len(),
        pb.num_constraints(),
        pb.num_constraints() - before + (before - merged.len()),
    );

    Ok(merged)
}

/// Sum duplicate variable factors, drop zeros, sort by variable.
fn normalize_elements(elements: &[ConstraintElement]) -> Vec<ConstraintElement> {
    let mut by_var: FxHashMap<usize, i32> = FxHashMap::default();
    for e in elements {
        *by_var.entry(e.var).or_insert(0) += e.factor;
    }

    let mut out: Vec<ConstraintElement> = by_var
        .into_iter()
        .filter(|&(_, factor)| factor != 0)
        .map(|(var, factor)| ConstraintElement { factor, var })
        .collect();
    out.sort_by_key(|e| e.var);
    out
}

/// Size of the reduced-cost scratch shared by every row update.
pub fn reduced_costs_scratch_size(csts: &[MergedConstraint]) -> usize {
    csts.iter().map(|c| c.elements.len()).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Direction, ObjectiveElement, VarDomain, VarKind};

    fn problem(names: &[&str]) -> RawProblem {
        let mut pb = RawProblem {
            direction: Direction::Minimize,
            ..Default::default()
        };
        for name in names {
            pb.vars.names.push(name.to_string());
            pb.vars.domains.push(VarDomain {
                min: 0,
                max: 1,
                kind: VarKind::Binary,
            });
            pb.objective.elements.push(ObjectiveElement {
                factor: 1.0,
                var: pb.vars.names.len() - 1,
            });
        }
        pb
    }

    fn cst(id: usize, elements: &[(i32, usize)], value: i32) -> Constraint {
        Constraint {
            label: format!("ct{id}"),
            id,
            elements: elements
                .iter()
                .map(|&(factor, var)| ConstraintElement { factor, var })
                .collect(),
            value,
        }
    }

    #[test]
    fn equal_and_greater_over_same_elements_are_fused() {
        let mut pb = problem(&["a", "b"]);
        pb.greater_constraints.push(cst(0, &[(1, 0), (1, 1)], 1));
        pb.less_constraints.push(cst(1, &[(1, 1), (1, 0)], 1));

        let merged = make_merged_constraints(&pb).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].min, 1);
        assert_eq!(merged[0].max, 1);
    }

    #[test]
    fn incompatible_bounds_are_rejected() {
        let mut pb = problem(&["a", "b"]);
        pb.equal_constraints.push(cst(0, &[(1, 0), (1, 1)], 0));
        pb.equal_constraints.push(cst(1, &[(1, 0), (1, 1)], 2));

        assert!(matches!(
            make_merged_constraints(&pb),
            Err(RatchetError::Problem(ProblemError::IncompatibleConstraints(_)))
        ));
    }

    #[test]
    fn duplicate_elements_are_summed_and_zeros_dropped() {
        let mut pb = problem(&["a", "b"]);
        pb.equal_constraints
            .push(cst(0, &[(1, 0), (1, 0), (1, 1), (-1, 1)], 2));

        let merged = make_merged_constraints(&pb).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0].elements,
            vec![ConstraintElement { factor: 2, var: 0 }]
        );
    }

    #[test]
    fn bounds_are_tightened_to_the_reach() {
        let mut pb = problem(&["a", "b", "c"]);
        // -a + b + c >= -5: lower bound clamps to -1.
        pb.greater_constraints
            .push(cst(0, &[(-1, 0), (1, 1), (1, 2)], -5));

        let merged = make_merged_constraints(&pb).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].min, -1);
        assert_eq!(merged[0].max, 2);
    }

    #[test]
    fn unreachable_equality_is_unrealisable() {
        let mut pb = problem(&["a", "b"]);
        // a + b = 3 over binaries: reach is [0, 2].
        pb.equal_constraints.push(cst(0, &[(1, 0), (1, 1)], 3));

        assert!(matches!(
            make_merged_constraints(&pb),
            Err(RatchetError::Solver(SolverError::UnrealisableConstraint(0)))
        ));
    }

    #[test]
    fn trivially_satisfied_rows_are_dropped() {
        let mut pb = problem(&["a", "b"]);
        pb.less_constraints.push(cst(0, &[(1, 0), (1, 1)], 2));
        pb.less_constraints.push(cst(1, &[(1, 0), (1, 1)], 1));

        let merged = make_merged_constraints(&pb).unwrap();
        // ct1 binds; its interval was fused with the trivial ct0.
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].min, 0);
        assert_eq!(merged[0].max, 1);
    }

    #[test]
    fn scratch_is_sized_by_the_widest_row() {
        let mut pb = problem(&["a", "b", "c"]);
        pb.less_constraints.push(cst(0, &[(1, 0)], 0));
        pb.greater_constraints
            .push(cst(1, &[(1, 0), (1, 1), (1, 2)], 2));

        let merged = make_merged_constraints(&pb).unwrap();
        assert_eq!(reduced_costs_scratch_size(&merged), 3);
    }
}
