//! End-to-end solver scenarios.

use std::fmt::Write as _;

use ratchet_core::error::{RatchetError, SolverError};
use ratchet_core::{
    compute_solution, is_valid_solution, optimize, read_problem, solve, ConstraintOrder,
    PreprocessorLevel, ResultStatus, SolverParams,
};

fn params_with_seed(seed: u64) -> SolverParams {
    SolverParams {
        seed: Some(seed),
        ..Default::default()
    }
}

#[test]
fn trivial_equality_cover() {
    let pb = read_problem(
        "minimize\n\
         x1 + x2\n\
         subject to\n\
         ct0: x1 + x2 = 1\n\
         binary\n\
         x1 x2\n\
         end\n",
    )
    .unwrap();

    let result = solve(&pb, &params_with_seed(1)).unwrap();

    assert_eq!(result.status, ResultStatus::Success);
    assert_eq!(result.remaining_constraints, 0);

    let best = result.best().unwrap();
    assert_eq!(best.value, 1.0);
    assert!(best.variables.iter().filter(|&&b| b).count() == 1);
    assert!(is_valid_solution(&pb, &result));
    assert_eq!(compute_solution(&pb, &result), Some(1.0));
}

#[test]
fn unrealisable_equality_is_rejected() {
    let pb = read_problem(
        "minimize\n\
         x1 + x2\n\
         subject to\n\
         ct0: x1 + x2 = 3\n\
         binary\n\
         x1 x2\n\
         end\n",
    )
    .unwrap();

    // Caught whether or not the preprocessor runs first.
    for level in [PreprocessorLevel::All, PreprocessorLevel::None] {
        let params = SolverParams {
            preprocessor: level,
            ..params_with_seed(1)
        };

        match solve(&pb, &params) {
            Err(RatchetError::Solver(SolverError::UnrealisableConstraint(_))) => {}
            other => panic!("expected unrealisable constraint, got {other:?}"),
        }
    }
}

/// A 4x4 assignment problem: one variable per cell, each row covered
/// exactly once and each column at least once.
fn assignment_lp(n: usize) -> String {
    let mut text = String::from("minimize\n");
    for i in 0..n {
        for j in 0..n {
            let _ = write!(text, " + {} x{i}_{j}", 1 + (i * 7 + j * 3) % 5);
        }
    }
    text.push_str("\nsubject to\n");

    for i in 0..n {
        let _ = write!(text, "row{i}:");
        for j in 0..n {
            let _ = write!(text, " + x{i}_{j}");
        }
        text.push_str(" = 1\n");
    }
    for j in 0..n {
        let _ = write!(text, "col{j}:");
        for i in 0..n {
            let _ = write!(text, " + x{i}_{j}");
        }
        text.push_str(" >= 1\n");
    }

    text.push_str("binary\n");
    for i in 0..n {
        for j in 0..n {
            let _ = write!(text, " x{i}_{j}");
        }
    }
    text.push_str("\nend\n");
    text
}

#[test]
fn mixed_cover_is_solved_by_the_optimizer() {
    let pb = read_problem(&assignment_lp(4)).unwrap();

    let params = SolverParams {
        limit: 5000,
        time_limit: 10.0,
        delta: 1e-2,
        thread: 2,
        ..params_with_seed(7)
    };

    let result = optimize(&pb, &params).unwrap();

    assert_eq!(result.remaining_constraints, 0);
    assert_eq!(result.status, ResultStatus::Success);
    assert!(is_valid_solution(&pb, &result));
}

/// The 8-queens problem: one queen per rank, at most one per file and
/// per diagonal.
fn n_queens_lp(n: i32) -> String {
    let mut text = String::from("minimize\n");
    for i in 0..n {
        for j in 0..n {
            let _ = write!(text, " + x{i}_{j}");
        }
    }
    text.push_str("\nsubject to\n");

    for i in 0..n {
        let _ = write!(text, "rank{i}:");
        for j in 0..n {
            let _ = write!(text, " + x{i}_{j}");
        }
        text.push_str(" = 1\n");
    }
    for j in 0..n {
        let _ = write!(text, "file{j}:");
        for i in 0..n {
            let _ = write!(text, " + x{i}_{j}");
        }
        text.push_str(" <= 1\n");
    }
    for d in -(n - 1)..n {
        let cells: Vec<(i32, i32)> = (0..n)
            .filter_map(|i| {
                let j = i - d;
                (0..n).contains(&j).then_some((i, j))
            })
            .collect();
        if cells.len() > 1 {
            let _ = write!(text, "diag{}:", d + n - 1);
            for (i, j) in cells {
                let _ = write!(text, " + x{i}_{j}");
            }
            text.push_str(" <= 1\n");
        }
    }
    for s in 0..(2 * n - 1) {
        let cells: Vec<(i32, i32)> = (0..n)
            .filter_map(|i| {
                let j = s - i;
                (0..n).contains(&j).then_some((i, j))
            })
            .collect();
        if cells.len() > 1 {
            let _ = write!(text, "anti{s}:");
            for (i, j) in cells {
                let _ = write!(text, " + x{i}_{j}");
            }
            text.push_str(" <= 1\n");
        }
    }

    text.push_str("binary\n");
    for i in 0..n {
        for j in 0..n {
            let _ = write!(text, " x{i}_{j}");
        }
    }
    text.push_str("\nend\n");
    text
}

#[test]
fn eight_queens_has_a_valid_placement() {
    let pb = read_problem(&n_queens_lp(8)).unwrap();

    let params = SolverParams {
        limit: 5000,
        time_limit: 10.0,
        theta: 0.5,
        delta: 1.0,
        kappa_min: 0.30,
        kappa_step: 1e-2,
        kappa_max: 100.0,
        alpha: 1.0,
        w: 60,
        pushes_limit: 50,
        pushing_objective_amplifier: 10.0,
        pushing_iteration_limit: 10,
        order: ConstraintOrder::RandomSorting,
        thread: 2,
        ..params_with_seed(3)
    };

    let result = optimize(&pb, &params).unwrap();

    assert_eq!(result.remaining_constraints, 0);
    assert!(is_valid_solution(&pb, &result));

    // Exactly eight queens under the rank equalities.
    let best = result.best().unwrap();
    assert_eq!(best.variables.iter().filter(|&&b| b).count(), 8);
    assert_eq!(best.value, 8.0);
}

#[test]
fn maximization_with_signed_factors() {
    let pb = read_problem(
        "maximize\n\
         x1 - x2 + x3\n\
         subject to\n\
         a: x1 - x2 + x3 <= 1\n\
         b: - x1 + x2 <= 0\n\
         binary\n\
         x1 x2 x3\n\
         end\n",
    )
    .unwrap();

    let params = SolverParams {
        limit: 2000,
        pushes_limit: 50,
        init_random: 0.0,
        ..params_with_seed(9)
    };

    let result = optimize(&pb, &params).unwrap();

    assert_eq!(result.status, ResultStatus::Success);
    assert!(is_valid_solution(&pb, &result));
    assert_eq!(result.best().unwrap().value, 1.0);
}

#[test]
fn limit_zero_reports_the_seeded_assignment() {
    let pb = read_problem(
        "minimize\n\
         x1 + x2\n\
         subject to\n\
         ct0: x1 + x2 >= 1\n\
         binary\n\
         x1 x2\n\
         end\n",
    )
    .unwrap();

    let params = SolverParams {
        limit: 0,
        init_random: 0.0,
        ..params_with_seed(5)
    };

    let result = solve(&pb, &params).unwrap();

    // Positive costs keep the objective-sign seeding all-zero, which
    // violates the single row; no sweep ran to change it.
    assert_eq!(result.status, ResultStatus::LimitReached);
    assert_eq!(result.remaining_constraints, 1);
    let best = result.best().unwrap();
    assert!(best.variables.iter().all(|&b| !b));
}

#[test]
fn equal_kappa_bounds_terminate_by_limit() {
    let pb = read_problem(
        "minimize\n\
         x1 + x2 + x3\n\
         subject to\n\
         a: x1 + x2 >= 1\n\
         b: x2 + x3 >= 1\n\
         binary\n\
         x1 x2 x3\n\
         end\n",
    )
    .unwrap();

    let params = SolverParams {
        limit: 3,
        kappa_min: 0.2,
        kappa_max: 0.2,
        kappa_step: 0.0,
        pushes_limit: 0,
        ..params_with_seed(2)
    };

    let result = solve(&pb, &params).unwrap();

    // Kappa cannot cross its own value; only feasibility or the
    // iteration budget may end this run.
    assert_ne!(result.status, ResultStatus::KappaMaxReached);
    assert_ne!(result.status, ResultStatus::TimeLimitReached);
}

/// Two covering rows sharing an expensive middle variable: the dual
/// feedback of the first row makes the shared variable look cheap to
/// the second one, so the first feasible point overpays.
fn coupled_cover() -> &'static str {
    "minimize\n\
     1.2 a + 1.5 b + 2 c\n\
     subject to\n\
     r0: a + c >= 1\n\
     r1: b + c >= 1\n\
     binary\n\
     a b c\n\
     end\n"
}

#[test]
fn pushes_only_improve_the_objective() {
    let pb = read_problem(coupled_cover()).unwrap();

    let mut strict_improvement = false;

    for seed in 0..16 {
        let common = SolverParams {
            limit: 1000,
            delta: 1e-2,
            init_random: 0.0,
            order: ConstraintOrder::RandomSorting,
            pushing_objective_amplifier: 50.0,
            pushing_iteration_limit: 5,
            ..params_with_seed(seed)
        };

        let without = solve(
            &pb,
            &SolverParams {
                pushes_limit: 0,
                ..common.clone()
            },
        )
        .unwrap();
        let with = solve(
            &pb,
            &SolverParams {
                pushes_limit: 50,
                ..common
            },
        )
        .unwrap();

        assert_eq!(without.status, ResultStatus::Success);
        assert_eq!(with.status, ResultStatus::Success);
        assert!(is_valid_solution(&pb, &with));

        let v_without = without.best().unwrap().value;
        let v_with = with.best().unwrap().value;

        // Identical trajectories up to the first feasible point, then
        // the push phase only ever stores improvements.
        assert!(v_with <= v_without + 1e-9, "seed {seed}: {v_with} > {v_without}");

        if v_with < v_without - 1e-9 {
            strict_improvement = true;
        }
    }

    assert!(strict_improvement, "no seed improved under pushing");
}

#[test]
fn preprocessor_reports_forced_variables() {
    let pb = read_problem(
        "minimize\n\
         x1 + x2 + x3\n\
         subject to\n\
         pin: x1 = 1\n\
         cover: x1 + x2 + x3 >= 2\n\
         binary\n\
         x1 x2 x3\n\
         end\n",
    )
    .unwrap();

    let result = solve(&pb, &params_with_seed(4)).unwrap();

    assert_eq!(result.status, ResultStatus::Success);
    assert!(result
        .affected_vars
        .names
        .iter()
        .any(|name| name == "x1"));
    assert!(is_valid_solution(&pb, &result));
}

#[test]
fn general_integer_rows_use_the_wide_kernel() {
    let pb = read_problem(
        "minimize\n\
         x1 + x2 + x3\n\
         subject to\n\
         w: 2 x1 + 3 x2 + 4 x3 >= 5\n\
         c: x1 + x2 <= 1\n\
         binary\n\
         x1 x2 x3\n\
         end\n",
    )
    .unwrap();

    let params = SolverParams {
        limit: 2000,
        ..params_with_seed(6)
    };

    let result = solve(&pb, &params).unwrap();

    assert_eq!(result.status, ResultStatus::Success);
    assert!(is_valid_solution(&pb, &result));
}

#[test]
fn quadratic_objective_through_the_api() {
    use ratchet_core::problem::QuadElement;

    let mut pb = read_problem(
        "minimize\n\
         x0 + x1\n\
         subject to\n\
         cover: x0 + x1 >= 1\n\
         binary\n\
         x0 x1\n\
         end\n",
    )
    .unwrap();

    // The LP reader is linear-only; the quadratic part comes in through
    // the API, penalizing the two variables together.
    pb.objective.qelements.push(QuadElement {
        factor: 2.0,
        var_a: 0,
        var_b: 1,
    });

    let result = solve(&pb, &params_with_seed(12)).unwrap();

    assert_eq!(result.status, ResultStatus::Success);
    assert!(is_valid_solution(&pb, &result));

    // Exactly one variable on: objective 1 instead of 2 + 2.
    let best = result.best().unwrap();
    assert_eq!(best.variables.iter().filter(|&&b| b).count(), 1);
    assert_eq!(best.value, 1.0);
    assert_eq!(compute_solution(&pb, &result), Some(1.0));
}

#[test]
fn float32_kernels_solve_too() {
    let pb = read_problem(&assignment_lp(3)).unwrap();

    let params = SolverParams {
        limit: 2000,
        float_type: ratchet_core::FloatType::Float32,
        ..params_with_seed(8)
    };

    let result = solve(&pb, &params).unwrap();

    assert_eq!(result.status, ResultStatus::Success);
    assert!(is_valid_solution(&pb, &result));
}
