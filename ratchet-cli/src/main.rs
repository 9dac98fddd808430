//! Command line interface of the ratchet solver.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{ArgAction, Parser};
use log::{debug, info, LevelFilter};

use ratchet_core::error::RatchetError;
use ratchet_core::problem::RawProblem;
use ratchet_core::{
    is_valid_solution, read_problem, solve, write_best_solution, ResultStatus, RunResult,
    SolverParams,
};

/// Exit codes of the command.
mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const USAGE: i32 = 1;
    pub const FILE_FORMAT: i32 = 2;
    pub const INFEASIBLE: i32 = 3;
    pub const TIME_LIMIT: i32 = 4;
}

#[derive(Parser)]
#[command(name = "ratchet")]
#[command(version)]
#[command(about = "Heuristic solver for 0/1 linear programs in LP format")]
struct Cli {
    /// LP problem files to solve, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Parameter override, repeatable: -p limit=5000 -p theta=0.4
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Optimize: keep improving the objective with parallel restarts
    #[arg(short = 'O', long)]
    optimize: bool,

    /// Verbosity; repeat for more detail
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Write the best solution to this file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Base RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Print a JSON result summary on stdout
    #[arg(long)]
    json: bool,
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return exit_code::USAGE;
        }
    };

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let mut params = SolverParams::default();
    for assignment in &cli.params {
        if let Err(e) = params.assign(assignment) {
            eprintln!("ratchet: {e}");
            return exit_code::USAGE;
        }
    }
    if let Some(seed) = cli.seed {
        params.seed = Some(seed);
    }

    let mut worst = exit_code::SUCCESS;
    for file in &cli.files {
        let code = process(file, &params, &cli);
        worst = worst.max(code);
    }

    worst
}

fn process(file: &Path, params: &SolverParams, cli: &Cli) -> i32 {
    info!("reading problem from `{}`", file.display());

    let text = match std::fs::read_to_string(file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("ratchet: {}: {e}", file.display());
            return exit_code::FILE_FORMAT;
        }
    };

    let pb = match read_problem(&text) {
        Ok(pb) => pb,
        Err(e) => {
            eprintln!("ratchet: {}: {e}", file.display());
            return exit_code::FILE_FORMAT;
        }
    };

    let summary = pb.summary();
    info!(
        "{} variables ({} binary, {} general), {} constraints (={} >={} <={}), {}",
        summary.variables,
        summary.binary,
        summary.general,
        summary.equal_constraints + summary.greater_constraints + summary.less_constraints,
        summary.equal_constraints,
        summary.greater_constraints,
        summary.less_constraints,
        summary.family
    );
    debug!(
        "objective range [{}, {}]",
        summary.objective_min, summary.objective_max
    );

    let begin = Instant::now();
    let outcome = if cli.optimize {
        ratchet_core::optimize(&pb, params)
    } else {
        solve(&pb, params)
    };
    let elapsed = begin.elapsed().as_secs_f64();

    let result = match outcome {
        Ok(result) => result,
        Err(RatchetError::Problem(e)) => {
            eprintln!("ratchet: {}: {e}", file.display());
            return exit_code::FILE_FORMAT;
        }
        Err(e) => {
            eprintln!("ratchet: {}: {e}", file.display());
            return exit_code::INFEASIBLE;
        }
    };

    report(file, &pb, &result, elapsed, cli)
}

fn report(file: &Path, pb: &RawProblem, result: &RunResult, elapsed: f64, cli: &Cli) -> i32 {
    match result.best() {
        Some(best) if result.status == ResultStatus::Success => {
            info!(
                "solution found in {:.3}s (loop {}), objective {}",
                elapsed, result.loops, best.value
            );

            if !is_valid_solution(pb, result) {
                // A feasible claim that fails re-evaluation is a bug.
                eprintln!("ratchet: {}: solution failed validation", file.display());
                return exit_code::INFEASIBLE;
            }
        }
        _ => {
            info!(
                "no solution in {:.3}s, {} constraints remaining, status {}",
                elapsed, result.remaining_constraints, result.status
            );
        }
    }

    if cli.json {
        match serde_json::to_string_pretty(&result.summary()) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("ratchet: {e}"),
        }
    } else if let Some(best) = result.best() {
        if result.status == ResultStatus::Success {
            println!("{}: {} ({})", file.display(), best.value, result.status);
        } else {
            println!(
                "{}: no solution, {} remaining ({})",
                file.display(),
                result.remaining_constraints,
                result.status
            );
        }
    } else {
        println!("{}: no solution ({})", file.display(), result.status);
    }

    if let Some(path) = &cli.output {
        if let Err(e) = write_solution_file(path, result) {
            eprintln!("ratchet: {}: {e:#}", path.display());
        }
    }

    match result.status {
        ResultStatus::Success => exit_code::SUCCESS,
        ResultStatus::TimeLimitReached => exit_code::TIME_LIMIT,
        _ => exit_code::INFEASIBLE,
    }
}

fn write_solution_file(path: &Path, result: &RunResult) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut out = BufWriter::new(file);

    write_best_solution(&mut out, result).context("write solution")?;
    out.flush().context("flush solution")?;

    Ok(())
}
