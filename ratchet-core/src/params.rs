//! Solver parameters and their `key=value` command line syntax.

use std::fmt;
use std::str::FromStr;

/// Per-sweep ordering of the violated constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstraintOrder {
    /// Keep the ascending row order
    #[default]
    None,

    /// Alternate forward and backward every sweep
    Reversing,

    /// Uniform random permutation every sweep
    RandomSorting,

    /// Most violated rows first
    InfeasibilityDecr,

    /// Most violated rows last
    InfeasibilityIncr,

    /// Largest |pi| first
    LagrangianDecr,

    /// Largest |pi| last
    LagrangianIncr,

    /// Rows whose pi flipped sign in the previous sweep first
    PiSignChange,
}

/// How a worker seeds its assignment before a solve round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitPolicy {
    /// Deterministic initialization from the objective signs
    #[default]
    Bastert,

    /// Round-robin pick from the incumbent pool
    Cycle,

    /// Uniform crossover of two incumbent pool members
    CrossoverCycle,

    /// One sweep against an empty reference, keeping row lower bounds
    PessimisticSolve,

    /// One sweep against a saturated reference, keeping row upper bounds
    OptimisticSolve,
}

/// Floating point representation used by the kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FloatType {
    /// Single precision
    Float32,

    /// Double precision
    #[default]
    Float64,

    /// Extended precision; mapped to double on targets without a wider type
    Extended,
}

/// Multiplier state dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObserverType {
    /// No observation
    #[default]
    None,

    /// Binary PNM images of pi and P per sweep
    Pnm,

    /// Plain text dump of pi per sweep
    File,
}

/// Pre-affectation of forced variables before solving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreprocessorLevel {
    /// Use the raw problem as-is
    None,

    /// Fix and substitute every forced variable
    #[default]
    All,
}

/// Optimization mode flags.
///
/// Only `DEFAULT` is backed by a solver; the other flags are accepted by
/// the parameter parser and rejected at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverMode(u32);

impl SolverMode {
    /// Branch on the most fractional preprocessed variable
    pub const BRANCH: SolverMode = SolverMode(1);
    /// Tune parameters through an external nonlinear optimizer
    pub const NLOPT: SolverMode = SolverMode(2);
    /// Tune parameters through a manual staircase
    pub const MANUAL: SolverMode = SolverMode(4);
    /// Plain solve/optimize
    pub const DEFAULT: SolverMode = SolverMode(8);

    /// Test whether all bits of `other` are set.
    pub fn contains(self, other: SolverMode) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    pub fn union(self, other: SolverMode) -> SolverMode {
        SolverMode(self.0 | other.0)
    }
}

impl Default for SolverMode {
    fn default() -> Self {
        SolverMode::DEFAULT
    }
}

/// All recognized solver options.
///
/// Every field has a default; negative `delta` requests the automatic
/// computation from the normalized costs, and non-positive `limit` or
/// `time_limit` disable the corresponding bound.
#[derive(Debug, Clone)]
pub struct SolverParams {
    /// Wall clock limit in seconds; non-positive disables the clock
    pub time_limit: f64,

    /// Outer iteration limit; zero runs no sweep, negative removes the
    /// bound
    pub limit: i64,

    /// Initial kappa
    pub kappa_min: f64,

    /// Kappa increment scale per iteration past warmup
    pub kappa_step: f64,

    /// Kappa ceiling; crossing it terminates the solve
    pub kappa_max: f64,

    /// Responsiveness of kappa to the remaining violation ratio
    pub alpha: f64,

    /// Preference decay; 0 erases history, 1 preserves it
    pub theta: f64,

    /// Base preference update magnitude; negative requests auto-computation
    pub delta: f64,

    /// Warmup iterations before kappa starts to grow
    pub w: i64,

    /// Per-sweep constraint ordering
    pub order: ConstraintOrder,

    /// Worker assignment seeding policy
    pub init_policy: InitPolicy,

    /// Fraction of positions flipped after seeding, in [0, 1]
    pub init_random: f64,

    /// Number of push phases after the first feasible assignment
    pub pushes_limit: i64,

    /// Kappa multiplier applied during an amplified push sweep
    pub pushing_k_factor: f64,

    /// Objective amplification applied during a push sweep
    pub pushing_objective_amplifier: f64,

    /// Ordinary sweeps after each amplified push sweep
    pub pushing_iteration_limit: i64,

    /// Number of parallel optimization workers
    pub thread: usize,

    /// Base RNG seed; `None` draws from entropy
    pub seed: Option<u64>,

    /// Forced-variable pre-affectation level
    pub preprocessor: PreprocessorLevel,

    /// Kernel floating point type
    pub float_type: FloatType,

    /// Multiplier state dumps
    pub observer: ObserverType,

    /// Per-row trace logging of the kernels
    pub debug: bool,

    /// Optimization mode flags
    pub mode: SolverMode,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            time_limit: -1.0,
            limit: 1000,
            kappa_min: 0.0,
            kappa_step: 1e-3,
            kappa_max: 0.6,
            alpha: 1.0,
            theta: 0.5,
            delta: -1.0,
            w: 20,
            order: ConstraintOrder::None,
            init_policy: InitPolicy::Bastert,
            init_random: 0.5,
            pushes_limit: 100,
            pushing_k_factor: 0.9,
            pushing_objective_amplifier: 5.0,
            pushing_iteration_limit: 20,
            thread: 1,
            seed: None,
            preprocessor: PreprocessorLevel::All,
            float_type: FloatType::Float64,
            observer: ObserverType::None,
            debug: false,
            mode: SolverMode::DEFAULT,
        }
    }
}

/// A rejected `key=value` assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadParam {
    /// The assignment as given on the command line
    pub assignment: String,
}

impl fmt::Display for BadParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown or malformed parameter `{}`", self.assignment)
    }
}

impl std::error::Error for BadParam {}

impl SolverParams {
    /// Apply one `key=value` assignment from the command line.
    pub fn assign(&mut self, assignment: &str) -> Result<(), BadParam> {
        let bad = || BadParam {
            assignment: assignment.to_string(),
        };

        let (key, value) = assignment.split_once('=').ok_or_else(bad)?;

        fn num<T: FromStr>(s: &str) -> Option<T> {
            s.trim().parse().ok()
        }

        match key.trim() {
            "time_limit" => self.time_limit = num(value).ok_or_else(bad)?,
            "limit" => self.limit = num(value).ok_or_else(bad)?,
            "kappa_min" => self.kappa_min = num(value).ok_or_else(bad)?,
            "kappa_step" => self.kappa_step = num(value).ok_or_else(bad)?,
            "kappa_max" => self.kappa_max = num(value).ok_or_else(bad)?,
            "alpha" => self.alpha = num(value).ok_or_else(bad)?,
            "theta" => self.theta = num(value).ok_or_else(bad)?,
            "delta" => self.delta = num(value).ok_or_else(bad)?,
            "w" => self.w = num(value).ok_or_else(bad)?,
            "order" => {
                self.order = match value.trim() {
                    "none" => ConstraintOrder::None,
                    "reversing" => ConstraintOrder::Reversing,
                    "random-sorting" | "random_sorting" => ConstraintOrder::RandomSorting,
                    "infeasibility-decr" | "infeasibility_decr" => {
                        ConstraintOrder::InfeasibilityDecr
                    }
                    "infeasibility-incr" | "infeasibility_incr" => {
                        ConstraintOrder::InfeasibilityIncr
                    }
                    "lagrangian-decr" | "lagrangian_decr" => ConstraintOrder::LagrangianDecr,
                    "lagrangian-incr" | "lagrangian_incr" => ConstraintOrder::LagrangianIncr,
                    "pi-sign-change" | "pi_sign_change" => ConstraintOrder::PiSignChange,
                    _ => return Err(bad()),
                }
            }
            "init_policy" => {
                self.init_policy = match value.trim() {
                    "bastert" => InitPolicy::Bastert,
                    "cycle" => InitPolicy::Cycle,
                    "crossover-cycle" | "crossover_cycle" => InitPolicy::CrossoverCycle,
                    "pessimistic-solve" | "pessimistic_solve" => InitPolicy::PessimisticSolve,
                    "optimistic-solve" | "optimistic_solve" => InitPolicy::OptimisticSolve,
                    _ => return Err(bad()),
                }
            }
            "init_random" => {
                let v: f64 = num(value).ok_or_else(bad)?;
                if !(0.0..=1.0).contains(&v) {
                    return Err(bad());
                }
                self.init_random = v;
            }
            "pushes_limit" => self.pushes_limit = num(value).ok_or_else(bad)?,
            "pushing_k_factor" => self.pushing_k_factor = num(value).ok_or_else(bad)?,
            "pushing_objective_amplifier" => {
                self.pushing_objective_amplifier = num(value).ok_or_else(bad)?
            }
            "pushing_iteration_limit" => {
                self.pushing_iteration_limit = num(value).ok_or_else(bad)?
            }
            "thread" => self.thread = num(value).ok_or_else(bad)?,
            "seed" => self.seed = Some(num(value).ok_or_else(bad)?),
            "preprocessor" => {
                self.preprocessor = match value.trim() {
                    "none" => PreprocessorLevel::None,
                    "all" => PreprocessorLevel::All,
                    _ => return Err(bad()),
                }
            }
            "float_type" => {
                self.float_type = match value.trim() {
                    "f32" | "float" => FloatType::Float32,
                    "f64" | "double" => FloatType::Float64,
                    "extended" | "long-double" => FloatType::Extended,
                    _ => return Err(bad()),
                }
            }
            "observer" => {
                self.observer = match value.trim() {
                    "none" => ObserverType::None,
                    "pnm" => ObserverType::Pnm,
                    "file" => ObserverType::File,
                    _ => return Err(bad()),
                }
            }
            "debug" => {
                self.debug = match value.trim() {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    _ => return Err(bad()),
                }
            }
            "mode" => {
                let mut mode = SolverMode(0);
                for part in value.split(',') {
                    mode = mode.union(match part.trim() {
                        "branch" => SolverMode::BRANCH,
                        "nlopt" => SolverMode::NLOPT,
                        "manual" => SolverMode::MANUAL,
                        "default" => SolverMode::DEFAULT,
                        _ => return Err(bad()),
                    });
                }
                self.mode = mode;
            }
            _ => return Err(bad()),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_numeric_and_enum_parameters() {
        let mut p = SolverParams::default();

        p.assign("kappa_min=0.2").unwrap();
        p.assign("limit=5000").unwrap();
        p.assign("order=random_sorting").unwrap();
        p.assign("init_policy=crossover_cycle").unwrap();
        p.assign("float_type=f32").unwrap();
        p.assign("thread=4").unwrap();

        assert_eq!(p.kappa_min, 0.2);
        assert_eq!(p.limit, 5000);
        assert_eq!(p.order, ConstraintOrder::RandomSorting);
        assert_eq!(p.init_policy, InitPolicy::CrossoverCycle);
        assert_eq!(p.float_type, FloatType::Float32);
        assert_eq!(p.thread, 4);
    }

    #[test]
    fn reject_bad_assignments() {
        let mut p = SolverParams::default();

        assert!(p.assign("kappa_min").is_err());
        assert!(p.assign("kappa_min=abc").is_err());
        assert!(p.assign("init_random=1.5").is_err());
        assert!(p.assign("order=unknown").is_err());
        assert!(p.assign("no_such_key=1").is_err());
    }

    #[test]
    fn mode_flags_combine() {
        let mut p = SolverParams::default();
        p.assign("mode=branch,manual").unwrap();

        assert!(p.mode.contains(SolverMode::BRANCH));
        assert!(p.mode.contains(SolverMode::MANUAL));
        assert!(!p.mode.contains(SolverMode::DEFAULT));
    }
}
