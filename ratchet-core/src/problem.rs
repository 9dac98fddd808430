//! Problem data structures and validation.
//!
//! A [`RawProblem`] is the direct image of an LP file (or of API calls):
//! an objective, three typed constraint lists and the variable table.
//! Validation and family classification live here; the merged form the
//! kernels consume is built in [`crate::merge`].

use serde::Serialize;

use crate::error::ProblemError;

/// Optimization direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Minimize the objective
    #[default]
    Minimize,

    /// Maximize the objective
    Maximize,
}

impl Direction {
    /// True when `candidate` improves on `incumbent` under this direction.
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Direction::Minimize => candidate < incumbent,
            Direction::Maximize => candidate > incumbent,
        }
    }

    /// The worst representable objective value under this direction.
    pub fn worst(self) -> f64 {
        match self {
            Direction::Minimize => f64::INFINITY,
            Direction::Maximize => f64::NEG_INFINITY,
        }
    }
}

/// Declared kind of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarKind {
    /// Declared without a `binary`/`general` block entry
    #[default]
    Real,

    /// 0/1 variable
    Binary,

    /// Bounded general integer
    General,
}

/// Domain of one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarDomain {
    /// Lower bound
    pub min: i32,

    /// Upper bound
    pub max: i32,

    /// Declared kind
    pub kind: VarKind,
}

impl Default for VarDomain {
    fn default() -> Self {
        Self {
            min: 0,
            max: i32::MAX,
            kind: VarKind::Real,
        }
    }
}

/// The variable table: parallel names and domains.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    /// Variable names, in declaration order
    pub names: Vec<String>,

    /// Variable domains, parallel to `names`
    pub domains: Vec<VarDomain>,
}

impl Variables {
    /// Number of variables.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when no variable is declared.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One linear objective element `factor * var`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectiveElement {
    /// Real coefficient
    pub factor: f64,

    /// Variable index
    pub var: usize,
}

/// One quadratic objective element `factor * var_a * var_b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadElement {
    /// Real coefficient
    pub factor: f64,

    /// First variable index
    pub var_a: usize,

    /// Second variable index
    pub var_b: usize,
}

/// The objective function: a constant plus linear and quadratic parts.
#[derive(Debug, Clone, Default)]
pub struct Objective {
    /// Constant term
    pub constant: f64,

    /// Linear elements
    pub elements: Vec<ObjectiveElement>,

    /// Quadratic elements; empty for linear problems
    pub qelements: Vec<QuadElement>,
}

/// One constraint element `factor * var` with an integer factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintElement {
    /// Integer coefficient
    pub factor: i32,

    /// Variable index
    pub var: usize,
}

/// One typed constraint row.
#[derive(Debug, Clone, Default)]
pub struct Constraint {
    /// Label from the LP file, or a generated `ct<n>`
    pub label: String,

    /// Declaration order across all three lists
    pub id: usize,

    /// Left-hand side elements
    pub elements: Vec<ConstraintElement>,

    /// Right-hand side
    pub value: i32,
}

/// Assignments fixed before solving (by the preprocessor).
#[derive(Debug, Clone, Default)]
pub struct AffectedVars {
    /// Names of the fixed variables
    pub names: Vec<String>,

    /// Fixed values, parallel to `names`
    pub values: Vec<bool>,
}

impl AffectedVars {
    /// Record one fixed variable.
    pub fn push(&mut self, name: String, value: bool) {
        self.names.push(name);
        self.values.push(value);
    }

    /// Number of fixed variables.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when no variable was fixed.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Coefficient class observed over all constraint elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CoeffClass {
    /// All factors in {0, 1}
    #[default]
    Binary,

    /// All factors in {-1, 0, 1}
    Ternary,

    /// Some |factor| > 1
    Integer,
}

impl CoeffClass {
    /// Widen the class to cover `factor`.
    pub fn update(&mut self, factor: i32) {
        if factor < -1 || factor > 1 {
            *self = CoeffClass::Integer;
        } else if factor == -1 && *self == CoeffClass::Binary {
            *self = CoeffClass::Ternary;
        }
    }
}

/// Which specialized kernel family a problem belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemFamily {
    /// Equality rows only, factors in {0, 1}
    Equalities01,

    /// Equality rows only, factors in {-1, 0, 1}
    Equalities101,

    /// Equality rows only, general integer factors
    EqualitiesZ,

    /// Mixed rows, factors in {0, 1}
    Inequalities01,

    /// Mixed rows, factors in {-1, 0, 1}
    Inequalities101,

    /// Mixed rows, general integer factors
    InequalitiesZ,
}

impl std::fmt::Display for ProblemFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProblemFamily::Equalities01 => "equalities-01",
            ProblemFamily::Equalities101 => "equalities-101",
            ProblemFamily::EqualitiesZ => "equalities-Z",
            ProblemFamily::Inequalities01 => "inequalities-01",
            ProblemFamily::Inequalities101 => "inequalities-101",
            ProblemFamily::InequalitiesZ => "inequalities-Z",
        };
        write!(f, "{name}")
    }
}

/// A problem as parsed from an LP stream or built through the API.
#[derive(Debug, Clone, Default)]
pub struct RawProblem {
    /// Optimization direction
    pub direction: Direction,

    /// Objective function
    pub objective: Objective,

    /// Variable table
    pub vars: Variables,

    /// `=` rows
    pub equal_constraints: Vec<Constraint>,

    /// `>=` rows
    pub greater_constraints: Vec<Constraint>,

    /// `<=` rows
    pub less_constraints: Vec<Constraint>,

    /// Variables fixed by the preprocessor
    pub affected_vars: AffectedVars,

    /// Coefficient class tracked while parsing
    pub coefficient: CoeffClass,
}

impl RawProblem {
    /// Number of variables.
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Number of constraints across the three lists.
    pub fn num_constraints(&self) -> usize {
        self.equal_constraints.len() + self.greater_constraints.len() + self.less_constraints.len()
    }

    /// Iterate over every constraint of the three lists.
    pub fn all_constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.equal_constraints
            .iter()
            .chain(self.greater_constraints.iter())
            .chain(self.less_constraints.iter())
    }

    /// Kernel family, derived from the coefficient class and the
    /// presence of both `>=` and `<=` rows. A problem bounded on one
    /// side only stays in the equalities families.
    pub fn family(&self) -> ProblemFamily {
        let mixed = !self.greater_constraints.is_empty() && !self.less_constraints.is_empty();

        match (mixed, self.coefficient) {
            (false, CoeffClass::Binary) => ProblemFamily::Equalities01,
            (false, CoeffClass::Ternary) => ProblemFamily::Equalities101,
            (false, CoeffClass::Integer) => ProblemFamily::EqualitiesZ,
            (true, CoeffClass::Binary) => ProblemFamily::Inequalities01,
            (true, CoeffClass::Ternary) => ProblemFamily::Inequalities101,
            (true, CoeffClass::Integer) => ProblemFamily::InequalitiesZ,
        }
    }

    /// Recompute the coefficient class from the constraint lists.
    ///
    /// The parser tracks the class on the fly; problems built through the
    /// API call this once before solving.
    pub fn reclassify(&mut self) {
        let mut class = CoeffClass::Binary;
        for cst in self.all_constraints() {
            for e in &cst.elements {
                class.update(e.factor);
            }
        }
        self.coefficient = class;
    }

    /// Validate the problem definition.
    pub fn validate(&self) -> Result<(), ProblemError> {
        if self.vars.is_empty() {
            return Err(ProblemError::EmptyVariables);
        }

        if self.objective.elements.is_empty() && self.objective.qelements.is_empty() {
            return Err(ProblemError::EmptyObjective);
        }

        for (name, domain) in self.vars.names.iter().zip(&self.vars.domains) {
            if domain.min > domain.max {
                return Err(ProblemError::BadBound {
                    name: name.clone(),
                    min: domain.min,
                    max: domain.max,
                });
            }
        }

        let mut used = vec![false; self.num_vars()];
        for cst in self.all_constraints() {
            for e in &cst.elements {
                used[e.var] = true;
            }
        }

        if let Some(unused) = used.iter().position(|&u| !u) {
            return Err(ProblemError::VariableNotUsed(
                self.vars.names[unused].clone(),
            ));
        }

        Ok(())
    }

    /// Bounds of the objective over all 0/1 assignments, ignoring
    /// constraints. Printed in the problem statistics block.
    pub fn objective_range(&self) -> (f64, f64) {
        let mut lo = self.objective.constant;
        let mut hi = self.objective.constant;

        for e in &self.objective.elements {
            if e.factor < 0.0 {
                lo += e.factor;
            } else {
                hi += e.factor;
            }
        }

        for q in &self.objective.qelements {
            if q.factor < 0.0 {
                lo += q.factor;
            } else {
                hi += q.factor;
            }
        }

        (lo, hi)
    }

    /// Statistics printed when a problem is loaded.
    pub fn summary(&self) -> ProblemSummary {
        let mut real = 0;
        let mut binary = 0;
        let mut general = 0;

        for d in &self.vars.domains {
            match d.kind {
                VarKind::Real => real += 1,
                VarKind::Binary => binary += 1,
                VarKind::General => general += 1,
            }
        }

        let (objective_min, objective_max) = self.objective_range();

        ProblemSummary {
            variables: self.num_vars(),
            real,
            binary,
            general,
            equal_constraints: self.equal_constraints.len(),
            greater_constraints: self.greater_constraints.len(),
            less_constraints: self.less_constraints.len(),
            family: self.family().to_string(),
            objective_min,
            objective_max,
        }
    }
}

/// Problem statistics, serializable for the CLI JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct ProblemSummary {
    /// Total variable count
    pub variables: usize,

    /// Variables without a kind declaration
    pub real: usize,

    /// Binary variables
    pub binary: usize,

    /// General integer variables
    pub general: usize,

    /// `=` row count
    pub equal_constraints: usize,

    /// `>=` row count
    pub greater_constraints: usize,

    /// `<=` row count
    pub less_constraints: usize,

    /// Kernel family tag
    pub family: String,

    /// Lower bound of the objective over the hypercube
    pub objective_min: f64,

    /// Upper bound of the objective over the hypercube
    pub objective_max: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_var_problem() -> RawProblem {
        let mut pb = RawProblem {
            direction: Direction::Minimize,
            ..Default::default()
        };

        pb.vars.names = vec!["x1".into(), "x2".into()];
        pb.vars.domains = vec![
            VarDomain {
                min: 0,
                max: 1,
                kind: VarKind::Binary,
            };
            2
        ];
        pb.objective.elements = vec![
            ObjectiveElement { factor: 1.0, var: 0 },
            ObjectiveElement { factor: 1.0, var: 1 },
        ];
        pb.equal_constraints.push(Constraint {
            label: "ct0".into(),
            id: 0,
            elements: vec![
                ConstraintElement { factor: 1, var: 0 },
                ConstraintElement { factor: 1, var: 1 },
            ],
            value: 1,
        });
        pb.reclassify();
        pb
    }

    #[test]
    fn classification() {
        let mut pb = two_var_problem();
        assert_eq!(pb.family(), ProblemFamily::Equalities01);

        pb.equal_constraints[0].elements[0].factor = -1;
        pb.reclassify();
        assert_eq!(pb.family(), ProblemFamily::Equalities101);

        // One-sided inequality rows keep the equalities families: the
        // inequalities tag needs both `>=` and `<=` rows.
        pb.less_constraints.push(Constraint {
            label: "ct1".into(),
            id: 1,
            elements: vec![ConstraintElement { factor: 3, var: 1 }],
            value: 2,
        });
        pb.reclassify();
        assert_eq!(pb.family(), ProblemFamily::EqualitiesZ);

        pb.greater_constraints.push(Constraint {
            label: "ct2".into(),
            id: 2,
            elements: vec![ConstraintElement { factor: 1, var: 0 }],
            value: 0,
        });
        pb.reclassify();
        assert_eq!(pb.family(), ProblemFamily::InequalitiesZ);
    }

    #[test]
    fn greater_rows_alone_stay_in_the_equalities_families() {
        let mut pb = two_var_problem();
        pb.equal_constraints.clear();
        pb.greater_constraints.push(Constraint {
            label: "ct1".into(),
            id: 1,
            elements: vec![
                ConstraintElement { factor: 1, var: 0 },
                ConstraintElement { factor: 1, var: 1 },
            ],
            value: 1,
        });
        pb.reclassify();

        assert_eq!(pb.family(), ProblemFamily::Equalities01);
    }

    #[test]
    fn validation_catches_unused_variable() {
        let mut pb = two_var_problem();
        pb.vars.names.push("x3".into());
        pb.vars.domains.push(VarDomain {
            min: 0,
            max: 1,
            kind: VarKind::Binary,
        });

        match pb.validate() {
            Err(ProblemError::VariableNotUsed(name)) => assert_eq!(name, "x3"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn validation_catches_bad_bound() {
        let mut pb = two_var_problem();
        pb.vars.domains[1] = VarDomain {
            min: 3,
            max: 1,
            kind: VarKind::General,
        };

        assert!(matches!(pb.validate(), Err(ProblemError::BadBound { .. })));
    }

    #[test]
    fn objective_range_over_hypercube() {
        let mut pb = two_var_problem();
        pb.objective.constant = 1.0;
        pb.objective.elements[1].factor = -2.0;

        let (lo, hi) = pb.objective_range();
        assert_eq!(lo, -1.0);
        assert_eq!(hi, 2.0);
    }
}
