//! CPLEX LP text format reader and writer.
//!
//! The reader works on a whitespace token stream with in-token splitting:
//! `3x1`, `x1:` or `<=2` are single input tokens consumed piecewise.
//! Keywords are matched case-insensitively, `\` starts a comment line.

use std::collections::VecDeque;
use std::fmt::Write as _;

use rustc_hash::FxHashMap;

use crate::error::FileFormatError;
use crate::problem::{
    Constraint, ConstraintElement, Direction, Objective, ObjectiveElement, RawProblem, VarDomain,
    VarKind,
};

/// Comparison operator of a constraint or bound line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `<`, `<=`, `=<`
    Less,

    /// `>`, `>=`, `=>`, `==`
    Greater,

    /// `=`
    Equal,

    /// Placeholder; applying it to a bound is a no-op
    Undefined,
}

fn is_operator_char(c: char) -> bool {
    c == '<' || c == '>' || c == '='
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '"'
                | '#'
                | '$'
                | '%'
                | '&'
                | '('
                | ')'
                | ','
                | '.'
                | ';'
                | '?'
                | '@'
                | '_'
                | '{'
                | '}'
                | '~'
        )
}

struct TokenStream {
    tokens: VecDeque<(String, usize, usize)>,
    line: usize,
    column: usize,
    constraint_id: usize,
    variables: FxHashMap<String, usize>,
}

impl TokenStream {
    fn new(input: &str) -> Self {
        let mut tokens = VecDeque::new();

        for (line_no, line) in input.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with('\\') {
                continue;
            }

            let mut column = 0;
            for word in line.split_whitespace() {
                // Recover the column of this word in the source line.
                if let Some(at) = line[column..].find(word) {
                    column += at;
                }
                tokens.push_back((word.to_string(), line_no + 1, column + 1));
                column += word.len();
            }
        }

        Self {
            tokens,
            line: 0,
            column: 0,
            constraint_id: 0,
            variables: FxHashMap::default(),
        }
    }

    fn eof(&self) -> FileFormatError {
        FileFormatError::EndOfFile {
            line: self.line,
            column: self.column,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.tokens.front().and_then(|(t, _, _)| t.chars().next())
    }

    fn top(&mut self) -> Result<&str, FileFormatError> {
        match self.tokens.front() {
            Some((t, line, column)) => {
                self.line = *line;
                self.column = *column;
                Ok(t)
            }
            None => Err(self.eof()),
        }
    }

    fn pop(&mut self) -> Result<String, FileFormatError> {
        match self.tokens.pop_front() {
            Some((t, line, column)) => {
                self.line = line;
                self.column = column;
                Ok(t)
            }
            None => Err(self.eof()),
        }
    }

    fn push_front(&mut self, text: String) {
        self.tokens.push_front((text, self.line, self.column));
    }

    /// Drop the first `i` characters of the front token, removing the
    /// token entirely when exhausted.
    fn consume_front(&mut self, i: usize) {
        if let Some((t, _, column)) = self.tokens.front_mut() {
            if t.len() > i {
                *t = t[i..].to_string();
                *column += i;
            } else {
                self.tokens.pop_front();
            }
        }
    }

    fn front_equals(&self, at: usize, keyword: &str) -> bool {
        self.tokens
            .get(at)
            .map(|(t, _, _)| t.eq_ignore_ascii_case(keyword))
            .unwrap_or(false)
    }

    /// A section keyword is ahead: element reading must stop.
    fn is_topic(&self) -> bool {
        for kw in [
            "binary", "binaries", "bound", "bounds", "general", "end", "st", "st:",
        ] {
            if self.front_equals(0, kw) {
                return true;
            }
        }

        if self.front_equals(0, "subject")
            && (self.front_equals(1, "to") || self.front_equals(1, "to:"))
        {
            return true;
        }

        false
    }

    fn is_subject_to(&mut self) -> bool {
        if self.front_equals(0, "st") || self.front_equals(0, "st:") {
            let _ = self.pop();
            return true;
        }

        if self.front_equals(0, "subject") && self.front_equals(1, "to") && self.front_equals(2, ":")
        {
            let _ = self.pop();
            let _ = self.pop();
            let _ = self.pop();
            return true;
        }

        if (self.front_equals(0, "st") && self.front_equals(1, ":"))
            || (self.front_equals(0, "subject")
                && (self.front_equals(1, "to") || self.front_equals(1, "to:")))
        {
            let _ = self.pop();
            let _ = self.pop();
            return true;
        }

        false
    }

    fn is_keyword(&mut self, keywords: &[&str]) -> bool {
        for kw in keywords {
            if self.front_equals(0, kw) {
                let _ = self.pop();
                return true;
            }
        }
        false
    }

    /// True when the next lexeme is an integer, including a detached
    /// minus sign followed by digits.
    fn integer_ahead(&self) -> bool {
        let Some((front, _, _)) = self.tokens.front() else {
            return false;
        };
        let mut chars = front.chars();
        match chars.next() {
            Some(c) if c.is_ascii_digit() => true,
            Some('-') => match chars.next() {
                Some(c) => c.is_ascii_digit(),
                None => self
                    .tokens
                    .get(1)
                    .and_then(|(t, _, _)| t.chars().next())
                    .map(|c| c.is_ascii_digit())
                    .unwrap_or(false),
            },
            _ => false,
        }
    }

    fn variable(&mut self, vars: &mut crate::problem::Variables, name: &str) -> usize {
        if let Some(&id) = self.variables.get(name) {
            return id;
        }

        let id = vars.names.len();
        vars.names.push(name.to_string());
        vars.domains.push(VarDomain::default());
        self.variables.insert(name.to_string(), id);
        id
    }

    fn known_variable(&self, name: &str) -> Option<usize> {
        self.variables.get(name).copied()
    }
}

fn read_name(stack: &mut TokenStream) -> Result<String, FileFormatError> {
    let top = stack.top()?.to_string();
    let mut chars = top.chars();

    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => {
            return Err(FileFormatError::BadName {
                line: stack.line,
                column: stack.column,
            })
        }
    }

    let mut len = 1;
    for c in chars {
        if is_name_char(c) {
            len += 1;
        } else {
            break;
        }
    }

    let name = top[..len].to_string();
    stack.consume_front(len);
    Ok(name)
}

fn read_operator(stack: &mut TokenStream) -> Result<Operator, FileFormatError> {
    let top = stack.top()?.to_string();
    let mut chars = top.chars();
    let first = chars.next();
    let second = chars.next();

    let (op, len) = match (first, second) {
        (Some('<'), Some('=')) => (Operator::Less, 2),
        (Some('<'), _) => (Operator::Less, 1),
        (Some('>'), Some('=')) => (Operator::Greater, 2),
        (Some('>'), _) => (Operator::Greater, 1),
        (Some('='), Some('<')) => (Operator::Less, 2),
        (Some('='), Some('>')) => (Operator::Greater, 2),
        (Some('='), Some('=')) => (Operator::Greater, 2),
        (Some('='), _) => (Operator::Equal, 1),
        _ => {
            return Err(FileFormatError::BadOperator {
                line: stack.line,
                column: stack.column,
            })
        }
    };

    stack.consume_front(len);
    Ok(op)
}

fn read_integer(stack: &mut TokenStream) -> Result<i32, FileFormatError> {
    let mut text = stack.pop()?;
    let mut negative = false;

    if let Some(rest) = text.strip_prefix('-') {
        negative = true;
        text = if rest.is_empty() {
            stack.pop()?
        } else {
            rest.to_string()
        };
    }

    let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return Err(FileFormatError::BadInteger {
            line: stack.line,
            column: stack.column,
        });
    }

    let value: i64 = text[..digits]
        .parse()
        .map_err(|_| FileFormatError::BadInteger {
            line: stack.line,
            column: stack.column,
        })?;

    if value > i64::from(i32::MAX) {
        return Err(FileFormatError::BadInteger {
            line: stack.line,
            column: stack.column,
        });
    }

    if digits < text.len() {
        stack.push_front(text[digits..].to_string());
    }

    let value = value as i32;
    Ok(if negative { -value } else { value })
}

fn read_double(stack: &mut TokenStream) -> Result<f64, FileFormatError> {
    let mut text = stack.pop()?;
    let mut negative = false;

    if let Some(rest) = text.strip_prefix('-') {
        negative = true;
        text = if rest.is_empty() {
            stack.pop()?
        } else {
            rest.to_string()
        };
    }

    // The numeric prefix: digits, at most one dot, an optional exponent.
    let bytes = text.as_bytes();
    let mut len = 0;
    let mut seen_dot = false;
    while len < bytes.len() {
        let c = bytes[len] as char;
        if c.is_ascii_digit() {
            len += 1;
        } else if c == '.' && !seen_dot {
            seen_dot = true;
            len += 1;
        } else if (c == 'e' || c == 'E') && len > 0 {
            let mut end = len + 1;
            if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
                end += 1;
            }
            let exp_digits = bytes[end..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count();
            if exp_digits > 0 {
                len = end + exp_digits;
            }
            break;
        } else {
            break;
        }
    }

    if len == 0 {
        return Err(FileFormatError::BadNumber {
            line: stack.line,
            column: stack.column,
        });
    }

    let value: f64 = text[..len]
        .parse()
        .map_err(|_| FileFormatError::BadNumber {
            line: stack.line,
            column: stack.column,
        })?;

    if len < text.len() {
        stack.push_front(text[len..].to_string());
    }

    Ok(if negative { -value } else { value })
}

/// One `[sign] [coefficient] [name]` lexeme of a constraint body.
fn read_function_element(
    stack: &mut TokenStream,
    pb: &mut RawProblem,
) -> Result<(Option<usize>, i32), FileFormatError> {
    let mut negative = false;

    let text = stack.pop()?;
    if text.starts_with('-') || text.starts_with('+') {
        negative = text.starts_with('-');
        if text.len() > 1 {
            stack.push_front(text[1..].to_string());
        }
    } else {
        stack.push_front(text);
    }

    let mut factor = 1i32;
    if stack.peek_char().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        factor = read_integer(stack)?;
    }
    if negative {
        factor = -factor;
    }

    pb.coefficient.update(factor);

    if stack.is_topic() {
        return Ok((None, factor));
    }

    match stack.peek_char() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            let name = read_name(stack)?;
            let var = stack.variable(&mut pb.vars, &name);
            Ok((Some(var), factor))
        }
        _ => Ok((None, factor)),
    }
}

/// Same as [`read_function_element`] with a real coefficient.
fn read_objective_element(
    stack: &mut TokenStream,
    pb: &mut RawProblem,
) -> Result<(Option<usize>, f64), FileFormatError> {
    let mut negative = false;

    let text = stack.pop()?;
    if text.starts_with('-') || text.starts_with('+') {
        negative = text.starts_with('-');
        if text.len() > 1 {
            stack.push_front(text[1..].to_string());
        }
    } else {
        stack.push_front(text);
    }

    let mut factor = 1.0f64;
    if stack.peek_char().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        factor = read_double(stack)?;
    }
    if negative {
        factor = -factor;
    }

    if stack.is_topic() {
        return Ok((None, factor));
    }

    match stack.peek_char() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            let name = read_name(stack)?;
            let var = stack.variable(&mut pb.vars, &name);
            Ok((Some(var), factor))
        }
        _ => Ok((None, factor)),
    }
}

fn read_direction(stack: &mut TokenStream) -> Result<Direction, FileFormatError> {
    let word = stack.top()?.to_string();
    let alpha: String = word.chars().take_while(|c| c.is_ascii_alphabetic()).collect();

    let direction = if alpha.eq_ignore_ascii_case("maximize") {
        Direction::Maximize
    } else if alpha.eq_ignore_ascii_case("minimize") {
        Direction::Minimize
    } else {
        return Err(FileFormatError::BadObjectiveFunctionType {
            line: stack.line,
            column: stack.column,
        });
    };

    stack.consume_front(alpha.len());
    Ok(direction)
}

fn read_objective(stack: &mut TokenStream, pb: &mut RawProblem) -> Result<Objective, FileFormatError> {
    let mut objective = Objective::default();

    if stack.is_topic() {
        return Ok(objective);
    }

    // Skip an `obj:` style label.
    if matches!(stack.peek_char(), Some(c) if c.is_ascii_alphabetic() || c == '_') {
        let name = read_name(stack)?;
        if stack.peek_char() == Some(':') {
            stack.consume_front(1);
        } else {
            stack.push_front(name);
        }
    }

    while !stack.is_topic() {
        let (var, factor) = read_objective_element(stack, pb)?;
        match var {
            Some(var) => objective.elements.push(ObjectiveElement { factor, var }),
            None => objective.constant += factor,
        }
    }

    Ok(objective)
}

fn read_constraint(
    stack: &mut TokenStream,
    pb: &mut RawProblem,
) -> Result<(Constraint, Operator), FileFormatError> {
    let mut cst = Constraint::default();

    if matches!(stack.peek_char(), Some(c) if c.is_ascii_alphabetic() || c == '_') {
        let name = read_name(stack)?;
        if stack.peek_char() == Some(':') {
            cst.label = name;
            stack.consume_front(1);
        } else {
            let var = stack.variable(&mut pb.vars, &name);
            cst.elements.push(ConstraintElement { factor: 1, var });
        }
    }

    if stack.is_topic() {
        return Err(FileFormatError::BadConstraint {
            line: stack.line,
            column: stack.column,
        });
    }

    while !stack.peek_char().map(is_operator_char).unwrap_or(false) {
        if stack.is_topic() || stack.tokens.is_empty() {
            return Err(FileFormatError::BadConstraint {
                line: stack.line,
                column: stack.column,
            });
        }

        let (var, factor) = read_function_element(stack, pb)?;
        match var {
            Some(var) => cst.elements.push(ConstraintElement { factor, var }),
            None => {
                return Err(FileFormatError::BadConstraint {
                    line: stack.line,
                    column: stack.column,
                })
            }
        }
    }

    let operator = read_operator(stack)?;
    cst.value = read_integer(stack)?;

    Ok((cst, operator))
}

fn read_constraints(stack: &mut TokenStream, pb: &mut RawProblem) -> Result<(), FileFormatError> {
    while !stack.is_keyword_ahead() {
        let (mut cst, operator) = read_constraint(stack, pb)?;

        cst.id = stack.constraint_id;
        if cst.label.is_empty() {
            cst.label = format!("ct{}", stack.constraint_id);
        }
        stack.constraint_id += 1;

        match operator {
            Operator::Equal => pb.equal_constraints.push(cst),
            Operator::Greater => pb.greater_constraints.push(cst),
            Operator::Less => pb.less_constraints.push(cst),
            Operator::Undefined => {
                return Err(FileFormatError::BadConstraint {
                    line: stack.line,
                    column: stack.column,
                })
            }
        }
    }

    Ok(())
}

impl TokenStream {
    /// A section keyword terminating the constraint block is ahead.
    fn is_keyword_ahead(&self) -> bool {
        for kw in ["binary", "binaries", "bound", "bounds", "general", "end"] {
            if self.front_equals(0, kw) {
                return true;
            }
        }
        self.tokens.is_empty()
    }
}

fn apply_bound_left(value: i32, operator: Operator, domain: &mut VarDomain) {
    match operator {
        Operator::Greater => domain.max = value,
        Operator::Less => domain.min = value,
        Operator::Equal => {
            domain.min = value;
            domain.max = value;
        }
        Operator::Undefined => {}
    }
}

fn apply_bound_right(domain: &mut VarDomain, operator: Operator, value: i32) {
    match operator {
        Operator::Greater => domain.min = value,
        Operator::Less => domain.max = value,
        Operator::Equal => {
            domain.min = value;
            domain.max = value;
        }
        Operator::Undefined => {}
    }
}

fn read_bound(stack: &mut TokenStream, pb: &mut RawProblem) -> Result<(), FileFormatError> {
    match stack.peek_char() {
        Some(c) if c.is_ascii_digit() || c == '-' || c.is_ascii_alphabetic() || c == '_' => {}
        _ => {
            return Err(FileFormatError::BadBound {
                line: stack.line,
                column: stack.column,
            })
        }
    }

    if stack.integer_ahead() {
        // value op name [op value]
        let first = read_integer(stack)?;
        let first_op = read_operator(stack)?;
        let name = read_name(stack)?;
        let id = stack.variable(&mut pb.vars, &name);

        apply_bound_left(first, first_op, &mut pb.vars.domains[id]);

        if stack.peek_char().map(is_operator_char).unwrap_or(false) {
            let second_op = read_operator(stack)?;
            let second = read_integer(stack)?;
            apply_bound_right(&mut pb.vars.domains[id], second_op, second);
        }
    } else {
        // name op value
        let name = read_name(stack)?;
        let operator = read_operator(stack)?;
        let value = read_integer(stack)?;
        let id = stack.variable(&mut pb.vars, &name);
        apply_bound_right(&mut pb.vars.domains[id], operator, value);
    }

    Ok(())
}

fn read_bounds(stack: &mut TokenStream, pb: &mut RawProblem) -> Result<(), FileFormatError> {
    while !stack.tokens.is_empty()
        && !["binary", "binaries", "general", "end"]
            .iter()
            .any(|kw| stack.front_equals(0, kw))
    {
        read_bound(stack, pb)?;
    }
    Ok(())
}

fn read_binary(stack: &mut TokenStream, pb: &mut RawProblem) -> Result<(), FileFormatError> {
    while !stack.tokens.is_empty()
        && !["general", "end"].iter().any(|kw| stack.front_equals(0, kw))
    {
        let name = read_name(stack)?;

        match stack.known_variable(&name) {
            Some(id) if pb.vars.domains[id].kind == VarKind::Real => {
                pb.vars.domains[id] = VarDomain {
                    min: 0,
                    max: 1,
                    kind: VarKind::Binary,
                };
            }
            _ => {
                return Err(FileFormatError::UnknownVariable {
                    name,
                    line: stack.line,
                    column: stack.column,
                })
            }
        }
    }
    Ok(())
}

fn read_general(stack: &mut TokenStream, pb: &mut RawProblem) -> Result<(), FileFormatError> {
    while !stack.tokens.is_empty() && !stack.front_equals(0, "end") {
        let name = read_name(stack)?;

        match stack.known_variable(&name) {
            Some(id) if pb.vars.domains[id].kind == VarKind::Real => {
                pb.vars.domains[id].kind = VarKind::General;
            }
            _ => {
                return Err(FileFormatError::UnknownVariable {
                    name,
                    line: stack.line,
                    column: stack.column,
                })
            }
        }
    }
    Ok(())
}

/// Read a whole LP problem from `input`.
pub fn read_problem(input: &str) -> Result<RawProblem, FileFormatError> {
    let mut stack = TokenStream::new(input);
    let mut pb = RawProblem::default();

    pb.direction = read_direction(&mut stack)?;
    pb.objective = read_objective(&mut stack, &mut pb)?;

    if stack.is_subject_to() {
        read_constraints(&mut stack, &mut pb)?;
    }

    if stack.is_keyword(&["bound", "bounds"]) {
        read_bounds(&mut stack, &mut pb)?;
    }

    if stack.is_keyword(&["binary", "binaries"]) {
        read_binary(&mut stack, &mut pb)?;
    }

    if stack.is_keyword(&["general"]) {
        read_general(&mut stack, &mut pb)?;
    }

    if pb.num_vars() > i32::MAX as usize {
        return Err(FileFormatError::TooManyVariables);
    }

    if stack.is_keyword(&["end"]) && stack.tokens.is_empty() {
        return Ok(pb);
    }

    Err(FileFormatError::Incomplete {
        missing: "end",
        line: stack.line,
        column: stack.column,
    })
}

/// Print a problem back in LP format.
///
/// Reading the output yields a problem with the same merged constraints
/// and the same classification.
pub fn write_problem(pb: &RawProblem) -> String {
    let mut out = String::new();

    match pb.direction {
        Direction::Minimize => out.push_str("minimize\n"),
        Direction::Maximize => out.push_str("maximize\n"),
    }

    out.push_str(" obj:");
    for e in &pb.objective.elements {
        if e.factor >= 0.0 {
            let _ = write!(out, " + {} {}", e.factor, pb.vars.names[e.var]);
        } else {
            let _ = write!(out, " - {} {}", -e.factor, pb.vars.names[e.var]);
        }
    }
    if pb.objective.constant != 0.0 {
        let _ = write!(out, " + {}", pb.objective.constant);
    }
    out.push('\n');

    out.push_str("subject to\n");
    let mut write_cst = |cst: &Constraint, op: &str| {
        let _ = write!(out, " {}:", cst.label);
        for e in &cst.elements {
            if e.factor >= 0 {
                let _ = write!(out, " + {} {}", e.factor, pb.vars.names[e.var]);
            } else {
                let _ = write!(out, " - {} {}", -e.factor, pb.vars.names[e.var]);
            }
        }
        let _ = writeln!(out, " {op} {}", cst.value);
    };

    for cst in &pb.equal_constraints {
        write_cst(cst, "=");
    }
    for cst in &pb.greater_constraints {
        write_cst(cst, ">=");
    }
    for cst in &pb.less_constraints {
        write_cst(cst, "<=");
    }

    let generals: Vec<usize> = (0..pb.vars.len())
        .filter(|&j| pb.vars.domains[j].kind == VarKind::General)
        .collect();

    if !generals.is_empty() {
        out.push_str("bounds\n");
        for &j in &generals {
            let d = pb.vars.domains[j];
            let _ = writeln!(out, " {} <= {} <= {}", d.min, pb.vars.names[j], d.max);
        }
    }

    let binaries: Vec<usize> = (0..pb.vars.len())
        .filter(|&j| pb.vars.domains[j].kind == VarKind::Binary)
        .collect();

    if !binaries.is_empty() {
        out.push_str("binary\n");
        for &j in &binaries {
            let _ = writeln!(out, " {}", pb.vars.names[j]);
        }
    }

    if !generals.is_empty() {
        out.push_str("general\n");
        for &j in &generals {
            let _ = writeln!(out, " {}", pb.vars.names[j]);
        }
    }

    out.push_str("end\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::CoeffClass;

    #[test]
    fn minimal_problem() {
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

        assert_eq!(pb.direction, Direction::Minimize);
        assert_eq!(pb.num_vars(), 2);
        assert_eq!(pb.equal_constraints.len(), 1);
        assert_eq!(pb.equal_constraints[0].label, "ct0");
        assert_eq!(pb.equal_constraints[0].value, 1);
        assert_eq!(pb.coefficient, CoeffClass::Binary);
        assert!(pb
            .vars
            .domains
            .iter()
            .all(|d| d.kind == VarKind::Binary && d.min == 0 && d.max == 1));
    }

    #[test]
    fn glued_tokens_and_implicit_coefficients() {
        let pb = read_problem(
            "maximize\n\
             obj: 2x1 -0.5x2\n\
             st\n\
             3x1+2x2<=4\n\
             -x1 >= -1\n\
             binary\n\
             x1 x2\n\
             end\n",
        )
        .unwrap();

        assert_eq!(pb.direction, Direction::Maximize);
        assert_eq!(pb.objective.elements.len(), 2);
        assert_eq!(pb.objective.elements[1].factor, -0.5);
        assert_eq!(pb.less_constraints.len(), 1);
        assert_eq!(pb.greater_constraints.len(), 1);
        assert_eq!(pb.less_constraints[0].elements[0].factor, 3);
        assert_eq!(pb.greater_constraints[0].elements[0].factor, -1);
        assert_eq!(pb.coefficient, CoeffClass::Integer);
    }

    #[test]
    fn operators_map_like_the_reference_reader() {
        let pb = read_problem(
            "minimize\n\
             x1 + x2 + x3 + x4\n\
             st\n\
             x1 =< 1\n\
             x2 => 0\n\
             x3 == 1\n\
             x4 < 1\n\
             binary\n\
             x1 x2 x3 x4\n\
             end\n",
        )
        .unwrap();

        assert_eq!(pb.less_constraints.len(), 2);
        // `=>` and `==` both land in the greater list.
        assert_eq!(pb.greater_constraints.len(), 2);
        assert_eq!(pb.equal_constraints.len(), 0);
    }

    #[test]
    fn bounds_and_general_block() {
        let pb = read_problem(
            "minimize\n\
             x + y\n\
             st\n\
             x + 2y >= 2\n\
             bounds\n\
             0 <= x <= 3\n\
             y <= 5\n\
             general\n\
             x y\n\
             end\n",
        )
        .unwrap();

        let x = pb.vars.names.iter().position(|n| n == "x").unwrap();
        let y = pb.vars.names.iter().position(|n| n == "y").unwrap();

        assert_eq!(pb.vars.domains[x].min, 0);
        assert_eq!(pb.vars.domains[x].max, 3);
        assert_eq!(pb.vars.domains[y].max, 5);
        assert_eq!(pb.vars.domains[x].kind, VarKind::General);
        assert_eq!(pb.vars.domains[y].kind, VarKind::General);
    }

    #[test]
    fn comments_and_constant_in_objective() {
        let pb = read_problem(
            "\\ a comment line\n\
             minimize\n\
             x1 + 3 + x2\n\
             \\ another comment\n\
             st\n\
             c1: x1 + x2 >= 1\n\
             binary\n\
             x1 x2\n\
             end\n",
        )
        .unwrap();

        assert_eq!(pb.objective.constant, 3.0);
        assert_eq!(pb.greater_constraints[0].label, "c1");
    }

    #[test]
    fn binary_block_rejects_unknown_names() {
        let err = read_problem(
            "minimize\n\
             x1\n\
             st\n\
             x1 >= 1\n\
             binary\n\
             x1 x9\n\
             end\n",
        )
        .unwrap_err();

        assert!(matches!(err, FileFormatError::UnknownVariable { .. }));
    }

    #[test]
    fn malformed_bound_line() {
        let err = read_problem(
            "minimize\n\
             x1\n\
             st\n\
             x1 >= 1\n\
             bounds\n\
             <= 3\n\
             end\n",
        )
        .unwrap_err();

        assert!(matches!(err, FileFormatError::BadBound { .. }));
    }

    #[test]
    fn missing_end_is_incomplete() {
        let err = read_problem(
            "minimize\n\
             x1\n\
             st\n\
             x1 >= 1\n\
             binary\n\
             x1\n",
        )
        .unwrap_err();

        assert!(matches!(err, FileFormatError::Incomplete { .. }));
    }

    #[test]
    fn bad_objective_header() {
        let err = read_problem("optimize\nx1\nend\n").unwrap_err();
        assert!(matches!(
            err,
            FileFormatError::BadObjectiveFunctionType { .. }
        ));
    }

    #[test]
    fn round_trip_preserves_structure() {
        let pb = read_problem(
            "maximize\n\
             obj: 2 x1 - x2 + x3\n\
             subject to\n\
             a: x1 - x2 + x3 <= 1\n\
             b: - x1 + x2 <= 0\n\
             binary\n\
             x1 x2 x3\n\
             end\n",
        )
        .unwrap();

        let text = write_problem(&pb);
        let again = read_problem(&text).unwrap();

        assert_eq!(again.direction, pb.direction);
        assert_eq!(again.num_vars(), pb.num_vars());
        assert_eq!(again.coefficient, pb.coefficient);
        assert_eq!(again.less_constraints.len(), pb.less_constraints.len());

        let merged_a = crate::merge::make_merged_constraints(&pb).unwrap();
        let merged_b = crate::merge::make_merged_constraints(&again).unwrap();
        assert_eq!(merged_a, merged_b);
    }
}
