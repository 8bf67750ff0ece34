//! State labels and reachability formulas.
//!
//! Atomic propositions are referenced by name in a [`Formula`] and compiled
//! against the label list of a model into a [`StateFormula`], a predicate over
//! the [`StateFormulaSet`] of a state.

use std::fmt;

use crate::error::{ModelError, QueryError};

/// Maximum number of state formulas (labels) a model can declare.
pub const MAX_STATE_FORMULAS: usize = 32;

/// Fails if a model declares more labels than a [`StateFormulaSet`] can hold.
pub fn check_state_formula_labels(labels: &[String]) -> Result<(), ModelError> {
    if labels.len() > MAX_STATE_FORMULAS {
        return Err(ModelError::CapacityExceeded {
            resource: "state formulas",
            capacity: MAX_STATE_FORMULAS,
        });
    }
    Ok(())
}

/// The set of labels satisfied by a state, as a bit mask.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct StateFormulaSet(u32);

impl StateFormulaSet {
    pub const EMPTY: StateFormulaSet = StateFormulaSet(0);

    /// Creates a set in which label `i` holds iff `values[i]`.
    ///
    /// # Panics
    ///
    /// Panics if more than [`MAX_STATE_FORMULAS`] values are given.
    pub fn from_bools(values: &[bool]) -> Self {
        assert!(
            values.len() <= MAX_STATE_FORMULAS,
            "At most {} state formulas are supported, got {}",
            MAX_STATE_FORMULAS,
            values.len()
        );
        let bits = values
            .iter()
            .enumerate()
            .filter(|(_, &v)| v)
            .fold(0u32, |acc, (i, _)| acc | (1 << i));
        StateFormulaSet(bits)
    }

    pub fn from_bits(bits: u32) -> Self {
        StateFormulaSet(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, index: usize) -> bool {
        index < MAX_STATE_FORMULAS && (self.0 >> index) & 1 == 1
    }

    pub fn with(self, index: usize) -> Self {
        assert!(index < MAX_STATE_FORMULAS, "Label index {} is too large", index);
        StateFormulaSet(self.0 | (1 << index))
    }

    /// Indices of the satisfied labels, in increasing order.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..MAX_STATE_FORMULAS).filter(move |&i| self.contains(i))
    }
}

impl fmt::Display for StateFormulaSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (k, i) in self.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", i)?;
        }
        write!(f, "}}")
    }
}

/// A formula over state labels, optionally wrapped in a reachability operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    Label(String),
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    /// Eventually.
    Finally(Box<Formula>),
    /// Eventually, within the given number of steps.
    BoundedFinally(Box<Formula>, usize),
}

impl Formula {
    pub fn label(name: impl Into<String>) -> Self {
        Formula::Label(name.into())
    }

    pub fn not(value: Self) -> Self {
        match value {
            Formula::Not(inner) => *inner,
            _ => Formula::Not(Box::new(value)),
        }
    }

    pub fn and(lhs: Self, rhs: Self) -> Self {
        Formula::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: Self, rhs: Self) -> Self {
        Formula::Or(Box::new(lhs), Box::new(rhs))
    }

    pub fn finally(value: Self) -> Self {
        Formula::Finally(Box::new(value))
    }

    pub fn bounded_finally(value: Self, steps: usize) -> Self {
        Formula::BoundedFinally(Box::new(value), steps)
    }

    /// Returns `true` if the formula contains no temporal operator.
    pub fn is_state_formula(&self) -> bool {
        match self {
            Formula::Label(_) => true,
            Formula::Not(a) => a.is_state_formula(),
            Formula::And(a, b) | Formula::Or(a, b) => a.is_state_formula() && b.is_state_formula(),
            Formula::Finally(_) | Formula::BoundedFinally(_, _) => false,
        }
    }

    /// Compiles a state formula against the label names of a model.
    pub fn compile(&self, labels: &[String]) -> Result<StateFormula, QueryError> {
        Ok(match self {
            Formula::Label(name) => {
                let index = labels
                    .iter()
                    .position(|l| l == name)
                    .ok_or_else(|| QueryError::UnknownLabel(name.clone()))?;
                if index >= MAX_STATE_FORMULAS {
                    return Err(QueryError::Unsupported(format!(
                        "label '{}' has index {}, but only {} state formulas are supported",
                        name, index, MAX_STATE_FORMULAS
                    )));
                }
                StateFormula::Label(index)
            }
            Formula::Not(a) => StateFormula::Not(Box::new(a.compile(labels)?)),
            Formula::And(a, b) => StateFormula::And(Box::new(a.compile(labels)?), Box::new(b.compile(labels)?)),
            Formula::Or(a, b) => StateFormula::Or(Box::new(a.compile(labels)?), Box::new(b.compile(labels)?)),
            Formula::Finally(_) | Formula::BoundedFinally(_, _) => {
                return Err(QueryError::Unsupported(format!("nested temporal operator in '{}'", self)));
            }
        })
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Label(name) => write!(f, "{}", name),
            Formula::Not(a) => write!(f, "!{}", a),
            Formula::And(a, b) => write!(f, "({} & {})", a, b),
            Formula::Or(a, b) => write!(f, "({} | {})", a, b),
            Formula::Finally(a) => write!(f, "F {}", a),
            Formula::BoundedFinally(a, k) => write!(f, "F<={} {}", k, a),
        }
    }
}

/// A compiled state formula: label names are resolved to label indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateFormula {
    Label(usize),
    Not(Box<StateFormula>),
    And(Box<StateFormula>, Box<StateFormula>),
    Or(Box<StateFormula>, Box<StateFormula>),
}

impl StateFormula {
    pub fn evaluate(&self, labels: StateFormulaSet) -> bool {
        match self {
            StateFormula::Label(i) => labels.contains(*i),
            StateFormula::Not(a) => !a.evaluate(labels),
            StateFormula::And(a, b) => a.evaluate(labels) && b.evaluate(labels),
            StateFormula::Or(a, b) => a.evaluate(labels) || b.evaluate(labels),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn labels() -> Vec<String> {
        vec!["label1".to_string(), "label2".to_string()]
    }

    #[test]
    fn test_formula_set() {
        let set = StateFormulaSet::from_bools(&[true, false, true]);
        assert!(set.contains(0));
        assert!(!set.contains(1));
        assert!(set.contains(2));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(set.to_string(), "{0, 2}");
        assert_eq!(StateFormulaSet::EMPTY.with(1).bits(), 2);
    }

    #[test]
    fn test_compile_and_evaluate() {
        let f = Formula::and(Formula::label("label1"), Formula::not(Formula::label("label2")));
        let compiled = f.compile(&labels()).unwrap();
        assert!(compiled.evaluate(StateFormulaSet::from_bools(&[true, false])));
        assert!(!compiled.evaluate(StateFormulaSet::from_bools(&[true, true])));
        assert!(!compiled.evaluate(StateFormulaSet::EMPTY));

        let g = Formula::or(Formula::label("label1"), Formula::label("label2"));
        assert!(g.compile(&labels()).unwrap().evaluate(StateFormulaSet::from_bools(&[false, true])));
    }

    #[test]
    fn test_unknown_label() {
        let f = Formula::label("nope");
        assert_eq!(f.compile(&labels()), Err(QueryError::UnknownLabel("nope".to_string())));
    }

    #[test]
    fn test_too_many_labels() {
        let labels: Vec<String> = (0..=MAX_STATE_FORMULAS).map(|i| format!("l{}", i)).collect();
        assert_eq!(
            check_state_formula_labels(&labels),
            Err(ModelError::CapacityExceeded {
                resource: "state formulas",
                capacity: MAX_STATE_FORMULAS
            })
        );
        assert!(check_state_formula_labels(&labels[..MAX_STATE_FORMULAS]).is_ok());

        assert!(Formula::label("l31").compile(&labels).is_ok());
        let last = Formula::not(Formula::label("l32"));
        assert!(matches!(last.compile(&labels), Err(QueryError::Unsupported(_))));
    }

    #[test]
    fn test_double_negation() {
        let f = Formula::not(Formula::not(Formula::label("a")));
        assert_eq!(f, Formula::label("a"));
    }

    #[test]
    fn test_state_formula_detection() {
        assert!(Formula::label("a").is_state_formula());
        assert!(!Formula::finally(Formula::label("a")).is_state_formula());
        let nested = Formula::not(Formula::finally(Formula::label("label1")));
        assert!(!nested.is_state_formula());
        assert!(matches!(nested.compile(&labels()), Err(QueryError::Unsupported(_))));
        assert_eq!(Formula::bounded_finally(Formula::label("a"), 3).to_string(), "F<=3 a");
    }
}
