//! Value types shared by every layer: probabilities, choice kinds and query results.

use std::fmt;
use std::ops::{Add, Mul};

/// Absolute tolerance used when comparing probabilities that should sum to one.
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// A probability value in `[0, 1]`.
///
/// The newtype keeps probabilities from being mixed up with arbitrary `f64`s
/// (rewards, indices turned into floats, etc).
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Default)]
pub struct Probability(f64);

impl Probability {
    pub const ZERO: Probability = Probability(0.0);
    pub const ONE: Probability = Probability(1.0);

    /// Creates a new probability.
    ///
    /// # Panics
    ///
    /// Panics if `value` is NaN or lies outside `[0, 1]` by more than the tolerance.
    pub fn new(value: f64) -> Self {
        assert!(
            !value.is_nan() && value >= -PROBABILITY_TOLERANCE && value <= 1.0 + PROBABILITY_TOLERANCE,
            "Probability {} is out of range",
            value
        );
        Probability(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn complement(self) -> Self {
        Probability(1.0 - self.0)
    }

    /// Returns `true` if the value is within `tolerance` of `expected`.
    pub fn is(self, expected: f64, tolerance: f64) -> bool {
        (self.0 - expected).abs() <= tolerance
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }

    pub fn is_one(self) -> bool {
        self.is(1.0, PROBABILITY_TOLERANCE)
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Probability> for f64 {
    fn from(p: Probability) -> Self {
        p.0
    }
}

impl Mul for Probability {
    type Output = Probability;

    fn mul(self, rhs: Self) -> Self::Output {
        Probability(self.0 * rhs.0)
    }
}

impl Add for Probability {
    type Output = Probability;

    fn add(self, rhs: Self) -> Self::Output {
        Probability(self.0 + rhs.0)
    }
}

/// Lower and upper bound of a probability over all schedulers.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ProbabilityRange {
    pub min: Probability,
    pub max: Probability,
}

impl ProbabilityRange {
    pub fn new(min: Probability, max: Probability) -> Self {
        assert!(min.value() <= max.value() + PROBABILITY_TOLERANCE, "Range [{}, {}] is inverted", min, max);
        ProbabilityRange { min, max }
    }

    pub fn exact(p: Probability) -> Self {
        ProbabilityRange { min: p, max: p }
    }

    pub fn is_exact(&self) -> bool {
        self.min == self.max
    }
}

impl fmt::Display for ProbabilityRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Result of an expected-reward query.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RewardResult {
    pub value: f64,
}

/// How a continuation was split.
///
/// A continuation that has not been split (yet) is `UnsplitOrFinal`; once it
/// is a leaf of a finished step it stays that way.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum ChoiceType {
    #[default]
    UnsplitOrFinal,
    /// Exactly one child; the other alternatives were collapsed.
    Deterministic,
    /// Children are scheduler alternatives.
    Nondeterministic,
    /// Children partition the probability mass.
    Probabilistic,
}

impl ChoiceType {
    pub fn is_split(self) -> bool {
        !matches!(self, ChoiceType::UnsplitOrFinal)
    }
}

impl fmt::Display for ChoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChoiceType::UnsplitOrFinal => "leaf",
            ChoiceType::Deterministic => "det",
            ChoiceType::Nondeterministic => "nondet",
            ChoiceType::Probabilistic => "prob",
        };
        write!(f, "{}", s)
    }
}
