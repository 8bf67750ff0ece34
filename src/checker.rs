//! Probabilistic model checkers.
//!
//! A checker answers quantitative queries over a sealed model. The built-in
//! checker works on the flat [`MarkovDecisionProcess`]; the nested-MDP checker
//! flattens its model once and delegates.
//!
//! Reachability (`F ψ`) is computed in three steps:
//!
//! 1. graph-based precomputation of the states that reach `ψ` with
//!    probability 0 and 1,
//! 2. in-place (Gauss-Seidel) iteration over the remaining states, with the
//!    self-loop of every distribution removed, for a fixed budget,
//! 3. the optimum over the initial distributions.
//!
//! On a model without nondeterminism the minimum and the maximum coincide and
//! step 2 solves the linear system `x = M·x + b`.

use std::fmt;

use log::{debug, info, warn};

use crate::bitset::BitSet;
use crate::config::AnalysisConfiguration;
use crate::error::{ModelError, QueryError};
use crate::formula::Formula;
use crate::graph::BidirectionalGraph;
use crate::mdp::MarkovDecisionProcess;
use crate::nmdp::NestedMarkovDecisionProcess;
use crate::nmdp_to_mdp::NmdpToMdp;
use crate::sparse::ColumnValue;
use crate::types::{Probability, ProbabilityRange, RewardResult, PROBABILITY_TOLERANCE};

/// Query interface shared by all model checkers.
pub trait ProbabilisticModelChecker: Send + Sync {
    /// Probability of `formula` from the initial state.
    ///
    /// Under nondeterminism this is the maximal probability over all schedulers.
    fn calculate_probability(&self, formula: &Formula) -> Result<Probability, QueryError>;

    /// Whether the state formula `formula` holds in every possible initial state.
    fn calculate_boolean(&self, formula: &Formula) -> Result<bool, QueryError>;

    fn calculate_reward(&self, formula: &Formula) -> Result<RewardResult, QueryError>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ModelCheckerConfig {
    /// Iteration budget on models without nondeterminism.
    pub gauss_seidel_iterations: usize,
    /// Iteration budget of the min/max value iteration.
    pub value_iteration_steps: usize,
}

impl Default for ModelCheckerConfig {
    fn default() -> Self {
        Self {
            gauss_seidel_iterations: 50,
            value_iteration_steps: 50,
        }
    }
}

impl From<&AnalysisConfiguration> for ModelCheckerConfig {
    fn from(config: &AnalysisConfiguration) -> Self {
        Self {
            gauss_seidel_iterations: config.gauss_seidel_iterations,
            value_iteration_steps: config.value_iteration_steps,
        }
    }
}

/// How far the last iteration moved the solution.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SolverReport {
    pub iterations: usize,
    pub max_delta: f64,
}

impl SolverReport {
    const EXACT: SolverReport = SolverReport {
        iterations: 0,
        max_delta: 0.0,
    };

    pub fn converged(&self) -> bool {
        self.max_delta <= PROBABILITY_TOLERANCE
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Objective {
    Minimize,
    Maximize,
}

impl Objective {
    fn pick(self, a: f64, b: f64) -> f64 {
        match self {
            Objective::Minimize => a.min(b),
            Objective::Maximize => a.max(b),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Objective::Minimize => write!(f, "min"),
            Objective::Maximize => write!(f, "max"),
        }
    }
}

// =============================================================================
// Flat MDP
// =============================================================================

#[derive(Debug)]
pub struct BuiltinMdpModelChecker {
    mdp: MarkovDecisionProcess,
    graph: BidirectionalGraph,
    markov_chain: bool,
    config: ModelCheckerConfig,
}

impl BuiltinMdpModelChecker {
    /// # Panics
    ///
    /// Panics if `mdp` is not sealed.
    pub fn new(mdp: MarkovDecisionProcess, config: ModelCheckerConfig) -> Self {
        assert!(mdp.is_sealed(), "The MDP must be sealed before it is checked");
        let graph = mdp.underlying_digraph();
        let markov_chain = mdp.initial_distribution_rows().len() <= 1
            && (0..mdp.state_count()).all(|s| mdp.distribution_rows(s).len() <= 1);
        debug!(
            "model checker on {} states with {} edges ({})",
            mdp.state_count(),
            graph.edge_count(),
            if markov_chain { "Markov chain" } else { "MDP" }
        );
        Self {
            mdp,
            graph,
            markov_chain,
            config,
        }
    }

    pub fn mdp(&self) -> &MarkovDecisionProcess {
        &self.mdp
    }

    /// Returns `true` if no state (including the initial state) has more than one distribution.
    pub fn is_markov_chain(&self) -> bool {
        self.markov_chain
    }

    pub fn calculate_minimal_probability(&self, formula: &Formula) -> Result<Probability, QueryError> {
        self.calculate_probability_with_report(formula, Objective::Minimize)
            .map(|(p, _)| p)
    }

    pub fn calculate_maximal_probability(&self, formula: &Formula) -> Result<Probability, QueryError> {
        self.calculate_probability_with_report(formula, Objective::Maximize)
            .map(|(p, _)| p)
    }

    pub fn calculate_probability_range(&self, formula: &Formula) -> Result<ProbabilityRange, QueryError> {
        let min = self.calculate_minimal_probability(formula)?;
        let max = self.calculate_maximal_probability(formula)?;
        Ok(ProbabilityRange::new(min, max))
    }

    /// Optimal probability of `formula` together with the state of the solver when it stopped.
    pub fn calculate_probability_with_report(
        &self,
        formula: &Formula,
        objective: Objective,
    ) -> Result<(Probability, SolverReport), QueryError> {
        match formula {
            Formula::Finally(inner) => {
                let sat = self.satisfying_states(inner)?;
                let (x, report) = self.reachability(&sat, objective);
                Ok((self.initial_probability(&x, objective), report))
            }
            Formula::BoundedFinally(inner, steps) => {
                let sat = self.satisfying_states(inner)?;
                let x = self.bounded_reachability(&sat, *steps, objective);
                let report = SolverReport {
                    iterations: *steps,
                    max_delta: 0.0,
                };
                Ok((self.initial_probability(&x, objective), report))
            }
            f if f.is_state_formula() => {
                let sat = self.satisfying_states(f)?;
                let x = indicator(&sat);
                Ok((self.initial_probability(&x, objective), SolverReport::EXACT))
            }
            other => Err(QueryError::Unsupported(format!("probability of '{}'", other))),
        }
    }

    fn satisfying_states(&self, formula: &Formula) -> Result<BitSet, QueryError> {
        let compiled = formula.compile(self.mdp.state_formula_labels())?;
        let n = self.mdp.state_count();
        Ok(BitSet::from_indices(
            n,
            (0..n).filter(|&s| compiled.evaluate(self.mdp.labeling(s))),
        ))
    }

    // Precomputation

    /// States that reach `sat` with probability 0 under every scheduler.
    pub(crate) fn prob0a(&self, sat: &BitSet) -> BitSet {
        self.graph.ancestors(sat, |_| false, |_| false).complement()
    }

    /// States that reach `sat` with probability 0 under some scheduler.
    pub(crate) fn prob0e(&self, sat: &BitSet) -> BitSet {
        let n = self.mdp.state_count();
        let mut forced = sat.clone();
        loop {
            let mut changed = false;
            for s in 0..n {
                if forced.contains(s) || self.mdp.distribution_rows(s).is_empty() {
                    continue;
                }
                if self.mdp.distributions(s).all(|d| hits(d, &forced)) {
                    forced.insert(s);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        forced.complement()
    }

    /// States that reach `sat` with probability 1 under some scheduler.
    pub(crate) fn prob1e(&self, sat: &BitSet) -> BitSet {
        let n = self.mdp.state_count();
        let mut u = BitSet::full(n);
        loop {
            let mut r = sat.clone();
            loop {
                let mut changed = false;
                for s in 0..n {
                    if r.contains(s) || !u.contains(s) {
                        continue;
                    }
                    if self.mdp.distributions(s).any(|d| stays_in(d, &u) && hits(d, &r)) {
                        r.insert(s);
                        changed = true;
                    }
                }
                if !changed {
                    break;
                }
            }
            if r == u {
                return u;
            }
            u = r;
        }
    }

    /// States that reach `sat` with probability 1 under every scheduler, given `prob0e`.
    ///
    /// On a Markov chain, pass the probability-0 states instead.
    pub(crate) fn prob1a(&self, sat: &BitSet, prob0e: &BitSet) -> BitSet {
        self.graph
            .ancestors(prob0e, |s| sat.contains(s), |_| false)
            .complement()
    }

    // Iteration

    fn reachability(&self, sat: &BitSet, objective: Objective) -> (Vec<f64>, SolverReport) {
        let n = self.mdp.state_count();
        let (prob0, prob1) = if self.markov_chain {
            let prob0 = self.prob0a(sat);
            let prob1 = self.prob1a(sat, &prob0);
            (prob0, prob1)
        } else {
            match objective {
                Objective::Maximize => (self.prob0a(sat), self.prob1e(sat)),
                Objective::Minimize => {
                    let prob0 = self.prob0e(sat);
                    let prob1 = self.prob1a(sat, &prob0);
                    (prob0, prob1)
                }
            }
        };

        let mut x = indicator(&prob1);
        let unknown: Vec<usize> = (0..n)
            .filter(|&s| !prob0.contains(s) && !prob1.contains(s))
            .collect();
        debug!(
            "{} reachability: {} states with probability 0, {} with probability 1, {} unknown",
            objective,
            prob0.len(),
            prob1.len(),
            unknown.len()
        );
        if unknown.is_empty() {
            return (x, SolverReport::EXACT);
        }

        let budget = if self.markov_chain {
            self.config.gauss_seidel_iterations
        } else {
            self.config.value_iteration_steps
        };
        let mut report = SolverReport::EXACT;
        for iteration in 1..=budget {
            let mut max_delta: f64 = 0.0;
            for &s in &unknown {
                let value = self
                    .mdp
                    .distributions(s)
                    .map(|d| value_without_self_loop(s, d, &x))
                    .reduce(|a, b| objective.pick(a, b))
                    .unwrap_or(0.0);
                max_delta = max_delta.max((value - x[s]).abs());
                x[s] = value;
            }
            report = SolverReport { iterations: iteration, max_delta };
            if iteration % 10 == 0 {
                info!(
                    "iteration {}: probability {} (max delta {:e})",
                    iteration,
                    self.initial_probability(&x, objective),
                    max_delta
                );
            }
        }
        if !report.converged() {
            warn!(
                "iteration budget of {} exhausted, last change was {:e}",
                budget, report.max_delta
            );
        }
        (x, report)
    }

    fn bounded_reachability(&self, sat: &BitSet, steps: usize, objective: Objective) -> Vec<f64> {
        let n = self.mdp.state_count();
        let mut x = indicator(sat);
        let mut next = x.clone();
        for _ in 0..steps {
            for (s, value) in next.iter_mut().enumerate().take(n) {
                *value = if sat.contains(s) {
                    1.0
                } else {
                    self.mdp
                        .distributions(s)
                        .map(|d| d.iter().map(|e| e.value * x[e.column]).sum::<f64>())
                        .reduce(|a, b| objective.pick(a, b))
                        .unwrap_or(0.0)
                };
            }
            std::mem::swap(&mut x, &mut next);
        }
        x
    }

    fn initial_probability(&self, x: &[f64], objective: Objective) -> Probability {
        let value = self
            .mdp
            .initial_distributions()
            .map(|d| d.iter().map(|e| e.value * x[e.column]).sum::<f64>())
            .reduce(|a, b| objective.pick(a, b))
            .unwrap_or(0.0);
        Probability::new(value.clamp(0.0, 1.0))
    }
}

fn indicator(set: &BitSet) -> Vec<f64> {
    (0..set.universe())
        .map(|s| if set.contains(s) { 1.0 } else { 0.0 })
        .collect()
}

/// Whether `d` moves into `set` with positive probability.
fn hits(d: &[ColumnValue], set: &BitSet) -> bool {
    d.iter().any(|e| e.value > 0.0 && set.contains(e.column))
}

/// Whether `d` never leaves `set`.
fn stays_in(d: &[ColumnValue], set: &BitSet) -> bool {
    d.iter().all(|e| e.value <= 0.0 || set.contains(e.column))
}

/// Value of `d` at `s` if `s` repeats `d` until it leaves.
fn value_without_self_loop(s: usize, d: &[ColumnValue], x: &[f64]) -> f64 {
    let mut stay = 0.0;
    let mut leave = 0.0;
    for e in d {
        if e.column == s {
            stay += e.value;
        } else {
            leave += e.value * x[e.column];
        }
    }
    if 1.0 - stay <= PROBABILITY_TOLERANCE {
        0.0
    } else {
        leave / (1.0 - stay)
    }
}

impl ProbabilisticModelChecker for BuiltinMdpModelChecker {
    fn calculate_probability(&self, formula: &Formula) -> Result<Probability, QueryError> {
        self.calculate_maximal_probability(formula)
    }

    fn calculate_boolean(&self, formula: &Formula) -> Result<bool, QueryError> {
        if !formula.is_state_formula() {
            return Err(QueryError::Unsupported(format!("truth value of '{}'", formula)));
        }
        let sat = self.satisfying_states(formula)?;
        Ok(self
            .mdp
            .initial_distributions()
            .flat_map(|d| d.iter())
            .filter(|e| e.value > 0.0)
            .all(|e| sat.contains(e.column)))
    }

    fn calculate_reward(&self, formula: &Formula) -> Result<RewardResult, QueryError> {
        Err(QueryError::Unsupported(format!("rewards of '{}'", formula)))
    }
}

// =============================================================================
// Nested MDP
// =============================================================================

/// Checks a nested MDP by flattening it once.
#[derive(Debug)]
pub struct BuiltinNmdpModelChecker {
    nmdp: NestedMarkovDecisionProcess,
    checker: BuiltinMdpModelChecker,
}

impl BuiltinNmdpModelChecker {
    pub fn new(nmdp: NestedMarkovDecisionProcess, config: ModelCheckerConfig) -> Result<Self, ModelError> {
        let mdp = NmdpToMdp::new(&nmdp).convert()?;
        Ok(Self {
            nmdp,
            checker: BuiltinMdpModelChecker::new(mdp, config),
        })
    }

    pub fn nmdp(&self) -> &NestedMarkovDecisionProcess {
        &self.nmdp
    }

    /// The checker of the flattened model.
    pub fn flat(&self) -> &BuiltinMdpModelChecker {
        &self.checker
    }
}

impl ProbabilisticModelChecker for BuiltinNmdpModelChecker {
    fn calculate_probability(&self, formula: &Formula) -> Result<Probability, QueryError> {
        self.checker.calculate_probability(formula)
    }

    fn calculate_boolean(&self, formula: &Formula) -> Result<bool, QueryError> {
        self.checker.calculate_boolean(formula)
    }

    fn calculate_reward(&self, formula: &Formula) -> Result<RewardResult, QueryError> {
        self.checker.calculate_reward(formula)
    }
}
