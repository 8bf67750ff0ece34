//! Flat Markov decision process.
//!
//! Every state has a list of distributions, every distribution a list of
//! transitions. Distributions are the rows of a [`SparseMatrix`]; the rows of
//! a state are contiguous. The initial distributions of the model form their
//! own block of rows, so the initial state is not a state of the MDP.
//!
//! The MDP is built with a strict protocol:
//!
//! ```
//! use ltmdp_rs::config::ModelCapacity;
//! use ltmdp_rs::formula::StateFormulaSet;
//! use ltmdp_rs::mdp::MarkovDecisionProcess;
//!
//! let mut mdp = MarkovDecisionProcess::new(ModelCapacity::TINY, vec!["goal".to_string()]);
//! mdp.start_with_initial_distributions();
//! mdp.start_with_new_initial_distribution().unwrap();
//! mdp.add_transition_to_initial_distribution(0, 1.0).unwrap();
//! mdp.finish_initial_distribution();
//! mdp.finish_initial_distributions();
//!
//! mdp.start_with_new_distributions(0);
//! mdp.start_with_new_distribution().unwrap();
//! mdp.add_transition(0, 1.0).unwrap();
//! mdp.finish_distribution();
//! mdp.finish_distributions().unwrap();
//! mdp.set_state_labeling(0, StateFormulaSet::from_bools(&[true])).unwrap();
//! mdp.seal();
//!
//! assert_eq!(mdp.state_count(), 1);
//! assert_eq!(mdp.distribution_count(), 2);
//! ```

use std::ops::Range;

use log::debug;

use crate::config::ModelCapacity;
use crate::error::ModelError;
use crate::formula::StateFormulaSet;
use crate::graph::{BidirectionalGraph, Edge};
use crate::sparse::{ColumnValue, SparseMatrix};
use crate::types::PROBABILITY_TOLERANCE;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum BuildPhase {
    Idle,
    InitialDistributions,
    StateDistributions(usize),
}

#[derive(Debug, Clone)]
pub struct MarkovDecisionProcess {
    state_formula_labels: Vec<String>,
    matrix: SparseMatrix,
    /// First row of each state.
    state_to_row_l: Vec<usize>,
    /// Number of rows of each state.
    state_to_row_count: Vec<usize>,
    initial_rows: Range<usize>,
    labeling: Vec<StateFormulaSet>,
    state_count: usize,
    state_capacity: usize,
    next_row: usize,
    phase: BuildPhase,
    /// First row of the distributions currently being added.
    phase_start: usize,
}

impl MarkovDecisionProcess {
    pub fn new(capacity: ModelCapacity, state_formula_labels: Vec<String>) -> Self {
        Self {
            state_formula_labels,
            matrix: SparseMatrix::new(capacity.transitions, capacity.transitions),
            state_to_row_l: Vec::new(),
            state_to_row_count: Vec::new(),
            initial_rows: 0..0,
            labeling: Vec::new(),
            state_count: 0,
            state_capacity: capacity.states,
            next_row: 0,
            phase: BuildPhase::Idle,
            phase_start: 0,
        }
    }

    pub fn state_formula_labels(&self) -> &[String] {
        &self.state_formula_labels
    }

    pub fn state_count(&self) -> usize {
        self.state_count
    }

    /// Number of distributions, including the initial ones.
    pub fn distribution_count(&self) -> usize {
        self.next_row
    }

    pub fn transition_count(&self) -> usize {
        self.matrix.entry_count()
    }

    pub fn is_sealed(&self) -> bool {
        self.matrix.is_sealed()
    }

    fn touch_state(&mut self, state: usize) -> Result<(), ModelError> {
        if state >= self.state_capacity {
            return Err(ModelError::CapacityExceeded {
                resource: "states",
                capacity: self.state_capacity,
            });
        }
        if state >= self.state_count {
            self.state_count = state + 1;
            self.state_to_row_l.resize(self.state_count, 0);
            self.state_to_row_count.resize(self.state_count, 0);
            self.labeling.resize(self.state_count, StateFormulaSet::EMPTY);
        }
        Ok(())
    }

    // Construction

    pub fn start_with_initial_distributions(&mut self) {
        assert_eq!(self.phase, BuildPhase::Idle, "Distributions are already being added");
        assert!(self.initial_rows.is_empty(), "Initial distributions were already added");
        self.phase = BuildPhase::InitialDistributions;
        self.phase_start = self.next_row;
    }

    pub fn start_with_new_initial_distribution(&mut self) -> Result<(), ModelError> {
        assert_eq!(self.phase, BuildPhase::InitialDistributions, "Not adding initial distributions");
        self.matrix.set_row(self.next_row)
    }

    pub fn add_transition_to_initial_distribution(&mut self, target: usize, probability: f64) -> Result<(), ModelError> {
        assert_eq!(self.phase, BuildPhase::InitialDistributions, "Not adding initial distributions");
        self.touch_state(target)?;
        self.matrix.add_column_value_to_current_row(target, probability)
    }

    pub fn finish_initial_distribution(&mut self) {
        self.matrix.finish_row();
        self.next_row += 1;
    }

    pub fn finish_initial_distributions(&mut self) {
        assert_eq!(self.phase, BuildPhase::InitialDistributions, "Not adding initial distributions");
        self.initial_rows = self.phase_start..self.next_row;
        self.phase = BuildPhase::Idle;
    }

    /// Starts the distributions of `state`.
    ///
    /// # Panics
    ///
    /// Panics if the distributions of `state` were already added.
    pub fn start_with_new_distributions(&mut self, state: usize) {
        assert_eq!(self.phase, BuildPhase::Idle, "Distributions are already being added");
        assert!(
            state >= self.state_count || self.state_to_row_count[state] == 0,
            "Distributions of state {} were already added",
            state
        );
        self.phase = BuildPhase::StateDistributions(state);
        self.phase_start = self.next_row;
    }

    pub fn start_with_new_distribution(&mut self) -> Result<(), ModelError> {
        assert!(
            matches!(self.phase, BuildPhase::StateDistributions(_)),
            "Not adding state distributions"
        );
        self.matrix.set_row(self.next_row)
    }

    pub fn add_transition(&mut self, target: usize, probability: f64) -> Result<(), ModelError> {
        self.touch_state(target)?;
        self.matrix.add_column_value_to_current_row(target, probability)
    }

    pub fn finish_distribution(&mut self) {
        self.matrix.finish_row();
        self.next_row += 1;
    }

    pub fn finish_distributions(&mut self) -> Result<(), ModelError> {
        let BuildPhase::StateDistributions(state) = self.phase else {
            panic!("Not adding state distributions");
        };
        self.touch_state(state)?;
        self.state_to_row_l[state] = self.phase_start;
        self.state_to_row_count[state] = self.next_row - self.phase_start;
        self.phase = BuildPhase::Idle;
        Ok(())
    }

    pub fn set_state_labeling(&mut self, state: usize, labels: StateFormulaSet) -> Result<(), ModelError> {
        self.touch_state(state)?;
        self.labeling[state] = labels;
        Ok(())
    }

    /// Compacts the matrix. The MDP is read-only afterwards.
    pub fn seal(&mut self) {
        assert_eq!(self.phase, BuildPhase::Idle, "Distributions are still being added");
        self.matrix.optimize_and_seal();
        debug!(
            "sealed MDP: {} states, {} distributions, {} transitions",
            self.state_count,
            self.distribution_count(),
            self.transition_count()
        );
        if cfg!(debug_assertions) {
            self.validate();
        }
    }

    /// Checks that every distribution sums up to 1.
    ///
    /// # Panics
    ///
    /// Panics on the first distribution that does not.
    pub fn validate(&self) {
        let check = |row: usize, owner: &dyn std::fmt::Display| {
            let sum: f64 = self.matrix.row(row).iter().map(|e| e.value).sum();
            assert!(
                (sum - 1.0).abs() <= PROBABILITY_TOLERANCE,
                "Distribution {} of {} sums up to {}",
                row,
                owner,
                sum
            );
        };
        for row in self.initial_rows.clone() {
            check(row, &"the initial state");
        }
        for state in 0..self.state_count {
            for row in self.distribution_rows(state) {
                check(row, &format!("state {}", state));
            }
        }
    }

    // Queries

    pub fn labeling(&self, state: usize) -> StateFormulaSet {
        self.labeling.get(state).copied().unwrap_or_default()
    }

    pub fn initial_distribution_rows(&self) -> Range<usize> {
        self.initial_rows.clone()
    }

    pub fn distribution_rows(&self, state: usize) -> Range<usize> {
        match self.state_to_row_l.get(state) {
            Some(&l) => l..l + self.state_to_row_count[state],
            None => 0..0,
        }
    }

    pub fn distribution(&self, row: usize) -> &[ColumnValue] {
        self.matrix.row(row)
    }

    pub fn initial_distributions(&self) -> impl Iterator<Item = &[ColumnValue]> {
        self.initial_distribution_rows().map(move |r| self.matrix.row(r))
    }

    pub fn distributions(&self, state: usize) -> impl Iterator<Item = &[ColumnValue]> {
        self.distribution_rows(state).map(move |r| self.matrix.row(r))
    }

    /// Graph with an edge for every transition of positive probability.
    pub fn underlying_digraph(&self) -> BidirectionalGraph {
        let mut graph = BidirectionalGraph::new(self.state_count);
        for state in 0..self.state_count {
            for row in self.distribution_rows(state) {
                for entry in self.matrix.row(row) {
                    if entry.value > 0.0 {
                        graph.add_edge(Edge {
                            source: state,
                            target: entry.column,
                            row,
                            probability: entry.value,
                        });
                    }
                }
            }
        }
        graph
    }
}


#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn initial(mdp: &mut MarkovDecisionProcess, targets: &[(usize, f64)]) {
        mdp.start_with_initial_distributions();
        mdp.start_with_new_initial_distribution().unwrap();
        for &(t, p) in targets {
            mdp.add_transition_to_initial_distribution(t, p).unwrap();
        }
        mdp.finish_initial_distribution();
        mdp.finish_initial_distributions();
    }

    fn state(mdp: &mut MarkovDecisionProcess, s: usize, distributions: &[&[(usize, f64)]]) {
        mdp.start_with_new_distributions(s);
        for d in distributions {
            mdp.start_with_new_distribution().unwrap();
            for &(t, p) in *d {
                mdp.add_transition(t, p).unwrap();
            }
            mdp.finish_distribution();
        }
        mdp.finish_distributions().unwrap();
    }

    #[test]
    fn test_build() {
        let mut mdp = MarkovDecisionProcess::new(ModelCapacity::TINY, vec!["label1".into()]);
        initial(&mut mdp, &[(0, 1.0)]);
        state(&mut mdp, 0, &[&[(1, 0.6), (0, 0.4)], &[(1, 1.0)]]);
        state(&mut mdp, 1, &[&[(1, 1.0)]]);
        mdp.set_state_labeling(1, StateFormulaSet::from_bools(&[true])).unwrap();
        mdp.seal();

        assert_eq!(mdp.state_count(), 2);
        assert_eq!(mdp.distribution_count(), 4);
        assert_eq!(mdp.transition_count(), 5);
        assert_eq!(mdp.initial_distributions().count(), 1);
        assert_eq!(mdp.distributions(0).count(), 2);
        assert_eq!(mdp.distribution_rows(1), 3..4);
        assert!(mdp.labeling(1).contains(0));
        assert!(!mdp.labeling(0).contains(0));

        let graph = mdp.underlying_digraph();
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.in_edges(1).len(), 3);
    }

    #[test]
    #[should_panic(expected = "sums up to")]
    fn test_validate() {
        let mut mdp = MarkovDecisionProcess::new(ModelCapacity::TINY, vec![]);
        initial(&mut mdp, &[(0, 1.0)]);
        state(&mut mdp, 0, &[&[(0, 0.5)]]);
        mdp.seal();
        mdp.validate();
    }

    #[test]
    #[should_panic(expected = "were already added")]
    fn test_state_twice() {
        let mut mdp = MarkovDecisionProcess::new(ModelCapacity::TINY, vec![]);
        state(&mut mdp, 0, &[&[(0, 1.0)]]);
        state(&mut mdp, 0, &[&[(0, 1.0)]]);
    }

    #[test]
    fn test_state_capacity() {
        let capacity = ModelCapacity {
            states: 1,
            ..ModelCapacity::TINY
        };
        let mut mdp = MarkovDecisionProcess::new(capacity, vec![]);
        mdp.start_with_new_distributions(0);
        mdp.start_with_new_distribution().unwrap();
        assert!(matches!(mdp.add_transition(1, 1.0), Err(ModelError::CapacityExceeded { .. })));
    }
}
