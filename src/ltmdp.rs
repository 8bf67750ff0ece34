//! Labeled transition Markov decision process.
//!
//! The model built during exploration. Each explored state has a root in the
//! shared [`ContinuationGraph`]; the leaves of its tree refer to entries of the
//! transition-target table, which record the target state together with the
//! labels satisfied and the faults activated on the way. The initial state is
//! not a state of the model; it only has a root.

use crate::config::ModelCapacity;
use crate::continuation::{ContinuationGraph, ContinuationGraphElement};
use crate::error::ModelError;
use crate::formula::StateFormulaSet;
use crate::nmdp_to_mdp::{FlatDistribution, TreeFlattener};
use crate::transition::{FaultSet, TransitionBuffer};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TransitionTarget {
    pub target_state: usize,
    pub formulas: StateFormulaSet,
    pub faults: FaultSet,
    /// Probability of the path that led to this target.
    pub probability: f64,
}

#[derive(Debug, Clone)]
pub struct LabeledTransitionMarkovDecisionProcess {
    state_formula_labels: Vec<String>,
    graph: ContinuationGraph,
    targets: TransitionBuffer<TransitionTarget>,
    state_roots: Vec<Option<usize>>,
    initial_root: Option<usize>,
    source_states: Vec<usize>,
    state_capacity: usize,
}

impl LabeledTransitionMarkovDecisionProcess {
    pub fn new(capacity: ModelCapacity, state_formula_labels: Vec<String>) -> Self {
        Self {
            state_formula_labels,
            graph: ContinuationGraph::with_capacity(capacity.continuation_graph_size),
            targets: TransitionBuffer::for_resource("transition targets", capacity.transitions),
            state_roots: Vec::new(),
            initial_root: None,
            source_states: Vec::new(),
            state_capacity: capacity.states,
        }
    }

    pub fn state_formula_labels(&self) -> &[String] {
        &self.state_formula_labels
    }

    /// Number of known states: all targets and all sources.
    pub fn state_count(&self) -> usize {
        self.state_roots.len()
    }

    pub fn transition_target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn transition_target(&self, index: usize) -> &TransitionTarget {
        &self.targets[index]
    }

    pub fn transition_targets(&self) -> impl Iterator<Item = &TransitionTarget> {
        self.targets.iter()
    }

    pub fn continuation_graph(&self) -> &ContinuationGraph {
        &self.graph
    }

    /// States whose successors were recorded, in the order they were recorded.
    pub fn source_states(&self) -> &[usize] {
        &self.source_states
    }

    pub fn root_of_initial_state(&self) -> Option<usize> {
        self.initial_root
    }

    /// Root location of `state` in the continuation graph.
    pub fn root_of_state(&self, state: usize) -> Option<usize> {
        self.state_roots.get(state).copied().flatten()
    }

    /// Applies `visit` to every element of the tree rooted at `location`.
    pub fn traverse_tree<F>(&self, location: usize, visit: F)
    where
        F: FnMut(usize, &ContinuationGraphElement, usize),
    {
        self.graph.traverse_tree(location, visit)
    }

    /// Flat distributions of the initial state, over transition-target indices.
    pub fn initial_distributions(&self) -> Vec<FlatDistribution> {
        self.initial_root
            .map(|root| TreeFlattener::new().flatten(&self.graph, root))
            .unwrap_or_default()
    }

    /// Flat distributions of `state`, over transition-target indices.
    pub fn distributions(&self, state: usize) -> Vec<FlatDistribution> {
        self.root_of_state(state)
            .map(|root| TreeFlattener::new().flatten(&self.graph, root))
            .unwrap_or_default()
    }

    // Construction, used by the builder

    fn touch_state(&mut self, state: usize) -> Result<(), ModelError> {
        if state >= self.state_capacity {
            return Err(ModelError::CapacityExceeded {
                resource: "states",
                capacity: self.state_capacity,
            });
        }
        if state >= self.state_roots.len() {
            self.state_roots.resize(state + 1, None);
        }
        Ok(())
    }

    pub(crate) fn graph_mut(&mut self) -> &mut ContinuationGraph {
        &mut self.graph
    }

    pub(crate) fn add_transition_target(&mut self, target: TransitionTarget) -> Result<usize, ModelError> {
        self.touch_state(target.target_state)?;
        self.targets.push(target)
    }

    pub(crate) fn set_root_of_initial_state(&mut self, location: usize) {
        assert!(self.initial_root.is_none(), "Root of the initial state is already set");
        self.initial_root = Some(location);
    }

    pub(crate) fn set_root_of_state(&mut self, state: usize, location: usize) -> Result<(), ModelError> {
        self.touch_state(state)?;
        assert!(self.state_roots[state].is_none(), "Root of state {} is already set", state);
        self.state_roots[state] = Some(location);
        self.source_states.push(state);
        Ok(())
    }
}
