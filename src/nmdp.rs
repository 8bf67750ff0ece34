//! Nested Markov decision process.
//!
//! Every state owns a tree in a shared [`ContinuationGraph`] whose inner nodes
//! alternate between probabilistic and nondeterministic splits to arbitrary
//! depth. A leaf points directly to a target state.

use num_bigint::BigUint;

use crate::config::ModelCapacity;
use crate::continuation::{ContinuationGraph, ContinuationGraphElement};
use crate::error::ModelError;
use crate::formula::StateFormulaSet;
use crate::types::ChoiceType;

#[derive(Debug, Clone)]
pub struct NestedMarkovDecisionProcess {
    state_formula_labels: Vec<String>,
    graph: ContinuationGraph,
    state_roots: Vec<Option<usize>>,
    initial_root: Option<usize>,
    labeling: Vec<StateFormulaSet>,
    state_capacity: usize,
}

impl NestedMarkovDecisionProcess {
    pub fn new(capacity: ModelCapacity, state_formula_labels: Vec<String>) -> Self {
        Self {
            state_formula_labels,
            graph: ContinuationGraph::with_capacity(capacity.continuation_graph_size),
            state_roots: Vec::new(),
            initial_root: None,
            labeling: Vec::new(),
            state_capacity: capacity.states,
        }
    }

    pub fn state_formula_labels(&self) -> &[String] {
        &self.state_formula_labels
    }

    /// Number of states: every state that has a root, a labeling or is the target of a leaf.
    pub fn state_count(&self) -> usize {
        self.state_roots.len()
    }

    pub fn continuation_graph(&self) -> &ContinuationGraph {
        &self.graph
    }

    fn touch_state(&mut self, state: usize) -> Result<(), ModelError> {
        if state >= self.state_capacity {
            return Err(ModelError::CapacityExceeded {
                resource: "states",
                capacity: self.state_capacity,
            });
        }
        if state >= self.state_roots.len() {
            self.state_roots.resize(state + 1, None);
            self.labeling.resize(state + 1, StateFormulaSet::EMPTY);
        }
        Ok(())
    }

    /// Reserves `n` contiguous locations in the continuation graph.
    pub fn place_for_new_elements(&mut self, n: usize) -> Result<usize, ModelError> {
        self.graph.place_for_new_elements(n)
    }

    pub fn add_leaf(&mut self, location: usize, target_state: usize, probability: f64) -> Result<(), ModelError> {
        self.touch_state(target_state)?;
        self.graph.add_leaf(location, target_state, probability);
        Ok(())
    }

    pub fn add_inner_node(&mut self, location: usize, kind: ChoiceType, from: usize, to: usize, probability: f64) {
        self.graph.add_inner_node(location, kind, from, to, probability);
    }

    pub fn set_root_of_initial_state(&mut self, location: usize) {
        assert!(self.initial_root.is_none(), "Root of the initial state is already set");
        self.initial_root = Some(location);
    }

    pub fn set_root_of_state(&mut self, state: usize, location: usize) -> Result<(), ModelError> {
        self.touch_state(state)?;
        assert!(self.state_roots[state].is_none(), "Root of state {} is already set", state);
        self.state_roots[state] = Some(location);
        Ok(())
    }

    pub fn set_state_labeling(&mut self, state: usize, labels: StateFormulaSet) -> Result<(), ModelError> {
        self.touch_state(state)?;
        self.labeling[state] = labels;
        Ok(())
    }

    pub fn root_of_initial_state(&self) -> Option<usize> {
        self.initial_root
    }

    /// Root location of `state`, or `None` if the state has no distributions.
    pub fn root_of_state(&self, state: usize) -> Option<usize> {
        self.state_roots.get(state).copied().flatten()
    }

    pub fn labeling(&self, state: usize) -> StateFormulaSet {
        self.labeling.get(state).copied().unwrap_or_default()
    }

    /// Number of flat distributions the tree at `location` stands for.
    ///
    /// Alternatives of a nondeterministic split add up, independent branches of a
    /// probabilistic split multiply, so the count can grow exponentially with the depth.
    pub fn count_distributions_at(&self, location: usize) -> BigUint {
        self.graph.fold_tree(
            location,
            &mut |_, _: &ContinuationGraphElement| BigUint::from(1u32),
            &mut |_, e: &ContinuationGraphElement, children: Vec<BigUint>| match e.kind {
                ChoiceType::Probabilistic => children.into_iter().product(),
                ChoiceType::Nondeterministic => children.into_iter().sum(),
                _ => children.into_iter().next().unwrap_or_default(),
            },
        )
    }

    pub fn count_distributions(&self, state: usize) -> BigUint {
        self.root_of_state(state)
            .map_or_else(BigUint::default, |root| self.count_distributions_at(root))
    }

    pub fn count_initial_distributions(&self) -> BigUint {
        self.initial_root
            .map_or_else(BigUint::default, |root| self.count_distributions_at(root))
    }
}
