//! Conversion of the explored LTMDP into a nested MDP.
//!
//! The states of the nested MDP are the distinct pairs of satisfied state
//! formulas and target state found at the transition targets, numbered in the
//! order they are first reached from the initial state. A pair is labeled with
//! its formulas, and its tree is a copy of the tree of its target state in
//! which every leaf points to the pair of its transition target. Pairs with the
//! same target state share one copy.

use std::collections::{HashMap, VecDeque};

use log::{debug, info};

use crate::config::ModelCapacity;
use crate::error::ModelError;
use crate::formula::StateFormulaSet;
use crate::ltmdp::LabeledTransitionMarkovDecisionProcess;
use crate::nmdp::NestedMarkovDecisionProcess;

pub struct LtmdpToNmdp<'a> {
    ltmdp: &'a LabeledTransitionMarkovDecisionProcess,
    nmdp: NestedMarkovDecisionProcess,
    states: HashMap<(StateFormulaSet, usize), usize>,
    /// LTMDP state -> location of the copy of its tree.
    copied_roots: HashMap<usize, usize>,
    /// Pairs whose tree is not copied yet.
    pending: VecDeque<(usize, usize)>,
}

impl<'a> LtmdpToNmdp<'a> {
    pub fn new(ltmdp: &'a LabeledTransitionMarkovDecisionProcess) -> Self {
        let capacity = ModelCapacity {
            states: ltmdp.transition_target_count().max(1),
            transitions: ltmdp.transition_target_count(),
            continuation_graph_size: ltmdp.continuation_graph().len(),
        };
        Self {
            ltmdp,
            nmdp: NestedMarkovDecisionProcess::new(capacity, ltmdp.state_formula_labels().to_vec()),
            states: HashMap::new(),
            copied_roots: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn convert(mut self) -> Result<NestedMarkovDecisionProcess, ModelError> {
        let Some(initial) = self.ltmdp.root_of_initial_state() else {
            return Err(ModelError::InvalidConfiguration(
                "the model has no initial distributions".into(),
            ));
        };
        let root = self.copy_tree(initial)?;
        self.nmdp.set_root_of_initial_state(root);

        while let Some((state, source)) = self.pending.pop_front() {
            let Some(original) = self.ltmdp.root_of_state(source) else {
                debug!("state {} ({}) has no recorded successors", state, source);
                continue;
            };
            let root = match self.copied_roots.get(&source) {
                Some(&root) => root,
                None => {
                    let root = self.copy_tree(original)?;
                    self.copied_roots.insert(source, root);
                    root
                }
            };
            self.nmdp.set_root_of_state(state, root)?;
        }

        info!(
            "converted LTMDP with {} transition targets into nested MDP with {} states",
            self.ltmdp.transition_target_count(),
            self.nmdp.state_count()
        );
        Ok(self.nmdp)
    }

    fn state_of(&mut self, formulas: StateFormulaSet, target: usize) -> Result<usize, ModelError> {
        if let Some(&state) = self.states.get(&(formulas, target)) {
            return Ok(state);
        }
        let state = self.states.len();
        self.nmdp.set_state_labeling(state, formulas)?;
        self.states.insert((formulas, target), state);
        self.pending.push_back((state, target));
        Ok(state)
    }

    fn copy_tree(&mut self, original: usize) -> Result<usize, ModelError> {
        let location = self.nmdp.place_for_new_elements(1)?;
        self.copy_into(original, location)?;
        Ok(location)
    }

    fn copy_into(&mut self, original: usize, location: usize) -> Result<(), ModelError> {
        let element = *self.ltmdp.continuation_graph().element(original);
        if element.is_leaf() {
            let target = *self.ltmdp.transition_target(element.target());
            let state = self.state_of(target.formulas, target.target_state)?;
            return self.nmdp.add_leaf(location, state, element.probability);
        }
        let n = element.to - element.from + 1;
        let first = self.nmdp.place_for_new_elements(n)?;
        self.nmdp
            .add_inner_node(location, element.kind, first, first + n - 1, element.probability);
        for k in 0..n {
            self.copy_into(element.from + k, first + k)?;
        }
        Ok(())
    }
}
