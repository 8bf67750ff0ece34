//! Model builders fed by the explorer.
//!
//! For every explored state the explorer hands over a [`TransitionBatch`]: the
//! successor transitions, each tagged with the continuation it ends in, plus
//! the step graph and mapper describing how those continuations were split.
//! A [`TransitionSink`] turns batches into a persistent model:
//!
//! - [`LtmdpBuilder`] copies the step graph into the continuation graph of a
//!   [`LabeledTransitionMarkovDecisionProcess`];
//! - [`MdpBuilder`] uses the mapper to write one flat distribution per
//!   distribution id directly into a [`MarkovDecisionProcess`].

use log::{debug, trace};

use crate::config::ModelCapacity;
use crate::error::ModelError;
use crate::ltmdp::{LabeledTransitionMarkovDecisionProcess, TransitionTarget};
use crate::mapper::ContinuationDistributionMapper;
use crate::mdp::MarkovDecisionProcess;
use crate::resolver::ChoiceResolver;
use crate::step_graph::StepGraph;
use crate::transition::{Transition, TransitionBuffer};

/// The successors of one state together with their split structure.
#[derive(Debug, Clone)]
pub struct TransitionBatch {
    pub transitions: TransitionBuffer<Transition>,
    pub step_graph: StepGraph,
    pub mapper: ContinuationDistributionMapper,
}

impl TransitionBatch {
    pub fn new(capacity: usize) -> Self {
        Self {
            transitions: TransitionBuffer::with_capacity(capacity),
            step_graph: StepGraph::new(),
            mapper: ContinuationDistributionMapper::new(),
        }
    }

    /// Takes over the split structure the resolver recorded for its current state.
    pub fn capture_splits(&mut self, resolver: &ChoiceResolver) {
        self.step_graph.clone_from(resolver.step_graph());
        self.mapper.clone_from(resolver.mapper());
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
        self.step_graph.clear();
        self.mapper.add_initial_distribution_and_continuation(0);
    }
}

/// Consumer of the successors of explored states.
pub trait TransitionSink {
    /// Records the successors of `source`, or of the initial state if `source` is `None`.
    ///
    /// Processing the same source twice is a no-op.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Deadlock`] if the batch is empty, and with
    /// [`ModelError::CapacityExceeded`] when the model is full.
    fn process_transitions(&mut self, source: Option<usize>, batch: &TransitionBatch) -> Result<(), ModelError>;
}

fn no_successors(source: Option<usize>) -> ModelError {
    match source {
        Some(state) => ModelError::Deadlock { state },
        None => ModelError::InvalidConfiguration("the model has no initial states".into()),
    }
}

// =============================================================================
// Continuation graph route
// =============================================================================

#[derive(Debug)]
pub struct LtmdpBuilder {
    ltmdp: LabeledTransitionMarkovDecisionProcess,
    /// Scratch: cid -> index of its transition in the current batch.
    leaf_transitions: Vec<Option<usize>>,
}

impl LtmdpBuilder {
    pub fn new(capacity: ModelCapacity, state_formula_labels: Vec<String>) -> Self {
        Self {
            ltmdp: LabeledTransitionMarkovDecisionProcess::new(capacity, state_formula_labels),
            leaf_transitions: Vec::new(),
        }
    }

    pub fn model(&self) -> &LabeledTransitionMarkovDecisionProcess {
        &self.ltmdp
    }

    pub fn into_model(self) -> LabeledTransitionMarkovDecisionProcess {
        self.ltmdp
    }

    fn index_transitions(&mut self, source: Option<usize>, batch: &TransitionBatch) {
        let step_graph = &batch.step_graph;
        self.leaf_transitions.clear();
        self.leaf_transitions.resize(step_graph.len(), None);
        for (i, t) in batch.transitions.iter().enumerate() {
            let cid = t.continuation_id;
            assert!(
                cid < step_graph.len(),
                "Transition {} of {:?} refers to unknown continuation {}",
                i,
                source,
                cid
            );
            assert!(
                !step_graph.choice_of(cid).kind.is_split(),
                "Transition {} of {:?} is attached to the interior continuation {}",
                i,
                source,
                cid
            );
            assert!(
                self.leaf_transitions[cid].is_none(),
                "Continuation {} of {:?} has more than one transition",
                cid,
                source
            );
            self.leaf_transitions[cid] = Some(i);
        }
    }

    /// Copies the step graph below `cid` to the reserved `location`.
    fn copy_continuation(
        &mut self,
        source: Option<usize>,
        batch: &TransitionBatch,
        cid: usize,
        location: usize,
    ) -> Result<(), ModelError> {
        let choice = *batch.step_graph.choice_of(cid);
        match choice.children() {
            Some(children) => {
                let n = children.end() - children.start() + 1;
                let first = self.ltmdp.graph_mut().place_for_new_elements(n)?;
                self.ltmdp
                    .graph_mut()
                    .add_inner_node(location, choice.kind, first, first + n - 1, choice.probability);
                for (k, child) in children.enumerate() {
                    self.copy_continuation(source, batch, child, first + k)?;
                }
            }
            None => {
                let Some(i) = self.leaf_transitions[cid] else {
                    panic!("Continuation {} of {:?} has no transition", cid, source);
                };
                let t = &batch.transitions[i];
                let target = self.ltmdp.add_transition_target(TransitionTarget {
                    target_state: t.target_state,
                    formulas: t.formulas,
                    faults: t.faults,
                    probability: t.probability.value(),
                })?;
                self.ltmdp.graph_mut().add_leaf(location, target, choice.probability);
            }
        }
        Ok(())
    }
}

impl TransitionSink for LtmdpBuilder {
    fn process_transitions(&mut self, source: Option<usize>, batch: &TransitionBatch) -> Result<(), ModelError> {
        let known = match source {
            Some(state) => self.ltmdp.root_of_state(state).is_some(),
            None => self.ltmdp.root_of_initial_state().is_some(),
        };
        if known {
            trace!("successors of {:?} are already known", source);
            return Ok(());
        }
        if batch.transitions.is_empty() {
            return Err(no_successors(source));
        }

        self.index_transitions(source, batch);
        let root = self.ltmdp.graph_mut().place_for_new_elements(1)?;
        self.copy_continuation(source, batch, 0, root)?;
        match source {
            Some(state) => self.ltmdp.set_root_of_state(state, root)?,
            None => self.ltmdp.set_root_of_initial_state(root),
        }
        debug!(
            "recorded {} transitions of {:?} at location {}",
            batch.transitions.len(),
            source,
            root
        );
        Ok(())
    }
}

// =============================================================================
// Flat route
// =============================================================================

#[derive(Debug)]
pub struct MdpBuilder {
    mdp: MarkovDecisionProcess,
    /// Scratch: did -> (target, probability) of the current batch.
    buckets: Vec<Vec<(usize, f64)>>,
}

impl MdpBuilder {
    pub fn new(capacity: ModelCapacity, state_formula_labels: Vec<String>) -> Self {
        Self {
            mdp: MarkovDecisionProcess::new(capacity, state_formula_labels),
            buckets: Vec::new(),
        }
    }

    pub fn model(&self) -> &MarkovDecisionProcess {
        &self.mdp
    }

    /// Seals and returns the MDP.
    pub fn into_model(mut self) -> MarkovDecisionProcess {
        self.mdp.seal();
        self.mdp
    }

    /// Sorts the transitions of the batch into one bucket per distribution id.
    fn fill_buckets(&mut self, source: Option<usize>, batch: &TransitionBatch) -> Result<(), ModelError> {
        let n = batch.mapper.number_of_distributions();
        for bucket in self.buckets.iter_mut() {
            bucket.clear();
        }
        if self.buckets.len() < n {
            self.buckets.resize_with(n, Vec::new);
        }
        for t in batch.transitions.iter() {
            let dids = batch.mapper.distributions_of_continuation(t.continuation_id);
            assert!(
                !dids.is_empty(),
                "Transition of {:?} to {} is attached to continuation {} which belongs to no distribution",
                source,
                t.target_state,
                t.continuation_id
            );
            for &did in dids {
                self.buckets[did].push((t.target_state, t.probability.value()));
            }
            self.mdp.set_state_labeling(t.target_state, t.formulas)?;
        }
        Ok(())
    }
}

impl TransitionSink for MdpBuilder {
    fn process_transitions(&mut self, source: Option<usize>, batch: &TransitionBatch) -> Result<(), ModelError> {
        let known = match source {
            Some(state) => !self.mdp.distribution_rows(state).is_empty(),
            None => !self.mdp.initial_distribution_rows().is_empty(),
        };
        if known {
            return Ok(());
        }
        if batch.transitions.is_empty() {
            return Err(no_successors(source));
        }

        self.fill_buckets(source, batch)?;
        let buckets = std::mem::take(&mut self.buckets);
        let result = self.write_buckets(source, &buckets);
        self.buckets = buckets;
        result
    }
}

impl MdpBuilder {
    fn write_buckets(&mut self, source: Option<usize>, buckets: &[Vec<(usize, f64)>]) -> Result<(), ModelError> {
        let mdp = &mut self.mdp;
        match source {
            None => {
                mdp.start_with_initial_distributions();
                for bucket in buckets.iter().filter(|b| !b.is_empty()) {
                    mdp.start_with_new_initial_distribution()?;
                    for &(target, probability) in bucket {
                        mdp.add_transition_to_initial_distribution(target, probability)?;
                    }
                    mdp.finish_initial_distribution();
                }
                mdp.finish_initial_distributions();
            }
            Some(state) => {
                mdp.start_with_new_distributions(state);
                for bucket in buckets.iter().filter(|b| !b.is_empty()) {
                    mdp.start_with_new_distribution()?;
                    for &(target, probability) in bucket {
                        mdp.add_transition(target, probability)?;
                    }
                    mdp.finish_distribution();
                }
                mdp.finish_distributions()?;
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use test_log::test;

    use super::testing::explore_labeled;
    use super::*;
    use crate::formula::StateFormulaSet;
    use crate::transition::FaultSet;
    use crate::types::Probability;

    fn labels() -> Vec<String> {
        vec!["label1".to_string()]
    }

    fn explore<F>(mut step: F) -> TransitionBatch
    where
        F: FnMut(&mut ChoiceResolver) -> usize,
    {
        explore_labeled(|r| (step(r), StateFormulaSet::EMPTY))
    }

    fn to(state: usize) -> impl FnMut(&mut ChoiceResolver) -> usize {
        move |_| state
    }

    /// State 5: nondet over {leaf -> 1, prob [-> 2, -> 3, -> 4], leaf -> 5}.
    fn more_distributions(r: &mut ChoiceResolver) -> usize {
        match r.handle_choice(3) {
            0 => 1,
            1 => 2 + r.handle_probabilistic_choice(3),
            _ => 5,
        }
    }

    fn sum_of(ltmdp: &LabeledTransitionMarkovDecisionProcess, root: usize) -> f64 {
        ltmdp.continuation_graph().probability_sum(root)
    }

    #[test]
    fn test_one_reflexive_transition() {
        let mut builder = LtmdpBuilder::new(ModelCapacity::TINY, labels());
        builder.process_transitions(None, &explore(to(5))).unwrap();
        builder.process_transitions(Some(5), &explore(to(5))).unwrap();
        let ltmdp = builder.into_model();

        assert_eq!(ltmdp.transition_target_count(), 2);
        assert_eq!(ltmdp.source_states(), &[5]);

        let initial = ltmdp.root_of_initial_state().unwrap();
        assert_eq!(ltmdp.continuation_graph().leaves(initial).len(), 1);
        assert_eq!(sum_of(&ltmdp, initial), 1.0);
        assert_eq!(ltmdp.initial_distributions().len(), 1);
        assert_eq!(ltmdp.initial_distributions()[0].len(), 1);

        let root = ltmdp.root_of_state(5).unwrap();
        assert_eq!(ltmdp.continuation_graph().leaves(root).len(), 1);
        assert_eq!(sum_of(&ltmdp, root), 1.0);
        let distributions = ltmdp.distributions(5);
        assert_eq!(distributions.len(), 1);
        assert_eq!(distributions[0].len(), 1);
        assert_eq!(ltmdp.transition_target(distributions[0][0].0).target_state, 5);
    }

    #[test]
    fn test_three_reflexive_states_from_initial_state() {
        let mut builder = LtmdpBuilder::new(ModelCapacity::TINY, labels());
        let initial = explore(|r| {
            let option = r.handle_probabilistic_choice(3);
            r.set_probability_of_last_choice(Probability::new([0.3, 0.3, 0.4][option]));
            option + 1
        });
        builder.process_transitions(None, &initial).unwrap();
        for state in 1..=3 {
            builder.process_transitions(Some(state), &explore(to(state))).unwrap();
        }
        let ltmdp = builder.into_model();

        assert_eq!(ltmdp.transition_target_count(), 6);
        assert_eq!(ltmdp.source_states(), &[1, 2, 3]);
        let root = ltmdp.root_of_initial_state().unwrap();
        assert_eq!(ltmdp.continuation_graph().leaves(root).len(), 3);
        assert!((sum_of(&ltmdp, root) - 1.0).abs() < 1e-12);
        let initial = ltmdp.initial_distributions();
        assert_eq!(initial.len(), 1);
        let probabilities: Vec<f64> = initial[0].iter().map(|&(_, p)| p).collect();
        assert_eq!(probabilities, vec![0.3, 0.3, 0.4]);
    }

    #[test]
    fn test_more_distributions() {
        let mut builder = LtmdpBuilder::new(ModelCapacity::TINY, labels());
        builder.process_transitions(None, &explore(to(5))).unwrap();
        builder.process_transitions(Some(5), &explore(more_distributions)).unwrap();
        let ltmdp = builder.model();

        assert_eq!(ltmdp.transition_target_count(), 6);
        let root = ltmdp.root_of_state(5).unwrap();
        assert_eq!(ltmdp.continuation_graph().leaves(root).len(), 5);
        assert!((sum_of(ltmdp, root) - 3.0).abs() < 1e-12);
        assert_eq!(ltmdp.distributions(5).len(), 3);

        let mut depths = Vec::new();
        ltmdp.traverse_tree(root, |_, element, depth| {
            if element.is_leaf() {
                depths.push(depth);
            }
        });
        assert_eq!(depths, vec![1, 2, 2, 2, 1]);
    }

    #[test]
    fn test_processing_is_idempotent() {
        let mut builder = LtmdpBuilder::new(ModelCapacity::TINY, labels());
        builder.process_transitions(Some(5), &explore(more_distributions)).unwrap();
        let elements = builder.model().continuation_graph().len();
        builder.process_transitions(Some(5), &explore(to(1))).unwrap();
        assert_eq!(builder.model().continuation_graph().len(), elements);
        assert_eq!(builder.model().transition_target_count(), 5);
        assert_eq!(builder.model().source_states(), &[5]);
    }

    #[test]
    fn test_deadlock() {
        let mut builder = LtmdpBuilder::new(ModelCapacity::TINY, labels());
        let result = builder.process_transitions(Some(3), &TransitionBatch::new(4));
        assert_eq!(result, Err(ModelError::Deadlock { state: 3 }));
    }

    #[test]
    fn test_capacity_of_targets() {
        let capacity = ModelCapacity {
            transitions: 3,
            ..ModelCapacity::TINY
        };
        let mut builder = LtmdpBuilder::new(capacity, labels());
        let result = builder.process_transitions(Some(5), &explore(more_distributions));
        assert!(matches!(result, Err(ModelError::CapacityExceeded { .. })));
    }

    #[test]
    #[should_panic(expected = "has no transition")]
    fn test_leaf_without_transition() {
        let mut builder = LtmdpBuilder::new(ModelCapacity::TINY, labels());
        let mut batch = explore(|r| r.handle_choice(2));
        batch.transitions.clear();
        batch
            .transitions
            .push(Transition {
                target_state: 0,
                continuation_id: 1,
                probability: Probability::ONE,
                formulas: StateFormulaSet::EMPTY,
                faults: FaultSet::EMPTY,
            })
            .unwrap();
        let _ = builder.process_transitions(Some(0), &batch);
    }

    #[test]
    #[should_panic(expected = "interior continuation")]
    fn test_transition_at_interior_continuation() {
        let mut builder = LtmdpBuilder::new(ModelCapacity::TINY, labels());
        let mut batch = explore(|r| r.handle_choice(2));
        batch
            .transitions
            .push(Transition {
                target_state: 0,
                continuation_id: 0,
                probability: Probability::ONE,
                formulas: StateFormulaSet::EMPTY,
                faults: FaultSet::EMPTY,
            })
            .unwrap();
        let _ = builder.process_transitions(Some(0), &batch);
    }

    #[test]
    fn test_flat_one_reflexive_transition() {
        let mut builder = MdpBuilder::new(ModelCapacity::TINY, labels());
        builder.process_transitions(None, &explore(to(5))).unwrap();
        builder.process_transitions(Some(5), &explore(to(5))).unwrap();
        let mdp = builder.into_model();
        assert_eq!(mdp.transition_count(), 2);
        assert_eq!(mdp.initial_distributions().count(), 1);
        assert_eq!(mdp.distributions(5).count(), 1);
        assert_eq!(mdp.distributions(5).next().unwrap()[0].column, 5);
    }

    #[test]
    fn test_flat_more_distributions() {
        let mut builder = MdpBuilder::new(ModelCapacity::TINY, labels());
        builder.process_transitions(None, &explore(to(5))).unwrap();
        builder.process_transitions(Some(5), &explore(more_distributions)).unwrap();
        builder.process_transitions(Some(5), &explore(to(1))).unwrap();
        let mdp = builder.into_model();

        let distributions: Vec<Vec<usize>> = mdp
            .distributions(5)
            .map(|d| d.iter().map(|e| e.column).collect())
            .collect();
        assert_eq!(distributions, vec![vec![1], vec![2, 3, 4], vec![5]]);
        let middle = mdp.distributions(5).nth(1).unwrap();
        assert!(middle.iter().all(|e| (e.value - 1.0 / 3.0).abs() < 1e-12));
    }

    #[test]
    fn test_flat_probabilistic_then_nondeterministic() {
        // prob [-> 1 (0.4), nondet (0.6) [-> 2, -> 3]]
        let batch = explore(|r| match r.handle_probabilistic_choice(2) {
            0 => {
                r.set_probability_of_last_choice(Probability::new(0.4));
                1
            }
            _ => {
                r.set_probability_of_last_choice(Probability::new(0.6));
                2 + r.handle_choice(2)
            }
        });
        let mut builder = MdpBuilder::new(ModelCapacity::TINY, labels());
        builder.process_transitions(Some(0), &batch).unwrap();
        let mdp = builder.into_model();
        let distributions: Vec<Vec<(usize, f64)>> = mdp
            .distributions(0)
            .map(|d| d.iter().map(|e| (e.column, e.value)).collect())
            .collect();
        assert_eq!(distributions, vec![vec![(1, 0.4), (2, 0.6)], vec![(1, 0.4), (3, 0.6)]]);
    }
}
