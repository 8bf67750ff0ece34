//! Flattening of nested distributions.
//!
//! A tree of the continuation graph stands for one flat distribution per
//! resolution of its nondeterministic splits. [`TreeFlattener`] walks the tree
//! once, numbering its nodes locally in the order they are reached, and lets a
//! [`ContinuationDistributionMapper`] keep track of which leaves end up in which
//! distribution: a probabilistic split keeps the number of distributions, a
//! nondeterministic split copies every distribution containing the split node.
//! Splits below different probabilistic branches are therefore independent,
//! and their alternatives combine. The layout of the tree in the graph does
//! not matter; children may be placed before their parents.
//!
//! [`NmdpToMdp`] applies the flattener to every state of a
//! [`NestedMarkovDecisionProcess`].

use log::{debug, info};

use crate::config::ModelCapacity;
use crate::continuation::ContinuationGraph;
use crate::error::ModelError;
use crate::mapper::ContinuationDistributionMapper;
use crate::mdp::MarkovDecisionProcess;
use crate::nmdp::NestedMarkovDecisionProcess;
use crate::types::ChoiceType;

/// Target and probability pairs, sorted by target, without duplicate targets.
pub type FlatDistribution = Vec<(usize, f64)>;

#[derive(Debug, Default)]
pub struct TreeFlattener {
    mapper: ContinuationDistributionMapper,
    /// Local node id -> location in the graph. The root is node 0.
    locations: Vec<usize>,
    /// Local node id -> probability of reaching the node from the root.
    running: Vec<f64>,
}

impl TreeFlattener {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_node(&mut self, location: usize, probability: f64) -> usize {
        self.locations.push(location);
        self.running.push(probability);
        self.locations.len() - 1
    }

    /// All flat distributions of the tree rooted at `root`.
    ///
    /// The targets of the distributions are the leaf targets of the graph.
    pub fn flatten(&mut self, graph: &ContinuationGraph, root: usize) -> Vec<FlatDistribution> {
        self.locations.clear();
        self.running.clear();
        self.mapper.add_initial_distribution_and_continuation(0);
        let mut stack = vec![self.add_node(root, graph.element(root).probability)];

        while let Some(node) = stack.pop() {
            let element = *graph.element(self.locations[node]);
            // Siblings get contiguous local ids, as the mapper expects.
            let first = self.locations.len();
            let last = first + (element.to - element.from);
            match element.kind {
                ChoiceType::UnsplitOrFinal => continue,
                ChoiceType::Probabilistic | ChoiceType::Deterministic => {
                    self.mapper.probabilistic_split(node, first, last)
                }
                ChoiceType::Nondeterministic => self.mapper.nondeterministic_split(node, first, last),
            }
            let running = self.running[node];
            for child in element.from..=element.to {
                let id = self.add_node(child, running * graph.element(child).probability);
                stack.push(id);
            }
        }

        let distributions: Vec<FlatDistribution> = self
            .mapper
            .non_empty_distributions()
            .map(|did| {
                let mut transitions: FlatDistribution = self
                    .mapper
                    .continuations_of_distribution(did)
                    .iter()
                    .map(|&leaf| (graph.element(self.locations[leaf]).target(), self.running[leaf]))
                    .collect();
                merge_targets(&mut transitions);
                transitions
            })
            .collect();
        debug!("tree at {} flattened into {} distributions", root, distributions.len());
        distributions
    }
}

/// Sorts by target and sums the probabilities of equal targets.
fn merge_targets(transitions: &mut FlatDistribution) {
    transitions.sort_by_key(|&(target, _)| target);
    transitions.dedup_by(|next, kept| {
        if next.0 == kept.0 {
            kept.1 += next.1;
            true
        } else {
            false
        }
    });
}

/// Converts a nested MDP into a flat one with the same states and labeling.
pub struct NmdpToMdp<'a> {
    nmdp: &'a NestedMarkovDecisionProcess,
    flattener: TreeFlattener,
}

impl<'a> NmdpToMdp<'a> {
    pub fn new(nmdp: &'a NestedMarkovDecisionProcess) -> Self {
        Self {
            nmdp,
            flattener: TreeFlattener::new(),
        }
    }

    pub fn convert(mut self) -> Result<MarkovDecisionProcess, ModelError> {
        let nmdp = self.nmdp;
        let graph = nmdp.continuation_graph();
        let states = nmdp.state_count();
        let capacity = ModelCapacity {
            states: states.max(1),
            transitions: usize::MAX,
            continuation_graph_size: 0,
        };
        let mut mdp = MarkovDecisionProcess::new(capacity, nmdp.state_formula_labels().to_vec());

        mdp.start_with_initial_distributions();
        if let Some(root) = nmdp.root_of_initial_state() {
            for distribution in self.flattener.flatten(graph, root) {
                mdp.start_with_new_initial_distribution()?;
                for (target, probability) in distribution {
                    mdp.add_transition_to_initial_distribution(target, probability)?;
                }
                mdp.finish_initial_distribution();
            }
        }
        mdp.finish_initial_distributions();

        for state in 0..states {
            mdp.set_state_labeling(state, nmdp.labeling(state))?;
            let Some(root) = nmdp.root_of_state(state) else {
                continue;
            };
            mdp.start_with_new_distributions(state);
            for distribution in self.flattener.flatten(graph, root) {
                mdp.start_with_new_distribution()?;
                for (target, probability) in distribution {
                    mdp.add_transition(target, probability)?;
                }
                mdp.finish_distribution();
            }
            mdp.finish_distributions()?;
        }

        mdp.seal();
        info!(
            "converted nested MDP into MDP with {} states, {} distributions and {} transitions",
            mdp.state_count(),
            mdp.distribution_count(),
            mdp.transition_count()
        );
        Ok(mdp)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::nmdp::examples::*;

    fn convert(nmdp: &NestedMarkovDecisionProcess) -> MarkovDecisionProcess {
        NmdpToMdp::new(nmdp).convert().unwrap()
    }

    fn transitions_of(mdp: &MarkovDecisionProcess, state: usize) -> usize {
        mdp.distributions(state).map(|d| d.len()).sum()
    }

    #[test]
    fn test_no_choices() {
        let mdp = convert(&no_choices());
        assert_eq!(mdp.initial_distributions().count(), 1);
        assert_eq!(mdp.initial_distributions().map(|d| d.len()).sum::<usize>(), 1);
        assert_eq!(mdp.distributions(0).count(), 1);
        assert_eq!(transitions_of(&mdp, 0), 1);
    }

    #[test]
    fn test_one_initial_probabilistic_split() {
        let mdp = convert(&one_initial_probabilistic_split());
        assert_eq!(mdp.initial_distributions().count(), 1);
        let initial: Vec<_> = mdp.initial_distributions().next().unwrap().to_vec();
        assert_eq!(initial.len(), 3);
        assert_eq!(initial[1].column, 1);
        assert_eq!(initial[1].value, 0.3);
    }

    #[test]
    fn test_nondeterministic_then_probabilistic() {
        let mdp = convert(&two_state_splits_nondeterministic_then_probabilistic());
        assert_eq!(mdp.distributions(0).count(), 2);
        assert_eq!(transitions_of(&mdp, 0), 3);
        let second = mdp.distributions(0).nth(1).unwrap();
        assert_eq!(second[0].column, 1);
        assert!((second[0].value - 0.4).abs() < 1e-12);
        assert!(mdp.labeling(1).contains(0));
    }

    #[test]
    fn test_probabilistic_then_nondeterministic() {
        let mdp = convert(&two_state_splits_probabilistic_then_nondeterministic());
        let distributions: Vec<Vec<(usize, f64)>> = mdp
            .distributions(0)
            .map(|d| d.iter().map(|e| (e.column, e.value)).collect())
            .collect();
        assert_eq!(distributions.len(), 2);
        assert_eq!(distributions[0], vec![(1, 0.4), (2, 0.6)]);
        assert_eq!(distributions[1], vec![(1, 0.4), (3, 0.6)]);
    }

    #[test]
    fn test_independent_splits_combine() {
        let mdp = convert(&independent_nondeterministic_splits());
        let distributions: Vec<Vec<(usize, f64)>> = mdp
            .distributions(0)
            .map(|d| d.iter().map(|e| (e.column, e.value)).collect())
            .collect();
        assert_eq!(distributions.len(), 4);
        // Both branches pick state 1: the leaves merge.
        assert!(distributions.contains(&vec![(1, 1.0)]));
        assert!(distributions.contains(&vec![(1, 0.5), (3, 0.5)]));
        assert!(distributions.contains(&vec![(1, 0.5), (2, 0.5)]));
        assert!(distributions.contains(&vec![(2, 0.5), (3, 0.5)]));
    }

    #[test]
    fn test_flat_input_is_unchanged() {
        // A one-level structure is its own flattening.
        let nmdp = one_initial_probabilistic_split();
        let mdp = convert(&nmdp);
        for state in 0..3 {
            let d: Vec<_> = mdp.distributions(state).collect();
            assert_eq!(d.len(), 1);
            assert_eq!(d[0].len(), 1);
            assert_eq!(d[0][0].column, state);
            assert_eq!(d[0][0].value, 1.0);
        }
        assert_eq!(mdp.transition_count(), 6);
    }

    #[test]
    fn test_tree_built_bottom_up() {
        // Leaves first, then their parents.
        let mut nmdp = NestedMarkovDecisionProcess::new(ModelCapacity::TINY, labels());
        let leaves = nmdp.place_for_new_elements(4).unwrap();
        nmdp.add_leaf(leaves, 1, 0.5).unwrap();
        nmdp.add_leaf(leaves + 1, 2, 0.5).unwrap();
        nmdp.add_leaf(leaves + 2, 1, 1.0).unwrap();
        nmdp.add_leaf(leaves + 3, 2, 1.0).unwrap();
        let initial = nmdp.place_for_new_elements(1).unwrap();
        nmdp.add_inner_node(initial, ChoiceType::Probabilistic, leaves, leaves + 1, 1.0);
        nmdp.set_root_of_initial_state(initial);
        let choice = nmdp.place_for_new_elements(1).unwrap();
        nmdp.add_inner_node(choice, ChoiceType::Nondeterministic, leaves + 2, leaves + 3, 1.0);
        nmdp.set_root_of_state(0, choice).unwrap();
        for state in 1..3 {
            let l = nmdp.place_for_new_elements(1).unwrap();
            nmdp.add_leaf(l, state, 1.0).unwrap();
            nmdp.set_root_of_state(state, l).unwrap();
        }

        let mdp = convert(&nmdp);
        let initial: Vec<(usize, f64)> = mdp
            .initial_distributions()
            .next()
            .unwrap()
            .iter()
            .map(|e| (e.column, e.value))
            .collect();
        assert_eq!(initial, vec![(1, 0.5), (2, 0.5)]);
        let distributions: Vec<Vec<(usize, f64)>> = mdp
            .distributions(0)
            .map(|d| d.iter().map(|e| (e.column, e.value)).collect())
            .collect();
        assert_eq!(distributions, vec![vec![(1, 1.0)], vec![(2, 1.0)]]);
    }

    #[test]
    fn test_merge_targets() {
        let mut d = vec![(3, 0.25), (1, 0.5), (3, 0.25)];
        merge_targets(&mut d);
        assert_eq!(d, vec![(1, 0.5), (3, 0.5)]);
    }
}
