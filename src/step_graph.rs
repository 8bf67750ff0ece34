//! Split log of a single state's successor computation.
//!
//! The step graph records, for every continuation id created while the
//! successors of one state are computed, how it was split and which
//! probability it carries relative to its parent. It is later copied into the
//! persistent continuation graph of the model.

use std::ops::RangeInclusive;

use log::trace;

use crate::types::ChoiceType;

/// The split applied to one continuation, and its own probability.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Choice {
    pub kind: ChoiceType,
    /// First child (if split).
    pub from: usize,
    /// Last child (if split).
    pub to: usize,
    pub probability: f64,
}

impl Choice {
    fn leaf(probability: f64) -> Self {
        Choice {
            kind: ChoiceType::UnsplitOrFinal,
            from: 0,
            to: 0,
            probability,
        }
    }

    pub fn children(&self) -> Option<RangeInclusive<usize>> {
        match self.kind {
            ChoiceType::UnsplitOrFinal => None,
            _ => Some(self.from..=self.to),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepGraph {
    choices: Vec<Choice>,
}

impl Default for StepGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl StepGraph {
    /// Creates a step graph containing only the root continuation 0.
    pub fn new() -> Self {
        Self {
            choices: vec![Choice::leaf(1.0)],
        }
    }

    pub fn clear(&mut self) {
        self.choices.clear();
        self.choices.push(Choice::leaf(1.0));
    }

    /// Number of declared continuations (including the root).
    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn choice_of(&self, cid: usize) -> &Choice {
        assert!(cid < self.choices.len(), "Continuation {} is not declared", cid);
        &self.choices[cid]
    }

    pub fn probability_of(&self, cid: usize) -> f64 {
        self.choice_of(cid).probability
    }

    pub fn set_probability_of(&mut self, cid: usize, probability: f64) {
        assert!(cid < self.choices.len(), "Continuation {} is not declared", cid);
        self.choices[cid].probability = probability;
    }

    /// Direct children of `cid` in increasing order. Empty for an unsplit continuation.
    pub fn direct_children(&self, cid: usize) -> impl Iterator<Item = usize> {
        self.choice_of(cid).children().into_iter().flatten()
    }

    fn split(&mut self, kind: ChoiceType, parent: usize, from: usize, to: usize, default_probability: f64) {
        assert!(from <= to, "Empty split range {}..={}", from, to);
        assert!(
            self.choices.len() - 1 < from,
            "Children {}..={} of continuation {} are already declared",
            from,
            to,
            parent
        );
        let choice = *self.choice_of(parent);
        assert!(!choice.kind.is_split(), "Continuation {} was already split", parent);
        trace!("step graph: {} split {} -> {}..={}", kind, parent, from, to);

        self.choices.resize(to + 1, Choice::leaf(default_probability));
        for c in &mut self.choices[from..=to] {
            c.probability = default_probability;
        }
        let parent = &mut self.choices[parent];
        parent.kind = kind;
        parent.from = from;
        parent.to = to;
    }

    /// Children get probability `1/n` until told otherwise.
    pub fn probabilistic_split(&mut self, parent: usize, from: usize, to: usize) {
        let n = (to + 1).saturating_sub(from);
        self.split(ChoiceType::Probabilistic, parent, from, to, 1.0 / n as f64);
    }

    /// Children get probability 1.
    pub fn nondeterministic_split(&mut self, parent: usize, from: usize, to: usize) {
        self.split(ChoiceType::Nondeterministic, parent, from, to, 1.0);
    }

    /// Collapses the split of `parent` to its single child `chosen`.
    pub fn make_deterministic(&mut self, parent: usize, chosen: usize) {
        let choice = *self.choice_of(parent);
        assert!(
            choice.children().is_some_and(|r| r.contains(&chosen)),
            "Continuation {} is not a child of {}",
            chosen,
            parent
        );
        self.choices[parent] = Choice {
            kind: ChoiceType::Deterministic,
            from: chosen,
            to: chosen,
            probability: choice.probability,
        };
        self.choices[chosen].probability = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_root() {
        let g = StepGraph::new();
        assert_eq!(g.len(), 1);
        assert_eq!(g.probability_of(0), 1.0);
        assert_eq!(g.direct_children(0).count(), 0);
    }

    #[test]
    fn test_probabilistic_defaults() {
        let mut g = StepGraph::new();
        g.probabilistic_split(0, 1, 3);
        assert_eq!(g.direct_children(0).collect::<Vec<_>>(), vec![1, 2, 3]);
        for cid in 1..=3 {
            assert!((g.probability_of(cid) - 1.0 / 3.0).abs() < 1e-12);
        }
        assert_eq!(g.choice_of(0).kind, ChoiceType::Probabilistic);
    }

    #[test]
    fn test_nested_splits() {
        let mut g = StepGraph::new();
        g.probabilistic_split(0, 1, 3);
        g.nondeterministic_split(1, 4, 5);
        assert_eq!(g.direct_children(0).count(), 3);
        assert_eq!(g.direct_children(1).count(), 2);
        assert_eq!(g.probability_of(5), 1.0);
        g.make_deterministic(1, 4);
        assert_eq!(g.direct_children(1).collect::<Vec<_>>(), vec![4]);
        assert_eq!(g.choice_of(1).kind, ChoiceType::Deterministic);
    }

    #[test]
    #[should_panic(expected = "already declared")]
    fn test_children_declared_twice() {
        let mut g = StepGraph::new();
        g.probabilistic_split(0, 1, 2);
        g.probabilistic_split(1, 2, 3);
    }

    #[test]
    #[should_panic(expected = "was already split")]
    fn test_parent_split_twice() {
        let mut g = StepGraph::new();
        g.probabilistic_split(0, 1, 2);
        g.probabilistic_split(0, 3, 4);
    }
}
