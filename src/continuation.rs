//! Persistent continuation graph.
//!
//! The continuation graph stores, for all states of a model, the trees that
//! describe their distributions: inner nodes are probabilistic,
//! nondeterministic or deterministic splits, leaves point to a transition
//! target. Elements live in a single fixed-capacity arena and refer to each
//! other by location (index); the children of an inner node always occupy a
//! contiguous range of locations.

use std::fmt;

use log::trace;

use crate::error::ModelError;
use crate::types::ChoiceType;

/// One node of the continuation graph.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ContinuationGraphElement {
    pub kind: ChoiceType,
    /// First child, or the transition target of a leaf.
    pub from: usize,
    /// Last child, or the transition target of a leaf.
    pub to: usize,
    /// Probability relative to the parent.
    pub probability: f64,
}

impl ContinuationGraphElement {
    /// Marks a location that has been reserved but not written yet.
    const RESERVED: ContinuationGraphElement = ContinuationGraphElement {
        kind: ChoiceType::UnsplitOrFinal,
        from: usize::MAX,
        to: usize::MAX,
        probability: f64::NAN,
    };

    pub fn is_leaf(&self) -> bool {
        self.kind == ChoiceType::UnsplitOrFinal
    }

    /// The transition target of a leaf.
    pub fn target(&self) -> usize {
        assert!(self.is_leaf(), "Element is not a leaf");
        self.from
    }

    fn is_reserved(&self) -> bool {
        self.is_leaf() && self.from == usize::MAX
    }
}

impl fmt::Display for ContinuationGraphElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_leaf() {
            write!(f, "leaf(target: {}, p: {})", self.from, self.probability)
        } else {
            write!(f, "{}({}..={}, p: {})", self.kind, self.from, self.to, self.probability)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContinuationGraph {
    elements: Vec<ContinuationGraphElement>,
    capacity: usize,
}

impl ContinuationGraph {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            elements: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reserves `n` contiguous locations and returns the first one.
    pub fn place_for_new_elements(&mut self, n: usize) -> Result<usize, ModelError> {
        let first = self.elements.len();
        if first + n > self.capacity {
            return Err(ModelError::CapacityExceeded {
                resource: "continuation graph",
                capacity: self.capacity,
            });
        }
        self.elements.resize(first + n, ContinuationGraphElement::RESERVED);
        Ok(first)
    }

    fn write(&mut self, location: usize, element: ContinuationGraphElement) {
        assert!(location < self.elements.len(), "Location {} was not reserved", location);
        assert!(
            self.elements[location].is_reserved(),
            "Location {} is already occupied by {}",
            location,
            self.elements[location]
        );
        trace!("continuation graph [{}] = {}", location, element);
        self.elements[location] = element;
    }

    pub fn add_leaf(&mut self, location: usize, target: usize, probability: f64) {
        self.write(
            location,
            ContinuationGraphElement {
                kind: ChoiceType::UnsplitOrFinal,
                from: target,
                to: target,
                probability,
            },
        );
    }

    pub fn add_inner_node(&mut self, location: usize, kind: ChoiceType, from: usize, to: usize, probability: f64) {
        assert!(kind.is_split(), "Inner node at {} needs a split kind", location);
        assert!(from <= to, "Empty child range {}..={} at {}", from, to, location);
        if kind == ChoiceType::Deterministic {
            assert_eq!(from, to, "Deterministic node at {} must have exactly one child", location);
        }
        self.write(
            location,
            ContinuationGraphElement {
                kind,
                from,
                to,
                probability,
            },
        );
    }

    pub fn element(&self, location: usize) -> &ContinuationGraphElement {
        let element = &self.elements[location];
        assert!(!element.is_reserved(), "Location {} is reserved but unset", location);
        element
    }

    /// Locations of the direct children of `location`. Empty for a leaf.
    pub fn direct_children(&self, location: usize) -> impl Iterator<Item = usize> {
        let element = *self.element(location);
        if element.is_leaf() {
            0..0
        } else {
            element.from..element.to + 1
        }
    }

    /// Visits every element of the tree rooted at `root` in depth-first pre-order.
    ///
    /// The visitor receives the location, the element and its depth below `root`.
    pub fn traverse_tree<F>(&self, root: usize, mut visit: F)
    where
        F: FnMut(usize, &ContinuationGraphElement, usize),
    {
        let mut stack = vec![(root, 0)];
        while let Some((location, depth)) = stack.pop() {
            let element = self.element(location);
            visit(location, element, depth);
            if !element.is_leaf() {
                // Reverse, so that children are visited in increasing order.
                for child in (element.from..=element.to).rev() {
                    stack.push((child, depth + 1));
                }
            }
        }
    }

    /// Folds the tree rooted at `root` bottom-up.
    pub fn fold_tree<T, L, I>(&self, root: usize, leaf: &mut L, inner: &mut I) -> T
    where
        L: FnMut(usize, &ContinuationGraphElement) -> T,
        I: FnMut(usize, &ContinuationGraphElement, Vec<T>) -> T,
    {
        let element = *self.element(root);
        if element.is_leaf() {
            return leaf(root, &element);
        }
        let children = (element.from..=element.to)
            .map(|child| self.fold_tree(child, leaf, inner))
            .collect();
        inner(root, &element, children)
    }

    /// Locations of the leaves of the tree rooted at `root`, in depth-first order.
    pub fn leaves(&self, root: usize) -> Vec<usize> {
        let mut leaves = Vec::new();
        self.traverse_tree(root, |location, element, _| {
            if element.is_leaf() {
                leaves.push(location);
            }
        });
        leaves
    }

    /// Sum over the tree where every node contributes its probability times the sum of its children.
    ///
    /// For a tree without nondeterministic splits this is 1; every nondeterministic split
    /// adds the sums of its alternatives, so the result counts the distributions weighted
    /// by their total mass.
    pub fn probability_sum(&self, root: usize) -> f64 {
        self.fold_tree(
            root,
            &mut |_, e: &ContinuationGraphElement| e.probability,
            &mut |_, e: &ContinuationGraphElement, children: Vec<f64>| e.probability * children.iter().sum::<f64>(),
        )
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    /// root: nondet [leaf -> 7, prob [leaf -> 8 (0.4), leaf -> 9 (0.6)]]
    fn example() -> ContinuationGraph {
        let mut g = ContinuationGraph::with_capacity(16);
        let root = g.place_for_new_elements(1).unwrap();
        let children = g.place_for_new_elements(2).unwrap();
        g.add_inner_node(root, ChoiceType::Nondeterministic, children, children + 1, 1.0);
        g.add_leaf(children, 7, 1.0);
        let grandchildren = g.place_for_new_elements(2).unwrap();
        g.add_inner_node(children + 1, ChoiceType::Probabilistic, grandchildren, grandchildren + 1, 1.0);
        g.add_leaf(grandchildren, 8, 0.4);
        g.add_leaf(grandchildren + 1, 9, 0.6);
        g
    }

    #[test]
    fn test_structure() {
        let g = example();
        assert_eq!(g.len(), 5);
        assert_eq!(g.direct_children(0).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(g.direct_children(1).count(), 0);
        assert_eq!(g.element(1).target(), 7);
        assert_eq!(g.leaves(0), vec![1, 3, 4]);
    }

    #[test]
    fn test_traverse_order() {
        let g = example();
        let mut visited = Vec::new();
        g.traverse_tree(0, |location, _, depth| visited.push((location, depth)));
        assert_eq!(visited, vec![(0, 0), (1, 1), (2, 1), (3, 2), (4, 2)]);
    }

    #[test]
    fn test_probability_sum() {
        let g = example();
        assert!((g.probability_sum(0) - 2.0).abs() < 1e-12);
        assert!((g.probability_sum(2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_capacity() {
        let mut g = ContinuationGraph::with_capacity(2);
        g.place_for_new_elements(2).unwrap();
        assert_eq!(
            g.place_for_new_elements(1),
            Err(ModelError::CapacityExceeded {
                resource: "continuation graph",
                capacity: 2
            })
        );
    }

    #[test]
    #[should_panic(expected = "already occupied")]
    fn test_double_write() {
        let mut g = ContinuationGraph::with_capacity(2);
        let l = g.place_for_new_elements(1).unwrap();
        g.add_leaf(l, 0, 1.0);
        g.add_leaf(l, 1, 1.0);
    }

    #[test]
    #[should_panic(expected = "reserved but unset")]
    fn test_read_unset() {
        let mut g = ContinuationGraph::with_capacity(2);
        let l = g.place_for_new_elements(1).unwrap();
        g.element(l);
    }
}
