//! Transitions as produced by the executable model, and the fixed-capacity
//! buffer they are collected in.

use std::fmt;
use std::hash::Hash;
use std::ops::Index;

use crate::error::ModelError;
use crate::formula::StateFormulaSet;
use crate::types::Probability;

/// Identity of an explored state of the executable model.
///
/// Only equality and hashing are required; the bytes of a state are never inspected.
pub trait StateKey: Clone + Eq + Hash + fmt::Debug + Send + Sync {}

impl<T> StateKey for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync {}

/// Faults activated on a transition, as a bit mask.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct FaultSet(u64);

impl FaultSet {
    pub const EMPTY: FaultSet = FaultSet(0);

    pub fn from_bits(bits: u64) -> Self {
        FaultSet(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn with(self, fault: usize) -> Self {
        assert!(fault < 64, "Fault index {} is too large", fault);
        FaultSet(self.0 | (1 << fault))
    }

    pub fn contains(self, fault: usize) -> bool {
        fault < 64 && (self.0 >> fault) & 1 == 1
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// A successor computed for a model state, before its target is interned.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTransition<S> {
    pub target: S,
    /// Continuation the transition is attached to.
    pub continuation_id: usize,
    pub probability: Probability,
    pub formulas: StateFormulaSet,
    pub faults: FaultSet,
}

/// A successor whose target has been given a state index.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transition {
    pub target_state: usize,
    pub continuation_id: usize,
    pub probability: Probability,
    pub formulas: StateFormulaSet,
    pub faults: FaultSet,
}

/// An append-only buffer with a fixed capacity.
///
/// The buffer never grows past the capacity it was created with; exceeding it
/// is reported as [`ModelError::CapacityExceeded`].
#[derive(Debug, Clone)]
pub struct TransitionBuffer<T> {
    items: Vec<T>,
    capacity: usize,
    resource: &'static str,
}

impl<T> TransitionBuffer<T> {
    /// Memory reserved up front; the rest is allocated on demand, up to the capacity.
    const EAGER_LIMIT: usize = 1 << 12;

    pub fn with_capacity(capacity: usize) -> Self {
        Self::for_resource("successor transitions", capacity)
    }

    /// A buffer whose capacity errors name `resource`.
    pub fn for_resource(resource: &'static str, capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity.min(Self::EAGER_LIMIT)),
            capacity,
            resource,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends an item and returns its index.
    pub fn push(&mut self, item: T) -> Result<usize, ModelError> {
        if self.items.len() >= self.capacity {
            return Err(ModelError::CapacityExceeded {
                resource: self.resource,
                capacity: self.capacity,
            });
        }
        self.items.push(item);
        Ok(self.items.len() - 1)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> Index<usize> for TransitionBuffer<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<'a, T> IntoIterator for &'a TransitionBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
