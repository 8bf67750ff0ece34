//! Path-replaying choice resolver.
//!
//! The executable model computes the successors of a state by running the same
//! step function once per *path*: every time it reaches a choice it asks the
//! resolver which alternative to take. The resolver enumerates all
//! combinations depth-first with the last choice varying fastest, replaying
//! the already-fixed prefix on every run, so that each combination is visited
//! exactly once.
//!
//! While doing so it records every split in a [`StepGraph`] and in a
//! [`ContinuationDistributionMapper`], which together describe the
//! distributions of the state once all paths are exhausted.
//!
//! # Examples
//!
//! ```
//! use ltmdp_rs::resolver::ChoiceResolver;
//!
//! let mut resolver = ChoiceResolver::new();
//! resolver.prepare_next_state();
//! let mut paths = Vec::new();
//! while resolver.prepare_next_path().unwrap() {
//!     let coin = resolver.handle_probabilistic_choice(2);
//!     let action = resolver.handle_choice(3);
//!     paths.push((coin, action));
//! }
//! assert_eq!(paths.len(), 6);
//! assert_eq!(paths[1], (0, 1));
//! ```

use log::trace;

use crate::error::ModelError;
use crate::mapper::ContinuationDistributionMapper;
use crate::step_graph::StepGraph;
use crate::types::{ChoiceType, Probability};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct ChosenValue {
    option_index: usize,
    continuation_id: usize,
}

#[derive(Debug, Clone)]
pub struct ChoiceResolver {
    step_graph: StepGraph,
    mapper: ContinuationDistributionMapper,
    /// Selected option per choice of the current path.
    chosen_values: Vec<ChosenValue>,
    /// Number of options per choice of the current path (0 once collapsed).
    value_count: Vec<usize>,
    /// Number of choices made so far on the current path.
    depth: usize,
    continuation_id: usize,
    next_free_continuation_id: usize,
    first_path: bool,
}

impl Default for ChoiceResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ChoiceResolver {
    pub fn new() -> Self {
        let mut resolver = Self {
            step_graph: StepGraph::new(),
            mapper: ContinuationDistributionMapper::new(),
            chosen_values: Vec::new(),
            value_count: Vec::new(),
            depth: 0,
            continuation_id: 0,
            next_free_continuation_id: 1,
            first_path: false,
        };
        resolver.mapper.add_initial_distribution_and_continuation(0);
        resolver
    }

    pub fn step_graph(&self) -> &StepGraph {
        &self.step_graph
    }

    pub fn mapper(&self) -> &ContinuationDistributionMapper {
        &self.mapper
    }

    /// The continuation the current path ends in (so far).
    pub fn continuation_id(&self) -> usize {
        self.continuation_id
    }

    /// Index of the last choice made on the current path.
    pub fn last_choice_index(&self) -> Option<usize> {
        self.depth.checked_sub(1)
    }

    /// Options selected on the current path.
    pub fn choices(&self) -> Vec<usize> {
        self.chosen_values.iter().map(|v| v.option_index).collect()
    }

    /// Drops all path state.
    pub fn clear(&mut self) {
        self.chosen_values.clear();
        self.value_count.clear();
        self.depth = 0;
        self.continuation_id = 0;
        self.next_free_continuation_id = 1;
        self.first_path = false;
        self.step_graph.clear();
        self.mapper.add_initial_distribution_and_continuation(0);
    }

    /// Starts the enumeration of the paths of a new state.
    pub fn prepare_next_state(&mut self) {
        self.clear();
        self.first_path = true;
    }

    /// Prepares the next path to be taken.
    ///
    /// Returns `Ok(false)` when every combination of choices has been visited.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Nondeterminism`] when the previous run made fewer choices than
    /// the replayed prefix contains, which means the model does not behave the same way
    /// under the same choices.
    pub fn prepare_next_path(&mut self) -> Result<bool, ModelError> {
        if self.depth != self.value_count.len() {
            return Err(ModelError::Nondeterminism {
                expected: self.value_count.len(),
                actual: self.depth,
            });
        }
        self.depth = 0;

        if self.first_path {
            self.first_path = false;
            return Ok(true);
        }

        while let Some(chosen) = self.chosen_values.pop() {
            let Some(&count) = self.value_count.last() else {
                break;
            };
            if count > chosen.option_index + 1 {
                let next = ChosenValue {
                    option_index: chosen.option_index + 1,
                    continuation_id: chosen.continuation_id + 1,
                };
                self.chosen_values.push(next);
                self.continuation_id = next.continuation_id;
                return Ok(true);
            }
            self.value_count.pop();
        }

        Ok(false)
    }

    /// Handles a nondeterministic choice with `number_of_options` alternatives.
    /// Returns the option to take on the current path.
    pub fn handle_choice(&mut self, number_of_options: usize) -> usize {
        self.handle(number_of_options, ChoiceType::Nondeterministic)
    }

    /// Handles a probabilistic choice with `number_of_options` alternatives.
    /// Returns the option to take on the current path.
    pub fn handle_probabilistic_choice(&mut self, number_of_options: usize) -> usize {
        self.handle(number_of_options, ChoiceType::Probabilistic)
    }

    fn handle(&mut self, number_of_options: usize, kind: ChoiceType) -> usize {
        assert!(number_of_options > 0, "A choice needs at least one option");
        let index = self.depth;
        self.depth += 1;

        if let Some(chosen) = self.chosen_values.get(index) {
            // Replay of an already fixed prefix.
            self.continuation_id = chosen.continuation_id;
            return chosen.option_index;
        }

        let parent = self.continuation_id;
        let from = self.next_free_continuation_id;
        let to = from + number_of_options - 1;
        self.value_count.push(number_of_options);
        self.chosen_values.push(ChosenValue {
            option_index: 0,
            continuation_id: from,
        });
        self.continuation_id = from;
        self.next_free_continuation_id += number_of_options;
        trace!("choice {} ({}): {} -> {}..={}", index, kind, parent, from, to);

        match kind {
            ChoiceType::Probabilistic => {
                self.step_graph.probabilistic_split(parent, from, to);
                self.mapper.probabilistic_split(parent, from, to);
            }
            ChoiceType::Nondeterministic => {
                self.step_graph.nondeterministic_split(parent, from, to);
                self.mapper.nondeterministic_split(parent, from, to);
            }
            _ => unreachable!(),
        }

        0
    }

    /// Sets the probability of the option taken at the last choice.
    ///
    /// Only has an effect when the last choice is the deepest one of the path; replays of
    /// a fixed prefix never overwrite probabilities.
    pub fn set_probability_of_last_choice(&mut self, probability: Probability) {
        if self.depth > 0 && self.depth == self.chosen_values.len() {
            self.step_graph.set_probability_of(self.continuation_id, probability.value());
        }
    }

    /// Collapses the choice at `index` to its first option, which must be the selected one.
    ///
    /// The other options will not be visited anymore, and their continuations are retracted
    /// from the distributions.
    ///
    /// # Panics
    ///
    /// Panics if there is no choice at `index`, or if an option other than the first is selected there.
    pub fn make_choice_at_index_deterministic(&mut self, index: usize) {
        assert!(index < self.chosen_values.len(), "No choice at index {}", index);
        let chosen = self.chosen_values[index];
        assert_eq!(
            chosen.option_index, 0,
            "Only a choice whose first option is selected can be made deterministic"
        );

        let count = self.value_count[index];
        self.value_count[index] = 0;
        let parent = match index {
            0 => 0,
            _ => self.chosen_values[index - 1].continuation_id,
        };

        let kind = self.step_graph.choice_of(parent).kind;
        let siblings = chosen.continuation_id + 1..chosen.continuation_id + count.max(1);
        for sibling in siblings {
            match kind {
                ChoiceType::Probabilistic => self.mapper.remove_cid_in_distributions(sibling),
                ChoiceType::Nondeterministic => self.mapper.remove_distributions_with_cid(sibling),
                _ => {}
            }
        }
        self.step_graph.make_deterministic(parent, chosen.continuation_id);
    }

    /// Preselects the options of a path, e.g. to replay a counterexample.
    ///
    /// The next [`prepare_next_path`](Self::prepare_next_path) returns `true` exactly once.
    pub fn set_choices(&mut self, options: &[usize]) {
        self.clear();
        for &option_index in options {
            self.chosen_values.push(ChosenValue {
                option_index,
                continuation_id: 0,
            });
            self.value_count.push(0);
        }
        self.depth = options.len();
        self.first_path = true;
    }

    /// Product of the probabilities of the options taken on the current path.
    pub fn probability_of_path(&self) -> Probability {
        let p = self.chosen_values[..self.depth.min(self.chosen_values.len())]
            .iter()
            .map(|v| self.step_graph.probability_of(v.continuation_id))
            .product::<f64>();
        Probability::new(p)
    }
}
