//! Breadth-first exploration of an executable model.
//!
//! The traverser expands the states of one level in parallel on a private
//! `rayon` pool. Every worker owns a [`ChoiceResolver`] and a fixed-capacity
//! successor buffer, and runs the model once per path of the state it
//! expands. Once the level is done, the expansions are committed one by one
//! on the calling thread: targets are interned, and the successors go to the
//! [`TransitionSink`].
//!
//! States are identified by their key together with the state formulas they
//! satisfy, so the numbering is independent of the number of workers.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, trace};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::builder::{TransitionBatch, TransitionSink};
use crate::config::AnalysisConfiguration;
use crate::error::ModelError;
use crate::formula::{check_state_formula_labels, StateFormulaSet};
use crate::mapper::ContinuationDistributionMapper;
use crate::resolver::ChoiceResolver;
use crate::step_graph::StepGraph;
use crate::storage::StateStorage;
use crate::transition::{CandidateTransition, FaultSet, StateKey, Transition, TransitionBuffer};
use crate::types::Probability;

/// Result of running the model along one path.
#[derive(Debug, Clone, PartialEq)]
pub struct Successor<S> {
    pub state: S,
    /// State formulas satisfied by `state`.
    pub formulas: StateFormulaSet,
    pub faults: FaultSet,
}

impl<S> Successor<S> {
    pub fn new(state: S, formulas: StateFormulaSet) -> Self {
        Self {
            state,
            formulas,
            faults: FaultSet::EMPTY,
        }
    }

    pub fn with_faults(mut self, faults: FaultSet) -> Self {
        self.faults = faults;
        self
    }
}

/// A model whose successor function asks a [`ChoiceResolver`] for every choice it makes.
///
/// Running the model twice with the same answers must make the same choices.
pub trait ExecutableModel: Sync {
    type State: StateKey;

    fn state_formula_labels(&self) -> Vec<String>;

    fn initial_step(&self, resolver: &mut ChoiceResolver) -> Successor<Self::State>;

    /// Returns `None` if `state` has no successors; no choice may be made in that case.
    fn step(&self, state: &Self::State, resolver: &mut ChoiceResolver) -> Option<Successor<Self::State>>;
}

/// Condition on newly found states that stops the exploration.
pub type EarlyTermination<S> = Box<dyn Fn(&S, StateFormulaSet) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
pub struct TraversalResult<S> {
    /// Explored states with their formulas, by state index.
    pub states: Vec<(S, StateFormulaSet)>,
    pub transitions: usize,
    pub levels: usize,
    pub terminated_early: bool,
}

/// The successors of one state, computed by a worker.
struct Expansion<S> {
    source: Option<usize>,
    candidates: Vec<CandidateTransition<S>>,
    step_graph: StepGraph,
    mapper: ContinuationDistributionMapper,
}

pub struct ModelTraverser<'m, M: ExecutableModel> {
    model: &'m M,
    config: AnalysisConfiguration,
    pool: ThreadPool,
    early_termination: Option<EarlyTermination<M::State>>,
    stop: AtomicBool,
}

impl<'m, M: ExecutableModel> ModelTraverser<'m, M> {
    pub fn new(model: &'m M, config: &AnalysisConfiguration) -> Result<Self, ModelError> {
        config.validate()?;
        check_state_formula_labels(&model.state_formula_labels())?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.cpu_count)
            .thread_name(|i| format!("explorer-{}", i))
            .build()
            .map_err(|e| ModelError::InvalidConfiguration(format!("cannot start workers: {}", e)))?;
        Ok(Self {
            model,
            config: config.clone(),
            pool,
            early_termination: None,
            stop: AtomicBool::new(false),
        })
    }

    pub fn model(&self) -> &M {
        self.model
    }

    pub fn config(&self) -> &AnalysisConfiguration {
        &self.config
    }

    /// Stops the exploration once a state satisfying `condition` is found.
    ///
    /// Only has an effect if early termination is enabled in the configuration.
    pub fn with_early_termination<F>(mut self, condition: F) -> Self
    where
        F: Fn(&M::State, StateFormulaSet) -> bool + Send + Sync + 'static,
    {
        self.early_termination = Some(Box::new(condition));
        self
    }

    pub fn traverse<T: TransitionSink>(&self, sink: &mut T) -> Result<TraversalResult<M::State>, ModelError> {
        self.stop.store(false, Ordering::Relaxed);
        let capacity = self.config.successor_capacity;
        let mut storage = StateStorage::with_capacity(self.config.model_capacity.states);
        let mut batch = TransitionBatch::new(capacity);
        let mut frontier = Vec::new();

        let initial = {
            let mut resolver = ChoiceResolver::new();
            let mut buffer = TransitionBuffer::with_capacity(capacity);
            self.expand(None, &mut resolver, &mut buffer)?
        };
        let mut transitions = self.commit(initial, &mut storage, &mut batch, &mut frontier, sink)?;
        info!("initial state has {} successor states", frontier.len());

        let mut levels = 0;
        while !frontier.is_empty() && !self.stop.load(Ordering::Relaxed) {
            levels += 1;
            let known = &storage;
            let expansions: Vec<Result<Expansion<M::State>, ModelError>> = self.pool.install(|| {
                frontier
                    .par_iter()
                    .map_init(
                        || (ChoiceResolver::new(), TransitionBuffer::with_capacity(capacity)),
                        |(resolver, buffer), &state| {
                            if self.stop.load(Ordering::Relaxed) {
                                return None;
                            }
                            let key = &known.key(state).0;
                            Some(self.expand(Some((state, key)), resolver, buffer))
                        },
                    )
                    .flatten()
                    .collect()
            });

            let expanded = expansions.len();
            let mut next = Vec::new();
            for expansion in expansions {
                transitions += self.commit(expansion?, &mut storage, &mut batch, &mut next, sink)?;
            }
            info!(
                "level {}: expanded {} states, found {} new states ({} in total)",
                levels,
                expanded,
                next.len(),
                storage.len()
            );
            frontier = next;
        }

        let terminated_early = self.stop.load(Ordering::Relaxed);
        if terminated_early {
            info!("exploration stopped early after {} levels", levels);
        }
        Ok(TraversalResult {
            states: storage.into_keys(),
            transitions,
            levels,
            terminated_early,
        })
    }

    /// Runs the model along every path of `source` (the initial state if `None`).
    fn expand(
        &self,
        source: Option<(usize, &M::State)>,
        resolver: &mut ChoiceResolver,
        buffer: &mut TransitionBuffer<CandidateTransition<M::State>>,
    ) -> Result<Expansion<M::State>, ModelError> {
        resolver.prepare_next_state();
        buffer.clear();
        while resolver.prepare_next_path()? {
            let successor = match source {
                None => Some(self.model.initial_step(resolver)),
                Some((_, state)) => self.model.step(state, resolver),
            };
            let Some(successor) = successor else {
                if resolver.last_choice_index().is_some() {
                    return Err(ModelError::InvalidConfiguration(format!(
                        "state {:?} has no successor after making choices",
                        source.map(|(index, _)| index)
                    )));
                }
                continue;
            };
            if self.config.enable_early_termination {
                if let Some(condition) = &self.early_termination {
                    if condition(&successor.state, successor.formulas) {
                        debug!("early termination condition holds for {:?}", successor.state);
                        self.stop.store(true, Ordering::Relaxed);
                    }
                }
            }
            buffer.push(CandidateTransition {
                target: successor.state,
                continuation_id: resolver.continuation_id(),
                probability: resolver.probability_of_path(),
                formulas: successor.formulas,
                faults: successor.faults,
            })?;
        }
        Ok(Expansion {
            source: source.map(|(index, _)| index),
            candidates: buffer.as_slice().to_vec(),
            step_graph: resolver.step_graph().clone(),
            mapper: resolver.mapper().clone(),
        })
    }

    /// Interns the targets of `expansion` and hands its successors to `sink`.
    ///
    /// Returns the number of transitions committed.
    fn commit<T: TransitionSink>(
        &self,
        expansion: Expansion<M::State>,
        storage: &mut StateStorage<(M::State, StateFormulaSet)>,
        batch: &mut TransitionBatch,
        found: &mut Vec<usize>,
        sink: &mut T,
    ) -> Result<usize, ModelError> {
        batch.transitions.clear();
        batch.step_graph = expansion.step_graph;
        batch.mapper = expansion.mapper;
        for candidate in expansion.candidates {
            let (index, added) = storage.put((candidate.target, candidate.formulas))?;
            if added {
                found.push(index);
            }
            batch.transitions.push(Transition {
                target_state: index,
                continuation_id: candidate.continuation_id,
                probability: candidate.probability,
                formulas: candidate.formulas,
                faults: candidate.faults,
            })?;
        }

        if batch.transitions.is_empty() && self.config.allow_deadlocks {
            if let Some(state) = expansion.source {
                trace!("state {} deadlocks, adding a self-loop", state);
                batch.transitions.push(Transition {
                    target_state: state,
                    continuation_id: 0,
                    probability: Probability::ONE,
                    formulas: storage.key(state).1,
                    faults: FaultSet::EMPTY,
                })?;
            }
        }

        sink.process_transitions(expansion.source, batch)?;
        Ok(batch.transitions.len())
    }
}
