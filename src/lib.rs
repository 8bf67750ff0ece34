//! # ltmdp-rs: Labeled Transition Markov Decision Processes in Rust
//!
//! **`ltmdp-rs`** explores executable probabilistic models on the fly and computes reachability
//! probabilities over the resulting Markov decision processes.
//!
//! ## How it works
//!
//! An executable model computes the successors of a state by asking a [`ChoiceResolver`][crate::resolver::ChoiceResolver]
//! for every decision it makes: *probabilistic* decisions (a fair coin, a failure that occurs with some probability)
//! and *nondeterministic* decisions (which request a scheduler serves first).
//! The resolver replays the model once per combination of decisions, and records every split
//! in a [`StepGraph`][crate::step_graph::StepGraph] and a [`ContinuationDistributionMapper`][crate::mapper::ContinuationDistributionMapper].
//!
//! From there, two routes lead to a model checker:
//!
//! - **Flat**: the mapper already knows which continuations form a probability distribution,
//!   so the transitions go straight into a [`MarkovDecisionProcess`][crate::mdp::MarkovDecisionProcess].
//! - **Nested**: the step graphs are persisted into a [`LabeledTransitionMarkovDecisionProcess`][crate::ltmdp::LabeledTransitionMarkovDecisionProcess], converted to a
//!   [`NestedMarkovDecisionProcess`][crate::nmdp::NestedMarkovDecisionProcess], and flattened by
//!   [`NmdpToMdp`][crate::nmdp_to_mdp::NmdpToMdp] only when a query is answered.
//!
//! Both routes give the same probabilities.
//!
//! ## Key Features
//!
//! - **Exact enumeration**: every resolution of nondeterminism is visited exactly once, without re-exploring the other branches.
//! - **Fixed-capacity storage**: all arenas are sized by a [`ModelCapacity`][crate::config::ModelCapacity] and report
//!   [`ModelError::CapacityExceeded`][crate::error::ModelError::CapacityExceeded] instead of growing past it.
//! - **Parallel exploration**: states of one breadth-first level are expanded on a `rayon` pool.
//! - **Graph-based precomputation**: states with probability 0 or 1 are found before any numerics run.
//!
//! ## Basic Usage
//!
//! ```rust
//! use ltmdp_rs::checker::{BuiltinMdpModelChecker, ModelCheckerConfig, ProbabilisticModelChecker};
//! use ltmdp_rs::config::ModelCapacity;
//! use ltmdp_rs::formula::{Formula, StateFormulaSet};
//! use ltmdp_rs::mdp::MarkovDecisionProcess;
//!
//! // 1. Build an MDP by hand: from the initial state, reach state 1 with 0.6
//! let mut mdp = MarkovDecisionProcess::new(ModelCapacity::TINY, vec!["goal".to_string()]);
//! mdp.start_with_initial_distributions();
//! mdp.start_with_new_initial_distribution().unwrap();
//! mdp.add_transition_to_initial_distribution(0, 1.0).unwrap();
//! mdp.finish_initial_distribution();
//! mdp.finish_initial_distributions();
//!
//! mdp.start_with_new_distributions(0);
//! mdp.start_with_new_distribution().unwrap();
//! mdp.add_transition(1, 0.6).unwrap();
//! mdp.add_transition(0, 0.4).unwrap();
//! mdp.finish_distribution();
//! mdp.finish_distributions().unwrap();
//!
//! mdp.start_with_new_distributions(1);
//! mdp.start_with_new_distribution().unwrap();
//! mdp.add_transition(1, 1.0).unwrap();
//! mdp.finish_distribution();
//! mdp.finish_distributions().unwrap();
//!
//! mdp.set_state_labeling(1, StateFormulaSet::from_bools(&[true])).unwrap();
//! mdp.seal();
//!
//! // 2. Ask for the probability of eventually reaching the goal
//! let checker = BuiltinMdpModelChecker::new(mdp, ModelCheckerConfig::default());
//! let p = checker.calculate_probability(&Formula::finally(Formula::label("goal"))).unwrap();
//! assert!(p.is(1.0, 1e-9));
//!
//! let p = checker.calculate_probability(&Formula::bounded_finally(Formula::label("goal"), 1)).unwrap();
//! assert!(p.is(0.6, 1e-9));
//! ```
//!
//! For models given as code, see [`analysis::build_model_checker`].
//!
//! ## Core Components
//!
//! - **[`mapper`]**, **[`resolver`]**, **[`step_graph`]**: enumeration of the choices made while computing successors.
//! - **[`traverser`]**: parallel breadth-first exploration of an [`ExecutableModel`][crate::traverser::ExecutableModel].
//! - **[`builder`]**: the two sinks of the explorer, one per route.
//! - **[`ltmdp_to_nmdp`]**, **[`nmdp_to_mdp`]**: conversions between the model representations.
//! - **[`checker`]**: reachability probabilities over sparse matrices.
//! - **[`prism`]**: export to the PRISM explicit format.

pub mod analysis;
pub mod bitset;
pub mod builder;
pub mod checker;
pub mod config;
pub mod continuation;
pub mod error;
pub mod formula;
pub mod graph;
pub mod ltmdp;
pub mod ltmdp_to_nmdp;
pub mod mapper;
pub mod mdp;
pub mod nmdp;
pub mod nmdp_to_mdp;
pub mod prism;
pub mod resolver;
pub mod sparse;
pub mod step_graph;
pub mod storage;
pub mod transition;
pub mod traverser;
pub mod types;
