//! Exploration of small executable models, from the model to the probabilities.

use ltmdp_rs::analysis::{build_model_checker, build_model_checker_with};
use ltmdp_rs::builder::{LtmdpBuilder, MdpBuilder};
use ltmdp_rs::checker::{BuiltinMdpModelChecker, BuiltinNmdpModelChecker, ModelCheckerConfig, ProbabilisticModelChecker};
use ltmdp_rs::config::{AnalysisConfiguration, ModelCapacity, ModelCheckerKind};
use ltmdp_rs::error::ModelError;
use ltmdp_rs::formula::{Formula, StateFormulaSet};
use ltmdp_rs::ltmdp_to_nmdp::LtmdpToNmdp;
use ltmdp_rs::resolver::ChoiceResolver;
use ltmdp_rs::traverser::{ExecutableModel, ModelTraverser, Successor};
use ltmdp_rs::types::Probability;
use test_log::test;

// =============================================================================
// Models
// =============================================================================

/// A message is sent at most three times. Before every attempt the sender picks a
/// channel: the first one loses the message with 0.1, the second one with 0.3.
struct Retry;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct Attempt {
    count: u8,
    delivered: bool,
}

impl Retry {
    const LOSS: [f64; 2] = [0.1, 0.3];
    const MAX_ATTEMPTS: u8 = 3;

    fn labels(state: Attempt) -> StateFormulaSet {
        let gave_up = !state.delivered && state.count == Self::MAX_ATTEMPTS;
        StateFormulaSet::from_bools(&[state.delivered, gave_up])
    }
}

impl ExecutableModel for Retry {
    type State = Attempt;

    fn state_formula_labels(&self) -> Vec<String> {
        vec!["delivered".to_string(), "gave_up".to_string()]
    }

    fn initial_step(&self, _: &mut ChoiceResolver) -> Successor<Attempt> {
        let state = Attempt {
            count: 0,
            delivered: false,
        };
        Successor::new(state, Self::labels(state))
    }

    fn step(&self, state: &Attempt, resolver: &mut ChoiceResolver) -> Option<Successor<Attempt>> {
        if state.delivered || state.count == Self::MAX_ATTEMPTS {
            return Some(Successor::new(*state, Self::labels(*state)));
        }
        let loss = Self::LOSS[resolver.handle_choice(2)];
        let lost = resolver.handle_probabilistic_choice(2) == 1;
        resolver.set_probability_of_last_choice(Probability::new(if lost { loss } else { 1.0 - loss }));
        let next = Attempt {
            count: state.count + 1,
            delivered: !lost,
        };
        Some(Successor::new(next, Self::labels(next)))
    }
}

/// Counts up to `end` and stops there, without successors.
struct Countdown {
    end: u32,
}

impl ExecutableModel for Countdown {
    type State = u32;

    fn state_formula_labels(&self) -> Vec<String> {
        vec!["end".to_string()]
    }

    fn initial_step(&self, _: &mut ChoiceResolver) -> Successor<u32> {
        Successor::new(0, StateFormulaSet::EMPTY)
    }

    fn step(&self, state: &u32, _: &mut ChoiceResolver) -> Option<Successor<u32>> {
        (*state < self.end).then(|| Successor::new(state + 1, StateFormulaSet::from_bools(&[state + 1 == self.end])))
    }
}

/// A random walk on `0..=width` that moves left or right with a fair coin;
/// both ends are absorbing.
struct Walk {
    width: u32,
}

impl ExecutableModel for Walk {
    type State = u32;

    fn state_formula_labels(&self) -> Vec<String> {
        vec!["left".to_string(), "right".to_string()]
    }

    fn initial_step(&self, _: &mut ChoiceResolver) -> Successor<u32> {
        let start = self.width / 2;
        Successor::new(start, self.labels(start))
    }

    fn step(&self, state: &u32, resolver: &mut ChoiceResolver) -> Option<Successor<u32>> {
        let next = if *state == 0 || *state == self.width {
            *state
        } else if resolver.handle_probabilistic_choice(2) == 0 {
            state - 1
        } else {
            state + 1
        };
        Some(Successor::new(next, self.labels(next)))
    }
}

impl Walk {
    fn labels(&self, state: u32) -> StateFormulaSet {
        StateFormulaSet::from_bools(&[state == 0, state == self.width])
    }
}

fn config() -> AnalysisConfiguration {
    AnalysisConfiguration::default()
        .with_cpu_count(4)
        .with_model_capacity(ModelCapacity::TINY)
}

fn delivered() -> Formula {
    Formula::finally(Formula::label("delivered"))
}

// =============================================================================
// Both routes
// =============================================================================

#[test]
fn test_retry_both_routes() {
    for kind in [ModelCheckerKind::BuiltinMdp, ModelCheckerKind::BuiltinNmdp] {
        let checker = build_model_checker(&Retry, &config().with_model_checker(kind)).unwrap();
        let p = checker.calculate_probability(&delivered()).unwrap();
        assert!(p.is(1.0 - 0.1f64.powi(3), 1e-9), "{:?}: {}", kind, p);
        let p = checker
            .calculate_probability(&Formula::bounded_finally(Formula::label("delivered"), 2))
            .unwrap();
        assert!(p.is(0.99, 1e-9), "{:?}: {}", kind, p);
        let p = checker.calculate_probability(&Formula::finally(Formula::label("gave_up"))).unwrap();
        assert!(p.is(0.3f64.powi(3), 1e-9), "{:?}: {}", kind, p);
    }
}

#[test]
fn test_retry_minimal_probability() {
    let config = config();

    let traverser = ModelTraverser::new(&Retry, &config).unwrap();
    let mut builder = MdpBuilder::new(config.model_capacity, Retry.state_formula_labels());
    let result = traverser.traverse(&mut builder).unwrap();
    assert_eq!(result.states.len(), 7);
    let flat = BuiltinMdpModelChecker::new(builder.into_model(), ModelCheckerConfig::from(&config));

    let mut builder = LtmdpBuilder::new(config.model_capacity, Retry.state_formula_labels());
    traverser.traverse(&mut builder).unwrap();
    let nmdp = LtmdpToNmdp::new(builder.model()).convert().unwrap();
    let nested = BuiltinNmdpModelChecker::new(nmdp, ModelCheckerConfig::from(&config)).unwrap();

    for checker in [&flat, nested.flat()] {
        let range = checker.calculate_probability_range(&delivered()).unwrap();
        assert!(range.min.is(1.0 - 0.3f64.powi(3), 1e-9), "{}", range.min);
        assert!(range.max.is(1.0 - 0.1f64.powi(3), 1e-9), "{}", range.max);
        assert!(!range.is_exact());
    }
}

#[test]
fn test_walk_is_a_markov_chain() {
    let config = config().with_iterations(2000);
    let traverser = ModelTraverser::new(&Walk { width: 4 }, &config).unwrap();
    let mut builder = MdpBuilder::new(config.model_capacity, vec!["left".into(), "right".into()]);
    let result = traverser.traverse(&mut builder).unwrap();
    assert_eq!(result.states.len(), 5);

    let checker = BuiltinMdpModelChecker::new(builder.into_model(), ModelCheckerConfig::from(&config));
    assert!(checker.is_markov_chain());
    let p = checker.calculate_probability(&Formula::finally(Formula::label("right"))).unwrap();
    assert!(p.is(0.5, 1e-6), "{}", p);
    let p = checker
        .calculate_probability(&Formula::finally(Formula::or(Formula::label("left"), Formula::label("right"))))
        .unwrap();
    assert!(p.is(1.0, 1e-9), "{}", p);
}

// =============================================================================
// Exploration limits
// =============================================================================

#[test]
fn test_deadlock() {
    let result = build_model_checker(&Countdown { end: 3 }, &config());
    assert!(matches!(result, Err(ModelError::Deadlock { .. })));

    let config = config().with_allow_deadlocks(true);
    for kind in [ModelCheckerKind::BuiltinMdp, ModelCheckerKind::BuiltinNmdp] {
        let checker = build_model_checker(&Countdown { end: 3 }, &config.clone().with_model_checker(kind)).unwrap();
        let p = checker.calculate_probability(&Formula::finally(Formula::label("end"))).unwrap();
        assert!(p.is_one(), "{:?}: {}", kind, p);
    }
}

#[test]
fn test_early_termination() {
    let config = config().with_early_termination(true);
    let model = Walk { width: 10 };

    let traverser = ModelTraverser::new(&model, &config)
        .unwrap()
        .with_early_termination(|&state, _| state == 3);
    let mut builder = MdpBuilder::new(config.model_capacity, model.state_formula_labels());
    let result = traverser.traverse(&mut builder).unwrap();
    assert!(result.terminated_early);
    assert!(result.states.len() < 11);

    // The ends were never reached, and unexpanded states are absorbing.
    let checker = build_model_checker_with(&traverser).unwrap();
    let p = checker.calculate_probability(&Formula::finally(Formula::label("left"))).unwrap();
    assert!(p.is_zero(), "{}", p);
}

#[test]
fn test_state_capacity() {
    let config = config().with_model_capacity(ModelCapacity::by_model_size(4, 64));
    let result = build_model_checker(&Walk { width: 10 }, &config);
    assert!(matches!(
        result,
        Err(ModelError::CapacityExceeded {
            resource: "states",
            capacity: 4
        })
    ));
}

// =============================================================================
// Export
// =============================================================================

#[test]
fn test_prism_export_of_explored_model() {
    let config = config();
    let traverser = ModelTraverser::new(&Retry, &config).unwrap();
    let mut builder = MdpBuilder::new(config.model_capacity, Retry.state_formula_labels());
    traverser.traverse(&mut builder).unwrap();
    let prism = builder.into_model().to_prism_explicit().unwrap();

    // 7 states plus the initial state; three undelivered states with two channels each.
    assert_eq!(prism.transitions.lines().next(), Some("8 11 17"));
    assert_eq!(prism.transitions.lines().count(), 18);
    assert!(prism.labels.starts_with("0=\"init\" 1=\"deadlock\" 2=\"delivered\" 3=\"gave_up\"\n0: 0\n"));
    assert_eq!(prism.labels.lines().filter(|l| l.ends_with(" 2")).count(), 3);
    assert_eq!(prism.labels.lines().filter(|l| l.ends_with(" 3")).count(), 1);
}
