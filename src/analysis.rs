//! From an executable model to a model checker.
//!
//! The configured [`ModelCheckerKind`] selects the route:
//!
//! - `BuiltinMdp`: the explorer writes the flat MDP directly ([`MdpBuilder`]);
//! - `BuiltinNmdp`: the explorer records the continuation graph ([`LtmdpBuilder`]),
//!   which is converted into a nested MDP and flattened by the checker.
//!
//! Both routes yield the same probabilities.
//!
//! # Examples
//!
//! ```
//! use ltmdp_rs::analysis::build_model_checker;
//! use ltmdp_rs::config::{AnalysisConfiguration, ModelCapacity};
//! use ltmdp_rs::formula::{Formula, StateFormulaSet};
//! use ltmdp_rs::resolver::ChoiceResolver;
//! use ltmdp_rs::traverser::{ExecutableModel, Successor};
//!
//! /// Throws a die until it shows a six.
//! struct Die;
//!
//! impl ExecutableModel for Die {
//!     type State = bool;
//!
//!     fn state_formula_labels(&self) -> Vec<String> {
//!         vec!["six".to_string()]
//!     }
//!
//!     fn initial_step(&self, _: &mut ChoiceResolver) -> Successor<bool> {
//!         Successor::new(false, StateFormulaSet::EMPTY)
//!     }
//!
//!     fn step(&self, six: &bool, resolver: &mut ChoiceResolver) -> Option<Successor<bool>> {
//!         let six = *six || resolver.handle_probabilistic_choice(6) == 5;
//!         Some(Successor::new(six, StateFormulaSet::from_bools(&[six])))
//!     }
//! }
//!
//! let config = AnalysisConfiguration::default().with_model_capacity(ModelCapacity::TINY);
//! let checker = build_model_checker(&Die, &config).unwrap();
//! let p = checker.calculate_probability(&Formula::finally(Formula::label("six"))).unwrap();
//! assert!(p.is(1.0, 1e-9));
//! ```

use log::info;

use crate::builder::{LtmdpBuilder, MdpBuilder};
use crate::checker::{BuiltinMdpModelChecker, BuiltinNmdpModelChecker, ModelCheckerConfig, ProbabilisticModelChecker};
use crate::config::{AnalysisConfiguration, ModelCheckerKind};
use crate::error::ModelError;
use crate::ltmdp_to_nmdp::LtmdpToNmdp;
use crate::traverser::{ExecutableModel, ModelTraverser};

/// Explores `model` and returns the checker selected by `config`.
pub fn build_model_checker<M: ExecutableModel>(
    model: &M,
    config: &AnalysisConfiguration,
) -> Result<Box<dyn ProbabilisticModelChecker>, ModelError> {
    let traverser = ModelTraverser::new(model, config)?;
    build_model_checker_with(&traverser)
}

/// Like [`build_model_checker`], with a prepared traverser (e.g. one with an early-termination condition).
pub fn build_model_checker_with<M: ExecutableModel>(
    traverser: &ModelTraverser<'_, M>,
) -> Result<Box<dyn ProbabilisticModelChecker>, ModelError> {
    let config = traverser.config();
    let labels = traverser.model().state_formula_labels();
    let checker_config = ModelCheckerConfig::from(config);

    match config.model_checker {
        ModelCheckerKind::BuiltinMdp => {
            let mut builder = MdpBuilder::new(config.model_capacity, labels);
            let result = traverser.traverse(&mut builder)?;
            info!(
                "explored {} states and {} transitions into an MDP",
                result.states.len(),
                result.transitions
            );
            let mdp = builder.into_model();
            Ok(Box::new(BuiltinMdpModelChecker::new(mdp, checker_config)))
        }
        ModelCheckerKind::BuiltinNmdp => {
            let mut builder = LtmdpBuilder::new(config.model_capacity, labels);
            let result = traverser.traverse(&mut builder)?;
            info!(
                "explored {} states and {} transitions into an LTMDP",
                result.states.len(),
                result.transitions
            );
            let ltmdp = builder.into_model();
            let nmdp = LtmdpToNmdp::new(&ltmdp).convert()?;
            Ok(Box::new(BuiltinNmdpModelChecker::new(nmdp, checker_config)?))
        }
    }
}
