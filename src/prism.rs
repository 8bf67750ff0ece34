//! MDP to PRISM explicit format conversion.
//!
//! The output can be fed to PRISM (or Storm) with
//! `prism -importtrans model.tra -importlabels model.lab -mdp`.
//!
//! # Format
//!
//! - State 0 is the artificial initial state; state `i` of the MDP becomes `i + 1`.
//! - The transition text starts with a `states choices transitions` header, followed by one
//!   `source choice target probability` line per transition, sorted by source and choice.
//! - A state without distributions gets a self-loop and the deadlock label.
//! - The label text declares `0="init" 1="deadlock"` followed by the state formula labels of
//!   the model, and then lists `state: label...` for every state with at least one label.
//!
//! # Examples
//!
//! ```
//! use ltmdp_rs::config::ModelCapacity;
//! use ltmdp_rs::formula::StateFormulaSet;
//! use ltmdp_rs::mdp::MarkovDecisionProcess;
//!
//! let mut mdp = MarkovDecisionProcess::new(ModelCapacity::TINY, vec!["goal".to_string()]);
//! mdp.start_with_initial_distributions();
//! mdp.start_with_new_initial_distribution().unwrap();
//! mdp.add_transition_to_initial_distribution(0, 1.0).unwrap();
//! mdp.finish_initial_distribution();
//! mdp.finish_initial_distributions();
//! mdp.set_state_labeling(0, StateFormulaSet::from_bools(&[true])).unwrap();
//! mdp.seal();
//!
//! let prism = mdp.to_prism_explicit().unwrap();
//! assert_eq!(prism.transitions, "2 2 2\n0 0 1 1\n1 0 1 1\n");
//! assert_eq!(prism.labels, "0=\"init\" 1=\"deadlock\" 2=\"goal\"\n0: 0\n1: 1 2\n");
//! ```

use std::fmt;
use std::fmt::Write as _;

use crate::mdp::MarkovDecisionProcess;

/// Configuration options for the PRISM export.
#[derive(Debug, Clone)]
pub struct PrismConfig {
    /// Name of the label of the artificial initial state.
    pub initial_label: &'static str,
    /// Name of the label of states without distributions.
    pub deadlock_label: &'static str,
}

impl Default for PrismConfig {
    fn default() -> Self {
        Self {
            initial_label: "init",
            deadlock_label: "deadlock",
        }
    }
}

/// Contents of the `.tra` and `.lab` files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrismExplicit {
    pub transitions: String,
    pub labels: String,
}

impl MarkovDecisionProcess {
    pub fn to_prism_explicit(&self) -> Result<PrismExplicit, fmt::Error> {
        self.to_prism_explicit_with_config(&PrismConfig::default())
    }

    pub fn to_prism_explicit_with_config(&self, config: &PrismConfig) -> Result<PrismExplicit, fmt::Error> {
        let n = self.state_count();
        let deadlocks: Vec<bool> = (0..n).map(|s| self.distribution_rows(s).is_empty()).collect();
        let deadlock_count = deadlocks.iter().filter(|&&d| d).count();

        let mut tra = String::new();
        writeln!(
            tra,
            "{} {} {}",
            n + 1,
            self.distribution_count() + deadlock_count,
            self.transition_count() + deadlock_count
        )?;
        for (choice, distribution) in self.initial_distributions().enumerate() {
            for e in distribution {
                writeln!(tra, "0 {} {} {}", choice, e.column + 1, e.value)?;
            }
        }
        for state in 0..n {
            if deadlocks[state] {
                writeln!(tra, "{} 0 {} 1", state + 1, state + 1)?;
                continue;
            }
            for (choice, distribution) in self.distributions(state).enumerate() {
                for e in distribution {
                    writeln!(tra, "{} {} {} {}", state + 1, choice, e.column + 1, e.value)?;
                }
            }
        }

        let mut lab = String::new();
        write!(lab, "0=\"{}\" 1=\"{}\"", config.initial_label, config.deadlock_label)?;
        for (i, label) in self.state_formula_labels().iter().enumerate() {
            write!(lab, " {}=\"{}\"", i + 2, label)?;
        }
        writeln!(lab)?;
        writeln!(lab, "0: 0")?;
        for state in 0..n {
            let labeling = self.labeling(state);
            if !deadlocks[state] && labeling.bits() == 0 {
                continue;
            }
            write!(lab, "{}:", state + 1)?;
            if deadlocks[state] {
                write!(lab, " 1")?;
            }
            for label in labeling.iter() {
                write!(lab, " {}", label + 2)?;
            }
            writeln!(lab)?;
        }

        Ok(PrismExplicit {
            transitions: tra,
            labels: lab,
        })
    }
}
