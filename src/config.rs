//! Analysis configuration.
//!
//! # Examples
//!
//! ```
//! use ltmdp_rs::config::{AnalysisConfiguration, ModelCapacity, ModelCheckerKind};
//!
//! let config = AnalysisConfiguration::default()
//!     .with_cpu_count(2)
//!     .with_model_capacity(ModelCapacity::TINY)
//!     .with_model_checker(ModelCheckerKind::BuiltinNmdp);
//! assert_eq!(config.cpu_count, 2);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::ModelError;

/// Hard limits for the arenas of a model under construction.
///
/// Arenas allocate lazily but never grow beyond these limits; exceeding one
/// aborts the construction with [`ModelError::CapacityExceeded`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ModelCapacity {
    /// Maximal number of states.
    pub states: usize,
    /// Maximal number of transition targets.
    pub transitions: usize,
    /// Maximal number of continuation graph elements.
    pub continuation_graph_size: usize,
}

impl ModelCapacity {
    pub const TINY: ModelCapacity = ModelCapacity::by_model_size(1 << 10, 1 << 14);
    pub const SMALL: ModelCapacity = ModelCapacity::by_model_size(1 << 16, 1 << 20);
    pub const NORMAL: ModelCapacity = ModelCapacity::by_model_size(1 << 20, 1 << 24);
    pub const LARGE: ModelCapacity = ModelCapacity::by_model_size(1 << 24, 1 << 28);

    /// Every transition target needs a leaf, and there are at most as many
    /// inner nodes as leaves.
    pub const fn by_model_size(states: usize, transitions: usize) -> Self {
        ModelCapacity {
            states,
            transitions,
            continuation_graph_size: transitions.saturating_mul(2),
        }
    }

    /// Capacity for `states` states with on average `density` transitions each.
    pub const fn by_model_density(states: usize, density: usize) -> Self {
        Self::by_model_size(states, states.saturating_mul(density))
    }
}

impl Default for ModelCapacity {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// Which model checker answers the queries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ModelCheckerKind {
    /// The explorer builds the flat MDP directly.
    #[default]
    BuiltinMdp,
    /// The explorer builds the continuation-graph model, which is flattened on demand.
    BuiltinNmdp,
}

#[derive(Debug, Clone)]
pub struct AnalysisConfiguration {
    /// Number of worker threads used for exploration (default: all cores).
    pub cpu_count: usize,
    pub model_capacity: ModelCapacity,
    /// Maximal number of successor transitions of a single state (default: 1 << 16).
    pub successor_capacity: usize,
    /// Give states without successors a stuttering self-loop instead of failing (default: false).
    pub allow_deadlocks: bool,
    /// Stop exploring once the early-termination condition holds (default: false).
    pub enable_early_termination: bool,
    pub model_checker: ModelCheckerKind,
    /// Iteration budget of the Gauss-Seidel solver (default: 50).
    pub gauss_seidel_iterations: usize,
    /// Iteration budget of the min/max value iteration (default: 50).
    pub value_iteration_steps: usize,
}

impl Default for AnalysisConfiguration {
    fn default() -> Self {
        Self {
            cpu_count: available_cpus(),
            model_capacity: ModelCapacity::default(),
            successor_capacity: 1 << 16,
            allow_deadlocks: false,
            enable_early_termination: false,
            model_checker: ModelCheckerKind::default(),
            gauss_seidel_iterations: 50,
            value_iteration_steps: 50,
        }
    }
}

fn available_cpus() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

impl AnalysisConfiguration {
    /// Minimal size of the successor buffer of a worker.
    pub const MIN_SUCCESSOR_CAPACITY: usize = 1024;

    /// Sets the number of workers, clamped to `1..=available_parallelism`.
    pub fn with_cpu_count(mut self, cpu_count: usize) -> Self {
        self.cpu_count = cpu_count.clamp(1, available_cpus().max(1));
        self
    }

    pub fn with_model_capacity(mut self, model_capacity: ModelCapacity) -> Self {
        self.model_capacity = model_capacity;
        self
    }

    pub fn with_successor_capacity(mut self, successor_capacity: usize) -> Self {
        self.successor_capacity = successor_capacity.max(Self::MIN_SUCCESSOR_CAPACITY);
        self
    }

    pub fn with_allow_deadlocks(mut self, allow_deadlocks: bool) -> Self {
        self.allow_deadlocks = allow_deadlocks;
        self
    }

    pub fn with_early_termination(mut self, enable: bool) -> Self {
        self.enable_early_termination = enable;
        self
    }

    pub fn with_model_checker(mut self, model_checker: ModelCheckerKind) -> Self {
        self.model_checker = model_checker;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.gauss_seidel_iterations = iterations;
        self.value_iteration_steps = iterations;
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.cpu_count == 0 {
            return Err(ModelError::InvalidConfiguration("cpu_count must be positive".into()));
        }
        if self.successor_capacity == 0 {
            return Err(ModelError::InvalidConfiguration("successor_capacity must be positive".into()));
        }
        let c = &self.model_capacity;
        if c.states == 0 || c.transitions == 0 || c.continuation_graph_size == 0 {
            return Err(ModelError::InvalidConfiguration(format!("empty model capacity {:?}", c)));
        }
        Ok(())
    }
}
