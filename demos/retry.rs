//! A sender retries a message over lossy channels, choosing the channel before every attempt.
//!
//! Prints the best and the worst delivery probability over all channel choices,
//! computed on both model representations.
//!
//! ```bash
//! cargo run --example retry -- --attempts 5 --loss 0.1 --loss 0.3 --loss 0.5
//! ```

use std::time::Instant;

use clap::Parser;
use color_eyre::eyre::ensure;

use ltmdp_rs::builder::{LtmdpBuilder, MdpBuilder};
use ltmdp_rs::checker::{BuiltinMdpModelChecker, BuiltinNmdpModelChecker, ModelCheckerConfig};
use ltmdp_rs::config::{AnalysisConfiguration, ModelCapacity};
use ltmdp_rs::formula::{Formula, StateFormulaSet};
use ltmdp_rs::ltmdp_to_nmdp::LtmdpToNmdp;
use ltmdp_rs::resolver::ChoiceResolver;
use ltmdp_rs::traverser::{ExecutableModel, ModelTraverser, Successor};
use ltmdp_rs::types::Probability;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Maximal number of attempts.
    #[arg(long, value_name = "INT", default_value = "3")]
    attempts: u8,

    /// Loss probability of a channel (repeat for more channels).
    #[arg(long, value_name = "FLOAT", default_values_t = [0.1, 0.3])]
    loss: Vec<f64>,

    /// Number of exploration threads.
    #[arg(long, value_name = "INT", default_value = "2")]
    cpus: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct Sender {
    attempts: u8,
    delivered: bool,
}

struct Retry {
    max_attempts: u8,
    loss: Vec<f64>,
}

impl Retry {
    fn labels(&self, state: Sender) -> StateFormulaSet {
        let gave_up = !state.delivered && state.attempts == self.max_attempts;
        StateFormulaSet::from_bools(&[state.delivered, gave_up])
    }
}

impl ExecutableModel for Retry {
    type State = Sender;

    fn state_formula_labels(&self) -> Vec<String> {
        vec!["delivered".to_string(), "gave_up".to_string()]
    }

    fn initial_step(&self, _: &mut ChoiceResolver) -> Successor<Sender> {
        let state = Sender {
            attempts: 0,
            delivered: false,
        };
        Successor::new(state, self.labels(state))
    }

    fn step(&self, state: &Sender, resolver: &mut ChoiceResolver) -> Option<Successor<Sender>> {
        if state.delivered || state.attempts == self.max_attempts {
            return Some(Successor::new(*state, self.labels(*state)));
        }
        let loss = self.loss[resolver.handle_choice(self.loss.len())];
        let lost = resolver.handle_probabilistic_choice(2) == 1;
        resolver.set_probability_of_last_choice(Probability::new(if lost { loss } else { 1.0 - loss }));
        let next = Sender {
            attempts: state.attempts + 1,
            delivered: !lost,
        };
        Some(Successor::new(next, self.labels(next)))
    }
}

fn report(name: &str, checker: &BuiltinMdpModelChecker, attempts: u8) -> color_eyre::Result<()> {
    let delivered = Formula::finally(Formula::label("delivered"));
    println!("{}: P(F delivered) in {}", name, checker.calculate_probability_range(&delivered)?);
    for steps in 1..=attempts as usize {
        let within = Formula::bounded_finally(Formula::label("delivered"), steps);
        println!("{}: P(F<={} delivered) in {}", name, steps, checker.calculate_probability_range(&within)?);
    }
    Ok(())
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let args = Cli::parse();
    println!("args = {:?}", args);
    ensure!(!args.loss.is_empty(), "at least one channel is needed");
    ensure!(
        args.loss.iter().all(|p| (0.0..=1.0).contains(p)),
        "loss probabilities must be in [0, 1]"
    );

    let model = Retry {
        max_attempts: args.attempts,
        loss: args.loss.clone(),
    };
    let config = AnalysisConfiguration::default()
        .with_cpu_count(args.cpus)
        .with_model_capacity(ModelCapacity::SMALL);
    let checker_config = ModelCheckerConfig::from(&config);
    let traverser = ModelTraverser::new(&model, &config)?;

    let time_flat = Instant::now();
    let mut builder = MdpBuilder::new(config.model_capacity, model.state_formula_labels());
    let result = traverser.traverse(&mut builder)?;
    println!("explored {} states, {} transitions", result.states.len(), result.transitions);
    let flat = BuiltinMdpModelChecker::new(builder.into_model(), checker_config);
    report("mdp", &flat, args.attempts)?;
    println!("mdp route took {:.3} s", time_flat.elapsed().as_secs_f64());

    let time_nested = Instant::now();
    let mut builder = LtmdpBuilder::new(config.model_capacity, model.state_formula_labels());
    traverser.traverse(&mut builder)?;
    let nmdp = LtmdpToNmdp::new(builder.model()).convert()?;
    println!("nested model: {} initial distributions", nmdp.count_initial_distributions());
    let nested = BuiltinNmdpModelChecker::new(nmdp, checker_config)?;
    report("nmdp", nested.flat(), args.attempts)?;
    println!("nmdp route took {:.3} s", time_nested.elapsed().as_secs_f64());

    let best = args.loss.iter().copied().fold(1.0, f64::min);
    let worst = args.loss.iter().copied().fold(0.0, f64::max);
    println!(
        "closed form: [{:.9}, {:.9}]",
        1.0 - worst.powi(args.attempts as i32),
        1.0 - best.powi(args.attempts as i32)
    );

    Ok(())
}
