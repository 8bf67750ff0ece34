//! Knuth and Yao's die: a fair six-sided die simulated with a fair coin.
//!
//! ```bash
//! cargo run --example dice -- --checker nmdp --prism dice
//! ```

use std::fs;

use clap::{Parser, ValueEnum};
use log::info;

use ltmdp_rs::analysis::build_model_checker;
use ltmdp_rs::builder::MdpBuilder;
use ltmdp_rs::config::{AnalysisConfiguration, ModelCapacity, ModelCheckerKind};
use ltmdp_rs::formula::{Formula, StateFormulaSet};
use ltmdp_rs::resolver::ChoiceResolver;
use ltmdp_rs::traverser::{ExecutableModel, ModelTraverser, Successor};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Checker {
    /// Build the flat MDP during exploration
    Mdp,
    /// Build the continuation graph and flatten it afterwards
    Nmdp,
}

impl From<Checker> for ModelCheckerKind {
    fn from(checker: Checker) -> Self {
        match checker {
            Checker::Mdp => ModelCheckerKind::BuiltinMdp,
            Checker::Nmdp => ModelCheckerKind::BuiltinNmdp,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Model checker to use.
    #[arg(long, value_enum, default_value = "mdp")]
    checker: Checker,

    /// Number of exploration threads.
    #[arg(long, value_name = "INT", default_value = "1")]
    cpus: usize,

    /// Iteration budget of the solver.
    #[arg(long, value_name = "INT", default_value = "100")]
    iterations: usize,

    /// Also write the model to `<PREFIX>.tra` and `<PREFIX>.lab`.
    #[arg(long, value_name = "PREFIX")]
    prism: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum Die {
    /// Inner node of the coin-flipping tree.
    Coin(u8),
    /// The die shows this face.
    Face(u8),
}

struct KnuthYao;

impl KnuthYao {
    fn labels(state: Die) -> StateFormulaSet {
        match state {
            Die::Coin(_) => StateFormulaSet::EMPTY,
            Die::Face(face) => StateFormulaSet::EMPTY.with(face as usize - 1),
        }
    }
}

impl ExecutableModel for KnuthYao {
    type State = Die;

    fn state_formula_labels(&self) -> Vec<String> {
        (1..=6).map(|face| format!("face{}", face)).collect()
    }

    fn initial_step(&self, _: &mut ChoiceResolver) -> Successor<Die> {
        Successor::new(Die::Coin(0), StateFormulaSet::EMPTY)
    }

    fn step(&self, state: &Die, resolver: &mut ChoiceResolver) -> Option<Successor<Die>> {
        let next = match *state {
            Die::Face(_) => *state,
            Die::Coin(node) => {
                let heads = resolver.handle_probabilistic_choice(2) == 0;
                match (node, heads) {
                    (0, true) => Die::Coin(1),
                    (0, false) => Die::Coin(2),
                    (1, true) => Die::Coin(3),
                    (1, false) => Die::Coin(4),
                    (2, true) => Die::Coin(5),
                    (2, false) => Die::Coin(6),
                    (3, true) => Die::Coin(1),
                    (3, false) => Die::Face(1),
                    (4, true) => Die::Face(2),
                    (4, false) => Die::Face(3),
                    (5, true) => Die::Face(4),
                    (5, false) => Die::Face(5),
                    (6, true) => Die::Coin(2),
                    (_, _) => Die::Face(6),
                }
            }
        };
        Some(Successor::new(next, Self::labels(next)))
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let config = AnalysisConfiguration::default()
        .with_cpu_count(args.cpus)
        .with_model_capacity(ModelCapacity::TINY)
        .with_model_checker(args.checker.into())
        .with_iterations(args.iterations);

    let checker = build_model_checker(&KnuthYao, &config)?;
    for face in 1..=6 {
        let eventually = Formula::finally(Formula::label(format!("face{}", face)));
        let p = checker.calculate_probability(&eventually)?;
        println!("P(F face{}) = {:.9} (expected {:.9})", face, p.value(), 1.0 / 6.0);
    }
    for steps in [2, 4, 8, 16] {
        let any_face = (2..=6).fold(Formula::label("face1"), |f, face| {
            Formula::or(f, Formula::label(format!("face{}", face)))
        });
        let p = checker.calculate_probability(&Formula::bounded_finally(any_face, steps))?;
        println!("P(F<={} any face) = {:.9}", steps, p.value());
    }

    if let Some(prefix) = args.prism {
        let traverser = ModelTraverser::new(&KnuthYao, &config)?;
        let mut builder = MdpBuilder::new(config.model_capacity, KnuthYao.state_formula_labels());
        traverser.traverse(&mut builder)?;
        let prism = builder.into_model().to_prism_explicit()?;
        fs::write(format!("{}.tra", prefix), prism.transitions)?;
        fs::write(format!("{}.lab", prefix), prism.labels)?;
        info!("wrote {}.tra and {}.lab", prefix, prefix);
    }

    let time_total = time_total.elapsed();
    println!("\nAll done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
