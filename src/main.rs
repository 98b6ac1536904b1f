//! seshat CLI: abductive learning over arithmetic expressions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::Result;
use tracing::info;

use seshat::ast::{ExprTree, Strategy};
use seshat::collab::{Glyph, NoisyPerception, Perception, PrecedenceSyntax, SemanticsModel, SlotStore, SyntaxModel};
use seshat::config::SeshatConfig;
use seshat::dataset;
use seshat::domain::{decode_sentence, render_sentence};
use seshat::jointer::Jointer;

#[derive(Parser)]
#[command(name = "seshat", version, about = "Abductive symbolic learner for arithmetic")]
struct Cli {
    /// TOML config file; defaults apply for unset fields.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the collaborators on a synthetic dataset.
    Train {
        /// Override the number of training epochs.
        #[arg(long)]
        epochs: Option<u32>,

        /// Override the number of training samples.
        #[arg(long)]
        samples: Option<usize>,

        /// Override the perception corruption probability.
        #[arg(long)]
        noise: Option<f64>,

        /// Override both the learner and dataset seeds.
        #[arg(long)]
        seed: Option<u64>,

        /// Write a snapshot here after training.
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Resume from a snapshot before training.
        #[arg(long)]
        resume: Option<PathBuf>,
    },

    /// Evaluate a (possibly snapshotted) learner on fresh samples.
    Eval {
        /// Snapshot to restore before evaluating.
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Number of evaluation samples.
        #[arg(long, default_value = "500")]
        samples: usize,

        /// Dataset seed.
        #[arg(long, default_value = "999")]
        seed: u64,
    },

    /// Parse and evaluate one expression; optionally abduce toward a target.
    Solve {
        /// The expression, e.g. "2*3+4".
        expr: String,

        /// Ground-truth value to repair toward when the result disagrees.
        #[arg(long)]
        target: Option<i64>,

        /// Which single assumption the repair may revise.
        #[arg(long, value_enum, default_value = "perception")]
        strategy: StrategyArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Perception,
    Syntax,
    Semantics,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Perception => Strategy::Perception,
            StrategyArg::Syntax => Strategy::Syntax,
            StrategyArg::Semantics => Strategy::Semantics,
        }
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SeshatConfig::from_toml_file(path)?,
        None => SeshatConfig::default(),
    };

    match cli.command {
        Commands::Train {
            epochs,
            samples,
            noise,
            seed,
            snapshot,
            resume,
        } => {
            let mut config = config;
            if let Some(epochs) = epochs {
                config.train.epochs = epochs;
            }
            if let Some(samples) = samples {
                config.dataset.samples = samples;
            }
            if let Some(noise) = noise {
                config.train.perception_noise = noise;
            }
            if let Some(seed) = seed {
                config.jointer.seed = seed;
                config.dataset.seed = seed;
            }
            config.validate()?;
            train(&config, snapshot.as_deref(), resume.as_deref())?;
        }

        Commands::Eval { snapshot, samples, seed } => {
            let mut eval_config = config.clone();
            eval_config.dataset.samples = samples;
            eval_config.dataset.seed = seed;
            let mut jointer = build_jointer(&config)?;
            if let Some(path) = snapshot {
                jointer.load_snapshot(&path)?;
            }
            let eval_set = dataset::generate(&eval_config.dataset)?;
            let metrics = jointer.evaluate(&eval_set);
            println!(
                "result {:.3}  perception {:.3}  syntax {:.3}  ({} samples)",
                metrics.result_acc, metrics.perception_acc, metrics.syntax_acc, metrics.samples
            );
        }

        Commands::Solve { expr, target, strategy } => {
            solve(&expr, target, strategy.into())?;
        }
    }

    Ok(())
}

fn build_jointer(config: &SeshatConfig) -> Result<Jointer> {
    let perception: Box<dyn Perception> = Box::new(NoisyPerception::new(
        config.train.perception_noise,
        config.jointer.seed,
    ));
    let syntax: Box<dyn SyntaxModel> = Box::new(PrecedenceSyntax::new());
    // Semantics learns from scratch only when the curriculum gives it
    // epochs; otherwise it is bypassed with the ground-truth programs.
    let semantics: Box<dyn SemanticsModel> = if config.jointer.semantics_steps > 0 {
        Box::new(SlotStore::new(config.jointer.seed))
    } else {
        Box::new(SlotStore::solved())
    };
    Ok(Jointer::new(perception, syntax, semantics, config.jointer.clone())?)
}

fn train(
    config: &SeshatConfig,
    snapshot: Option<&std::path::Path>,
    resume: Option<&std::path::Path>,
) -> Result<()> {
    let train_set = dataset::generate(&config.dataset)?;
    let mut eval_dataset = config.dataset.clone();
    eval_dataset.seed = config.dataset.seed.wrapping_add(1);
    eval_dataset.samples = (config.dataset.samples / 5).max(1);
    let eval_set = dataset::generate(&eval_dataset)?;

    let mut jointer = build_jointer(config)?;
    if let Some(path) = resume {
        jointer.load_snapshot(path)?;
    }

    for _ in 0..config.train.epochs {
        let mut buffered = 0usize;
        for chunk in train_set.chunks(config.train.batch_size) {
            let batch: Vec<Vec<Glyph>> = chunk.iter().map(|s| s.glyphs.clone()).collect();
            let targets: Vec<i64> = chunk.iter().map(|s| s.target).collect();
            jointer.deduce(&batch);
            buffered += jointer.abduce(&targets, &batch);
        }
        jointer.learn();
        let metrics = jointer.evaluate(&eval_set);
        info!(
            epoch = jointer.epoch(),
            buffered,
            result_acc = metrics.result_acc,
            perception_acc = metrics.perception_acc,
            "epoch complete"
        );
    }

    let metrics = jointer.evaluate(&eval_set);
    println!(
        "trained {} epochs: result {:.3}  perception {:.3}  syntax {:.3}",
        config.train.epochs, metrics.result_acc, metrics.perception_acc, metrics.syntax_acc
    );
    if let Some(path) = snapshot {
        jointer.save_snapshot(path)?;
    }
    Ok(())
}

fn solve(expr: &str, target: Option<i64>, strategy: Strategy) -> Result<()> {
    let sentence = decode_sentence(expr);
    let parse = PrecedenceSyntax::new().parse(&sentence);
    let table = std::sync::Arc::new(seshat::domain::ground_truth_table());
    // Mildly confident rows so the perception strategy has room to
    // propose alternatives.
    let probs: Vec<Vec<f64>> = sentence
        .iter()
        .map(|s| {
            let mut row = vec![0.4 / (seshat::domain::Symbol::COUNT as f64 - 1.0); seshat::domain::Symbol::COUNT];
            row[s.index()] = 0.6;
            row
        })
        .collect();
    let tree = ExprTree::build(parse, table, Some(probs));
    match tree.result() {
        Some(value) => println!("{expr} = {value}"),
        None => println!("{expr} = unknown"),
    }

    let Some(target) = target else {
        return Ok(());
    };
    if tree.result() == Some(target) {
        println!("matches the target, nothing to revise");
        return Ok(());
    }
    match tree.abduce(target, strategy) {
        Some(revised) => {
            println!(
                "revised ({strategy}): {} = {target}",
                render_sentence(revised.sentence())
            );
            if strategy == Strategy::Syntax {
                println!("revised heads: {:?}", revised.parse().head);
            }
        }
        None => println!("no single-{strategy} revision explains {target}"),
    }
    Ok(())
}
