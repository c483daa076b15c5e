use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use arcstr::ArcStr;
use clap::{Parser, Subcommand};
use ngspice::Simulator;
use sizer::characterize::load_variants;
use sizer::{
    build_and_simulate_variants, CircuitConfig, CircuitOptimizer, Evaluate, SimulatedEvaluator,
    VariantGenerator, VariantOptimizer, VariantOptimizerConfig, VariantSpec,
};
use tracing_subscriber::EnvFilter;
use xschem::Schematic;

/// File the optimized parameters are written to, in the output directory.
const OPTIMIZED_PARAMS: &str = "optimized_params.json";

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Optimize {
            config,
            max_iterations,
            precision,
        } => optimize(&config, max_iterations, precision),
        Command::Characterize { config, variants } => characterize(&config, &variants),
        Command::TargetSearch {
            config,
            targets,
            max_iterations,
            population_size,
            results_dir,
            pareto,
            pareto_count,
        } => target_search(TargetSearch {
            config,
            targets,
            max_iterations,
            population_size,
            results_dir,
            pareto,
            pareto_count,
        }),
        Command::Roundtrip { schematic, out } => roundtrip(&schematic, out.as_deref()),
    }
}

#[derive(Parser)]
#[command(
    version,
    about,
    long_about = "Generate, simulate, and optimize sized variants of xschem circuit templates"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimize the bounded parameters of a circuit for its weighted target score.
    Optimize {
        /// The circuit configuration (`.json` or `.toml`).
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides the configured iteration budget.
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Overrides the configured target precision.
        #[arg(long)]
        precision: Option<f64>,
    },
    /// Generate and simulate a set of named variants.
    Characterize {
        /// The circuit configuration (`.json` or `.toml`).
        #[arg(short, long)]
        config: PathBuf,
        /// A JSON map from variant name to `{ "short": ..., "params": ... }`.
        #[arg(short, long)]
        variants: PathBuf,
    },
    /// Search for the best design for each test's metric targets.
    TargetSearch {
        /// The circuit configuration providing templates and simulator options.
        #[arg(short, long)]
        config: PathBuf,
        /// The per-test targets, parameter ranges, and base parameters (JSON).
        #[arg(short, long)]
        targets: PathBuf,
        #[arg(long, default_value_t = 20)]
        max_iterations: usize,
        #[arg(long, default_value_t = 15)]
        population_size: usize,
        /// Where result files are written. Defaults to the configured output directory.
        #[arg(long)]
        results_dir: Option<PathBuf>,
        /// A pair of targets to interpolate between, as `first,second`. May be repeated.
        #[arg(long, value_parser = parse_pair)]
        pareto: Vec<(ArcStr, ArcStr)>,
        /// The number of interpolated variants per pair.
        #[arg(long, default_value_t = 3)]
        pareto_count: usize,
    },
    /// Parse a schematic and write it back out unchanged.
    Roundtrip {
        /// The input schematic or symbol.
        schematic: PathBuf,
        /// The output path. If unspecified, the output is written to stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

struct TargetSearch {
    config: PathBuf,
    targets: PathBuf,
    max_iterations: usize,
    population_size: usize,
    results_dir: Option<PathBuf>,
    pareto: Vec<(ArcStr, ArcStr)>,
    pareto_count: usize,
}

fn parse_pair(s: &str) -> Result<(ArcStr, ArcStr), String> {
    let (first, second) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `first,second`, got `{s}`"))?;
    Ok((first.trim().into(), second.trim().into()))
}

fn load_config(path: &Path) -> anyhow::Result<CircuitConfig> {
    CircuitConfig::load(path).with_context(|| format!("Failed to load configuration from {path:?}."))
}

fn optimize(path: &Path, max_iterations: Option<usize>, precision: Option<f64>) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let max_iterations = max_iterations.unwrap_or(config.max_iterations);
    let precision = precision.unwrap_or(config.target_precision);

    let mut evaluator = SimulatedEvaluator::from_config(&config);
    let mut optimizer = CircuitOptimizer::from_config(&config, &mut evaluator);
    let result = optimizer
        .optimize(&config.initial_params, max_iterations, precision)
        .with_context(|| "Optimization failed.")?;
    tracing::info!(
        score = result.score,
        initial_score = result.initial_score,
        evaluations = result.evaluations,
        termination = ?result.termination,
        "optimization finished"
    );

    let spec = VariantSpec::new("OPT", result.params.clone());
    let evaluation = evaluator
        .evaluate("Optimized", &spec)
        .with_context(|| "Failed to build the optimized variant.")?;
    tracing::info!(folder = ?evaluation.folder, "wrote optimized variant");

    let out = config.output_dir.join(OPTIMIZED_PARAMS);
    let json = serde_json::to_string_pretty(&result)?;
    fs::create_dir_all(&config.output_dir)?;
    fs::write(&out, json).with_context(|| format!("Failed to write results to {out:?}."))?;
    println!("{}", out.display());
    Ok(())
}

fn characterize(config: &Path, variants: &Path) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let variants = load_variants(variants)
        .with_context(|| format!("Failed to load variants from {variants:?}."))?;

    let mut evaluator = SimulatedEvaluator::from_config(&config);
    let results = build_and_simulate_variants(&mut evaluator, &variants)
        .with_context(|| "Failed to characterize variants.")?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

fn target_search(args: TargetSearch) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let targets = VariantOptimizerConfig::load(&args.targets)
        .with_context(|| format!("Failed to load targets from {:?}.", args.targets))?;
    for (first, second) in &args.pareto {
        for name in [first, second] {
            if !targets.targets.contains_key(name) {
                return Err(anyhow!("unknown target `{name}` in Pareto pair"));
            }
        }
    }

    let evaluator = SimulatedEvaluator::new(
        VariantGenerator::from_config(&config),
        Simulator::new(config.simulator_opts()),
        targets.tests.clone(),
    )
    .with_units(targets.units_map.clone());
    let results_dir = args.results_dir.unwrap_or_else(|| config.output_dir.clone());
    let mut optimizer = VariantOptimizer::new(targets, evaluator, results_dir);

    let best = optimizer
        .optimize(args.max_iterations, args.population_size)
        .with_context(|| "Target search failed.")?;
    for (name, spec) in best {
        tracing::info!(%name, short = %spec.short, "best variant");
    }
    optimizer
        .create_and_simulate_best_variants()
        .with_context(|| "Failed to simulate the best variants.")?;

    if !args.pareto.is_empty() {
        let variants = optimizer.create_pareto_variants(&args.pareto, args.pareto_count);
        optimizer
            .compare_variants(&variants)
            .with_context(|| "Failed to compare Pareto variants.")?;
    }
    Ok(())
}

fn roundtrip(path: &Path, out: Option<&Path>) -> anyhow::Result<()> {
    let schematic = Schematic::load(path).with_context(|| format!("Failed to parse {path:?}."))?;
    match out {
        Some(out) => schematic
            .save(out)
            .with_context(|| format!("Failed to write {out:?}."))?,
        None => print!("{}", schematic.to_text()),
    }
    Ok(())
}
