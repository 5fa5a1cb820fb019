#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use consensus_harness::evaluation::{run_synthetic_suite, synthetic_cases};
use consensus_harness::{
    load_predicted_instances, save_error_rates, save_integrated_data, save_observed_instances,
    save_predicted_instances, IntegratorKind, JsonlTraceSink, JsonlWriter, SampleTraceSink,
};

#[derive(Parser)]
#[command(
    name = "consensus",
    version,
    about = "Classifier error-rate estimation and label integration"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate error rates and integrated labels from predicted instances
    Integrate {
        /// mvi (majority vote), bi (Bayesian) or cbi (coupled Bayesian)
        #[arg(long, default_value = "cbi")]
        method: String,
        /// Predicted instances (.csv, .bin or .jsonl)
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        error_rates: PathBuf,
        #[arg(long)]
        integrated: Option<PathBuf>,
        /// "burnIn:thinning:samples:la:lb:ea:eb[:alpha]"; "-" keeps a default
        #[arg(long, conflicts_with = "config")]
        options: Option<String>,
        /// Sampler configuration as JSON
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        /// Write one JSON line per retained sample
        #[arg(long)]
        trace: Option<PathBuf>,
        /// Sample independent domains on separate threads (bi only)
        #[arg(long)]
        parallel: bool,
    },
    /// Write a synthetic dataset with known error rates
    Simulate {
        #[arg(long)]
        out: PathBuf,
        /// Ground-truth labels
        #[arg(long)]
        truth: PathBuf,
        #[arg(long)]
        case: Option<String>,
    },
    /// Run the synthetic evaluation suite
    Eval {
        #[arg(long, default_value = "cbi")]
        method: String,
        #[arg(long)]
        options: Option<String>,
        #[arg(long)]
        case: Option<String>,
        #[arg(long)]
        out: PathBuf,
    },
    /// List synthetic case names
    Cases,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Integrate {
            method,
            input,
            error_rates,
            integrated,
            options,
            config,
            seed,
            trace,
            parallel,
        } => {
            let mut kind = IntegratorKind::from_name(&method, options.as_deref().unwrap_or(""))?;
            if let Some(path) = config {
                kind = match kind {
                    IntegratorKind::MajorityVote => IntegratorKind::MajorityVote,
                    IntegratorKind::Bayesian(_) => IntegratorKind::Bayesian(read_json(&path)?),
                    IntegratorKind::CoupledBayesian(_) => {
                        IntegratorKind::CoupledBayesian(read_json(&path)?)
                    }
                };
            }
            if let Some(seed) = seed {
                kind = kind.with_seed(seed);
            }
            if let IntegratorKind::Bayesian(cfg) = &mut kind {
                cfg.parallel_domains |= parallel;
            }

            let data = load_predicted_instances(&input)?;
            let (sink, worker) = match trace {
                Some(path) => {
                    let (sink, worker) = JsonlTraceSink::new(path)?;
                    (Some(Arc::new(sink) as Arc<dyn SampleTraceSink>), Some(worker))
                }
                None => (None, None),
            };

            let mut integrator = kind.build_with_trace(&data, sink)?;
            let rates = integrator.error_rates(false)?.clone();
            let labels = integrator.integrated_data(false)?.clone();
            drop(integrator);
            if let Some(worker) = worker {
                worker.join()?;
            }

            save_error_rates(&error_rates, &rates)?;
            if let Some(path) = integrated {
                save_integrated_data(&path, &labels)?;
            }
        }
        Commands::Simulate { out, truth, case } => {
            let cases = synthetic_cases();
            let selected = match case.as_deref() {
                Some(name) => cases.into_iter().find(|c| c.name == name),
                None => cases.into_iter().next(),
            }
            .ok_or_else(|| format!("unknown synthetic case {case:?}"))?;
            let dataset = selected.generate();
            save_predicted_instances(&out, &dataset.predicted)?;
            save_observed_instances(&truth, &dataset.observed)?;
        }
        Commands::Eval {
            method,
            options,
            case,
            out,
        } => {
            let kind = IntegratorKind::from_name(&method, options.as_deref().unwrap_or(""))?;
            let results = run_synthetic_suite(case.as_deref(), &kind)?;
            if results.is_empty() {
                return Err(format!("no synthetic case matches {case:?}").into());
            }
            let (writer, worker) = JsonlWriter::new(out)?;
            for result in &results {
                writer.write(result)?;
            }
            drop(writer);
            worker.join()?;
        }
        Commands::Cases => {
            let mut stdout = io::stdout().lock();
            for case in synthetic_cases() {
                writeln!(stdout, "{}", case.name)?;
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
