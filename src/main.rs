use std::fs::File;
use std::io::BufWriter;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use serde::Serialize;
use tracing::error;

use netweave::algorithms::analysis::summarize;
use netweave::algorithms::bipartite::BipartiteController;
use netweave::algorithms::slpa::SLPAController;
use netweave::config::RunConfig;
use netweave::types::edge_list::{read_network_from_file, DEFAULT_DELIMITER};


#[derive(Parser, Debug, Serialize)]
#[command(author, version, about)]
struct Args {

    /// Path of the edge-list file.
    #[arg(short, long, default_value_t = String::from("data/ring.dat"))]
    dataset: String,

    /// The task to be performed: slpa, bipartite or analysis.
    #[arg(short, long, default_value_t = String::from("slpa"))]
    task: String,

    /// Treat edges as directed.
    #[arg(long, default_value_t = false)]
    directed: bool,

    /// Field delimiter of the edge-list file.
    #[arg(long, default_value_t = String::from(DEFAULT_DELIMITER))]
    delimiter: String,

    /// Worker count (SLPA partitions or bipartite color workers).
    #[arg(short, long)]
    num_threads: Option<usize>,

    /// SLPA iteration count.
    #[arg(short, long)]
    iterations: Option<usize>,

    /// SLPA label survival threshold in [0, 1].
    #[arg(long)]
    threshold: Option<f64>,

    /// SLPA base seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Smallest community size kept by SLPA.
    #[arg(short, long)]
    min_community_size: Option<usize>,

    /// YAML run configuration; CLI flags take precedence.
    #[arg(short, long)]
    config: Option<String>,

    /// Write the result as YAML to this file.
    #[arg(short, long)]
    output: Option<String>,
}

impl Args {
    /// Loads the run configuration and applies CLI overrides on top.
    fn run_config(&self) -> Result<RunConfig, Box<dyn std::error::Error>> {
        let mut run_config = match &self.config {
            Some(path) => RunConfig::from_yaml_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(num_threads) = self.num_threads {
            run_config.slpa.partition_count = num_threads;
            run_config.bipartite.worker_count = num_threads;
        }
        if let Some(iterations) = self.iterations {
            run_config.slpa.iterations = iterations;
        }
        if let Some(threshold) = self.threshold {
            run_config.slpa.threshold = threshold;
        }
        if let Some(seed) = self.seed {
            run_config.slpa.seed = seed;
        }
        if let Some(min_community_size) = self.min_community_size {
            run_config.slpa.min_community_size = min_community_size;
        }
        Ok(run_config)
    }
}

/// Writes a serializable result as YAML when an output path was given.
fn write_output<T: Serialize>(output: &Option<String>, result: &T) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = output {
        let writer = BufWriter::new(File::create(path)?);
        serde_yaml::to_writer(writer, result)?;
        println!("Result written to {}.", path);
    }
    Ok(())
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let run_config = args.run_config()?;

    // Step 1. Load the network.
    let network = read_network_from_file(&args.dataset, &args.delimiter, args.directed)?;
    let network = Arc::new(network);

    // Step 2. Perform the task, and report the time.
    if args.task == "slpa" {
        let slpa_controller = SLPAController::new(network.clone());
        let start = Instant::now();
        let communities = slpa_controller.detect::<String>(&run_config.slpa)?;
        let duration = start.elapsed();

        println!("SLPA found {} communities.", communities.len());
        println!("SLPA Elapsed Time: {:?} us", duration.as_micros());
        write_output(&args.output, &communities)?;
    } else if args.task == "bipartite" {
        let bipartite_controller = BipartiteController::new(network.clone());
        let start = Instant::now();
        let outcome = bipartite_controller.bipartition::<String>(&run_config.bipartite)?;
        let duration = start.elapsed();

        println!("Bipartite: {}", outcome.is_bipartite());
        println!("Bipartite Elapsed Time: {:?} us", duration.as_micros());
        write_output(&args.output, &outcome)?;
    } else if args.task == "analysis" {
        let summary = summarize::<String, _>(network.as_ref());
        println!(
            "Dataset: {}, Vertex Count: {}, Edge Count: {}, Density: {:.6}, Isolated: {}",
            args.dataset,
            summary.order,
            summary.size,
            summary.density,
            summary.isolated_vertices
        );
        write_output(&args.output, &summary)?;
    } else {
        println!("Task {} not supported in netweave.", args.task);
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args: Args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
