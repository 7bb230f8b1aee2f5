use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

use opinion_ghettos::config::SimConfig;
use opinion_ghettos::export::{GHETTOS_FILE, load_network, write_ghettos};
use opinion_ghettos::detect_ghettos;

#[derive(Parser, Debug)]
#[command(name = "opinion-ghettos")]
#[command(about = "Simulate opinion polarization on a spatial scale-free network")]
struct Args {
    /// TOML file with run parameters; unset values use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Number of update rounds
    #[arg(long)]
    steps: Option<u64>,

    /// Number of nodes
    #[arg(long)]
    nodes: Option<usize>,

    /// Directory for the CSV output
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Skip the per-step node snapshots
    #[arg(long)]
    no_snapshots: bool,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_default_config: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-run ghetto detection on saved snapshot files
    Ghettos {
        #[arg(long)]
        edges: PathBuf,
        #[arg(long)]
        nodes: PathBuf,
        /// Where to write ghettos.csv
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();

    if args.print_default_config {
        print!("{}", SimConfig::default().to_toml()?);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(steps) = args.steps {
        config.steps = steps;
    }
    if let Some(nodes) = args.nodes {
        config.graph.nodes = nodes;
    }
    if let Some(dir) = args.output_dir {
        config.output.dir = dir;
    }
    if args.no_snapshots {
        config.output.write_snapshots = false;
    }

    if let Some(Command::Ghettos { edges, nodes, out }) = args.command {
        let net = load_network(&edges, &nodes)?;
        let ghettos = detect_ghettos(&net, &config.sanitized().ghettos);
        let out = out.unwrap_or_else(|| PathBuf::from(GHETTOS_FILE));
        write_ghettos(&out, &ghettos)?;
        println!("Detected {} ghettos (written to {})", ghettos.len(), out.display());
        return Ok(());
    }

    let summary = opinion_ghettos::run(&config)?;

    println!(
        "Simulated {} nodes for {} steps ({} -> {} edges)",
        summary.nodes, summary.steps, summary.initial_edges, summary.final_edges
    );
    println!(
        "Mean |opinion| {:.3}, polarized fraction {:.3}",
        summary.polarization.mean_abs_opinion, summary.polarization.polarized_fraction
    );
    println!("Detected {} ghettos:", summary.ghettos.len());
    for ghetto in &summary.ghettos {
        println!(
            "Ghetto {} ({} members, mean opinion {:+.3})",
            ghetto.id,
            ghetto.len(),
            ghetto.mean_opinion
        );
    }
    println!("Output written to {}", config.output.dir.display());

    Ok(())
}
