use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::Level;

use tempo_engine::{Filters, ResolveRequest, resolve, root_module_name};
use tempo_types::LoopArgs;

/// Resolve a workflow node's batch resources, dependencies, and structural
/// neighborhood for one scheduling datestamp.
#[derive(Debug, Parser)]
#[command(name = "tempo", version, about)]
struct Cli {
    /// Node path to resolve, e.g. /suite/assim/run
    #[arg(short = 'n', long = "node")]
    node: Option<String>,

    /// Experiment home directory; defaults to $SEQ_EXP_HOME
    #[arg(short = 'e', long = "exp")]
    exp: Option<PathBuf>,

    /// Loop arguments as comma-separated name=value pairs
    #[arg(short = 'l', long = "loop-args", default_value = "")]
    loop_args: String,

    /// Datestamp, up to 14 digits; shorter values are zero-padded
    #[arg(short = 'd', long = "datestamp")]
    datestamp: Option<String>,

    /// Comma-separated filters: all, res, dep, task, root
    #[arg(short = 'f', long = "filters", default_value = "all")]
    filters: String,

    /// Extra submission arguments, appended after the resource file's own
    #[arg(long = "submit-args", default_value = "")]
    submit_args: String,

    /// Write the result to this file instead of stdout
    #[arg(short = 'o', long = "outputfile")]
    outputfile: Option<PathBuf>,

    /// Increase log verbosity
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exp_home = match &cli.exp {
        Some(exp) => exp.clone(),
        None => std::env::var("SEQ_EXP_HOME")
            .map(PathBuf::from)
            .context("no experiment given: pass --exp or set SEQ_EXP_HOME")?,
    };

    // The root filter answers a different question and needs no node path.
    if cli.filters.split(',').any(|word| word.trim() == "root") {
        return emit(&cli, &root_module_name(&exp_home)?);
    }

    let Some(node) = &cli.node else {
        bail!("no node path given: pass --node");
    };
    let request = ResolveRequest {
        node_path: node.clone(),
        exp_home,
        datestamp: cli.datestamp.clone(),
        loop_args: LoopArgs::parse(&cli.loop_args)
            .with_context(|| format!("invalid loop arguments {:?}", cli.loop_args))?,
        extra_submit_args: cli.submit_args.clone(),
        filters: Filters::parse(&cli.filters),
    };
    let descriptor = resolve(&request)
        .with_context(|| format!("failed to resolve node {node:?}"))?;
    let rendered = serde_json::to_string_pretty(&descriptor)?;
    emit(&cli, &rendered)
}

fn emit(cli: &Cli, rendered: &str) -> Result<()> {
    match &cli.outputfile {
        Some(path) => fs::write(path, format!("{rendered}\n"))
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{rendered}");
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .try_init();
}
