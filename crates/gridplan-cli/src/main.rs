use clap::Parser;
use clap_complete::{generate, Shell};
use gridplan_cli::{build_cli_command, Cli, Commands};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, error};
use tracing_subscriber::FmtSubscriber;

mod commands;

use crate::commands::util::{configure_threads, load_config};
use crate::commands::{analyze, check, emob, graph, ts};

fn generate_completions(shell: Shell, out: Option<&Path>) -> anyhow::Result<()> {
    let mut cmd = build_cli_command();
    if let Some(path) = out {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        generate(shell, &mut cmd, "gridplan", &mut file);
        println!("Wrote {shell:?} completion to {}", path.display());
    } else {
        generate(shell, &mut cmd, "gridplan", &mut io::stdout());
    }
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match &cli.command {
        command @ (Commands::Analyze { .. } | Commands::Reinforce { .. }) => {
            analyze::handle(command, config)
        }
        Commands::Check { input } => check::handle(input, config),
        Commands::Graph { command } => graph::handle(command),
        Commands::Emob { command } => emob::handle(command, config),
        Commands::Ts { command } => ts::handle(command),
        Commands::Completions { shell, out } => generate_completions(*shell, out.as_deref()),
    }
}

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("setting default subscriber failed");
    }

    configure_threads(&cli.threads);
    debug!(threads = rayon::current_num_threads(), "configured thread pool");

    if let Err(err) = run(&cli) {
        error!("{:#}", err);
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
