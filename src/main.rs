mod cli;
mod config;
mod drivers;
mod error;
mod logging;
mod manager;
mod ops;
mod project;
mod storage;
mod utils;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.quiet, cli.verbose)?;

    match &cli.command {
        Commands::Snapshot { name } => {
            ops::do_snapshot(&cli, name.as_deref())?;
        }
        Commands::List => {
            ops::do_list(&cli)?;
        }
        Commands::Show { id } => {
            ops::do_show(&cli, id)?;
        }
        Commands::Restore { id, latest, yes } => {
            ops::do_restore(&cli, id.as_deref(), *latest, *yes)?;
        }
        Commands::Delete { id, yes } => {
            ops::do_delete(&cli, id, *yes)?;
        }
        Commands::Run { args } => {
            ops::do_run(&cli, args)?;
        }
        Commands::Services => {
            ops::do_services(&cli)?;
        }
        Commands::Info => {
            ops::do_info(&cli)?;
        }
        Commands::Version => {
            ops::do_version();
        }
    }

    Ok(())
}
