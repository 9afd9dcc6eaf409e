//! Policy Reconciler CLI
//!
//! Plans and inspects reconciliation passes for a `policy.toml` manifest.
//! Applying a plan needs a gateway to the remote API and goes through the
//! `policy-core` library.

mod cli;
mod commands;
mod error;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands, LedgerAction};
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        if let Err(e) = policy_core::logging::init_with_default("debug") {
            eprintln!("{}: logging disabled: {}", "warning".yellow().bold(), e);
        }
        tracing::debug!("Verbose mode enabled");
    }

    match cli.command {
        Some(Commands::Plan { json }) => commands::run_plan(&cli.config, json),
        Some(Commands::Validate) => commands::run_validate(&cli.config),
        Some(Commands::Ledger { action }) => match action {
            LedgerAction::List { json } => commands::run_ledger_list(&cli.config, json),
            LedgerAction::Forget { collection, name } => {
                commands::run_ledger_forget(&cli.config, &collection, &name)
            }
        },
        None => {
            println!("{} Policy Reconciler CLI", "policy".green().bold());
            println!();
            println!("Run {} for available commands.", "policy --help".cyan());
            Ok(())
        }
    }
}
