//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Policy Reconciler - Converge a policy-management API to a declared manifest
#[derive(Parser, Debug)]
#[command(name = "policy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the manifest
    #[arg(
        short,
        long,
        global = true,
        env = "POLICY_CONFIG",
        default_value = "policy.toml"
    )]
    pub config: PathBuf,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show what a reconciliation pass would change
    ///
    /// Diffs every declared collection against its ledger. No remote call
    /// is made and nothing is written.
    ///
    /// Examples:
    ///   policy plan                      # Plan ./policy.toml
    ///   policy plan -c site/policy.toml  # Plan another manifest
    ///   policy plan --json               # Machine-readable output
    Plan {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Validate the manifest without reading any ledger
    Validate,

    /// Inspect or edit the local ledgers
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

/// Ledger subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum LedgerAction {
    /// List owned remote objects per collection
    List {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Drop an entry without touching the remote object
    ///
    /// The remote object is left in place and is no longer owned; the next
    /// plan will create a new one if the name is still declared.
    Forget {
        /// Collection name, e.g. "networks" or "access_rules"
        collection: String,

        /// Entity name
        name: String,
    },
}
