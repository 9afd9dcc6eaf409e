//! Validate command implementation

use std::path::Path;

use colored::Colorize;

use policy_core::ConfigResolver;

use crate::error::Result;

/// Run the validate command
///
/// Parses the manifest and its local overrides and validates every
/// declaration. Ledgers are not read.
pub fn run_validate(config: &Path) -> Result<()> {
    let resolved = ConfigResolver::new(config).resolve()?;

    for collection in &resolved.collections {
        let ordered = if collection.kind().is_ordered() {
            " (ordered)".dimmed().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {}: {} declared{}",
            "-".normal(),
            collection.name().cyan(),
            collection.len(),
            ordered
        );
    }

    println!(
        "{} {} is valid",
        "OK".green().bold(),
        resolved.manifest_path.display()
    );
    Ok(())
}
