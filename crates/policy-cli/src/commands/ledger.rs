//! Ledger command implementations
//!
//! Read and edit the local ledgers. None of these commands call the remote
//! API.

use std::path::Path;

use colored::Colorize;

use policy_core::{ConfigResolver, EntityKind, Ledger, LedgerStore, placement};

use crate::error::{CliError, Result};

fn open_store(config: &Path) -> Result<LedgerStore> {
    let resolved = ConfigResolver::new(config).resolve()?;
    Ok(LedgerStore::new(resolved.state_dir))
}

/// Load every saved ledger, sorted by collection
pub(crate) fn load_all(store: &LedgerStore) -> Result<Vec<Ledger>> {
    let mut ledgers = Vec::new();
    for collection in store.collections()? {
        ledgers.push(store.load(&collection)?);
    }
    Ok(ledgers)
}

/// Run the ledger list command
pub fn run_ledger_list(config: &Path, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let ledgers = load_all(&store)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ledgers)?);
        return Ok(());
    }

    if ledgers.iter().all(Ledger::is_empty) {
        println!(
            "No ledger entries in {}",
            store.root().display().to_string().yellow()
        );
        return Ok(());
    }

    for ledger in ledgers.iter().filter(|l| !l.is_empty()) {
        println!(
            "{} ({} owned)",
            ledger.collection().cyan().bold(),
            ledger.len()
        );
        for entry in ledger.entries() {
            let position = entry
                .position
                .as_ref()
                .and_then(|hint| placement::plan(hint).ok())
                .map(|directive| format!(" [{directive}]"))
                .unwrap_or_default();
            println!(
                "  {} {} {}{}",
                entry.name,
                entry.remote_id.to_string().dimmed(),
                entry.applied_at.format("%Y-%m-%d %H:%M:%S UTC"),
                position
            );
        }
    }
    Ok(())
}

/// Run the ledger forget command
pub fn run_ledger_forget(config: &Path, collection: &str, name: &str) -> Result<()> {
    if EntityKind::from_collection_name(collection).is_none() {
        let known: Vec<&str> = EntityKind::ALL.iter().map(|k| k.collection_name()).collect();
        return Err(CliError::user(format!(
            "Unknown collection '{}'. Expected one of: {}",
            collection,
            known.join(", ")
        )));
    }

    let store = open_store(config)?;
    let remote_id = store
        .load(collection)?
        .get(name)
        .map(|entry| entry.remote_id.clone());
    store.forget(collection, name)?;

    if let Some(remote_id) = remote_id {
        println!(
            "{} Forgot {} in {}; remote object {} is no longer owned",
            "OK".green().bold(),
            name.yellow(),
            collection.cyan(),
            remote_id
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_core::{LedgerEntry, RemoteId};
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, std::path::PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let manifest = temp_dir.path().join("policy.toml");
        fs::write(&manifest, "[core]\nstate_dir = \"state\"\n").unwrap();

        let store = LedgerStore::new(temp_dir.path().join("state"));
        let mut ledger = Ledger::new("hosts");
        ledger.insert(LedgerEntry::new("web", RemoteId::from("id1"), Default::default(), None));
        store.save(&ledger).unwrap();

        (temp_dir, manifest)
    }

    #[test]
    fn test_list_reads_saved_ledgers() {
        let (temp_dir, manifest) = setup();
        let store = LedgerStore::new(temp_dir.path().join("state"));

        let ledgers = load_all(&store).unwrap();
        assert_eq!(ledgers.len(), 1);
        assert_eq!(ledgers[0].names(), vec!["web"]);

        assert!(run_ledger_list(&manifest, false).is_ok());
        assert!(run_ledger_list(&manifest, true).is_ok());
    }

    #[test]
    fn test_forget_removes_entry() {
        let (temp_dir, manifest) = setup();

        run_ledger_forget(&manifest, "hosts", "web").unwrap();

        let store = LedgerStore::new(temp_dir.path().join("state"));
        assert!(store.load("hosts").unwrap().is_empty());
    }

    #[test]
    fn test_forget_unknown_collection() {
        let (_temp_dir, manifest) = setup();

        let err = run_ledger_forget(&manifest, "routers", "web").unwrap_err();
        assert!(err.to_string().contains("Unknown collection 'routers'"));
    }

    #[test]
    fn test_forget_unknown_entry() {
        let (_temp_dir, manifest) = setup();

        assert!(run_ledger_forget(&manifest, "hosts", "db").is_err());
    }
}
