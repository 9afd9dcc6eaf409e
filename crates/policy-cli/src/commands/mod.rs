//! Command implementations for policy-cli

pub mod ledger;
pub mod plan;
pub mod validate;

pub use ledger::{run_ledger_forget, run_ledger_list};
pub use plan::run_plan;
pub use validate::run_validate;
