//! Plan command implementation
//!
//! Previews what a reconciliation pass would change without calling the
//! remote API.

use std::path::Path;

use colored::Colorize;
use serde_json::{Value, json};

use policy_core::{
    ConfigResolver, DeclaredEntity, PlanSummary, ReconciliationPlan, Reconciler, placement,
};

use crate::error::Result;

/// Run the plan command
pub fn run_plan(config: &Path, json: bool) -> Result<()> {
    let plans = compute_plans(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plans_json(&plans))?);
    } else {
        print_plans(&plans);
    }
    Ok(())
}

/// Plan every collection the manifest declares or a ledger remembers
pub(crate) fn compute_plans(config: &Path) -> Result<Vec<ReconciliationPlan>> {
    let config = ConfigResolver::new(config).resolve()?;
    let reconciler = Reconciler::from_config(&config);

    let mut plans = Vec::new();
    for collection in reconciler.collections(&config.collections)? {
        plans.push(reconciler.plan(&collection)?);
    }
    Ok(plans)
}

/// The placement query a create would carry, if any
fn placement_query(entity: &DeclaredEntity) -> Option<String> {
    let directive = placement::plan(entity.position()?).ok()?;
    Some(directive.query_string()).filter(|q| !q.is_empty())
}

fn total(plans: &[ReconciliationPlan]) -> PlanSummary {
    plans.iter().map(ReconciliationPlan::summary).fold(
        PlanSummary::default(),
        |acc, s| PlanSummary {
            creates: acc.creates + s.creates,
            updates: acc.updates + s.updates,
            deletes: acc.deletes + s.deletes,
            unchanged: acc.unchanged + s.unchanged,
            rejected: acc.rejected + s.rejected,
        },
    )
}

pub(crate) fn plans_json(plans: &[ReconciliationPlan]) -> Value {
    json!({
        "has_changes": plans.iter().any(|p| !p.is_noop()),
        "summary": total(plans),
        "collections": plans.iter().map(|plan| json!({
            "collection": plan.collection,
            "summary": plan.summary(),
            "creates": plan.creates.iter().map(|e| json!({
                "name": e.name(),
                "attributes": e.attributes(),
                "placement": placement_query(e),
            })).collect::<Vec<_>>(),
            "updates": plan.updates.iter().map(|u| json!({
                "name": u.current.name,
                "remote_id": u.current.remote_id,
                "changed_fields": u.changed_fields,
            })).collect::<Vec<_>>(),
            "deletes": plan.deletes.iter().map(|e| json!({
                "name": e.name,
                "remote_id": e.remote_id,
            })).collect::<Vec<_>>(),
            "rejected": plan.rejected.iter().map(|r| json!({
                "name": r.current.name,
                "reason": r.reason.to_string(),
            })).collect::<Vec<_>>(),
            "unchanged": plan.unchanged.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
    })
}

fn print_plans(plans: &[ReconciliationPlan]) {
    if plans.iter().all(ReconciliationPlan::is_converged) {
        println!(
            "{} No changes needed. Remote state matches the manifest.",
            "OK".green().bold()
        );
        return;
    }

    for plan in plans.iter().filter(|p| !p.is_converged()) {
        println!("{} {}", "Plan".blue().bold(), plan.collection.yellow());

        for entity in &plan.creates {
            match placement_query(entity) {
                Some(query) => println!(
                    "  {} {} {}",
                    "+".green(),
                    entity.name().green(),
                    format!("?{query}").dimmed()
                ),
                None => println!("  {} {}", "+".green(), entity.name().green()),
            }
        }
        for update in &plan.updates {
            println!(
                "  {} {} ({}) [{}]",
                "~".yellow(),
                update.current.name.yellow(),
                update.current.remote_id,
                update.changed_fields.join(", ")
            );
        }
        for entry in &plan.deletes {
            println!("  {} {} ({})", "-".red(), entry.name.red(), entry.remote_id);
        }
        for rejected in &plan.rejected {
            println!(
                "  {} {}: {}",
                "!".red(),
                rejected.current.name,
                rejected.reason
            );
        }
        println!();
    }

    println!("{} {}", "Plan:".bold(), total(plans));
}
