//! Property tests for the differ and executor

use std::collections::BTreeMap;

use policy_core::{
    CallContext, DeclaredCollection, EntityKind, Executor, Ledger, LedgerEntry, RemoteId, diff,
};
use policy_test_utils::entities::{collection, host};
use policy_test_utils::FakeGateway;
use proptest::prelude::*;

/// Name → address maps; names are unique by construction
fn declarations() -> impl Strategy<Value = BTreeMap<String, u8>> {
    prop::collection::btree_map("[a-e]{1,2}", 0u8..4, 0..8)
}

fn declared_from(map: &BTreeMap<String, u8>) -> DeclaredCollection {
    collection(
        EntityKind::Host,
        map.iter()
            .map(|(name, octet)| host(name, &format!("10.0.0.{octet}")))
            .collect(),
    )
}

/// A ledger as some earlier pass would have left it, with remote objects
/// seeded to match
fn seeded_ledger(gateway: &FakeGateway, map: &BTreeMap<String, u8>) -> Ledger {
    let declared = declared_from(map);
    let mut ledger = Ledger::new("hosts");
    for entity in declared.entities() {
        let id = gateway.seed(
            entity.name(),
            serde_json::to_value(entity.attributes()).unwrap(),
        );
        ledger.insert(LedgerEntry::new(
            entity.name(),
            id,
            entity.attributes().clone(),
            None,
        ));
    }
    ledger
}

proptest! {
    #[test]
    fn reordering_declarations_changes_nothing(map in declarations(), seed in any::<u64>()) {
        let gateway = FakeGateway::new();
        let ledger = seeded_ledger(&gateway, &map);

        let mut entities = declared_from(&map).entities().to_vec();
        let len = entities.len().max(1);
        entities.rotate_left((seed as usize) % len);
        entities.reverse();
        let shuffled = DeclaredCollection::new(EntityKind::Host, entities).unwrap();

        let plan = diff(&ledger, &shuffled);
        prop_assert!(plan.is_noop());
        prop_assert_eq!(plan.unchanged.len(), map.len());
    }

    #[test]
    fn plan_partitions_names(before in declarations(), after in declarations()) {
        let gateway = FakeGateway::new();
        let ledger = seeded_ledger(&gateway, &before);
        let plan = diff(&ledger, &declared_from(&after));

        let mut seen: Vec<&str> = plan.creates.iter().map(|e| e.name())
            .chain(plan.updates.iter().map(|u| u.current.name.as_str()))
            .chain(plan.deletes.iter().map(|e| e.name.as_str()))
            .chain(plan.unchanged.iter().map(|e| e.name.as_str()))
            .collect();
        let total = seen.len();
        seen.sort_unstable();
        seen.dedup();
        prop_assert_eq!(seen.len(), total);

        let union: std::collections::BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        prop_assert_eq!(total, union.len());
    }

    #[test]
    fn successful_execution_converges(before in declarations(), after in declarations()) {
        let gateway = FakeGateway::new();
        let ledger = seeded_ledger(&gateway, &before);
        let declared = declared_from(&after);

        let plan = diff(&ledger, &declared);
        let ctx = CallContext::new();
        let execution = Executor::new(&ctx).execute(&plan, &gateway, ledger);
        prop_assert!(execution.is_success());

        let mut names = execution.ledger.names();
        names.sort_unstable();
        let declared_names: Vec<&str> = after.keys().map(String::as_str).collect();
        prop_assert_eq!(names, declared_names);
        for entity in declared.entities() {
            let entry = execution.ledger.get(entity.name()).unwrap();
            prop_assert_eq!(&entry.last_applied, entity.attributes());
        }

        // And the next pass is silent
        gateway.clear_calls();
        let again = diff(&execution.ledger, &declared);
        prop_assert!(again.is_noop());
        let second = Executor::new(&ctx).execute(&again, &gateway, execution.ledger.clone());
        prop_assert!(second.is_success());
        prop_assert!(gateway.calls().is_empty());
    }

    #[test]
    fn failures_leave_old_state(before in declarations(), failing in "[a-e]{1,2}") {
        let gateway = FakeGateway::new();
        let ledger = seeded_ledger(&gateway, &before);
        let desired: BTreeMap<String, u8> = before.keys().map(|k| (k.clone(), 9)).collect();
        gateway.fail(
            policy_test_utils::CallKind::Update,
            &failing,
            policy_core::GatewayError::validation("rejected"),
        );

        let plan = diff(&ledger, &declared_from(&desired));
        let ctx = CallContext::new();
        let execution = Executor::new(&ctx).execute(&plan, &gateway, ledger.clone());

        for entry in ledger.entries() {
            let now = execution.ledger.get(&entry.name).unwrap();
            if entry.name == failing {
                prop_assert_eq!(&now.last_applied, &entry.last_applied);
            } else {
                prop_assert_eq!(now.last_applied["value"].as_str(), Some("10.0.0.9"));
            }
            prop_assert_eq!(&now.remote_id, &entry.remote_id);
        }
    }
}

#[test]
fn remote_ids_are_opaque() {
    let mut ledger = Ledger::new("hosts");
    ledger.insert(LedgerEntry::new("a", RemoteId::from("005056A1-B2C3"), Default::default(), None));
    let plan = diff(&ledger, &declared_from(&BTreeMap::new()));
    assert_eq!(plan.deletes[0].remote_id.as_str(), "005056A1-B2C3");
}
