//! Mission-based Integration Tests
//!
//! End-to-end passes over a realistic branch-office manifest: the manifest
//! is resolved from disk, every collection is reconciled against the
//! in-memory gateway, and the ledgers are read back from the state
//! directory between passes, the way separate invocations would see them.

use policy_core::{
    ApplyReport, CallContext, ConfigResolver, ExecError, Ledger, LedgerStore, Operation,
    RejectReason, Reconciler, ResolvedConfig, VerifyStatus,
};
use policy_test_utils::{Call, CallKind, FakeGateway};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SITE: &str = include_str!("../../../test-fixtures/manifests/site.toml");
const SITE_V2: &str = include_str!("../../../test-fixtures/manifests/site-v2.toml");

// =============================================================================
// Test Infrastructure
// =============================================================================

/// A manifest on disk plus the remote side it is reconciled against
pub struct TestSite {
    temp_dir: TempDir,
    gateway: FakeGateway,
}

impl Default for TestSite {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSite {
    /// A site with the first manifest revision written out
    pub fn new() -> Self {
        let site = Self {
            temp_dir: TempDir::new().unwrap(),
            gateway: FakeGateway::new(),
        };
        site.write_manifest(SITE);
        site
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root().join("policy.toml")
    }

    pub fn write_manifest(&self, content: &str) {
        fs::write(self.manifest_path(), content).unwrap();
    }

    pub fn config(&self) -> ResolvedConfig {
        ConfigResolver::new(self.manifest_path()).resolve().unwrap()
    }

    /// One full pass over every collection, as a fresh invocation
    pub fn apply(&self) -> Vec<ApplyReport> {
        self.apply_with(&CallContext::new())
    }

    pub fn apply_with(&self, ctx: &CallContext) -> Vec<ApplyReport> {
        let config = self.config();
        let mut reconciler = Reconciler::from_config(&config);
        reconciler
            .collections(&config.collections)
            .unwrap()
            .iter()
            .map(|collection| reconciler.apply(collection, &self.gateway, ctx).unwrap())
            .collect()
    }

    pub fn ledger(&self, collection: &str) -> Ledger {
        LedgerStore::new(self.root().join("state"))
            .load(collection)
            .unwrap()
    }

    pub fn report<'a>(reports: &'a [ApplyReport], collection: &str) -> &'a ApplyReport {
        reports
            .iter()
            .find(|r| r.collection == collection)
            .unwrap_or_else(|| panic!("no report for {collection}"))
    }
}

fn assert_all_success(reports: &[ApplyReport]) {
    for report in reports {
        assert!(
            report.is_success(),
            "{} failed: {:?}",
            report.collection,
            report.errors
        );
    }
}

// =============================================================================
// M1: First apply
// =============================================================================

mod m1_first_apply {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn creates_every_declared_object() {
        let site = TestSite::new();

        let reports = site.apply();

        assert_all_success(&reports);
        assert_eq!(site.gateway.objects().len(), 6);
        assert_eq!(site.ledger("networks").names(), vec!["guest-wifi", "office-lan"]);
        assert_eq!(site.ledger("hosts").names(), vec!["file-server"]);
        assert_eq!(site.ledger("ports").names(), vec!["smb"]);
        assert_eq!(site.ledger("access_rules").len(), 2);
    }

    #[test]
    fn rules_are_created_with_their_placement() {
        let site = TestSite::new();
        site.apply();

        let creates: Vec<Call> = site
            .gateway
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Create { name, .. } if name.contains("lan")))
            .collect();

        assert_eq!(
            creates,
            vec![
                Call::Create {
                    name: "guest-wifi".to_string(),
                    query: String::new(),
                },
                Call::Create {
                    name: "office-lan".to_string(),
                    query: String::new(),
                },
                Call::Create {
                    name: "allow-lan-smb".to_string(),
                    query: "section=mandatory&category=file-sharing&insertAfter=1".to_string(),
                },
                Call::Create {
                    name: "block-guest-to-lan".to_string(),
                    query: "section=mandatory&insertBefore=1".to_string(),
                },
            ]
        );
    }

    #[test]
    fn second_pass_is_silent() {
        let site = TestSite::new();
        site.apply();
        site.gateway.clear_calls();

        let reports = site.apply();

        assert_all_success(&reports);
        assert!(reports.iter().all(|r| r.plan.is_converged()));
        assert!(site.gateway.calls().is_empty());
    }
}

// =============================================================================
// M2: Manifest revision
// =============================================================================

mod m2_revision {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn revision_applies_minimal_changes() {
        let site = TestSite::new();
        site.apply();
        let guest = site.ledger("networks").get("guest-wifi").unwrap().remote_id.clone();
        let server = site.ledger("hosts").get("file-server").unwrap().remote_id.clone();
        site.gateway.clear_calls();

        site.write_manifest(SITE_V2);
        let reports = site.apply();

        assert_all_success(&reports);
        assert_eq!(site.gateway.count(CallKind::Delete), 1);
        assert_eq!(site.gateway.count(CallKind::Update), 2);
        assert_eq!(site.gateway.count(CallKind::Create), 1);
        assert!(site.gateway.object(&guest).is_none());

        // Updated in place under the same remote ID
        let hosts = site.ledger("hosts");
        assert_eq!(hosts.get("file-server").unwrap().remote_id, server);
        assert_eq!(
            hosts.get("file-server").unwrap().last_applied["value"],
            serde_json::json!("10.20.1.11")
        );
        assert_eq!(hosts.names(), vec!["file-server", "backup"]);
    }

    #[test]
    fn rule_update_carries_no_placement() {
        let site = TestSite::new();
        site.apply();
        let rule = site.ledger("access_rules").get("allow-lan-smb").unwrap().clone();
        site.gateway.clear_calls();

        site.write_manifest(SITE_V2);
        let reports = site.apply();

        let rules = TestSite::report(&reports, "access_rules");
        assert_eq!(rules.plan.updates.len(), 1);
        assert_eq!(rules.plan.unchanged.len(), 1);
        assert!(site.gateway.calls().contains(&Call::Update {
            id: rule.remote_id.clone(),
            name: "allow-lan-smb".to_string(),
        }));
        // The recorded placement outlives the hint being dropped
        assert_eq!(
            site.ledger("access_rules").get("allow-lan-smb").unwrap().position,
            rule.position
        );
    }

    #[test]
    fn retiring_a_whole_kind_deletes_its_objects() {
        let site = TestSite::new();
        site.apply();
        let smb = site.ledger("ports").get("smb").unwrap().remote_id.clone();

        let without_ports = SITE.replace(
            "[[objects]]\nkind = \"port\"\nname = \"smb\"\n[objects.attributes]\nprotocol = \"6\"\nport = \"445\"\n",
            "",
        );
        assert!(!without_ports.contains("kind = \"port\""));
        site.write_manifest(&without_ports);
        let reports = site.apply();

        assert_all_success(&reports);
        assert!(site.ledger("ports").is_empty());
        assert!(site.gateway.object(&smb).is_none());
    }
}

// =============================================================================
// M3: Recovery
// =============================================================================

mod m3_recovery {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lost_ledgers_are_rebuilt_by_adoption() {
        let site = TestSite::new();
        site.apply();
        let before = site.gateway.objects();
        fs::remove_dir_all(site.root().join("state")).unwrap();

        let reports = site.apply();

        assert_all_success(&reports);
        assert_eq!(site.gateway.objects(), before);
        assert!(reports
            .iter()
            .flat_map(|r| &r.actions)
            .all(|a| a.operation == Operation::Adopt));
        assert_eq!(site.ledger("networks").len(), 2);
        assert_eq!(site.ledger("access_rules").len(), 2);
    }

    #[test]
    fn vanished_object_is_recreated_after_verify() {
        let site = TestSite::new();
        site.apply();
        let server = site.ledger("hosts").get("file-server").unwrap().remote_id.clone();
        site.gateway.remove_remote(&server);

        let config = site.config();
        let mut reconciler = Reconciler::from_config(&config);
        let report = reconciler
            .verify("hosts", &site.gateway, &CallContext::new())
            .unwrap();
        assert_eq!(report.status(), VerifyStatus::Pruned);

        let reports = site.apply();
        assert_all_success(&reports);
        let recreated = site.ledger("hosts").get("file-server").unwrap().remote_id.clone();
        assert_ne!(recreated, server);
        assert!(site.gateway.object(&recreated).is_some());
    }

    #[test]
    fn failed_entity_is_retried_next_pass() {
        let site = TestSite::new();
        site.gateway.fail_once(
            CallKind::Create,
            "smb",
            policy_core::GatewayError::transport("connection reset"),
        );

        let first = site.apply();
        let ports = TestSite::report(&first, "ports");
        assert_eq!(ports.errors.len(), 1);
        assert!(site.ledger("ports").is_empty());
        assert!(TestSite::report(&first, "hosts").is_success());

        let second = site.apply();
        assert_all_success(&second);
        assert_eq!(site.ledger("ports").names(), vec!["smb"]);
    }
}

// =============================================================================
// M4: Placement
// =============================================================================

mod m4_placement {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn moving_a_rule_is_refused() {
        let site = TestSite::new();
        site.apply();
        let recorded = site.ledger("access_rules");
        site.gateway.clear_calls();

        site.write_manifest(&SITE.replace(
            "{ section = \"mandatory\", insert_before = 1 }",
            "{ section = \"mandatory\", insert_before = 5 }",
        ));
        let reports = site.apply();

        let rules = TestSite::report(&reports, "access_rules");
        assert_eq!(rules.errors.len(), 1);
        assert_eq!(rules.errors[0].name, "block-guest-to-lan");
        assert!(matches!(
            rules.errors[0].error,
            ExecError::Rejected(RejectReason::Reposition { .. })
        ));
        assert!(site.gateway.calls().is_empty());
        assert_eq!(site.ledger("access_rules"), recorded);
    }

    #[test]
    fn delete_and_recreate_moves_a_rule() {
        let site = TestSite::new();
        site.apply();
        let old = site.ledger("access_rules").get("block-guest-to-lan").unwrap().remote_id.clone();

        let rule = "[[objects]]\nkind = \"access_rule\"\nname = \"block-guest-to-lan\"\nposition = { section = \"mandatory\", insert_before = 1 }\n[objects.attributes]\naction = \"BLOCK\"\nenabled = true\n";
        assert!(SITE.contains(rule));
        site.write_manifest(&SITE.replace(rule, ""));
        assert_all_success(&site.apply());
        site.gateway.clear_calls();

        let moved = rule.replace("insert_before = 1", "insert_before = 5");
        site.write_manifest(&SITE.replace(rule, &moved));
        assert_all_success(&site.apply());

        assert_eq!(
            site.gateway.calls(),
            vec![Call::Create {
                name: "block-guest-to-lan".to_string(),
                query: "section=mandatory&insertBefore=5".to_string(),
            }]
        );
        assert_ne!(
            site.ledger("access_rules").get("block-guest-to-lan").unwrap().remote_id,
            old
        );
    }
}

// =============================================================================
// Robustness
// =============================================================================

mod robustness {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collections_reconcile_concurrently() {
        let site = TestSite::new();
        let config = site.config();

        std::thread::scope(|scope| {
            for collection in &config.collections {
                let config = &config;
                let gateway = &site.gateway;
                scope.spawn(move || {
                    let mut reconciler = Reconciler::from_config(config);
                    let report = reconciler
                        .apply(collection, gateway, &CallContext::new())
                        .unwrap();
                    assert!(report.is_success());
                });
            }
        });

        assert_eq!(site.gateway.objects().len(), 6);
        let store = LedgerStore::new(site.root().join("state"));
        assert_eq!(
            store.collections().unwrap(),
            vec!["access_rules", "hosts", "networks", "ports"]
        );
    }

    #[test]
    fn cancelled_pass_resumes_cleanly() {
        let site = TestSite::new();
        let ctx = CallContext::new();
        site.gateway.cancel_after(3, ctx.cancel_handle());

        let interrupted = site.apply_with(&ctx);
        assert!(interrupted.iter().any(|r| !r.is_success()));
        let created = site.gateway.objects().len();
        assert!(created < 6);

        // Everything that was created is owned
        let owned: usize = ["networks", "hosts", "ports", "access_rules"]
            .iter()
            .map(|c| site.ledger(c).len())
            .sum();
        assert_eq!(owned, created);

        let resumed = site.apply();
        assert_all_success(&resumed);
        assert_eq!(site.gateway.objects().len(), 6);
    }
}
