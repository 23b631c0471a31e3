//! Loss scenarios for the service store: backups taken before every
//! destructive save, restore from a snapshot, and rebuild from environment
//! records when the store is gone.

use std::fs;
use std::sync::Arc;
use std::time::Duration;
use svcreg::{
    ConfigStore, Error, MemoryController, Registration, Registry, ServiceEntry, ServiceRegistry,
    Settings, StorePaths,
};
use tempfile::TempDir;

fn open(temp: &TempDir, controller: Arc<MemoryController>) -> ServiceRegistry {
    ServiceRegistry::open(StorePaths::from_root(temp.path()), &Settings::default(), controller)
        .with_settle_delay(Duration::ZERO)
        .with_home_dir("/home/tester")
}

#[test]
fn saving_an_empty_registry_over_services_leaves_one_snapshot() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let store = ConfigStore::new(StorePaths::from_root(temp.path()));

    let mut registry = store.load().unwrap();
    registry.services.insert(
        "test-service".to_string(),
        ServiceEntry::new("python app.py", 8000, "/srv"),
    );
    store.save(&registry).unwrap();
    let before: Registry =
        serde_json::from_str(&fs::read_to_string(&store.paths().store_file).unwrap()).unwrap();

    store
        .save(&Registry {
            services: Default::default(),
            port_ranges: Default::default(),
        })
        .unwrap();

    let backups = store.list_backups().unwrap();
    assert_eq!(backups.len(), 1);
    let snapshot = ConfigStore::read_snapshot(&backups[0].path).unwrap();
    assert_eq!(snapshot, before);
    assert!(snapshot.services.contains_key("test-service"));
}

#[test]
fn every_mutation_of_a_populated_store_is_snapshotted() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let registry = open(&temp, Arc::new(MemoryController::new()));

    registry.register(Registration::new("a", "run a")).unwrap();
    assert_eq!(registry.store().list_backups().unwrap().len(), 0);

    registry.register(Registration::new("b", "run b")).unwrap();
    registry.add_range("web", 3000, 3010).unwrap();
    assert_eq!(registry.store().list_backups().unwrap().len(), 2);

    let latest = registry.store().latest_backup().unwrap().unwrap();
    let snapshot = ConfigStore::read_snapshot(&latest.path).unwrap();
    assert!(snapshot.services.contains_key("b"));
    assert!(!snapshot.port_ranges.contains_key("web"));
}

#[tokio::test]
async fn restore_latest_undoes_an_unregister() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let registry = open(&temp, Arc::new(MemoryController::new()));
    registry
        .register(Registration::new("web", "node server.js").port(3000))
        .unwrap();
    registry
        .register(Registration::new("api", "cargo run").port(4000))
        .unwrap();

    registry.unregister("api").await.unwrap();
    assert!(!registry.mirror().exists("api"));

    let report = registry.restore_latest().unwrap();
    assert_eq!(report.services, vec!["api", "web"]);
    assert!(report.backup.is_some());
    assert!(report.orphan_records.is_empty());

    assert_eq!(registry.get("api").unwrap().port, 4000);
    assert_eq!(registry.mirror().read("api").unwrap().command, "cargo run");
}

#[test]
fn restore_reports_orphan_records_without_deleting_them() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let registry = open(&temp, Arc::new(MemoryController::new()));
    registry.register(Registration::new("web", "run")).unwrap();

    let snapshot = temp.path().join("snapshot.json");
    fs::write(
        &snapshot,
        r#"{"services": {}, "port_ranges": {"default": {"start": 8000, "end": 9000}}}"#,
    )
    .unwrap();

    let report = registry.restore(&snapshot).unwrap();
    assert_eq!(report.orphan_records, vec!["web"]);
    assert!(registry.mirror().exists("web"));
    assert!(registry.load().unwrap().services.is_empty());
}

#[test]
fn restore_without_backups_is_an_error() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let registry = open(&temp, Arc::new(MemoryController::new()));
    assert!(matches!(registry.restore_latest(), Err(Error::Config(_))));
}

#[tokio::test]
async fn lost_store_is_rebuilt_from_running_services() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let controller = Arc::new(MemoryController::new());
    let registry = open(&temp, controller.clone());

    registry
        .register(Registration::new("a", "run a").port(8100).env("MODE", "prod"))
        .unwrap();
    registry
        .register(Registration::new("b", "run b").port(8200))
        .unwrap();
    registry
        .register(Registration::new("c", "run c").port(8300))
        .unwrap();
    controller.set_active("a", true);
    controller.set_enabled("a", true);
    controller.set_active("b", true);

    fs::remove_file(&registry.store().paths().store_file).unwrap();
    assert!(registry.needs_recovery().unwrap());

    let report = registry.recover().await.unwrap();
    assert_eq!(report.count(), 2);
    assert_eq!(report.inactive, vec!["c"]);

    let rebuilt = registry.load().unwrap();
    assert_eq!(rebuilt.services.len(), 2);
    let a = &rebuilt.services["a"];
    assert!(a.enabled);
    assert_eq!(a.port, 8100);
    assert_eq!(a.env.get("MODE").map(String::as_str), Some("prod"));
    assert!(a.port_env_in_sync());
    assert!(!rebuilt.services["b"].enabled);
    assert!(rebuilt.port_ranges.contains_key("default"));

    // The record of the skipped service is untouched
    assert!(registry.mirror().exists("c"));
    assert!(!registry.needs_recovery().unwrap());
}

#[tokio::test]
async fn corrupt_store_blocks_operations_until_recovered() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let controller = Arc::new(MemoryController::new());
    let registry = open(&temp, controller.clone());
    registry.register(Registration::new("web", "run")).unwrap();
    controller.set_active("web", true);

    fs::write(&registry.store().paths().store_file, "{\"services\": {\"web\": ").unwrap();

    let err = registry
        .register(Registration::new("other", "run"))
        .unwrap_err();
    assert!(matches!(err, Error::CorruptStore { .. }));
    assert!(err.with_suggestion().contains("svcreg recover"));

    let report = registry.recover().await.unwrap();
    assert!(report.preserved_corrupt.is_some());
    assert_eq!(report.recovered, vec!["web"]);
    registry.register(Registration::new("other", "run")).unwrap();
}
