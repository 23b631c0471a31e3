//! End-to-end service lifecycle through the public registry API, with the
//! in-memory controller standing in for systemd.

use std::fs;
use std::sync::Arc;
use std::time::Duration;
use svcreg::controller::ControllerCall;
use svcreg::registry::PortDetection;
use svcreg::{
    Action, Error, MemoryController, Registration, ServicePatch, ServiceRegistry, Settings,
    StorePaths,
};
use tempfile::TempDir;

fn setup() -> (TempDir, Arc<MemoryController>, ServiceRegistry) {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let controller = Arc::new(MemoryController::new());
    let registry = ServiceRegistry::open(
        StorePaths::from_root(temp.path()),
        &Settings::default(),
        controller.clone(),
    )
    .with_settle_delay(Duration::ZERO)
    .with_home_dir("/home/tester");
    (temp, controller, registry)
}

#[tokio::test]
async fn register_start_edit_stop_unregister() {
    let (_temp, controller, registry) = setup();

    let entry = registry
        .register(Registration::new("site", "python -m http.server $PORT").working_dir("/srv/site"))
        .unwrap();
    assert_eq!(entry.port, 8000);
    assert_eq!(entry.working_dir, "/srv/site");

    // The command ignores PORT and binds 8080 instead
    controller.set_listening_port("site", 8080);
    let started = registry.start("site").await.unwrap();
    assert_eq!(started.reconciled_from, Some(8000));
    assert_eq!(registry.get("site").unwrap().port, 8080);
    assert_eq!(registry.mirror().read("site").unwrap().env["PORT"], "8080");

    // Starting again finds nothing to reconcile
    let again = registry.start("site").await.unwrap();
    assert_eq!(again.reconciled_from, None);
    assert_eq!(again.port, 8080);

    let mut patch = ServicePatch::default();
    patch.env_add.insert("DEBUG".to_string(), "1".to_string());
    registry.edit("site", patch).await.unwrap();
    let record = fs::read_to_string(registry.mirror().record_path("site")).unwrap();
    assert_eq!(
        record,
        "COMMAND=python -m http.server $PORT\nWORKING_DIR=/srv/site\nPORT=8080\nDEBUG=1\n"
    );

    registry.stop("site", false).await.unwrap();
    assert!(!controller.is_running("site"));
    assert!(controller
        .calls()
        .contains(&ControllerCall::FreePort(8080, false)));

    registry.unregister("site").await.unwrap();
    assert!(matches!(registry.get("site"), Err(Error::ServiceNotFound(_))));
    assert!(!registry.mirror().exists("site"));
}

#[tokio::test]
async fn port_env_stays_in_sync_across_every_port_change() {
    let (_temp, controller, registry) = setup();
    registry.register(Registration::new("api", "serve")).unwrap();
    assert!(registry.get("api").unwrap().port_env_in_sync());

    registry
        .edit(
            "api",
            ServicePatch {
                port: Some(8123),
                ..ServicePatch::default()
            },
        )
        .await
        .unwrap();
    assert!(registry.get("api").unwrap().port_env_in_sync());

    controller.set_listening_port("api", 9321);
    registry.start("api").await.unwrap();
    let entry = registry.get("api").unwrap();
    assert_eq!(entry.port, 9321);
    assert!(entry.port_env_in_sync());
}

#[tokio::test]
async fn detect_port_without_running_instance_keeps_port() {
    let (_temp, _controller, registry) = setup();
    registry
        .register(Registration::new("api", "serve").port(7000))
        .unwrap();

    let report = registry
        .edit(
            "api",
            ServicePatch {
                detect_port: true,
                ..ServicePatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(report.port_detection, PortDetection::NotFound);
    assert_eq!(report.entry.port, 7000);
}

#[tokio::test]
async fn restart_reports_stop_failure_and_still_starts() {
    let (_temp, controller, registry) = setup();
    registry.register(Registration::new("web", "run")).unwrap();
    controller.fail_on("web", Action::Stop);

    let report = registry.restart("web").await.unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert!(controller.is_running("web"));
}

#[tokio::test]
async fn lifecycle_calls_on_unknown_service_fail_without_touching_controller() {
    let (_temp, controller, registry) = setup();
    assert!(matches!(
        registry.start("ghost").await,
        Err(Error::ServiceNotFound(_))
    ));
    assert!(matches!(
        registry.stop("ghost", false).await,
        Err(Error::ServiceNotFound(_))
    ));
    assert!(matches!(
        registry.set_autostart("ghost", true).await,
        Err(Error::ServiceNotFound(_))
    ));
    assert!(controller.calls().is_empty());
}

#[tokio::test]
async fn explicit_ports_can_collide_and_are_reported() {
    let (_temp, _controller, registry) = setup();
    registry
        .register(Registration::new("a", "run").port(5000))
        .unwrap();
    registry
        .register(Registration::new("b", "run").port(5000))
        .unwrap();

    let report = registry.check().unwrap();
    assert_eq!(report.duplicate_ports[&5000], vec!["a", "b"]);
    // Auto-assignment skips ports already recorded
    let c = registry.register(Registration::new("c", "run")).unwrap();
    assert_eq!(c.port, 8000);
}

#[tokio::test]
async fn failed_store_save_leaves_record_untouched() {
    let (_temp, _controller, registry) = setup();
    registry
        .register(Registration::new("api", "serve").port(7000).env("MODE", "dev"))
        .unwrap();
    let record_path = registry.mirror().record_path("api");
    let record_before = fs::read(&record_path).unwrap();

    // A directory where the temp file must go makes every save fail
    let store_file = registry.store().paths().store_file.clone();
    let blocker = store_file.with_file_name("services.json.tmp");
    fs::create_dir(&blocker).unwrap();

    let mut patch = ServicePatch {
        command: Some("serve --verbose".to_string()),
        port: Some(7100),
        ..ServicePatch::default()
    };
    patch.env_add.insert("MODE".to_string(), "prod".to_string());
    let err = registry.edit("api", patch).await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(fs::read(&record_path).unwrap(), record_before);

    assert!(registry
        .register(Registration::new("web", "run"))
        .is_err());
    assert!(!registry.mirror().exists("web"));

    fs::remove_dir(&blocker).unwrap();
    assert_eq!(registry.get("api").unwrap().port, 7000);
}
