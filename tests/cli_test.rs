//! Binary-level tests for the commands that never reach the init system.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn svcreg_binary() -> String {
    env!("CARGO_BIN_EXE_svcreg").to_string()
}

fn svcreg(home: &Path, args: &[&str]) -> Output {
    Command::new(svcreg_binary())
        .arg("--home")
        .arg(home)
        .args(args)
        .env_remove("SVCREG_HOME")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run svcreg")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn register_show_and_records() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let home = temp.path();

    let output = svcreg(
        home,
        &[
            "register", "--name", "web", "--command", "node server.js", "--dir", "/srv/web",
            "--env", "NODE_ENV=production",
        ],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("registered on port 8000"));

    let store: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(home.join("services.json")).unwrap()).unwrap();
    assert_eq!(store["services"]["web"]["port"], 8000);
    assert_eq!(store["services"]["web"]["env"]["PORT"], "8000");
    assert_eq!(store["port_ranges"]["default"]["end"], 9000);

    let record = fs::read_to_string(home.join("env/web.env")).unwrap();
    assert!(record.starts_with("COMMAND=node server.js\nWORKING_DIR=/srv/web\nPORT=8000\n"));
    assert!(record.contains("NODE_ENV=production"));

    let output = svcreg(home, &["show", "web"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("port:        8000"));
}

#[test]
fn duplicate_register_fails_with_hint() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let home = temp.path();
    assert!(svcreg(home, &["register", "-n", "web", "-c", "run"]).status.success());

    let output = svcreg(home, &["register", "-n", "web", "-c", "run"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Service 'web' already exists"));
    assert!(err.contains("Hint:"));
}

#[test]
fn reserved_env_key_is_rejected() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let output = svcreg(
        temp.path(),
        &["register", "-n", "web", "-c", "run", "-e", "PORT=1"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("reserved"));
    assert!(!temp.path().join("env/web.env").exists());
}

#[test]
fn ranges_and_auto_assignment() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let home = temp.path();

    let output = svcreg(home, &["add-range", "web", "3000", "3000"]);
    assert!(!output.status.success());

    assert!(svcreg(home, &["add-range", "web", "3000", "3001"]).status.success());
    let output = svcreg(home, &["ranges"]);
    assert!(stdout(&output).contains("web: 3000-3001"));
    assert!(stdout(&output).contains("default: 8000-9000"));

    for name in ["a", "b"] {
        let output = svcreg(home, &["register", "-n", name, "-c", "run", "-r", "web"]);
        assert!(output.status.success(), "stderr: {}", stderr(&output));
    }
    let output = svcreg(home, &["register", "-n", "c", "-c", "run", "-r", "web"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No available ports in range 'web'"));
}

#[test]
fn edit_rewrites_record() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let home = temp.path();
    assert!(svcreg(home, &["register", "-n", "api", "-c", "serve", "-e", "OLD=1"]).status.success());

    let output = svcreg(
        home,
        &["edit", "api", "--port", "8500", "--env-add", "NEW=2", "--env-remove", "OLD"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let record = fs::read_to_string(home.join("env/api.env")).unwrap();
    assert!(record.contains("PORT=8500"));
    assert!(record.contains("NEW=2"));
    assert!(!record.contains("OLD="));
}

#[test]
fn backup_and_restore_round_trip() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let home = temp.path();
    assert!(svcreg(home, &["register", "-n", "web", "-c", "run"]).status.success());

    let output = svcreg(home, &["backup"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("auto-backup-"));

    let output = svcreg(home, &["backups"]);
    let listing = stdout(&output);
    assert_eq!(listing.lines().count(), 2);
    assert!(listing.starts_with("TAKEN"));
    // Piped output carries no color codes
    assert!(!listing.contains('\x1b'));

    let export = temp.path().join("export.json");
    assert!(svcreg(home, &["backup", "-o", export.to_str().unwrap()])
        .status
        .success());

    // Wipe the services, then bring them back
    fs::write(
        home.join("services.json"),
        r#"{"services": {}, "port_ranges": {}}"#,
    )
    .unwrap();
    let output = svcreg(home, &["restore", export.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Restored 1 service(s)"));

    let output = svcreg(home, &["show", "web"]);
    assert!(output.status.success());
}

#[test]
fn import_skips_existing_services() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let home = temp.path();
    assert!(svcreg(home, &["register", "-n", "web", "-c", "run", "-p", "3000"]).status.success());

    let file = temp.path().join("import.json");
    fs::write(
        &file,
        r#"{"services": {
              "web": {"command": "other", "port": 1},
              "api": {"command": "serve", "port": 4000, "working_dir": "/srv"}
            },
            "port_ranges": {"extra": {"start": 5000, "end": 5100}}}"#,
    )
    .unwrap();

    let output = svcreg(home, &["import", file.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Imported 1 service(s) and 1 port range(s)"));
    assert!(stderr(&output).contains("web"));
    assert!(home.join("env/api.env").exists());
}

#[test]
fn corrupt_store_points_at_recovery() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let home = temp.path();
    fs::write(home.join("services.json"), "not json").unwrap();

    let output = svcreg(home, &["show", "web"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("is corrupt"));
    assert!(err.contains("svcreg restore --latest"));
}

#[test]
fn completions_need_no_home() {
    let output = Command::new(svcreg_binary())
        .args(["completions", "bash"])
        .output()
        .expect("Failed to run svcreg");
    assert!(output.status.success());
    assert!(stdout(&output).contains("svcreg"));
}
