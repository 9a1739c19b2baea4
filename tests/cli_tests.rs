// End-to-end tests for the devboot binary against a temporary project

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const DESCRIPTORS: &str = r#"
format-version = 1

[descriptors.py310]
base-version = "3.10"
implementation = "cpython"

[descriptors.dbg]
base-version = "3.12"
implementation = "cpython"
features = ["debug"]

[descriptors.memcheck]
base-version = "3.12"
implementation = "cpython"
features = ["valgrind", "address-sanitizer"]

[descriptors.pypy]
base-version = "3.10"
implementation = "pypy"
providers = ["system"]
"#;

fn project(descriptors: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("devboot");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("python.toml"), descriptors).unwrap();
    temp
}

fn devboot(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("devboot").unwrap();
    cmd.arg("-C")
        .arg(project)
        .env("DEVBOOT_DATA_DIR", project.join(".data"))
        .env("DEVBOOT_CACHE_DIR", project.join(".cache"))
        .env("DEVBOOT_PLATFORM_KERNEL", "linux")
        .env("DEVBOOT_PLATFORM_ADDRESS_SIZE", "64")
        .env("DEVBOOT_PLATFORM_ARCH", "x86_64")
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_version_flag_works() {
    Command::cargo_bin("devboot")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("devboot"));
}

#[test]
fn test_platform_honors_overrides() {
    let project = project(DESCRIPTORS);
    devboot(project.path())
        .arg("platform")
        .env("DEVBOOT_PLATFORM_ARCH", "aarch64")
        .assert()
        .success()
        .stdout("linux-64--aarch64\n");
}

#[test]
fn test_list_descriptors() {
    let project = project(DESCRIPTORS);
    devboot(project.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("py310"))
        .stdout(predicate::str::contains("dbg"))
        .stdout(predicate::str::contains("[debug]"))
        .stdout(predicate::str::contains("mutually exclusive"));
}

#[test]
fn test_list_json_reports_unresolvable_descriptor() {
    let project = project(DESCRIPTORS);
    let output = devboot(project.path())
        .args(["list", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let rows: Vec<serde_json::Value> = serde_json::from_slice(&output).unwrap();
    let memcheck = rows.iter().find(|row| row["name"] == "memcheck").unwrap();
    assert_eq!(memcheck["supportable"], false);
    assert!(memcheck["error"].as_str().unwrap().contains("mutually exclusive"));

    let py310 = rows.iter().find(|row| row["name"] == "py310").unwrap();
    assert_eq!(py310["supportable"], true);
    assert!(py310.get("error").is_none());
}

#[test]
fn test_show_as_json() {
    let project = project(DESCRIPTORS);
    let output = devboot(project.path())
        .args(["show", "dbg", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["name"], "dbg");
    assert_eq!(report["platform"], "linux-64--x86_64");
    assert_eq!(report["supportable_providers"], serde_json::json!(["build-from-source"]));
    assert!(report["record"].is_null());
}

#[test]
fn test_providers_depend_on_platform() {
    let project = project(DESCRIPTORS);
    devboot(project.path())
        .args(["providers", "py310"])
        .assert()
        .success()
        .stdout("build-from-source\nprebuilt\nsystem\n");

    devboot(project.path())
        .args(["providers", "py310", "--platform", "windows-64--x86_64"])
        .assert()
        .success()
        .stdout("prebuilt\n");
}

#[test]
fn test_system_provider_is_limited_to_host() {
    let project = project(DESCRIPTORS);
    devboot(project.path())
        .args(["providers", "py310", "--platform", "darwin-64--aarch64"])
        .assert()
        .success()
        .stdout("build-from-source\nprebuilt\n");
}

#[test]
fn test_providers_respect_descriptor_list() {
    let project = project(DESCRIPTORS);
    devboot(project.path())
        .args(["providers", "pypy"])
        .assert()
        .success()
        .stdout("system\n");
}

#[test]
fn test_unknown_descriptor_fails() {
    let project = project(DESCRIPTORS);
    devboot(project.path())
        .args(["show", "py399"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("py399"))
        .stderr(predicate::str::contains("Available: dbg, memcheck, py310, pypy"));
}

#[test]
fn test_conflicting_features_are_invalid_state() {
    let project = project(DESCRIPTORS);
    devboot(project.path())
        .args(["providers", "memcheck"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn test_unsupported_format_version_is_invalid_data() {
    let project = project("format-version = 2\n");
    devboot(project.path())
        .arg("list")
        .assert()
        .code(3);
}

#[test]
fn test_missing_descriptor_document() {
    let temp = TempDir::new().unwrap();
    devboot(temp.path())
        .arg("list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Help:"));
}

#[test]
fn test_path_of_uninstalled_descriptor() {
    let project = project(DESCRIPTORS);
    devboot(project.path())
        .args(["path", "py310"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not installed"));
}

#[test]
fn test_invalid_platform_argument() {
    let project = project(DESCRIPTORS);
    devboot(project.path())
        .args(["providers", "py310", "--platform", "linux"])
        .assert()
        .code(2);
}

#[test]
fn test_verbose_and_quiet_conflict() {
    let project = project(DESCRIPTORS);
    devboot(project.path())
        .args(["-v", "-q", "list"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--verbose"));
}

#[test]
fn test_unknown_language() {
    let project = project(DESCRIPTORS);
    devboot(project.path())
        .args(["--language", "cobol", "list"])
        .assert()
        .code(1);
}

#[test]
fn test_completion_script() {
    Command::cargo_bin("devboot")
        .unwrap()
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("devboot"));
}

#[test]
fn test_explicit_config_must_exist() {
    let project = project(DESCRIPTORS);
    devboot(project.path())
        .args(["--config", "missing.toml", "list"])
        .assert()
        .code(1);
}

#[test]
fn test_config_moves_descriptor_directory() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("runtimes")).unwrap();
    std::fs::write(temp.path().join("runtimes").join("python.toml"), DESCRIPTORS).unwrap();
    std::fs::write(
        temp.path().join("devboot.toml"),
        "[paths]\ndescriptors = \"runtimes\"\n",
    )
    .unwrap();

    devboot(temp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("pypy"));
}
