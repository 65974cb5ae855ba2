use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn dmd_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dark-mode-daemon"));
    cmd.env("HOME", home)
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("RUST_LOG");
    cmd
}

fn scripts_dir(config_root: &Path) -> PathBuf {
    let dir = config_root.join("dark-mode-daemon").join("scripts");
    fs::create_dir_all(&dir).expect("create scripts dir");
    dir
}

#[cfg(unix)]
fn write_script(dir: &Path, name: &str, body: &str, executable: bool) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mode = if executable { 0o755 } else { 0o644 };
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).expect("chmod");
    path
}

#[test]
fn no_arguments_prints_usage() {
    let home = TempDir::new().expect("home");
    dmd_cmd(home.path())
        .assert()
        .success()
        .stdout(contains("Usage"));
}

#[test]
fn help_forms_print_usage() {
    let home = TempDir::new().expect("home");
    for flag in ["help", "-h", "--help"] {
        dmd_cmd(home.path())
            .arg(flag)
            .assert()
            .success()
            .stdout(contains("Usage").and(contains("daemon")));
    }
}

#[test]
fn unknown_command_is_reported_on_stdout() {
    let home = TempDir::new().expect("home");
    dmd_cmd(home.path())
        .arg("frobnicate")
        .assert()
        .code(1)
        .stdout(contains("Unknown command: frobnicate"));
}

#[test]
fn list_without_config_directory_prints_nothing() {
    let home = TempDir::new().expect("home");
    dmd_cmd(home.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[cfg(unix)]
#[test]
fn list_prints_only_executable_scripts() {
    let home = TempDir::new().expect("home");
    let dir = scripts_dir(&home.path().join(".config"));
    let script = write_script(&dir, "kitty.sh", "exit 0", true);
    write_script(&dir, "README.sh", "exit 0", false);
    fs::create_dir_all(dir.join("nested")).expect("nested dir");

    dmd_cmd(home.path())
        .arg("list")
        .assert()
        .success()
        .stdout(format!("{}\n", script.display()));
}

#[cfg(unix)]
#[test]
fn list_verbose_reports_skipped_entries_on_stderr() {
    let home = TempDir::new().expect("home");
    let dir = scripts_dir(&home.path().join(".config"));
    let script = write_script(&dir, "kitty.sh", "exit 0", true);
    write_script(&dir, "notes.sh", "exit 0", false);

    dmd_cmd(home.path())
        .args(["list", "--verbose"])
        .assert()
        .success()
        .stdout(format!("{}\n", script.display()))
        .stderr(contains("notes.sh").and(contains("not executable")));
}

#[cfg(unix)]
#[test]
fn xdg_config_home_takes_precedence() {
    let home = TempDir::new().expect("home");
    let xdg = TempDir::new().expect("xdg");
    write_script(
        &scripts_dir(&home.path().join(".config")),
        "from-home.sh",
        "exit 0",
        true,
    );
    let preferred = write_script(&scripts_dir(xdg.path()), "from-xdg.sh", "exit 0", true);

    dmd_cmd(home.path())
        .env("XDG_CONFIG_HOME", xdg.path())
        .arg("list")
        .assert()
        .success()
        .stdout(format!("{}\n", preferred.display()));
}

#[cfg(unix)]
#[test]
fn run_passes_the_mode_and_reports_json() {
    let home = TempDir::new().expect("home");
    let dir = scripts_dir(&home.path().join(".config"));
    write_script(&dir, "echo.sh", r#"echo "$DMD_COLOR_MODE""#, true);
    write_script(&dir, "fail.sh", "exit 3", true);

    let output = dmd_cmd(home.path())
        .args(["run", "dark", "--json"])
        .output()
        .expect("run dark");
    assert!(output.status.success());

    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("summary JSON");
    assert_eq!(summary["mode"], "dark");
    assert_eq!(summary["trigger"], "manual");
    assert_eq!(summary["notified"], 2);
    assert_eq!(summary["failed"], 1);

    let results = summary["results"].as_array().expect("results");
    let echo = results
        .iter()
        .find(|result| result["script"].as_str().is_some_and(|s| s.ends_with("echo.sh")))
        .expect("echo result");
    assert_eq!(echo["stdout"], "dark\n");
    assert_eq!(echo["status"]["kind"], "exited");
    assert_eq!(echo["status"]["code"], 0);
}

#[cfg(unix)]
#[test]
fn run_prints_a_human_summary() {
    let home = TempDir::new().expect("home");
    let dir = scripts_dir(&home.path().join(".config"));
    write_script(&dir, "ok.sh", "exit 0", true);

    dmd_cmd(home.path())
        .args(["run", "light"])
        .assert()
        .success()
        .stdout(contains("notified 1 scripts about the change to light mode"));
}

#[test]
fn run_rejects_unknown_modes() {
    let home = TempDir::new().expect("home");
    dmd_cmd(home.path())
        .args(["run", "purple"])
        .assert()
        .failure()
        .stderr(contains("unknown color mode"));
}

#[test]
fn logs_without_files_say_so() {
    let home = TempDir::new().expect("home");
    dmd_cmd(home.path())
        .arg("logs")
        .assert()
        .success()
        .stdout(contains("log file not found").and(contains("daemon-err.log")));
}

#[cfg(target_os = "linux")]
#[test]
fn autostart_entry_lifecycle() {
    let home = TempDir::new().expect("home");
    let config_home = TempDir::new().expect("config home");
    let entry = config_home
        .path()
        .join("autostart")
        .join("dark-mode-daemon.desktop");

    let autostart = |args: &[&str]| {
        let mut cmd = dmd_cmd(home.path());
        cmd.env("XDG_CONFIG_HOME", config_home.path())
            .arg("autostart")
            .args(args);
        cmd
    };

    autostart(&["check"])
        .assert()
        .success()
        .stdout(contains("not set up"));

    autostart(&["setup", "--binary-path", "/opt/dmd/dark-mode-daemon"])
        .assert()
        .success();
    let contents = fs::read_to_string(&entry).expect("desktop entry");
    assert!(contents.contains("Exec=/opt/dmd/dark-mode-daemon daemon"));

    autostart(&["setup", "--binary-path", "/opt/dmd/dark-mode-daemon"])
        .assert()
        .failure()
        .stderr(contains("--force"));
    autostart(&["setup", "--binary-path", "/opt/dmd/other", "--force"])
        .assert()
        .success();

    autostart(&["check"])
        .assert()
        .success()
        .stdout(contains("is set up"));
    autostart(&["remove"]).assert().success();
    assert!(!entry.exists());
}
