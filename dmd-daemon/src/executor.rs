//! Runs a single script as a child process for one mode.
//!
//! The child gets a snapshot of this process's environment with
//! `DMD_COLOR_MODE` set, stdout piped back, and stderr inherited. Every way a
//! run can go wrong ends up in [`ScriptStatus`]; nothing here returns an error.

use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use chrono::Utc;
use tokio::process::{Child, Command};

use dmd_core::{ColorMode, Config, ExecutionResult, ScriptPath, ScriptStatus, COLOR_MODE_ENV};

use crate::log_rotation::RotationPolicy;
use crate::paths::script_logs_dir;

#[derive(Debug, Clone, Default)]
pub struct ScriptExecutor {
    timeout: Option<Duration>,
    output_log_dir: Option<PathBuf>,
}

impl ScriptExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config, base: Option<&Path>) -> Self {
        let output_log_dir = base
            .filter(|_| config.log_script_output)
            .map(script_logs_dir);
        Self {
            timeout: config.script_timeout(),
            output_log_dir,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_log_dir = dir;
        self
    }

    pub async fn execute(&self, script: &ScriptPath, mode: ColorMode) -> ExecutionResult {
        let started_at = Utc::now();
        tracing::info!(script = %script, mode = %mode, "launching script");

        let mut command = Command::new(script.as_path());
        command
            .env_clear()
            .envs(child_environment(env::vars_os(), mode))
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        let (status, raw_stdout) = match command.spawn() {
            Ok(child) => self.wait(child).await,
            Err(err) => (
                ScriptStatus::SpawnFailed {
                    reason: err.to_string(),
                },
                Vec::new(),
            ),
        };

        let result = ExecutionResult {
            stdout: decode_stdout(script, raw_stdout),
            script: script.clone(),
            mode,
            status,
            started_at,
            finished_at: Utc::now(),
        };
        report(&result);

        if let Some(dir) = &self.output_log_dir {
            let dir = dir.clone();
            let entry = result.clone();
            let written = tokio::task::spawn_blocking(move || append_output_log(&dir, &entry)).await;
            match written {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(script = %script, error = %err, "failed to write script output log")
                }
                Err(err) => {
                    tracing::warn!(script = %script, error = %err, "script output log task failed")
                }
            }
        }

        result
    }

    async fn wait(&self, child: Child) -> (ScriptStatus, Vec<u8>) {
        let output = child.wait_with_output();
        let output = match self.timeout {
            // Dropping the timed-out future drops the child, which kills it.
            Some(limit) => match tokio::time::timeout(limit, output).await {
                Ok(output) => output,
                Err(_) => return (ScriptStatus::timed_out(limit), Vec::new()),
            },
            None => output.await,
        };

        match output {
            Ok(output) => (status_from_exit(output.status), output.stdout),
            Err(err) => (
                ScriptStatus::WaitFailed {
                    reason: err.to_string(),
                },
                Vec::new(),
            ),
        }
    }
}

/// Copy of `inherited` with the mode variable added or overridden.
pub fn child_environment<I>(inherited: I, mode: ColorMode) -> HashMap<OsString, OsString>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut environment: HashMap<OsString, OsString> = inherited.into_iter().collect();
    environment.insert(COLOR_MODE_ENV.into(), mode.as_str().into());
    environment
}

fn status_from_exit(status: ExitStatus) -> ScriptStatus {
    match status.code() {
        Some(code) => ScriptStatus::Exited { code },
        None => ScriptStatus::Signaled,
    }
}

fn decode_stdout(script: &ScriptPath, raw: Vec<u8>) -> String {
    match String::from_utf8(raw) {
        Ok(text) => text,
        Err(err) => {
            tracing::debug!(script = %script, error = %err, "script output is not valid UTF-8, dropping it");
            String::new()
        }
    }
}

fn report(result: &ExecutionResult) {
    let elapsed_ms = (result.finished_at - result.started_at).num_milliseconds();
    match &result.status {
        ScriptStatus::Exited { code: 0 } => {
            tracing::debug!(script = %result.script, elapsed_ms, "script finished");
        }
        ScriptStatus::SpawnFailed { reason } => {
            tracing::error!(script = %result.script, error = %reason, "failed to launch script");
        }
        status => {
            tracing::warn!(
                script = %result.script,
                status = %status,
                last_output = %result.stdout.trim_end(),
                "script failed",
            );
        }
    }
}

fn append_output_log(dir: &Path, result: &ExecutionResult) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.log", result.script.file_name()));
    RotationPolicy::SCRIPT_OUTPUT.apply(&path)?;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    writeln!(
        file,
        "[{}] mode={} {}",
        result.finished_at.to_rfc3339(),
        result.mode,
        result.status
    )?;
    file.write_all(result.stdout.as_bytes())?;
    if !result.stdout.is_empty() && !result.stdout.ends_with('\n') {
        writeln!(file)?;
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Instant;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> ScriptPath {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        ScriptPath::from(path)
    }

    #[test]
    fn environment_snapshot_overrides_only_the_mode() {
        let inherited = vec![
            (OsString::from("HOME"), OsString::from("/home/tester")),
            (OsString::from(COLOR_MODE_ENV), OsString::from("light")),
        ];
        let env = child_environment(inherited, ColorMode::Dark);

        assert_eq!(env.len(), 2);
        assert_eq!(env[&OsString::from(COLOR_MODE_ENV)], OsString::from("dark"));
        assert_eq!(env[&OsString::from("HOME")], OsString::from("/home/tester"));
    }

    #[tokio::test]
    async fn child_sees_mode_and_inherited_environment() {
        let dir = TempDir::new().expect("dir");
        let echo = script(&dir, "echo.sh", r#"printf '%s\n%s' "$DMD_COLOR_MODE" "$PATH""#);
        let path = env::var("PATH").unwrap_or_default();

        for mode in [ColorMode::Dark, ColorMode::Light] {
            let result = ScriptExecutor::new().execute(&echo, mode).await;
            assert!(result.success(), "status: {}", result.status);
            assert_eq!(result.stdout, format!("{mode}\n{path}"));
            assert_eq!(result.mode, mode);
        }
    }

    #[tokio::test]
    async fn non_zero_exit_is_captured_with_output() {
        let dir = TempDir::new().expect("dir");
        let failing = script(&dir, "fail.sh", "echo 'theme file missing'\nexit 3");

        let result = ScriptExecutor::new().execute(&failing, ColorMode::Dark).await;
        assert!(!result.success());
        assert_eq!(result.status, ScriptStatus::Exited { code: 3 });
        assert_eq!(result.stdout, "theme file missing\n");
    }

    #[tokio::test]
    async fn spawn_failure_is_data_not_an_error() {
        let dir = TempDir::new().expect("dir");
        let missing = ScriptPath::from(dir.path().join("does-not-exist.sh"));

        let result = ScriptExecutor::new().execute(&missing, ColorMode::Light).await;
        assert!(!result.success());
        assert!(
            matches!(result.status, ScriptStatus::SpawnFailed { .. }),
            "got {:?}",
            result.status
        );
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn undecodable_output_becomes_empty() {
        let dir = TempDir::new().expect("dir");
        let binary = script(&dir, "binary.sh", r"printf '\377\376'");

        let result = ScriptExecutor::new().execute(&binary, ColorMode::Dark).await;
        assert!(result.success());
        assert_eq!(result.stdout, "");
    }

    #[tokio::test]
    async fn timeout_kills_a_hung_script() {
        let dir = TempDir::new().expect("dir");
        let hung = script(&dir, "hung.sh", "exec sleep 30");
        let executor = ScriptExecutor::new().with_timeout(Some(Duration::from_millis(200)));

        let started = Instant::now();
        let result = executor.execute(&hung, ColorMode::Dark).await;
        assert_eq!(result.status, ScriptStatus::TimedOut { after_ms: 200 });
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn output_is_appended_to_the_script_log() {
        let dir = TempDir::new().expect("dir");
        let logs = TempDir::new().expect("logs");
        let chatty = script(&dir, "chatty.sh", r#"echo "switched to $DMD_COLOR_MODE""#);
        let executor = ScriptExecutor::new().with_output_log_dir(Some(logs.path().to_path_buf()));

        executor.execute(&chatty, ColorMode::Dark).await;
        executor.execute(&chatty, ColorMode::Light).await;

        let log = fs::read_to_string(logs.path().join("chatty.sh.log")).expect("read log");
        assert!(log.contains("mode=dark exited with status 0"), "log: {log}");
        assert!(log.contains("switched to dark\n"), "log: {log}");
        assert!(log.contains("switched to light\n"), "log: {log}");
    }
}
