//! Fan-out of one mode to every located script, joined before the summary.

use std::collections::HashMap;

use chrono::Utc;
use tokio::task::JoinSet;

use dmd_core::{
    ColorMode, DispatchBatch, DispatchSummary, ExecutionResult, ScriptPath, ScriptStatus, Trigger,
};

use crate::executor::ScriptExecutor;
use crate::locator::ScriptLocator;

#[derive(Debug, Clone)]
pub struct Dispatcher {
    locator: ScriptLocator,
    executor: ScriptExecutor,
    parallel: bool,
}

impl Dispatcher {
    pub fn new(locator: ScriptLocator, executor: ScriptExecutor) -> Self {
        Self {
            locator,
            executor,
            parallel: true,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn locator(&self) -> &ScriptLocator {
        &self.locator
    }

    /// Locate scripts afresh, run all of them for `mode`, and return once
    /// every execution has returned.
    pub async fn dispatch(&self, mode: ColorMode, trigger: Trigger) -> DispatchSummary {
        let started_at = Utc::now();

        let locator = self.locator.clone();
        let scripts = match tokio::task::spawn_blocking(move || locator.locate()).await {
            Ok(scripts) => scripts,
            Err(err) => {
                tracing::error!(error = %err, "script lookup task failed");
                Vec::new()
            }
        };
        let batch = DispatchBatch::new(mode, scripts);

        let results = if batch.is_empty() {
            Vec::new()
        } else if self.parallel {
            self.run_parallel(&batch).await
        } else {
            self.run_sequential(&batch).await
        };

        let notified = results.len();
        let failed = results.iter().filter(|result| !result.success()).count();
        tracing::info!(
            mode = %mode,
            trigger = %trigger,
            failed,
            "notified {notified} scripts about the change to {mode} mode",
        );

        DispatchSummary {
            mode,
            trigger,
            notified,
            failed,
            results,
            started_at,
            completed_at: Utc::now(),
        }
    }

    async fn run_parallel(&self, batch: &DispatchBatch) -> Vec<ExecutionResult> {
        let mut tasks = JoinSet::new();
        let mut scripts_by_task = HashMap::new();

        for script in &batch.scripts {
            let executor = self.executor.clone();
            let owned = script.clone();
            let mode = batch.mode;
            let handle = tasks.spawn(async move { executor.execute(&owned, mode).await });
            scripts_by_task.insert(handle.id(), script.clone());
        }

        let mut results = Vec::with_capacity(batch.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => {
                    let script = scripts_by_task
                        .remove(&err.id())
                        .unwrap_or_else(|| ScriptPath::from(std::path::PathBuf::new()));
                    tracing::error!(script = %script, error = %err, "script task aborted");
                    results.push(aborted_result(script, batch.mode, err.to_string()));
                }
            }
        }
        results
    }

    async fn run_sequential(&self, batch: &DispatchBatch) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(batch.len());
        for script in &batch.scripts {
            results.push(self.executor.execute(script, batch.mode).await);
        }
        results
    }
}

fn aborted_result(script: ScriptPath, mode: ColorMode, reason: String) -> ExecutionResult {
    let now = Utc::now();
    ExecutionResult {
        script,
        mode,
        stdout: String::new(),
        status: ScriptStatus::WaitFailed { reason },
        started_at: now,
        finished_at: now,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn base_with_scripts(scripts: &[(&str, &str)]) -> TempDir {
        let base = TempDir::new().expect("base");
        let dir = base.path().join("scripts");
        fs::create_dir_all(&dir).expect("mkdir scripts");
        for (name, body) in scripts {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        }
        base
    }

    fn dispatcher_for(base: &Path) -> Dispatcher {
        Dispatcher::new(ScriptLocator::with_base_dir(base), ScriptExecutor::new())
    }

    fn result_for<'a>(summary: &'a DispatchSummary, name: &str) -> &'a ExecutionResult {
        summary
            .results
            .iter()
            .find(|result| result.script.file_name() == name)
            .unwrap_or_else(|| panic!("no result for {name}"))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn summary_waits_for_the_slowest_script() {
        let base = base_with_scripts(&[("fast.sh", "exit 0"), ("slow.sh", "sleep 1")]);

        let summary = dispatcher_for(base.path())
            .dispatch(ColorMode::Dark, Trigger::Manual)
            .await;

        assert_eq!(summary.notified, 2);
        assert_eq!(summary.failed, 0);
        let slow = result_for(&summary, "slow.sh");
        let fast = result_for(&summary, "fast.sh");
        assert!(summary.completed_at >= slow.finished_at);
        assert!(summary.completed_at >= fast.finished_at);
        assert!(fast.finished_at <= slow.finished_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn scripts_run_concurrently() {
        let base = base_with_scripts(&[
            ("one.sh", "sleep 1"),
            ("two.sh", "sleep 1"),
            ("three.sh", "sleep 1"),
        ]);

        let started = std::time::Instant::now();
        let summary = dispatcher_for(base.path())
            .dispatch(ColorMode::Light, Trigger::Manual)
            .await;

        assert_eq!(summary.notified, 3);
        assert!(
            started.elapsed() < std::time::Duration::from_millis(2500),
            "three 1s scripts should overlap, took {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn failing_siblings_do_not_stop_the_batch() {
        let base = base_with_scripts(&[
            ("broken.sh", "echo 'nope'\nexit 1"),
            ("ok.sh", r#"echo "$DMD_COLOR_MODE""#),
        ]);
        // Executable but not a valid program, so the spawn itself fails.
        let bogus = base.path().join("scripts").join("bogus");
        fs::write(&bogus, [0u8, 1, 2, 3]).expect("write bogus");
        fs::set_permissions(&bogus, fs::Permissions::from_mode(0o755)).expect("chmod");

        let summary = dispatcher_for(base.path())
            .dispatch(ColorMode::Dark, Trigger::AppearanceChanged)
            .await;

        assert_eq!(summary.notified, 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(result_for(&summary, "ok.sh").stdout, "dark\n");
        assert_eq!(
            result_for(&summary, "broken.sh").status,
            ScriptStatus::Exited { code: 1 }
        );
        assert!(!result_for(&summary, "bogus").success());
    }

    #[tokio::test]
    async fn empty_scripts_directory_completes_with_zero() {
        let base = base_with_scripts(&[]);

        let summary = dispatcher_for(base.path())
            .dispatch(ColorMode::Light, Trigger::Startup)
            .await;

        assert_eq!(summary.notified, 0);
        assert_eq!(summary.failed, 0);
        assert!(summary.results.is_empty());
        assert_eq!(summary.trigger, Trigger::Startup);
    }

    #[tokio::test]
    async fn unconfigured_locator_completes_with_zero() {
        let dispatcher = Dispatcher::new(ScriptLocator::unconfigured(), ScriptExecutor::new());
        let summary = dispatcher.dispatch(ColorMode::Dark, Trigger::Wake).await;
        assert_eq!(summary.notified, 0);
    }

    #[tokio::test]
    async fn sequential_mode_still_runs_every_script() {
        let base = base_with_scripts(&[("a.sh", "exit 0"), ("b.sh", "exit 0")]);

        let summary = dispatcher_for(base.path())
            .with_parallel(false)
            .dispatch(ColorMode::Dark, Trigger::Manual)
            .await;

        assert_eq!(summary.notified, 2);
        assert_eq!(summary.failed, 0);
    }
}
