//! Per-user launchd agent that keeps `dark-mode-daemon daemon` running.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use plist::{Dictionary, Value};

use crate::error::{io_err, DaemonError};
use crate::paths::{
    launch_agents_dir, launchd_plist_path, logs_dir, stderr_log_path, stdout_log_path, AGENT_LABEL,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    NotInstalled,
    Installed { plist: PathBuf, loaded: bool },
}

/// Property list describing the agent: started at login, restarted when it
/// exits, output captured under `<base>/logs`.
pub fn agent_plist(binary_path: &Path, base: &Path) -> Value {
    let path_value = |path: &Path| Value::String(path.display().to_string());

    let mut agent = Dictionary::new();
    agent.insert("Label".into(), Value::String(AGENT_LABEL.into()));
    agent.insert(
        "ProgramArguments".into(),
        Value::Array(vec![path_value(binary_path), Value::String("daemon".into())]),
    );
    agent.insert("RunAtLoad".into(), Value::Boolean(true));
    agent.insert("KeepAlive".into(), Value::Boolean(true));
    agent.insert("ProcessType".into(), Value::String("Background".into()));
    agent.insert("StandardOutPath".into(), path_value(&stdout_log_path(base)));
    agent.insert("StandardErrorPath".into(), path_value(&stderr_log_path(base)));
    Value::Dictionary(agent)
}

/// XML rendering of [`agent_plist`].
pub fn generate_plist(binary_path: &Path, base: &Path) -> Result<String, DaemonError> {
    let mut xml = Vec::new();
    agent_plist(binary_path, base)
        .to_writer_xml(&mut xml)
        .map_err(|e| DaemonError::Launchd(format!("cannot render agent plist: {e}")))?;
    String::from_utf8(xml)
        .map_err(|e| DaemonError::Launchd(format!("agent plist is not UTF-8: {e}")))
}

/// Write the plist, then (re)load the agent into the user's GUI domain.
///
/// An existing plist is left alone unless `force` is set.
pub fn install(
    home: &Path,
    base: &Path,
    binary_path: &Path,
    force: bool,
) -> Result<PathBuf, DaemonError> {
    let session = Session::current()?;

    let plist = launchd_plist_path(home);
    if plist.exists() && !force {
        return Err(DaemonError::Launchd(format!(
            "{} already exists; pass --force to overwrite it",
            plist.display()
        )));
    }

    for dir in [launch_agents_dir(home), logs_dir(base)] {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }
    fs::write(&plist, generate_plist(binary_path, base)?).map_err(|e| io_err(&plist, e))?;

    session.unload();
    session.launchctl(Launchctl::Bootstrap(&plist))?;
    session.launchctl(Launchctl::Kickstart)?;
    tracing::info!(plist = %plist.display(), "launchd agent installed");
    Ok(plist)
}

/// Whether the plist exists and launchd knows about the agent.
pub fn status(home: &Path) -> Result<AgentStatus, DaemonError> {
    let session = Session::current()?;

    let plist = launchd_plist_path(home);
    if !plist.exists() {
        return Ok(AgentStatus::NotInstalled);
    }
    let loaded = session.launchctl(Launchctl::Print).is_ok();
    Ok(AgentStatus::Installed { plist, loaded })
}

/// Unload the agent and remove its plist. `false` when nothing was installed.
pub fn uninstall(home: &Path) -> Result<bool, DaemonError> {
    let session = Session::current()?;

    let plist = launchd_plist_path(home);
    if !plist.exists() {
        return Ok(false);
    }
    session.unload();
    fs::remove_file(&plist).map_err(|e| io_err(&plist, e))?;
    Ok(true)
}

enum Launchctl<'a> {
    Bootstrap(&'a Path),
    Bootout,
    Kickstart,
    Print,
}

impl Launchctl<'_> {
    fn verb(&self) -> &'static str {
        match self {
            Launchctl::Bootstrap(_) => "bootstrap",
            Launchctl::Bootout => "bootout",
            Launchctl::Kickstart => "kickstart",
            Launchctl::Print => "print",
        }
    }
}

/// The `gui/<uid>` launchd domain of the invoking user.
struct Session {
    domain: String,
}

impl Session {
    #[cfg(target_os = "macos")]
    fn current() -> Result<Self, DaemonError> {
        Ok(Self {
            domain: format!("gui/{}", nix::unistd::getuid()),
        })
    }

    #[cfg(not(target_os = "macos"))]
    fn current() -> Result<Self, DaemonError> {
        Err(DaemonError::Launchd(
            "launchd agents can only be managed on macOS".to_string(),
        ))
    }

    fn service_target(&self) -> String {
        format!("{}/{AGENT_LABEL}", self.domain)
    }

    fn args(&self, action: &Launchctl<'_>) -> Vec<OsString> {
        let mut args = vec![OsString::from(action.verb())];
        match action {
            Launchctl::Bootstrap(plist) => {
                args.push(self.domain.clone().into());
                args.push(plist.as_os_str().to_owned());
            }
            Launchctl::Kickstart => {
                args.push("-k".into());
                args.push(self.service_target().into());
            }
            Launchctl::Bootout | Launchctl::Print => args.push(self.service_target().into()),
        }
        args
    }

    fn launchctl(&self, action: Launchctl<'_>) -> Result<(), DaemonError> {
        let output = Command::new("launchctl")
            .args(self.args(&action))
            .output()
            .map_err(|e| io_err("launchctl", e))?;
        if output.status.success() {
            return Ok(());
        }
        Err(DaemonError::Launchd(format!(
            "launchctl {} exited with {}: {}",
            action.verb(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }

    /// Boot out a previously loaded agent; not being loaded is fine.
    fn unload(&self) {
        if let Err(err) = self.launchctl(Launchctl::Bootout) {
            tracing::debug!(error = %err, "agent was not loaded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_at<'a>(agent: &'a Dictionary, key: &str) -> Option<&'a str> {
        agent.get(key).and_then(Value::as_string)
    }

    #[test]
    fn agent_runs_the_daemon_command_with_logs_under_base() {
        let xml = generate_plist(
            Path::new("/usr/local/bin/dark-mode-daemon"),
            Path::new("/Users/tester/.config/dark-mode-daemon"),
        )
        .expect("render plist");

        let parsed = Value::from_reader_xml(xml.as_bytes()).expect("parse plist");
        let agent = parsed.as_dictionary().expect("root dictionary");

        assert_eq!(string_at(agent, "Label"), Some(AGENT_LABEL));
        assert_eq!(string_at(agent, "ProcessType"), Some("Background"));
        assert_eq!(agent.get("RunAtLoad").and_then(Value::as_boolean), Some(true));
        assert_eq!(agent.get("KeepAlive").and_then(Value::as_boolean), Some(true));
        assert_eq!(
            string_at(agent, "StandardErrorPath"),
            Some("/Users/tester/.config/dark-mode-daemon/logs/daemon-err.log")
        );

        let program: Vec<_> = agent
            .get("ProgramArguments")
            .and_then(Value::as_array)
            .expect("ProgramArguments")
            .iter()
            .filter_map(Value::as_string)
            .collect();
        assert_eq!(program, ["/usr/local/bin/dark-mode-daemon", "daemon"]);
    }

    #[test]
    fn markup_characters_in_paths_survive_rendering() {
        let xml = generate_plist(Path::new("/opt/R&D/<dmd>"), Path::new("/tmp/base"))
            .expect("render plist");
        let parsed = Value::from_reader_xml(xml.as_bytes()).expect("parse plist");
        let program = parsed
            .as_dictionary()
            .and_then(|agent| agent.get("ProgramArguments"))
            .and_then(Value::as_array)
            .expect("ProgramArguments");
        assert_eq!(program[0].as_string(), Some("/opt/R&D/<dmd>"));
    }

    #[test]
    fn launchctl_arguments_target_the_agent_service() {
        let session = Session {
            domain: "gui/501".to_string(),
        };
        let plist = Path::new("/Users/tester/Library/LaunchAgents/agent.plist");

        assert_eq!(
            session.args(&Launchctl::Bootstrap(plist)),
            ["bootstrap", "gui/501", "/Users/tester/Library/LaunchAgents/agent.plist"]
        );
        let target = format!("gui/501/{AGENT_LABEL}");
        assert_eq!(
            session.args(&Launchctl::Kickstart),
            [OsString::from("kickstart"), "-k".into(), target.clone().into()]
        );
        assert_eq!(
            session.args(&Launchctl::Bootout),
            [OsString::from("bootout"), target.into()]
        );
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn management_is_refused_off_macos() {
        let home = Path::new("/nonexistent");
        assert!(matches!(status(home), Err(DaemonError::Launchd(_))));
        assert!(matches!(uninstall(home), Err(DaemonError::Launchd(_))));
    }
}
