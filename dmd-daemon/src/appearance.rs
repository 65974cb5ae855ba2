//! Queries for the current system appearance.
//!
//! Each platform reports a style name; only an exact match with the
//! platform's dark sentinel counts as dark.

use std::process::Command;
use std::sync::{Arc, Mutex, PoisonError};

use dmd_core::ColorMode;

use crate::error::{io_err, DaemonError};

pub const MACOS_DARK_SENTINEL: &str = "Dark";
pub const GNOME_DARK_SENTINEL: &str = "prefer-dark";

pub const GNOME_INTERFACE_SCHEMA: &str = "org.gnome.desktop.interface";
pub const GNOME_COLOR_SCHEME_KEY: &str = "color-scheme";

pub trait AppearanceQuery: Send + Sync {
    /// Style value that means dark on this platform.
    fn dark_sentinel(&self) -> &str;

    /// Raw style value; `None` when the platform reports no style at all.
    fn read_style(&self) -> Result<Option<String>, DaemonError>;

    fn current_mode(&self) -> Result<ColorMode, DaemonError> {
        let style = self.read_style()?;
        Ok(ColorMode::from_style(style.as_deref(), self.dark_sentinel()))
    }
}

/// `defaults read -g AppleInterfaceStyle`; the key is absent in light mode.
#[derive(Debug, Default, Clone)]
pub struct MacOsDefaults;

impl AppearanceQuery for MacOsDefaults {
    fn dark_sentinel(&self) -> &str {
        MACOS_DARK_SENTINEL
    }

    fn read_style(&self) -> Result<Option<String>, DaemonError> {
        let output = Command::new("defaults")
            .args(["read", "-g", "AppleInterfaceStyle"])
            .output()
            .map_err(|e| io_err("defaults", e))?;

        if !output.status.success() {
            return Ok(None);
        }
        let style = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Some(style).filter(|style| !style.is_empty()))
    }
}

/// `gsettings get org.gnome.desktop.interface color-scheme`.
#[derive(Debug, Default, Clone)]
pub struct GnomeSettings;

impl AppearanceQuery for GnomeSettings {
    fn dark_sentinel(&self) -> &str {
        GNOME_DARK_SENTINEL
    }

    fn read_style(&self) -> Result<Option<String>, DaemonError> {
        let output = Command::new("gsettings")
            .args(["get", GNOME_INTERFACE_SCHEMA, GNOME_COLOR_SCHEME_KEY])
            .output()
            .map_err(|e| io_err("gsettings", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DaemonError::Appearance(format!(
                "gsettings failed (status {}): {stderr}",
                output.status
            )));
        }
        Ok(parse_gsettings_value(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Strip the GVariant string quoting from `gsettings get` output.
pub fn parse_gsettings_value(raw: &str) -> Option<String> {
    let value = raw.trim().trim_matches('\'').trim();
    Some(value.to_string()).filter(|value| !value.is_empty())
}

/// Reports whatever style the owner last set. Used where the platform
/// offers no query, and to drive the daemon by hand.
#[derive(Debug)]
pub struct ManualAppearance {
    style: Mutex<Option<String>>,
    sentinel: String,
}

impl ManualAppearance {
    pub fn new(style: Option<&str>, sentinel: &str) -> Self {
        Self {
            style: Mutex::new(style.map(str::to_string)),
            sentinel: sentinel.to_string(),
        }
    }

    pub fn mode(mode: ColorMode) -> Self {
        let appearance = Self::new(None, "dark");
        appearance.set_mode(mode);
        appearance
    }

    pub fn set_style(&self, style: Option<&str>) {
        let mut guard = self.style.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = style.map(str::to_string);
    }

    pub fn set_mode(&self, mode: ColorMode) {
        let style = (mode == ColorMode::Dark).then(|| self.sentinel.clone());
        self.set_style(style.as_deref());
    }
}

impl AppearanceQuery for ManualAppearance {
    fn dark_sentinel(&self) -> &str {
        &self.sentinel
    }

    fn read_style(&self) -> Result<Option<String>, DaemonError> {
        let guard = self.style.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.clone())
    }
}

/// Query matching the platform this binary was built for.
pub fn native_appearance() -> Arc<dyn AppearanceQuery> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(MacOsDefaults)
    }

    #[cfg(target_os = "linux")]
    {
        Arc::new(GnomeSettings)
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Arc::new(ManualAppearance::mode(ColorMode::Light))
    }
}

/// Run the (blocking) query on the blocking pool.
pub async fn query_off_thread(query: Arc<dyn AppearanceQuery>) -> Result<ColorMode, DaemonError> {
    tokio::task::spawn_blocking(move || query.current_mode())
        .await
        .map_err(|err| DaemonError::Join(format!("appearance query: {err}")))?
}

/// Current mode, or `fallback` with a warning when the query fails.
pub fn mode_or_fallback(query: &dyn AppearanceQuery, fallback: ColorMode) -> ColorMode {
    match query.current_mode() {
        Ok(mode) => mode,
        Err(err) => {
            tracing::warn!(error = %err, fallback = %fallback, "could not query appearance");
            fallback
        }
    }
}
