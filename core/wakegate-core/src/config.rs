//! Paths and runtime configuration.
//!
//! Everything lives under one state directory (`$WAKEGATE_HOME`, else
//! `~/.wakegate`). The optional `config.toml` there tunes timings, commands and
//! recorder filters; a missing file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, WakeGateError};

pub const STATE_DIR_ENV: &str = "WAKEGATE_HOME";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const RECORDER_BIN: &str = "wakegate-recorder";
pub const GATE_BIN: &str = "wakegate-gate";

/// Returns the state directory shared by all WakeGate processes.
pub fn state_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(STATE_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".wakegate"))
        .ok_or(WakeGateError::HomeDirNotFound)
}

pub fn logs_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("logs")
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub power: PowerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    #[serde(default = "default_gate_relaunch_ms")]
    pub gate_relaunch_ms: u64,
    /// argv for the recorder; defaults to the sibling `wakegate-recorder` binary.
    #[serde(default)]
    pub recorder_command: Option<Vec<String>>,
    /// argv for the gate; defaults to the sibling `wakegate-gate` binary.
    #[serde(default)]
    pub gate_command: Option<Vec<String>>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
            gate_relaunch_ms: default_gate_relaunch_ms(),
            recorder_command: None,
            gate_command: None,
        }
    }
}

impl ServiceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn gate_relaunch_delay(&self) -> Duration {
        Duration::from_millis(self.gate_relaunch_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    #[serde(default = "default_watch_roots")]
    pub watch_roots: Vec<PathBuf>,
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<PathBuf>,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            watch_roots: default_watch_roots(),
            excluded_dirs: default_excluded_dirs(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    /// Try the isolated surface, fall back to degraded lockdown.
    #[default]
    Auto,
    /// Skip isolation and use degraded lockdown directly.
    Degraded,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_focus_interval_ms")]
    pub focus_interval_ms: u64,
    #[serde(default = "default_click_radius")]
    pub click_radius: i32,
    #[serde(default)]
    pub isolation: IsolationMode,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            focus_interval_ms: default_focus_interval_ms(),
            click_radius: default_click_radius(),
            isolation: IsolationMode::Auto,
        }
    }
}

impl GateConfig {
    pub fn focus_interval(&self) -> Duration {
        Duration::from_millis(self.focus_interval_ms.max(10))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PowerConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_gap_threshold_ms")]
    pub gap_threshold_ms: u64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            gap_threshold_ms: default_gap_threshold_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_stop_timeout_ms() -> u64 {
    3_000
}

fn default_retry_initial_ms() -> u64 {
    1_000
}

fn default_retry_max_ms() -> u64 {
    30_000
}

fn default_gate_relaunch_ms() -> u64 {
    1_000
}

fn default_focus_interval_ms() -> u64 {
    100
}

fn default_click_radius() -> i32 {
    2
}

fn default_sample_interval_ms() -> u64 {
    2_000
}

fn default_gap_threshold_ms() -> u64 {
    5_000
}

#[cfg(windows)]
fn default_watch_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("C:\\")]
}

#[cfg(not(windows))]
fn default_watch_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/")]
}

#[cfg(windows)]
fn default_excluded_dirs() -> Vec<PathBuf> {
    ["C:\\Windows", "C:\\Program Files", "C:\\Program Files (x86)", "C:\\ProgramData"]
        .iter()
        .map(PathBuf::from)
        .collect()
}

#[cfg(not(windows))]
fn default_excluded_dirs() -> Vec<PathBuf> {
    [
        "/proc", "/sys", "/dev", "/run", "/boot", "/usr", "/lib", "/lib64", "/bin", "/sbin",
        "/etc", "/var", "/snap", "/tmp", "/System", "/Library", "/private",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

fn default_allowed_extensions() -> Vec<String> {
    ["py", "docx", "xlsx", "txt", "html", "css", "js"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

pub fn config_path(state_dir: &Path) -> PathBuf {
    state_dir.join(CONFIG_FILE_NAME)
}

/// Loads `config.toml`, returning defaults when the file does not exist.
pub fn load_runtime_config(path: &Path) -> Result<RuntimeConfig> {
    if !path.exists() {
        return Ok(RuntimeConfig::default());
    }

    let content = fs_err::read_to_string(path)
        .map_err(|e| WakeGateError::io(format!("Failed to read config {}", path.display()), e))?;
    toml::from_str::<RuntimeConfig>(&content).map_err(|e| WakeGateError::ConfigMalformed {
        path: path.to_path_buf(),
        details: e.to_string(),
    })
}

/// Loads the config for a process, logging and falling back to defaults on
/// any failure.
pub fn load_or_default(state_dir: &Path) -> RuntimeConfig {
    match load_runtime_config(&config_path(state_dir)) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to load config; using defaults");
            RuntimeConfig::default()
        }
    }
}

/// Resolves a child command: the configured argv, else a binary named `bin`
/// next to the current executable.
pub fn resolve_command(configured: Option<&[String]>, bin: &str) -> Result<Vec<String>> {
    if let Some(argv) = configured.filter(|argv| !argv.is_empty()) {
        return Ok(argv.to_vec());
    }
    let exe = std::env::current_exe()
        .map_err(|e| WakeGateError::io("Failed to resolve current executable", e))?;
    let dir = exe
        .parent()
        .ok_or_else(|| WakeGateError::Platform("Executable path has no parent".to_string()))?;
    let name = format!("{}{}", bin, std::env::consts::EXE_SUFFIX);
    Ok(vec![dir.join(name).to_string_lossy().into_owned()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_uses_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = load_runtime_config(&temp.path().join("missing.toml")).unwrap();
        assert_eq!(config.service.poll_interval_ms, 1_000);
        assert_eq!(config.gate.focus_interval_ms, 100);
        assert_eq!(config.gate.isolation, IsolationMode::Auto);
        assert!(config.recorder.allowed_extensions.contains(&"py".to_string()));
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs_err::write(
            &path,
            r#"
[service]
poll_interval_ms = 250
gate_command = ["/bin/true"]

[gate]
isolation = "degraded"
"#,
        )
        .unwrap();

        let config = load_runtime_config(&path).unwrap();
        assert_eq!(config.service.poll_interval_ms, 250);
        assert_eq!(config.service.stop_timeout_ms, 3_000);
        assert_eq!(
            config.service.gate_command,
            Some(vec!["/bin/true".to_string()])
        );
        assert_eq!(config.gate.isolation, IsolationMode::Degraded);
        assert_eq!(config.gate.click_radius, 2);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs_err::write(&path, "[service\npoll_interval_ms = ").unwrap();

        assert!(matches!(
            load_runtime_config(&path),
            Err(WakeGateError::ConfigMalformed { .. })
        ));
    }

    #[test]
    fn configured_command_wins_over_sibling_binary() {
        let argv = vec!["/bin/sh".to_string(), "-c".to_string(), "true".to_string()];
        assert_eq!(resolve_command(Some(&argv), GATE_BIN).unwrap(), argv);

        let sibling = resolve_command(None, GATE_BIN).unwrap();
        assert!(sibling[0].contains(GATE_BIN));
    }
}
