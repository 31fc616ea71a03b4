//! Configuration resolution for satfolio.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/satfolio/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::placement::Portfolio;

/// Complete runner configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Scratch directory handed to every solver.
    pub scratch_dir: PathBuf,
    /// Environment variable that carries `scratch_dir` into solvers.
    pub scratch_env_var: String,
    /// Placeholder replaced by the input path in command templates.
    pub benchmark_placeholder: String,
    /// Placeholder replaced by `scratch_dir` in command templates.
    pub scratch_placeholder: String,
    /// Size of a single read from a solver's output pipe.
    pub read_buffer_size: usize,
    /// Program deciding whether the input is a uniform random formula.
    pub uniform_predicate: PathBuf,
    /// Program deciding whether the input is too large.
    pub too_large_predicate: PathBuf,
    /// How long to keep collecting exit statuses once every output closed.
    pub reap_grace_ms: u64,
    /// Replacement for the built-in placement table.
    pub portfolio: Option<Portfolio>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("/tmp"),
            scratch_env_var: "TMPDIR".to_string(),
            benchmark_placeholder: "BENCHNAME".to_string(),
            scratch_placeholder: "TMPDIR".to_string(),
            read_buffer_size: 1024,
            uniform_predicate: PathBuf::from("bin/isUniform.sh"),
            too_large_predicate: PathBuf::from("bin/isTooLarge.sh"),
            reap_grace_ms: 200,
            portfolio: None,
        }
    }
}

impl Settings {
    /// The placement table in effect.
    pub fn portfolio(&self) -> Portfolio {
        self.portfolio.clone().unwrap_or_else(Portfolio::builtin)
    }

    /// Reject settings that cannot produce a working run.
    pub fn validate(&self) -> Result<()> {
        let var = &self.scratch_env_var;
        if var.is_empty() || var.contains('=') || var.contains('\0') {
            return Err(Error::Config(format!(
                "invalid scratch environment variable name {var:?}"
            )));
        }
        if self.read_buffer_size == 0 {
            return Err(Error::Config("read_buffer_size must be positive".into()));
        }
        if self.benchmark_placeholder.is_empty() {
            return Err(Error::Config("benchmark_placeholder must not be empty".into()));
        }
        if let Some(portfolio) = &self.portfolio {
            portfolio.validate()?;
        }
        Ok(())
    }
}

/// On-disk settings: every field optional so files only name what they change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    scratch_dir: Option<PathBuf>,
    scratch_env_var: Option<String>,
    benchmark_placeholder: Option<String>,
    scratch_placeholder: Option<String>,
    read_buffer_size: Option<usize>,
    uniform_predicate: Option<PathBuf>,
    too_large_predicate: Option<PathBuf>,
    reap_grace_ms: Option<u64>,
    portfolio: Option<Portfolio>,
}

/// Load settings with hierarchical resolution.
///
/// `explicit` must exist when given; the global file is optional.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_settings_file(&global_path)?;
            merge_settings(&mut settings, global);
        }
    }

    if let Some(path) = explicit {
        let file = load_settings_file(path)?;
        merge_settings(&mut settings, file);
    }

    apply_env_overrides(&mut settings);
    settings.validate()?;

    Ok(settings)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("satfolio").join("settings.json"))
}

fn load_settings_file(path: &Path) -> Result<SettingsFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_settings(base: &mut Settings, overlay: SettingsFile) {
    if let Some(v) = overlay.scratch_dir {
        base.scratch_dir = v;
    }
    if let Some(v) = overlay.scratch_env_var {
        base.scratch_env_var = v;
    }
    if let Some(v) = overlay.benchmark_placeholder {
        base.benchmark_placeholder = v;
    }
    if let Some(v) = overlay.scratch_placeholder {
        base.scratch_placeholder = v;
    }
    if let Some(v) = overlay.read_buffer_size {
        base.read_buffer_size = v;
    }
    if let Some(v) = overlay.uniform_predicate {
        base.uniform_predicate = v;
    }
    if let Some(v) = overlay.too_large_predicate {
        base.too_large_predicate = v;
    }
    if let Some(v) = overlay.reap_grace_ms {
        base.reap_grace_ms = v;
    }
    if overlay.portfolio.is_some() {
        base.portfolio = overlay.portfolio;
    }
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("SATFOLIO_SCRATCH_DIR") {
        settings.scratch_dir = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("SATFOLIO_READ_BUFFER") {
        if let Ok(n) = val.parse() {
            settings.read_buffer_size = n;
        }
    }
    if let Ok(val) = std::env::var("SATFOLIO_UNIFORM_PREDICATE") {
        settings.uniform_predicate = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("SATFOLIO_TOO_LARGE_PREDICATE") {
        settings.too_large_predicate = PathBuf::from(val);
    }
}
