//! Engine configuration stored as TOML (conventionally `stub-behavior.toml`).

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::print::DEFAULT_DOUBLE_NAME;
use crate::core::record::HookOptions;

/// Engine configuration (TOML).
///
/// Missing fields fall back to the defaults a bare [`crate::Stub::new`] uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Name doubles report in dispatch failure messages.
    pub double_name: String,

    pub hook: HookConfig,
}

/// Options applied when a hook is registered without explicit options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HookConfig {
    /// Hooks return a promise of injectors instead of injectors.
    pub promisified: bool,

    /// Delay in milliseconds between the hook finishing and the callback firing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            double_name: DEFAULT_DOUBLE_NAME.to_string(),
            hook: HookConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.double_name.trim().is_empty() {
            return Err(anyhow!("double_name must be non-empty"));
        }
        if self.hook.timeout_ms == Some(0) {
            return Err(anyhow!("hook.timeout_ms must be > 0 when set"));
        }
        Ok(())
    }

    pub fn hook_options(&self) -> HookOptions {
        let mut options = HookOptions::default();
        if self.hook.promisified {
            options = options.promisified();
        }
        if let Some(timeout_ms) = self.hook.timeout_ms {
            options = options.with_timeout(Duration::from_millis(timeout_ms));
        }
        options
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        return Ok(EngineConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    debug!(path = %path.display(), double = %cfg.double_name, "loaded config");
    Ok(cfg)
}

/// Render config as the TOML written by [`write_config`].
pub fn render_config(cfg: &EngineConfig) -> Result<String> {
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    Ok(buf)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let buf = render_config(cfg)?;
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.hook_options(), HookOptions::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("stub-behavior.toml");
        let cfg = EngineConfig {
            double_name: "fs.readFile".to_string(),
            hook: HookConfig {
                promisified: true,
                timeout_ms: Some(2000),
            },
        };
        write_config(&path, &cfg).expect("write");
        assert!(!path.with_extension("toml.tmp").exists());
        assert_eq!(load_config(&path).expect("load"), cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[hook]\ntimeout_ms = 50\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.double_name, "stub");
        assert_eq!(
            cfg.hook_options(),
            HookOptions::default().with_timeout(Duration::from_millis(50))
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "double_name = \"  \"\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("double_name must be non-empty"));

        let zero = EngineConfig {
            hook: HookConfig {
                promisified: false,
                timeout_ms: Some(0),
            },
            ..EngineConfig::default()
        };
        assert!(zero.validate().is_err());
        assert!(write_config(&path, &zero).is_err());
    }
}
