use std::path::{Path, PathBuf};

use super::types::{AppConfig, RenderConfig};

/// Get the default taskdeck data directory: ~/.taskdeck
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".taskdeck"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.taskdeck/config.toml (highest)
    let data_dir = get_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./taskdeck.toml (current directory)
    let local_config = Path::new("taskdeck.toml");

    let cfg = if user_config.exists() {
        load_from(&user_config)?
    } else if local_config.exists() {
        load_from(local_config)?
    } else {
        AppConfig::default()
    };

    finish(cfg, &data_dir)
}

/// Loads an explicit file, then applies the same defaults and overrides as
/// [`load_default`].
pub fn load_path(path: &Path) -> anyhow::Result<AppConfig> {
    let cfg = load_from(path)?;
    finish(cfg, &get_data_dir()?)
}

fn load_from(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("read {}: {e}", path.display()))?;
    Ok(toml::from_str::<AppConfig>(&s)?)
}

fn finish(mut cfg: AppConfig, data_dir: &Path) -> anyhow::Result<AppConfig> {
    // Update logging directory to use data directory if not set
    if cfg
        .logging
        .directory
        .as_deref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        let logs_dir = data_dir.join("logs");
        cfg.logging.directory = Some(logs_dir.to_string_lossy().to_string());
    }

    apply_env_overrides(&mut cfg.render, |key| std::env::var(key).ok());
    Ok(cfg)
}

/// Environment variable overrides (Priority 0: highest).
pub fn apply_env_overrides<F>(render: &mut RenderConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    let flag = |key: &str| var(key).map(|v| truthy(&v));

    if let Some(v) = flag("TASKDECK_SIMPLE_PROGRESS") {
        render.simple_progress = v;
    }
    if let Some(v) = flag("TASKDECK_VERBOSE") {
        render.verbose = v;
    }
    if let Some(v) = flag("TASKDECK_DEBUG") {
        render.debug = v;
    }
    if var("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        render.color = false;
    }
    if var("CI").is_some_and(|v| truthy(&v)) {
        render.simple_progress = true;
    }
}

fn truthy(v: &str) -> bool {
    let v = v.trim();
    !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
}
