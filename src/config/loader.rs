// Configuration loader
// Reads ~/.specforge/config.toml when present, then applies environment overrides

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::{CONFIG_RELATIVE_PATH, MODEL_ENV_VAR};
use super::settings::Config;

/// Load the user configuration, falling back to defaults when no file exists.
pub fn load_config() -> Result<Config> {
    let config = match default_config_path() {
        Some(path) if path.exists() => load_config_from(&path)?,
        _ => {
            tracing::debug!("No config file found, using defaults");
            Config::default()
        }
    };
    Ok(apply_model_override(config, std::env::var(MODEL_ENV_VAR).ok()))
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_RELATIVE_PATH))
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    tracing::info!(path = %path.display(), model = %config.model, "Loaded configuration");
    Ok(config)
}

/// Environment wins over the file; blank values are ignored.
pub fn apply_model_override(mut config: Config, model: Option<String>) -> Config {
    if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
        config.model = model.trim().to_string();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
model = "claude-3-5-sonnet"

[refinement]
max_iterations = 3

[models]
"in-house" = 16000
"#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.model, "claude-3-5-sonnet");
        assert_eq!(config.refinement.max_iterations, 3);
        assert_eq!(config.refinement.confidence_threshold, 70);
        assert_eq!(config.refinement.invocation_timeout_secs, 300);
        assert_eq!(config.models.get("in-house"), Some(&16_000));
        assert!((config.budget.reserve_ratio - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "model = [").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn test_model_override() {
        let config = apply_model_override(Config::default(), Some("gpt-4-turbo".into()));
        assert_eq!(config.model, "gpt-4-turbo");
        let config = apply_model_override(config, Some("  ".into()));
        assert_eq!(config.model, "gpt-4-turbo");
    }
}
