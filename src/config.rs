use std::path::Path;

use serde::Deserialize;
use tracing::warn;

/// Name of the optional configuration file at the project root.
pub const CONFIG_FILE: &str = "devdash.toml";

/// Patterns of files whose changes trigger a recheck.
const DEFAULT_INCLUDE: &[&str] = &[
    "*.py", "*.yml", "*.ini", "*.toml", "*.cfg", "*.json", ".flake8",
];

/// Patterns never worth a recheck (editor droppings, bytecode, notebook
/// checkpoints, packaging metadata).
const DEFAULT_IGNORE: &[&str] = &[
    "**/.ipynb_checkpoints/*",
    ".~*",
    "__pycache__",
    "*.pyc",
    "*.pyd",
    "*.egg-info",
];

const DEFAULT_DEBOUNCE_MS: u64 = 75;

/// Configuration loaded from `devdash.toml` at the project root.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DevdashConfig {
    /// Glob patterns of files to watch. Replaces the built-in list when set.
    pub include: Option<Vec<String>>,
    /// Extra glob patterns to ignore, on top of the built-in list and `.gitignore`.
    pub ignore: Option<Vec<String>>,
    /// Window used to coalesce a burst of filesystem events into one recheck.
    pub debounce_ms: Option<u64>,
    pub flake8: CheckConfig,
    pub mypy: CheckConfig,
    pub pytest: CheckConfig,
}

/// Per-check overrides.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CheckConfig {
    /// Set to `false` to drop the check from the dashboard.
    pub enabled: Option<bool>,
    /// Argument vector replacing the default command.
    pub command: Option<Vec<String>>,
}

impl CheckConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

impl DevdashConfig {
    /// Load configuration from `devdash.toml` in the given root directory.
    ///
    /// Returns a default configuration if the file does not exist or cannot be parsed.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!("failed to parse {CONFIG_FILE}: {err}. Using defaults.");
                    Self::default()
                }
            },
            Err(err) => {
                warn!("failed to read {CONFIG_FILE}: {err}. Using defaults.");
                Self::default()
            }
        }
    }

    pub fn include_patterns(&self) -> Vec<String> {
        match &self.include {
            Some(patterns) => patterns.clone(),
            None => DEFAULT_INCLUDE.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn ignore_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect();
        if let Some(extra) = &self.ignore {
            patterns.extend(extra.iter().cloned());
        }
        patterns
    }

    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DevdashConfig::load(dir.path());
        assert_eq!(config.debounce_ms(), DEFAULT_DEBOUNCE_MS);
        assert!(config.include_patterns().contains(&"*.py".to_string()));
        assert!(config.pytest.is_enabled());
    }

    #[test]
    fn test_overrides_are_read() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
ignore = ["build/*"]
debounce_ms = 10

[mypy]
enabled = false

[flake8]
command = ["ruff", "check", "--output-format=concise"]
"#,
        )
        .unwrap();

        let config = DevdashConfig::load(dir.path());
        assert_eq!(config.debounce_ms(), 10);
        assert!(!config.mypy.is_enabled());
        assert_eq!(
            config.flake8.command.as_deref(),
            Some(&["ruff".to_string(), "check".into(), "--output-format=concise".into()][..])
        );
        let ignore = config.ignore_patterns();
        assert!(ignore.contains(&"build/*".to_string()));
        assert!(ignore.contains(&"*.pyc".to_string()));
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "debounce_ms = \"soon\"").unwrap();
        let config = DevdashConfig::load(dir.path());
        assert_eq!(config.debounce_ms(), DEFAULT_DEBOUNCE_MS);
    }
}
