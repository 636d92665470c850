//! Daemon configuration.
//!
//! Loaded from a TOML file with serde defaults for every field, then
//! overridden by the `SONAR_HOST_URL` / `SONAR_TOKEN` environment
//! variables that the scan tooling conventionally uses. A missing file
//! yields the defaults; an unreadable or invalid file is an error so
//! misconfiguration is not silently ignored.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::buildsys::PrerequisiteConfig;

/// Top-level configuration for the scan runner daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SsrConfig {
    pub server: ServerConfig,
    pub sonar: SonarConfig,
    pub tools: ToolsConfig,
    pub prerequisites: PrerequisiteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub host: String,
    /// Listen port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SonarConfig {
    /// Analysis server the scanner reports results to.
    pub host_url: String,
    /// Authentication token passed as `-Dsonar.login`; empty disables it.
    pub token: String,
    /// Directory under which per-scan working directories are created.
    pub workspace_dir: PathBuf,
}

impl Default for SonarConfig {
    fn default() -> Self {
        Self {
            host_url: "http://localhost:9000".to_string(),
            token: String::new(),
            workspace_dir: env::temp_dir().join("ssr-workspaces"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Version-control client used for the clone stage.
    pub git: String,
    /// Instrumented-build wrapper that records compilation traces.
    pub build_wrapper: String,
    /// Analysis scanner executable.
    pub scanner: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            build_wrapper: "build-wrapper-linux-x86-64".to_string(),
            scanner: "sonar-scanner".to_string(),
        }
    }
}

impl SsrConfig {
    /// Default config file location (`<user config dir>/ssr/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ssr").join("config.toml"))
    }

    /// Parse a TOML document; missing keys fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Load from `path` (or the default location) and apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = path.map(Path::to_path_buf).or_else(Self::default_path);

        let mut config = match resolved {
            Some(file) if file.is_file() => {
                let raw = fs::read_to_string(&file)
                    .with_context(|| format!("reading config file {}", file.display()))?;
                let parsed = Self::from_toml_str(&raw)
                    .with_context(|| format!("parsing config file {}", file.display()))?;
                info!("Loaded configuration from {}", file.display());
                parsed
            }
            _ => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment wins over file values for the analysis server contract.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| env::var(name).ok());
    }

    fn apply_overrides_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(url) = get("SONAR_HOST_URL") {
            self.sonar.host_url = url;
        }
        if let Some(token) = get("SONAR_TOKEN") {
            self.sonar.token = token;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = SsrConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sonar.host_url, "http://localhost:9000");
        assert!(config.sonar.token.is_empty());
        assert_eq!(config.tools.git, "git");
        assert_eq!(config.tools.scanner, "sonar-scanner");
    }

    #[test]
    fn partial_toml_keeps_defaults_elsewhere() {
        let raw = r#"
            [server]
            port = 9090

            [sonar]
            host_url = "https://sonar.internal:9000"

            [prerequisites]
            global = ["export JAVA_HOME=/opt/jdk"]
            maven = ["mvn -v"]
        "#;
        let config = SsrConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.sonar.host_url, "https://sonar.internal:9000");
        assert_eq!(config.tools.build_wrapper, "build-wrapper-linux-x86-64");
        assert_eq!(config.prerequisites.global, vec!["export JAVA_HOME=/opt/jdk"]);
        assert_eq!(config.prerequisites.maven, vec!["mvn -v"]);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(SsrConfig::from_toml_str("[server\nport = ]").is_err());
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut config = SsrConfig::from_toml_str(
            r#"
            [sonar]
            host_url = "http://from-file:9000"
            token = "file-token"
            "#,
        )
        .unwrap();

        config.apply_overrides_from(|name| match name {
            "SONAR_HOST_URL" => Some("http://from-env:9000".to_string()),
            "SONAR_TOKEN" => Some("env-token".to_string()),
            _ => None,
        });

        assert_eq!(config.sonar.host_url, "http://from-env:9000");
        assert_eq!(config.sonar.token, "env-token");
    }

    #[test]
    fn absent_env_leaves_file_values() {
        let mut config = SsrConfig::from_toml_str(
            r#"
            [sonar]
            host_url = "http://from-file:9000"
            "#,
        )
        .unwrap();

        config.apply_overrides_from(|_| None);
        assert_eq!(config.sonar.host_url, "http://from-file:9000");
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SsrConfig::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn load_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "[server]\nport = 7070\n").unwrap();
        let config = SsrConfig::load(Some(&file)).unwrap();
        assert_eq!(config.server.port, 7070);
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "not toml at all [").unwrap();
        assert!(SsrConfig::load(Some(&file)).is_err());
    }
}
