//! Configuration types for Apiscribe

use serde::{Deserialize, Serialize};

use crate::browser::LaunchOptions;
use crate::script::GeneratorOptions;
use crate::{ApiscribeError, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Saved application URL to open when a session starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    /// Saved API base URL prefix to capture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// Log filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Browser launch settings
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Generated script settings
    #[serde(default)]
    pub output: OutputConfig,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_url: None,
            api_base_url: None,
            log_level: default_log_level(),
            browser: BrowserConfig::default(),
            output: OutputConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

/// Browser launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run without a visible window
    #[serde(default)]
    pub headless: bool,
    /// Extra command-line arguments for the browser process
    #[serde(default = "default_browser_args")]
    pub args: Vec<String>,
}

fn default_browser_args() -> Vec<String> {
    vec!["--start-maximized".to_string()]
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            args: default_browser_args(),
        }
    }
}

impl BrowserConfig {
    /// Launch options handed to the browser capability
    #[must_use]
    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            headless: self.headless,
            args: self.args.clone(),
        }
    }
}

/// Generated script configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File name suggested to the destination prompt
    #[serde(default = "default_file_name")]
    pub default_file_name: String,
    /// Prefix of every generated test name
    #[serde(default = "default_test_name_prefix")]
    pub test_name_prefix: String,
    /// Emit the `@playwright/test` import line
    #[serde(default)]
    pub preamble: bool,
}

fn default_file_name() -> String {
    "api-tests.spec.js".to_string()
}

fn default_test_name_prefix() -> String {
    "API Test Case".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_file_name: default_file_name(),
            test_name_prefix: default_test_name_prefix(),
            preamble: false,
        }
    }
}

impl OutputConfig {
    /// Options for the script generator
    #[must_use]
    pub fn generator_options(&self) -> GeneratorOptions {
        GeneratorOptions {
            test_name_prefix: self.test_name_prefix.clone(),
            preamble: self.preamble,
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// How long `stop` waits for in-flight response bodies
    pub drain_timeout_ms: u64,
    /// Largest response body kept as text
    pub max_body_bytes: usize,
    /// Capacity of the page event channel
    pub event_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 2000,
            max_body_bytes: 16 * 1024 * 1024, // 16 MB
            event_buffer: 1024,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ApiscribeError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ApiscribeError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        // Saved targets may be absent, but never blank
        if self.site_url.as_deref().is_some_and(|url| url.trim().is_empty()) {
            return Err(ApiscribeError::ConfigError(
                "site_url cannot be blank".to_string(),
            ));
        }

        if self
            .api_base_url
            .as_deref()
            .is_some_and(|url| url.trim().is_empty())
        {
            return Err(ApiscribeError::ConfigError(
                "api_base_url cannot be blank".to_string(),
            ));
        }

        if self.output.default_file_name.trim().is_empty() {
            return Err(ApiscribeError::ConfigError(
                "output.default_file_name cannot be empty".to_string(),
            ));
        }

        if self.output.test_name_prefix.trim().is_empty() {
            return Err(ApiscribeError::ConfigError(
                "output.test_name_prefix cannot be empty".to_string(),
            ));
        }

        if self.limits.max_body_bytes == 0 {
            return Err(ApiscribeError::ConfigError(
                "limits.max_body_bytes must be > 0".to_string(),
            ));
        }

        if self.limits.event_buffer == 0 {
            return Err(ApiscribeError::ConfigError(
                "limits.event_buffer must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            site_url = "https://app.example.com"
            api_base_url = "https://api.example.com"

            [browser]
            headless = true

            [output]
            test_name_prefix = "Checkout"
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert_eq!(config.site_url.as_deref(), Some("https://app.example.com"));
        assert_eq!(config.api_base_url.as_deref(), Some("https://api.example.com"));
        assert!(config.browser.headless);
        assert_eq!(config.browser.args, vec!["--start-maximized"]);
        assert_eq!(config.output.test_name_prefix, "Checkout");
        assert_eq!(config.output.default_file_name, "api-tests.spec.js");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.site_url.is_none());
        assert!(config.api_base_url.is_none());
        assert!(!config.browser.headless);
        assert_eq!(config.limits.drain_timeout_ms, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config_toml = r#"
            api_base_url = "https://api.example.com/v1"

            [limits]
            drain_timeout_ms = 500
            max_body_bytes = 1024
            event_buffer = 16
        "#;
        file.write_all(config_toml.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.limits.drain_timeout_ms, 500);
        assert_eq!(config.limits.max_body_bytes, 1024);
    }

    #[test]
    fn test_invalid_config_blank_target() {
        let config_toml = r#"
            site_url = "   "
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_config_zero_limits() {
        let mut config = Config::default();
        config.limits.event_buffer = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_renders_as_toml() {
        let rendered = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(!rendered.contains("site_url"));

        let parsed: Config = toml::from_str(&rendered).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.output.default_file_name, "api-tests.spec.js");
        assert_eq!(parsed.browser.args, vec!["--start-maximized".to_string()]);
    }
}
