//! Configuration loading using Figment
//!
//! Configuration is layered from:
//! 1. `config/daq_param.toml` (or any file given to [`AppConfig::load_from`])
//! 2. Environment variables prefixed with `DAQ_PARAM_`, nested keys separated
//!    by a double underscore (`DAQ_PARAM_SESSION__TIMEOUT_MS=2000`)
//!
//! Every field has a default, so a missing file yields a usable configuration.
//!
//! # Example
//! ```no_run
//! use daq_param::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Resource: {}", config.session.resource);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ParamResult;
use crate::logging::OutputFormat;
use crate::session::{Backend, SessionConfig};

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/daq_param.toml";

/// Prefix of overriding environment variables.
pub const ENV_PREFIX: &str = "DAQ_PARAM_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Instrument connection settings
    pub session: SessionSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Settings used to open a [`crate::session::Session`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// VISA-style resource identifier
    pub resource: String,
    /// Backend selector ("" for real hardware, "@sim", "path.yaml@sim")
    pub backend: String,
    /// Read timeout in milliseconds; unset selects the session default
    pub timeout_ms: Option<u64>,
    pub read_termination: String,
    pub write_termination: String,
    pub device_clear: bool,
    pub baud_rate: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            resource: "ASRL1::INSTR".to_string(),
            backend: String::new(),
            timeout_ms: None,
            read_termination: session.read_termination,
            write_termination: session.write_termination,
            device_clear: session.device_clear,
            baud_rate: session.baud_rate,
        }
    }
}

impl SessionSettings {
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            timeout: self.timeout_ms.map(Duration::from_millis),
            read_termination: self.read_termination.clone(),
            write_termination: self.write_termination.clone(),
            device_clear: self.device_clear,
            baud_rate: self.baud_rate,
        }
    }

    pub fn backend(&self) -> ParamResult<Backend> {
        Backend::parse(&self.backend)
    }
}

impl AppConfig {
    /// Load configuration from [`DEFAULT_CONFIG_PATH`] and environment variables
    pub fn load() -> ParamResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> ParamResult<Self> {
        Self::load_layered(path.as_ref(), ENV_PREFIX)
    }

    fn load_layered(path: &Path, env_prefix: &str) -> ParamResult<Self> {
        let config = Self::figment(path)
            .merge(Env::prefixed(env_prefix).split("__"))
            .extract()?;
        Ok(config)
    }

    /// The file layer alone, without environment overrides.
    pub fn figment(path: &Path) -> Figment {
        Figment::new().merge(Toml::file(path))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        self.application.log_format.parse::<OutputFormat>()?;

        if self.session.resource.trim().is_empty() {
            return Err("session.resource must not be empty".to_string());
        }

        self.session.backend().map_err(|e| e.to_string())?;

        if self.session.timeout_ms == Some(0) {
            return Err("session.timeout_ms must be positive".to_string());
        }

        if self.session.baud_rate == 0 {
            return Err("session.baud_rate must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = AppConfig::load_layered(
            Path::new("does/not/exist.toml"),
            "DAQ_PARAM_TEST_UNUSED_",
        )
        .unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
[application]
log_level = "debug"
log_format = "json"

[session]
resource = "TCPIP0::10.0.0.5::5025::SOCKET"
timeout_ms = 1500
read_termination = "\r\n"
device_clear = false
"#,
        );
        let config = AppConfig::load_layered(file.path(), "DAQ_PARAM_TEST_UNUSED_").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.session.resource, "TCPIP0::10.0.0.5::5025::SOCKET");

        let session = config.session.to_session_config();
        assert_eq!(session.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(session.read_termination, "\r\n");
        assert_eq!(session.write_termination, "\n");
        assert!(!session.device_clear);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_config("[session]\nresource = \"ASRL3::INSTR\"\n");
        std::env::set_var("DAQ_PARAM_TEST_ENV_SESSION__BACKEND", "@sim");
        std::env::set_var("DAQ_PARAM_TEST_ENV_SESSION__TIMEOUT_MS", "250");
        let config = AppConfig::load_layered(file.path(), "DAQ_PARAM_TEST_ENV_").unwrap();
        std::env::remove_var("DAQ_PARAM_TEST_ENV_SESSION__BACKEND");
        std::env::remove_var("DAQ_PARAM_TEST_ENV_SESSION__TIMEOUT_MS");

        assert_eq!(config.session.resource, "ASRL3::INSTR");
        assert_eq!(config.session.backend().unwrap(), Backend::Simulated(None));
        assert_eq!(config.session.timeout_ms, Some(250));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = AppConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.application.log_format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.session.backend = "@nonsense".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.session.timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let file = write_config("[session\nresource = ");
        let err = AppConfig::load_layered(file.path(), "DAQ_PARAM_TEST_UNUSED_").unwrap_err();
        assert!(matches!(err, crate::error::ParamError::Config(_)));
    }
}
