//! Bridge Configuration
//!
//! Handles parsing of soratun.toml, which tells the bridge where the native
//! module lives and how to treat its responses. The Arc credential file is
//! separate and passed to the module untouched.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::ffi::{resolve, Platform, SORATUN_MODULE};
use crate::soratun::{ErrorConvention, UdpOptions};

/// File name searched for by [`BridgeConfig::find_and_load`].
pub const CONFIG_FILE_NAME: &str = "soratun.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching soratun.toml.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct BridgeConfig {
    /// Native module location
    #[serde(default)]
    pub library: LibraryConfig,

    /// Defaults for the UDP entry point
    #[serde(default)]
    pub udp: UdpConfig,

    /// Response interpretation
    #[serde(default)]
    pub response: ResponseConfig,
}

impl BridgeConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the current directory or parents.
    pub fn load_from_cwd() -> ConfigResult<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                tracing::debug!(path = %config_path.display(), "using bridge config");
                return Self::load(&config_path);
            }
            if !dir.pop() {
                // Reached root without finding config
                return Ok(Self::default());
            }
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.library.name.is_empty() {
            return Err(ConfigError::Invalid("library.name is empty".to_string()));
        }
        if let Some(platform) = &self.library.platform {
            if Platform::from_id(platform).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "unknown library.platform '{}'",
                    platform
                )));
            }
        }
        if self.udp.port.is_some() || self.udp.timeout_ms.is_some() {
            self.udp_options()?;
        }
        Ok(())
    }

    /// Path of the native module: the explicit path if set, otherwise
    /// the resolved name under the configured directory.
    pub fn module_path(&self) -> PathBuf {
        if let Some(path) = &self.library.path {
            return path.clone();
        }
        let platform = self
            .library
            .platform
            .as_deref()
            .and_then(Platform::from_id)
            .unwrap_or_else(Platform::current);
        resolve(platform, &self.library.name, self.library.dir.as_deref())
    }

    /// Explicit UDP port/timeout, if both are configured.
    ///
    /// `None` means the three-argument `SendUDP` with the module's defaults.
    pub fn udp_options(&self) -> ConfigResult<Option<UdpOptions>> {
        match (self.udp.port, self.udp.timeout_ms) {
            (None, None) => Ok(None),
            (Some(port), Some(timeout_ms)) => {
                UdpOptions::new(port, Duration::from_millis(timeout_ms))
                    .map(Some)
                    .map_err(|e| ConfigError::Invalid(e.to_string()))
            }
            _ => Err(ConfigError::Invalid(
                "udp.port and udp.timeout_ms must be set together".to_string(),
            )),
        }
    }

    /// How to read error reports out of response text
    pub fn error_convention(&self) -> ErrorConvention {
        match &self.response.error_prefix {
            Some(prefix) if !prefix.is_empty() => ErrorConvention::Prefix(prefix.clone()),
            _ => ErrorConvention::Opaque,
        }
    }
}

/// Native module location.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LibraryConfig {
    /// Logical module name
    #[serde(default = "default_library_name")]
    pub name: String,

    /// Directory holding the module (defaults to lib/shared)
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Explicit module path, bypassing resolution
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Platform identifier to resolve for (defaults to the host)
    #[serde(default)]
    pub platform: Option<String>,

    /// Exported `void (*)(char*)` that frees returned strings, if any
    #[serde(default)]
    pub free_symbol: Option<String>,
}

fn default_library_name() -> String {
    SORATUN_MODULE.to_string()
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            name: default_library_name(),
            dir: None,
            path: None,
            platform: None,
            free_symbol: None,
        }
    }
}

/// UDP defaults.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct UdpConfig {
    /// Destination port on the unified endpoint
    #[serde(default)]
    pub port: Option<u16>,

    /// Response timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Response interpretation.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ResponseConfig {
    /// Prefix marking a response as an error report
    #[serde(default)]
    pub error_prefix: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.library.name, "libsoratun");
        assert_eq!(config.error_convention(), ErrorConvention::Opaque);
        assert!(config.udp_options().unwrap().is_none());
        assert_eq!(
            config.module_path(),
            resolve(Platform::current(), "libsoratun", None)
        );
    }

    #[test]
    fn test_parse_full_config() {
        let config = BridgeConfig::parse(
            r#"
            [library]
            dir = "/opt/soratun"
            platform = "macos"
            free_symbol = "FreeString"

            [udp]
            port = 23080
            timeout_ms = 5000

            [response]
            error_prefix = "error:"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.module_path(),
            PathBuf::from("/opt/soratun/libsoratun.dylib")
        );
        assert_eq!(config.library.free_symbol.as_deref(), Some("FreeString"));
        let options = config.udp_options().unwrap().unwrap();
        assert_eq!(options.port(), 23080);
        assert_eq!(options.timeout(), Duration::from_millis(5000));
        assert_eq!(
            config.error_convention(),
            ErrorConvention::Prefix("error:".to_string())
        );
    }

    #[test]
    fn test_explicit_path_wins() {
        let config = BridgeConfig::parse(
            r#"
            [library]
            dir = "/opt/soratun"
            path = "/tmp/custom/libsoratun.so"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.module_path(),
            PathBuf::from("/tmp/custom/libsoratun.so")
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            BridgeConfig::parse("[udp]\nport = 23080\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BridgeConfig::parse("[udp]\nport = 0\ntimeout_ms = 10\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BridgeConfig::parse("[library]\nplatform = \"plan9\"\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BridgeConfig::parse("[library\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_find_and_load_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[response]\nerror_prefix = \"ERR \"\n",
        )
        .unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = BridgeConfig::find_and_load(&nested).unwrap();
        assert_eq!(config.response.error_prefix.as_deref(), Some("ERR "));
    }
}
