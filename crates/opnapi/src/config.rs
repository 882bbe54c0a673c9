//! Connection settings for the appliance API
//!
//! Read from `~/.config/opnrecon/config.toml`:
//!
//! ```toml
//! firewall = "192.0.2.1"
//! port = 443
//! api_credential_file = "~/.config/opnrecon/apikey.txt"
//! ssl_verify = true
//! timeout_secs = 20
//! api_retries = 0
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Config("could not determine home directory".to_string()))?;
    Ok(home.join(".config").join("opnrecon"))
}

/// Default location of the connection config
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// How to reach and authenticate against one appliance
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Hostname or IP address of the firewall
    pub firewall: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// File holding `key=...` and `secret=...` lines, as exported by the appliance
    pub api_credential_file: Option<String>,
    pub ssl_verify: bool,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
    /// Additional attempts for calls failing with network errors
    pub api_retries: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            firewall: String::new(),
            port: 443,
            api_key: None,
            api_secret: None,
            api_credential_file: None,
            ssl_verify: true,
            timeout_secs: 20,
            api_retries: 0,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("firewall", &self.firewall)
            .field("port", &self.port)
            .field("api_key", &self.api_key)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .field("api_credential_file", &self.api_credential_file)
            .field("ssl_verify", &self.ssl_verify)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_retries", &self.api_retries)
            .finish()
    }
}

/// API key and secret used for HTTP basic auth
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl ConnectionConfig {
    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        toml::from_str(&content).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load the default config file, or defaults when it does not exist
    pub fn load_default() -> Result<Self> {
        let path = default_config_path()?;
        if path.exists() {
            log::debug!("Loading connection config from {}", path.display());
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Base URL of the API: `https://{firewall}:{port}/api`
    pub fn base_url(&self) -> String {
        let host = if self.firewall.contains(':') && !self.firewall.starts_with('[') {
            format!("[{}]", self.firewall)
        } else {
            self.firewall.clone()
        };
        format!("https://{}:{}/api", host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check the settings can produce a working client
    pub fn validate(&self) -> Result<()> {
        if self.firewall.trim().is_empty() {
            return Err(Error::Config(
                "no firewall configured (set 'firewall' or OPN_FIREWALL)".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(Error::Config("port must be between 1 and 65535".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Resolve credentials from inline values or the credential file
    ///
    /// Inline values take precedence over the file.
    pub fn credentials(&self) -> Result<Credentials> {
        if let (Some(key), Some(secret)) = (&self.api_key, &self.api_secret) {
            return Ok(Credentials {
                key: key.clone(),
                secret: secret.clone(),
            });
        }

        let Some(file) = &self.api_credential_file else {
            return Err(Error::MissingCredentials(
                "neither api_key/api_secret nor api_credential_file is set".to_string(),
            ));
        };

        let path = expand_path(file);
        let content = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        parse_credential_file(&content).ok_or_else(|| {
            Error::MissingCredentials(format!(
                "{} must contain 'key=' and 'secret=' lines",
                path.display()
            ))
        })
    }
}

fn parse_credential_file(content: &str) -> Option<Credentials> {
    let mut key = None;
    let mut secret = None;
    for line in content.lines() {
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        match name.trim() {
            "key" => key = Some(value.trim().to_string()),
            "secret" => secret = Some(value.trim().to_string()),
            _ => {}
        }
    }
    Some(Credentials {
        key: key.filter(|k| !k.is_empty())?,
        secret: secret.filter(|s| !s.is_empty())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config: ConnectionConfig = toml::from_str("firewall = \"192.0.2.1\"").unwrap();
        assert_eq!(config.port, 443);
        assert!(config.ssl_verify);
        assert_eq!(config.timeout(), Duration::from_secs(20));
        assert_eq!(config.api_retries, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_base_url() {
        let mut config = ConnectionConfig {
            firewall: "fw.example.net".to_string(),
            port: 8443,
            ..Default::default()
        };
        assert_eq!(config.base_url(), "https://fw.example.net:8443/api");

        config.firewall = "2001:db8::1".to_string();
        assert_eq!(config.base_url(), "https://[2001:db8::1]:8443/api");
    }

    #[test]
    fn test_validate_requires_firewall() {
        let err = ConnectionConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("firewall"));
    }

    #[test]
    fn test_inline_credentials_win() {
        let config = ConnectionConfig {
            api_key: Some("k".to_string()),
            api_secret: Some("s".to_string()),
            api_credential_file: Some("/does/not/exist".to_string()),
            ..Default::default()
        };
        let creds = config.credentials().unwrap();
        assert_eq!(creds.key, "k");
        assert_eq!(creds.secret, "s");
    }

    #[test]
    fn test_credential_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "key=AbC123").unwrap();
        writeln!(file, "secret=s3cr3t/with=equals").unwrap();

        let config = ConnectionConfig {
            api_credential_file: Some(file.path().to_string_lossy().into_owned()),
            ..Default::default()
        };
        let creds = config.credentials().unwrap();
        assert_eq!(creds.key, "AbC123");
        assert_eq!(creds.secret, "s3cr3t/with=equals");
    }

    #[test]
    fn test_incomplete_credential_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "key=only").unwrap();

        let config = ConnectionConfig {
            api_credential_file: Some(file.path().to_string_lossy().into_owned()),
            ..Default::default()
        };
        let err = config.credentials().unwrap_err();
        assert!(matches!(err, Error::MissingCredentials(_)));
    }

    #[test]
    fn test_missing_credentials() {
        let err = ConnectionConfig::default().credentials().unwrap_err();
        assert!(matches!(err, Error::MissingCredentials(_)));
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "firewall = \"192.0.2.1\"\nssl_verify = false\ntimeout_secs = 60\napi_retries = 2"
        )
        .unwrap();

        let config = ConnectionConfig::load(file.path()).unwrap();
        assert_eq!(config.firewall, "192.0.2.1");
        assert!(!config.ssl_verify);
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.api_retries, 2);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();
        let err = ConnectionConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ConnectionConfig {
            api_secret: Some("hunter2".to_string()),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
        let creds = Credentials {
            key: "k".to_string(),
            secret: "hunter2".to_string(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
