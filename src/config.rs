//! Connection settings and desired-state files
//!
//! A desired-state file maps canonical field names to values. Run options
//! can sit next to the fields in a `[run]` table:
//!
//! ```toml
//! enabled = true
//! host = "203.0.113.5"
//! port = 8080
//!
//! [run]
//! reload = true
//! ```

use anyhow::{Context, Result, bail};
use declarative::Presence;
use opnapi::ConnectionConfig;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::cli::ConnectionArgs;

/// Load the connection config and apply command-line overrides
pub fn connection(args: &ConnectionArgs) -> Result<ConnectionConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let path = opnapi::expand_path(&path.to_string_lossy());
            ConnectionConfig::load(&path)?
        }
        None => ConnectionConfig::load_default()?,
    };

    if let Some(firewall) = &args.firewall {
        config.firewall.clone_from(firewall);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(key) = &args.api_key {
        config.api_key = Some(key.clone());
    }
    if let Some(secret) = &args.api_secret {
        config.api_secret = Some(secret.clone());
    }
    if let Some(file) = &args.api_credential_file {
        config.api_credential_file = Some(file.clone());
    }
    if args.insecure {
        config.ssl_verify = false;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    if let Some(retries) = args.retries {
        config.api_retries = retries;
    }

    log::debug!("Connection: {config:?}");
    Ok(config)
}

/// Run options given in a desired-state file
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    pub state: Option<Presence>,
    pub reload: Option<bool>,
}

/// Parsed desired-state file
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredFile {
    pub fields: Map<String, Value>,
    pub run: RunSection,
}

impl DesiredFile {
    /// Load a TOML or JSON file, chosen by extension (TOML when unknown)
    pub fn load(path: &Path) -> Result<Self> {
        let path = opnapi::expand_path(&path.to_string_lossy());
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let value: Value = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?
        };

        Self::from_value(value).with_context(|| format!("Invalid desired state in {}", path.display()))
    }

    fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            bail!("expected a table of field names to values");
        };
        let run = match fields.remove("run") {
            Some(run) => serde_json::from_value(run).context("Invalid [run] table")?,
            None => RunSection::default(),
        };
        Ok(Self { fields, run })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;
    use tempfile::Builder;

    fn write(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn test_load_toml_with_run_table() {
        let file = write(
            ".toml",
            "enabled = true\nhost = \"203.0.113.5\"\nport = 8080\n\n[run]\nreload = true\n",
        );
        let desired = DesiredFile::load(file.path()).unwrap();

        assert_eq!(desired.fields["host"], json!("203.0.113.5"));
        assert_eq!(desired.fields["port"], json!(8080));
        assert!(!desired.fields.contains_key("run"));
        assert_eq!(desired.run.reload, Some(true));
        assert_eq!(desired.run.state, None);
    }

    #[test]
    fn test_load_json() {
        let file = write(
            ".json",
            r#"{"name": "site-a", "pub": "PUB", "run": {"state": "absent"}}"#,
        );
        let desired = DesiredFile::load(file.path()).unwrap();

        assert_eq!(desired.fields.len(), 2);
        assert_eq!(desired.run.state, Some(Presence::Absent));
    }

    #[test]
    fn test_unknown_run_option_rejected() {
        let file = write(".toml", "[run]\nforce = true\n");
        let err = DesiredFile::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("[run]"));
    }

    #[test]
    fn test_non_table_rejected() {
        let file = write(".json", "[1, 2, 3]");
        assert!(DesiredFile::load(file.path()).is_err());
    }

    #[test]
    fn test_connection_overrides() {
        let config_file = write(".toml", "firewall = \"192.0.2.1\"\ntimeout_secs = 30\n");
        let args = ConnectionArgs {
            config: Some(config_file.path().to_path_buf()),
            port: Some(8443),
            insecure: true,
            retries: Some(2),
            ..Default::default()
        };
        let config = connection(&args).unwrap();

        assert_eq!(config.firewall, "192.0.2.1");
        assert_eq!(config.port, 8443);
        assert!(!config.ssl_verify);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.api_retries, 2);
    }
}
