//! Resource adapters - the OPNsense resources opnrecon can manage
//!
//! Each adapter is a [`ResourceSchema`] plus the caller-facing conveniences
//! the engine does not care about: field aliases accepted in desired-state
//! files and default values filled in before validation.

pub mod ipsec_cert;
pub mod webproxy_parent;

use anyhow::{Context, Result, bail};
use declarative::{DesiredState, ResourceSchema};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A manageable resource type
#[derive(Debug, Clone)]
pub struct Adapter {
    pub schema: Arc<ResourceSchema>,
    /// One-line description shown by `opnrecon resources`
    pub summary: &'static str,
    /// Alternative field names accepted in desired-state files
    pub aliases: &'static [(&'static str, &'static str)],
    /// Values used when a desired-state file omits the field
    pub defaults: Vec<(&'static str, Value)>,
}

impl Adapter {
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Turn a desired-state mapping into typed state
    ///
    /// Aliases are resolved to canonical names and defaults filled in first.
    /// Defaults are skipped when removing an item, which only needs its key.
    pub fn desired_state(
        &self,
        fields: &Map<String, Value>,
        fill_defaults: bool,
    ) -> Result<DesiredState> {
        let mut resolved = Map::new();
        for (name, value) in fields {
            let canonical = self
                .aliases
                .iter()
                .find(|(alias, _)| alias == name)
                .map_or(name.as_str(), |(_, canonical)| canonical);
            if resolved.insert(canonical.to_string(), value.clone()).is_some() {
                bail!("field '{canonical}' is given more than once (via an alias)");
            }
        }

        if fill_defaults {
            for (name, value) in &self.defaults {
                resolved
                    .entry((*name).to_string())
                    .or_insert_with(|| value.clone());
            }
        }

        DesiredState::from_json(&Value::Object(resolved), &self.schema)
            .with_context(|| format!("Invalid desired state for {}", self.name()))
    }
}

/// All available adapters, sorted by name
pub fn all() -> Result<Vec<Adapter>> {
    Ok(vec![ipsec_cert::adapter()?, webproxy_parent::adapter()?])
}

/// Look up an adapter by name
pub fn find(name: &str) -> Result<Adapter> {
    let adapters = all()?;
    let names: Vec<String> = adapters.iter().map(|a| a.name().to_string()).collect();
    adapters
        .into_iter()
        .find(|a| a.name() == name)
        .with_context(|| format!("Unknown resource '{name}' (available: {})", names.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::FieldValue;
    use serde_json::json;

    #[test]
    fn test_all_schemas_build() {
        let adapters = all().unwrap();
        assert_eq!(adapters.len(), 2);
        let mut names: Vec<&str> = adapters.iter().map(Adapter::name).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["ipsec_cert", "webproxy_parent"]);
    }

    #[test]
    fn test_find_unknown_lists_available() {
        let err = find("nope").unwrap_err().to_string();
        assert!(err.contains("webproxy_parent"));
    }

    #[test]
    fn test_aliases_and_defaults() {
        let adapter = find("ipsec_cert").unwrap();
        let fields = json!({"name": "site-a", "pub": "PUBLIC", "priv_key": "PRIVATE"});
        let desired = adapter
            .desired_state(fields.as_object().unwrap(), true)
            .unwrap();

        assert_eq!(desired.get("public_key"), Some(&FieldValue::from("PUBLIC")));
        assert_eq!(desired.get("private_key"), Some(&FieldValue::from("PRIVATE")));
        assert_eq!(desired.get("type"), Some(&FieldValue::from("rsa")));
    }

    #[test]
    fn test_defaults_skipped_for_removal() {
        let adapter = find("ipsec_cert").unwrap();
        let fields = json!({"name": "site-a"});
        let desired = adapter
            .desired_state(fields.as_object().unwrap(), false)
            .unwrap();
        assert_eq!(desired.len(), 1);
    }

    #[test]
    fn test_alias_collision_rejected() {
        let adapter = find("ipsec_cert").unwrap();
        let fields = json!({"name": "a", "pub": "X", "public_key": "Y"});
        assert!(adapter.desired_state(fields.as_object().unwrap(), true).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let adapter = find("webproxy_parent").unwrap();
        let fields = json!({"enabled": true, "colour": "blue"});
        let err = adapter
            .desired_state(fields.as_object().unwrap(), true)
            .unwrap_err();
        assert!(format!("{err:#}").contains("colour"));
    }
}
