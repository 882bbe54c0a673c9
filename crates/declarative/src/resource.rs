//! Resource schemas for declarative reconciliation
//!
//! A [`ResourceSchema`] is everything the engine needs to know about one
//! resource type on the appliance: its fields and their remote names, how
//! values are validated, and which API endpoints read and write it. Schemas
//! are plain data; every resource shares the same engine.
//!
//! # Example
//!
//! ```
//! use declarative::{Condition, FieldSpec, FieldValue, ResourceSchema};
//!
//! let schema = ResourceSchema::builder("webproxy_parent", "proxy", "settings")
//!     .field(FieldSpec::bool("enabled"))
//!     .field(FieldSpec::str("host").ip())
//!     .field(FieldSpec::int("port").range(1, 65535))
//!     .field(FieldSpec::bool("auth").remote("enableauth"))
//!     .field(FieldSpec::str("password").exclude_from_diff())
//!     .envelope(&["proxy", "general", "parentproxy"])
//!     .search("get")
//!     .apply("set")
//!     .reload("service", "reconfigure")
//!     .condition(Condition::required_when(
//!         "enabled",
//!         true,
//!         &["host", "port"],
//!         "host and port required when enabled",
//!     ))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.field("auth").unwrap().remote_name(), "enableauth");
//! assert_eq!(schema.diff_excluded(), vec!["password"]);
//! ```

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::RemoteRef;
use crate::types::{DesiredState, FieldType, FieldValue};

/// Semantic format a string field must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// IPv4 or IPv6 address
    Ip,
    Ipv4,
    Ipv6,
}

impl Format {
    /// Check whether `value` satisfies the format
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Ip => value.parse::<IpAddr>().is_ok(),
            Self::Ipv4 => value.parse::<Ipv4Addr>().is_ok(),
            Self::Ipv6 => value.parse::<Ipv6Addr>().is_ok(),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Ip => "IP address",
            Self::Ipv4 => "IPv4 address",
            Self::Ipv6 => "IPv6 address",
        }
    }
}

/// One declared field of a resource
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Canonical (caller-facing) name
    pub name: String,
    /// Remote API name, when it differs from the canonical one
    pub remote: Option<String>,
    pub kind: FieldType,
    pub min: Option<i64>,
    pub max: Option<i64>,
    /// Regular expression the whole value must match
    pub pattern: Option<String>,
    pub format: Option<Format>,
    /// Never surfaced in diffs (secrets)
    pub diff_exclude: bool,
    /// Must be present and non-empty when the resource should exist
    pub required: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            remote: None,
            kind,
            min: None,
            max: None,
            pattern: None,
            format: None,
            diff_exclude: false,
            required: false,
        }
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Bool)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Int)
    }

    pub fn str(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Str)
    }

    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::List)
    }

    /// Name the field carries in the remote API
    pub fn remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }

    /// Inclusive integer bounds
    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Shorthand for `format(Format::Ip)`
    pub fn ip(self) -> Self {
        self.format(Format::Ip)
    }

    pub fn exclude_from_diff(mut self) -> Self {
        self.diff_exclude = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Remote name, falling back to the canonical name
    pub fn remote_name(&self) -> &str {
        self.remote.as_deref().unwrap_or(&self.name)
    }
}

/// Cross-field rule evaluated after the per-field checks
#[derive(Debug, Clone)]
pub enum Condition {
    /// When `field` equals `equals`, every field in `required` must be non-empty
    RequiredWhen {
        field: String,
        equals: FieldValue,
        required: Vec<String>,
        message: String,
    },
    /// Arbitrary predicate; returns a message when violated
    Custom {
        name: String,
        check: fn(&DesiredState) -> Option<String>,
    },
}

impl Condition {
    pub fn required_when(
        field: impl Into<String>,
        equals: impl Into<FieldValue>,
        required: &[&str],
        message: impl Into<String>,
    ) -> Self {
        Self::RequiredWhen {
            field: field.into(),
            equals: equals.into(),
            required: required.iter().map(|s| (*s).to_string()).collect(),
            message: message.into(),
        }
    }

    pub fn custom(name: impl Into<String>, check: fn(&DesiredState) -> Option<String>) -> Self {
        Self::Custom {
            name: name.into(),
            check,
        }
    }
}

/// Text encodings the appliance uses for typed values
///
/// These differ between integrations, so they are declared per schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    pub bool_true: String,
    pub bool_false: String,
    pub list_delimiter: char,
}

impl Default for Encoding {
    fn default() -> Self {
        Self {
            bool_true: "1".to_string(),
            bool_false: "0".to_string(),
            list_delimiter: ',',
        }
    }
}

/// How the resource exists on the appliance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// A singleton settings block, read and written at fixed endpoints
    Settings,
    /// An entry in a collection, identified by the value of `key_field`
    Item { key_field: String },
}

/// Remote commands for reading and writing the resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commands {
    pub search: String,
    pub apply: String,
    pub add: Option<String>,
    pub delete: Option<String>,
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            search: "get".to_string(),
            apply: "set".to_string(),
            add: None,
            delete: None,
        }
    }
}

/// Controller and command that reload the service behind the resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadTarget {
    pub controller: String,
    pub command: String,
}

/// Immutable declaration of one resource type
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    name: String,
    kind: ResourceKind,
    module: String,
    controller: String,
    fields: Vec<FieldSpec>,
    commands: Commands,
    reload: Option<ReloadTarget>,
    envelope: Vec<String>,
    search_path: Option<Vec<String>>,
    conditions: Vec<Condition>,
    encoding: Encoding,
    timeout: Option<Duration>,
    patterns: HashMap<String, Regex>,
}

impl ResourceSchema {
    /// Start declaring a resource served by `/api/{module}/{controller}/...`
    pub fn builder(
        name: impl Into<String>,
        module: impl Into<String>,
        controller: impl Into<String>,
    ) -> ResourceSchemaBuilder {
        ResourceSchemaBuilder {
            name: name.into(),
            kind: ResourceKind::Settings,
            module: module.into(),
            controller: controller.into(),
            fields: Vec::new(),
            commands: Commands::default(),
            reload: None,
            envelope: Vec::new(),
            search_path: None,
            conditions: Vec::new(),
            encoding: Encoding::default(),
            timeout: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up a field by canonical name
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn commands(&self) -> &Commands {
        &self.commands
    }

    pub fn reload_target(&self) -> Option<&ReloadTarget> {
        self.reload.as_ref()
    }

    /// Nested keys wrapping the field mapping in update payloads
    pub fn envelope(&self) -> &[String] {
        &self.envelope
    }

    /// Nested keys locating the data in search responses
    ///
    /// Defaults to the envelope for settings and to `rows` for items.
    pub fn search_path(&self) -> Vec<String> {
        match (&self.search_path, &self.kind) {
            (Some(path), _) => path.clone(),
            (None, ResourceKind::Settings) => self.envelope.clone(),
            (None, ResourceKind::Item { .. }) => vec!["rows".to_string()],
        }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    /// Per-call timeout this resource needs, if it differs from the default
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Key field for item resources
    pub fn key_field(&self) -> Option<&str> {
        match &self.kind {
            ResourceKind::Item { key_field } => Some(key_field),
            ResourceKind::Settings => None,
        }
    }

    /// Canonical names of fields that never appear in diffs
    pub fn diff_excluded(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.diff_exclude)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Compiled, fully anchored pattern for a field
    pub(crate) fn pattern_for(&self, name: &str) -> Option<&Regex> {
        self.patterns.get(name)
    }

    pub fn search_ref(&self) -> RemoteRef {
        self.remote_ref(&self.commands.search, None)
    }

    pub fn apply_ref(&self, uuid: Option<&str>) -> RemoteRef {
        self.remote_ref(&self.commands.apply, uuid)
    }

    pub fn add_ref(&self) -> Option<RemoteRef> {
        self.commands
            .add
            .as_deref()
            .map(|cmd| self.remote_ref(cmd, None))
    }

    pub fn delete_ref(&self, uuid: &str) -> Option<RemoteRef> {
        self.commands
            .delete
            .as_deref()
            .map(|cmd| self.remote_ref(cmd, Some(uuid)))
    }

    pub fn reload_ref(&self) -> Option<RemoteRef> {
        self.reload.as_ref().map(|r| RemoteRef {
            module: self.module.clone(),
            controller: r.controller.clone(),
            command: r.command.clone(),
            uuid: None,
        })
    }

    fn remote_ref(&self, command: &str, uuid: Option<&str>) -> RemoteRef {
        RemoteRef {
            module: self.module.clone(),
            controller: self.controller.clone(),
            command: command.to_string(),
            uuid: uuid.map(str::to_string),
        }
    }
}

/// Builder for [`ResourceSchema`]
#[derive(Debug, Clone)]
pub struct ResourceSchemaBuilder {
    name: String,
    kind: ResourceKind,
    module: String,
    controller: String,
    fields: Vec<FieldSpec>,
    commands: Commands,
    reload: Option<ReloadTarget>,
    envelope: Vec<String>,
    search_path: Option<Vec<String>>,
    conditions: Vec<Condition>,
    encoding: Encoding,
    timeout: Option<Duration>,
}

impl ResourceSchemaBuilder {
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare the resource as a collection item keyed by `key_field`
    pub fn item(mut self, key_field: impl Into<String>) -> Self {
        self.kind = ResourceKind::Item {
            key_field: key_field.into(),
        };
        self
    }

    pub fn search(mut self, command: impl Into<String>) -> Self {
        self.commands.search = command.into();
        self
    }

    pub fn apply(mut self, command: impl Into<String>) -> Self {
        self.commands.apply = command.into();
        self
    }

    pub fn add(mut self, command: impl Into<String>) -> Self {
        self.commands.add = Some(command.into());
        self
    }

    pub fn delete(mut self, command: impl Into<String>) -> Self {
        self.commands.delete = Some(command.into());
        self
    }

    pub fn reload(mut self, controller: impl Into<String>, command: impl Into<String>) -> Self {
        self.reload = Some(ReloadTarget {
            controller: controller.into(),
            command: command.into(),
        });
        self
    }

    pub fn envelope(mut self, path: &[&str]) -> Self {
        self.envelope = path.iter().map(|s| (*s).to_string()).collect();
        self
    }

    pub fn search_path(mut self, path: &[&str]) -> Self {
        self.search_path = Some(path.iter().map(|s| (*s).to_string()).collect());
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Check the declaration and freeze it
    pub fn build(self) -> Result<ResourceSchema> {
        let mut names = HashSet::new();
        let mut remotes = HashSet::new();
        let mut patterns = HashMap::new();

        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(Error::Schema(format!(
                    "{}: duplicate field '{}'",
                    self.name, field.name
                )));
            }
            if !remotes.insert(field.remote_name()) {
                return Err(Error::Schema(format!(
                    "{}: remote name '{}' is mapped by more than one field",
                    self.name,
                    field.remote_name()
                )));
            }
            if let (Some(min), Some(max)) = (field.min, field.max)
                && min > max
            {
                return Err(Error::Schema(format!(
                    "{}: field '{}' has min {} greater than max {}",
                    self.name, field.name, min, max
                )));
            }
            if let Some(pattern) = &field.pattern {
                let anchored = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                    Error::Schema(format!(
                        "{}: invalid pattern for field '{}': {}",
                        self.name, field.name, e
                    ))
                })?;
                patterns.insert(field.name.clone(), anchored);
            }
        }

        if let ResourceKind::Item { key_field } = &self.kind {
            if !names.contains(key_field.as_str()) {
                return Err(Error::Schema(format!(
                    "{}: key field '{}' is not declared",
                    self.name, key_field
                )));
            }
            if self.envelope.is_empty() {
                return Err(Error::Schema(format!(
                    "{}: item resources need a request envelope",
                    self.name
                )));
            }
        }

        for condition in &self.conditions {
            if let Condition::RequiredWhen {
                field, required, ..
            } = condition
            {
                for name in std::iter::once(field).chain(required) {
                    if !names.contains(name.as_str()) {
                        return Err(Error::Schema(format!(
                            "{}: condition references undeclared field '{}'",
                            self.name, name
                        )));
                    }
                }
            }
        }

        Ok(ResourceSchema {
            name: self.name,
            kind: self.kind,
            module: self.module,
            controller: self.controller,
            fields: self.fields,
            commands: self.commands,
            reload: self.reload,
            envelope: self.envelope,
            search_path: self.search_path,
            conditions: self.conditions,
            encoding: self.encoding,
            timeout: self.timeout,
            patterns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ResourceSchemaBuilder {
        ResourceSchema::builder("test", "proxy", "settings").envelope(&["proxy", "general"])
    }

    #[test]
    fn test_remote_name_falls_back_to_canonical() {
        let plain = FieldSpec::str("host");
        let renamed = FieldSpec::bool("auth").remote("enableauth");
        assert_eq!(plain.remote_name(), "host");
        assert_eq!(renamed.remote_name(), "enableauth");
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = base()
            .field(FieldSpec::str("host"))
            .field(FieldSpec::int("host"))
            .build();
        assert!(matches!(result, Err(Error::Schema(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn test_remote_collision_rejected() {
        let result = base()
            .field(FieldSpec::str("a").remote("shared"))
            .field(FieldSpec::str("b").remote("shared"))
            .build();
        assert!(matches!(result, Err(Error::Schema(msg)) if msg.contains("shared")));
    }

    #[test]
    fn test_remote_collides_with_canonical() {
        let result = base()
            .field(FieldSpec::str("localdomains"))
            .field(FieldSpec::list("local_domains").remote("localdomains"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = base().field(FieldSpec::str("user").pattern("([a-z")).build();
        assert!(matches!(result, Err(Error::Schema(msg)) if msg.contains("user")));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let result = base().field(FieldSpec::int("port").range(10, 1)).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_item_requires_declared_key() {
        let result = ResourceSchema::builder("cert", "ipsec", "key_pairs")
            .item("name")
            .envelope(&["keyPair"])
            .field(FieldSpec::str("public_key"))
            .build();
        assert!(matches!(result, Err(Error::Schema(msg)) if msg.contains("key field")));
    }

    #[test]
    fn test_condition_must_reference_declared_fields() {
        let result = base()
            .field(FieldSpec::bool("enabled"))
            .condition(Condition::required_when("enabled", true, &["host"], "msg"))
            .build();
        assert!(matches!(result, Err(Error::Schema(msg)) if msg.contains("host")));
    }

    #[test]
    fn test_pattern_is_anchored() {
        let schema = base()
            .field(FieldSpec::str("user").pattern("[a-z]{1,4}"))
            .build()
            .unwrap();
        let re = schema.pattern_for("user").unwrap();
        assert!(re.is_match("abc"));
        assert!(!re.is_match("abcdefgh"));
        assert!(!re.is_match("ABC abc"));
    }

    #[test]
    fn test_search_path_defaults() {
        let settings = base().build().unwrap();
        assert_eq!(settings.search_path(), vec!["proxy", "general"]);

        let item = ResourceSchema::builder("cert", "ipsec", "key_pairs")
            .item("name")
            .field(FieldSpec::str("name"))
            .envelope(&["keyPair"])
            .build()
            .unwrap();
        assert_eq!(item.search_path(), vec!["rows"]);
    }

    #[test]
    fn test_remote_refs() {
        let schema = ResourceSchema::builder("cert", "ipsec", "key_pairs")
            .item("name")
            .field(FieldSpec::str("name"))
            .envelope(&["keyPair"])
            .search("searchItem")
            .apply("setItem")
            .add("addItem")
            .delete("delItem")
            .reload("service", "reconfigure")
            .build()
            .unwrap();

        assert_eq!(schema.search_ref().path(), "ipsec/key_pairs/searchItem");
        assert_eq!(
            schema.apply_ref(Some("abc")).path(),
            "ipsec/key_pairs/setItem/abc"
        );
        assert_eq!(schema.add_ref().unwrap().path(), "ipsec/key_pairs/addItem");
        assert_eq!(
            schema.delete_ref("abc").unwrap().path(),
            "ipsec/key_pairs/delItem/abc"
        );
        assert_eq!(schema.reload_ref().unwrap().path(), "ipsec/service/reconfigure");
    }

    #[test]
    fn test_format_matches() {
        assert!(Format::Ip.matches("203.0.113.5"));
        assert!(Format::Ip.matches("2001:db8::1"));
        assert!(!Format::Ip.matches("proxy.example.com"));
        assert!(Format::Ipv4.matches("10.0.0.1"));
        assert!(!Format::Ipv4.matches("2001:db8::1"));
        assert!(Format::Ipv6.matches("::1"));
        assert!(!Format::Ipv6.matches("10.0.0.1"));
    }
}
