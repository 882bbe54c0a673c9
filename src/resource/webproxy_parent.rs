//! Web proxy parent (upstream relay) settings

use anyhow::Result;
use declarative::{Condition, DesiredState, FieldSpec, FieldValue, Format, ResourceSchema};
use std::sync::Arc;
use std::time::Duration;

use super::Adapter;

/// User names and passwords the proxy accepts for upstream auth
const CREDENTIAL_PATTERN: &str = r"([0-9a-zA-Z\._\-]){1,32}";

pub fn schema() -> declarative::Result<ResourceSchema> {
    ResourceSchema::builder("webproxy_parent", "proxy", "settings")
        .field(FieldSpec::bool("enabled"))
        .field(FieldSpec::str("host"))
        .field(FieldSpec::int("port").range(1, 65535))
        .field(FieldSpec::bool("auth").remote("enableauth"))
        .field(FieldSpec::str("user").pattern(CREDENTIAL_PATTERN))
        .field(
            FieldSpec::str("password")
                .pattern(CREDENTIAL_PATTERN)
                .exclude_from_diff(),
        )
        .field(FieldSpec::list("local_domains").remote("localdomains"))
        .field(FieldSpec::list("local_ips").remote("localips").ip())
        .envelope(&["proxy", "general", "parentproxy"])
        .search("get")
        .apply("set")
        .reload("service", "reconfigure")
        .condition(Condition::required_when(
            "enabled",
            true,
            &["host", "port"],
            "host and port required when enabled",
        ))
        .condition(Condition::custom("host_is_ip", host_is_ip))
        .timeout(Duration::from_secs(60))
        .build()
}

/// A stale hostname is tolerated while the parent proxy is disabled
fn host_is_ip(desired: &DesiredState) -> Option<String> {
    if desired.get("enabled").and_then(FieldValue::as_bool) != Some(true) {
        return None;
    }
    let host = desired.get("host").and_then(FieldValue::as_str)?;
    if host.is_empty() || Format::Ip.matches(host) {
        None
    } else {
        Some(format!("provided host '{host}' is not a valid IP address"))
    }
}

pub fn adapter() -> Result<Adapter> {
    Ok(Adapter {
        schema: Arc::new(schema()?),
        summary: "Parent proxy the web proxy relays through (settings)",
        aliases: &[],
        defaults: Vec::new(),
    })
}
