//! IPsec key pairs (public/private keys used for authentication)

use anyhow::Result;
use declarative::{FieldSpec, ResourceSchema};
use serde_json::json;
use std::sync::Arc;

use super::Adapter;

pub fn schema() -> declarative::Result<ResourceSchema> {
    ResourceSchema::builder("ipsec_cert", "ipsec", "key_pairs")
        .item("name")
        .field(FieldSpec::str("name").required())
        .field(FieldSpec::str("public_key").remote("publicKey").required())
        .field(
            FieldSpec::str("private_key")
                .remote("privateKey")
                .required()
                .exclude_from_diff(),
        )
        .field(FieldSpec::str("type").remote("keyType").pattern("rsa"))
        .envelope(&["keyPair"])
        .search("searchItem")
        .apply("setItem")
        .add("addItem")
        .delete("delItem")
        .reload("service", "reconfigure")
        .build()
}

pub fn adapter() -> Result<Adapter> {
    Ok(Adapter {
        schema: Arc::new(schema()?),
        summary: "IPsec public/private key pair (item, keyed by name)",
        aliases: &[
            ("pub_key", "public_key"),
            ("pub", "public_key"),
            ("priv_key", "private_key"),
            ("priv", "private_key"),
        ],
        defaults: vec![("type", json!("rsa"))],
    })
}
