//! # opnapi
//!
//! Blocking client for the OPNsense control API.
//!
//! [`OpnSenseClient`] implements the [`declarative::Transport`] and
//! [`declarative::Reload`] traits, so it can drive the reconciliation engine
//! against a real appliance:
//!
//! ```no_run
//! use std::sync::Arc;
//! use declarative::{reconcile, DesiredState, FieldSpec, ResourceSchema, RunOptions};
//! use opnapi::{ConnectionConfig, OpnSenseClient};
//!
//! let config = ConnectionConfig::load_default()?;
//! let client = OpnSenseClient::new(&config)?;
//!
//! let schema = ResourceSchema::builder("webproxy_parent", "proxy", "settings")
//!     .field(FieldSpec::bool("enabled"))
//!     .envelope(&["proxy", "general", "parentproxy"])
//!     .build()?;
//!
//! let desired = DesiredState::new().with("enabled", false);
//! let report = reconcile(Arc::new(schema), client, &desired, &RunOptions::default())?;
//! println!("changed: {}", report.changed);
//! # Ok::<(), declarative::Error>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod retry;

pub use client::OpnSenseClient;
pub use config::{ConnectionConfig, Credentials, config_dir, default_config_path, expand_path};
pub use error::{Error, ErrorCategory, Result};
pub use retry::{LogCallback, RetryCallback, RetryConfig, with_retry};
