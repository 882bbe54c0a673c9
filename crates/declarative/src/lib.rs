//! # Declarative
//!
//! Declarative reconciliation of appliance settings.
//!
//! A caller states the configuration a resource should have; the engine
//! validates it, reads what the appliance currently holds, computes a
//! minimal diff and writes only when something differs. Optionally the
//! service behind the resource is reloaded afterwards.
//!
//! ## Core Concepts
//!
//! - **ResourceSchema**: Declaration of one resource type (fields, remote
//!   names, constraints, endpoints). Plain data, built once.
//! - **DesiredState / ActualState**: Canonical typed field maps
//! - **Codec**: Turns the appliance's text encodings into typed values
//! - **Diff**: Before/after views and a change verdict
//! - **Engine**: The validate → fetch → diff → apply → reload run
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use declarative::{
//!     reconcile, CallKind, DesiredState, FieldSpec, MockTransport, ResourceSchema, RunOptions,
//! };
//! use serde_json::json;
//!
//! let schema = ResourceSchema::builder("webproxy_parent", "proxy", "settings")
//!     .field(FieldSpec::bool("enabled"))
//!     .field(FieldSpec::str("host").ip())
//!     .field(FieldSpec::int("port").range(1, 65535))
//!     .envelope(&["proxy", "general", "parentproxy"])
//!     .reload("service", "reconfigure")
//!     .build()?;
//!
//! let transport = MockTransport::new().with_response(
//!     "proxy/settings/get",
//!     json!({"proxy": {"general": {"parentproxy": {"enabled": "0", "host": "", "port": ""}}}}),
//! );
//!
//! let desired = DesiredState::new()
//!     .with("enabled", true)
//!     .with("host", "203.0.113.5")
//!     .with("port", 8080);
//!
//! let report = reconcile(Arc::new(schema), transport.clone(), &desired, &RunOptions::default())?;
//! assert!(report.changed);
//! assert_eq!(transport.count(CallKind::Apply), 1);
//! assert_eq!(transport.close_count(), 1);
//! # Ok::<(), declarative::Error>(())
//! ```
//!
//! ## Transport Traits
//!
//! The engine performs no I/O of its own:
//!
//! - [`Transport`]: Reads and writes resource state
//! - [`Reload`]: Triggers a service reload
//!
//! [`MockTransport`] implements both in memory for tests.

pub mod codec;
pub mod diff;
pub mod engine;
pub mod error;
pub mod request;
pub mod resource;
pub mod transport;
pub mod types;
pub mod validate;

// Re-export main types at crate root
pub use diff::Diff;
pub use engine::{Action, Checked, Engine, ReconcileReport, reconcile};
pub use error::{Error, ErrorCategory, Result};
pub use resource::{
    Commands, Condition, Encoding, FieldSpec, Format, ReloadTarget, ResourceKind, ResourceSchema,
    ResourceSchemaBuilder,
};
pub use transport::{
    CallKind, MockTransport, RecordedCall, Reload, RemoteRef, Transport, TransportError,
    TransportResult,
};
pub use types::{
    ActualState, DesiredState, FieldMap, FieldType, FieldValue, Presence, RunOptions, RunState,
};
pub use validate::{ValidationErrors, Violation, validate};
