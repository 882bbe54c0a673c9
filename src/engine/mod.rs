//! Execution engine for opnrecon
//!
//! Wraps the generic reconciliation engine with the terminal side of a run:
//! 1. Connecting - build an API client from config and flags
//! 2. Diffing - show how the appliance differs from the desired state
//! 3. Executing - confirm, apply, reload and summarize

pub mod differ;
pub mod executor;

pub use executor::{ExecuteOptions, connect, execute, with_session};
