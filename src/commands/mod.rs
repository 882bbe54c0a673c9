// Reconciliation commands (show, check, apply)
pub mod declarative;

// Adapter listing
pub mod resources;
