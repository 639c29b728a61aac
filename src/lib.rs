/// Parish Access - hierarchical role-based access control
///
/// Scope resolution, permission evaluation and audited role assignment for a
/// province > diocese > archdeaconry > deanery > parish organization, with a
/// small HTTP surface over the same services.

pub mod access;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod metrics;
pub mod server;

pub use context::AppContext;
pub use error::{AccessError, AccessResult};
