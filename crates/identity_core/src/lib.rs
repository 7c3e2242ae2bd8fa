//! Core identity reconciliation logic.
//! This crate is the single source of truth for contact cluster invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::contact::{Contact, ContactId, LinkPrecedence, NewContact};
pub use model::observation::{Observation, ValidationError};
pub use repo::contact_repo::{ContactStore, SqliteContactStore, StoreError, StoreResult};
pub use service::audit_service::{audit_clusters, ClusterViolation};
pub use service::identity_service::{
    IdentifyError, IdentifyResult, IdentityResolver, Resolution, ResolutionOutcome,
};
pub use service::projection::{project_cluster, IdentifyResponse, IdentitySummary};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
