//! Core use-case services.
//!
//! # Responsibility
//! - Run identity reconciliation over a contact store.
//! - Project resolved clusters into the external identity summary.
//! - Audit stored clusters against their invariants.

pub mod audit_service;
pub mod identity_service;
pub mod projection;
