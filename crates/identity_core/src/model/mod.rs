//! Domain model for contact identity clusters.
//!
//! # Responsibility
//! - Define the contact record persisted by the store.
//! - Define the normalized observation accepted by the resolver.
//!
//! # Invariants
//! - Contacts form a two-level forest: primaries are roots, secondaries are
//!   direct children of a primary.
//! - Deletion is a soft-delete marker, never a hard delete.

pub mod contact;
pub mod observation;
