//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the contact store contract used by reconciliation.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Every read ignores soft-deleted rows.
//! - Mutations never hard-delete and never touch email/phone columns.

pub mod contact_repo;
