//! Contact domain model.
//!
//! # Responsibility
//! - Define the persisted contact record and its link role.
//!
//! # Invariants
//! - A `Primary` contact never carries a link target.
//! - A `Secondary` contact always links directly to a `Primary`.
//! - `created_at <= updated_at`, both in epoch milliseconds.

use serde::Serialize;

/// Store-assigned contact identifier.
pub type ContactId = i64;

/// Position of a contact inside its identity cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPrecedence {
    /// Oldest contact anchoring a cluster.
    Primary,
    /// Contact merged into a cluster, linked to its primary.
    Secondary,
}

impl LinkPrecedence {
    /// Stable storage/wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    /// Parses the storage spelling back into a precedence.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            _ => None,
        }
    }
}

/// Persisted contact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Primary this contact belongs to. `None` for primaries.
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds. Moves only on role or link mutation.
    pub updated_at: i64,
    /// Soft-delete marker. Deleted rows are invisible to every store query.
    pub deleted_at: Option<i64>,
}

impl Contact {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    /// Id of the primary anchoring this contact's cluster.
    ///
    /// Returns `None` only for a secondary with a missing link target, which
    /// the schema rejects.
    pub fn cluster_root(&self) -> Option<ContactId> {
        match self.link_precedence {
            LinkPrecedence::Primary => Some(self.id),
            LinkPrecedence::Secondary => self.linked_id,
        }
    }

    /// Ordering key for "earliest created" decisions.
    ///
    /// Rows created within the same millisecond fall back to id order, which
    /// is insertion order.
    pub fn creation_key(&self) -> (i64, ContactId) {
        (self.created_at, self.id)
    }
}

/// Insert payload for a new contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
}

impl NewContact {
    /// Fresh cluster root.
    pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
        }
    }

    /// New member attached directly under `primary_id`.
    pub fn secondary(
        email: Option<String>,
        phone_number: Option<String>,
        primary_id: ContactId,
    ) -> Self {
        Self {
            email,
            phone_number,
            linked_id: Some(primary_id),
            link_precedence: LinkPrecedence::Secondary,
        }
    }
}
