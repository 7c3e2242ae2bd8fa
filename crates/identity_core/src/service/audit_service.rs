//! Cluster consistency audit.
//!
//! # Responsibility
//! - Scan active contacts and report breaches of the cluster invariants.
//!
//! # Invariants
//! - Read-only: never mutates the store.
//! - Violations are reported in ascending contact id order per check.

use crate::model::contact::{Contact, ContactId, LinkPrecedence};
use crate::repo::contact_repo::{ContactStore, StoreResult};
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};

/// One breach of the two-level cluster forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterViolation {
    /// A primary carries a link target.
    PrimaryWithLink {
        contact_id: ContactId,
        linked_id: ContactId,
    },
    /// A secondary has no link target.
    SecondaryWithoutLink { contact_id: ContactId },
    /// A secondary links to a contact that is missing or soft-deleted.
    DanglingLink {
        contact_id: ContactId,
        linked_id: ContactId,
    },
    /// A secondary links to another secondary instead of a primary.
    ChainedLink {
        contact_id: ContactId,
        linked_id: ContactId,
    },
    /// A cluster member was created before its primary.
    PrimaryNotOldest {
        primary_id: ContactId,
        older_member_id: ContactId,
    },
    /// Two distinct clusters hold the same email.
    SharedEmail {
        first_primary_id: ContactId,
        second_primary_id: ContactId,
    },
    /// Two distinct clusters hold the same phone number.
    SharedPhone {
        first_primary_id: ContactId,
        second_primary_id: ContactId,
    },
}

impl Display for ClusterViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrimaryWithLink {
                contact_id,
                linked_id,
            } => write!(f, "primary {contact_id} links to {linked_id}"),
            Self::SecondaryWithoutLink { contact_id } => {
                write!(f, "secondary {contact_id} has no link target")
            }
            Self::DanglingLink {
                contact_id,
                linked_id,
            } => write!(
                f,
                "secondary {contact_id} links to missing or deleted contact {linked_id}"
            ),
            Self::ChainedLink {
                contact_id,
                linked_id,
            } => write!(
                f,
                "secondary {contact_id} links to secondary {linked_id} instead of a primary"
            ),
            Self::PrimaryNotOldest {
                primary_id,
                older_member_id,
            } => write!(
                f,
                "cluster {primary_id} has member {older_member_id} created before its primary"
            ),
            Self::SharedEmail {
                first_primary_id,
                second_primary_id,
            } => write!(
                f,
                "clusters {first_primary_id} and {second_primary_id} share an email"
            ),
            Self::SharedPhone {
                first_primary_id,
                second_primary_id,
            } => write!(
                f,
                "clusters {first_primary_id} and {second_primary_id} share a phone number"
            ),
        }
    }
}

/// Checks every active contact against the cluster invariants.
///
/// Shared email/phone pairs are reported once per pair of clusters, with the
/// lower primary id first. Email and phone values are never included in the
/// report.
pub fn audit_clusters<S: ContactStore>(store: &S) -> StoreResult<Vec<ClusterViolation>> {
    let contacts = store.list_active()?;
    let by_id: HashMap<ContactId, &Contact> =
        contacts.iter().map(|contact| (contact.id, contact)).collect();
    let mut violations = Vec::new();

    for contact in &contacts {
        match (contact.link_precedence, contact.linked_id) {
            (LinkPrecedence::Primary, Some(linked_id)) => {
                violations.push(ClusterViolation::PrimaryWithLink {
                    contact_id: contact.id,
                    linked_id,
                });
            }
            (LinkPrecedence::Primary, None) => {}
            (LinkPrecedence::Secondary, None) => {
                violations.push(ClusterViolation::SecondaryWithoutLink {
                    contact_id: contact.id,
                });
            }
            (LinkPrecedence::Secondary, Some(linked_id)) => match by_id.get(&linked_id) {
                None => violations.push(ClusterViolation::DanglingLink {
                    contact_id: contact.id,
                    linked_id,
                }),
                Some(target) if !target.is_primary() => {
                    violations.push(ClusterViolation::ChainedLink {
                        contact_id: contact.id,
                        linked_id,
                    });
                }
                Some(target) => {
                    if contact.creation_key() < target.creation_key() {
                        violations.push(ClusterViolation::PrimaryNotOldest {
                            primary_id: target.id,
                            older_member_id: contact.id,
                        });
                    }
                }
            },
        }
    }

    let mut email_owner: HashMap<&str, ContactId> = HashMap::new();
    let mut phone_owner: HashMap<&str, ContactId> = HashMap::new();
    let mut shared_emails: BTreeSet<(ContactId, ContactId)> = BTreeSet::new();
    let mut shared_phones: BTreeSet<(ContactId, ContactId)> = BTreeSet::new();

    for contact in &contacts {
        let Some(root) = contact.cluster_root() else {
            continue;
        };
        if let Some(email) = contact.email.as_deref().filter(|value| !value.is_empty()) {
            record_owner(&mut email_owner, &mut shared_emails, email, root);
        }
        if let Some(phone) = contact
            .phone_number
            .as_deref()
            .filter(|value| !value.is_empty())
        {
            record_owner(&mut phone_owner, &mut shared_phones, phone, root);
        }
    }

    violations.extend(shared_emails.into_iter().map(|(first, second)| {
        ClusterViolation::SharedEmail {
            first_primary_id: first,
            second_primary_id: second,
        }
    }));
    violations.extend(shared_phones.into_iter().map(|(first, second)| {
        ClusterViolation::SharedPhone {
            first_primary_id: first,
            second_primary_id: second,
        }
    }));

    Ok(violations)
}

fn record_owner<'a>(
    owners: &mut HashMap<&'a str, ContactId>,
    shared: &mut BTreeSet<(ContactId, ContactId)>,
    value: &'a str,
    root: ContactId,
) {
    match owners.get(value) {
        Some(&owner) if owner != root => {
            shared.insert((owner.min(root), owner.max(root)));
        }
        Some(_) => {}
        None => {
            owners.insert(value, root);
        }
    }
}
