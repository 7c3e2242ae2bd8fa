//! Response projection for resolved identity clusters.
//!
//! # Responsibility
//! - Fold a cluster into the externally visible identity summary.
//! - Own the wire shape of the `/identify` success body.
//!
//! # Invariants
//! - The primary's own email/phone, when present, lead their lists.
//! - Every value appears once, in cluster iteration order after the primary.
//! - `secondary_contact_ids` follows cluster iteration order.

use crate::model::contact::{Contact, ContactId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;

/// Insertion-ordered set: a sequence plus a membership index.
#[derive(Debug, Clone)]
pub(crate) struct OrderedSet<T> {
    items: Vec<T>,
    seen: HashSet<T>,
}

impl<T: Eq + Hash + Clone> OrderedSet<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Appends `value` unless already present. Returns whether it was added.
    pub(crate) fn insert(&mut self, value: T) -> bool {
        if !self.seen.insert(value.clone()) {
            return false;
        }
        self.items.push(value);
        true
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub(crate) fn into_vec(self) -> Vec<T> {
        self.items
    }
}

/// Unified identity of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    /// Serialized with the established `primaryContatctId` spelling that
    /// existing clients depend on.
    #[serde(rename = "primaryContatctId")]
    pub primary_contact_id: ContactId,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<ContactId>,
}

/// `/identify` success envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    pub contact: IdentitySummary,
}

impl From<IdentitySummary> for IdentifyResponse {
    fn from(contact: IdentitySummary) -> Self {
        Self { contact }
    }
}

/// Builds the identity summary for the cluster anchored at `primary_id`.
///
/// `cluster` is expected in store order (ascending id). Members other than the
/// primary are listed as secondaries regardless of their stored role.
pub fn project_cluster(primary_id: ContactId, cluster: &[Contact]) -> IdentitySummary {
    let mut emails = OrderedSet::new();
    let mut phone_numbers = OrderedSet::new();
    let mut secondary_contact_ids = Vec::new();

    if let Some(primary) = cluster.iter().find(|contact| contact.id == primary_id) {
        push_present(&mut emails, primary.email.as_deref());
        push_present(&mut phone_numbers, primary.phone_number.as_deref());
    }

    for contact in cluster.iter().filter(|contact| contact.id != primary_id) {
        push_present(&mut emails, contact.email.as_deref());
        push_present(&mut phone_numbers, contact.phone_number.as_deref());
        secondary_contact_ids.push(contact.id);
    }

    IdentitySummary {
        primary_contact_id: primary_id,
        emails: emails.into_vec(),
        phone_numbers: phone_numbers.into_vec(),
        secondary_contact_ids,
    }
}

fn push_present(set: &mut OrderedSet<String>, value: Option<&str>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        set.insert(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::{project_cluster, IdentifyResponse, OrderedSet};
    use crate::model::contact::{Contact, LinkPrecedence};

    fn member(
        id: i64,
        email: Option<&str>,
        phone: Option<&str>,
        linked_id: Option<i64>,
    ) -> Contact {
        Contact {
            id,
            email: email.map(str::to_string),
            phone_number: phone.map(str::to_string),
            linked_id,
            link_precedence: if linked_id.is_some() {
                LinkPrecedence::Secondary
            } else {
                LinkPrecedence::Primary
            },
            created_at: id * 1_000,
            updated_at: id * 1_000,
            deleted_at: None,
        }
    }

    #[test]
    fn ordered_set_keeps_first_occurrence_order() {
        let mut set = OrderedSet::new();
        assert!(set.insert("b"));
        assert!(set.insert("a"));
        assert!(!set.insert("b"));
        assert_eq!(set.into_vec(), vec!["b", "a"]);
    }

    #[test]
    fn primary_values_lead_even_when_members_sort_earlier() {
        // Primary 5 absorbed an older-id secondary during a merge.
        let cluster = vec![
            member(2, Some("lorraine@hillvalley.edu"), Some("123456"), Some(5)),
            member(5, Some("mcfly@hillvalley.edu"), Some("717171"), None),
        ];

        let summary = project_cluster(5, &cluster);
        assert_eq!(summary.primary_contact_id, 5);
        assert_eq!(
            summary.emails,
            vec!["mcfly@hillvalley.edu", "lorraine@hillvalley.edu"]
        );
        assert_eq!(summary.phone_numbers, vec!["717171", "123456"]);
        assert_eq!(summary.secondary_contact_ids, vec![2]);
    }

    #[test]
    fn shared_values_are_listed_once_and_blanks_skipped() {
        let cluster = vec![
            member(1, Some("a@x.com"), None, None),
            member(2, Some("a@x.com"), Some("1"), Some(1)),
            member(3, Some(""), Some("1"), Some(1)),
            member(4, None, Some("2"), Some(1)),
        ];

        let summary = project_cluster(1, &cluster);
        assert_eq!(summary.emails, vec!["a@x.com"]);
        assert_eq!(summary.phone_numbers, vec!["1", "2"]);
        assert_eq!(summary.secondary_contact_ids, vec![2, 3, 4]);
    }

    #[test]
    fn wire_shape_uses_established_field_names() {
        let cluster = vec![member(1, Some("a@x.com"), Some("1"), None)];
        let response = IdentifyResponse::from(project_cluster(1, &cluster));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["contact"]["primaryContatctId"], 1);
        assert_eq!(json["contact"]["emails"], serde_json::json!(["a@x.com"]));
        assert_eq!(json["contact"]["phoneNumbers"], serde_json::json!(["1"]));
        assert_eq!(
            json["contact"]["secondaryContactIds"],
            serde_json::json!([])
        );
    }
}
