//! Identity reconciliation use-case service.
//!
//! # Responsibility
//! - Match an observation against existing contacts.
//! - Merge every cluster the observation touches under the oldest primary.
//! - Record new email/phone information as one secondary contact.
//!
//! # Invariants
//! - A reconciliation runs inside a single store unit of work; either all of
//!   its inserts/demotions/relinks land or none do.
//! - After a reconciliation the touched cluster has exactly one primary and
//!   every other member links to it directly.
//! - Re-submitting an observation already covered by its cluster writes
//!   nothing.

use crate::model::contact::{Contact, ContactId, NewContact};
use crate::model::observation::{Observation, ValidationError};
use crate::repo::contact_repo::{ContactStore, StoreError};
use crate::service::projection::{project_cluster, IdentitySummary, OrderedSet};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type IdentifyResult<T> = Result<T, IdentifyError>;

/// Errors from identity reconciliation.
#[derive(Debug)]
pub enum IdentifyError {
    /// Observation carried no usable identifier. Client-side error.
    Validation(ValidationError),
    /// Store failure. Not recoverable within the request.
    Storage(StoreError),
}

impl Display for IdentifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IdentifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Storage(err) => Some(err),
        }
    }
}

impl From<ValidationError> for IdentifyError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for IdentifyError {
    fn from(value: StoreError) -> Self {
        Self::Storage(value)
    }
}

/// How a reconciliation changed the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Nothing matched; the observation became a new primary.
    CreatedPrimary,
    /// Matched one or more clusters and recorded new information as a
    /// secondary.
    CreatedSecondary,
    /// Matched, and the cluster already held every observed value.
    Unchanged,
}

impl ResolutionOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::CreatedPrimary => "created_primary",
            Self::CreatedSecondary => "created_secondary",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Final state of the cluster an observation resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Canonical primary of the cluster.
    pub primary_id: ContactId,
    /// All active cluster members in store order, including any contact
    /// created by this reconciliation.
    pub cluster: Vec<Contact>,
    /// Former primaries demoted under `primary_id` by this reconciliation.
    pub merged_primary_ids: Vec<ContactId>,
    pub outcome: ResolutionOutcome,
    /// Set when no matched contact led back to a live primary and the
    /// earliest match stood in as canonical.
    pub degraded: bool,
}

impl Resolution {
    /// Externally visible identity summary for this cluster.
    pub fn summary(&self) -> IdentitySummary {
        project_cluster(self.primary_id, &self.cluster)
    }
}

/// Reconciles observations against a contact store it owns.
pub struct IdentityResolver<S: ContactStore> {
    store: S,
}

impl<S: ContactStore> IdentityResolver<S> {
    /// Creates a resolver over the provided store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Normalizes raw input, reconciles it and returns the unified identity.
    ///
    /// # Errors
    /// - `Validation` when both identifiers are absent or blank. No store
    ///   access happens in that case.
    /// - `Storage` when any store operation fails; the unit of work is rolled
    ///   back.
    pub fn identify(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> IdentifyResult<IdentitySummary> {
        let observation = Observation::new(email, phone_number)?;
        Ok(self.resolve(&observation)?.summary())
    }

    /// Reconciles an already-normalized observation.
    pub fn resolve(&self, observation: &Observation) -> IdentifyResult<Resolution> {
        let started_at = Instant::now();
        let result = self
            .store
            .atomically(|store| reconcile(store, observation));

        match &result {
            Ok(resolution) => info!(
                "event=identify module=service status={} outcome={} primary_id={} cluster_size={} merged={} duration_ms={}",
                if resolution.degraded { "degraded" } else { "ok" },
                resolution.outcome.as_str(),
                resolution.primary_id,
                resolution.cluster.len(),
                resolution.merged_primary_ids.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=identify module=service status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }

        result
    }
}

fn reconcile<S: ContactStore>(store: &S, observation: &Observation) -> IdentifyResult<Resolution> {
    let email = observation.email();
    let phone_number = observation.phone_number();

    let matches = store.find_by_email_or_phone(email, phone_number)?;
    if matches.is_empty() {
        let primary = store.create_contact(&NewContact::primary(
            email.map(str::to_string),
            phone_number.map(str::to_string),
        ))?;
        return Ok(Resolution {
            primary_id: primary.id,
            cluster: vec![primary],
            merged_primary_ids: Vec::new(),
            outcome: ResolutionOutcome::CreatedPrimary,
            degraded: false,
        });
    }

    let mut degraded = false;
    let mut implicated = OrderedSet::new();
    for contact in &matches {
        if let Some(root) = contact.cluster_root() {
            implicated.insert(root);
        }
    }
    if implicated.is_empty() {
        if let Some(oldest) = earliest(&matches) {
            warn!(
                "event=identify module=service status=degraded reason=no_primary_in_matches fallback_id={}",
                oldest.id
            );
            implicated.insert(oldest.id);
            degraded = true;
        }
    }

    let mut primaries = Vec::new();
    for primary_id in implicated.iter().copied() {
        let group = store.find_group(primary_id)?;
        if let Some(primary) = group.into_iter().find(|contact| contact.id == primary_id) {
            primaries.push(primary);
        }
    }

    let canonical_id = match earliest(&primaries).or_else(|| earliest(&matches)) {
        Some(canonical) => canonical.id,
        None => {
            return Err(StoreError::InvalidData(
                "matched contacts vanished during reconciliation".to_string(),
            )
            .into())
        }
    };
    if primaries.is_empty() {
        degraded = true;
        warn!(
            "event=identify module=service status=degraded reason=no_primary_resolved fallback_id={canonical_id}"
        );
    }

    let mut merged_primary_ids = Vec::new();
    for absorbed in primaries.iter().filter(|primary| primary.id != canonical_id) {
        store.demote_to_secondary(absorbed.id, canonical_id)?;
        let moved = store.relink_children(absorbed.id, canonical_id)?;
        debug!(
            "event=cluster_merge module=service primary_id={} absorbed_id={} relinked={}",
            canonical_id, absorbed.id, moved
        );
        merged_primary_ids.push(absorbed.id);
    }

    let mut cluster = store.find_group(canonical_id)?;
    let has_new_email = email.is_some_and(|value| {
        !cluster
            .iter()
            .any(|contact| contact.email.as_deref() == Some(value))
    });
    let has_new_phone = phone_number.is_some_and(|value| {
        !cluster
            .iter()
            .any(|contact| contact.phone_number.as_deref() == Some(value))
    });

    let outcome = if has_new_email || has_new_phone {
        let secondary = store.create_contact(&NewContact::secondary(
            email.map(str::to_string),
            phone_number.map(str::to_string),
            canonical_id,
        ))?;
        cluster.push(secondary);
        ResolutionOutcome::CreatedSecondary
    } else {
        ResolutionOutcome::Unchanged
    };

    Ok(Resolution {
        primary_id: canonical_id,
        cluster,
        merged_primary_ids,
        outcome,
        degraded,
    })
}

fn earliest(contacts: &[Contact]) -> Option<&Contact> {
    contacts.iter().min_by_key(|contact| contact.creation_key())
}
