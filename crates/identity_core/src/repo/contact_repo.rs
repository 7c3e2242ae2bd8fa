//! Contact store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide matching and cluster-retrieval queries over `contacts`.
//! - Provide the insert/demote/relink primitives used by cluster merges.
//! - Provide the atomic unit of work a reconciliation runs inside.
//!
//! # Invariants
//! - Rows with `deleted_at` set are invisible to every operation.
//! - Query results are ordered by store-assigned id.
//! - `created_at` never decreases across inserts and `updated_at` never
//!   decreases on a row, even if the wall clock steps backwards.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::contact::{Contact, ContactId, LinkPrecedence, NewContact};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

const CONTACT_SELECT_SQL: &str = "SELECT
    id,
    email,
    phone_number,
    linked_id,
    link_precedence,
    created_at,
    updated_at,
    deleted_at
FROM contacts";

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from contact store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target contact does not exist or is soft-deleted.
    NotFound(ContactId),
    /// A contact was asked to link to itself.
    SelfLink(ContactId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Persisted row cannot be converted into a valid contact.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "contact not found: {id}"),
            Self::SelfLink(id) => write!(f, "contact {id} cannot link to itself"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "contact store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted contact data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::SelfLink(_) => None,
            Self::UninitializedConnection { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence contract consumed by the identity resolver.
pub trait ContactStore {
    /// Active contacts whose email equals `email` OR whose phone equals
    /// `phone_number`. Absent arguments drop out of the predicate; both absent
    /// yields an empty result.
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> StoreResult<Vec<Contact>>;
    /// The contact `primary_id` plus every active contact linked to it.
    fn find_group(&self, primary_id: ContactId) -> StoreResult<Vec<Contact>>;
    /// Inserts a contact stamped with the current time and returns the
    /// persisted row.
    fn create_contact(&self, contact: &NewContact) -> StoreResult<Contact>;
    /// Turns `contact_id` into a secondary of `new_primary_id`.
    fn demote_to_secondary(
        &self,
        contact_id: ContactId,
        new_primary_id: ContactId,
    ) -> StoreResult<()>;
    /// Repoints every contact linked to `old_primary_id` at `new_primary_id`.
    /// Returns the number of contacts moved.
    fn relink_children(
        &self,
        old_primary_id: ContactId,
        new_primary_id: ContactId,
    ) -> StoreResult<usize>;
    /// Every active contact, ordered by id.
    fn list_active(&self) -> StoreResult<Vec<Contact>>;
    /// Runs `work` as one all-or-nothing, isolated unit.
    ///
    /// Changes made through `self` inside `work` are committed only when it
    /// returns `Ok`; an `Err` rolls all of them back.
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>;
}

/// SQLite-backed contact store.
pub struct SqliteContactStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContactStore<'conn> {
    /// Creates a store over a connection opened by [`crate::db::open_db`] or
    /// [`crate::db::open_db_in_memory`].
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ContactStore for SqliteContactStore<'_> {
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> StoreResult<Vec<Contact>> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(email) = email {
            conditions.push("email = ?");
            bind_values.push(Value::Text(email.to_string()));
        }
        if let Some(phone_number) = phone_number {
            conditions.push("phone_number = ?");
            bind_values.push(Value::Text(phone_number.to_string()));
        }
        if conditions.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "{CONTACT_SELECT_SQL}
             WHERE ({})
               AND deleted_at IS NULL
             ORDER BY id ASC;",
            conditions.join(" OR ")
        );
        query_contacts(self.conn, &sql, bind_values)
    }

    fn find_group(&self, primary_id: ContactId) -> StoreResult<Vec<Contact>> {
        let sql = format!(
            "{CONTACT_SELECT_SQL}
             WHERE (id = ?1 OR linked_id = ?1)
               AND deleted_at IS NULL
             ORDER BY id ASC;"
        );
        query_contacts(self.conn, &sql, vec![Value::Integer(primary_id)])
    }

    fn create_contact(&self, contact: &NewContact) -> StoreResult<Contact> {
        if contact.linked_id.is_some() && contact.link_precedence == LinkPrecedence::Primary {
            return Err(StoreError::InvalidData(
                "primary contacts cannot carry a link target".to_string(),
            ));
        }

        self.conn.execute(
            "INSERT INTO contacts (
                email,
                phone_number,
                linked_id,
                link_precedence,
                created_at,
                updated_at,
                deleted_at
            )
            SELECT ?1, ?2, ?3, ?4, stamp, stamp, NULL
            FROM (
                SELECT MAX(?5, COALESCE((SELECT MAX(created_at) FROM contacts), 0)) AS stamp
            );",
            params![
                contact.email.as_deref(),
                contact.phone_number.as_deref(),
                contact.linked_id,
                contact.link_precedence.as_str(),
                now_epoch_ms(),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        let sql = format!("{CONTACT_SELECT_SQL} WHERE id = ?1;");
        let created = self
            .conn
            .query_row(&sql, [id], |row| Ok(parse_contact_row(row)))
            .optional()?
            .ok_or(StoreError::NotFound(id))??;
        Ok(created)
    }

    fn demote_to_secondary(
        &self,
        contact_id: ContactId,
        new_primary_id: ContactId,
    ) -> StoreResult<()> {
        if contact_id == new_primary_id {
            return Err(StoreError::SelfLink(contact_id));
        }

        let changed = self.conn.execute(
            "UPDATE contacts
             SET link_precedence = 'secondary',
                 linked_id = ?2,
                 updated_at = MAX(updated_at, ?3)
             WHERE id = ?1
               AND deleted_at IS NULL;",
            params![contact_id, new_primary_id, now_epoch_ms()],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(contact_id));
        }
        Ok(())
    }

    fn relink_children(
        &self,
        old_primary_id: ContactId,
        new_primary_id: ContactId,
    ) -> StoreResult<usize> {
        if old_primary_id == new_primary_id {
            return Ok(0);
        }

        let changed = self.conn.execute(
            "UPDATE contacts
             SET linked_id = ?2,
                 updated_at = MAX(updated_at, ?3)
             WHERE linked_id = ?1
               AND deleted_at IS NULL;",
            params![old_primary_id, new_primary_id, now_epoch_ms()],
        )?;
        Ok(changed)
    }

    fn list_active(&self) -> StoreResult<Vec<Contact>> {
        let sql = format!(
            "{CONTACT_SELECT_SQL}
             WHERE deleted_at IS NULL
             ORDER BY id ASC;"
        );
        query_contacts(self.conn, &sql, Vec::new())
    }

    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        // IMMEDIATE takes the write lock up front, so two reconciliations over
        // the same file serialize instead of failing at upgrade time.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let value = work(self)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

fn query_contacts(
    conn: &Connection,
    sql: &str,
    bind_values: Vec<Value>,
) -> StoreResult<Vec<Contact>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut contacts = Vec::new();

    while let Some(row) = rows.next()? {
        contacts.push(parse_contact_row(row)?);
    }

    Ok(contacts)
}

fn parse_contact_row(row: &Row<'_>) -> StoreResult<Contact> {
    let id: ContactId = row.get("id")?;
    let precedence_text: String = row.get("link_precedence")?;
    let link_precedence = LinkPrecedence::parse(&precedence_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid link precedence `{precedence_text}` in contacts.link_precedence (id {id})"
        ))
    })?;

    Ok(Contact {
        id,
        email: row.get("email")?,
        phone_number: row.get("phone_number")?,
        linked_id: row.get("linked_id")?,
        link_precedence,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn ensure_connection_ready(conn: &Connection) -> StoreResult<()> {
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let expected_version = latest_version();
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
