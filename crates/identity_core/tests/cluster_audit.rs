use identity_core::db::open_db_in_memory;
use identity_core::{audit_clusters, ClusterViolation, IdentityResolver, SqliteContactStore};
use rusqlite::{params, Connection};

fn seed(
    conn: &Connection,
    email: &str,
    phone: &str,
    linked_id: Option<i64>,
    created_at: i64,
) -> i64 {
    let precedence = if linked_id.is_some() {
        "secondary"
    } else {
        "primary"
    };
    conn.execute(
        "INSERT INTO contacts (email, phone_number, linked_id, link_precedence, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5);",
        params![email, phone, linked_id, precedence, created_at],
    )
    .unwrap();
    conn.last_insert_rowid()
}

#[test]
fn empty_and_reconciled_stores_are_clean() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteContactStore::try_new(&conn).unwrap();
    assert!(audit_clusters(&store).unwrap().is_empty());

    let resolver = IdentityResolver::new(store);
    resolver.identify(Some("a@x.com"), Some("1")).unwrap();
    resolver.identify(Some("b@x.com"), Some("2")).unwrap();
    resolver.identify(Some("a@x.com"), Some("2")).unwrap();
    resolver.identify(Some("c@x.com"), Some("1")).unwrap();

    assert!(audit_clusters(resolver.store()).unwrap().is_empty());
}

#[test]
fn overlapping_clusters_are_reported_once_per_pair() {
    let conn = open_db_in_memory().unwrap();
    let first = seed(&conn, "a@x.com", "1", None, 100);
    let second = seed(&conn, "a@x.com", "2", None, 200);
    seed(&conn, "a@x.com", "2", Some(second), 300);
    let store = SqliteContactStore::try_new(&conn).unwrap();

    let violations = audit_clusters(&store).unwrap();
    assert_eq!(
        violations,
        vec![ClusterViolation::SharedEmail {
            first_primary_id: first,
            second_primary_id: second,
        }]
    );
}

#[test]
fn chained_secondaries_are_reported() {
    let conn = open_db_in_memory().unwrap();
    let primary = seed(&conn, "a@x.com", "1", None, 100);
    let middle = seed(&conn, "b@x.com", "2", Some(primary), 200);
    let chained = seed(&conn, "c@x.com", "3", Some(middle), 300);
    let store = SqliteContactStore::try_new(&conn).unwrap();

    let violations = audit_clusters(&store).unwrap();
    assert!(violations.contains(&ClusterViolation::ChainedLink {
        contact_id: chained,
        linked_id: middle,
    }));
}

#[test]
fn links_to_deleted_contacts_are_dangling() {
    let conn = open_db_in_memory().unwrap();
    let primary = seed(&conn, "a@x.com", "1", None, 100);
    let child = seed(&conn, "b@x.com", "2", Some(primary), 200);
    conn.execute(
        "UPDATE contacts SET deleted_at = 250 WHERE id = ?1;",
        [primary],
    )
    .unwrap();
    let store = SqliteContactStore::try_new(&conn).unwrap();

    let violations = audit_clusters(&store).unwrap();
    assert_eq!(
        violations,
        vec![ClusterViolation::DanglingLink {
            contact_id: child,
            linked_id: primary,
        }]
    );
}

#[test]
fn members_older_than_their_primary_are_reported() {
    let conn = open_db_in_memory().unwrap();
    let primary = seed(&conn, "a@x.com", "1", None, 500);
    let older = seed(&conn, "b@x.com", "2", Some(primary), 100);
    let store = SqliteContactStore::try_new(&conn).unwrap();

    let violations = audit_clusters(&store).unwrap();
    assert_eq!(
        violations,
        vec![ClusterViolation::PrimaryNotOldest {
            primary_id: primary,
            older_member_id: older,
        }]
    );
    assert!(violations[0].to_string().contains("created before its primary"));
}
