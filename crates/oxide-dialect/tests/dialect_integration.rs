//! Integration tests for the dialect contract.
//!
//! These tests go through the public factory and the `Dialect` trait object,
//! the way the ORM layer uses them. Relational cases run against in-memory
//! SQLite on a single pooled connection.

use oxide_dialect::dsn::{database_name, CassandraDsn};
use oxide_dialect::prelude::*;

async fn sqlite() -> Box<dyn Dialect> {
    open(&DialectConfig::new("sqlite", "sqlite::memory:").max_connections(1))
        .await
        .unwrap()
}

async fn count(db: &mut dyn Dialect) -> i64 {
    let (n,): (i64,) = db
        .query_row("SELECT count(*) FROM accounts", &[])
        .await
        .scan()
        .unwrap();
    n
}

// =============================================================================
// Factory
// =============================================================================

#[tokio::test]
async fn test_unregistered_driver_runs_in_compatibility_mode() {
    let db = sqlite().await;
    assert_eq!(db.name(), "common");
    assert_eq!(db.state(), ConnectionState::Connected);
    assert_eq!(db.bind_var(1), "?");
}

#[tokio::test]
async fn test_cassandra_without_hosts_fails_to_open() {
    let err = new_dialect("cassandra", "keyspace=shop").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

// =============================================================================
// Statements and transactions
// =============================================================================

#[tokio::test]
async fn test_transaction_lifecycle() {
    let mut db = sqlite().await;
    let id_tag = db.sql_tag(&NativeType::of::<i32>(), 0, false).unwrap();
    let name_tag = db.sql_tag(&NativeType::of::<String>(), 64, false).unwrap();
    db.exec(
        &format!("CREATE TABLE accounts (id {id_tag} PRIMARY KEY, owner {name_tag})"),
        &[],
    )
    .await
    .unwrap();

    db.begin_transaction().await.unwrap();
    assert!(db.in_transaction());
    let result = db
        .exec("INSERT INTO accounts (owner) VALUES (?)", &["ada".into()])
        .await
        .unwrap();
    assert_eq!(result.rows_affected(), 1);
    assert_eq!(result.last_insert_id().unwrap(), 1);
    db.commit_transaction().await.unwrap();
    assert!(!db.in_transaction());
    assert_eq!(count(db.as_mut()).await, 1);

    db.begin_transaction().await.unwrap();
    db.exec("INSERT INTO accounts (owner) VALUES (?)", &["grace".into()])
        .await
        .unwrap();
    db.rollback_transaction().await.unwrap();
    assert_eq!(count(db.as_mut()).await, 1);

    let err = db.commit_transaction().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransactionState);

    db.close_db().await.unwrap();
    assert_eq!(db.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_cursor_and_clone_share_pool() {
    let mut db = sqlite().await;
    db.exec("CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner TEXT)", &[])
        .await
        .unwrap();
    for owner in ["ada", "grace", "barbara"] {
        db.exec("INSERT INTO accounts (owner) VALUES (?)", &[owner.into()])
            .await
            .unwrap();
    }

    let mut clone = db.clone_dialect();
    assert!(!clone.in_transaction());
    assert_eq!(count(clone.as_mut()).await, 3);

    let mut rows = db
        .query("SELECT id, owner FROM accounts ORDER BY id", &[])
        .await
        .unwrap();
    let mut owners = Vec::new();
    while rows.next() {
        assert_eq!(rows.columns().unwrap(), ["id", "owner"]);
        let (_, owner): (i64, String) = rows.scan().unwrap();
        owners.push(owner);
    }
    assert!(rows.err().is_none());
    assert!(rows.is_closed());
    assert_eq!(owners, ["ada", "grace", "barbara"]);

    let missing = db
        .query_row("SELECT owner FROM accounts WHERE id = ?", &[99_i64.into()])
        .await;
    assert!(matches!(missing.scan::<(String,)>(), Err(DialectError::NoRows)));
}

// =============================================================================
// Type tags
// =============================================================================

#[test]
fn test_type_tags_differ_per_backend() {
    let common = build(&DialectConfig::new("mysql", "mysql://localhost/shop"));
    let postgres = build(&DialectConfig::new("postgres", "postgres://localhost/shop"));
    let cassandra = build(&DialectConfig::new("cassandra", "keyspace=shop hosts=127.0.0.1"));

    let serial = NativeType::of::<i64>();
    assert_eq!(common.sql_tag(&serial, 0, true).unwrap(), "BIGINT AUTO_INCREMENT");
    assert_eq!(postgres.sql_tag(&serial, 0, true).unwrap(), "bigserial");
    assert_eq!(cassandra.sql_tag(&serial, 0, true).unwrap(), "bigint");

    let uuid = NativeType::of::<uuid::Uuid>();
    assert_eq!(cassandra.sql_tag(&uuid, 0, false).unwrap(), "uuid");
    let err = common.sql_tag(&uuid, 0, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Classification);

    let map = NativeType::new(NativeKind::Map, "HashMap<String, String>");
    for dialect in [&common, &postgres, &cassandra] {
        assert!(dialect.sql_tag(&map, 0, false).unwrap_err().is_fatal());
    }
}

#[tokio::test]
async fn test_cassandra_has_no_transactions() {
    let mut cassandra = build(&DialectConfig::new("cassandra", "keyspace=shop hosts=127.0.0.1"));
    let err = cassandra.begin_transaction().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransactionUnsupported);
    assert!(!cassandra.in_transaction());
    cassandra.close_db().await.unwrap();
}

// =============================================================================
// Data source descriptors
// =============================================================================

#[test]
fn test_data_source_descriptors() {
    let dsn = CassandraDsn::parse("hosts=10.0.0.1,10.0.0.2 keyspace=shop");
    assert_eq!(dsn.keyspace, "shop");
    assert_eq!(dsn.hosts, ["10.0.0.1", "10.0.0.2"]);
    assert!(dsn.validate().is_ok());

    assert_eq!(database_name("postgres://u:p@db:5432/shop?sslmode=disable"), "shop");
}
