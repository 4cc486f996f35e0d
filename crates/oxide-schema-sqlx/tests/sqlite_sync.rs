//! Schema sync, DML and queries against an in-memory SQLite database.

use oxide_schema_core::backend::SQLITE;
use oxide_schema_core::dml::Row;
use oxide_schema_core::query::functions;
use oxide_schema_core::sync::SyncOptions;
use oxide_schema_core::table::TableSpec;
use oxide_schema_core::{Connection, Query, SchemaError, SqlValue, Union, Value};
use oxide_schema_derive::Table;
use oxide_schema_sqlx::SqlxConnection;
use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::chrono::NaiveDateTime;

#[allow(dead_code)]
#[derive(Table)]
#[table(name = "tickets")]
struct TicketV1 {
    #[column(auto_increment)]
    id: i64,
    #[column(width = 128, nullable = false, index)]
    user_id: String,
    #[column(nullable = false, default = "false")]
    resolved: bool,
    priority: Option<i32>,
    #[column(created_at, nullable = false)]
    created: NaiveDateTime,
}

/// Adds a nullable column.
#[allow(dead_code)]
#[derive(Table)]
#[table(name = "tickets")]
struct TicketV2 {
    #[column(auto_increment)]
    id: i64,
    #[column(width = 128, nullable = false, index)]
    user_id: String,
    #[column(nullable = false, default = "false")]
    resolved: bool,
    priority: Option<i32>,
    #[column(created_at, nullable = false)]
    created: NaiveDateTime,
    note: Option<String>,
}

/// Makes `priority` mandatory and drops `note`.
#[allow(dead_code)]
#[derive(Table)]
#[table(name = "tickets")]
struct TicketV3 {
    #[column(auto_increment)]
    id: i64,
    #[column(width = 128, nullable = false, index)]
    user_id: String,
    #[column(nullable = false, default = "false")]
    resolved: bool,
    #[column(nullable = false, default = 1)]
    priority: i32,
    #[column(created_at, nullable = false)]
    created: NaiveDateTime,
}

#[allow(dead_code)]
#[derive(Table)]
#[table(name = "agents")]
struct Agent {
    #[column(primary, width = 128)]
    name: String,
    #[column(default = "open")]
    status: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct TicketRow {
    id: i64,
    user_id: String,
    resolved: bool,
    priority: Option<i32>,
    created: NaiveDateTime,
}

async fn create_test_connection() -> SqlxConnection {
    let options = ":memory:"
        .parse::<SqliteConnectOptions>()
        .expect("Failed to parse options")
        .with_regexp();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to create pool");
    SqlxConnection::new(pool)
}

fn ticket_row(user: &str, priority: i32) -> Row {
    Row::from([
        ("user_id".to_string(), Value::from(user)),
        ("priority".to_string(), Value::from(priority)),
    ])
}

async fn synced<T: oxide_schema_core::TableDecl>(conn: &SqlxConnection) -> TableSpec {
    let table = TableSpec::from_decl::<T>(&SQLITE).unwrap();
    let outcome = table.sync(conn, &SyncOptions::default()).await.unwrap();
    assert!(outcome.after.is_in_sync(), "{:?}", outcome.after.reasons);
    table
}

#[tokio::test]
async fn test_sync_creates_table_once() {
    let conn = create_test_connection().await;
    let tickets = TableSpec::from_decl::<TicketV1>(&SQLITE).unwrap();

    let before = tickets
        .check_sync(&conn, &SyncOptions::default())
        .await
        .unwrap();
    assert!(before.missing_table);
    assert!(!before.is_in_sync());

    let first = tickets.sync(&conn, &SyncOptions::default()).await.unwrap();
    assert_eq!(first.statements, tickets.create_sql());
    assert!(first.after.is_in_sync(), "{:?}", first.after.reasons);

    let second = tickets.sync(&conn, &SyncOptions::default()).await.unwrap();
    assert!(second.statements.is_empty());
    assert!(second.after.is_in_sync());
}

#[tokio::test]
async fn test_live_table_matches_declaration() {
    let conn = create_test_connection().await;
    let tickets = synced::<TicketV1>(&conn).await;

    let live = tickets.fetch_live(&conn).await.unwrap().unwrap();
    assert_eq!(live.primary_key_names(), vec!["id".to_string()]);
    assert_eq!(live.columns.len(), 5);
    assert_eq!(live.indexes.len(), 1);
    assert_eq!(live.indexes[0].name(), "ix_tickets_user_id");
    assert_eq!(
        live.column("resolved").and_then(|c| c.default_value()),
        Some("0")
    );
}

#[tokio::test]
async fn test_missing_table_is_not_created_when_disabled() {
    let conn = create_test_connection().await;
    let tickets = TableSpec::from_decl::<TicketV1>(&SQLITE).unwrap();
    let options = SyncOptions {
        create_missing_table: false,
        ..SyncOptions::default()
    };
    let outcome = tickets.sync(&conn, &options).await.unwrap();
    assert!(outcome.statements.is_empty());
    assert!(outcome.after.missing_table);
}

#[tokio::test]
async fn test_nullable_column_is_added_in_place() {
    let conn = create_test_connection().await;
    synced::<TicketV1>(&conn).await;

    let v2 = TableSpec::from_decl::<TicketV2>(&SQLITE).unwrap();
    let outcome = v2.sync(&conn, &SyncOptions::default()).await.unwrap();
    assert_eq!(
        outcome.statements,
        vec!["ALTER TABLE `tickets` ADD COLUMN `note` TEXT COLLATE NOCASE;".to_string()]
    );
    assert!(outcome.after.is_in_sync(), "{:?}", outcome.after.reasons);
}

#[tokio::test]
async fn test_modified_column_rebuilds_and_keeps_rows() {
    let conn = create_test_connection().await;
    let v2 = synced::<TicketV2>(&conn).await;
    v2.insert(&conn, &ticket_row("alice", 3)).await.unwrap();
    v2.insert(&conn, &ticket_row("bob", 5)).await.unwrap();

    let v3 = TableSpec::from_decl::<TicketV3>(&SQLITE).unwrap();
    let report = v3.check_sync(&conn, &SyncOptions::default()).await.unwrap();
    assert_eq!(report.changes.updated().count(), 1);
    assert_eq!(report.changes.retained_columns.len(), 1);

    let outcome = v3.sync(&conn, &SyncOptions::default()).await.unwrap();
    assert!(outcome.statements[0].starts_with("ALTER TABLE `tickets` RENAME TO"));
    assert!(!outcome.after.needs_commit(), "{:?}", outcome.after.reasons);
    // The retained column is still reported.
    assert!(!outcome.after.is_in_sync());
    assert_eq!(outcome.after.reasons, vec!["extra column `note` (kept)".to_string()]);
    let live = v3.fetch_live(&conn).await.unwrap().unwrap();
    assert!(live.column("note").is_some());
    assert!(!live.column("priority").unwrap().is_nullable());

    let tickets = v3.instance();
    let count = tickets.query().count(&conn).await.unwrap();
    assert_eq!(count, 2);
    let bob = tickets
        .query()
        .equals("user_id", "bob")
        .unwrap()
        .first_values(&conn)
        .await
        .unwrap();
    assert_eq!(bob["priority"], Value::Int(5));
}

#[tokio::test]
async fn test_removed_column_is_dropped_on_request() {
    let conn = create_test_connection().await;
    let v2 = synced::<TicketV2>(&conn).await;
    v2.insert(&conn, &ticket_row("alice", 3)).await.unwrap();

    let v3 = TableSpec::from_decl::<TicketV3>(&SQLITE).unwrap();
    let options = SyncOptions {
        drop_removed_columns: true,
        ..SyncOptions::default()
    };
    let report = v3.check_sync(&conn, &options).await.unwrap();
    assert_eq!(report.changes.removed().count(), 1);
    assert!(report.changes.retained_columns.is_empty());

    let outcome = v3.sync(&conn, &options).await.unwrap();
    assert!(outcome.after.is_in_sync(), "{:?}", outcome.after.reasons);
    let live = v3.fetch_live(&conn).await.unwrap().unwrap();
    assert!(live.column("note").is_none());
    assert_eq!(live.indexes.len(), 1);
    assert_eq!(v3.instance().query().count(&conn).await.unwrap(), 1);
}

#[tokio::test]
async fn test_insert_update_delete() {
    let conn = create_test_connection().await;
    let tickets = synced::<TicketV1>(&conn).await;

    assert_eq!(tickets.insert(&conn, &ticket_row("alice", 1)).await.unwrap(), 1);
    let t = tickets.instance();
    let row: TicketRow = t.query().first(&conn).await.unwrap();
    assert_eq!(row.id, 1);
    assert_eq!(row.user_id, "alice");
    assert!(!row.resolved);
    assert_eq!(row.priority, Some(1));
    assert!(row.created.and_utc().timestamp() > 0);

    let update = Row::from([
        ("id".to_string(), Value::Int(1)),
        ("resolved".to_string(), Value::Bool(true)),
        ("priority".to_string(), Value::Null),
    ]);
    assert_eq!(tickets.update(&conn, &update).await.unwrap(), 1);
    let row: TicketRow = t.query().first(&conn).await.unwrap();
    assert!(row.resolved);
    assert_eq!(row.priority, None);

    assert_eq!(tickets.delete(&conn, &update).await.unwrap(), 1);
    let err = t.query().first_values(&conn).await.unwrap_err();
    assert!(matches!(err, SchemaError::NotFound));
}

#[tokio::test]
async fn test_query_filters_and_ordering() {
    let conn = create_test_connection().await;
    let tickets = synced::<TicketV1>(&conn).await;
    for (user, priority) in [("alice", 1), ("bob", 4), ("carol", 2), ("alice", 5)] {
        tickets.insert(&conn, &ticket_row(user, priority)).await.unwrap();
    }

    let t = tickets.instance();
    let priority = t.field("priority").unwrap();
    let rows: Vec<TicketRow> = t
        .query()
        .filter(t.field("user_id").unwrap().starts_with("a"))
        .filter(priority.gt(2))
        .all(&conn)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].priority, Some(5));

    let rows = t
        .query()
        .select([t.field("user_id").unwrap()])
        .filter(priority.in_list([1, 2, 4]))
        .desc(priority.clone())
        .limit(2)
        .all_string_map(&conn)
        .await
        .unwrap();
    let users: Vec<_> = rows
        .iter()
        .map(|r| r["user_id"].clone().unwrap_or_default())
        .collect();
    assert_eq!(users, vec!["bob", "carol"]);

    let user = t.field("user_id").unwrap();
    let grouped = t
        .query()
        .select([user.clone(), functions::count("tickets")])
        .group_by(user.clone())
        .asc(user)
        .all_values(&conn)
        .await
        .unwrap();
    assert_eq!(grouped.len(), 3);
    assert_eq!(grouped[0]["user_id"], Value::Text("alice".to_string()));
    assert_eq!(grouped[0]["tickets"], Value::Text("2".to_string()));

    let none = t.query().filter(priority.in_list(Vec::<i32>::new()));
    assert_eq!(none.count(&conn).await.unwrap(), 0);
}

#[tokio::test]
async fn test_regexp_filter_and_paged_union() {
    let conn = create_test_connection().await;
    let tickets = synced::<TicketV1>(&conn).await;
    for (user, priority) in [("alice", 1), ("bob", 4), ("anna", 2)] {
        tickets.insert(&conn, &ticket_row(user, priority)).await.unwrap();
    }

    let matched = tickets
        .query()
        .regexp("user_id", "^a")
        .unwrap()
        .count(&conn)
        .await
        .unwrap();
    assert_eq!(matched, 2);

    let top = tickets.instance();
    let named = tickets.instance();
    let union = Union::all([
        top.query()
            .select([top.field("user_id").unwrap()])
            .desc(top.field("priority").unwrap())
            .limit(1),
        named
            .query()
            .select([named.field("user_id").unwrap()])
            .equals("user_id", "alice")
            .unwrap(),
    ])
    .unwrap();
    let rows = union.query().all_string_map(&conn).await.unwrap();
    let mut users: Vec<_> = rows
        .iter()
        .map(|r| r["user_id"].clone().unwrap_or_default())
        .collect();
    users.sort();
    assert_eq!(users, vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_join_subquery_and_union() {
    let conn = create_test_connection().await;
    let tickets = synced::<TicketV1>(&conn).await;
    let agents = synced::<Agent>(&conn).await;
    for (user, priority) in [("alice", 1), ("bob", 4), ("alice", 5)] {
        tickets.insert(&conn, &ticket_row(user, priority)).await.unwrap();
    }
    for name in ["alice", "dave"] {
        agents
            .insert(&conn, &Row::from([("name".to_string(), Value::from(name))]))
            .await
            .unwrap();
    }

    let t = tickets.instance();
    let a = agents.instance();
    let joined = t
        .query()
        .select([t.field("id").unwrap(), a.field("status").unwrap()])
        .join(&a, t.field("user_id").unwrap().eq_field(&a.field("name").unwrap()))
        .asc(t.field("id").unwrap())
        .all_values(&conn)
        .await
        .unwrap();
    assert_eq!(joined.len(), 2);
    assert_eq!(joined[0]["status"], Value::Text("open".to_string()));

    let busy = t
        .query()
        .select([t.field("user_id").unwrap()])
        .filter(t.field("priority").unwrap().gt(2));
    let idle = a
        .query()
        .filter(a.field("name").unwrap().not_in_query(&busy))
        .count(&conn)
        .await
        .unwrap();
    assert_eq!(idle, 1);

    let names = Union::new([
        t.query().select([t.field("user_id").unwrap().label("who")]),
        a.query().select([a.field("name").unwrap().label("who")]),
    ])
    .unwrap();
    assert_eq!(names.query().count(&conn).await.unwrap(), 3);

    let all = Union::all([
        t.query().select([t.field("user_id").unwrap().label("who")]),
        a.query().select([a.field("name").unwrap().label("who")]),
    ])
    .unwrap();
    assert_eq!(all.query().count(&conn).await.unwrap(), 5);

    let sub = Query::new(busy.sub_query());
    let rows = sub.all_string_map(&conn).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_raw_connection_roundtrip() {
    let conn = create_test_connection().await;
    let affected = conn
        .execute("CREATE TABLE raw (v TEXT)", &[])
        .await
        .unwrap();
    assert_eq!(affected, 0);
    conn.execute("INSERT INTO raw (v) VALUES (?)", &[SqlValue::Text("x".to_string())])
        .await
        .unwrap();
    let rows = conn.fetch_rows("SELECT v FROM raw", &[]).await.unwrap();
    assert_eq!(rows[0]["v"].as_deref(), Some("x"));
}
