//! Demo tables and the walkthrough run by `oxide-schema demo`.

use chrono::Utc;
use oxide_schema_core::backend::Backend;
use oxide_schema_core::dml::Row;
use oxide_schema_core::query::functions;
use oxide_schema_core::table::TableSpec;
use oxide_schema_core::{Condition, Connection, Union, Value};
use oxide_schema_derive::Table;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Stored as JSON text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Compound {
    pub id: String,
    pub age: i32,
}

#[derive(Table)]
#[table(name = "testtable")]
pub struct TestTable {
    #[column(primary, width = 128, charset = "ascii", nullable = false)]
    pub id: String,
    #[column(primary, width = 64, charset = "utf8")]
    pub name: String,
    #[column(width = 10, charset = "ascii")]
    pub gender: String,
    #[column(default = 18)]
    pub age: u8,
    #[column(nullable = false)]
    pub info: serde_json::Value,
    #[column(width = 1024)]
    pub compound: Option<Compound>,
    #[column(
        nullable = false,
        created_at,
        clickhouse_partition_by = "toYYYYMM(created_at)"
    )]
    pub created_at: chrono::NaiveDateTime,
    #[column(nullable = false, updated_at)]
    pub updated_at: chrono::NaiveDateTime,
    #[column(default = 0, nullable = false, auto_version)]
    pub version: i32,
    pub deleted_at: Option<chrono::NaiveDateTime>,
    #[column(nullable = false, default = false)]
    pub deleted: bool,
    #[column(width = 32, default = "default notes")]
    pub notes: String,
}

#[derive(Table)]
#[table(name = "ticket_tbl")]
pub struct Ticket {
    #[column(auto_increment)]
    pub id: i64,
    #[column(width = 128, charset = "ascii", nullable = false)]
    pub user_id: String,
    #[column(nullable = false)]
    pub date: chrono::NaiveDateTime,
}

#[derive(Table)]
#[table(name = "age_tbl")]
pub struct AgentTable {
    #[column(primary, width = 128, charset = "ascii")]
    pub user_id: String,
    pub age: i32,
}

/// The demo tables bound to `backend`, in creation order.
///
/// # Errors
///
/// Returns the first declaration the backend rejects.
pub fn tables(backend: &'static dyn Backend) -> oxide_schema_core::Result<Vec<TableSpec>> {
    Ok(vec![
        TableSpec::from_decl::<TestTable>(backend)?,
        TableSpec::from_decl::<AgentTable>(backend)?,
        TableSpec::from_decl::<Ticket>(backend)?,
    ])
}

fn row<const N: usize>(entries: [(&str, Value); N]) -> Row {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Joins, subqueries, DML and a union over the demo tables. Expects the
/// tables to be in sync already.
///
/// # Errors
///
/// Propagates query and driver errors.
pub async fn run<C: Connection>(
    conn: &C,
    backend: &'static dyn Backend,
) -> oxide_schema_core::Result<()> {
    let test_spec = TableSpec::from_decl::<TestTable>(backend)?;
    let agent_spec = TableSpec::from_decl::<AgentTable>(backend)?;
    let ticket_spec = TableSpec::from_decl::<Ticket>(backend)?;
    let t1 = test_spec.instance();
    let t2 = agent_spec.instance();
    let t3 = ticket_spec.instance();

    let q = t1
        .query()
        .select([t1.field("id")?, t2.field("age")?])
        .join(
            &t2,
            Condition::all([
                t1.field("id")?.eq_field(&t2.field("user_id")?),
                t2.field("age")?.gt_eq(20),
            ]),
        )
        .filter(t1.field("id")?.like("123%"))
        .limit(10)
        .asc(t2.field("age")?);
    let (sql, params) = q.to_sql()?;
    println!("{sql}");
    println!("{params:?}");

    let subq = q.sub_query();
    let q2 = subq.query().desc(subq.field("id")?);
    let (sql, params) = q2.to_sql()?;
    println!("{sql}");
    println!("{params:?}");

    let id = format!("{:032x}", Utc::now().timestamp_nanos_opt().unwrap_or_default());
    let compound = Compound {
        id: "123456".to_string(),
        age: 24,
    };
    let inserted = test_spec
        .insert(
            conn,
            &row([
                ("id", Value::from(id.as_str())),
                ("name", Value::from("Test")),
                ("gender", Value::from("male")),
                ("deleted", Value::Bool(true)),
                ("info", Value::from(serde_json::json!({ "name": "Test" }))),
                ("compound", Value::from(serde_json::to_value(&compound)?)),
            ]),
        )
        .await?;
    info!(rows = inserted, id = %id, "Inserted test row");

    ticket_spec
        .insert(
            conn,
            &row([
                ("user_id", Value::from(id.as_str())),
                ("date", Value::DateTime(Utc::now().naive_utc())),
            ]),
        )
        .await?;

    println!("Count: {}", q.count(conn).await?);
    println!("Count: {}", q2.count(conn).await?);

    let recent = t1
        .query()
        .desc(t1.field("created_at")?)
        .is_not_empty("info")?
        .is_not_null("compound")?
        .limit(10);
    for values in recent.all_string_map(conn).await? {
        println!("{values:?}");
    }

    let before = recent.first_values(conn).await?;
    println!("Before update: {before:?}");

    let mut update = before.clone();
    update.insert("age".to_string(), Value::UInt(10));
    update.insert(
        "compound".to_string(),
        Value::from(serde_json::to_value(Compound {
            id: "998822333".to_string(),
            age: 80,
        })?),
    );
    update.remove("updated_at");
    if let Err(err) = test_spec.update(conn, &update).await {
        warn!(error = %err, "Update failed");
    }

    let by_id = t1.query().equals("id", before["id"].to_string())?;
    println!("After update: {:?}", by_id.first_values(conn).await?);

    let bumped = by_id.filter(t1.field("version")?.gt(0)).all_values(conn).await?;
    info!(rows = bumped.len(), "Rows with a bumped version");

    let union = Union::all([
        t1.query().select([t1.field("id")?]),
        t3.query().select([functions::cast(&t3.field("id")?, "TEXT", "id")]),
    ])?;
    let ids = union.query();
    let (sql, _) = ids.to_sql()?;
    println!("{sql}");
    for values in ids.all_string_map(conn).await? {
        println!("{values:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_schema_core::backend::{CLICKHOUSE, MYSQL, SQLITE};

    #[test]
    fn demo_tables_declare_on_every_backend() {
        let backends: [&'static dyn Backend; 3] = [&MYSQL, &SQLITE, &CLICKHOUSE];
        for backend in backends {
            let specs = tables(backend).unwrap();
            assert_eq!(specs.len(), 3);
            assert_eq!(specs[0].primary_key_names(), vec!["id", "name"]);
        }
    }

    #[test]
    fn compound_column_is_text() {
        let specs = tables(&SQLITE).unwrap();
        let sql = specs[0].create_sql().join("\n");
        assert!(sql.contains("`compound` TEXT COLLATE NOCASE"));
        assert!(sql.contains("`notes` TEXT DEFAULT 'default notes' COLLATE NOCASE"));
        assert!(sql.contains("PRIMARY KEY (`id`, `name`)"));
    }
}
