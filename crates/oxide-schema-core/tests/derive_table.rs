//! Tests for the `#[derive(Table)]` macro output.
//!
//! These tests verify that the derive macro produces column declarations
//! that every backend turns into the expected table specification.

use oxide_schema_core::backend::{Backend, CLICKHOUSE, MYSQL, SQLITE};
use oxide_schema_core::columns::ColumnSpec;
use oxide_schema_core::table::{TableDecl, TableSpec};
use oxide_schema_core::{DeclarationError, TriState};
use oxide_schema_derive::Table;

// =============================================================================
// Test: Basic struct with default table name (snake_case)
// =============================================================================

#[allow(dead_code)]
#[derive(Table)]
pub struct UserAccount {
    #[column(primary, auto_increment)]
    pub id: u64,
    #[column(width = 64, nullable = false)]
    pub name: String,
    pub email: Option<String>,
    #[column(skip)]
    pub cached: Vec<u8>,
}

#[test]
fn test_default_table_name() {
    assert_eq!(UserAccount::NAME, "user_account");
}

#[test]
fn test_declarations_follow_field_order() {
    let decls = UserAccount::columns();
    let names: Vec<_> = decls.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["id", "name", "email"]);
    assert_eq!(decls[0].rust_type, "u64");
    assert!(!decls[0].is_pointer);
    assert_eq!(decls[2].rust_type, "String");
    assert!(decls[2].is_pointer);
}

#[test]
fn test_bare_tags_mean_true() {
    let decls = UserAccount::columns();
    assert_eq!(decls[0].tags.get("primary").map(String::as_str), Some("true"));
    assert_eq!(decls[0].tags.get("auto_increment").map(String::as_str), Some("true"));
    assert_eq!(decls[1].tags.get("width").map(String::as_str), Some("64"));
    assert_eq!(decls[1].tags.get("nullable").map(String::as_str), Some("false"));
}

#[test]
fn test_mysql_definitions() {
    let table = TableSpec::from_decl::<UserAccount>(&MYSQL).unwrap();
    let defs: Vec<_> = table
        .columns()
        .iter()
        .map(ColumnSpec::definition_string)
        .collect();
    assert_eq!(
        defs,
        [
            "`id` BIGINT(20) UNSIGNED NOT NULL AUTO_INCREMENT",
            "`name` VARCHAR(64) CHARACTER SET 'utf8mb4' COLLATE 'utf8mb4_unicode_ci' NOT NULL",
            "`email` TEXT CHARACTER SET 'utf8mb4' COLLATE 'utf8mb4_unicode_ci'",
        ]
    );
    assert_eq!(table.primary_key_names(), ["id"]);
}

#[test]
fn test_sqlite_definitions() {
    let table = TableSpec::from_decl::<UserAccount>(&SQLITE).unwrap();
    assert_eq!(
        table.create_sql(),
        ["CREATE TABLE IF NOT EXISTS `user_account` (\n    \
          `id` INTEGER PRIMARY KEY AUTOINCREMENT,\n    \
          `name` TEXT NOT NULL COLLATE NOCASE,\n    \
          `email` TEXT COLLATE NOCASE\n);"]
    );
}

// =============================================================================
// Test: Custom table name, renamed columns and indexes
// =============================================================================

#[allow(dead_code)]
#[derive(Table)]
#[table(name = "guest_tbl")]
pub struct Guest {
    #[column(primary, width = 36, charset = "ascii")]
    pub id: String,
    #[column(name = "TenantId", width = 36, charset = "ascii", index = "ix_guest_tenant_name")]
    pub tenant: String,
    #[column(width = 128, index = "ix_guest_tenant_name", unique_index)]
    pub name: String,
    #[column(default = 3)]
    pub visits: i32,
    pub enabled: Option<bool>,
    pub verified: TriState,
    pub tags: Vec<String>,
}

#[test]
fn test_name_tag_is_lowercased() {
    let table = TableSpec::from_decl::<Guest>(&SQLITE).unwrap();
    assert_eq!(table.name(), "guest_tbl");
    assert!(table.column("tenantid").is_some());
    assert!(table.column("tenant").is_none());
}

#[test]
fn test_index_tags() {
    let table = TableSpec::from_decl::<Guest>(&MYSQL).unwrap();
    let indexes = table.indexes();
    assert_eq!(indexes.len(), 2);
    assert_eq!(indexes[0].name(), "ix_guest_tenant_name");
    assert_eq!(indexes[0].columns(), ["tenantid", "name"]);
    assert!(!indexes[0].is_unique());
    assert_eq!(indexes[1].name(), "ix_guest_tbl_name");
    assert!(indexes[1].is_unique());

    let sql = table.create_sql();
    assert_eq!(sql.len(), 3);
    assert_eq!(
        sql[1],
        "CREATE INDEX `ix_guest_tenant_name` ON `guest_tbl` (`tenantid`, `name`);"
    );
    assert_eq!(
        sql[2],
        "CREATE UNIQUE INDEX `ix_guest_tbl_name` ON `guest_tbl` (`name`);"
    );
}

#[test]
fn test_column_kinds_per_backend() {
    let mysql = TableSpec::from_decl::<Guest>(&MYSQL).unwrap();
    assert_eq!(
        mysql.column("id").unwrap().definition_string(),
        "`id` VARCHAR(36) CHARACTER SET 'ascii' COLLATE 'ascii_general_ci' NOT NULL"
    );
    assert_eq!(mysql.column("visits").unwrap().definition_string(), "`visits` INT(11) DEFAULT 3");
    assert_eq!(mysql.column("enabled").unwrap().definition_string(), "`enabled` TINYINT");
    assert_eq!(mysql.column("verified").unwrap().definition_string(), "`verified` TINYINT");

    let clickhouse = TableSpec::from_decl::<Guest>(&CLICKHOUSE).unwrap();
    assert_eq!(
        clickhouse.column("visits").unwrap().definition_string(),
        "`visits` Nullable(Int32) DEFAULT 3"
    );
    assert_eq!(
        clickhouse.column("tags").unwrap().definition_string(),
        "`tags` Nullable(String)"
    );
}

#[test]
fn test_tristate_is_always_nullable() {
    let backends: [&'static dyn Backend; 3] = [&MYSQL, &SQLITE, &CLICKHOUSE];
    for backend in backends {
        let table = TableSpec::from_decl::<Guest>(backend).unwrap();
        assert!(table.column("verified").unwrap().is_nullable(), "{}", backend.name());
    }
}

// =============================================================================
// Test: Declaration errors
// =============================================================================

#[allow(dead_code)]
#[derive(Table)]
pub struct BadBoolDefault {
    #[column(primary)]
    pub id: i64,
    #[column(default = true)]
    pub flag: bool,
}

#[allow(dead_code)]
#[derive(Table)]
pub struct OptionalBoolDefault {
    #[column(primary)]
    pub id: i64,
    #[column(default = true)]
    pub flag: Option<bool>,
}

#[allow(dead_code)]
#[derive(Table)]
pub struct BadWidth {
    #[column(width = "wide")]
    pub name: String,
}

#[test]
fn test_non_pointer_bool_cannot_default_to_true() {
    let err = TableSpec::from_decl::<BadBoolDefault>(&MYSQL).unwrap_err();
    assert!(matches!(err, DeclarationError::DefaultNotAllowed { .. }));
}

#[test]
fn test_optional_bool_may_default_to_true() {
    let table = TableSpec::from_decl::<OptionalBoolDefault>(&MYSQL).unwrap();
    assert_eq!(
        table.column("flag").unwrap().definition_string(),
        "`flag` TINYINT DEFAULT 1"
    );
}

#[test]
fn test_malformed_width_is_rejected() {
    let err = TableSpec::from_decl::<BadWidth>(&SQLITE).unwrap_err();
    assert!(matches!(err, DeclarationError::InvalidTag { .. }));
}
