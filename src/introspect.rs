//! Schema discovery.
//!
//! Produces the textual description embedded verbatim into generation
//! prompts, so ordering is fixed: tables by name, columns by catalog
//! position. Introspecting an unchanged schema twice renders byte-identical
//! text.

use std::fmt::Write as _;

use sqlx::{MySqlPool, PgPool, Row, SqlitePool};

use crate::connect::{Database, MssqlClient};
use crate::error::IntrospectError;

/// Upper bound on tables included in a description. A catalog with
/// hundreds of tables would grow the prompt without bound; past the cap
/// the rendered text says so explicitly instead of silently dropping
/// tables.
pub const MAX_TABLES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

/// An ordered description of the connected database.
///
/// Immutable once built; the session rebuilds it only on reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    pub tables: Vec<TableSchema>,
    /// Table count before the cap was applied.
    pub total_tables: usize,
}

impl Schema {
    pub fn is_truncated(&self) -> bool {
        self.total_tables > self.tables.len()
    }

    /// Render the description exactly as it is embedded into prompts.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            let columns = table
                .columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.data_type))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "{} ({})", table.name, columns);
        }
        if self.is_truncated() {
            let _ = writeln!(
                out,
                "-- schema truncated: showing {} of {} tables",
                self.tables.len(),
                self.total_tables
            );
        }
        out
    }
}

/// Read the connected database's catalog into a [`Schema`].
pub async fn introspect(db: &mut Database) -> Result<Schema, IntrospectError> {
    let schema = match db {
        Database::Sqlite(pool) => introspect_sqlite(pool).await?,
        Database::Mysql(pool) => introspect_mysql(pool).await?,
        Database::Postgres(pool) => introspect_postgres(pool).await?,
        Database::Mssql(client) => introspect_mssql(client).await?,
    };
    tracing::debug!(
        tables = schema.total_tables,
        described = schema.tables.len(),
        "introspected schema"
    );
    Ok(schema)
}

fn driver(e: sqlx::Error) -> IntrospectError {
    IntrospectError::Driver(e.to_string())
}

async fn introspect_sqlite(pool: &SqlitePool) -> Result<Schema, IntrospectError> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .map_err(driver)?;

    let total_tables = names.len();
    let mut tables = Vec::new();
    for name in names.into_iter().take(MAX_TABLES) {
        // PRAGMA takes no bind parameters; quote the identifier by hand.
        let pragma = format!("PRAGMA table_info(\"{}\")", name.replace('"', "\"\""));
        let rows = sqlx::query(&pragma).fetch_all(pool).await.map_err(driver)?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(ColumnSchema {
                name: row.try_get::<String, _>("name").map_err(driver)?,
                data_type: row.try_get::<String, _>("type").map_err(driver)?,
            });
        }
        tables.push(TableSchema { name, columns });
    }

    Ok(Schema {
        tables,
        total_tables,
    })
}

const MYSQL_CATALOG: &str = "\
    SELECT CAST(c.table_name AS CHAR)  AS table_name, \
           CAST(c.column_name AS CHAR) AS column_name, \
           CAST(c.data_type AS CHAR)   AS data_type \
    FROM information_schema.columns c \
    JOIN information_schema.tables t \
      ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
    WHERE c.table_schema = DATABASE() AND t.table_type = 'BASE TABLE' \
    ORDER BY c.table_name, c.ordinal_position";

async fn introspect_mysql(pool: &MySqlPool) -> Result<Schema, IntrospectError> {
    let rows = sqlx::query_as::<_, (String, String, String)>(MYSQL_CATALOG)
        .fetch_all(pool)
        .await
        .map_err(driver)?;
    Ok(group_catalog_rows(rows))
}

const POSTGRES_CATALOG: &str = "\
    SELECT c.table_name::text, c.column_name::text, c.data_type::text \
    FROM information_schema.columns c \
    JOIN information_schema.tables t \
      ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
    WHERE c.table_schema = 'public' AND t.table_type = 'BASE TABLE' \
    ORDER BY c.table_name, c.ordinal_position";

async fn introspect_postgres(pool: &PgPool) -> Result<Schema, IntrospectError> {
    let rows = sqlx::query_as::<_, (String, String, String)>(POSTGRES_CATALOG)
        .fetch_all(pool)
        .await
        .map_err(driver)?;
    Ok(group_catalog_rows(rows))
}

const MSSQL_CATALOG: &str = "\
    SELECT c.TABLE_NAME, c.COLUMN_NAME, c.DATA_TYPE \
    FROM INFORMATION_SCHEMA.COLUMNS c \
    JOIN INFORMATION_SCHEMA.TABLES t \
      ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME \
    WHERE t.TABLE_TYPE = 'BASE TABLE' \
    ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION";

async fn introspect_mssql(client: &mut MssqlClient) -> Result<Schema, IntrospectError> {
    let tds = |e: tiberius::error::Error| IntrospectError::Driver(e.to_string());
    let rows = client
        .simple_query(MSSQL_CATALOG)
        .await
        .map_err(tds)?
        .into_first_result()
        .await
        .map_err(tds)?;

    let mut triples = Vec::with_capacity(rows.len());
    for row in rows {
        let table: &str = row.get(0).unwrap_or("");
        let column: &str = row.get(1).unwrap_or("");
        let data_type: &str = row.get(2).unwrap_or("");
        triples.push((table.to_string(), column.to_string(), data_type.to_string()));
    }
    Ok(group_catalog_rows(triples))
}

/// Fold `(table, column, type)` rows, already sorted by table then ordinal,
/// into tables, applying the cap.
fn group_catalog_rows(rows: Vec<(String, String, String)>) -> Schema {
    let mut tables: Vec<TableSchema> = Vec::new();
    for (table, column, data_type) in rows {
        let column = ColumnSchema {
            name: column,
            data_type,
        };
        match tables.last_mut() {
            Some(last) if last.name == table => last.columns.push(column),
            _ => tables.push(TableSchema {
                name: table,
                columns: vec![column],
            }),
        }
    }
    let total_tables = tables.len();
    tables.truncate(MAX_TABLES);
    Schema {
        tables,
        total_tables,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(name: &str, columns: &[(&str, &str)]) -> TableSchema {
        TableSchema {
            name: name.into(),
            columns: columns
                .iter()
                .map(|(n, t)| ColumnSchema {
                    name: (*n).into(),
                    data_type: (*t).into(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let schema = Schema {
            tables: vec![
                table("PATIENTS", &[("patient_id", "INTEGER"), ("first_name", "TEXT")]),
                table("VISITS", &[("visit_id", "INTEGER")]),
            ],
            total_tables: 2,
        };
        assert_eq!(schema.render(), schema.render());
        assert_eq!(
            schema.render(),
            "PATIENTS (patient_id INTEGER, first_name TEXT)\nVISITS (visit_id INTEGER)\n"
        );
    }

    #[test]
    fn test_render_tolerates_zero_columns() {
        let schema = Schema {
            tables: vec![table("EMPTY", &[])],
            total_tables: 1,
        };
        assert_eq!(schema.render(), "EMPTY ()\n");
    }

    #[test]
    fn test_render_notes_truncation() {
        let tables: Vec<TableSchema> = (0..MAX_TABLES)
            .map(|i| table(&format!("t{i:03}"), &[("id", "INTEGER")]))
            .collect();
        let schema = Schema {
            tables,
            total_tables: 200,
        };
        assert!(schema.is_truncated());
        assert!(schema
            .render()
            .ends_with("-- schema truncated: showing 64 of 200 tables\n"));
    }

    #[test]
    fn test_group_catalog_rows_caps_tables() {
        let rows: Vec<(String, String, String)> = (0..MAX_TABLES + 10)
            .map(|i| (format!("t{i:03}"), "id".to_string(), "int".to_string()))
            .collect();
        let schema = group_catalog_rows(rows);
        assert_eq!(schema.tables.len(), MAX_TABLES);
        assert_eq!(schema.total_tables, MAX_TABLES + 10);
    }

    #[test]
    fn test_group_catalog_rows_keeps_column_order() {
        let rows = vec![
            ("a".to_string(), "z_first".to_string(), "int".to_string()),
            ("a".to_string(), "a_second".to_string(), "text".to_string()),
        ];
        let schema = group_catalog_rows(rows);
        assert_eq!(schema.tables[0].columns[0].name, "z_first");
        assert_eq!(schema.tables[0].columns[1].name, "a_second");
    }
}
