//! Destination store: TiDB table gateway, DDL generation and type mapping.

mod mysql;
pub mod typemap;

pub use mysql::MysqlGateway;

use std::collections::HashSet;

use crate::core::identifier::{qualify, quote};
use crate::core::schema::DataType;
use crate::error::{Result, TiviewError};

/// Check that columns, types and primary key describe a valid table.
pub fn validate_table_shape(
    column_names: &[String],
    column_types: &[DataType],
    primary_keys: &[String],
) -> Result<()> {
    if column_names.is_empty() {
        return Err(TiviewError::Config("a table needs at least one column".to_string()));
    }
    if column_names.len() != column_types.len() {
        return Err(TiviewError::Config(format!(
            "got {} column names but {} column types",
            column_names.len(),
            column_types.len()
        )));
    }

    let mut seen = HashSet::new();
    for name in column_names {
        if !seen.insert(name.as_str()) {
            return Err(TiviewError::Config(format!(
                "duplicate column name '{}'",
                name
            )));
        }
    }

    if primary_keys.is_empty() {
        return Err(TiviewError::Config("primary key can't be empty".to_string()));
    }
    if let Some(missing) = primary_keys.iter().find(|k| !seen.contains(k.as_str())) {
        return Err(TiviewError::Config(format!(
            "primary key column '{}' is not a column of the table",
            missing
        )));
    }

    Ok(())
}

/// Generate `CREATE TABLE` DDL for TiDB.
///
/// Key columns are always `NOT NULL`; other columns keep the engine's
/// nullability.
pub fn create_table_ddl(
    database: &str,
    table: &str,
    column_names: &[String],
    column_types: &[DataType],
    primary_keys: &[String],
    if_not_exists: bool,
) -> Result<String> {
    validate_table_shape(column_names, column_types, primary_keys)?;

    let mut col_defs = Vec::with_capacity(column_names.len() + 1);
    for (name, data_type) in column_names.iter().zip(column_types) {
        let is_key = primary_keys.contains(name);
        let target_type = typemap::tidb_type(name, data_type, is_key);
        let null_clause = if is_key || !data_type.nullable {
            " NOT NULL"
        } else {
            ""
        };
        col_defs.push(format!("{} {}{}", quote(name)?, target_type, null_clause));
    }

    let pk_cols = primary_keys
        .iter()
        .map(|k| quote(k))
        .collect::<Result<Vec<_>>>()?;
    col_defs.push(format!("PRIMARY KEY ({})", pk_cols.join(", ")));

    Ok(format!(
        "CREATE TABLE {}{} (\n    {}\n)",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        qualify(database, table)?,
        col_defs.join(",\n    ")
    ))
}
