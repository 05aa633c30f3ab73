//! Finalize target column names and primary key from a planned query and
//! optional user overrides.

use crate::core::schema::{DataType, ResolvedSchema};
use crate::error::{Result, TiviewError};

/// Columns and key of the target table after reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledSchema {
    pub column_names: Vec<String>,
    pub column_types: Vec<DataType>,
    pub primary_keys: Vec<String>,
}

/// Final column names: the override when given, else the query's own.
///
/// An override must name exactly as many columns as the query produces.
pub fn resolve_columns(
    query_columns: &[String],
    column_override: Option<&[String]>,
) -> Result<Vec<String>> {
    match column_override {
        None => Ok(query_columns.to_vec()),
        Some(names) if names.len() == query_columns.len() => Ok(names.to_vec()),
        Some(names) => Err(TiviewError::Config(format!(
            "Mismatched size of column names: query produces {} columns {:?}, got {} names {:?}",
            query_columns.len(),
            query_columns,
            names.len(),
            names
        ))),
    }
}

/// Final primary key: the override, else the key inferred from the query,
/// else the first final column.
///
/// The result is non-empty and every element is one of `final_columns`.
pub fn resolve_primary_keys(
    query_primary_key: Option<&[String]>,
    pk_override: Option<&[String]>,
    final_columns: &[String],
) -> Result<Vec<String>> {
    let keys = match (pk_override, query_primary_key) {
        (Some(keys), _) => keys.to_vec(),
        (None, Some(keys)) if !keys.is_empty() => keys.to_vec(),
        _ => final_columns.first().cloned().into_iter().collect(),
    };

    if keys.is_empty() {
        return Err(TiviewError::Config("primary key can't be empty".to_string()));
    }

    if let Some(missing) = keys.iter().find(|k| !final_columns.contains(k)) {
        return Err(TiviewError::Config(format!(
            "primary key column '{}' is not one of the target columns {:?}",
            missing, final_columns
        )));
    }

    Ok(keys)
}

/// Reconcile a planned schema with the user's overrides.
///
/// Column types always come from the planned schema. A key inferred from the
/// query is named by query columns, so under a column override it is
/// translated to the override name at the same position.
pub fn reconcile(
    schema: &ResolvedSchema,
    column_override: Option<&[String]>,
    pk_override: Option<&[String]>,
) -> Result<ReconciledSchema> {
    let query_columns = schema.column_names();
    let column_names = resolve_columns(&query_columns, column_override)?;

    let inferred = schema
        .primary_key
        .as_ref()
        .map(|keys| translate_keys(keys, &query_columns, &column_names));

    let primary_keys = resolve_primary_keys(inferred.as_deref(), pk_override, &column_names)?;

    Ok(ReconciledSchema {
        column_names,
        column_types: schema.column_types(),
        primary_keys,
    })
}

fn translate_keys(keys: &[String], from: &[String], to: &[String]) -> Vec<String> {
    keys.iter()
        .map(|key| match from.iter().position(|c| c == key) {
            Some(idx) => to[idx].clone(),
            None => key.clone(),
        })
        .collect()
}
