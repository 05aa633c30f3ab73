//! Identifier validation and quoting for generated TiDB statements.
//!
//! Table and column names cannot be bound as statement parameters, so every
//! identifier that ends up in generated DDL or in the engine's `INSERT INTO`
//! target goes through [`quote`] or [`qualify`]. The engine's SQL dialect
//! uses the same backtick quoting, so a quoted path is valid on both sides.

use crate::error::{Result, TiviewError};

/// Maximum identifier length accepted by TiDB.
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Validate an identifier.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers longer than [`MAX_IDENTIFIER_LENGTH`] characters.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TiviewError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(TiviewError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    let chars = name.chars().count();
    if chars > MAX_IDENTIFIER_LENGTH {
        return Err(TiviewError::Config(format!(
            "Identifier exceeds maximum length of {} characters (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH, chars, name
        )));
    }

    Ok(())
}

/// Quote an identifier using backticks.
///
/// Backticks inside the name are doubled.
///
/// ```ignore
/// assert_eq!(quote("users")?, "`users`");
/// assert_eq!(quote("table`name")?, "`table``name`");
/// ```
pub fn quote(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Qualify a table name with its database: `` `db`.`table` ``.
pub fn qualify(database: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote(database)?, quote(table)?))
}
