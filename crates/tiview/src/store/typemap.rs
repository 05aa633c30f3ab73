//! Mapping from engine logical types to TiDB column types.

use tracing::warn;

use crate::core::schema::{DataType, TypeKind};

/// Longest `VARCHAR` usable in a primary key (3072-byte index limit, utf8mb4).
pub const KEY_VARCHAR_LENGTH: u32 = 768;

/// Longest `VARBINARY` usable in a primary key.
pub const KEY_VARBINARY_LENGTH: u32 = 3072;

/// Longest `VARCHAR` before falling back to a text type.
const MAX_INLINE_VARCHAR: u32 = 16383;

/// Longest `VARBINARY` before falling back to a blob type.
const MAX_INLINE_VARBINARY: u32 = 65535;

const MAX_DECIMAL_PRECISION: u8 = 65;
const MAX_DECIMAL_SCALE: u8 = 30;
const MAX_FRACTIONAL_SECONDS: u8 = 6;

/// Map an engine type to a TiDB column type.
///
/// Key columns must be indexable, so unbounded strings and byte strings are
/// given the longest length an index accepts instead of a text/blob type.
pub fn tidb_type(column: &str, data_type: &DataType, is_key: bool) -> String {
    match data_type.kind {
        TypeKind::Boolean => "BOOLEAN".to_string(),
        TypeKind::TinyInt => "TINYINT".to_string(),
        TypeKind::SmallInt => "SMALLINT".to_string(),
        TypeKind::Int => "INT".to_string(),
        TypeKind::BigInt => "BIGINT".to_string(),
        TypeKind::Float => "FLOAT".to_string(),
        TypeKind::Double => "DOUBLE".to_string(),

        TypeKind::Decimal { precision, scale } => {
            let precision = precision.clamp(1, MAX_DECIMAL_PRECISION);
            let scale = scale.min(MAX_DECIMAL_SCALE).min(precision);
            format!("DECIMAL({},{})", precision, scale)
        }

        TypeKind::Char(n) if n <= 255 => format!("CHAR({})", n),
        TypeKind::Char(n) | TypeKind::Varchar(n) => {
            if is_key {
                format!("VARCHAR({})", key_length(column, n, KEY_VARCHAR_LENGTH))
            } else if n <= MAX_INLINE_VARCHAR {
                format!("VARCHAR({})", n)
            } else {
                "LONGTEXT".to_string()
            }
        }

        TypeKind::Binary(n) if n <= 255 => format!("BINARY({})", n),
        TypeKind::Binary(n) | TypeKind::Varbinary(n) => {
            if is_key {
                format!("VARBINARY({})", key_length(column, n, KEY_VARBINARY_LENGTH))
            } else if n <= MAX_INLINE_VARBINARY {
                format!("VARBINARY({})", n)
            } else {
                "LONGBLOB".to_string()
            }
        }

        TypeKind::Date => "DATE".to_string(),
        TypeKind::Time(p) => format!("TIME({})", p.min(MAX_FRACTIONAL_SECONDS)),
        TypeKind::Timestamp(p) => format!("DATETIME({})", p.min(MAX_FRACTIONAL_SECONDS)),
        TypeKind::TimestampLtz(p) => format!("TIMESTAMP({})", p.min(MAX_FRACTIONAL_SECONDS)),
    }
}

fn key_length(column: &str, declared: u32, limit: u32) -> u32 {
    if declared > limit {
        warn!(
            "Key column '{}' declared with length {}, truncating to {} for indexing",
            column, declared, limit
        );
        limit
    } else {
        declared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::MAX_VARCHAR_LENGTH;

    fn map(kind: TypeKind) -> String {
        tidb_type("c", &DataType::nullable(kind), false)
    }

    fn map_key(kind: TypeKind) -> String {
        tidb_type("c", &DataType::not_null(kind), true)
    }

    #[test]
    fn test_numeric_types() {
        assert_eq!(map(TypeKind::Boolean), "BOOLEAN");
        assert_eq!(map(TypeKind::Int), "INT");
        assert_eq!(map(TypeKind::BigInt), "BIGINT");
        assert_eq!(map(TypeKind::Double), "DOUBLE");
        assert_eq!(
            map(TypeKind::Decimal {
                precision: 38,
                scale: 18
            }),
            "DECIMAL(38,18)"
        );
    }

    #[test]
    fn test_decimal_clamped_to_tidb_limits() {
        assert_eq!(
            map(TypeKind::Decimal {
                precision: 76,
                scale: 38
            }),
            "DECIMAL(65,30)"
        );
    }

    #[test]
    fn test_string_types() {
        assert_eq!(map(TypeKind::Char(10)), "CHAR(10)");
        assert_eq!(map(TypeKind::Char(1000)), "VARCHAR(1000)");
        assert_eq!(map(TypeKind::Varchar(255)), "VARCHAR(255)");
        assert_eq!(map(TypeKind::Varchar(MAX_VARCHAR_LENGTH)), "LONGTEXT");
    }

    #[test]
    fn test_key_strings_stay_indexable() {
        assert_eq!(map_key(TypeKind::Varchar(MAX_VARCHAR_LENGTH)), "VARCHAR(768)");
        assert_eq!(map_key(TypeKind::Varchar(64)), "VARCHAR(64)");
        assert_eq!(
            map_key(TypeKind::Varbinary(MAX_VARCHAR_LENGTH)),
            "VARBINARY(3072)"
        );
    }

    #[test]
    fn test_binary_types() {
        assert_eq!(map(TypeKind::Binary(16)), "BINARY(16)");
        assert_eq!(map(TypeKind::Varbinary(100)), "VARBINARY(100)");
        assert_eq!(map(TypeKind::Varbinary(MAX_VARCHAR_LENGTH)), "LONGBLOB");
    }

    #[test]
    fn test_datetime_types() {
        assert_eq!(map(TypeKind::Date), "DATE");
        assert_eq!(map(TypeKind::Time(0)), "TIME(0)");
        assert_eq!(map(TypeKind::Timestamp(3)), "DATETIME(3)");
        assert_eq!(map(TypeKind::Timestamp(9)), "DATETIME(6)");
        assert_eq!(map(TypeKind::TimestampLtz(3)), "TIMESTAMP(3)");
    }
}
