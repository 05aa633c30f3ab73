//! Schema types shared by the query engine, the reconciler and the store.
//!
//! [`DataType`] mirrors the logical types a streaming SQL engine reports for
//! planned queries. [`ResolvedSchema`] is what planning a query yields, and
//! [`TargetTable`] is the finalized shape of the destination table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TiviewError};

/// Length used by the engine for `STRING` (`VARCHAR(2147483647)`).
pub const MAX_VARCHAR_LENGTH: u32 = i32::MAX as u32;

/// Engine logical type without nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal { precision: u8, scale: u8 },
    Char(u32),
    Varchar(u32),
    Binary(u32),
    Varbinary(u32),
    Date,
    Time(u8),
    Timestamp(u8),
    TimestampLtz(u8),
}

impl TypeKind {
    /// Whether this is a character string type.
    pub fn is_string(&self) -> bool {
        matches!(self, TypeKind::Char(_) | TypeKind::Varchar(_))
    }

    /// Whether this is a binary string type.
    pub fn is_binary(&self) -> bool {
        matches!(self, TypeKind::Binary(_) | TypeKind::Varbinary(_))
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Boolean => write!(f, "BOOLEAN"),
            TypeKind::TinyInt => write!(f, "TINYINT"),
            TypeKind::SmallInt => write!(f, "SMALLINT"),
            TypeKind::Int => write!(f, "INT"),
            TypeKind::BigInt => write!(f, "BIGINT"),
            TypeKind::Float => write!(f, "FLOAT"),
            TypeKind::Double => write!(f, "DOUBLE"),
            TypeKind::Decimal { precision, scale } => {
                write!(f, "DECIMAL({}, {})", precision, scale)
            }
            TypeKind::Char(n) => write!(f, "CHAR({})", n),
            TypeKind::Varchar(n) if *n == MAX_VARCHAR_LENGTH => write!(f, "STRING"),
            TypeKind::Varchar(n) => write!(f, "VARCHAR({})", n),
            TypeKind::Binary(n) => write!(f, "BINARY({})", n),
            TypeKind::Varbinary(n) if *n == MAX_VARCHAR_LENGTH => write!(f, "BYTES"),
            TypeKind::Varbinary(n) => write!(f, "VARBINARY({})", n),
            TypeKind::Date => write!(f, "DATE"),
            TypeKind::Time(p) => write!(f, "TIME({})", p),
            TypeKind::Timestamp(p) => write!(f, "TIMESTAMP({})", p),
            TypeKind::TimestampLtz(p) => write!(f, "TIMESTAMP_LTZ({})", p),
        }
    }
}

/// Engine logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub kind: TypeKind,
    pub nullable: bool,
}

impl DataType {
    /// A nullable type of the given kind.
    pub fn nullable(kind: TypeKind) -> Self {
        Self {
            kind,
            nullable: true,
        }
    }

    /// A `NOT NULL` type of the given kind.
    pub fn not_null(kind: TypeKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    /// Parse an engine type string such as `DECIMAL(38, 18) NOT NULL`.
    ///
    /// Time attribute markers (`*ROWTIME*`, `*PROCTIME*`) are ignored.
    /// Composite types (ARRAY, MAP, ROW, MULTISET) cannot be stored in a
    /// relational column and are rejected with a query error.
    pub fn parse(input: &str) -> Result<Self> {
        let mut text = input.trim().to_uppercase();
        if let Some(idx) = text.find('*') {
            text.truncate(idx);
        }
        let mut text = text.trim().to_string();

        let mut nullable = true;
        if let Some(stripped) = text.strip_suffix("NOT NULL") {
            nullable = false;
            text = stripped.trim_end().to_string();
        } else if let Some(stripped) = text.strip_suffix("NULL") {
            text = stripped.trim_end().to_string();
        }

        let kind = parse_kind(&text)
            .ok_or_else(|| TiviewError::Query(format!("unsupported column type '{}'", input)))?;

        Ok(Self { kind, nullable })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} NOT NULL", self.kind)
        }
    }
}

/// Split `NAME(a, b)` into `NAME` and its numeric arguments.
fn split_args(text: &str) -> Option<(&str, Vec<u32>)> {
    match text.find('(') {
        None => Some((text.trim(), Vec::new())),
        Some(open) => {
            let close = text.rfind(')')?;
            if close < open {
                return None;
            }
            let args = text[open + 1..close]
                .split(',')
                .map(|a| a.trim().parse::<u32>().ok())
                .collect::<Option<Vec<_>>>()?;
            let suffix = text[close + 1..].trim();
            if !suffix.is_empty() {
                // e.g. TIMESTAMP(3) WITH LOCAL TIME ZONE
                if suffix == "WITH LOCAL TIME ZONE" && text[..open].trim() == "TIMESTAMP" {
                    return Some(("TIMESTAMP_LTZ", args));
                }
                if suffix == "WITHOUT TIME ZONE" {
                    return Some((text[..open].trim(), args));
                }
                return None;
            }
            Some((text[..open].trim(), args))
        }
    }
}

fn parse_kind(text: &str) -> Option<TypeKind> {
    let text = match text {
        "TIMESTAMP WITH LOCAL TIME ZONE" => "TIMESTAMP_LTZ",
        "TIMESTAMP WITHOUT TIME ZONE" => "TIMESTAMP",
        other => other,
    };
    let (name, args) = split_args(text)?;
    let arg = |idx: usize, default: u32| args.get(idx).copied().unwrap_or(default);

    let kind = match name {
        "BOOLEAN" | "BOOL" => TypeKind::Boolean,
        "TINYINT" => TypeKind::TinyInt,
        "SMALLINT" => TypeKind::SmallInt,
        "INT" | "INTEGER" => TypeKind::Int,
        "BIGINT" => TypeKind::BigInt,
        "FLOAT" | "REAL" => TypeKind::Float,
        "DOUBLE" | "DOUBLE PRECISION" => TypeKind::Double,
        "DECIMAL" | "DEC" | "NUMERIC" => TypeKind::Decimal {
            precision: u8::try_from(arg(0, 10)).ok()?,
            scale: u8::try_from(arg(1, 0)).ok()?,
        },
        "CHAR" => TypeKind::Char(arg(0, 1)),
        "VARCHAR" => TypeKind::Varchar(arg(0, 1)),
        "STRING" => TypeKind::Varchar(MAX_VARCHAR_LENGTH),
        "BINARY" => TypeKind::Binary(arg(0, 1)),
        "VARBINARY" => TypeKind::Varbinary(arg(0, 1)),
        "BYTES" => TypeKind::Varbinary(MAX_VARCHAR_LENGTH),
        "DATE" => TypeKind::Date,
        "TIME" => TypeKind::Time(u8::try_from(arg(0, 0)).ok()?),
        "TIMESTAMP" => TypeKind::Timestamp(u8::try_from(arg(0, 6)).ok()?),
        "TIMESTAMP_LTZ" => TypeKind::TimestampLtz(u8::try_from(arg(0, 6)).ok()?),
        _ => return None,
    };
    Some(kind)
}

/// A named, typed output column of a planned query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Logical type.
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Output schema of a planned declarative query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSchema {
    /// Ordered output columns.
    pub columns: Vec<Column>,

    /// Primary key inferred by the planner, in query column names.
    pub primary_key: Option<Vec<String>>,
}

impl ResolvedSchema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            primary_key: None,
        }
    }

    /// Attach an inferred primary key.
    pub fn with_primary_key<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Ordered column names.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Ordered column types.
    pub fn column_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Qualified `(database, table)` path of a destination table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TablePath {
    pub database: String,
    pub table: String,
}

impl TablePath {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// Split a single- or two-part table reference (`table` or `db.table`).
///
/// Returns `(database, table)`; the database is `None` for a bare table name.
pub fn split_table_reference(reference: &str) -> Result<(Option<String>, String)> {
    let parts: Vec<&str> = reference.split('.').map(str::trim).collect();
    match parts.as_slice() {
        [table] if !table.is_empty() => Ok((None, table.to_string())),
        [database, table] if !database.is_empty() && !table.is_empty() => {
            Ok((Some(database.to_string()), table.to_string()))
        }
        _ => Err(TiviewError::Config(format!(
            "target table must be 'table' or 'database.table', got '{}'",
            reference
        ))),
    }
}

/// Finalized destination table: path, columns, types and primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetTable {
    pub path: TablePath,
    pub columns: Vec<String>,
    pub column_types: Vec<DataType>,
    pub primary_key: Vec<String>,
}
