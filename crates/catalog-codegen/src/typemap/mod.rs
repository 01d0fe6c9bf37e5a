//! Type mapping from PostgreSQL catalog types to semantic types.
//!
//! The lookup is a fixed table keyed by the catalog's udt name, with the SQL
//! spelling from `information_schema.columns.data_type` accepted as well.
//! Anything not in the table maps to [`SemanticType::Opaque`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Database-neutral column type used by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Json,
    Uuid,
    Array(Box<SemanticType>),
    /// Unrecognized native type; rendered as text.
    Opaque,
}

impl SemanticType {
    /// Stable name, e.g. `integer` or `array<text>`.
    pub fn name(&self) -> String {
        match self {
            SemanticType::Boolean => "boolean".into(),
            SemanticType::SmallInt => "smallint".into(),
            SemanticType::Integer => "integer".into(),
            SemanticType::BigInt => "bigint".into(),
            SemanticType::Real => "real".into(),
            SemanticType::Double => "double".into(),
            SemanticType::Numeric => "numeric".into(),
            SemanticType::Text => "text".into(),
            SemanticType::Bytes => "bytes".into(),
            SemanticType::Date => "date".into(),
            SemanticType::Time => "time".into(),
            SemanticType::Timestamp => "timestamp".into(),
            SemanticType::TimestampTz => "timestamptz".into(),
            SemanticType::Interval => "interval".into(),
            SemanticType::Json => "json".into(),
            SemanticType::Uuid => "uuid".into(),
            SemanticType::Array(inner) => format!("array<{}>", inner.name()),
            SemanticType::Opaque => "opaque".into(),
        }
    }

    /// Coarse category.
    pub fn category(&self) -> &'static str {
        match self {
            SemanticType::Boolean => "boolean",
            SemanticType::SmallInt | SemanticType::Integer | SemanticType::BigInt => "integer",
            SemanticType::Real | SemanticType::Double => "float",
            SemanticType::Numeric => "numeric",
            SemanticType::Text => "text",
            SemanticType::Bytes => "bytes",
            SemanticType::Date | SemanticType::Time => "date",
            SemanticType::Timestamp | SemanticType::TimestampTz | SemanticType::Interval => {
                "timestamp"
            }
            SemanticType::Json => "json",
            SemanticType::Uuid => "uuid",
            SemanticType::Array(_) => "array",
            SemanticType::Opaque => "opaque",
        }
    }

    /// Rust type emitted by the built-in templates (before `Option<..>` wrapping).
    pub fn rust_type(&self) -> String {
        match self {
            SemanticType::Boolean => "bool".into(),
            SemanticType::SmallInt => "i16".into(),
            SemanticType::Integer => "i32".into(),
            SemanticType::BigInt => "i64".into(),
            SemanticType::Real => "f32".into(),
            SemanticType::Double => "f64".into(),
            SemanticType::Numeric => "rust_decimal::Decimal".into(),
            SemanticType::Text | SemanticType::Interval | SemanticType::Opaque => "String".into(),
            SemanticType::Bytes => "Vec<u8>".into(),
            SemanticType::Date => "chrono::NaiveDate".into(),
            SemanticType::Time => "chrono::NaiveTime".into(),
            SemanticType::Timestamp => "chrono::NaiveDateTime".into(),
            SemanticType::TimestampTz => "chrono::DateTime<chrono::Utc>".into(),
            SemanticType::Json => "serde_json::Value".into(),
            SemanticType::Uuid => "uuid::Uuid".into(),
            SemanticType::Array(inner) => format!("Vec<{}>", inner.rust_type()),
        }
    }

    pub fn is_opaque(&self) -> bool {
        match self {
            SemanticType::Opaque => true,
            SemanticType::Array(inner) => inner.is_opaque(),
            _ => false,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Map a native catalog type to its semantic type.
///
/// `udt_name` is the internal name (`int4`, `_text`); `data_type` is the SQL
/// spelling (`integer`, `ARRAY`, `character varying`). Either may match.
pub fn map_native(udt_name: &str, data_type: &str) -> SemanticType {
    let udt = udt_name.trim().to_lowercase();
    let data_type = data_type.trim().to_lowercase();

    if let Some(elem) = udt.strip_prefix('_') {
        return SemanticType::Array(Box::new(lookup(elem).unwrap_or(SemanticType::Opaque)));
    }
    if let Some(elem) = data_type.strip_suffix("[]") {
        return SemanticType::Array(Box::new(lookup(elem).unwrap_or(SemanticType::Opaque)));
    }

    lookup(&udt)
        .or_else(|| lookup(&data_type))
        .unwrap_or(SemanticType::Opaque)
}

fn lookup(native: &str) -> Option<SemanticType> {
    let ty = match native {
        // Boolean
        "bool" | "boolean" => SemanticType::Boolean,

        // Integer types
        "int2" | "smallint" | "smallserial" => SemanticType::SmallInt,
        "int4" | "int" | "integer" | "serial" => SemanticType::Integer,
        "int8" | "bigint" | "bigserial" => SemanticType::BigInt,

        // Floating point
        "float4" | "real" => SemanticType::Real,
        "float8" | "double precision" => SemanticType::Double,

        // Decimal/numeric
        "numeric" | "decimal" | "money" => SemanticType::Numeric,

        // String types
        "text" | "varchar" | "character varying" | "char" | "character" | "bpchar" | "name"
        | "citext" | "xml" => SemanticType::Text,

        // Binary
        "bytea" => SemanticType::Bytes,

        // Date/time types
        "date" => SemanticType::Date,
        "time" | "timetz" | "time without time zone" | "time with time zone" => {
            SemanticType::Time
        }
        "timestamp" | "timestamp without time zone" => SemanticType::Timestamp,
        "timestamptz" | "timestamp with time zone" => SemanticType::TimestampTz,
        "interval" => SemanticType::Interval,

        // Documents
        "json" | "jsonb" => SemanticType::Json,

        // GUID
        "uuid" => SemanticType::Uuid,

        _ => return None,
    };
    Some(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_types() {
        assert_eq!(map_native("int4", "integer"), SemanticType::Integer);
        assert_eq!(map_native("int8", "bigint"), SemanticType::BigInt);
        assert_eq!(map_native("int2", "smallint"), SemanticType::SmallInt);
        assert_eq!(map_native("int4", "integer").category(), "integer");
    }

    #[test]
    fn test_string_types() {
        assert_eq!(map_native("varchar", "character varying"), SemanticType::Text);
        assert_eq!(map_native("bpchar", "character"), SemanticType::Text);
        assert_eq!(map_native("citext", "USER-DEFINED"), SemanticType::Text);
    }

    #[test]
    fn test_numeric_and_json() {
        assert_eq!(map_native("numeric", "numeric"), SemanticType::Numeric);
        assert_eq!(map_native("money", "money").rust_type(), "rust_decimal::Decimal");
        assert_eq!(map_native("jsonb", "jsonb"), SemanticType::Json);
    }

    #[test]
    fn test_datetime_types() {
        assert_eq!(map_native("timestamptz", "timestamp with time zone"), SemanticType::TimestampTz);
        assert_eq!(map_native("timestamp", "timestamp without time zone").category(), "timestamp");
        assert_eq!(map_native("date", "date"), SemanticType::Date);
    }

    #[test]
    fn test_sql_spelling_fallback() {
        assert_eq!(map_native("", "integer"), SemanticType::Integer);
        assert_eq!(map_native("", "Double Precision"), SemanticType::Double);
    }

    #[test]
    fn test_array_types() {
        let ty = map_native("_int4", "ARRAY");
        assert_eq!(ty, SemanticType::Array(Box::new(SemanticType::Integer)));
        assert_eq!(ty.name(), "array<integer>");
        assert_eq!(ty.rust_type(), "Vec<i32>");
        assert_eq!(map_native("", "text[]").category(), "array");
    }

    #[test]
    fn test_unknown_is_opaque() {
        let ty = map_native("geometry", "USER-DEFINED");
        assert_eq!(ty, SemanticType::Opaque);
        assert!(ty.is_opaque());
        assert_eq!(ty.rust_type(), "String");
        assert!(map_native("_geometry", "ARRAY").is_opaque());
    }
}
