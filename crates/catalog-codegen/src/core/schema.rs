//! Normalized schema model for catalog tables, columns and foreign keys.
//!
//! A [`Schema`] is built once per namespace by the introspector and treated as
//! read-only afterwards. Table and column order is catalog order.

use serde::{Deserialize, Serialize};

use crate::typemap::SemanticType;

/// Ordered set of tables in one namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Namespace the tables were read from.
    pub namespace: String,

    /// Tables in catalog order.
    pub tables: Vec<Table>,

    /// Non-fatal findings (unrecognized native types).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Schema {
    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Table names in catalog order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,

    /// Primary key column names in key order.
    pub primary_key: Vec<String>,

    /// Foreign key constraints.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary key columns in key order.
    pub fn pk_columns(&self) -> Vec<&Column> {
        self.primary_key
            .iter()
            .filter_map(|name| self.column(name))
            .collect()
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Native catalog type (udt name, e.g. "int4", "varchar", "_text").
    pub native_type: String,

    /// Mapped semantic type.
    pub semantic_type: SemanticType,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Member of the primary key.
    pub is_primary_key: bool,

    /// Member of at least one foreign key.
    pub is_foreign_key: bool,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,

    /// Column default expression, verbatim from the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Maximum character length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i32>,

    /// Numeric precision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i32>,

    /// Numeric scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<i32>,
}

/// Foreign key metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,

    /// Source column names.
    pub columns: Vec<String>,

    /// Referenced schema name.
    pub ref_schema: String,

    /// Referenced table name.
    pub ref_table: String,

    /// Referenced column names.
    pub ref_columns: Vec<String>,

    /// ON DELETE action.
    pub on_delete: String,

    /// ON UPDATE action.
    pub on_update: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_column(name: &str, native: &str, pk: bool) -> Column {
        Column {
            name: name.to_string(),
            native_type: native.to_string(),
            semantic_type: crate::typemap::map_native(native, native),
            is_nullable: !pk,
            is_primary_key: pk,
            is_foreign_key: false,
            ordinal_pos: 1,
            default: None,
            max_length: None,
            precision: None,
            scale: None,
        }
    }

    fn make_test_table() -> Table {
        Table {
            schema: "public".to_string(),
            name: "users".to_string(),
            columns: vec![
                make_test_column("id", "int4", true),
                make_test_column("name", "text", false),
            ],
            primary_key: vec!["id".to_string()],
            foreign_keys: vec![],
        }
    }

    #[test]
    fn test_table_helpers() {
        let table = make_test_table();
        assert_eq!(table.full_name(), "public.users");
        assert!(table.has_pk());
        assert_eq!(table.pk_columns().len(), 1);
        assert_eq!(table.column("name").map(|c| c.native_type.as_str()), Some("text"));
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn test_schema_lookup_preserves_order() {
        let mut second = make_test_table();
        second.name = "accounts".to_string();
        let schema = Schema {
            namespace: "public".to_string(),
            tables: vec![make_test_table(), second],
            warnings: vec![],
        };
        assert_eq!(schema.table_names(), vec!["users", "accounts"]);
        assert!(schema.table("accounts").is_some());
    }

    #[test]
    fn test_schema_json_omits_empty_warnings() {
        let schema = Schema {
            namespace: "public".to_string(),
            tables: vec![make_test_table()],
            warnings: vec![],
        };
        let json = serde_json::to_string(&schema).unwrap();
        assert!(!json.contains("warnings"));
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
    }
}
