//! Core abstractions shared by the introspector and the generator:
//!
//! - [`schema`]: table, column and foreign-key metadata types
//! - [`traits`]: the metadata connector trait and its row/statistics types

pub mod schema;
pub mod traits;

pub use schema::{Column, ForeignKey, Schema, Table};
pub use traits::{CatalogRow, MetadataConnector, PoolStats};
