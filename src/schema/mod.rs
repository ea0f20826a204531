//! Schema catalog: introspection, descriptors and the published snapshot

pub mod catalog;
pub mod mock;
pub mod source;
pub mod types;

pub use catalog::SchemaCatalog;
pub use mock::{mock_setup_script, mock_table_ddl};
pub use source::{ColumnDescriptionRow, SchemaSource, SqliteSchemaSource, TableDescriptionRow};
pub use types::{ColumnDescriptor, ForeignKey, SchemaSnapshot, TableDescriptor};
