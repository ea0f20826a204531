//! SQLite connectivity shared by schema introspection and query execution

pub mod connection;
pub mod value;

pub use connection::{open_read_only, open_read_write, quote_ident, table_exists};
pub use value::{row_to_map, value_to_json};
