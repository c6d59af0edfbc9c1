//! Database initialization and schema

pub mod init;

pub use init::{create_catalog_entries_table, init_database, init_in_memory, search_text};
