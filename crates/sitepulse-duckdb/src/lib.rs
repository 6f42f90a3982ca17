pub mod backend;
pub mod page_views;
pub mod schema;
pub mod sessions;
pub mod store_impl;
pub mod visitors;

pub use backend::DuckDbStore;

/// Re-export the `duckdb` crate so tests can use
/// `sitepulse_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
