/// Re-export `Config` from `sitepulse-core`.
///
/// Environment parsing lives in core so integration tests can build a
/// config without the server.
pub use sitepulse_core::config::Config;
