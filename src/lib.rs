//! Static file server for single page applications.
//!
//! Files are served from a site directory through a chain of handlers:
//! gzip compression wrapping a not-found redirect wrapping the file server,
//! so client-side routes resolve to the application entry point.

pub mod config;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;
pub mod version;
