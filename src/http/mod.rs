//! HTTP protocol layer module
//!
//! Protocol helpers shared by the file server and the interceptors:
//! content types, cache validators and response writers.

pub mod cache;
pub mod mime;
pub mod response;

pub use response::{
    build_405_response, build_health_response, build_options_response, write_error,
    write_not_found, write_redirect,
};
