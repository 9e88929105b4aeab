//! The resource provider interface.
//!
//! A provider is an executable that receives exactly one request on its
//! standard input and answers with one response on its standard output.
//! Requests and responses are the JSON types in [`schema::v0`].
//! Implement [`framework::ResourceProvider`] and call
//! [`framework::run_main`] from `main` to get a working provider.

pub mod framework;
pub mod schema;
