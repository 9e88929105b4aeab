//! Manage arbitrary Microsoft Graph objects as graphops resources.
//!
//! The provider does not know the schema of the objects it manages. A
//! resource is a collection path plus a [`graphops_dynamic::Value`] of
//! properties; the provider POSTs, PATCHes, GETs and DELETEs it through the
//! Graph REST API and reconciles what the server reports with what the user
//! declared.
//!
//! - [`id`]: the opaque resource identifier, `[version/]collection/key`.
//! - [`rest`]: the REST layer, with retry-on-throttle as a transport wrapper.
//! - [`object`]: the create/read/update/delete/import/plan state machine.
//! - [`data`]: read-only data sources.
//! - [`provider`]: the [`graphops_resource::framework::ResourceProvider`]
//!   implementation tying it all together.

pub mod api_version;
pub mod config;
pub mod credentials;
pub mod data;
pub mod error;
pub mod id;
pub mod interrupt;
pub mod logging;
pub mod object;
pub mod provider;
pub mod rest;

pub use api_version::ApiVersion;
pub use error::{Error, Result};
