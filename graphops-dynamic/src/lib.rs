//! Dynamic values for schema-less resources.
//!
//! A resource whose shape is only known to the remote service is carried
//! around as a [`Value`]: a plain tree of JSON-like nodes. This crate provides
//! the three operations the provider needs on such trees:
//!
//! - [`decode`] / [`Value::encode`]: the JSON codec. Numbers keep their exact
//!   decimal text, so large integer ids survive a round trip.
//! - [`merge`]: reconcile a server-observed value with the shape a user
//!   declared.
//! - [`semantically_equal`] and [`planned_value`]: ignore formatting-only
//!   differences when deciding whether a declared value changed.

mod equality;
mod merge;
mod value;

pub use equality::{planned_value, semantically_equal};
pub use merge::merge;
pub use value::{decode, DecodeError, Value};
