//! Resource identifiers.
//!
//! An identifier names one object in the Graph API:
//!
//! ```text
//! ["v1.0" | "beta" "/"] <collection path> "/" <object key>
//! ```
//!
//! The collection path may itself contain slashes (`groups/X1/members`), so
//! the object key is everything after the *last* slash. A root-level
//! singleton such as `organization` has an empty collection path.

use std::{fmt, str::FromStr};

use crate::{api_version::ApiVersion, error::ParseError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    api_version: Option<ApiVersion>,
    collection: String,
    key: String,
}

impl ResourceId {
    /// Build the identifier of object `key` in `collection`.
    ///
    /// Leading and trailing slashes of the joined path are dropped, so an
    /// empty collection yields a root-level identifier.
    pub fn new(collection: &str, key: &str) -> ResourceId {
        let path = format!("{}/{}", collection, key);
        let (collection, key) = split_path(path.trim_matches('/'));
        ResourceId {
            api_version: None,
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }

    /// Parse a user-supplied identifier, e.g. for import.
    pub fn parse(text: &str) -> Result<ResourceId, ParseError> {
        let mut path = text.trim_matches('/');
        let mut api_version = None;

        let first = path.split('/').next().unwrap_or_default();
        if let Some(version) = ApiVersion::from_segment(first) {
            api_version = Some(version);
            path = path[first.len()..].trim_matches('/');
        }

        if path.is_empty() {
            return Err(ParseError::new(text, "the path is empty"));
        }

        let (collection, key) = split_path(path);
        if key.is_empty() {
            return Err(ParseError::new(text, "the object key is empty"));
        }

        Ok(ResourceId {
            api_version,
            collection: collection.to_string(),
            key: key.to_string(),
        })
    }

    /// The API version token the identifier was parsed with, if any.
    pub fn api_version(&self) -> Option<ApiVersion> {
        self.api_version
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The request path relative to the API version: `collection/key`.
    pub fn path(&self) -> String {
        if self.collection.is_empty() {
            self.key.clone()
        } else {
            format!("{}/{}", self.collection, self.key)
        }
    }

    /// The same identifier with `api_version` as its version token.
    pub fn with_api_version(&self, api_version: Option<ApiVersion>) -> ResourceId {
        ResourceId {
            api_version,
            ..self.clone()
        }
    }
}

fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(version) = self.api_version {
            write!(f, "{}/", version)?;
        }
        f.write_str(&self.path())
    }
}

impl FromStr for ResourceId {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceId::parse(s)
    }
}

impl serde::Serialize for ResourceId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ResourceId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
