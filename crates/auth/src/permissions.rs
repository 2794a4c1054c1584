use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog;

/// Permission identifier of the shape `"<resource>:<action>"` (e.g. `orders:write`).
///
/// The evaluator treats permissions as opaque tokens; only the catalog knows the
/// taxonomy. Values built through [`Permission::parse`] or deserialization are
/// guaranteed to be catalog entries, so stale grants cannot be written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(Cow<'static, str>);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("malformed permission '{0}' (expected lowercase 'resource:action')")]
    Malformed(String),

    #[error("unknown permission '{0}'")]
    Unknown(String),
}

impl Permission {
    /// Build a permission from a compile-time constant. Only used by the catalog.
    pub(crate) const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Parse and validate a permission string against the catalog.
    pub fn parse(raw: &str) -> Result<Self, PermissionError> {
        let (resource, action) = split(raw).ok_or_else(|| PermissionError::Malformed(raw.to_string()))?;
        match catalog::lookup(resource, action) {
            Some(known) => Ok(known),
            None => Err(PermissionError::Unknown(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resource(&self) -> &str {
        self.as_str().split_once(':').map(|(r, _)| r).unwrap_or_default()
    }

    pub fn action(&self) -> &str {
        self.as_str().split_once(':').map(|(_, a)| a).unwrap_or_default()
    }
}

fn split(raw: &str) -> Option<(&str, &str)> {
    let (resource, action) = raw.split_once(':')?;
    let well_formed = |part: &str| {
        !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c == '_')
    };
    (well_formed(resource) && well_formed(action)).then_some((resource, action))
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Permission {
    type Error = PermissionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.0.into_owned()
    }
}

/// Explicit grant set carried by a membership.
///
/// Ordering and duplicates are meaningless, so this is a set; it serializes as a
/// sorted list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate every raw string; the first unknown or malformed entry rejects the whole set.
    pub fn parse_all<I, S>(raw: I) -> Result<Self, PermissionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter()
            .map(|s| Permission::parse(s.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn remove(&mut self, permission: &Permission) -> bool {
        self.0.remove(permission)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|p| p.as_str().to_string()).collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
