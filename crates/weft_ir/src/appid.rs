//! Application identifiers.
//!
//! An [`AppId`] names a sub-module instance, service instance, or builtin
//! within its parent's scope. Chaining them from the root gives an
//! [`AppIdPath`], the address external tooling uses to find an instance.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A human-readable name with an optional index, unique within its scope.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct AppId {
    /// The free-form name.
    pub name: String,
    /// Optional index, for arrays of similar instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

impl AppId {
    /// Creates an unindexed AppID.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
        }
    }

    /// Creates an indexed AppID, displayed `name[index]`.
    pub fn indexed(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index: Some(index),
        }
    }

    /// Returns `true` if the name is non-empty and free of the characters used
    /// by the path syntax (`.`, `[`, `]`) and whitespace.
    pub fn is_well_formed(&self) -> bool {
        !self.name.is_empty()
            && !self
                .name
                .chars()
                .any(|c| c == '.' || c == '[' || c == ']' || c.is_whitespace())
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{}]", self.name, i),
            None => write!(f, "{}", self.name),
        }
    }
}

impl From<&str> for AppId {
    fn from(name: &str) -> Self {
        AppId::new(name)
    }
}

/// A path of AppIDs from the root instance, displayed dot-separated.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
pub struct AppIdPath(Vec<AppId>);

impl AppIdPath {
    /// A path with a single segment.
    pub fn root(id: AppId) -> Self {
        Self(vec![id])
    }

    /// Returns this path extended by one segment.
    pub fn child(&self, id: AppId) -> Self {
        let mut segments = self.0.clone();
        segments.push(id);
        Self(segments)
    }

    /// Returns the segments from the root.
    pub fn segments(&self) -> &[AppId] {
        &self.0
    }

    /// Returns the last segment.
    pub fn leaf(&self) -> Option<&AppId> {
        self.0.last()
    }

    /// Returns the number of segments.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if `self` is `other` or one of its ancestors.
    pub fn is_prefix_of(&self, other: &AppIdPath) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for AppIdPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}
