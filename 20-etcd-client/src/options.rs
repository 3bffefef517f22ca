//! Typed query options and the per-operation allow-lists.
//!
//! Options are checked before anything touches the network: an unknown name
//! or a value of the wrong type is a construction error.

use std::collections::BTreeMap;
use std::fmt;

use url::form_urlencoded;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    Uint,
    String,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl OptionKind {
    fn name(self) -> &'static str {
        match self {
            OptionKind::Bool => "boolean",
            OptionKind::Uint => "unsigned integer",
            OptionKind::String => "string",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    Uint(u64),
    String(String),
}

impl OptionValue {
    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::Bool(_) => OptionKind::Bool,
            OptionValue::Uint(_) => OptionKind::Uint,
            OptionValue::String(_) => OptionKind::String,
        }
    }

    fn encode(&self) -> String {
        match self {
            OptionValue::Bool(value) => value.to_string(),
            OptionValue::Uint(value) => value.to_string(),
            OptionValue::String(value) => value.clone(),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<u64> for OptionValue {
    fn from(value: u64) -> Self {
        OptionValue::Uint(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::String(value)
    }
}

/// Named query options for one call. Encoded in sorted name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    values: BTreeMap<String, OptionValue>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Validates against `allowed` and renders `?name=value&...`.
    ///
    /// Returns an empty string for an empty option set.
    pub fn to_query(&self, allowed: &AllowList) -> Result<String> {
        if self.values.is_empty() {
            return Ok(String::new());
        }

        let mut query = form_urlencoded::Serializer::new(String::new());
        for (name, value) in &self.values {
            let expected = allowed.kind_of(name).ok_or_else(|| Error::InvalidOption {
                operation: allowed.operation,
                name: name.clone(),
            })?;
            if value.kind() != expected {
                return Err(Error::InvalidOptionType {
                    name: name.clone(),
                    expected: expected.name(),
                });
            }
            query.append_pair(name, &value.encode());
        }
        Ok(format!("?{}", query.finish()))
    }
}

impl<K, V> FromIterator<(K, V)> for Options
where
    K: Into<String>,
    V: Into<OptionValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut options = Options::new();
        for (name, value) in iter {
            options.insert(name, value);
        }
        options
    }
}

/// Immutable table of the options one operation accepts.
#[derive(Debug)]
pub struct AllowList {
    operation: &'static str,
    entries: &'static [(&'static str, OptionKind)],
}

impl AllowList {
    pub fn kind_of(&self, name: &str) -> Option<OptionKind> {
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, kind)| *kind)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }
}

pub static GET_OPTIONS: AllowList = AllowList {
    operation: "GET",
    entries: &[
        ("recursive", OptionKind::Bool),
        ("consistent", OptionKind::Bool),
        ("sorted", OptionKind::Bool),
        ("wait", OptionKind::Bool),
        ("waitIndex", OptionKind::Uint),
    ],
};

pub static PUT_OPTIONS: AllowList = AllowList {
    operation: "PUT",
    entries: &[
        ("prevValue", OptionKind::String),
        ("prevIndex", OptionKind::Uint),
        ("prevExist", OptionKind::Bool),
    ],
};

pub static POST_OPTIONS: AllowList = AllowList {
    operation: "POST",
    entries: &[],
};

pub static DELETE_OPTIONS: AllowList = AllowList {
    operation: "DELETE",
    entries: &[("recursive", OptionKind::Bool)],
};
