//! Core value types: conversation turns and per-call bindings.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{PrompterError, Result};

/// One conversation turn.
///
/// `content` is always serialized text, never a structured value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Role name as written in the template (`system`, `user`, ...).
    pub role: String,
    /// Serialized turn content.
    pub content: String,
}

impl Message {
    /// Create a new message.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.content)
    }
}

/// Keyword bindings supplied to a single call.
///
/// Keys are placeholder names; values are arbitrary JSON. A value that fails
/// to serialize is remembered and reported by [`Bindings::check`], which the
/// compiler runs before rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: BTreeMap<String, Value>,
    rejected: BTreeMap<String, String>,
}

impl Bindings {
    /// Empty binding set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding, consuming and returning `self`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a binding.
    ///
    /// A value that cannot be represented as JSON is not bound; the failure
    /// surfaces from [`Bindings::check`]. Use [`Bindings::try_insert`] to see
    /// it immediately.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Serialize) {
        let key = key.into();
        if let Err(reason) = self.bind(key.clone(), &value) {
            self.rejected.insert(key, reason);
        }
    }

    /// Insert or replace a binding, failing if `value` is not representable
    /// as JSON.
    ///
    /// # Errors
    /// Returns `PrompterError::Template` naming the key.
    pub fn try_insert(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let key = key.into();
        self.bind(key.clone(), &value)
            .map_err(|reason| rejected_binding(&key, &reason))
    }

    fn bind(&mut self, key: String, value: &impl Serialize) -> std::result::Result<(), String> {
        self.rejected.remove(&key);
        match serde_json::to_value(value) {
            Ok(value) => {
                self.values.insert(key, value);
                Ok(())
            }
            Err(e) => {
                self.values.remove(&key);
                Err(e.to_string())
            }
        }
    }

    /// Fail if any inserted value could not be serialized.
    ///
    /// # Errors
    /// Returns `PrompterError::Template` for the first rejected key.
    pub fn check(&self) -> Result<()> {
        match self.rejected.iter().next() {
            Some((key, reason)) => Err(rejected_binding(key, reason)),
            None => Ok(()),
        }
    }

    /// Build bindings from any value serializing to a JSON object
    /// (a struct, a map).
    ///
    /// # Errors
    /// Returns `PrompterError::Template` if `value` is not object-shaped.
    pub fn from_serialize(value: &impl Serialize) -> Result<Self> {
        match serde_json::to_value(value) {
            Ok(Value::Object(map)) => Ok(Self {
                values: map.into_iter().collect(),
                rejected: BTreeMap::new(),
            }),
            Ok(other) => Err(PrompterError::Template(format!(
                "bindings must serialize to an object, got {other}"
            ))),
            Err(e) => Err(PrompterError::Template(format!(
                "bindings could not be serialized: {e}"
            ))),
        }
    }

    /// Look up a binding.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no bindings are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate bindings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

fn rejected_binding(key: &str, reason: &str) -> PrompterError {
    PrompterError::Template(format!("binding '{key}' cannot be serialized: {reason}"))
}

impl Serialize for Bindings {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Bindings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        BTreeMap::deserialize(deserializer).map(|values| Self {
            values,
            rejected: BTreeMap::new(),
        })
    }
}

impl<K: Into<String>, V: Serialize> FromIterator<(K, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bindings = Self::new();
        for (key, value) in iter {
            bindings.insert(key, value);
        }
        bindings
    }
}
