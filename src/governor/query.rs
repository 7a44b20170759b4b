//! Parsed query representation accepted by the governor.
//!
//! A document is a tree of field selections. Argument values are plain
//! JSON; a string of the form `$name` refers to the request variable
//! `name`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request variables, keyed by name without the `$`.
pub type Variables = BTreeMap<String, Value>;

/// One field selection and everything nested under it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, Value>,
    /// Whether the field resolves to a list
    #[serde(default)]
    pub list: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selections: Vec<Selection>,
}

impl Selection {
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A list-valued field.
    pub fn list(name: impl Into<String>) -> Self {
        Self {
            list: true,
            ..Self::field(name)
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn select(mut self, child: Selection) -> Self {
        self.selections.push(child);
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.selections.is_empty()
    }

    /// Introspection meta-fields (`__schema`, `__type`). `__typename` is
    /// an ordinary cheap field.
    pub fn is_introspection(&self) -> bool {
        self.name == "__schema" || self.name == "__type"
    }

    fn normalize(&mut self) {
        self.alias = None;
        for child in &mut self.selections {
            child.normalize();
        }
        self.selections.sort_by_cached_key(|s| {
            serde_json::to_string(s).unwrap_or_default()
        });
    }
}

/// A whole query: the top-level selection set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub selections: Vec<Selection>,
}

impl QueryDocument {
    pub fn new(selections: Vec<Selection>) -> Self {
        Self {
            operation_name: None,
            selections,
        }
    }

    pub fn named(name: impl Into<String>, selections: Vec<Selection>) -> Self {
        Self {
            operation_name: Some(name.into()),
            selections,
        }
    }

    /// Same shape with aliases and the operation name dropped and sibling
    /// selections in a fixed order. Two documents that cost the same to
    /// execute normalize to the same value.
    pub fn normalized(&self) -> QueryDocument {
        let mut doc = self.clone();
        doc.operation_name = None;
        for sel in &mut doc.selections {
            sel.normalize();
        }
        doc.selections
            .sort_by_cached_key(|s| serde_json::to_string(s).unwrap_or_default());
        doc
    }
}
