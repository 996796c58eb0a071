//! Wire model of a normalized response and its keyed entity index.
//!
//! Conventions of the platform's graph payloads:
//! - every referencable entity carries its key in `entityUrn`,
//! - `$type` names the entity kind,
//! - a field holding a reference (or a list of references) is prefixed
//!   with `*`, e.g. `"*from": "urn:member:2"`.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One record of a normalized response.
///
/// Top-level `elements` and side-loaded `included` entries share this shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "entityUrn", default, deserialize_with = "lenient_key")]
    pub key: String,
    #[serde(
        rename = "$type",
        default,
        deserialize_with = "lenient_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub entity_type: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A key that is missing, null or not a string decodes as empty.
fn lenient_key<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_type<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(lenient_key(deserializer)?).filter(|t| !t.is_empty()))
}

impl Entity {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    pub fn i64_field(&self, name: &str) -> Option<i64> {
        self.field(name).and_then(Value::as_i64)
    }

    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.field(name).and_then(Value::as_bool)
    }

    /// Text that may be sent either as a plain string or as `{ "text": .. }`.
    pub fn text_field(&self, name: &str) -> Option<&str> {
        match self.field(name)? {
            Value::String(s) => Some(s),
            Value::Object(obj) => obj.get("text").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Key held by a single-reference field (`*name`, or a bare string in
    /// `name` for payloads that skip the prefix).
    pub fn reference(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&format!("*{}", name))
            .or_else(|| self.fields.get(name))
            .and_then(Value::as_str)
    }

    /// Keys held by a list-reference field, in payload order.
    pub fn references(&self, name: &str) -> Vec<&str> {
        self.fields
            .get(&format!("*{}", name))
            .or_else(|| self.fields.get(name))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// A flat, cross-referenced API payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    #[serde(default)]
    pub elements: Vec<Entity>,
    #[serde(default)]
    pub included: Vec<Entity>,
}

impl NormalizedResponse {
    /// Decode a payload in either of the two envelopes the platform uses:
    /// `{ elements, included }`, or `{ data: { elements | *elements }, included }`
    /// where `*elements` lists keys of entities in `included`.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let mut root = match value {
            Value::Object(root) => root,
            other => return serde_json::from_value(other),
        };

        let Some(Value::Object(mut data)) = root.remove("data") else {
            return serde_json::from_value(Value::Object(root));
        };

        let included: Vec<Entity> = match root.remove("included") {
            Some(v) => serde_json::from_value(v)?,
            None => Vec::new(),
        };

        let elements = if let Some(inline) = data.remove("elements") {
            serde_json::from_value(inline)?
        } else if let Some(Value::Array(keys)) = data.remove("*elements") {
            let index = EntityIndex::build(&included);
            keys.iter()
                .filter_map(Value::as_str)
                .filter_map(|key| index.get(key).cloned())
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self { elements, included })
    }

    pub fn index(&self) -> EntityIndex<'_> {
        EntityIndex::build(&self.included)
    }
}

/// Key → entity lookup over the `included` list of one response.
///
/// Built in a single pass; every lookup afterwards is O(1). Entities without
/// a key cannot be referenced and are skipped. When a key repeats, the later
/// entity wins.
#[derive(Debug, Default)]
pub struct EntityIndex<'a> {
    by_key: HashMap<&'a str, &'a Entity>,
}

impl<'a> EntityIndex<'a> {
    pub fn build(included: &'a [Entity]) -> Self {
        let mut by_key = HashMap::with_capacity(included.len());
        for entity in included {
            if !entity.key.is_empty() {
                by_key.insert(entity.key.as_str(), entity);
            }
        }
        Self { by_key }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&'a Entity> {
        self.by_key.get(key).copied()
    }

    /// Follow a single-reference field of `entity`.
    pub fn resolve(&self, entity: &Entity, field: &str) -> Option<&'a Entity> {
        entity.reference(field).and_then(|key| self.get(key))
    }

    /// Follow a list-reference field, keeping position: unresolved keys
    /// yield `None` in their slot.
    pub fn resolve_slots(&self, entity: &Entity, field: &str) -> Vec<Option<&'a Entity>> {
        entity
            .references(field)
            .into_iter()
            .map(|key| self.get(key))
            .collect()
    }

    /// Follow a list-reference field, dropping unresolved keys.
    pub fn resolve_all(&self, entity: &Entity, field: &str) -> Vec<&'a Entity> {
        self.resolve_slots(entity, field).into_iter().flatten().collect()
    }
}
