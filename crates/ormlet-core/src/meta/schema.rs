//! Entity declaration surface.
//!
//! Application code declares, per entity type, an ordered set of keys with
//! name, value type and annotations. The declaration order establishes each
//! key's ordinal index.

use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueType};

/// Default value for a key, materialized into every fresh instance.
///
/// A closed scalar set: relation keys and binary columns take no default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// String value.
    String(String),
    /// Timestamp (microseconds since Unix epoch).
    Timestamp(i64),
}

impl DefaultValue {
    /// Materialize the declared default as a runtime value.
    pub fn to_value(&self) -> Value {
        match self {
            DefaultValue::Bool(v) => Value::Bool(*v),
            DefaultValue::Int32(v) => Value::Int32(*v),
            DefaultValue::Int64(v) => Value::Int64(*v),
            DefaultValue::Float64(v) => Value::Float64(*v),
            DefaultValue::String(v) => Value::String(v.clone()),
            DefaultValue::Timestamp(v) => Value::Timestamp(*v),
        }
    }

    pub(crate) fn value_type(&self) -> ValueType {
        match self {
            DefaultValue::Bool(_) => ValueType::Bool,
            DefaultValue::Int32(_) => ValueType::Int32,
            DefaultValue::Int64(_) => ValueType::Int64,
            DefaultValue::Float64(_) => ValueType::Float64,
            DefaultValue::String(_) => ValueType::String,
            DefaultValue::Timestamp(_) => ValueType::Timestamp,
        }
    }
}

/// An ordered entity type declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Entity (table) name, unique within the model.
    pub name: String,
    /// Explicit table alias; defaults to the name plus the configured suffix.
    pub alias: Option<String>,
    /// Key declarations in ordinal order.
    pub keys: Vec<KeyDef>,
}

/// One key declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDef {
    /// Key (column) name.
    pub name: String,
    /// Declared value type.
    pub value_type: ValueType,
    /// Primary-key membership.
    pub primary: bool,
    /// Accepts NULL.
    pub nullable: bool,
    /// VARCHAR length limit.
    pub max_length: Option<u32>,
    /// Default value if not written before the first flush.
    pub default: Option<DefaultValue>,
    /// Part of a unique index.
    pub unique: bool,
    /// Related entity name for relation keys.
    pub target: Option<String>,
    /// For to-many keys, the to-one key on the related entity pointing back.
    pub remote: Option<String>,
    /// Lazy one-to-many relation.
    pub to_many: bool,
}

impl EntitySchema {
    /// Start a declaration.
    pub fn new(name: impl Into<String>) -> Self {
        EntitySchema {
            name: name.into(),
            alias: None,
            keys: Vec::new(),
        }
    }

    /// Set an explicit table alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Append a key declaration.
    pub fn key(mut self, key: KeyDef) -> Self {
        self.keys.push(key);
        self
    }

    /// Find a declaration by name.
    pub fn get(&self, name: &str) -> Option<&KeyDef> {
        self.keys.iter().find(|k| k.name == name)
    }
}

impl KeyDef {
    /// Declare a primary-key column.
    pub fn primary(name: impl Into<String>, value_type: ValueType) -> Self {
        KeyDef {
            name: name.into(),
            value_type,
            primary: true,
            nullable: false,
            max_length: None,
            default: None,
            unique: false,
            target: None,
            remote: None,
            to_many: false,
        }
    }

    /// Declare a plain column.
    pub fn column(name: impl Into<String>, value_type: ValueType) -> Self {
        KeyDef {
            name: name.into(),
            value_type,
            primary: false,
            nullable: false,
            max_length: None,
            default: None,
            unique: false,
            target: None,
            remote: None,
            to_many: false,
        }
    }

    /// Declare a to-one relation stored as a foreign-key column.
    pub fn to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        KeyDef {
            name: name.into(),
            value_type: ValueType::Entity,
            primary: false,
            nullable: true,
            max_length: None,
            default: None,
            unique: false,
            target: Some(target.into()),
            remote: None,
            to_many: false,
        }
    }

    /// Declare a lazy one-to-many relation.
    ///
    /// `remote` names the to-one key on the related entity pointing back to
    /// this one; the relation resolves through a session query scoped by the
    /// owning instance's primary key.
    pub fn to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        remote: impl Into<String>,
    ) -> Self {
        KeyDef {
            name: name.into(),
            value_type: ValueType::Entity,
            primary: false,
            nullable: true,
            max_length: None,
            default: None,
            unique: false,
            target: Some(target.into()),
            remote: Some(remote.into()),
            to_many: true,
        }
    }

    /// Mark the column nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Set a VARCHAR length limit.
    pub fn max_length(mut self, limit: u32) -> Self {
        self.max_length = Some(limit);
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark the column as part of a unique index.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_builder_preserves_order() {
        let schema = EntitySchema::new("ord_order")
            .key(KeyDef::primary("ID", ValueType::Int64))
            .key(KeyDef::column("NOTE", ValueType::String).max_length(128))
            .key(KeyDef::to_one("CUSTOMER", "ord_customer"));

        assert_eq!(schema.keys.len(), 3);
        assert_eq!(schema.keys[0].name, "ID");
        assert!(schema.keys[0].primary);
        assert_eq!(schema.keys[1].max_length, Some(128));
        assert_eq!(schema.keys[2].target.as_deref(), Some("ord_customer"));
        assert!(schema.get("NOTE").is_some());
        assert!(schema.get("missing").is_none());
    }

    #[test]
    fn test_default_and_unique_annotations() {
        let key = KeyDef::column("SCORE", ValueType::Int32)
            .with_default(DefaultValue::Int32(10))
            .unique();
        assert_eq!(key.default, Some(DefaultValue::Int32(10)));
        assert!(key.unique);
        assert_eq!(
            DefaultValue::String("n/a".into()).to_value(),
            Value::String("n/a".into())
        );
    }

    #[test]
    fn test_to_many_declaration() {
        let key = KeyDef::to_many("ITEMS", "ord_item", "ORDER");
        assert!(key.to_many);
        assert_eq!(key.remote.as_deref(), Some("ORDER"));
    }
}
