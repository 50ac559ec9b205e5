//! Typed, path-composable property accessors.
//!
//! A [`Key`] names one property of an entity type; a [`CompositeKey`] chains
//! keys across to-one relations. Composite reads are null-safe: an absent
//! intermediate relation short-circuits to NULL instead of failing.
//! Composite writes require every intermediate relation to exist unless the
//! caller explicitly opts into relation auto-creation.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::entity::SharedInstance;
use crate::error::Error;
use crate::meta::{DefaultValue, MetaModel};
use crate::value::{Value, ValueType};

/// How a key maps onto storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyKind {
    /// A plain column.
    Column {
        /// Part of the primary key.
        primary: bool,
        /// Accepts NULL.
        nullable: bool,
        /// VARCHAR length limit.
        max_length: Option<u32>,
    },
    /// A to-one relation stored as a foreign-key column.
    ToOne {
        /// Related entity name.
        target: String,
    },
    /// A lazy to-many relation; not a column.
    ToMany {
        /// Related entity name.
        target: String,
        /// Name of the to-one key on the related entity pointing back here.
        remote: String,
    },
}

#[derive(Debug)]
struct KeyInner {
    entity: String,
    name: String,
    value_type: ValueType,
    ordinal: usize,
    kind: KeyKind,
    default: Option<DefaultValue>,
}

/// A direct key: a typed, named accessor for one property of an entity type.
///
/// Keys are created by the metamodel from registered entity schemas and are
/// immutable afterwards. Cloning a key is cheap.
#[derive(Debug, Clone)]
pub struct Key {
    inner: Arc<KeyInner>,
}

impl Key {
    pub(crate) fn new(
        entity: impl Into<String>,
        name: impl Into<String>,
        value_type: ValueType,
        ordinal: usize,
        kind: KeyKind,
        default: Option<DefaultValue>,
    ) -> Self {
        Key {
            inner: Arc::new(KeyInner {
                entity: entity.into(),
                name: name.into(),
                value_type,
                ordinal,
                kind,
                default,
            }),
        }
    }

    /// Key name, unique within its entity.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Owning entity name.
    pub fn entity(&self) -> &str {
        &self.inner.entity
    }

    /// Declared value type.
    pub fn value_type(&self) -> ValueType {
        self.inner.value_type
    }

    /// Position within the entity's key declaration order.
    pub fn ordinal(&self) -> usize {
        self.inner.ordinal
    }

    /// Storage mapping of the key.
    pub fn kind(&self) -> &KeyKind {
        &self.inner.kind
    }

    /// Declared default value, if any.
    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.inner.default.as_ref()
    }

    /// Check for primary-key membership.
    pub fn is_primary(&self) -> bool {
        matches!(self.inner.kind, KeyKind::Column { primary: true, .. })
    }

    /// Check for a to-one relation key.
    pub fn is_to_one(&self) -> bool {
        matches!(self.inner.kind, KeyKind::ToOne { .. })
    }

    /// Check for a to-many relation key.
    pub fn is_to_many(&self) -> bool {
        matches!(self.inner.kind, KeyKind::ToMany { .. })
    }

    /// Related entity name for relation keys.
    pub fn target(&self) -> Option<&str> {
        match &self.inner.kind {
            KeyKind::ToOne { target } | KeyKind::ToMany { target, .. } => Some(target),
            KeyKind::Column { .. } => None,
        }
    }

    /// Compose with a key of the related entity type.
    pub fn add(&self, next: &Key) -> Result<CompositeKey, Error> {
        CompositeKey::from(self.clone()).add(next)
    }

    /// Read the key's value from an entity instance.
    pub fn read(&self, entity: &SharedInstance) -> Result<Value, Error> {
        entity.borrow().get(self)
    }

    /// Write the key's value on an entity instance.
    pub fn write(&self, entity: &SharedInstance, value: Value) -> Result<(), Error> {
        entity.borrow_mut().set(self, value)
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.inner.entity == other.inner.entity && self.inner.name == other.inner.name
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.entity.hash(state);
        self.inner.name.hash(state);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

/// An ordered, non-empty chain of keys traversing entity relations.
///
/// Every step except possibly the last targets an entity type. Equality is
/// structural over the step sequence and the owning entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    steps: Vec<Key>,
}

impl CompositeKey {
    /// Wrap a single direct key.
    pub fn from(key: Key) -> Self {
        CompositeKey { steps: vec![key] }
    }

    /// Append a key, preserving left-to-right step order.
    ///
    /// The current terminal step must be a to-one relation whose target
    /// entity owns `next`.
    pub fn add(mut self, next: &Key) -> Result<CompositeKey, Error> {
        let last = self.steps.last().ok_or_else(|| {
            Error::validation("a composite key must not have an empty path")
        })?;
        match last.target() {
            Some(target) if last.is_to_one() => {
                if target != next.entity() {
                    return Err(Error::validation(format!(
                        "cannot compose {}.{}: {} belongs to {}, not {}",
                        self, next, next, next.entity(), target
                    )));
                }
            }
            _ => {
                return Err(Error::validation(format!(
                    "cannot compose {}.{}: {} is not a to-one relation",
                    self,
                    next,
                    last.name()
                )));
            }
        }
        self.steps.push(next.clone());
        Ok(self)
    }

    /// Concatenate two composite paths.
    pub fn join(self, other: &CompositeKey) -> Result<CompositeKey, Error> {
        let mut joined = self;
        for step in &other.steps {
            joined = joined.add(step)?;
        }
        Ok(joined)
    }

    /// Steps in left-to-right order.
    pub fn steps(&self) -> &[Key] {
        &self.steps
    }

    /// Number of steps.
    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    /// First step.
    pub fn first(&self) -> &Key {
        &self.steps[0]
    }

    /// Terminal step.
    pub fn last(&self) -> &Key {
        &self.steps[self.steps.len() - 1]
    }

    /// Entity type the path starts from.
    pub fn entity(&self) -> &str {
        self.first().entity()
    }

    /// Check for a single-step path.
    pub fn is_direct(&self) -> bool {
        self.steps.len() == 1
    }

    /// Null-safe chained read.
    ///
    /// Traverses each step; an absent intermediate relation short-circuits
    /// to `Value::Null` rather than failing.
    pub fn read(&self, entity: &SharedInstance) -> Result<Value, Error> {
        let mut current = entity.clone();
        for step in &self.steps[..self.steps.len() - 1] {
            let value = current.borrow().get(step)?;
            match value {
                Value::Null => return Ok(Value::Null),
                Value::Entity(next) => current = next,
                other => {
                    return Err(Error::meta(format!(
                        "key {} holds {} where a relation was expected",
                        step, other
                    )));
                }
            }
        }
        let value = current.borrow().get(self.last())?;
        Ok(value)
    }

    /// Write through the path.
    ///
    /// Every intermediate relation must exist. With `auto_create`, each
    /// absent intermediate step is first materialized as a fresh default
    /// instance of its declared target type.
    pub fn write(
        &self,
        entity: &SharedInstance,
        value: Value,
        model: &MetaModel,
        auto_create: bool,
    ) -> Result<(), Error> {
        let mut current = entity.clone();
        for step in &self.steps[..self.steps.len() - 1] {
            let existing = current.borrow().get(step)?;
            match existing {
                Value::Entity(next) => current = next,
                Value::Null => {
                    if !auto_create {
                        return Err(Error::validation(format!(
                            "cannot write through {}: relation {} is absent \
                             and relation auto-creation was not requested",
                            self,
                            step.name()
                        )));
                    }
                    let target = step.target().ok_or_else(|| {
                        Error::meta(format!("key {} has no relation target", step))
                    })?;
                    let table = model.table(target)?;
                    let created = crate::entity::Instance::new_shared(table);
                    current
                        .borrow_mut()
                        .set(step, Value::Entity(created.clone()))?;
                    current = created;
                }
                other => {
                    return Err(Error::meta(format!(
                        "key {} holds {} where a relation was expected",
                        step, other
                    )));
                }
            }
        }
        // Bound before the tail expression: a borrow in the tail would
        // outlive `current`.
        let mut terminal = current.borrow_mut();
        terminal.set(self.last(), value)
    }
}

impl From<Key> for CompositeKey {
    fn from(key: Key) -> Self {
        CompositeKey::from(key)
    }
}

impl fmt::Display for CompositeKey {
    /// Dot-joined step names, used for diagnostics and default column paths.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(step.name())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Instance;
    use crate::meta::{EntitySchema, KeyDef, MetaModel, ModelConfig};
    use crate::value::ValueType;

    fn model() -> MetaModel {
        let model = MetaModel::new(ModelConfig::default());
        model
            .register(
                EntitySchema::new("ord_customer")
                    .key(KeyDef::primary("ID", ValueType::Int64))
                    .key(KeyDef::column("NAME", ValueType::String).nullable())
                    .key(
                        KeyDef::column("SCORE", ValueType::Int32)
                            .with_default(DefaultValue::Int32(0)),
                    )
                    .key(KeyDef::to_one("MOTHER", "ord_customer")),
            )
            .unwrap();
        model
    }

    #[test]
    fn test_composition_preserves_step_order() {
        let model = model();
        let mother = model.key("ord_customer", "MOTHER").unwrap();
        let name = model.key("ord_customer", "NAME").unwrap();

        let path = mother.add(&name).unwrap();
        assert_eq!(path.depth(), 2);
        assert_eq!(path.to_string(), "MOTHER.NAME");

        let path = mother.add(&mother).unwrap().add(&name).unwrap();
        assert_eq!(path.depth(), 3);
        assert_eq!(path.to_string(), "MOTHER.MOTHER.NAME");
    }

    #[test]
    fn test_composition_rejects_wrong_chaining() {
        let model = model();
        let name = model.key("ord_customer", "NAME").unwrap();
        // NAME is not a relation and cannot be extended.
        assert!(name.add(&name).is_err());
    }

    #[test]
    fn test_null_safe_composite_read() {
        let model = model();
        let table = model.table("ord_customer").unwrap();
        let orphan = Instance::new_shared(table);
        let path = model.path("ord_customer", &["MOTHER", "NAME"]).unwrap();

        // MOTHER is absent: the read short-circuits, never errors.
        assert_eq!(path.read(&orphan).unwrap(), Value::Null);

        let deep = model
            .path("ord_customer", &["MOTHER", "MOTHER", "NAME"])
            .unwrap();
        assert_eq!(deep.read(&orphan).unwrap(), Value::Null);
    }

    #[test]
    fn test_composite_write_requires_explicit_auto_create() {
        let model = model();
        let table = model.table("ord_customer").unwrap();
        let child = Instance::new_shared(table);
        let path = model.path("ord_customer", &["MOTHER", "NAME"]).unwrap();

        let err = path
            .write(&child, Value::from("Eve"), &model, false)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        path.write(&child, Value::from("Eve"), &model, true).unwrap();
        assert_eq!(path.read(&child).unwrap(), Value::from("Eve"));

        // The materialized relation is a real default instance: declared
        // defaults are applied, the primary key stays NULL.
        let mother_key = model.key("ord_customer", "MOTHER").unwrap();
        let score = model.key("ord_customer", "SCORE").unwrap();
        match mother_key.read(&child).unwrap() {
            Value::Entity(mother) => {
                assert!(mother.borrow().primary_key_value().is_null());
                assert_eq!(mother.borrow().get(&score).unwrap(), Value::Int32(0));
            }
            other => panic!("expected a relation instance, got {other}"),
        }
    }

    #[test]
    fn test_equality_is_structural() {
        let model = model();
        let mother = model.key("ord_customer", "MOTHER").unwrap();
        let name = model.key("ord_customer", "NAME").unwrap();

        let a = mother.add(&name).unwrap();
        let b = model.path("ord_customer", &["MOTHER", "NAME"]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, CompositeKey::from(name));
    }
}
