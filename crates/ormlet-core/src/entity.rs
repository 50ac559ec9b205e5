//! Dynamic entity instances.
//!
//! An [`Instance`] is an ordinal-indexed record of one entity, described by
//! its frozen [`MetaTable`]. Instances are shared within a session as
//! [`SharedInstance`] handles; the session's identity map guarantees at most
//! one live instance per primary key.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::Error;
use crate::key::{Key, KeyKind};
use crate::meta::{DefaultValue, MetaTable};
use crate::value::{Value, ValueType};

/// Shared handle to an entity instance within one session.
pub type SharedInstance = Rc<RefCell<Instance>>;

/// One entity record, indexed by key ordinal.
#[derive(Debug)]
pub struct Instance {
    table: Arc<MetaTable>,
    values: Vec<Value>,
    /// Ordinals of keys written since the last flush.
    dirty: BTreeSet<usize>,
}

impl Instance {
    /// Create a fresh default instance: declared defaults applied, every
    /// other key NULL, nothing dirty.
    pub fn new(table: Arc<MetaTable>) -> Self {
        let values = table
            .keys()
            .iter()
            .map(|key| {
                key.default_value()
                    .map(DefaultValue::to_value)
                    .unwrap_or(Value::Null)
            })
            .collect();
        Instance {
            table,
            values,
            dirty: BTreeSet::new(),
        }
    }

    /// Create a fresh default instance behind a shared handle.
    pub fn new_shared(table: Arc<MetaTable>) -> SharedInstance {
        Rc::new(RefCell::new(Instance::new(table)))
    }

    /// Build an instance from a storage row in column order, clean.
    pub(crate) fn from_row(table: Arc<MetaTable>, row: Vec<Value>) -> Result<Self, Error> {
        if row.len() != table.columns().len() {
            return Err(Error::storage(format!(
                "row width {} does not match {} columns of {}",
                row.len(),
                table.columns().len(),
                table.name()
            )));
        }
        let mut instance = Instance::new(table.clone());
        for (column, value) in table.columns().iter().zip(row) {
            instance.values[column.key().ordinal()] = value;
        }
        Ok(instance)
    }

    /// The entity's frozen metadata.
    pub fn table(&self) -> &Arc<MetaTable> {
        &self.table
    }

    fn check_key(&self, key: &Key) -> Result<(), Error> {
        if key.entity() != self.table.name() {
            return Err(Error::meta(format!(
                "key {}.{} applied to an instance of {}",
                key.entity(),
                key.name(),
                self.table.name()
            )));
        }
        Ok(())
    }

    /// Read a direct key value.
    pub fn get(&self, key: &Key) -> Result<Value, Error> {
        self.check_key(key)?;
        if key.is_to_many() {
            return Err(Error::validation(format!(
                "to-many relation {} resolves through a session, not a direct read",
                key.name()
            )));
        }
        Ok(self.values[key.ordinal()].clone())
    }

    /// Write a direct key value and record it as dirty.
    pub fn set(&mut self, key: &Key, value: Value) -> Result<(), Error> {
        self.check_key(key)?;
        match key.kind() {
            KeyKind::ToMany { .. } => {
                return Err(Error::validation(format!(
                    "to-many relation {} cannot be written directly",
                    key.name()
                )));
            }
            // Raw scalar foreign-key values are accepted as-is; only a
            // full entity reference has its type checked.
            KeyKind::ToOne { target } => {
                if let Value::Entity(instance) = &value {
                    let actual = instance.borrow().table().name().to_owned();
                    if &actual != target {
                        return Err(Error::validation(format!(
                            "relation {} expects {}, got {}",
                            key.name(),
                            target,
                            actual
                        )));
                    }
                }
            }
            KeyKind::Column { .. } => {
                if let Some(value_type) = value.value_type() {
                    if !assignable(key.value_type(), value_type) {
                        return Err(Error::validation(format!(
                            "key {} is {:?}, cannot assign {:?}",
                            key.name(),
                            key.value_type(),
                            value_type
                        )));
                    }
                }
            }
        }
        self.values[key.ordinal()] = value;
        self.dirty.insert(key.ordinal());
        Ok(())
    }

    /// Ordinals of the keys written since the last flush.
    pub fn dirty_ordinals(&self) -> impl Iterator<Item = usize> + '_ {
        self.dirty.iter().copied()
    }

    /// Keys written since the last flush.
    pub fn dirty_keys(&self) -> Vec<Key> {
        self.dirty
            .iter()
            .map(|ordinal| self.table.keys()[*ordinal].clone())
            .collect()
    }

    /// Check for unflushed writes.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Forget all dirty markers.
    pub(crate) fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// The primary-key value of this instance.
    pub fn primary_key_value(&self) -> Value {
        let ordinal = self.table.primary_key().key().ordinal();
        self.values[ordinal].clone()
    }

    /// Raw value at a key ordinal, without key checks.
    pub(crate) fn value_at(&self, ordinal: usize) -> &Value {
        &self.values[ordinal]
    }
}

/// Assignment compatibility between a declared and a runtime type.
pub(crate) fn assignable(declared: ValueType, actual: ValueType) -> bool {
    if declared == actual {
        return true;
    }
    matches!(
        (declared, actual),
        (ValueType::Int64, ValueType::Int32)
            | (ValueType::Decimal, ValueType::Float64)
            | (ValueType::Decimal, ValueType::Int32)
            | (ValueType::Decimal, ValueType::Int64)
    )
}
