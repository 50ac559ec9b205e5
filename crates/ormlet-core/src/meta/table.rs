//! Frozen table and column metadata.

use std::sync::Arc;

use crate::error::Error;
use crate::key::Key;
use crate::value::SqlType;

/// Immutable column metadata.
#[derive(Debug, Clone)]
pub struct MetaColumn {
    key: Key,
    sql_type: SqlType,
    nullable: bool,
    max_length: Option<u32>,
    unique: bool,
    /// Related entity name when this column is a foreign key.
    target: Option<String>,
}

impl MetaColumn {
    pub(crate) fn new(
        key: Key,
        sql_type: SqlType,
        nullable: bool,
        max_length: Option<u32>,
        unique: bool,
        target: Option<String>,
    ) -> Self {
        MetaColumn {
            key,
            sql_type,
            nullable,
            max_length,
            unique,
            target,
        }
    }

    /// Column name; identical to the key name.
    pub fn name(&self) -> &str {
        self.key.name()
    }

    /// The key this column stores.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// SQL column type from the fixed type map.
    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    /// Accepts NULL.
    pub fn nullable(&self) -> bool {
        self.nullable
    }

    /// VARCHAR length limit.
    pub fn max_length(&self) -> Option<u32> {
        self.max_length
    }

    /// Part of a unique index.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Primary-key membership.
    pub fn is_primary(&self) -> bool {
        self.key.is_primary()
    }

    /// Related entity name when this column is a foreign key.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }
}

/// Immutable table metadata, built once per entity type.
#[derive(Debug)]
pub struct MetaTable {
    name: String,
    alias: String,
    schema: Option<String>,
    keys: Vec<Key>,
    columns: Vec<MetaColumn>,
    /// Index of the primary-key column within `columns`.
    primary: usize,
}

impl MetaTable {
    pub(crate) fn new(
        name: String,
        alias: String,
        schema: Option<String>,
        keys: Vec<Key>,
        columns: Vec<MetaColumn>,
        primary: usize,
    ) -> Arc<Self> {
        Arc::new(MetaTable {
            name,
            alias,
            schema,
            keys,
            columns,
            primary,
        })
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table alias used in compiled SQL.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Schema-qualified table name; plain name for no-schema configurations.
    pub fn full_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// All declared keys in ordinal order, including to-many relations.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Look up a declared key by name.
    pub fn key(&self, name: &str) -> Result<Key, Error> {
        self.keys
            .iter()
            .find(|k| k.name() == name)
            .cloned()
            .ok_or_else(|| Error::meta(format!("unknown key {}.{}", self.name, name)))
    }

    /// Columns in declaration order; to-many relations are not columns.
    pub fn columns(&self) -> &[MetaColumn] {
        &self.columns
    }

    /// The primary-key column.
    pub fn primary_key(&self) -> &MetaColumn {
        &self.columns[self.primary]
    }

    /// Find the column storing a direct key.
    pub fn column_for(&self, key: &Key) -> Result<&MetaColumn, Error> {
        self.columns
            .iter()
            .find(|c| c.key() == key)
            .ok_or_else(|| {
                Error::meta(format!(
                    "key {}.{} has no column in {}",
                    key.entity(),
                    key.name(),
                    self.name
                ))
            })
    }
}
