//! The metamodel: lazily built, then locked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::key::{CompositeKey, Key, KeyKind};
use crate::meta::schema::{EntitySchema, KeyDef};
use crate::meta::table::{MetaColumn, MetaTable};
use crate::value::SqlType;

/// Model-wide configuration, supplied by the caller at construction time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Schema name for qualified table references.
    pub schema: Option<String>,
    /// Render schema qualification; no-schema dialects turn this off.
    pub print_schema: bool,
    /// Default suffix appended to table names to form aliases.
    pub alias_suffix: String,
}

/// Process-wide schema registry with memoized table builds.
///
/// Registration is open until [`MetaModel::lock`] runs (the first session
/// locks the model); afterwards every mutation is a metamodel error. Table
/// builds are idempotent: repeated calls return the cached immutable
/// instance.
#[derive(Debug)]
pub struct MetaModel {
    config: ModelConfig,
    schemas: RwLock<HashMap<String, EntitySchema>>,
    tables: RwLock<HashMap<String, Arc<MetaTable>>>,
    locked: AtomicBool,
}

impl MetaModel {
    /// Create an empty, unlocked model.
    pub fn new(config: ModelConfig) -> Self {
        MetaModel {
            config,
            schemas: RwLock::new(HashMap::new()),
            tables: RwLock::new(HashMap::new()),
            locked: AtomicBool::new(false),
        }
    }

    /// Register an entity declaration.
    pub fn register(&self, schema: EntitySchema) -> Result<(), Error> {
        if self.is_locked() {
            return Err(Error::meta(format!(
                "cannot register {}: the metamodel is locked",
                schema.name
            )));
        }
        let mut schemas = self.schemas.write();
        if schemas.contains_key(&schema.name) {
            return Err(Error::meta(format!(
                "entity {} is already registered",
                schema.name
            )));
        }
        schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Freeze the model. Idempotent.
    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    /// Check the freeze state.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Model configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Get the frozen metadata of an entity type, building it on first use.
    ///
    /// The build is memoized; re-invocation returns the cached instance.
    pub fn table(&self, entity: &str) -> Result<Arc<MetaTable>, Error> {
        if let Some(table) = self.tables.read().get(entity) {
            return Ok(table.clone());
        }
        let mut tables = self.tables.write();
        // Another caller may have built it between the two lock scopes.
        if let Some(table) = tables.get(entity) {
            return Ok(table.clone());
        }
        let schemas = self.schemas.read();
        let schema = schemas
            .get(entity)
            .ok_or_else(|| Error::meta(format!("unknown entity type {entity}")))?;
        let table = self.build_table(schema, &schemas)?;
        tables.insert(entity.to_owned(), table.clone());
        Ok(table)
    }

    /// Convenience lookup of a direct key.
    pub fn key(&self, entity: &str, name: &str) -> Result<Key, Error> {
        self.table(entity)?.key(name)
    }

    /// Resolve a dotted name chain into a composite key.
    pub fn path(&self, entity: &str, names: &[&str]) -> Result<CompositeKey, Error> {
        let mut iter = names.iter();
        let first = iter
            .next()
            .ok_or_else(|| Error::validation("a composite key must not have an empty path"))?;
        let mut path = CompositeKey::from(self.key(entity, first)?);
        for name in iter {
            let target = path.last().target().ok_or_else(|| {
                Error::validation(format!("{} is not a relation", path.last().name()))
            })?;
            let next = self.key(&target.to_owned(), name)?;
            path = path.add(&next)?;
        }
        Ok(path)
    }

    fn build_table(
        &self,
        schema: &EntitySchema,
        schemas: &HashMap<String, EntitySchema>,
    ) -> Result<Arc<MetaTable>, Error> {
        let mut keys = Vec::with_capacity(schema.keys.len());
        let mut columns = Vec::new();
        let mut primary = None;

        for (ordinal, def) in schema.keys.iter().enumerate() {
            let kind = key_kind(def);
            if let Some(default) = &def.default {
                if def.target.is_some() {
                    return Err(Error::meta(format!(
                        "relation key {}.{} cannot declare a default",
                        schema.name, def.name
                    )));
                }
                if !crate::entity::assignable(def.value_type, default.value_type()) {
                    return Err(Error::meta(format!(
                        "default for {}.{} is {:?}, declared type is {:?}",
                        schema.name,
                        def.name,
                        default.value_type(),
                        def.value_type
                    )));
                }
            }
            let key = Key::new(
                schema.name.clone(),
                def.name.clone(),
                def.value_type,
                ordinal,
                kind.clone(),
                def.default.clone(),
            );
            keys.push(key.clone());

            match kind {
                KeyKind::ToMany { target, remote } => {
                    // Not a column; validate the back-reference now so a bad
                    // declaration fails at build time, not at first resolve.
                    let remote_schema = schemas.get(&target).ok_or_else(|| {
                        Error::meta(format!(
                            "{}.{} targets unknown entity {}",
                            schema.name, def.name, target
                        ))
                    })?;
                    let remote_def = remote_schema.get(&remote).ok_or_else(|| {
                        Error::meta(format!(
                            "{}.{} names missing remote key {}.{}",
                            schema.name, def.name, target, remote
                        ))
                    })?;
                    if remote_def.target.as_deref() != Some(schema.name.as_str()) {
                        return Err(Error::meta(format!(
                            "{}.{} does not point back to {}",
                            target, remote, schema.name
                        )));
                    }
                }
                KeyKind::ToOne { ref target } => {
                    let sql_type = foreign_sql_type(&schema.name, def, target, schemas)?;
                    columns.push(MetaColumn::new(
                        key,
                        sql_type,
                        def.nullable,
                        def.max_length,
                        def.unique,
                        Some(target.clone()),
                    ));
                }
                KeyKind::Column { primary: pk, .. } => {
                    let sql_type = def.value_type.sql_type().ok_or_else(|| {
                        Error::meta(format!(
                            "{}.{} has no SQL type mapping",
                            schema.name, def.name
                        ))
                    })?;
                    if pk {
                        if primary.is_some() {
                            return Err(Error::meta(format!(
                                "ambiguous primary key on {}",
                                schema.name
                            )));
                        }
                        primary = Some(columns.len());
                    }
                    columns.push(MetaColumn::new(
                        key,
                        sql_type,
                        def.nullable,
                        def.max_length,
                        def.unique,
                        None,
                    ));
                }
            }
        }

        let primary = primary.ok_or_else(|| {
            Error::meta(format!("entity {} declares no primary key", schema.name))
        })?;

        let alias = schema
            .alias
            .clone()
            .unwrap_or_else(|| format!("{}{}", schema.name, self.config.alias_suffix));
        let table_schema = if self.config.print_schema {
            self.config.schema.clone()
        } else {
            None
        };

        Ok(MetaTable::new(
            schema.name.clone(),
            alias,
            table_schema,
            keys,
            columns,
            primary,
        ))
    }
}

fn key_kind(def: &KeyDef) -> KeyKind {
    match (&def.target, def.to_many) {
        (Some(target), true) => KeyKind::ToMany {
            target: target.clone(),
            remote: def.remote.clone().unwrap_or_default(),
        },
        (Some(target), false) => KeyKind::ToOne {
            target: target.clone(),
        },
        (None, _) => KeyKind::Column {
            primary: def.primary,
            nullable: def.nullable,
            max_length: def.max_length,
        },
    }
}

/// A foreign-key column takes the SQL type of the referenced table's
/// primary key, resolved from declarations so self-references work.
fn foreign_sql_type(
    entity: &str,
    def: &KeyDef,
    target: &str,
    schemas: &HashMap<String, EntitySchema>,
) -> Result<SqlType, Error> {
    let target_schema = schemas.get(target).ok_or_else(|| {
        Error::meta(format!(
            "{}.{} targets unknown entity {}",
            entity, def.name, target
        ))
    })?;
    let pk = target_schema
        .keys
        .iter()
        .find(|k| k.primary)
        .ok_or_else(|| Error::meta(format!("entity {target} declares no primary key")))?;
    pk.value_type
        .sql_type()
        .ok_or_else(|| Error::meta(format!("{target}.{} has no SQL type mapping", pk.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    fn sample_model() -> MetaModel {
        let model = MetaModel::new(ModelConfig::default());
        model
            .register(
                EntitySchema::new("ord_customer")
                    .key(KeyDef::primary("ID", ValueType::Int64))
                    .key(KeyDef::column("NAME", ValueType::String).max_length(64))
                    .key(KeyDef::to_one("MOTHER", "ord_customer").nullable()),
            )
            .unwrap();
        model
            .register(
                EntitySchema::new("ord_order")
                    .key(KeyDef::primary("ID", ValueType::Int64))
                    .key(KeyDef::column("NOTE", ValueType::String).nullable())
                    .key(KeyDef::to_one("CUSTOMER", "ord_customer")),
            )
            .unwrap();
        model
    }

    #[test]
    fn test_build_is_memoized() {
        let model = sample_model();
        let a = model.table("ord_order").unwrap();
        let b = model.table("ord_order").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        model.lock();
        let c = model.table("ord_order").unwrap();
        assert!(Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_ordinals_follow_declaration_order() {
        let model = sample_model();
        let table = model.table("ord_order").unwrap();
        assert_eq!(table.key("ID").unwrap().ordinal(), 0);
        assert_eq!(table.key("NOTE").unwrap().ordinal(), 1);
        assert_eq!(table.key("CUSTOMER").unwrap().ordinal(), 2);
        assert_eq!(table.primary_key().name(), "ID");
    }

    #[test]
    fn test_foreign_key_takes_target_pk_type() {
        let model = sample_model();
        let table = model.table("ord_order").unwrap();
        let fk = table
            .column_for(&table.key("CUSTOMER").unwrap())
            .unwrap();
        assert_eq!(fk.sql_type(), SqlType::Bigint);
        assert_eq!(fk.target(), Some("ord_customer"));
    }

    #[test]
    fn test_locked_model_rejects_registration() {
        let model = sample_model();
        model.lock();
        let err = model
            .register(EntitySchema::new("late").key(KeyDef::primary("ID", ValueType::Int64)))
            .unwrap_err();
        assert!(matches!(err, Error::Meta(_)));
    }

    #[test]
    fn test_ambiguous_primary_key() {
        let model = MetaModel::new(ModelConfig::default());
        model
            .register(
                EntitySchema::new("bad")
                    .key(KeyDef::primary("A", ValueType::Int64))
                    .key(KeyDef::primary("B", ValueType::Int64)),
            )
            .unwrap();
        let err = model.table("bad").unwrap_err();
        assert!(err.to_string().contains("ambiguous primary key"));
    }

    #[test]
    fn test_path_resolution() {
        let model = sample_model();
        let path = model
            .path("ord_customer", &["MOTHER", "MOTHER", "NAME"])
            .unwrap();
        assert_eq!(path.depth(), 3);
        assert_eq!(path.to_string(), "MOTHER.MOTHER.NAME");
    }

    #[test]
    fn test_default_materializes_in_fresh_instances() {
        use crate::entity::Instance;
        use crate::meta::DefaultValue;
        use crate::value::Value;

        let model = MetaModel::new(ModelConfig::default());
        model
            .register(
                EntitySchema::new("ord_item")
                    .key(KeyDef::primary("ID", ValueType::Int64))
                    .key(
                        KeyDef::column("SCORE", ValueType::Int32)
                            .with_default(DefaultValue::Int32(10)),
                    )
                    .key(KeyDef::column("CODE", ValueType::String).unique()),
            )
            .unwrap();
        let table = model.table("ord_item").unwrap();
        let instance = Instance::new(table.clone());

        assert_eq!(
            instance.get(&table.key("SCORE").unwrap()).unwrap(),
            Value::Int32(10)
        );
        assert_eq!(
            instance.get(&table.key("ID").unwrap()).unwrap(),
            Value::Null
        );
        assert!(!instance.is_dirty());
        assert!(table
            .column_for(&table.key("CODE").unwrap())
            .unwrap()
            .is_unique());
    }

    #[test]
    fn test_mismatched_default_type_is_meta_error() {
        use crate::meta::DefaultValue;

        let model = MetaModel::new(ModelConfig::default());
        model
            .register(EntitySchema::new("bad").key(
                KeyDef::primary("ID", ValueType::Int64),
            ).key(
                KeyDef::column("NAME", ValueType::String)
                    .with_default(DefaultValue::Int32(1)),
            ))
            .unwrap();
        let err = model.table("bad").unwrap_err();
        assert!(err.to_string().contains("default for bad.NAME"));
    }

    #[test]
    fn test_relation_default_is_meta_error() {
        use crate::meta::DefaultValue;

        let model = MetaModel::new(ModelConfig::default());
        model
            .register(
                EntitySchema::new("ord_customer")
                    .key(KeyDef::primary("ID", ValueType::Int64)),
            )
            .unwrap();
        model
            .register(
                EntitySchema::new("bad")
                    .key(KeyDef::primary("ID", ValueType::Int64))
                    .key(
                        KeyDef::to_one("CUSTOMER", "ord_customer")
                            .with_default(DefaultValue::Int64(1)),
                    ),
            )
            .unwrap();
        let err = model.table("bad").unwrap_err();
        assert!(err.to_string().contains("cannot declare a default"));
    }

    #[test]
    fn test_unknown_key_is_meta_error() {
        let model = sample_model();
        assert!(matches!(
            model.key("ord_order", "MISSING"),
            Err(Error::Meta(_))
        ));
    }
}
