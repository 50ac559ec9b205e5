//! The unit of work.
//!
//! A session owns one storage port for its lifetime, compiles queries through
//! its dialect, and keeps an identity map so every row materializes as at
//! most one live instance. Sessions are single-threaded; instances loaded by
//! one session must not cross to another.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::criterion::Criterion;
use crate::entity::{Instance, SharedInstance};
use crate::error::Error;
use crate::key::Key;
use crate::meta::{MetaModel, MetaTable};
use crate::query::Query;
use crate::sql::{CriterionDecoder, SqlDialect, SqlStatement};
use crate::storage::{RowCursor, StoragePort};
use crate::value::{values_equal, Value};

/// Load-shortcut behavior of a session.
///
/// The identity map itself always tracks every materialized instance; that
/// is what keeps reference identity and lets commit flush dirty writes. The
/// policy only decides whether a load may answer from the map without
/// touching storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CachePolicy {
    /// Every load re-reads storage, even for a live primary key.
    None,
    /// A load whose primary key is live answers from the map.
    #[default]
    SolidCache,
}

/// Session configuration, fixed at construction time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Identity-map policy.
    pub cache_policy: CachePolicy,
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting operations.
    Open,
    /// Terminal: the transaction committed.
    Committed,
    /// Terminal: the transaction rolled back.
    RolledBack,
    /// Terminal: the port is released.
    Closed,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Open => "open",
            SessionState::Committed => "committed",
            SessionState::RolledBack => "rolled back",
            SessionState::Closed => "closed",
        }
    }
}

/// Identity-map key: entity type plus primary-key value.
struct CacheKey {
    entity: String,
    pk: Value,
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity && values_equal(&self.pk, &other.pk)
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity.hash(state);
        self.pk.identity_hash(state);
    }
}

/// A unit of work over one storage port.
pub struct Session<'m> {
    model: &'m MetaModel,
    dialect: Box<dyn SqlDialect>,
    port: RefCell<Box<dyn StoragePort>>,
    cache: RefCell<HashMap<CacheKey, SharedInstance>>,
    config: SessionConfig,
    state: Cell<SessionState>,
    rollback_only: Cell<bool>,
}

impl<'m> Session<'m> {
    /// Open a session. The first session locks the metamodel.
    pub fn new(
        model: &'m MetaModel,
        dialect: Box<dyn SqlDialect>,
        port: Box<dyn StoragePort>,
        config: SessionConfig,
    ) -> Self {
        model.lock();
        Session {
            model,
            dialect,
            port: RefCell::new(port),
            cache: RefCell::new(HashMap::new()),
            config,
            state: Cell::new(SessionState::Open),
            rollback_only: Cell::new(false),
        }
    }

    /// The metamodel this session resolves against.
    pub fn model(&self) -> &'m MetaModel {
        self.model
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// A storage failure poisoned the transaction; only rollback remains.
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.get()
    }

    fn ensure_open(&self) -> Result<(), Error> {
        match self.state.get() {
            SessionState::Open => Ok(()),
            other => Err(Error::SessionState(other.name())),
        }
    }

    /// Latch the rollback-only flag on a storage failure.
    fn poison(&self, error: Error) -> Error {
        warn!(%error, "storage failure, session is now rollback-only");
        self.rollback_only.set(true);
        error
    }

    fn compile_select(&self, query: &Query, count: bool) -> Result<SqlStatement, Error> {
        let decoder = CriterionDecoder::new(self.model, self.dialect.as_ref(), query)?;
        self.dialect.print_select(query, &decoder, count)
    }

    /// Stream the query's matching instances.
    ///
    /// Rows materialize through the identity map: a row whose primary key is
    /// already live yields the existing instance.
    pub fn iterate(&self, query: &Query) -> Result<EntityCursor<'_, 'm>, Error> {
        self.ensure_open()?;
        let table = self.model.table(query.entity())?;
        let keys: Vec<Key> = match query.columns() {
            Some(columns) => columns.to_vec(),
            None => table.columns().iter().map(|c| c.key().clone()).collect(),
        };
        let statement = self.compile_select(query, false)?;
        debug!(sql = %statement.sql, "select");
        let rows = self
            .port
            .borrow_mut()
            .execute(&statement.sql, &statement.params)
            .map_err(|e| self.poison(e))?;
        Ok(EntityCursor {
            session: self,
            table,
            keys,
            rows,
        })
    }

    /// Collect the query's matching instances.
    pub fn list(&self, query: &Query) -> Result<Vec<SharedInstance>, Error> {
        self.iterate(query)?.collect()
    }

    /// Load one instance by primary key.
    ///
    /// A cache hit returns the live instance without touching storage.
    pub fn load(&self, entity: &str, pk: impl Into<Value>) -> Result<SharedInstance, Error> {
        self.ensure_open()?;
        let pk = pk.into();
        if self.config.cache_policy == CachePolicy::SolidCache {
            let hit = self
                .cache
                .borrow()
                .get(&CacheKey {
                    entity: entity.to_owned(),
                    pk: pk.clone(),
                })
                .cloned();
            if let Some(instance) = hit {
                return Ok(instance);
            }
        }
        let query = self.pk_query(entity, pk)?;
        match self.iterate(&query)?.next() {
            Some(row) => row,
            None => Err(Error::NotFound),
        }
    }

    /// Count the query's matching rows, ignoring limit and offset.
    pub fn count(&self, query: &Query) -> Result<u64, Error> {
        self.ensure_open()?;
        let statement = self.compile_select(query, true)?;
        debug!(sql = %statement.sql, "count");
        let mut rows = self
            .port
            .borrow_mut()
            .execute(&statement.sql, &statement.params)
            .map_err(|e| self.poison(e))?;
        let row = rows
            .next_row()
            .map_err(|e| self.poison(e))?
            .ok_or_else(|| Error::storage("count query returned no row"))?;
        match row.first() {
            Some(Value::Int64(n)) => Ok(u64::try_from(*n).unwrap_or(0)),
            Some(Value::Int32(n)) => Ok(u64::try_from(*n).unwrap_or(0)),
            other => Err(Error::storage(format!(
                "count query returned {other:?} instead of an integer"
            ))),
        }
    }

    /// The row count the query's limited result set will produce: the total
    /// match count reduced by the offset, then capped by the limit.
    pub fn limited_count(&self, query: &Query) -> Result<u64, Error> {
        let total = self.count(query)?;
        Ok(query.limited_count(total))
    }

    /// Insert a fresh instance and register it in the identity map.
    pub fn insert(&self, instance: &SharedInstance) -> Result<(), Error> {
        self.ensure_open()?;
        let statement = self.dialect.print_insert(&instance.borrow())?;
        debug!(sql = %statement.sql, "insert");
        self.port
            .borrow_mut()
            .execute_update(&statement.sql, &statement.params)
            .map_err(|e| self.poison(e))?;
        instance.borrow_mut().clear_dirty();
        self.remember(instance);
        Ok(())
    }

    /// Flush an instance's changed columns, keyed by its primary key.
    pub fn update(&self, instance: &SharedInstance) -> Result<u64, Error> {
        self.ensure_open()?;
        if !instance.borrow().is_dirty() {
            return Ok(0);
        }
        let (entity, pk) = {
            let inner = instance.borrow();
            (inner.table().name().to_owned(), inner.primary_key_value())
        };
        if pk.is_null() {
            return Err(Error::validation(format!(
                "cannot update {entity}: the primary key is NULL"
            )));
        }
        let query = self.pk_query(&entity, pk)?;
        let decoder = CriterionDecoder::new(self.model, self.dialect.as_ref(), &query)?;
        let statement = self.dialect.print_update(&instance.borrow(), &decoder)?;
        debug!(sql = %statement.sql, "update");
        let affected = self
            .port
            .borrow_mut()
            .execute_update(&statement.sql, &statement.params)
            .map_err(|e| self.poison(e))?;
        instance.borrow_mut().clear_dirty();
        Ok(affected)
    }

    /// Delete one instance by primary key and evict it from the identity map.
    pub fn delete(&self, instance: &SharedInstance) -> Result<u64, Error> {
        self.ensure_open()?;
        let (entity, pk) = {
            let inner = instance.borrow();
            (inner.table().name().to_owned(), inner.primary_key_value())
        };
        let query = self.pk_query(&entity, pk.clone())?;
        let affected = self.delete_matching(&query)?;
        self.cache.borrow_mut().remove(&CacheKey { entity, pk });
        Ok(affected)
    }

    /// Delete every row matching the query's criterion.
    pub fn delete_matching(&self, query: &Query) -> Result<u64, Error> {
        self.ensure_open()?;
        let table = self.model.table(query.entity())?;
        let decoder = CriterionDecoder::new(self.model, self.dialect.as_ref(), query)?;
        let statement = self.dialect.print_delete(&table, &decoder)?;
        debug!(sql = %statement.sql, "delete");
        self.port
            .borrow_mut()
            .execute_update(&statement.sql, &statement.params)
            .map_err(|e| self.poison(e))
    }

    /// Resolve a lazy to-many relation of an instance.
    ///
    /// Compiles to a query over the related entity scoped by the remote
    /// foreign key and streams it, so related rows materialize through the
    /// identity map only as the caller advances.
    pub fn relations_of(
        &self,
        instance: &SharedInstance,
        key: &Key,
    ) -> Result<EntityCursor<'_, 'm>, Error> {
        self.ensure_open()?;
        let (target, remote) = match key.kind() {
            crate::key::KeyKind::ToMany { target, remote } => (target.clone(), remote.clone()),
            _ => {
                return Err(Error::validation(format!(
                    "{} is not a to-many relation",
                    key.name()
                )));
            }
        };
        let pk = instance.borrow().primary_key_value();
        let remote_key = self.model.key(&target, &remote)?;
        let query = Query::new(target, Criterion::eq(remote_key, pk)?);
        self.iterate(&query)
    }

    /// Commit the unit of work.
    ///
    /// Dirty cached instances flush as UPDATEs first; a rollback-only
    /// session refuses to commit and rolls back instead.
    pub fn commit(&self) -> Result<(), Error> {
        self.ensure_open()?;
        if self.rollback_only.get() {
            self.rollback()?;
            return Err(Error::SessionState("rollback-only"));
        }
        let dirty: Vec<SharedInstance> = self
            .cache
            .borrow()
            .values()
            .filter(|i| i.borrow().is_dirty())
            .cloned()
            .collect();
        for instance in &dirty {
            self.update(instance)?;
        }
        self.port
            .borrow_mut()
            .commit()
            .map_err(|e| self.poison(e))?;
        self.state.set(SessionState::Committed);
        debug!(flushed = dirty.len(), "committed");
        Ok(())
    }

    /// Roll back the unit of work; cached instances forget their dirty
    /// markers.
    pub fn rollback(&self) -> Result<(), Error> {
        self.ensure_open()?;
        let result = self.port.borrow_mut().rollback();
        for instance in self.cache.borrow().values() {
            instance.borrow_mut().clear_dirty();
        }
        self.state.set(SessionState::RolledBack);
        debug!("rolled back");
        result
    }

    /// Release the storage port. Idempotent.
    pub fn close(&self) {
        if self.state.get() != SessionState::Closed {
            self.port.borrow_mut().close();
            self.state.set(SessionState::Closed);
        }
    }

    fn pk_query(&self, entity: &str, pk: Value) -> Result<Query, Error> {
        let table = self.model.table(entity)?;
        let key = table.key(table.primary_key().name())?;
        Ok(Query::new(entity, Criterion::eq(key, pk)?))
    }

    fn remember(&self, instance: &SharedInstance) {
        let (entity, pk) = {
            let inner = instance.borrow();
            (inner.table().name().to_owned(), inner.primary_key_value())
        };
        if pk.is_null() {
            return;
        }
        self.cache
            .borrow_mut()
            .insert(CacheKey { entity, pk }, instance.clone());
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Streaming result cursor; rows materialize through the session's identity
/// map as the caller advances.
pub struct EntityCursor<'s, 'm> {
    session: &'s Session<'m>,
    table: Arc<MetaTable>,
    keys: Vec<Key>,
    rows: Box<dyn RowCursor>,
}

impl EntityCursor<'_, '_> {
    fn materialize(&self, row: Vec<Value>) -> Result<SharedInstance, Error> {
        if row.len() != self.keys.len() {
            return Err(Error::storage(format!(
                "row width {} does not match {} selected columns of {}",
                row.len(),
                self.keys.len(),
                self.table.name()
            )));
        }
        let mut instance = Instance::new(self.table.clone());
        for (key, value) in self.keys.iter().zip(row) {
            instance.set(key, value)?;
        }
        instance.clear_dirty();
        let pk = instance.primary_key_value();

        // The identity map tracks every instance with a primary key,
        // regardless of the cache policy; only loads consult the policy.
        if pk.is_null() {
            return Ok(std::rc::Rc::new(RefCell::new(instance)));
        }
        let cache_key = CacheKey {
            entity: self.table.name().to_owned(),
            pk,
        };
        let hit = self.session.cache.borrow().get(&cache_key).cloned();
        if let Some(existing) = hit {
            return Ok(existing);
        }
        let shared: SharedInstance = std::rc::Rc::new(RefCell::new(instance));
        self.session
            .cache
            .borrow_mut()
            .insert(cache_key, shared.clone());
        Ok(shared)
    }
}

impl Iterator for EntityCursor<'_, '_> {
    type Item = Result<SharedInstance, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rows.next_row() {
            Ok(Some(row)) => Some(self.materialize(row)),
            Ok(None) => None,
            Err(error) => Some(Err(error)),
        }
    }
}
