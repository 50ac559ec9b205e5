//! Ormlet Core - Criterion trees, SQL compilation, and the unit of work.
//!
//! This crate provides the core object-relational engine: a registered
//! metamodel of entity types, immutable criterion trees evaluated in memory
//! or compiled to parameterized SQL, and a session keeping an identity map
//! over one storage port.

pub mod criterion;
pub mod entity;
pub mod error;
pub mod key;
pub mod meta;
pub mod query;
pub mod session;
pub mod sql;
pub mod storage;
pub mod value;

pub use criterion::{BinaryOperator, Criterion, Operand, Operator};
pub use entity::{Instance, SharedInstance};
pub use error::Error;
pub use key::{CompositeKey, Key, KeyKind};
pub use meta::{DefaultValue, EntitySchema, KeyDef, MetaModel, MetaTable, ModelConfig};
pub use query::{Query, SortKey};
pub use session::{CachePolicy, EntityCursor, Session, SessionConfig, SessionState};
pub use sql::{AnsiDialect, CriterionDecoder, MsSqlDialect, MySqlDialect, SqlDialect, SqlStatement};
pub use storage::{RowCursor, StoragePort, VecCursor};
pub use value::{SqlType, Value, ValueType};
