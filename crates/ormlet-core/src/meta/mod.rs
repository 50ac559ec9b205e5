//! Frozen schema metadata.
//!
//! Entity types are declared through [`EntitySchema`] builders and compiled
//! once into immutable [`MetaTable`] descriptions by the [`MetaModel`]. The
//! model locks when the first session touches it; mutating a locked model is
//! a programming error surfaced as [`crate::Error::Meta`].

mod model;
mod schema;
mod table;

pub use model::{MetaModel, ModelConfig};
pub use schema::{DefaultValue, EntitySchema, KeyDef};
pub use table::{MetaColumn, MetaTable};
