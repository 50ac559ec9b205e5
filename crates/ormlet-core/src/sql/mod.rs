//! SQL compilation: criterion decoding and dialect-specific statement
//! printing.
//!
//! The decoder walks a criterion tree into a WHERE clause plus a bound
//! parameter list whose order matches placeholder order exactly; the dialect
//! trait layers statement assembly and per-engine syntax on top.

mod decoder;
mod dialect;
mod mssql;
mod mysql;

pub use decoder::CriterionDecoder;
pub use dialect::{AnsiDialect, SqlDialect};
pub use mssql::MsSqlDialect;
pub use mysql::MySqlDialect;

use crate::value::Value;

/// A compiled, parameterized SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    /// Statement text with `?` placeholders.
    pub sql: String,
    /// Bound parameters in placeholder order.
    pub params: Vec<Value>,
}
