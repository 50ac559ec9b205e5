//! The dialect contract and the ANSI baseline.
//!
//! A dialect is a strategy object: statement printers live here as default
//! trait methods and concrete dialects override only what their engine
//! renders differently.

use crate::entity::Instance;
use crate::error::Error;
use crate::meta::MetaTable;
use crate::query::Query;
use crate::sql::decoder::CriterionDecoder;
use crate::sql::SqlStatement;
use crate::Operator;

/// Leaf templates shared by every dialect that does not override them.
///
/// `{0}` is the column reference, `{1}` the placeholder slot.
pub fn base_criterion_template(
    dialect: &'static str,
    operator: Operator,
) -> Result<String, Error> {
    let template = match operator {
        Operator::Eq => "{0}={1}",
        Operator::NotEq => "{0}<>{1}",
        Operator::Gt => "{0}>{1}",
        Operator::Ge => "{0}>={1}",
        Operator::Lt => "{0}<{1}",
        Operator::Le => "{0}<={1}",
        Operator::EqIgnoreCase => "UPPER({0})={1}",
        Operator::StartsIgnoreCase
        | Operator::EndsIgnoreCase
        | Operator::ContainsIgnoreCase => "UPPER({0}) LIKE {1}",
        Operator::Starts | Operator::Ends | Operator::Contains => "{0} LIKE {1}",
        Operator::In => "{0} IN ({1})",
        Operator::NotIn => "NOT {0} IN ({1})",
        Operator::Regexp | Operator::NotRegexp | Operator::User(_) | Operator::Sql => {
            return Err(Error::UnsupportedFeature {
                dialect,
                feature: format!("operator {operator}"),
            });
        }
    };
    Ok(template.to_owned())
}

/// One storage engine's SQL syntax variations.
pub trait SqlDialect {
    /// Dialect name for diagnostics and errors.
    fn name(&self) -> &'static str;

    /// Leaf comparison template with `{0}` (column) and `{1}` (value) slots.
    ///
    /// User-named operators resolve through [`Self::user_operator_template`];
    /// unknown ones fail fast.
    fn criterion_template(&self, operator: Operator) -> Result<String, Error> {
        if let Operator::User(name) = operator {
            return self
                .user_operator_template(name)
                .ok_or_else(|| Error::UnsupportedFeature {
                    dialect: self.name(),
                    feature: format!("user operator {name}"),
                });
        }
        base_criterion_template(self.name(), operator)
    }

    /// Template for a user-named operator, if this dialect defines it.
    fn user_operator_template(&self, _name: &str) -> Option<String> {
        None
    }

    /// Always-true / always-false predicate text.
    ///
    /// Rendered as a comparison so constants stay composable inside AND/OR.
    fn constant_template(&self, value: bool) -> &'static str {
        if value {
            "1=1"
        } else {
            "1=0"
        }
    }

    /// Render the limit/offset clause.
    fn print_offset(&self, limit: Option<u64>, offset: u64, out: &mut String) {
        let limit = limit.unwrap_or(u64::MAX);
        out.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
    }

    /// Render the pessimistic-lock clause.
    ///
    /// Dialects without lock support must fail fast, never no-op.
    fn print_lock(&self, out: &mut String) -> Result<(), Error> {
        out.push_str("FOR UPDATE");
        Ok(())
    }

    /// Render `schema.table alias`.
    fn print_table_alias(&self, table: &MetaTable, out: &mut String) {
        out.push_str(&table.full_name());
        out.push(' ');
        out.push_str(table.alias());
    }

    /// Compile a SELECT (or SELECT COUNT(*)) statement.
    fn print_select(
        &self,
        query: &Query,
        decoder: &CriterionDecoder<'_>,
        count: bool,
    ) -> Result<SqlStatement, Error> {
        let base = decoder.base();
        let mut sql = String::with_capacity(128);

        sql.push_str("SELECT ");
        if count {
            sql.push_str("COUNT(*)");
        } else {
            let mut first = true;
            match query.columns() {
                Some(columns) => {
                    for key in columns {
                        let column = base.column_for(key)?;
                        if !first {
                            sql.push_str(", ");
                        }
                        sql.push_str(base.alias());
                        sql.push('.');
                        sql.push_str(column.name());
                        first = false;
                    }
                }
                None => {
                    for column in base.columns() {
                        if !first {
                            sql.push_str(", ");
                        }
                        sql.push_str(base.alias());
                        sql.push('.');
                        sql.push_str(column.name());
                        first = false;
                    }
                }
            }
        }

        sql.push_str(" FROM ");
        for (i, table) in decoder.tables().iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            self.print_table_alias(table, &mut sql);
        }

        let where_sql = decoder.where_sql().trim_end();
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(where_sql);
        }

        if !count {
            if !query.order_terms().is_empty() {
                sql.push_str(" ORDER BY ");
                for (i, term) in query.order_terms().iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    sql.push_str(&decoder.resolve_column(&term.key)?);
                    if term.descending {
                        sql.push_str(" DESC");
                    }
                }
            }
            if query.limit().is_some() || query.offset() > 0 {
                self.print_offset(query.limit(), query.offset(), &mut sql);
            }
            if query.is_lock_request() {
                sql.push(' ');
                self.print_lock(&mut sql)?;
            }
        }

        Ok(SqlStatement {
            sql,
            params: decoder.params().to_vec(),
        })
    }

    /// Compile an INSERT of all columns of an instance.
    fn print_insert(&self, instance: &Instance) -> Result<SqlStatement, Error> {
        let table = instance.table();
        let mut sql = String::with_capacity(96);
        let mut placeholders = String::new();
        let mut params = Vec::with_capacity(table.columns().len());

        sql.push_str("INSERT INTO ");
        sql.push_str(&table.full_name());
        sql.push_str(" (");
        for (i, column) in table.columns().iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
                placeholders.push_str(", ");
            }
            sql.push_str(column.name());
            placeholders.push('?');
            params.push(instance.value_at(column.key().ordinal()).bind());
        }
        sql.push_str(") VALUES (");
        sql.push_str(&placeholders);
        sql.push(')');

        Ok(SqlStatement { sql, params })
    }

    /// Compile an UPDATE of only the changed columns, scoped by the decoder's
    /// WHERE clause.
    fn print_update(
        &self,
        instance: &Instance,
        decoder: &CriterionDecoder<'_>,
    ) -> Result<SqlStatement, Error> {
        let table = instance.table();
        let mut sql = String::with_capacity(96);
        let mut params = Vec::new();

        sql.push_str("UPDATE ");
        self.print_table_alias(table, &mut sql);
        sql.push_str(" SET ");

        let mut first = true;
        for ordinal in instance.dirty_ordinals() {
            let key = &table.keys()[ordinal];
            if key.is_to_many() {
                continue;
            }
            let column = table.column_for(key)?;
            if column.is_primary() {
                return Err(Error::validation(format!(
                    "primary key {}.{} cannot be changed",
                    table.name(),
                    column.name()
                )));
            }
            if !first {
                sql.push_str(", ");
            }
            sql.push_str(column.name());
            sql.push_str("=?");
            params.push(instance.value_at(ordinal).bind());
            first = false;
        }
        if first {
            return Err(Error::validation(format!(
                "no changed columns to update on {}",
                table.name()
            )));
        }

        sql.push_str(" WHERE ");
        sql.push_str(decoder.where_sql().trim_end());
        params.extend_from_slice(decoder.params());

        Ok(SqlStatement { sql, params })
    }

    /// Compile a DELETE scoped by the decoder's WHERE clause.
    fn print_delete(
        &self,
        table: &MetaTable,
        decoder: &CriterionDecoder<'_>,
    ) -> Result<SqlStatement, Error> {
        let mut sql = String::with_capacity(64);
        sql.push_str("DELETE FROM ");
        self.print_table_alias(table, &mut sql);
        sql.push_str(" WHERE ");
        sql.push_str(decoder.where_sql().trim_end());
        Ok(SqlStatement {
            sql,
            params: decoder.params().to_vec(),
        })
    }
}

/// The ANSI baseline dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnsiDialect;

impl SqlDialect for AnsiDialect {
    fn name(&self) -> &'static str {
        "ansi"
    }
}
