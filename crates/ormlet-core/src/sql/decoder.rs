//! Criterion-to-WHERE decoding.
//!
//! The decoder walks a criterion tree once, producing the WHERE text, the
//! bound parameters in placeholder order, and the set of tables and join
//! conditions the traversed relation paths require. Implicit joins render in
//! the classic comma-list style: every table in the FROM clause, every join
//! condition ANDed into the WHERE clause.

use std::sync::Arc;

use tracing::debug;

use crate::criterion::{Criterion, Operand};
use crate::error::Error;
use crate::key::CompositeKey;
use crate::meta::{MetaModel, MetaTable};
use crate::query::Query;
use crate::sql::dialect::SqlDialect;
use crate::value::Value;
use crate::{BinaryOperator, Operator};

/// One implicit join: a foreign-key column equated with a primary key.
#[derive(Debug, Clone, PartialEq)]
struct Join {
    left_alias: String,
    fk: String,
    right_alias: String,
    pk: String,
}

/// The decoded form of one query's criterion.
///
/// Built once per compiled statement; accessors expose the pieces the
/// dialect printers assemble.
pub struct CriterionDecoder<'a> {
    model: &'a MetaModel,
    base: Arc<MetaTable>,
    sql: String,
    params: Vec<Value>,
    tables: Vec<Arc<MetaTable>>,
    joins: Vec<Join>,
}

impl<'a> CriterionDecoder<'a> {
    /// Decode a query's criterion and ordering paths.
    ///
    /// Relation paths from ordering terms register their joins here too, so
    /// the WHERE clause constrains every table the statement references.
    pub fn new(
        model: &'a MetaModel,
        dialect: &dyn SqlDialect,
        query: &Query,
    ) -> Result<Self, Error> {
        let base = model.table(query.entity())?;
        let mut decoder = CriterionDecoder {
            model,
            base: base.clone(),
            sql: String::new(),
            params: Vec::new(),
            tables: vec![base],
            joins: Vec::new(),
        };
        if let Some(criterion) = query.criterion() {
            decoder.unpack(dialect, criterion)?;
        }
        for term in query.order_terms() {
            decoder.column_ref(&term.key)?;
        }
        let or_rooted = matches!(
            query.criterion(),
            Some(Criterion::Binary {
                operator: BinaryOperator::Or,
                ..
            })
        );
        decoder.write_joins(or_rooted);
        debug!(
            entity = query.entity(),
            tables = decoder.tables.len(),
            params = decoder.params.len(),
            "criterion decoded"
        );
        Ok(decoder)
    }

    /// The query's base table.
    pub fn base(&self) -> &Arc<MetaTable> {
        &self.base
    }

    /// All referenced tables, base first, then relation targets in first-use
    /// order.
    pub fn tables(&self) -> &[Arc<MetaTable>] {
        &self.tables
    }

    /// The decoded WHERE text; may carry trailing whitespace from child
    /// grouping, callers trim. Empty for an unconstrained query.
    pub fn where_sql(&self) -> &str {
        &self.sql
    }

    /// Bound parameters in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Resolve a key path to its aliased column reference without touching
    /// decoder state. Paths must already be registered (criterion or
    /// ordering); used by the ORDER BY printer.
    pub fn resolve_column(&self, key: &CompositeKey) -> Result<String, Error> {
        self.check_anchor(key)?;
        let mut table = self.base.clone();
        for step in &key.steps()[..key.depth() - 1] {
            let target = relation_target(step)?;
            table = self.model.table(target)?;
        }
        let column = table.column_for(key.last())?;
        Ok(format!("{}.{}", table.alias(), column.name()))
    }

    fn unpack(&mut self, dialect: &dyn SqlDialect, criterion: &Criterion) -> Result<(), Error> {
        match criterion {
            Criterion::Constant(value) => {
                self.sql.push_str(dialect.constant_template(*value));
                Ok(())
            }
            Criterion::Binary {
                operator,
                left,
                right,
            } => {
                self.unpack_child(dialect, left, *operator)?;
                self.sql.push(' ');
                self.sql.push_str(operator.name());
                self.sql.push(' ');
                self.unpack_child(dialect, right, *operator)
            }
            Criterion::Leaf {
                key,
                operator,
                operand,
            } => self.print_leaf(dialect, key, *operator, operand),
        }
    }

    /// A binary child of the opposite combinator gets grouped; everything
    /// else prints flat. The group wrapper is ` (`..`) `, so an AND parent
    /// shows a double space before a grouped OR child.
    fn unpack_child(
        &mut self,
        dialect: &dyn SqlDialect,
        child: &Criterion,
        parent: BinaryOperator,
    ) -> Result<(), Error> {
        let grouped = matches!(
            child,
            Criterion::Binary { operator, .. } if *operator != parent
        );
        if grouped {
            self.sql.push_str(" (");
        }
        self.unpack(dialect, child)?;
        if grouped {
            self.sql.push_str(") ");
        }
        Ok(())
    }

    fn print_leaf(
        &mut self,
        dialect: &dyn SqlDialect,
        key: &CompositeKey,
        operator: Operator,
        operand: &Operand,
    ) -> Result<(), Error> {
        if operator == Operator::Sql {
            self.check_anchor(key)?;
            match operand {
                Operand::Sql(raw) => {
                    self.sql.push('(');
                    self.sql.push_str(raw);
                    self.sql.push(')');
                    return Ok(());
                }
                _ => {
                    return Err(Error::validation(
                        "the raw SQL operator requires raw SQL text",
                    ));
                }
            }
        }

        let column = self.column_ref(key)?;

        // EQ and NOT_EQ against a NULL literal render as the IS NULL forms
        // and bind nothing.
        if let Operand::Value(Value::Null) = operand {
            match operator {
                Operator::Eq => {
                    self.sql.push_str(&column);
                    self.sql.push_str(" IS NULL");
                    return Ok(());
                }
                Operator::NotEq => {
                    self.sql.push_str(&column);
                    self.sql.push_str(" IS NOT NULL");
                    return Ok(());
                }
                _ => {}
            }
        }

        let template = dialect.criterion_template(operator)?;
        let filled = match operand {
            Operand::Values(values) => {
                let placeholders = vec!["?"; values.len()].join(",");
                for value in values {
                    self.params.push(value.bind());
                }
                fill(&template, &column, &placeholders)
            }
            Operand::Key(right) => {
                let mut right_column = self.column_ref(right)?;
                if operator.is_insensitive() {
                    right_column = format!("UPPER({right_column})");
                }
                fill(&template, &column, &right_column)
            }
            Operand::Value(value) => {
                self.params.push(decorate(operator, value));
                fill(&template, &column, "?")
            }
            Operand::Sql(_) => {
                return Err(Error::validation(
                    "raw SQL operands require the raw SQL operator",
                ));
            }
        };
        self.sql.push_str(&filled);
        Ok(())
    }

    /// Resolve a key path to its aliased column reference, registering each
    /// traversed relation as a table plus join condition.
    fn column_ref(&mut self, key: &CompositeKey) -> Result<String, Error> {
        self.check_anchor(key)?;
        let mut table = self.base.clone();
        for step in &key.steps()[..key.depth() - 1] {
            let target = relation_target(step)?;
            let next = self.model.table(target)?;
            let fk = table.column_for(step)?;
            let join = Join {
                left_alias: table.alias().to_owned(),
                fk: fk.name().to_owned(),
                right_alias: next.alias().to_owned(),
                pk: next.primary_key().name().to_owned(),
            };
            if !self.joins.contains(&join) {
                self.joins.push(join);
            }
            if !self.tables.iter().any(|t| t.name() == next.name()) {
                self.tables.push(next.clone());
            }
            table = next;
        }
        let last = key.last();
        if last.is_to_many() {
            return Err(Error::validation(format!(
                "to-many relation {} cannot terminate a criterion path",
                last.name()
            )));
        }
        let column = table.column_for(last)?;
        Ok(format!("{}.{}", table.alias(), column.name()))
    }

    fn check_anchor(&self, key: &CompositeKey) -> Result<(), Error> {
        if key.entity() != self.base.name() {
            return Err(Error::validation(format!(
                "key path {} starts at {}, the query base is {}",
                key,
                key.entity(),
                self.base.name()
            )));
        }
        Ok(())
    }

    /// Append every registered join condition to the WHERE text, as one
    /// parenthesized AND group. An OR-topped criterion gets parenthesized
    /// too, so the joins constrain every disjunct.
    fn write_joins(&mut self, group_criterion: bool) {
        let mut conditions = String::new();
        for join in &self.joins {
            if !conditions.is_empty() {
                conditions.push_str(" AND ");
            }
            conditions.push_str(&join.left_alias);
            conditions.push('.');
            conditions.push_str(&join.fk);
            conditions.push('=');
            conditions.push_str(&join.right_alias);
            conditions.push('.');
            conditions.push_str(&join.pk);
        }
        if conditions.is_empty() {
            return;
        }
        if self.sql.is_empty() {
            self.sql.push_str(&conditions);
            return;
        }
        if group_criterion {
            self.sql.truncate(self.sql.trim_end().len());
            self.sql.insert(0, '(');
            self.sql.push(')');
        }
        self.sql.push_str(" AND (");
        self.sql.push_str(&conditions);
        self.sql.push(')');
    }
}

fn relation_target(step: &crate::key::Key) -> Result<&str, Error> {
    if !step.is_to_one() {
        return Err(Error::validation(format!(
            "{} is not a to-one relation",
            step.name()
        )));
    }
    step.target()
        .ok_or_else(|| Error::meta(format!("key {} has no relation target", step)))
}

fn fill(template: &str, column: &str, value: &str) -> String {
    template.replace("{0}", column).replace("{1}", value)
}

/// Prepare a leaf operand for binding: wildcard operators wrap the text,
/// case-insensitive operators upper-case it, everything else binds flat.
fn decorate(operator: Operator, value: &Value) -> Value {
    let text = match value {
        Value::String(text) => text,
        _ => return value.bind(),
    };
    let text = if operator.is_insensitive() {
        text.to_uppercase()
    } else {
        text.clone()
    };
    let text = match operator {
        Operator::Contains | Operator::ContainsIgnoreCase => format!("%{text}%"),
        Operator::Starts | Operator::StartsIgnoreCase => format!("{text}%"),
        Operator::Ends | Operator::EndsIgnoreCase => format!("%{text}"),
        _ => text,
    };
    Value::String(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{EntitySchema, KeyDef, ModelConfig};
    use crate::sql::AnsiDialect;
    use crate::value::ValueType;

    fn model() -> MetaModel {
        let model = MetaModel::new(ModelConfig::default());
        model
            .register(
                EntitySchema::new("ord_customer")
                    .with_alias("x_ord_customer")
                    .key(KeyDef::primary("ID", ValueType::Int64))
                    .key(KeyDef::column("NAME", ValueType::String).nullable()),
            )
            .unwrap();
        model
            .register(
                EntitySchema::new("ord_order")
                    .with_alias("x_ord_order")
                    .key(KeyDef::primary("ID", ValueType::Int64))
                    .key(KeyDef::column("NOTE", ValueType::String).nullable())
                    .key(KeyDef::to_one("CUSTOMER", "ord_customer")),
            )
            .unwrap();
        model
    }

    fn decode(model: &MetaModel, query: &Query) -> (String, Vec<Value>) {
        let decoder = CriterionDecoder::new(model, &AnsiDialect, query).unwrap();
        (
            decoder.where_sql().trim_end().to_owned(),
            decoder.params().to_vec(),
        )
    }

    #[test]
    fn test_grouped_or_child_spacing() {
        let model = model();
        let id = model.key("ord_order", "ID").unwrap();
        let crn = Criterion::leaf(id.clone(), Operator::NotEq, Value::Null)
            .unwrap()
            .and(
                Criterion::leaf(id.clone(), Operator::Gt, Value::Int64(0))
                    .unwrap()
                    .or(Criterion::leaf(id, Operator::Lt, Value::Int64(0)).unwrap()),
            );

        let (sql, params) = decode(&model, &Query::new("ord_order", crn));
        assert_eq!(
            sql,
            "x_ord_order.ID IS NOT NULL AND  (x_ord_order.ID>? OR x_ord_order.ID<?)"
        );
        assert_eq!(params, vec![Value::Int64(0), Value::Int64(0)]);
    }

    #[test]
    fn test_same_combinator_stays_flat() {
        let model = model();
        let id = model.key("ord_order", "ID").unwrap();
        let crn = Criterion::leaf(id.clone(), Operator::Gt, Value::Int64(1))
            .unwrap()
            .and(Criterion::leaf(id.clone(), Operator::Lt, Value::Int64(9)).unwrap())
            .and(Criterion::leaf(id, Operator::NotEq, Value::Int64(5)).unwrap());

        let (sql, _) = decode(&model, &Query::new("ord_order", crn));
        assert_eq!(
            sql,
            "x_ord_order.ID>? AND x_ord_order.ID<? AND x_ord_order.ID<>?"
        );
    }

    #[test]
    fn test_null_literal_renders_is_null_and_binds_nothing() {
        let model = model();
        let note = model.key("ord_order", "NOTE").unwrap();

        let crn = Criterion::leaf(note.clone(), Operator::Eq, Value::Null).unwrap();
        let (sql, params) = decode(&model, &Query::new("ord_order", crn));
        assert_eq!(sql, "x_ord_order.NOTE IS NULL");
        assert!(params.is_empty());

        let crn = Criterion::leaf(note, Operator::NotEq, Value::Null).unwrap();
        let (sql, params) = decode(&model, &Query::new("ord_order", crn));
        assert_eq!(sql, "x_ord_order.NOTE IS NOT NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_wildcard_decoration() {
        let model = model();
        let note = model.key("ord_order", "NOTE").unwrap();

        let crn = Criterion::leaf(note.clone(), Operator::Contains, Value::from("abc")).unwrap();
        let (sql, params) = decode(&model, &Query::new("ord_order", crn));
        assert_eq!(sql, "x_ord_order.NOTE LIKE ?");
        assert_eq!(params, vec![Value::from("%abc%")]);

        let crn = Criterion::leaf(note.clone(), Operator::Starts, Value::from("abc")).unwrap();
        let (_, params) = decode(&model, &Query::new("ord_order", crn));
        assert_eq!(params, vec![Value::from("abc%")]);

        let crn =
            Criterion::leaf(note, Operator::EndsIgnoreCase, Value::from("abc")).unwrap();
        let (sql, params) = decode(&model, &Query::new("ord_order", crn));
        assert_eq!(sql, "UPPER(x_ord_order.NOTE) LIKE ?");
        assert_eq!(params, vec![Value::from("%ABC")]);
    }

    #[test]
    fn test_in_placeholders() {
        let model = model();
        let id = model.key("ord_order", "ID").unwrap();
        let members = vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)];

        let crn = Criterion::leaf(id.clone(), Operator::In, members.clone()).unwrap();
        let (sql, params) = decode(&model, &Query::new("ord_order", crn));
        assert_eq!(sql, "x_ord_order.ID IN (?,?,?)");
        assert_eq!(params.len(), 3);

        let crn = Criterion::leaf(id, Operator::NotIn, members).unwrap();
        let (sql, _) = decode(&model, &Query::new("ord_order", crn));
        assert_eq!(sql, "NOT x_ord_order.ID IN (?,?,?)");
    }

    #[test]
    fn test_constants() {
        let model = model();
        let (sql, params) = decode(&model, &Query::new("ord_order", Criterion::constant(true)));
        assert_eq!(sql, "1=1");
        assert!(params.is_empty());

        let (sql, _) = decode(&model, &Query::new("ord_order", Criterion::constant(false)));
        assert_eq!(sql, "1=0");
    }

    #[test]
    fn test_relation_path_registers_join() {
        let model = model();
        let path = model.path("ord_order", &["CUSTOMER", "NAME"]).unwrap();
        let crn = Criterion::eq(path, "Alice").unwrap();
        let query = Query::new("ord_order", crn);
        let decoder = CriterionDecoder::new(&model, &AnsiDialect, &query).unwrap();

        assert_eq!(
            decoder.where_sql().trim_end(),
            "x_ord_customer.NAME=? AND (x_ord_order.CUSTOMER=x_ord_customer.ID)"
        );
        let tables: Vec<&str> = decoder.tables().iter().map(|t| t.name()).collect();
        assert_eq!(tables, vec!["ord_order", "ord_customer"]);
    }

    #[test]
    fn test_duplicate_paths_register_one_join() {
        let model = model();
        let path = model.path("ord_order", &["CUSTOMER", "NAME"]).unwrap();
        let crn = Criterion::eq(path.clone(), "Alice")
            .unwrap()
            .or(Criterion::eq(path, "Bob").unwrap());
        let query = Query::new("ord_order", crn);
        let decoder = CriterionDecoder::new(&model, &AnsiDialect, &query).unwrap();

        assert_eq!(decoder.tables().len(), 2);
        assert_eq!(
            decoder.where_sql().trim_end(),
            "(x_ord_customer.NAME=? OR x_ord_customer.NAME=?) \
             AND (x_ord_order.CUSTOMER=x_ord_customer.ID)"
        );
    }

    #[test]
    fn test_or_criterion_groups_before_joins() {
        let model = model();
        let path = model.path("ord_order", &["CUSTOMER", "NAME"]).unwrap();
        let note = model.key("ord_order", "NOTE").unwrap();
        // One disjunct crosses a relation: the join must constrain both, so
        // the disjunction gets its own parentheses.
        let crn = Criterion::eq(path, "Alice")
            .unwrap()
            .or(Criterion::eq(note, "rush").unwrap());
        let query = Query::new("ord_order", crn);
        let decoder = CriterionDecoder::new(&model, &AnsiDialect, &query).unwrap();

        assert_eq!(
            decoder.where_sql().trim_end(),
            "(x_ord_customer.NAME=? OR x_ord_order.NOTE=?) \
             AND (x_ord_order.CUSTOMER=x_ord_customer.ID)"
        );
    }

    #[test]
    fn test_key_operand_prints_column() {
        let model = model();
        let id = model.key("ord_order", "ID").unwrap();
        let path = model.path("ord_order", &["CUSTOMER", "ID"]).unwrap();
        let crn = Criterion::leaf(id, Operator::Eq, path).unwrap();

        let (sql, params) = decode(&model, &Query::new("ord_order", crn));
        assert_eq!(
            sql,
            "x_ord_order.ID=x_ord_customer.ID AND (x_ord_order.CUSTOMER=x_ord_customer.ID)"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_raw_sql_leaf_prints_parenthesized() {
        let model = model();
        let id = model.key("ord_order", "ID").unwrap();
        let crn = Criterion::sql(id, "ID % 2 = 0").unwrap();
        let (sql, params) = decode(&model, &Query::new("ord_order", crn));
        assert_eq!(sql, "(ID % 2 = 0)");
        assert!(params.is_empty());
    }

    #[test]
    fn test_ordering_path_registers_join() {
        let model = model();
        let path = model.path("ord_order", &["CUSTOMER", "NAME"]).unwrap();
        let query = Query::for_all("ord_order").order_by(path.clone());
        let decoder = CriterionDecoder::new(&model, &AnsiDialect, &query).unwrap();

        assert_eq!(
            decoder.where_sql(),
            "x_ord_order.CUSTOMER=x_ord_customer.ID"
        );
        assert_eq!(
            decoder.resolve_column(&path).unwrap(),
            "x_ord_customer.NAME"
        );
    }

    #[test]
    fn test_foreign_anchor_rejected() {
        let model = model();
        let name = model.key("ord_customer", "NAME").unwrap();
        let crn = Criterion::eq(name, "Alice").unwrap();
        let query = Query::new("ord_order", crn);
        assert!(CriterionDecoder::new(&model, &AnsiDialect, &query).is_err());
    }

    #[test]
    fn test_unconstrained_query_decodes_empty() {
        let model = model();
        let query = Query::for_all("ord_order");
        let decoder = CriterionDecoder::new(&model, &AnsiDialect, &query).unwrap();
        assert!(decoder.where_sql().is_empty());
        assert!(decoder.params().is_empty());
    }
}
