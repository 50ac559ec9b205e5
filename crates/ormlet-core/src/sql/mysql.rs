//! MySQL dialect.

use crate::error::Error;
use crate::meta::MetaTable;
use crate::sql::decoder::CriterionDecoder;
use crate::sql::dialect::{base_criterion_template, SqlDialect};
use crate::sql::SqlStatement;
use crate::Operator;

/// MySQL: native REGEXP support and multi-table DELETE syntax.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn criterion_template(&self, operator: Operator) -> Result<String, Error> {
        match operator {
            Operator::Regexp => Ok("{0} REGEXP {1}".to_owned()),
            Operator::NotRegexp => Ok("NOT ({0} REGEXP {1})".to_owned()),
            Operator::User(name) => self.user_operator_template(name).ok_or_else(|| {
                Error::UnsupportedFeature {
                    dialect: self.name(),
                    feature: format!("user operator {name}"),
                }
            }),
            _ => base_criterion_template(self.name(), operator),
        }
    }

    /// MySQL deletes through joins with the multi-table form: the base alias
    /// names what gets deleted, every referenced table joins in the WHERE.
    fn print_delete(
        &self,
        table: &MetaTable,
        decoder: &CriterionDecoder<'_>,
    ) -> Result<SqlStatement, Error> {
        let mut sql = String::with_capacity(64);
        sql.push_str("DELETE ");
        sql.push_str(table.alias());
        sql.push_str(" FROM ");
        for (i, referenced) in decoder.tables().iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            self.print_table_alias(referenced, &mut sql);
        }
        sql.push_str(" WHERE ");
        sql.push_str(decoder.where_sql().trim_end());
        Ok(SqlStatement {
            sql,
            params: decoder.params().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::Criterion;
    use crate::meta::{EntitySchema, KeyDef, MetaModel, ModelConfig};
    use crate::query::Query;
    use crate::value::{Value, ValueType};

    fn model() -> MetaModel {
        let model = MetaModel::new(ModelConfig::default());
        model
            .register(
                EntitySchema::new("ord_customer")
                    .key(KeyDef::primary("ID", ValueType::Int64))
                    .key(KeyDef::column("NAME", ValueType::String).nullable()),
            )
            .unwrap();
        model
            .register(
                EntitySchema::new("ord_order")
                    .key(KeyDef::primary("ID", ValueType::Int64))
                    .key(KeyDef::to_one("CUSTOMER", "ord_customer")),
            )
            .unwrap();
        model
    }

    #[test]
    fn test_regexp_template() {
        let model = model();
        let name = model.key("ord_customer", "NAME").unwrap();
        let crn = Criterion::leaf(name, Operator::Regexp, Value::from("A.*")).unwrap();
        let query = Query::new("ord_customer", crn);
        let decoder = CriterionDecoder::new(&model, &MySqlDialect, &query).unwrap();

        assert_eq!(decoder.where_sql(), "ord_customer.NAME REGEXP ?");
        assert_eq!(decoder.params(), &[Value::from("A.*")]);
    }

    #[test]
    fn test_multi_table_delete() {
        let model = model();
        let path = model.path("ord_order", &["CUSTOMER", "NAME"]).unwrap();
        let crn = Criterion::eq(path, "Alice").unwrap();
        let query = Query::new("ord_order", crn);
        let decoder = CriterionDecoder::new(&model, &MySqlDialect, &query).unwrap();
        let table = model.table("ord_order").unwrap();

        let statement = MySqlDialect.print_delete(&table, &decoder).unwrap();
        assert_eq!(
            statement.sql,
            "DELETE ord_order FROM ord_order ord_order, ord_customer ord_customer \
             WHERE ord_customer.NAME=? AND (ord_order.CUSTOMER=ord_customer.ID)"
        );
        assert_eq!(statement.params, vec![Value::from("Alice")]);
    }
}
