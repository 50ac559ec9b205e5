//! Microsoft SQL Server dialect.

use crate::error::Error;
use crate::sql::dialect::SqlDialect;

/// SQL Server: OFFSET/FETCH pagination, no SELECT-level lock clause.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsSqlDialect;

impl SqlDialect for MsSqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn print_offset(&self, limit: Option<u64>, offset: u64, out: &mut String) {
        out.push_str(&format!(" OFFSET {offset} ROWS"));
        if let Some(limit) = limit {
            out.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
        }
    }

    fn print_lock(&self, _out: &mut String) -> Result<(), Error> {
        Err(Error::UnsupportedFeature {
            dialect: self.name(),
            feature: "pessimistic row locks".to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::Criterion;
    use crate::meta::{EntitySchema, KeyDef, MetaModel, ModelConfig};
    use crate::query::Query;
    use crate::sql::decoder::CriterionDecoder;
    use crate::value::ValueType;

    fn model() -> MetaModel {
        let model = MetaModel::new(ModelConfig::default());
        model
            .register(
                EntitySchema::new("ord_order")
                    .key(KeyDef::primary("ID", ValueType::Int64))
                    .key(KeyDef::column("NOTE", ValueType::String).nullable()),
            )
            .unwrap();
        model
    }

    #[test]
    fn test_offset_fetch_pagination() {
        let model = model();
        let id = model.key("ord_order", "ID").unwrap();
        let query = Query::for_all("ord_order")
            .order_by(id)
            .set_limit(10)
            .set_offset(20);
        let decoder = CriterionDecoder::new(&model, &MsSqlDialect, &query).unwrap();

        let statement = MsSqlDialect.print_select(&query, &decoder, false).unwrap();
        assert!(statement
            .sql
            .ends_with("ORDER BY ord_order.ID OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"));
    }

    #[test]
    fn test_lock_request_fails_fast() {
        let model = model();
        let query = Query::new("ord_order", Criterion::constant(true)).lock_for_update();
        let decoder = CriterionDecoder::new(&model, &MsSqlDialect, &query).unwrap();

        let err = MsSqlDialect.print_select(&query, &decoder, false).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature { .. }));
    }
}
