//! The query builder.
//!
//! A query wraps a criterion with ordering, projection, limit/offset and an
//! optional pessimistic-lock request; a session executes it.

use crate::criterion::Criterion;
use crate::key::{CompositeKey, Key};

/// One ordering term.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    /// Key path to order by; composite keys register their joins.
    pub key: CompositeKey,
    /// Descending order.
    pub descending: bool,
}

/// A declarative query over one base entity type.
#[derive(Debug, Clone)]
pub struct Query {
    entity: String,
    criterion: Option<Criterion>,
    order_by: Vec<SortKey>,
    columns: Option<Vec<Key>>,
    limit: Option<u64>,
    offset: u64,
    lock_request: bool,
}

impl Query {
    /// Query a base entity filtered by a criterion.
    pub fn new(entity: impl Into<String>, criterion: Criterion) -> Self {
        Query {
            entity: entity.into(),
            criterion: Some(criterion),
            order_by: Vec::new(),
            columns: None,
            limit: None,
            offset: 0,
            lock_request: false,
        }
    }

    /// Query all rows of a base entity.
    pub fn for_all(entity: impl Into<String>) -> Self {
        Query {
            entity: entity.into(),
            criterion: None,
            order_by: Vec::new(),
            columns: None,
            limit: None,
            offset: 0,
            lock_request: false,
        }
    }

    /// Append an ascending ordering term.
    pub fn order_by(mut self, key: impl Into<CompositeKey>) -> Self {
        self.order_by.push(SortKey {
            key: key.into(),
            descending: false,
        });
        self
    }

    /// Append a descending ordering term.
    pub fn order_by_desc(mut self, key: impl Into<CompositeKey>) -> Self {
        self.order_by.push(SortKey {
            key: key.into(),
            descending: true,
        });
        self
    }

    /// Project a subset of columns instead of the full column list.
    pub fn select(mut self, columns: Vec<Key>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Cap the result row count.
    pub fn set_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip leading result rows.
    pub fn set_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Request a pessimistic lock; the dialect appends its lock clause or
    /// fails fast when it has none.
    pub fn lock_for_update(mut self) -> Self {
        self.lock_request = true;
        self
    }

    /// Base entity name.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Filter criterion, if any.
    pub fn criterion(&self) -> Option<&Criterion> {
        self.criterion.as_ref()
    }

    /// Ordering terms.
    pub fn order_terms(&self) -> &[SortKey] {
        &self.order_by
    }

    /// Explicit projection, if any.
    pub fn columns(&self) -> Option<&[Key]> {
        self.columns.as_deref()
    }

    /// Row cap.
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Leading rows to skip.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Pessimistic lock requested.
    pub fn is_lock_request(&self) -> bool {
        self.lock_request
    }

    /// The row count the limited result set will produce, given the total
    /// match count: the offset is subtracted (floored at zero), then the
    /// limit caps what remains.
    pub fn limited_count(&self, total: u64) -> u64 {
        let mut result = total.saturating_sub(self.offset);
        if let Some(limit) = self.limit {
            if limit < result {
                result = limit;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::Criterion;

    fn query() -> Query {
        Query::new("ord_order", Criterion::constant(true))
    }

    #[test]
    fn test_limited_count_math() {
        // 10 total matching rows throughout.
        assert_eq!(query().set_limit(3).limited_count(10), 3);
        assert_eq!(query().set_offset(6).limited_count(10), 4);
        assert_eq!(query().set_limit(3).set_offset(6).limited_count(10), 3);
        assert_eq!(query().set_limit(10).set_offset(6).limited_count(10), 4);
        assert_eq!(query().set_limit(10).set_offset(20).limited_count(10), 0);
        assert_eq!(query().limited_count(10), 10);
    }
}
