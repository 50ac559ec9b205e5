//! The closed operator set.

use std::fmt;

/// Leaf comparison operators.
///
/// Each operator carries a fixed arity (single value, or a collection for
/// the IN family) and a fixed applicability: the text family rejects
/// non-text keys at criterion construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Equal; renders `IS NULL` against a NULL literal.
    Eq,
    /// Not equal; renders `IS NOT NULL` against a NULL literal.
    NotEq,
    /// Greater than.
    Gt,
    /// Greater or equal.
    Ge,
    /// Less than.
    Lt,
    /// Less or equal.
    Le,
    /// Membership in a value collection.
    In,
    /// Non-membership in a value collection.
    NotIn,
    /// Full regular-expression match.
    Regexp,
    /// Negated regular-expression match.
    NotRegexp,
    /// Text prefix match.
    Starts,
    /// Text suffix match.
    Ends,
    /// Text substring match.
    Contains,
    /// Case-insensitive equality.
    EqIgnoreCase,
    /// Case-insensitive prefix match.
    StartsIgnoreCase,
    /// Case-insensitive suffix match.
    EndsIgnoreCase,
    /// Case-insensitive substring match.
    ContainsIgnoreCase,
    /// Escape hatch: a named operator resolved by the dialect.
    User(&'static str),
    /// Escape hatch: a raw SQL leaf; never evaluable in memory.
    Sql,
}

impl Operator {
    /// Operators applicable to text-typed keys only.
    pub fn is_text_only(&self) -> bool {
        matches!(
            self,
            Operator::Starts
                | Operator::Ends
                | Operator::Contains
                | Operator::EqIgnoreCase
                | Operator::StartsIgnoreCase
                | Operator::EndsIgnoreCase
                | Operator::ContainsIgnoreCase
                | Operator::Regexp
                | Operator::NotRegexp
        )
    }

    /// Operators taking a value collection.
    pub fn takes_collection(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    /// Case-insensitive text operators; their bound value is upper-cased.
    pub fn is_insensitive(&self) -> bool {
        matches!(
            self,
            Operator::EqIgnoreCase
                | Operator::StartsIgnoreCase
                | Operator::EndsIgnoreCase
                | Operator::ContainsIgnoreCase
        )
    }

    /// Stable operator name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq => "EQ",
            Operator::NotEq => "NOT_EQ",
            Operator::Gt => "GT",
            Operator::Ge => "GE",
            Operator::Lt => "LT",
            Operator::Le => "LE",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::Regexp => "REGEXP",
            Operator::NotRegexp => "NOT_REGEXP",
            Operator::Starts => "STARTS",
            Operator::Ends => "ENDS",
            Operator::Contains => "CONTAINS",
            Operator::EqIgnoreCase => "EQ_I",
            Operator::StartsIgnoreCase => "STARTS_I",
            Operator::EndsIgnoreCase => "ENDS_I",
            Operator::ContainsIgnoreCase => "CONTAINS_I",
            Operator::User(name) => name,
            Operator::Sql => "SQL",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Binary tree combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    /// Logical conjunction.
    And,
    /// Logical disjunction.
    Or,
}

impl BinaryOperator {
    /// SQL keyword.
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
