//! Immutable predicate expression trees over keys.
//!
//! A criterion is built once and never mutated; `and`/`or` allocate new
//! nodes, so trees can be cached and shared freely. The same tree evaluates
//! two ways: directly in memory against live instances (this module), or
//! compiled into dialect-specific SQL (the `sql` module).

mod operator;

pub use operator::{BinaryOperator, Operator};

use std::fmt;

use crate::entity::SharedInstance;
use crate::error::Error;
use crate::key::{CompositeKey, Key};
use crate::value::{compare_values, values_equal, Value};

/// The right-hand side of a leaf comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A literal value.
    Value(Value),
    /// A value collection, for the IN family.
    Values(Vec<Value>),
    /// Another key of the same entity graph.
    Key(CompositeKey),
    /// Raw SQL text, for the `Sql` escape hatch.
    Sql(String),
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

impl From<Vec<Value>> for Operand {
    fn from(values: Vec<Value>) -> Self {
        Operand::Values(values)
    }
}

impl From<CompositeKey> for Operand {
    fn from(key: CompositeKey) -> Self {
        Operand::Key(key)
    }
}

impl From<Key> for Operand {
    fn from(key: Key) -> Self {
        Operand::Key(CompositeKey::from(key))
    }
}

/// An immutable predicate expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// A single comparison.
    Leaf {
        /// Left-hand key path.
        key: CompositeKey,
        /// Comparison operator.
        operator: Operator,
        /// Right-hand side.
        operand: Operand,
    },
    /// A binary combinator node.
    Binary {
        /// AND or OR.
        operator: BinaryOperator,
        /// Left child.
        left: Box<Criterion>,
        /// Right child.
        right: Box<Criterion>,
    },
    /// Always-true or always-false.
    Constant(bool),
}

impl Criterion {
    /// Build a leaf comparison, validating operator applicability.
    pub fn leaf(
        key: impl Into<CompositeKey>,
        operator: Operator,
        operand: impl Into<Operand>,
    ) -> Result<Criterion, Error> {
        let key = key.into();
        let operand = operand.into();

        if operator == Operator::Sql {
            return Err(Error::validation(
                "the raw SQL operator takes no key; use Criterion::sql",
            ));
        }
        if operator.is_text_only() && !key.last().value_type().is_text() {
            return Err(Error::validation(format!(
                "operator {} applies to text keys only, {} is {:?}",
                operator,
                key,
                key.last().value_type()
            )));
        }
        match (&operand, operator.takes_collection()) {
            (Operand::Values(values), true) => {
                if values.is_empty() {
                    return Err(Error::validation(format!(
                        "operator {operator} requires a non-empty value collection"
                    )));
                }
            }
            (Operand::Values(_), false) => {
                return Err(Error::validation(format!(
                    "operator {operator} takes a single value, not a collection"
                )));
            }
            (_, true) => {
                return Err(Error::validation(format!(
                    "operator {operator} requires a value collection"
                )));
            }
            (Operand::Sql(_), _) => {
                return Err(Error::validation(
                    "raw SQL operands belong to Criterion::sql",
                ));
            }
            _ => {}
        }
        if matches!(operator, Operator::Regexp | Operator::NotRegexp) {
            match &operand {
                Operand::Value(Value::String(pattern)) => {
                    regex::Regex::new(pattern).map_err(|e| {
                        Error::validation(format!("invalid pattern for {key}: {e}"))
                    })?;
                }
                _ => {
                    return Err(Error::validation(format!(
                        "operator {operator} requires a string pattern"
                    )));
                }
            }
        }
        if operator.is_text_only() && !matches!(operator, Operator::Regexp | Operator::NotRegexp) {
            match &operand {
                Operand::Value(Value::String(_)) => {}
                Operand::Key(right) if right.last().value_type().is_text() => {}
                _ => {
                    return Err(Error::validation(format!(
                        "operator {operator} requires a text operand"
                    )));
                }
            }
        }
        Ok(Criterion::Leaf {
            key,
            operator,
            operand,
        })
    }

    /// Shorthand for an equality leaf.
    pub fn eq(key: impl Into<CompositeKey>, value: impl Into<Value>) -> Result<Criterion, Error> {
        Criterion::leaf(key, Operator::Eq, Operand::Value(value.into()))
    }

    /// Build a raw SQL leaf anchored to a key of the base entity.
    ///
    /// The text is emitted parenthesized, binds no parameters and cannot be
    /// evaluated in memory; the anchor key only roots the leaf in a table.
    pub fn sql(key: impl Into<CompositeKey>, raw: impl Into<String>) -> Result<Criterion, Error> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("raw SQL criterion must not be empty"));
        }
        Ok(Criterion::Leaf {
            key: key.into(),
            operator: Operator::Sql,
            operand: Operand::Sql(trimmed.to_owned()),
        })
    }

    /// An always-true or always-false node.
    pub fn constant(value: bool) -> Criterion {
        Criterion::Constant(value)
    }

    /// Conjunction; allocates a new node.
    pub fn and(self, other: Criterion) -> Criterion {
        Criterion::Binary {
            operator: BinaryOperator::And,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// Disjunction; allocates a new node.
    pub fn or(self, other: Criterion) -> Criterion {
        Criterion::Binary {
            operator: BinaryOperator::Or,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// Evaluate the tree in memory against a live instance.
    ///
    /// Leaf reads are null-safe; NULL follows SQL three-valued semantics
    /// (ordered comparisons against NULL never hold). AND/OR short-circuit.
    pub fn evaluate(&self, entity: &SharedInstance) -> Result<bool, Error> {
        match self {
            Criterion::Constant(value) => Ok(*value),
            Criterion::Binary {
                operator,
                left,
                right,
            } => match operator {
                BinaryOperator::And => {
                    Ok(left.evaluate(entity)? && right.evaluate(entity)?)
                }
                BinaryOperator::Or => Ok(left.evaluate(entity)? || right.evaluate(entity)?),
            },
            Criterion::Leaf {
                key,
                operator,
                operand,
            } => evaluate_leaf(key, *operator, operand, entity),
        }
    }
}

fn evaluate_leaf(
    key: &CompositeKey,
    operator: Operator,
    operand: &Operand,
    entity: &SharedInstance,
) -> Result<bool, Error> {
    if matches!(operator, Operator::Sql | Operator::User(_)) {
        return Err(Error::validation(format!(
            "operator {operator} cannot be evaluated in memory"
        )));
    }

    let left = key.read(entity)?;
    let right = match operand {
        Operand::Value(value) => value.clone(),
        Operand::Key(right_key) => right_key.read(entity)?,
        Operand::Values(values) => {
            let found = values.iter().any(|v| values_equal(&left, v));
            return Ok(match operator {
                Operator::In => found,
                _ => !found,
            });
        }
        Operand::Sql(_) => {
            return Err(Error::validation(
                "raw SQL operands cannot be evaluated in memory",
            ));
        }
    };

    match operator {
        Operator::Eq => Ok(values_equal(&left, &right)),
        Operator::NotEq => Ok(!values_equal(&left, &right)),
        Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le => {
            if left.is_null() || right.is_null() {
                return Ok(false);
            }
            Ok(match compare_values(&left, &right) {
                Some(ordering) => match operator {
                    Operator::Gt => ordering.is_gt(),
                    Operator::Ge => ordering.is_ge(),
                    Operator::Lt => ordering.is_lt(),
                    _ => ordering.is_le(),
                },
                None => false,
            })
        }
        Operator::Regexp | Operator::NotRegexp => {
            let matched = match (&left, &right) {
                (Value::String(text), Value::String(pattern)) => {
                    // Validated at construction; full-string match like the
                    // SQL REGEXP operators this maps to.
                    let re = regex::Regex::new(&format!("^(?:{pattern})$"))
                        .map_err(|e| Error::validation(e.to_string()))?;
                    re.is_match(text)
                }
                _ => false,
            };
            Ok(if operator == Operator::Regexp {
                matched
            } else {
                !matched
            })
        }
        Operator::Starts
        | Operator::Ends
        | Operator::Contains
        | Operator::EqIgnoreCase
        | Operator::StartsIgnoreCase
        | Operator::EndsIgnoreCase
        | Operator::ContainsIgnoreCase => {
            if left.is_null() && right.is_null() {
                return Ok(true);
            }
            let (mut a, mut b) = match (&left, &right) {
                (Value::String(a), Value::String(b)) => (a.clone(), b.clone()),
                _ => return Ok(false),
            };
            if operator.is_insensitive() {
                a = a.to_uppercase();
                b = b.to_uppercase();
            }
            Ok(match operator {
                Operator::EqIgnoreCase => a == b,
                Operator::Starts | Operator::StartsIgnoreCase => a.starts_with(&b),
                Operator::Ends | Operator::EndsIgnoreCase => a.ends_with(&b),
                _ => a.contains(&b),
            })
        }
        Operator::In | Operator::NotIn | Operator::Sql | Operator::User(_) => {
            // In/NotIn are handled through the collection arm above.
            Err(Error::validation(format!(
                "operator {operator} cannot be evaluated here"
            )))
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Constant(value) => write!(f, "{value}"),
            Criterion::Binary {
                operator,
                left,
                right,
            } => write!(f, "({left} {operator} {right})"),
            Criterion::Leaf {
                key,
                operator,
                operand,
            } => match (operator, operand) {
                (Operator::Sql, Operand::Sql(raw)) => f.write_str(raw),
                (_, Operand::Value(value)) => write!(f, "{key} {operator} {value}"),
                (_, Operand::Key(right)) => write!(f, "{key} {operator} {right}"),
                (_, Operand::Values(values)) => {
                    write!(f, "{key} {operator} (")?;
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{value}")?;
                    }
                    f.write_str(")")
                }
                (_, Operand::Sql(raw)) => f.write_str(raw),
            },
        }
    }
}
