//! Comparison operators available to filters.
//!
//! Every filterable column carries a [`ColumnOperations`] set, fixed when its
//! schema is extracted: the base [`Operator`]s it supports plus any
//! [`CustomOperator`]s its attribute contributes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dialect::SqlGenerator;

/// Base comparison operators, keyed by their filter suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    ILike,
    NotILike,
    In,
    NotIn,
}

impl Operator {
    pub const ALL: [Operator; 12] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Like,
        Operator::NotLike,
        Operator::ILike,
        Operator::NotILike,
        Operator::In,
        Operator::NotIn,
    ];

    /// The filter suffix, e.g. `_eq`.
    pub fn suffix(&self) -> &'static str {
        match self {
            Operator::Eq => "_eq",
            Operator::Neq => "_neq",
            Operator::Gt => "_gt",
            Operator::Gte => "_gte",
            Operator::Lt => "_lt",
            Operator::Lte => "_lte",
            Operator::Like => "_like",
            Operator::NotLike => "_nlike",
            Operator::ILike => "_ilike",
            Operator::NotILike => "_nilike",
            Operator::In => "_in",
            Operator::NotIn => "_nin",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Operator> {
        Operator::ALL.into_iter().find(|op| op.suffix() == suffix)
    }

    pub fn arity(&self) -> Arity {
        match self {
            Operator::In | Operator::NotIn => Arity::Many,
            _ => Arity::One,
        }
    }

    /// Render `column <op> placeholder(s)`.
    ///
    /// `column` must already be quoted. For `_in`/`_nin` every placeholder
    /// is listed; an empty list renders a constant predicate.
    pub fn render(&self, column: &str, operands: &[String], generator: &dyn SqlGenerator) -> String {
        let first = operands.first().map(String::as_str).unwrap_or("NULL");
        match self {
            Operator::Eq => format!("{} = {}", column, first),
            Operator::Neq => format!("{} <> {}", column, first),
            Operator::Gt => format!("{} > {}", column, first),
            Operator::Gte => format!("{} >= {}", column, first),
            Operator::Lt => format!("{} < {}", column, first),
            Operator::Lte => format!("{} <= {}", column, first),
            Operator::Like => format!("{} LIKE {}", column, first),
            Operator::NotLike => format!("{} NOT LIKE {}", column, first),
            Operator::ILike => format!("{} {} {}", column, generator.case_insensitive_like(), first),
            Operator::NotILike => {
                format!("{} NOT {} {}", column, generator.case_insensitive_like(), first)
            }
            Operator::In if operands.is_empty() => "1 = 0".to_string(),
            Operator::NotIn if operands.is_empty() => "1 = 1".to_string(),
            Operator::In => format!("{} IN ({})", column, operands.join(", ")),
            Operator::NotIn => format!("{} NOT IN ({})", column, operands.join(", ")),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// How many placeholders an operator consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    One,
    Many,
}

type RenderFn = dyn Fn(&str, &[String]) -> String + Send + Sync;

/// A named operator contributed by a column's attribute, e.g. `_contains`
/// on an array column.
#[derive(Clone)]
pub struct CustomOperator {
    suffix: String,
    arity: Arity,
    render: Arc<RenderFn>,
}

impl CustomOperator {
    /// A single-operand operator.
    pub fn new<F>(suffix: impl Into<String>, render: F) -> Self
    where
        F: Fn(&str, &[String]) -> String + Send + Sync + 'static,
    {
        Self {
            suffix: suffix.into(),
            arity: Arity::One,
            render: Arc::new(render),
        }
    }

    /// An operator taking any number of operands.
    pub fn variadic<F>(suffix: impl Into<String>, render: F) -> Self
    where
        F: Fn(&str, &[String]) -> String + Send + Sync + 'static,
    {
        Self {
            suffix: suffix.into(),
            arity: Arity::Many,
            render: Arc::new(render),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn render(&self, column: &str, operands: &[String]) -> String {
        (self.render)(column, operands)
    }
}

impl fmt::Debug for CustomOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomOperator")
            .field("suffix", &self.suffix)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Result of looking up a suffix on a column.
#[derive(Debug, Clone, Copy)]
pub enum OperatorRef<'a> {
    Base(Operator),
    Custom(&'a CustomOperator),
}

impl OperatorRef<'_> {
    pub fn arity(&self) -> Arity {
        match self {
            OperatorRef::Base(op) => op.arity(),
            OperatorRef::Custom(op) => op.arity(),
        }
    }

    pub fn suffix(&self) -> &str {
        match self {
            OperatorRef::Base(op) => op.suffix(),
            OperatorRef::Custom(op) => op.suffix(),
        }
    }

    pub fn render(&self, column: &str, operands: &[String], generator: &dyn SqlGenerator) -> String {
        match self {
            OperatorRef::Base(op) => op.render(column, operands, generator),
            OperatorRef::Custom(op) => op.render(column, operands),
        }
    }
}

/// The operators one column supports.
#[derive(Debug, Clone, Default)]
pub struct ColumnOperations {
    base: Vec<Operator>,
    custom: BTreeMap<String, CustomOperator>,
}

impl ColumnOperations {
    /// The full base operator set.
    pub fn standard() -> Self {
        Self::only(Operator::ALL)
    }

    /// A restricted base set, e.g. equality and membership only for a
    /// binary-encoded identifier.
    pub fn only(ops: impl IntoIterator<Item = Operator>) -> Self {
        let mut base: Vec<Operator> = ops.into_iter().collect();
        base.sort();
        base.dedup();
        Self {
            base,
            custom: BTreeMap::new(),
        }
    }

    /// Add a custom operator.
    ///
    /// Base suffixes cannot be replaced; a custom operator reusing one is
    /// ignored and `false` is returned. Among custom operators the last
    /// registration wins.
    pub fn extend(&mut self, op: CustomOperator) -> bool {
        if Operator::from_suffix(op.suffix()).is_some() {
            return false;
        }
        self.custom.insert(op.suffix.clone(), op);
        true
    }

    pub fn supports(&self, op: Operator) -> bool {
        self.base.binary_search(&op).is_ok()
    }

    pub fn lookup(&self, suffix: &str) -> Option<OperatorRef<'_>> {
        if let Some(op) = Operator::from_suffix(suffix) {
            return self.supports(op).then_some(OperatorRef::Base(op));
        }
        self.custom.get(suffix).map(OperatorRef::Custom)
    }

    /// All suffixes, base first, in a stable order.
    pub fn suffixes(&self) -> Vec<&str> {
        self.base
            .iter()
            .map(|op| op.suffix())
            .chain(self.custom.keys().map(String::as_str))
            .collect()
    }
}
