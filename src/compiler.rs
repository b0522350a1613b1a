//! Where-clause compiler.
//!
//! Turns a [`Filter`] into a SQL boolean fragment, binding every operand
//! through [`Params`]. Relation keys compile to correlated sub-queries built
//! from the target table's own schema, looked up in the [`SchemaRegistry`].
//!
//! Precedence inside one filter object:
//!
//! 1. `_not` (object), else `_and` (list), else `_or` (list). The first one
//!    present wins and every sibling key in that object is discarded.
//! 2. Otherwise each `{key: {suffix: operand}}` entry is compiled, in
//!    document order, and the fragments are joined with `AND`.
//!
//! Unknown columns, unknown suffixes and unknown relations contribute
//! nothing.

use crate::error::{Clause, CompileError};
use crate::filter::{self, Filter, Node};
use crate::operator::{Arity, Operator, OperatorRef};
use crate::params::Params;
use crate::registry::SchemaRegistry;
use crate::schema::{Relation, TableSchema};
use crate::value::{Value, ValueKind};

impl TableSchema {
    /// Compile `filter` for the given clause.
    ///
    /// On error the arguments bound by this call are removed again, so
    /// `params` is left as it was passed in.
    pub fn compile_where(
        &self,
        clause: Clause,
        filter: &Filter,
        params: &mut Params,
        registry: &SchemaRegistry,
    ) -> Result<String, CompileError> {
        let mark = params.len();
        self.compile_filter(filter, None, params, registry).map_err(|e| {
            params.truncate(mark);
            e.in_clause(clause, &self.name)
        })
    }

    /// `scope` qualifies column references when set.
    fn compile_filter(
        &self,
        filter: &Filter,
        scope: Option<&str>,
        params: &mut Params,
        registry: &SchemaRegistry,
    ) -> Result<String, CompileError> {
        if let Some(sql) = self.compile_combinator(filter, scope, params, registry)? {
            return Ok(sql);
        }

        let mut parts = Vec::new();
        for (key, node) in filter.entries() {
            let Node::Object(inner) = node else {
                tracing::debug!(table = %self.name, key, "filter entry is not an object; skipped");
                continue;
            };
            if let Some(sql) = self.compile_entry(key, inner, scope, params, registry)? {
                parts.push(sql);
            }
        }
        Ok(parts.join(" AND "))
    }

    fn compile_combinator(
        &self,
        filter: &Filter,
        scope: Option<&str>,
        params: &mut Params,
        registry: &SchemaRegistry,
    ) -> Result<Option<String>, CompileError> {
        if let Some(Node::Object(child)) = filter.get(filter::NOT) {
            self.warn_dropped_siblings(filter, filter::NOT);
            let sql = self.compile_filter(child, scope, params, registry)?;
            return Ok(Some(if sql.is_empty() {
                sql
            } else {
                format!("NOT ({})", sql)
            }));
        }

        for (key, joiner) in [(filter::AND, " AND "), (filter::OR, " OR ")] {
            if let Some(Node::List(children)) = filter.get(key) {
                self.warn_dropped_siblings(filter, key);
                let mut parts = Vec::new();
                for child in children {
                    let Node::Object(child) = child else {
                        tracing::debug!(table = %self.name, combinator = key, "non-object child skipped");
                        continue;
                    };
                    let sql = self.compile_filter(child, scope, params, registry)?;
                    if !sql.is_empty() {
                        parts.push(sql);
                    }
                }
                return Ok(Some(if parts.is_empty() {
                    String::new()
                } else {
                    format!("({})", parts.join(joiner))
                }));
            }
        }

        Ok(None)
    }

    fn warn_dropped_siblings(&self, filter: &Filter, kept: &str) {
        if filter.len() > 1 {
            let dropped: Vec<&str> = filter.keys().filter(|k| *k != kept).collect();
            tracing::warn!(
                table = %self.name,
                combinator = kept,
                dropped = ?dropped,
                "sibling filter keys discarded next to combinator"
            );
        }
    }

    /// One `{key: inner}` pair: a column with operators, or a relation.
    fn compile_entry(
        &self,
        key: &str,
        inner: &Filter,
        scope: Option<&str>,
        params: &mut Params,
        registry: &SchemaRegistry,
    ) -> Result<Option<String>, CompileError> {
        let mut parts = Vec::new();
        if let Some(ops) = self.operations(key) {
            for (suffix, operand) in inner.entries() {
                match ops.lookup(suffix) {
                    Some(op) => {
                        if let Some(sql) = self.compile_operation(key, op, operand, scope, params)? {
                            parts.push(sql);
                        }
                    }
                    None => {
                        tracing::debug!(table = %self.name, column = key, operator = suffix, "unknown operator; skipped")
                    }
                }
            }
        }

        if !parts.is_empty() {
            return Ok(Some(parts.join(" AND ")));
        }

        match self.relation(key) {
            Some(rel) => self.compile_relation(rel, inner, scope, params, registry),
            None => {
                if self.operations(key).is_none() {
                    tracing::debug!(table = %self.name, key, "unknown filter key; skipped");
                }
                Ok(None)
            }
        }
    }

    fn compile_operation(
        &self,
        column: &str,
        op: OperatorRef<'_>,
        operand: &Node,
        scope: Option<&str>,
        params: &mut Params,
    ) -> Result<Option<String>, CompileError> {
        let g = self.generator();
        let placeholders: Vec<String> = match operand {
            Node::Value(value) => {
                if value.is_null() {
                    tracing::debug!(table = %self.name, column, operator = op.suffix(), "null operand binds NULL; comparison never matches");
                }
                vec![params.push(value.clone(), g)]
            }
            Node::List(items) => {
                if op.arity() == Arity::One && items.len() != 1 {
                    return Err(CompileError::OperandArity {
                        column: column.to_string(),
                        operator: op.suffix().to_string(),
                        got: items.len(),
                    });
                }
                let texts = items
                    .iter()
                    .map(|item| list_item_text(column, item))
                    .collect::<Result<Vec<_>, _>>()?;
                texts
                    .into_iter()
                    .map(|text| params.push(Value::String(text), g))
                    .collect()
            }
            Node::Object(_) => {
                tracing::debug!(table = %self.name, column, operator = op.suffix(), "object operand; skipped");
                return Ok(None);
            }
        };
        Ok(Some(op.render(&self.column_ref(column, scope), &placeholders, g)))
    }

    fn column_ref(&self, column: &str, scope: Option<&str>) -> String {
        match scope {
            Some(table) => self.generator().qualified(table, column),
            None => self.generator().quote_identifier(column),
        }
    }

    /// `src IN (SELECT dest FROM [through JOIN] target WHERE inner)`
    ///
    /// Inner columns are qualified with the target table when the relation
    /// asks for it.
    fn compile_relation(
        &self,
        rel: &Relation,
        inner: &Filter,
        scope: Option<&str>,
        params: &mut Params,
        registry: &SchemaRegistry,
    ) -> Result<Option<String>, CompileError> {
        let Some(target) = registry.get(&rel.target) else {
            tracing::debug!(table = %self.name, relation = %rel.name, target = %rel.target, "relation target not registered; skipped");
            return Ok(None);
        };
        let Some(in_op) = self
            .operations(&rel.src)
            .and_then(|ops| ops.lookup(Operator::In.suffix()))
        else {
            tracing::debug!(table = %self.name, relation = %rel.name, column = %rel.src, "source column has no _in; skipped");
            return Ok(None);
        };

        let g = self.generator();
        let mut subquery = match (&rel.through, &rel.through_field, &rel.end_field) {
            (Some(through), Some(through_field), Some(end_field)) => format!(
                "SELECT {} FROM {} JOIN {} ON {} = {}",
                g.quote_identifier(&rel.dest),
                g.quote_identifier(through),
                target.table(),
                g.qualified(target.name(), end_field),
                g.qualified(through, through_field),
            ),
            (Some(_), _, _) => {
                tracing::debug!(table = %self.name, relation = %rel.name, "associative relation without join fields; skipped");
                return Ok(None);
            }
            (None, _, _) => format!("SELECT {} FROM {}", g.quote_identifier(&rel.dest), target.table()),
        };

        let inner_scope = rel.qualified.then(|| target.name());
        let condition = target.compile_filter(inner, inner_scope, params, registry)?;
        if !condition.is_empty() {
            subquery.push_str(" WHERE ");
            subquery.push_str(&condition);
        }

        Ok(Some(in_op.render(&self.column_ref(&rel.src, scope), &[subquery], g)))
    }
}

fn list_item_text(column: &str, item: &Node) -> Result<String, CompileError> {
    let kind = match item {
        Node::Value(value) => match value.to_text() {
            Some(text) => return Ok(text),
            None => value.kind(),
        },
        Node::List(_) => ValueKind::List,
        Node::Object(_) => ValueKind::Object,
    };
    Err(CompileError::UnsupportedValueKind {
        column: column.to_string(),
        kind,
    })
}
