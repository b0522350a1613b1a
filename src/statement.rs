//! Full statement assembly on top of the clause compilers.
//!
//! Each statement starts from a fresh [`Params`] so placeholders run from 1.
//! INSERT, UPDATE and DELETE carry `RETURNING <fields>` on dialects that
//! support it.

use crate::builder::Builder;
use crate::error::{Clause, CompileError};
use crate::filter::Filter;
use crate::model::Model;
use crate::order::{OrderSpec, Page};
use crate::params::Params;
use crate::registry::SchemaRegistry;
use crate::schema::TableSchema;
use crate::value::Value;

/// A complete SQL statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Compiled {
    fn new(sql: String, params: Params) -> Self {
        Self {
            sql,
            params: params.into_vec(),
        }
    }
}

/// Everything that shapes a SELECT.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filter: Filter,
    pub order: OrderSpec,
    pub page: Option<Page>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn order(mut self, order: OrderSpec) -> Self {
        self.order = order;
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }
}

impl TableSchema {
    /// `SELECT <fields> FROM <table> [WHERE ..] [ORDER BY ..] [LIMIT ..]`.
    pub fn select(&self, query: &Query, registry: &SchemaRegistry) -> Result<Compiled, CompileError> {
        let mut params = Params::new();
        let mut sql = format!("SELECT {} FROM {}", self.fields_sql(""), self.table());

        let where_sql = self.compile_where(Clause::Where, &query.filter, &mut params, registry)?;
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        let order_sql = self.order_sql(&query.order);
        if !order_sql.is_empty() {
            sql.push(' ');
            sql.push_str(&order_sql);
        }

        if let Some(page) = &query.page {
            sql.push_str(&self.paginate_sql(page));
        }

        Ok(Compiled::new(sql, params))
    }

    /// `SELECT COUNT(*) FROM <table> [WHERE ..]`.
    pub fn count(&self, filter: &Filter, registry: &SchemaRegistry) -> Result<Compiled, CompileError> {
        let mut params = Params::new();
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.table());
        let where_sql = self.compile_where(Clause::Where, filter, &mut params, registry)?;
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        Ok(Compiled::new(sql, params))
    }

    /// `DELETE FROM <table> WHERE ..`.
    ///
    /// A filter that compiles to nothing deletes nothing: the statement gets
    /// `WHERE 1 = 0`.
    pub fn delete(&self, filter: &Filter, registry: &SchemaRegistry) -> Result<Compiled, CompileError> {
        let mut params = Params::new();
        let mut sql = format!("DELETE FROM {}", self.table());

        let where_sql = self.compile_where(Clause::WhereDelete, filter, &mut params, registry)?;
        sql.push_str(" WHERE ");
        if where_sql.is_empty() {
            tracing::warn!(table = %self.name(), "delete without conditions; matching no rows");
            sql.push_str("1 = 0");
        } else {
            sql.push_str(&where_sql);
        }

        self.push_returning(&mut sql);
        Ok(Compiled::new(sql, params))
    }

    fn push_returning(&self, sql: &mut String) {
        if self.generator().supports_returning() {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.fields_sql(""));
        }
    }
}

impl<M: Model> Builder<M> {
    pub fn select(&self, query: &Query, registry: &SchemaRegistry) -> Result<Compiled, CompileError> {
        self.schema().select(query, registry)
    }

    pub fn count(&self, filter: &Filter, registry: &SchemaRegistry) -> Result<Compiled, CompileError> {
        self.schema().count(filter, registry)
    }

    pub fn delete(&self, filter: &Filter, registry: &SchemaRegistry) -> Result<Compiled, CompileError> {
        self.schema().delete(filter, registry)
    }

    /// `INSERT INTO <table> (..) VALUES (..), .. [RETURNING ..]`.
    ///
    /// Generated primary keys are appended to `keys` in row order.
    pub fn insert(&self, models: &[M], keys: &mut Vec<Value>) -> Result<Compiled, CompileError> {
        let mut params = Params::new();
        let (columns, rows) = self.values(models, &mut params, keys)?;
        let mut sql = format!("INSERT INTO {} ({}) VALUES {}", self.table(), columns, rows);
        self.schema().push_returning(&mut sql);
        Ok(Compiled::new(sql, params))
    }

    /// `UPDATE <table> SET .. WHERE <pk> = .. [RETURNING ..]`.
    ///
    /// Fails with [`CompileError::UntargetedUpdate`] when the key column
    /// does not support `_eq`, since the statement would touch every row.
    pub fn update(&self, model: &M, registry: &SchemaRegistry) -> Result<Compiled, CompileError> {
        let mut params = Params::new();
        let mut target = Filter::new();
        let assignments = self.set(model, &mut params, Some(&mut target))?;
        let where_sql = self.where_update(&target, &mut params, registry)?;
        if where_sql.is_empty() {
            let table = self.schema().name();
            return Err(CompileError::UntargetedUpdate {
                table: table.to_string(),
            }
            .in_clause(Clause::WhereUpdate, table));
        }

        let mut sql = format!("UPDATE {} SET {}", self.table(), assignments);
        sql.push_str(" WHERE ");
        sql.push_str(&where_sql);
        self.schema().push_returning(&mut sql);
        Ok(Compiled::new(sql, params))
    }
}
