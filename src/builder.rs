//! Typed per-model builder.
//!
//! A [`Builder`] is created once per model by
//! [`RegistryBuilder::register`](crate::registry::RegistryBuilder::register)
//! and is cheap to clone. Every compile method takes its own [`Params`]
//! accumulator; placeholders continue from whatever is already bound there.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{Clause, CompileError, ScanError};
use crate::filter::Filter;
use crate::model::{Model, RowReader, RowSource};
use crate::operator::Operator;
use crate::order::{OrderSpec, Page};
use crate::params::Params;
use crate::registry::SchemaRegistry;
use crate::schema::TableSchema;
use crate::value::Value;

pub struct Builder<M> {
    schema: Arc<TableSchema>,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for Builder<M> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            _model: PhantomData,
        }
    }
}

impl<M> fmt::Debug for Builder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder").field("schema", &self.schema).finish()
    }
}

impl<M: Model> Builder<M> {
    pub(crate) fn from_schema(schema: Arc<TableSchema>) -> Self {
        Self {
            schema,
            _model: PhantomData,
        }
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// The quoted table name.
    pub fn table(&self) -> String {
        self.schema.table()
    }

    /// Comma-separated quoted columns, qualified with `prefix` when non-empty.
    pub fn fields(&self, prefix: &str) -> String {
        self.schema.fields_sql(prefix)
    }

    pub fn column_names(&self) -> &[String] {
        self.schema.column_names()
    }

    /// Column list and VALUES rows for an INSERT of `models`.
    ///
    /// Audit columns are left to the database. The primary key is generated
    /// when the model has a key generator (each generated key is appended to
    /// `keys`), written from the model when caller-supplied keys are enabled,
    /// and omitted otherwise.
    pub fn values(
        &self,
        models: &[M],
        params: &mut Params,
        keys: &mut Vec<Value>,
    ) -> Result<(String, String), CompileError> {
        let (mark, keys_mark) = (params.len(), keys.len());
        self.compile_values(models, params, keys).map_err(|e| {
            params.truncate(mark);
            keys.truncate(keys_mark);
            e.in_clause(Clause::Values, self.schema.name())
        })
    }

    fn compile_values(
        &self,
        models: &[M],
        params: &mut Params,
        keys: &mut Vec<Value>,
    ) -> Result<(String, String), CompileError> {
        if models.is_empty() {
            return Err(CompileError::NoModels);
        }

        let schema = &self.schema;
        let g = schema.generator();
        let key_generator = schema.key_generator.as_deref();
        let included: Vec<_> = schema
            .fields()
            .iter()
            .filter(|f| {
                if f.is_primary_key() {
                    key_generator.is_some() || schema.insert_keys
                } else {
                    !schema.is_audit_column(&f.column)
                }
            })
            .collect();

        let mut rows = Vec::with_capacity(models.len());
        for model in models {
            let values = self.model_values(model)?;
            let mut placeholders = Vec::with_capacity(included.len());
            for field in &included {
                let value = match key_generator {
                    Some(generator) if field.is_primary_key() => {
                        let key = generator.generate(field).map_err(|source| {
                            CompileError::GeneratorFailed {
                                column: field.column.clone(),
                                source,
                            }
                        })?;
                        keys.push(key.clone());
                        key
                    }
                    _ => values[field.position].clone(),
                };
                placeholders.push(params.push(value, g));
            }
            rows.push(format!("({})", placeholders.join(", ")));
        }

        let columns = included
            .iter()
            .map(|f| g.quote_identifier(&f.column))
            .collect::<Vec<_>>()
            .join(", ");
        Ok((columns, rows.join(", ")))
    }

    /// `col = placeholder` assignments for every non-key column of `model`.
    ///
    /// When `target` is given it is replaced with the primary-key equality
    /// filter `{pk: {"_eq": "<key text>"}}`.
    pub fn set(
        &self,
        model: &M,
        params: &mut Params,
        target: Option<&mut Filter>,
    ) -> Result<String, CompileError> {
        let mark = params.len();
        self.compile_set(model, params, target).map_err(|e| {
            params.truncate(mark);
            e.in_clause(Clause::Set, self.schema.name())
        })
    }

    fn compile_set(
        &self,
        model: &M,
        params: &mut Params,
        target: Option<&mut Filter>,
    ) -> Result<String, CompileError> {
        let values = self.model_values(model)?;
        let pk = self.schema.primary_key();

        if let Some(target) = target {
            let key = &values[pk.position];
            let text = key.key_text().ok_or_else(|| CompileError::UnsupportedValueKind {
                column: pk.column.clone(),
                kind: key.kind(),
            })?;
            *target = Filter::field(pk.column.clone(), Operator::Eq, text);
        }

        let g = self.schema.generator();
        let assignments: Vec<String> = self
            .schema
            .fields()
            .iter()
            .filter(|f| !f.is_primary_key())
            .map(|f| {
                let placeholder = params.push(values[f.position].clone(), g);
                format!("{} = {}", g.quote_identifier(&f.column), placeholder)
            })
            .collect();
        Ok(assignments.join(", "))
    }

    fn model_values(&self, model: &M) -> Result<Vec<Value>, CompileError> {
        let values = model.values();
        let expected = self.schema.fields().len();
        if values.len() != expected {
            return Err(CompileError::ModelShape {
                expected,
                got: values.len(),
            });
        }
        Ok(values)
    }

    /// WHERE fragment for a SELECT.
    pub fn where_clause(
        &self,
        filter: &Filter,
        params: &mut Params,
        registry: &SchemaRegistry,
    ) -> Result<String, CompileError> {
        self.schema.compile_where(Clause::Where, filter, params, registry)
    }

    /// WHERE fragment for an UPDATE.
    pub fn where_update(
        &self,
        filter: &Filter,
        params: &mut Params,
        registry: &SchemaRegistry,
    ) -> Result<String, CompileError> {
        self.schema.compile_where(Clause::WhereUpdate, filter, params, registry)
    }

    /// WHERE fragment for a DELETE.
    pub fn where_delete(
        &self,
        filter: &Filter,
        params: &mut Params,
        registry: &SchemaRegistry,
    ) -> Result<String, CompileError> {
        self.schema.compile_where(Clause::WhereDelete, filter, params, registry)
    }

    pub fn order(&self, spec: &OrderSpec) -> String {
        self.schema.order_sql(spec)
    }

    pub fn paginate(&self, page: &Page) -> String {
        self.schema.paginate_sql(page)
    }

    /// Map result rows onto new models, positionally.
    pub fn scan<R: RowSource>(&self, rows: impl IntoIterator<Item = R>) -> Result<Vec<M>, ScanError> {
        let expected = self.schema.fields().len();
        rows.into_iter()
            .map(|row| {
                let values = row.into_values()?;
                if values.len() != expected {
                    return Err(ScanError::ColumnCount {
                        expected,
                        got: values.len(),
                    });
                }
                M::from_row(&mut RowReader::new(values))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::error::BoxError;
    use crate::keygen::UuidV7;
    use crate::registry::RegistryBuilder;
    use crate::schema::{Field, ModelDef};
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: i64,
        body: String,
        created_at: Option<String>,
    }

    impl Model for Note {
        fn definition() -> ModelDef {
            ModelDef::new("notes").column("id").column("body").column("created_at")
        }

        fn values(&self) -> Vec<Value> {
            vec![self.id.into(), self.body.clone().into(), self.created_at.clone().into()]
        }

        fn from_row(row: &mut RowReader) -> Result<Self, ScanError> {
            Ok(Note {
                id: row.next()?,
                body: row.next()?,
                created_at: row.next()?,
            })
        }
    }

    fn note(id: i64, body: &str) -> Note {
        Note {
            id,
            body: body.to_string(),
            created_at: None,
        }
    }

    fn builder() -> Builder<Note> {
        RegistryBuilder::new(Dialect::Postgres).register::<Note>().unwrap()
    }

    #[test]
    fn test_values_skips_key_and_audit_columns() {
        let b = builder();
        let mut params = Params::new();
        let mut keys = Vec::new();
        let (columns, rows) = b
            .values(&[note(1, "a"), note(2, "b")], &mut params, &mut keys)
            .unwrap();
        assert_eq!(columns, "\"body\"");
        assert_eq!(rows, "($1), ($2)");
        assert_eq!(params.into_vec(), vec![Value::from("a"), Value::from("b")]);
        assert!(keys.is_empty());
    }

    #[test]
    fn test_values_with_external_keys() {
        let mut registry = RegistryBuilder::new(Dialect::Postgres);
        registry
            .register_def(Note::definition().insert_keys(true))
            .unwrap();
        let b = Builder::<Note>::from_schema(registry.freeze().unwrap().get("notes").unwrap().clone());
        let mut params = Params::new();
        let (columns, rows) = b.values(&[note(9, "a")], &mut params, &mut Vec::new()).unwrap();
        assert_eq!(columns, "\"id\", \"body\"");
        assert_eq!(rows, "($1, $2)");
        assert_eq!(params.as_slice()[0], Value::Int(9));
    }

    #[test]
    fn test_values_with_generator() {
        let mut registry = RegistryBuilder::new(Dialect::Postgres);
        let schema = registry
            .register_def(Note::definition().key_generator(UuidV7))
            .unwrap();
        let b = Builder::<Note>::from_schema(schema);
        let mut params = Params::new();
        let mut keys = Vec::new();
        let (columns, _) = b
            .values(&[note(0, "a"), note(0, "b")], &mut params, &mut keys)
            .unwrap();
        assert_eq!(columns, "\"id\", \"body\"");
        assert_eq!(keys.len(), 2);
        assert_eq!(params.as_slice()[0], keys[0]);
        assert_eq!(params.as_slice()[2], keys[1]);
    }

    #[test]
    fn test_values_generator_failure_is_wrapped() {
        let failing = |_: &Field| -> Result<Value, BoxError> { Err("sequence exhausted".into()) };
        let mut registry = RegistryBuilder::new(Dialect::Postgres);
        let schema = registry
            .register_def(Note::definition().key_generator(failing))
            .unwrap();
        let b = Builder::<Note>::from_schema(schema);
        let mut params = Params::new();
        let mut keys = Vec::new();
        let err = b.values(&[note(0, "a")], &mut params, &mut keys).unwrap_err();
        assert_eq!(
            err.to_string(),
            "error generating VALUES clause for table notes; check your filters"
        );
        assert!(matches!(err.root(), CompileError::GeneratorFailed { .. }));
        assert!(params.is_empty());
    }

    #[test]
    fn test_values_requires_models() {
        let err = builder().values(&[], &mut Params::new(), &mut Vec::new()).unwrap_err();
        assert!(matches!(err.root(), CompileError::NoModels));
    }

    #[test]
    fn test_set_derives_key_filter() {
        let b = builder();
        let mut params = Params::new();
        let mut target = Filter::new();
        let sql = b.set(&note(42, "x"), &mut params, Some(&mut target)).unwrap();
        assert_eq!(sql, "\"body\" = $1, \"created_at\" = $2");
        assert_eq!(target, Filter::from_json(r#"{"id": {"_eq": "42"}}"#).unwrap());
    }

    #[test]
    fn test_scan_checks_column_count() {
        let b = builder();
        let notes = b
            .scan(vec![vec![Value::Int(1), Value::from("a"), Value::Null]])
            .unwrap();
        assert_eq!(notes, vec![note(1, "a")]);

        let err = b.scan(vec![vec![Value::Int(1)]]).unwrap_err();
        assert!(matches!(err, ScanError::ColumnCount { expected: 3, got: 1 }));
    }
}
