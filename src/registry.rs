//! Table-name → schema registry used to resolve relation filters.
//!
//! Registration happens in two phases. During startup a [`RegistryBuilder`]
//! collects every model; [`RegistryBuilder::freeze`] then validates all
//! relations and hands back an immutable [`SchemaRegistry`] that is shared
//! across request handlers. There is no way to register a table after the
//! freeze.

use std::collections::HashMap;
use std::sync::Arc;

use crate::builder::Builder;
use crate::config::Config;
use crate::dialect::{Dialect, SqlGenerator};
use crate::error::SchemaError;
use crate::model::Model;
use crate::operator::Operator;
use crate::schema::{ModelDef, Settings, TableSchema};

/// Construction-phase registry.
pub struct RegistryBuilder {
    generator: Arc<dyn SqlGenerator>,
    settings: Settings,
    tables: HashMap<String, Arc<TableSchema>>,
    order: Vec<String>,
}

impl RegistryBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self::with_generator(dialect.generator())
    }

    /// Use a custom dialect implementation.
    pub fn with_generator(generator: Arc<dyn SqlGenerator>) -> Self {
        Self {
            generator,
            settings: Settings::default(),
            tables: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.dialect).settings(config.settings())
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Extract and register a model, returning its typed builder.
    pub fn register<M: Model>(&mut self) -> Result<Builder<M>, SchemaError> {
        let schema = self.register_def(M::definition())?;
        Ok(Builder::from_schema(schema))
    }

    /// Extract and register an untyped declaration.
    pub fn register_def(&mut self, def: ModelDef) -> Result<Arc<TableSchema>, SchemaError> {
        if self.tables.contains_key(def.table_name()) {
            return Err(SchemaError::DuplicateTable(def.table_name().to_string()));
        }
        let schema = Arc::new(TableSchema::extract(def, self.generator.clone(), &self.settings)?);
        tracing::debug!(table = %schema.name(), "registered table");
        self.order.push(schema.name().to_string());
        self.tables.insert(schema.name().to_string(), schema.clone());
        Ok(schema)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Validate every relation and freeze the registry.
    ///
    /// A relation is valid when its target is registered, its source column
    /// exists on the owning table and supports `_in`, and (for direct
    /// relations) its destination column exists on the target; for
    /// associative relations the end field must exist on the target.
    pub fn freeze(self) -> Result<SchemaRegistry, SchemaError> {
        for name in &self.order {
            let table = &self.tables[name];
            for rel in table.relations() {
                let target = self.tables.get(&rel.target).ok_or_else(|| SchemaError::UnknownTarget {
                    table: table.name().to_string(),
                    relation: rel.name.clone(),
                    target: rel.target.clone(),
                })?;

                if !table.column_names().contains(&rel.src) {
                    return Err(unknown_column(table, &rel.name, table.name(), &rel.src));
                }
                let filterable = table
                    .operations(&rel.src)
                    .is_some_and(|ops| ops.supports(Operator::In));
                if !filterable {
                    return Err(SchemaError::SourceNotFilterable {
                        table: table.name().to_string(),
                        relation: rel.name.clone(),
                        column: rel.src.clone(),
                    });
                }

                match (&rel.through, &rel.end_field) {
                    (None, _) if !target.column_names().contains(&rel.dest) => {
                        return Err(unknown_column(table, &rel.name, target.name(), &rel.dest));
                    }
                    (Some(_), Some(end)) if !target.column_names().contains(end) => {
                        return Err(unknown_column(table, &rel.name, target.name(), end));
                    }
                    _ => {}
                }
            }
        }

        tracing::info!(tables = self.tables.len(), "schema registry frozen");
        Ok(SchemaRegistry {
            tables: self.tables,
        })
    }
}

fn unknown_column(table: &TableSchema, relation: &str, owner: &str, column: &str) -> SchemaError {
    SchemaError::UnknownColumn {
        table: table.name().to_string(),
        relation: relation.to_string(),
        owner: owner.to_string(),
        column: column.to_string(),
    }
}

/// Frozen, read-only registry. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct SchemaRegistry {
    tables: HashMap<String, Arc<TableSchema>>,
}

impl SchemaRegistry {
    pub fn get(&self, table: &str) -> Option<&Arc<TableSchema>> {
        self.tables.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableSchema>> {
        self.tables.values()
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
