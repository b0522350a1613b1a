//! Table catalogs loaded from TOML.
//!
//! A catalog declares tables without Rust model types, for tools such as the
//! `relq` CLI that compile filters against a database they only know by
//! description.
//!
//! ```toml
//! [[tables]]
//! name = "users"
//! key = "uuid_v7"
//!
//! [[tables.columns]]
//! name = "id"
//!
//! [[tables.columns]]
//! name = "email"
//! operators = ["_eq", "_in", "_ilike"]
//!
//! [[tables.columns]]
//! name = "password_hash"
//! hidden = true
//!
//! [[tables.relations]]
//! name = "roles"
//! table = "roles"
//! many = true
//! through = "user_roles"
//! src = "id"
//! dest = "user_id"
//! through_field = "role_id"
//! end_field = "id"
//! qualified = true
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error};
use crate::keygen::{UuidV4, UuidV7};
use crate::operator::Operator;
use crate::registry::{RegistryBuilder, SchemaRegistry};
use crate::schema::{Attribute, ModelDef, RelationDef};

/// Catalog file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub tables: Vec<TableDef>,
}

/// Table definition in a catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub key: Option<KeyKind>,
    #[serde(default)]
    pub insert_keys: Option<bool>,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub relations: Vec<RelationEntry>,
}

/// Column definition; the first column is the primary key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub json: Option<String>,
    /// Restrict filtering to these suffixes; all base operators when absent
    #[serde(default)]
    pub operators: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationEntry {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub many: bool,
    #[serde(default)]
    pub through: Option<String>,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub dest: Option<String>,
    #[serde(default)]
    pub through_field: Option<String>,
    #[serde(default)]
    pub end_field: Option<String>,
    /// Qualify the inner filter's columns with the target table.
    #[serde(default)]
    pub qualified: bool,
}

/// Built-in primary key generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    UuidV4,
    UuidV7,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_toml_str(&content, &path.display().to_string())?;
        tracing::info!("Loaded {} table definitions from {}", catalog.tables.len(), path.display());
        Ok(catalog)
    }

    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Toml {
            path: origin.to_string(),
            source,
        })
    }

    /// Convert every table to a [`ModelDef`].
    pub fn model_defs(&self) -> Result<Vec<ModelDef>, ConfigError> {
        self.tables.iter().map(TableDef::to_model_def).collect()
    }

    /// Register every table and freeze the registry.
    pub fn into_registry(self, mut builder: RegistryBuilder) -> Result<SchemaRegistry, Error> {
        for def in self.model_defs()? {
            builder.register_def(def)?;
        }
        Ok(builder.freeze()?)
    }
}

impl TableDef {
    pub fn to_model_def(&self) -> Result<ModelDef, ConfigError> {
        let mut def = ModelDef::new(&self.name);
        for column in &self.columns {
            def = def.attribute(self.column_attribute(column)?);
        }
        for rel in &self.relations {
            def = def.relation(&rel.name, rel.to_relation_def());
        }
        match self.key {
            Some(KeyKind::UuidV4) => def = def.key_generator(UuidV4),
            Some(KeyKind::UuidV7) => def = def.key_generator(UuidV7),
            None => {}
        }
        if let Some(enabled) = self.insert_keys {
            def = def.insert_keys(enabled);
        }
        Ok(def)
    }

    fn column_attribute(&self, column: &ColumnDef) -> Result<Attribute, ConfigError> {
        let mut attr = Attribute::column(&column.name);
        if let Some(json) = &column.json {
            attr = attr.json(json);
        }
        if column.hidden {
            attr = attr.hidden();
        }
        if let Some(suffixes) = &column.operators {
            let ops = suffixes
                .iter()
                .map(|s| {
                    Operator::from_suffix(s).ok_or_else(|| ConfigError::UnknownOperator {
                        table: self.name.clone(),
                        column: column.name.clone(),
                        operator: s.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            attr = attr.operators(ops);
        }
        Ok(attr)
    }
}

impl RelationEntry {
    fn to_relation_def(&self) -> RelationDef {
        let mut def = match (&self.through, self.many) {
            (Some(through), _) => RelationDef::many_through(&self.table, through),
            (None, true) => RelationDef::many(&self.table),
            (None, false) => RelationDef::one(&self.table),
        };
        if let Some(src) = &self.src {
            def = def.src(src);
        }
        if let Some(dest) = &self.dest {
            def = def.dest(dest);
        }
        if let Some(field) = &self.through_field {
            def = def.through_field(field);
        }
        if let Some(field) = &self.end_field {
            def = def.end_field(field);
        }
        if self.qualified {
            def = def.qualified();
        }
        def
    }
}
