//! # relq
//!
//! Compiles declarative JSON filters into parameterized SQL for models
//! registered at startup.
//!
//! ## Quick Example
//!
//! ```
//! use relq::prelude::*;
//!
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Model for User {
//!     fn definition() -> ModelDef {
//!         ModelDef::new("users").column("id").column("name")
//!     }
//!
//!     fn values(&self) -> Vec<Value> {
//!         vec![self.id.into(), self.name.clone().into()]
//!     }
//!
//!     fn from_row(row: &mut RowReader) -> Result<Self, ScanError> {
//!         Ok(User {
//!             id: row.next()?,
//!             name: row.next()?,
//!         })
//!     }
//! }
//!
//! # fn main() -> relq::Result<()> {
//! let mut registry = RegistryBuilder::new(Dialect::Postgres);
//! let users = registry.register::<User>()?;
//! let registry = registry.freeze()?;
//!
//! let filter = Filter::from_json(r#"{"name": {"_ilike": "%foo%"}}"#)?;
//! let mut params = Params::new();
//! let sql = users.where_clause(&filter, &mut params, &registry)?;
//! assert_eq!(sql, r#""name" ILIKE $1"#);
//! # Ok(())
//! # }
//! ```
//!
//! ## Filter operators
//!
//! | Suffix    | SQL           |
//! |-----------|---------------|
//! | `_eq`     | `=`           |
//! | `_neq`    | `<>`          |
//! | `_gt`     | `>`           |
//! | `_gte`    | `>=`          |
//! | `_lt`     | `<`           |
//! | `_lte`    | `<=`          |
//! | `_like`   | `LIKE`        |
//! | `_nlike`  | `NOT LIKE`    |
//! | `_ilike`  | `ILIKE`       |
//! | `_nilike` | `NOT ILIKE`   |
//! | `_in`     | `IN (..)`     |
//! | `_nin`    | `NOT IN (..)` |
//!
//! Objects combine with `_and`, `_or` and `_not`. A key naming a relation
//! filters on the related table through a sub-query.

pub mod builder;
pub mod catalog;
pub mod compiler;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod filter;
pub mod keygen;
pub mod model;
pub mod operator;
pub mod order;
pub mod params;
pub mod registry;
pub mod schema;
pub mod statement;
pub mod value;

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::builder::Builder;
    pub use crate::catalog::Catalog;
    pub use crate::config::Config;
    pub use crate::dialect::{Dialect, SqlGenerator};
    pub use crate::error::*;
    pub use crate::executor::Executor;
    pub use crate::filter::{Filter, Node};
    pub use crate::keygen::{KeyGenerator, UuidV4, UuidV7};
    pub use crate::model::{Model, RowReader, RowSource};
    pub use crate::operator::{CustomOperator, Operator};
    pub use crate::order::{Direction, OrderSpec, Page};
    pub use crate::params::Params;
    pub use crate::registry::{RegistryBuilder, SchemaRegistry};
    pub use crate::schema::{Attribute, ModelDef, RelationDef, Settings, TableSchema};
    pub use crate::statement::{Compiled, Query};
    pub use crate::value::{FromValue, Value, ValueKind};
}
