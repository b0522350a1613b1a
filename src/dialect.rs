//! Dialect-specific SQL generation.
//!
//! Everything the compiler emits goes through a [`SqlGenerator`]: identifier
//! quoting, parameter placeholders and the handful of constructs that differ
//! between databases. The compiler itself never hardcodes a dialect.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Trait for dialect-specific SQL generation.
pub trait SqlGenerator: Send + Sync {
    /// Quote an identifier (table or column name).
    fn quote_identifier(&self, name: &str) -> String;

    /// Generate the parameter placeholder (e.g., $1, ?, ?1) for a 1-based index.
    fn placeholder(&self, index: usize) -> String;

    /// Case-insensitive LIKE operator (ILIKE vs LIKE).
    fn case_insensitive_like(&self) -> &str {
        "ILIKE"
    }

    /// Whether INSERT/UPDATE/DELETE can carry a RETURNING clause.
    fn supports_returning(&self) -> bool {
        true
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut sql = String::new();
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        if let Some(n) = offset {
            sql.push_str(&format!(" OFFSET {}", n));
        }
        sql
    }

    /// Quote a `table.column` pair.
    fn qualified(&self, table: &str, column: &str) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }
}

/// PostgreSQL generator: `"ident"`, `$n`.
pub struct PostgresGenerator;

impl SqlGenerator for PostgresGenerator {
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }
}

/// MySQL generator: `` `ident` ``, `?`.
pub struct MysqlGenerator;

impl SqlGenerator for MysqlGenerator {
    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    // MySQL collations are case-insensitive by default.
    fn case_insensitive_like(&self) -> &str {
        "LIKE"
    }

    fn supports_returning(&self) -> bool {
        false
    }
}

/// SQLite generator: `"ident"`, `?n`.
pub struct SqliteGenerator;

impl SqlGenerator for SqliteGenerator {
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    fn case_insensitive_like(&self) -> &str {
        "LIKE"
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    #[serde(alias = "mariadb")]
    #[value(name = "mysql")]
    MySQL,
    #[value(name = "sqlite")]
    SQLite,
}

impl Dialect {
    pub fn generator(&self) -> Arc<dyn SqlGenerator> {
        match self {
            Dialect::Postgres => Arc::new(PostgresGenerator),
            Dialect::MySQL => Arc::new(MysqlGenerator),
            Dialect::SQLite => Arc::new(SqliteGenerator),
        }
    }
}
