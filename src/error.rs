//! Error types for relq.

use std::fmt;

use thiserror::Error;

use crate::value::ValueKind;

/// Boxed error returned by pluggable collaborators such as key generators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while extracting a model's schema or freezing the registry.
///
/// These are startup failures: a process that hits one should not begin
/// serving traffic.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The model declares no column attributes, so it has no primary key.
    #[error("model for table '{0}' declares no columns; the first column is the primary key")]
    MissingPrimaryKey(String),

    /// The same column was declared twice on one model.
    #[error("column '{column}' declared twice on table '{table}'")]
    DuplicateColumn { table: String, column: String },

    /// A table was registered twice.
    #[error("table '{0}' is already registered")]
    DuplicateTable(String),

    /// A relation descriptor is missing one of its required parts.
    #[error("relation '{relation}' on table '{table}' is missing {missing}")]
    IncompleteRelation {
        table: String,
        relation: String,
        missing: &'static str,
    },

    /// A relation points at a table that was never registered.
    #[error("relation '{relation}' on table '{table}' targets unregistered table '{target}'")]
    UnknownTarget {
        table: String,
        relation: String,
        target: String,
    },

    /// A relation names a column that does not exist on the table it should live on.
    #[error("relation '{relation}' on table '{table}' references unknown column '{column}' of '{owner}'")]
    UnknownColumn {
        table: String,
        relation: String,
        owner: String,
        column: String,
    },

    /// A relation's source column cannot be matched with `_in`, so the
    /// relation could never be filtered on.
    #[error("relation '{relation}' on table '{table}' needs '_in' on source column '{column}'")]
    SourceNotFilterable {
        table: String,
        relation: String,
        column: String,
    },
}

/// The clause being generated when a compile error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Where,
    WhereUpdate,
    WhereDelete,
    Values,
    Set,
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Where => write!(f, "WHERE"),
            Clause::WhereUpdate => write!(f, "UPDATE WHERE"),
            Clause::WhereDelete => write!(f, "DELETE WHERE"),
            Clause::Values => write!(f, "VALUES"),
            Clause::Set => write!(f, "SET"),
        }
    }
}

/// Errors raised while compiling a filter or a model into SQL.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A value of this kind cannot be used where it appeared.
    #[error("unsupported value kind {kind} for column '{column}'")]
    UnsupportedValueKind { column: String, kind: ValueKind },

    /// A list was given to an operator that takes a single operand.
    #[error("operator '{operator}' on column '{column}' takes one operand, got {got}")]
    OperandArity {
        column: String,
        operator: String,
        got: usize,
    },

    /// The configured key generator failed.
    #[error("failed to generate key for column '{column}'")]
    GeneratorFailed {
        column: String,
        #[source]
        source: BoxError,
    },

    /// `values` was called without any models.
    #[error("no models to insert")]
    NoModels,

    /// A model produced a different number of values than it declares columns.
    #[error("model produced {got} values for {expected} columns")]
    ModelShape { expected: usize, got: usize },

    /// The primary-key target of an update compiled to no condition.
    #[error("update of table '{table}' has no primary-key condition")]
    UntargetedUpdate { table: String },

    /// Boundary wrapper around any of the above.
    #[error("error generating {clause} clause for table {table}; check your filters")]
    Clause {
        clause: Clause,
        table: String,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    /// Wrap an internal fault at the public boundary of a clause.
    pub fn in_clause(self, clause: Clause, table: impl Into<String>) -> Self {
        match self {
            already @ CompileError::Clause { .. } => already,
            inner => CompileError::Clause {
                clause,
                table: table.into(),
                source: Box::new(inner),
            },
        }
    }

    /// The innermost error, skipping the clause wrapper.
    pub fn root(&self) -> &CompileError {
        match self {
            CompileError::Clause { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Errors raised while mapping result rows into models.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The row has a different number of columns than the model.
    #[error("row has {got} columns, model expects {expected}")]
    ColumnCount { expected: usize, got: usize },

    /// A column value could not be decoded into the requested type.
    #[error("column {position}: cannot decode {found} as {expected}")]
    Decode {
        position: usize,
        expected: &'static str,
        found: ValueKind,
    },

    /// The row source itself failed.
    #[error("database error: {0}")]
    Database(String),
}

/// Errors raised while loading configuration or catalogs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("catalog table '{table}': column '{column}' lists unknown operator '{operator}'")]
    UnknownOperator {
        table: String,
        column: String,
        operator: String,
    },
}

/// The umbrella error type for relq operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The filter document is not valid JSON or not a JSON object.
    #[error("invalid filter: {0}")]
    Filter(String),

    /// The order specification could not be parsed.
    #[error("invalid order at position {position}: {message}")]
    Order { position: usize, message: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("execution error: {0}")]
    Execution(String),
}

impl Error {
    /// Create an order parse error at the given position.
    pub fn order(position: usize, message: impl Into<String>) -> Self {
        Self::Order {
            position,
            message: message.into(),
        }
    }
}

/// Result type alias for relq operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
