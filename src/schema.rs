//! Model declarations and schema extraction.
//!
//! A model declares its table once, at startup, through [`ModelDef`]:
//!
//! ```
//! use relq::schema::{Attribute, ModelDef, RelationDef};
//!
//! let users = ModelDef::new("users")
//!     .column("id")
//!     .column("name")
//!     .attribute(Attribute::column("password_hash").hidden())
//!     .column("created_at")
//!     .relation(
//!         "roles",
//!         RelationDef::many_through("roles", "user_roles")
//!             .src("id")
//!             .dest("user_id")
//!             .through_field("role_id")
//!             .end_field("id"),
//!     );
//! assert_eq!(users.table_name(), "users");
//! ```
//!
//! Extraction turns the declaration into a [`TableSchema`]: the ordered field
//! list (the first column is the primary key), the relation map, and the
//! per-column operator sets.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::dialect::SqlGenerator;
use crate::error::SchemaError;
use crate::keygen::KeyGenerator;
use crate::operator::{ColumnOperations, CustomOperator, Operator};

/// A column of a model, at its position in the model's value list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub position: usize,
    pub column: String,
    /// Name the attribute serializes under; `None` when hidden.
    pub json: Option<String>,
}

impl Field {
    pub fn new(position: usize, column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            position,
            json: Some(column.clone()),
            column,
        }
    }

    pub fn is_primary_key(&self) -> bool {
        self.position == 0
    }

    pub fn is_hidden(&self) -> bool {
        self.json.is_none()
    }
}

/// A relation to another table.
///
/// Without `through` it is a direct foreign-key join. With `through` it is a
/// many-to-many join: `target.end_field = through.through_field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub is_singular: bool,
    pub through: Option<String>,
    pub through_field: Option<String>,
    pub end_field: Option<String>,
    pub src: String,
    pub dest: String,
    pub target: String,
    /// Qualify target columns inside the sub-query with the target table.
    pub qualified: bool,
}

/// Declaration of one model attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    name: String,
    json: Option<String>,
    kind: AttributeKind,
}

#[derive(Debug, Clone)]
enum AttributeKind {
    Column {
        operators: ColumnOperations,
        custom: Vec<CustomOperator>,
    },
    Relation(RelationDef),
}

impl Attribute {
    /// A column supporting every base operator.
    pub fn column(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            json: Some(name.clone()),
            name,
            kind: AttributeKind::Column {
                operators: ColumnOperations::standard(),
                custom: Vec::new(),
            },
        }
    }

    pub fn relation(name: impl Into<String>, def: RelationDef) -> Self {
        let name = name.into();
        Self {
            json: Some(name.clone()),
            name,
            kind: AttributeKind::Relation(def),
        }
    }

    /// Serialize under a different name.
    pub fn json(mut self, name: impl Into<String>) -> Self {
        self.json = Some(name.into());
        self
    }

    /// Hide from serialization. Visibility is serialization metadata only;
    /// hidden columns are selected, written, filtered and ordered like any
    /// other column.
    pub fn hidden(mut self) -> Self {
        self.json = None;
        self
    }

    /// Restrict the base operators this column supports.
    pub fn operators(mut self, ops: impl IntoIterator<Item = Operator>) -> Self {
        if let AttributeKind::Column { operators, .. } = &mut self.kind {
            *operators = ColumnOperations::only(ops);
        }
        self
    }

    /// Contribute an extra operator for this column.
    pub fn custom_operator(mut self, op: CustomOperator) -> Self {
        if let AttributeKind::Column { custom, .. } = &mut self.kind {
            custom.push(op);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Relation descriptor: `src`, `dest`, `table`, `through`, `throughField`,
/// `endField`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationDef {
    singular: bool,
    table: String,
    through: Option<String>,
    src: Option<String>,
    dest: Option<String>,
    through_field: Option<String>,
    end_field: Option<String>,
    qualified: bool,
}

impl RelationDef {
    /// Direct relation to a single row of `table`.
    pub fn one(table: impl Into<String>) -> Self {
        Self {
            singular: true,
            table: table.into(),
            ..Default::default()
        }
    }

    /// Direct relation to many rows of `table`.
    pub fn many(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Many-to-many relation to `table` via the associative table `through`.
    ///
    /// Columns of the inner filter are emitted unqualified, as in
    /// `... JOIN "roles" ON .. WHERE "name" = $1`. When the associative
    /// table shares a column name with `table` (`id`, `created_at`) the
    /// database rejects that as ambiguous; call [`RelationDef::qualified`]
    /// for such relations.
    pub fn many_through(table: impl Into<String>, through: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            through: Some(through.into()),
            ..Default::default()
        }
    }

    /// Column on this model matched against the sub-query.
    pub fn src(mut self, column: impl Into<String>) -> Self {
        self.src = Some(column.into());
        self
    }

    /// Column the sub-query selects.
    pub fn dest(mut self, column: impl Into<String>) -> Self {
        self.dest = Some(column.into());
        self
    }

    pub fn through_field(mut self, column: impl Into<String>) -> Self {
        self.through_field = Some(column.into());
        self
    }

    pub fn end_field(mut self, column: impl Into<String>) -> Self {
        self.end_field = Some(column.into());
        self
    }

    /// Emit the inner filter's columns as `"table"."column"`.
    pub fn qualified(mut self) -> Self {
        self.qualified = true;
        self
    }
}

/// A model's declaration: table name, attributes in canonical order, and
/// insert behavior.
#[derive(Clone)]
pub struct ModelDef {
    table: String,
    attributes: Vec<Attribute>,
    key_generator: Option<Arc<dyn KeyGenerator>>,
    insert_keys: Option<bool>,
}

impl ModelDef {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            attributes: Vec::new(),
            key_generator: None,
            insert_keys: None,
        }
    }

    pub fn column(self, name: impl Into<String>) -> Self {
        self.attribute(Attribute::column(name))
    }

    pub fn relation(self, name: impl Into<String>, def: RelationDef) -> Self {
        self.attribute(Attribute::relation(name, def))
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Generate primary keys on insert.
    pub fn key_generator(mut self, generator: impl KeyGenerator + 'static) -> Self {
        self.key_generator = Some(Arc::new(generator));
        self
    }

    /// Whether caller-supplied primary keys are written on insert.
    /// Defaults to the registry setting.
    pub fn insert_keys(mut self, enabled: bool) -> Self {
        self.insert_keys = Some(enabled);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
}

impl fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDef")
            .field("table", &self.table)
            .field("attributes", &self.attributes)
            .field("key_generator", &self.key_generator.is_some())
            .field("insert_keys", &self.insert_keys)
            .finish()
    }
}

/// Registry-wide defaults applied during extraction.
#[derive(Debug, Clone)]
pub struct Settings {
    pub insert_keys: bool,
    pub audit_columns: Vec<String>,
    pub default_per_page: u64,
    pub max_per_page: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            insert_keys: false,
            audit_columns: vec!["created_at".to_string(), "updated_at".to_string()],
            default_per_page: 25,
            max_per_page: None,
        }
    }
}

/// Extracted, immutable schema of one table.
pub struct TableSchema {
    pub(crate) name: String,
    pub(crate) fields: Vec<Field>,
    pub(crate) column_names: Vec<String>,
    pub(crate) relations: BTreeMap<String, Relation>,
    pub(crate) operations: HashMap<String, ColumnOperations>,
    pub(crate) generator: Arc<dyn SqlGenerator>,
    pub(crate) key_generator: Option<Arc<dyn KeyGenerator>>,
    pub(crate) insert_keys: bool,
    pub(crate) settings: Settings,
}

impl TableSchema {
    /// Extract a table schema from a model declaration.
    pub fn extract(
        def: ModelDef,
        generator: Arc<dyn SqlGenerator>,
        settings: &Settings,
    ) -> Result<TableSchema, SchemaError> {
        let table = def.table;
        let mut fields = Vec::new();
        let mut relations = BTreeMap::new();
        let mut operations = HashMap::new();

        for attribute in def.attributes {
            match attribute.kind {
                AttributeKind::Column { operators, custom } => {
                    if fields.iter().any(|f: &Field| f.column == attribute.name) {
                        return Err(SchemaError::DuplicateColumn {
                            table,
                            column: attribute.name,
                        });
                    }
                    let field = Field {
                        position: fields.len(),
                        column: attribute.name,
                        json: attribute.json,
                    };
                    let mut ops = operators;
                    for op in custom {
                        let suffix = op.suffix().to_string();
                        if !ops.extend(op) {
                            tracing::warn!(
                                table = %table,
                                column = %field.column,
                                operator = %suffix,
                                "custom operator shadows a base operator; ignored"
                            );
                        }
                    }
                    operations.insert(field.column.clone(), ops);
                    fields.push(field);
                }
                AttributeKind::Relation(rel) => {
                    let relation = Relation {
                        is_singular: rel.singular && rel.through.is_none(),
                        through: rel.through,
                        through_field: rel.through_field,
                        end_field: rel.end_field,
                        src: rel.src.ok_or_else(|| incomplete(&table, &attribute.name, "a source column"))?,
                        dest: rel.dest.ok_or_else(|| incomplete(&table, &attribute.name, "a destination column"))?,
                        target: rel.table,
                        qualified: rel.qualified,
                        name: attribute.name.clone(),
                    };
                    if relation.through.is_some() {
                        if relation.through_field.is_none() {
                            return Err(incomplete(&table, &attribute.name, "throughField"));
                        }
                        if relation.end_field.is_none() {
                            return Err(incomplete(&table, &attribute.name, "endField"));
                        }
                    }
                    relations.insert(attribute.name, relation);
                }
            }
        }

        if fields.is_empty() {
            return Err(SchemaError::MissingPrimaryKey(table));
        }

        tracing::debug!(
            table = %table,
            columns = fields.len(),
            relations = relations.len(),
            "extracted table schema"
        );

        Ok(TableSchema {
            column_names: fields.iter().map(|f| f.column.clone()).collect(),
            insert_keys: def.insert_keys.unwrap_or(settings.insert_keys),
            key_generator: def.key_generator,
            settings: settings.clone(),
            name: table,
            fields,
            relations,
            operations,
            generator,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The quoted table name.
    pub fn table(&self) -> String {
        self.generator.quote_identifier(&self.name)
    }

    pub fn primary_key(&self) -> &Field {
        &self.fields[0]
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    /// Operators a column supports; `None` for unknown columns.
    pub fn operations(&self, column: &str) -> Option<&ColumnOperations> {
        self.operations.get(column)
    }

    pub fn generator(&self) -> &dyn SqlGenerator {
        self.generator.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Comma-separated quoted columns, optionally qualified with `prefix`.
    pub fn fields_sql(&self, prefix: &str) -> String {
        self.fields
            .iter()
            .map(|f| {
                if prefix.is_empty() {
                    self.generator.quote_identifier(&f.column)
                } else {
                    self.generator.qualified(prefix, &f.column)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub(crate) fn is_audit_column(&self, column: &str) -> bool {
        self.settings.audit_columns.iter().any(|c| c == column)
    }
}

impl fmt::Debug for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSchema")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .field("insert_keys", &self.insert_keys)
            .finish_non_exhaustive()
    }
}

fn incomplete(table: &str, relation: &str, missing: &'static str) -> SchemaError {
    SchemaError::IncompleteRelation {
        table: table.to_string(),
        relation: relation.to_string(),
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;

    fn extract(def: ModelDef) -> Result<TableSchema, SchemaError> {
        TableSchema::extract(def, Dialect::Postgres.generator(), &Settings::default())
    }

    fn users() -> ModelDef {
        ModelDef::new("users")
            .column("id")
            .column("name")
            .attribute(Attribute::column("password_hash").hidden())
            .relation("team", RelationDef::one("teams").src("team_id").dest("id"))
            .column("team_id")
            .column("created_at")
    }

    #[test]
    fn test_first_column_is_primary_key() {
        let schema = extract(users()).unwrap();
        assert_eq!(schema.primary_key().column, "id");
        assert!(schema.primary_key().is_primary_key());
        assert_eq!(
            schema.column_names(),
            &["id", "name", "password_hash", "team_id", "created_at"]
        );
        // relations take no position
        assert_eq!(schema.fields()[3].position, 3);
        assert_eq!(schema.fields()[3].column, "team_id");
    }

    #[test]
    fn test_missing_primary_key() {
        let err = extract(ModelDef::new("empty")).unwrap_err();
        assert!(matches!(err, SchemaError::MissingPrimaryKey(ref t) if t == "empty"));

        let err = extract(ModelDef::new("only_rel").relation("x", RelationDef::many("y").src("a").dest("b")))
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingPrimaryKey(_)));
    }

    #[test]
    fn test_hidden_columns_keep_their_operations() {
        let schema = extract(users()).unwrap();
        assert!(schema.fields()[2].is_hidden());
        assert!(schema.operations("password_hash").unwrap().supports(Operator::Eq));
        assert!(schema.operations("name").unwrap().supports(Operator::ILike));
        assert!(schema.operations("team").is_none());
    }

    #[test]
    fn test_hidden_primary_key_is_filterable() {
        let def = ModelDef::new("secrets")
            .attribute(Attribute::column("id").hidden())
            .column("token");
        let schema = extract(def).unwrap();
        assert!(schema.primary_key().is_hidden());
        assert!(schema.operations("id").unwrap().supports(Operator::In));
    }

    #[test]
    fn test_custom_operators_extend_base() {
        let def = ModelDef::new("posts").column("id").attribute(
            Attribute::column("tags")
                .custom_operator(CustomOperator::new("_contains", |c, p| format!("{} @> {}", c, p[0]))),
        );
        let schema = extract(def).unwrap();
        let ops = schema.operations("tags").unwrap();
        assert!(ops.lookup("_contains").is_some());
        assert!(ops.lookup("_eq").is_some());
    }

    #[test]
    fn test_through_relation_requires_fields() {
        let def = ModelDef::new("users")
            .column("id")
            .relation("roles", RelationDef::many_through("roles", "user_roles").src("id").dest("user_id"));
        let err = extract(def).unwrap_err();
        assert_eq!(
            err.to_string(),
            "relation 'roles' on table 'users' is missing throughField"
        );
    }

    #[test]
    fn test_duplicate_column() {
        let err = extract(ModelDef::new("t").column("id").column("id")).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateColumn { .. }));
    }

    #[test]
    fn test_fields_sql_with_prefix() {
        let schema = extract(ModelDef::new("teams").column("id").column("name")).unwrap();
        assert_eq!(schema.fields_sql(""), "\"id\", \"name\"");
        assert_eq!(schema.fields_sql("t"), "\"t\".\"id\", \"t\".\"name\"");
        assert_eq!(schema.table(), "\"teams\"");
    }
}
