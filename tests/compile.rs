use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use relq::prelude::*;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: i64,
    name: String,
    password_hash: String,
    team_id: Option<i64>,
    created_at: Option<chrono::DateTime<Utc>>,
}

impl Model for User {
    fn definition() -> ModelDef {
        ModelDef::new("users")
            .column("id")
            .column("name")
            .attribute(Attribute::column("password_hash").hidden())
            .column("team_id")
            .column("created_at")
            .relation("team", RelationDef::one("teams").src("team_id").dest("id"))
            .relation(
                "roles",
                RelationDef::many_through("roles", "user_roles")
                    .src("id")
                    .dest("user_id")
                    .through_field("role_id")
                    .end_field("id"),
            )
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.name.clone().into(),
            self.password_hash.clone().into(),
            self.team_id.into(),
            self.created_at.into(),
        ]
    }

    fn from_row(row: &mut RowReader) -> Result<Self, ScanError> {
        Ok(User {
            id: row.next()?,
            name: row.next()?,
            password_hash: row.next()?,
            team_id: row.next()?,
            created_at: row.next()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Team {
    id: i64,
    name: String,
}

impl Model for Team {
    fn definition() -> ModelDef {
        ModelDef::new("teams").column("id").column("name")
    }

    fn values(&self) -> Vec<Value> {
        vec![self.id.into(), self.name.clone().into()]
    }

    fn from_row(row: &mut RowReader) -> Result<Self, ScanError> {
        Ok(Team {
            id: row.next()?,
            name: row.next()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Role {
    id: Uuid,
    name: String,
}

impl Model for Role {
    fn definition() -> ModelDef {
        ModelDef::new("roles")
            .column("id")
            .column("name")
            .key_generator(UuidV7)
    }

    fn values(&self) -> Vec<Value> {
        vec![self.id.into(), self.name.clone().into()]
    }

    fn from_row(row: &mut RowReader) -> Result<Self, ScanError> {
        Ok(Role {
            id: row.next()?,
            name: row.next()?,
        })
    }
}

struct Fixture {
    users: Builder<User>,
    teams: Builder<Team>,
    roles: Builder<Role>,
    registry: SchemaRegistry,
}

fn fixture(dialect: Dialect) -> Fixture {
    let mut registry = RegistryBuilder::new(dialect);
    let users = registry.register::<User>().unwrap();
    let teams = registry.register::<Team>().unwrap();
    let roles = registry.register::<Role>().unwrap();
    Fixture {
        users,
        teams,
        roles,
        registry: registry.freeze().unwrap(),
    }
}

fn where_users(f: &Fixture, json: &str) -> (String, Vec<Value>) {
    let filter = Filter::from_json(json).unwrap();
    let mut params = Params::new();
    let sql = f.users.where_clause(&filter, &mut params, &f.registry).unwrap();
    (sql, params.into_vec())
}

fn placeholder_count(sql: &str) -> usize {
    sql.matches('$').count()
}

#[test]
fn test_table_and_fields_are_quoted() {
    let f = fixture(Dialect::Postgres);
    assert_eq!(f.users.table(), "\"users\"");
    assert_eq!(f.teams.fields(""), "\"id\", \"name\"");
    assert_eq!(f.teams.fields("t"), "\"t\".\"id\", \"t\".\"name\"");
    assert_eq!(
        f.users.column_names(),
        &["id", "name", "password_hash", "team_id", "created_at"]
    );
}

#[test]
fn test_ilike_example() {
    let f = fixture(Dialect::Postgres);
    let (sql, args) = where_users(&f, r#"{"name": {"_ilike": "%foo%"}}"#);
    assert_eq!(sql, "\"name\" ILIKE $1");
    assert_eq!(args, vec![Value::from("%foo%")]);
}

#[test]
fn test_placeholder_counts() {
    let f = fixture(Dialect::Postgres);
    let (sql, args) = where_users(&f, r#"{"id": {"_eq": 5}}"#);
    assert_eq!((placeholder_count(&sql), args.len()), (1, 1));

    let (sql, args) = where_users(&f, r#"{"id": {"_in": [1, 2, 3, 4]}}"#);
    assert_eq!(sql, "\"id\" IN ($1, $2, $3, $4)");
    assert_eq!(args.len(), 4);

    let (sql, args) = where_users(&f, r#"{"id": {"_nin": [7, 8]}}"#);
    assert_eq!(sql, "\"id\" NOT IN ($1, $2)");
    assert_eq!(args, vec![Value::from("7"), Value::from("8")]);
}

#[test]
fn test_combinator_wrapping() {
    let f = fixture(Dialect::Postgres);
    let (sql, _) = where_users(
        &f,
        r#"{"_and": [{"id": {"_gt": 1}}, {"id": {"_lt": 9}}]}"#,
    );
    assert_eq!(sql, "(\"id\" > $1 AND \"id\" < $2)");

    let (sql, _) = where_users(
        &f,
        r#"{"_or": [{"name": {"_eq": "a"}}, {"name": {"_eq": "b"}}]}"#,
    );
    assert_eq!(sql, "(\"name\" = $1 OR \"name\" = $2)");

    let (sql, _) = where_users(&f, r#"{"_not": {"name": {"_nlike": "x%"}}}"#);
    assert_eq!(sql, "NOT (\"name\" NOT LIKE $1)");
}

#[test]
fn test_combinator_discards_sibling_keys() {
    let f = fixture(Dialect::Postgres);
    let (sql, args) = where_users(
        &f,
        r#"{"name": {"_eq": "kept?"}, "_or": [{"id": {"_eq": 1}}, {"id": {"_eq": 2}}], "team_id": {"_eq": 3}}"#,
    );
    assert_eq!(sql, "(\"id\" = $1 OR \"id\" = $2)");
    assert_eq!(args, vec![Value::Int(1), Value::Int(2)]);

    let (sql, args) = where_users(
        &f,
        r#"{"_or": [{"id": {"_eq": 1}}], "_and": [{"id": {"_eq": 2}}]}"#,
    );
    assert_eq!(sql, "(\"id\" = $1)");
    assert_eq!(args, vec![Value::Int(2)]);
}

#[test]
fn test_through_relation_shape() {
    let f = fixture(Dialect::Postgres);
    let (sql, args) = where_users(&f, r#"{"roles": {"name": {"_eq": "admin"}}}"#);
    assert_eq!(
        sql,
        "\"id\" IN (SELECT \"user_id\" FROM \"user_roles\" JOIN \"roles\" ON \"roles\".\"id\" = \"user_roles\".\"role_id\" WHERE \"name\" = $1)"
    );
    assert_eq!(args, vec![Value::from("admin")]);
}

#[test]
fn test_relations_inside_combinators() {
    let f = fixture(Dialect::SQLite);
    let (sql, _) = where_users(
        &f,
        r#"{"_or": [{"team": {"name": {"_ilike": "core%"}}}, {"name": {"_eq": "root"}}]}"#,
    );
    assert_eq!(
        sql,
        "(\"team_id\" IN (SELECT \"id\" FROM \"teams\" WHERE \"name\" LIKE ?1) OR \"name\" = ?2)"
    );
}

#[test]
fn test_unknown_keys_are_ignored_and_hidden_columns_compile() {
    let f = fixture(Dialect::Postgres);
    let (sql, args) = where_users(
        &f,
        r#"{"nope": {"_eq": 1}, "name": {"_regex": "x"}, "password_hash": {"_eq": "secret"}}"#,
    );
    assert_eq!(sql, "\"password_hash\" = $1");
    assert_eq!(args, vec![Value::from("secret")]);

    let (sql, args) = where_users(&f, r#"{"nope": {"_eq": 1}, "name": {"_regex": "x"}}"#);
    assert_eq!(sql, "");
    assert!(args.is_empty());

    let (sql, _) = where_users(&f, "{}");
    assert_eq!(sql, "");
}

#[test]
fn test_parameter_numbering_continues() {
    let f = fixture(Dialect::Postgres);
    let mut params = Params::new();
    let first = f
        .users
        .where_clause(&Filter::field("id", Operator::Eq, 1), &mut params, &f.registry)
        .unwrap();
    let second = f
        .users
        .where_clause(&Filter::field("name", Operator::Eq, "x"), &mut params, &f.registry)
        .unwrap();
    assert_eq!(first, "\"id\" = $1");
    assert_eq!(second, "\"name\" = $2");
    assert_eq!(params.len(), 2);
}

#[test]
fn test_set_derives_primary_key_filter() {
    let f = fixture(Dialect::Postgres);
    let user = User {
        id: 42,
        name: "ann".into(),
        password_hash: "h".into(),
        team_id: None,
        created_at: None,
    };
    let mut params = Params::new();
    let mut target = Filter::new();
    let set = f.users.set(&user, &mut params, Some(&mut target)).unwrap();
    assert_eq!(
        set,
        "\"name\" = $1, \"password_hash\" = $2, \"team_id\" = $3, \"created_at\" = $4"
    );
    assert_eq!(target.to_string(), r#"{"id":{"_eq":"42"}}"#);

    let where_sql = f
        .users
        .where_update(&target, &mut params, &f.registry)
        .unwrap();
    assert_eq!(where_sql, "\"id\" = $5");
}

#[test]
fn test_set_rejects_unsupported_key_kind() {
    struct Blob(Vec<u8>);
    impl Model for Blob {
        fn definition() -> ModelDef {
            ModelDef::new("blobs").column("digest").column("size")
        }
        fn values(&self) -> Vec<Value> {
            vec![self.0.clone().into(), Value::Int(0)]
        }
        fn from_row(row: &mut RowReader) -> Result<Self, ScanError> {
            Ok(Blob(row.next()?))
        }
    }

    let blobs = RegistryBuilder::new(Dialect::Postgres).register::<Blob>().unwrap();
    let err = blobs
        .set(&Blob(vec![1, 2]), &mut Params::new(), Some(&mut Filter::new()))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "error generating SET clause for table blobs; check your filters"
    );
    assert!(matches!(
        err.root(),
        CompileError::UnsupportedValueKind { kind: ValueKind::Bytes, .. }
    ));
}

#[test]
fn test_insert_returning_round_trip() {
    let f = fixture(Dialect::Postgres);
    let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let user = User {
        id: 0,
        name: "ann".into(),
        password_hash: "h".into(),
        team_id: Some(3),
        created_at: None,
    };

    let compiled = f.users.insert(&[user.clone()], &mut Vec::new()).unwrap();
    assert_eq!(
        compiled.sql,
        "INSERT INTO \"users\" (\"name\", \"password_hash\", \"team_id\") VALUES ($1, $2, $3) \
         RETURNING \"id\", \"name\", \"password_hash\", \"team_id\", \"created_at\""
    );
    assert_eq!(
        compiled.params,
        vec![Value::from("ann"), Value::from("h"), Value::Int(3)]
    );

    // What the database would hand back for RETURNING.
    let returned = vec![vec![
        Value::Int(17),
        Value::from("ann"),
        Value::from("h"),
        Value::Int(3),
        Value::from("2024-05-01T12:00:00Z"),
    ]];
    let scanned = f.users.scan(returned).unwrap();
    assert_eq!(
        scanned,
        vec![User {
            id: 17,
            created_at: Some(created),
            ..user
        }]
    );
}

#[test]
fn test_generated_keys_are_reported() {
    let f = fixture(Dialect::Postgres);
    let roles = vec![
        Role {
            id: Uuid::nil(),
            name: "admin".into(),
        },
        Role {
            id: Uuid::nil(),
            name: "owner".into(),
        },
    ];
    let mut keys = Vec::new();
    let compiled = f.roles.insert(&roles, &mut keys).unwrap();
    assert_eq!(
        compiled.sql,
        "INSERT INTO \"roles\" (\"id\", \"name\") VALUES ($1, $2), ($3, $4) RETURNING \"id\", \"name\""
    );
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| matches!(k, Value::Uuid(u) if u.get_version_num() == 7)));
    assert_eq!(compiled.params[0], keys[0]);
}

#[test]
fn test_generator_failure_is_reported() {
    struct Ticket;
    impl Model for Ticket {
        fn definition() -> ModelDef {
            ModelDef::new("tickets")
                .column("id")
                .column("title")
                .key_generator(|_: &relq::schema::Field| -> Result<Value, BoxError> {
                    Err("ticket sequence unavailable".into())
                })
        }
        fn values(&self) -> Vec<Value> {
            vec![Value::Null, Value::from("t")]
        }
        fn from_row(_: &mut RowReader) -> Result<Self, ScanError> {
            Ok(Ticket)
        }
    }

    let tickets = RegistryBuilder::new(Dialect::Postgres).register::<Ticket>().unwrap();
    let mut keys = Vec::new();
    let err = tickets.insert(&[Ticket], &mut keys).unwrap_err();
    match err.root() {
        CompileError::GeneratorFailed { column, source } => {
            assert_eq!(column, "id");
            assert_eq!(source.to_string(), "ticket sequence unavailable");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(keys.is_empty());
}

#[test]
fn test_scan_decode_error() {
    let f = fixture(Dialect::Postgres);
    let err = f
        .teams
        .scan(vec![vec![Value::from("not a number"), Value::from("core")]])
        .unwrap_err();
    assert_eq!(err.to_string(), "column 0: cannot decode string as i64");
}

#[test]
fn test_order_and_paginate() {
    let f = fixture(Dialect::MySQL);
    let order = OrderSpec::parse("-created_at, password_hash, name").unwrap();
    assert_eq!(
        f.users.order(&order),
        "ORDER BY `created_at` DESC, `password_hash` ASC, `name` ASC"
    );
    let order = OrderSpec::parse("-created_at, bogus").unwrap();
    assert_eq!(f.users.order(&order), "ORDER BY `created_at` DESC");
    assert_eq!(f.users.paginate(&Page::new(3, 20)), " LIMIT 20 OFFSET 40");
}

#[test]
fn test_compilation_is_deterministic() {
    let f = fixture(Dialect::Postgres);
    let json = r#"{"team": {"id": {"_in": [1, 2]}}, "name": {"_ilike": "a%", "_neq": "admin"}, "_unknown": 1}"#;
    let first = where_users(&f, json);
    assert_eq!(
        first.0,
        "\"team_id\" IN (SELECT \"id\" FROM \"teams\" WHERE \"id\" IN ($1, $2)) AND \"name\" ILIKE $3 AND \"name\" <> $4"
    );
    for _ in 0..5 {
        assert_eq!(where_users(&f, json), first);
    }
}

#[test]
fn test_registry_is_shareable_across_threads() {
    let f = fixture(Dialect::Postgres);
    let registry = std::sync::Arc::new(f.registry);
    let users = f.users.clone();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let registry = registry.clone();
            let users = users.clone();
            std::thread::spawn(move || {
                let filter = Filter::field("id", Operator::Eq, i as i64);
                let mut params = Params::new();
                users.where_clause(&filter, &mut params, &registry).unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), "\"id\" = $1");
    }
}
