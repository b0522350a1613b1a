//! relq — compile JSON filters to SQL from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Compile a WHERE clause against a catalog
//! relq --schema schema.toml where users '{"name": {"_ilike": "%ann%"}}'
//!
//! # Full SELECT with ordering and paging
//! relq select users '{"roles": {"name": {"_eq": "admin"}}}' --order=-created_at --page 2
//!
//! # Execute it
//! relq run users '{"id": {"_in": [1, 2, 3]}}' --database-url postgres://localhost/app
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use relq::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relq")]
#[command(version)]
#[command(about = "Compile JSON filters into parameterized SQL", long_about = None)]
#[command(after_help = "EXAMPLES:
    relq --schema schema.toml where users '{\"name\": {\"_eq\": \"ann\"}}'
    relq select users '{\"_or\": [{\"id\": {\"_lt\": 10}}, {\"team\": {\"name\": {\"_eq\": \"core\"}}}]}'
    relq explain users")]
struct Cli {
    /// Table catalog (TOML); defaults to `catalog` in relq.toml
    #[arg(short, long, global = true)]
    schema: Option<PathBuf>,

    /// Configuration file; defaults to ./relq.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQL dialect, overriding the configuration
    #[arg(short, long, value_enum, global = true)]
    dialect: Option<Dialect>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a filter into a WHERE fragment
    Where {
        table: String,
        /// Filter document (JSON)
        filter: String,
    },
    /// Assemble a full SELECT
    Select(SelectArgs),
    /// Assemble a DELETE
    Delete {
        table: String,
        /// Filter document (JSON)
        filter: String,
    },
    /// Show a table's fields, relations and operators
    Explain { table: String },
    /// Show the operator reference
    Operators,
    /// Compile a SELECT and execute it
    Run {
        #[command(flatten)]
        select: SelectArgs,

        /// Database connection URL
        #[arg(long, env = "RELQ_DATABASE_URL")]
        database_url: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Args)]
struct SelectArgs {
    table: String,

    /// Filter document (JSON)
    #[arg(default_value = "{}")]
    filter: String,

    /// Order, e.g. `-created_at,name`
    #[arg(short, long, allow_hyphen_values = true)]
    order: Option<String>,

    #[arg(long)]
    page: Option<i64>,

    #[arg(long)]
    per_page: Option<i64>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = dispatch(&cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("RELQ_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Operators => show_operators(),
        Commands::Where { table, filter } => {
            let (_, registry) = load(cli)?;
            let schema = lookup(&registry, table)?;
            let filter = parse_filter(filter)?;
            let mut params = Params::new();
            let sql = schema.compile_where(Clause::Where, &filter, &mut params, &registry)?;
            print_compiled(&Compiled {
                sql,
                params: params.into_vec(),
            });
        }
        Commands::Select(args) => {
            let (_, registry) = load(cli)?;
            let compiled = compile_select(&registry, args)?;
            print_compiled(&compiled);
        }
        Commands::Delete { table, filter } => {
            let (_, registry) = load(cli)?;
            let schema = lookup(&registry, table)?;
            let compiled = schema.delete(&parse_filter(filter)?, &registry)?;
            print_compiled(&compiled);
        }
        Commands::Explain { table } => {
            let (_, registry) = load(cli)?;
            explain_table(lookup(&registry, table)?);
        }
        Commands::Run {
            select,
            database_url,
            format,
        } => {
            let (config, registry) = load(cli)?;
            let compiled = compile_select(&registry, select)?;
            let url = database_url
                .as_ref()
                .or(config.database_url.as_ref())
                .context("no database URL; use --database-url or set RELQ_DATABASE_URL")?;

            if cli.verbose {
                println!("{} {}", "SQL:".dimmed(), compiled.sql.white());
            }
            let db = Executor::connect(url).await?;
            let rows = db.fetch_json(&compiled).await?;
            format_output(&rows, format);
        }
    }

    Ok(())
}

fn load(cli: &Cli) -> Result<(Config, SchemaRegistry)> {
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let registry = load_registry(cli, &config)?;
    Ok((config, registry))
}

fn load_registry(cli: &Cli, config: &Config) -> Result<SchemaRegistry> {
    let path = cli
        .schema
        .as_ref()
        .or(config.catalog.as_ref())
        .context("no table catalog; use --schema or set `catalog` in relq.toml")?;
    let catalog = Catalog::load(path)?;

    let mut builder = RegistryBuilder::from_config(config);
    if let Some(dialect) = cli.dialect {
        builder = RegistryBuilder::new(dialect).settings(config.settings());
    }
    catalog
        .into_registry(builder)
        .with_context(|| format!("building registry from {}", path.display()))
}

fn lookup<'r>(registry: &'r SchemaRegistry, table: &str) -> Result<&'r TableSchema> {
    registry.get(table).map(|s| s.as_ref()).with_context(|| {
        format!(
            "unknown table '{}'; known tables: {}",
            table,
            registry.table_names().join(", ")
        )
    })
}

fn parse_filter(input: &str) -> Result<Filter> {
    Ok(Filter::from_json(input)?)
}

fn compile_select(registry: &SchemaRegistry, args: &SelectArgs) -> Result<Compiled> {
    let schema = lookup(registry, &args.table)?;
    let mut query = Query::new(parse_filter(&args.filter)?);
    if let Some(order) = &args.order {
        query = query.order(OrderSpec::parse(order)?);
    }
    if args.page.is_some() || args.per_page.is_some() {
        query = query.page(Page {
            page: args.page,
            per_page: args.per_page,
        });
    }
    Ok(schema.select(&query, registry)?)
}

fn print_compiled(compiled: &Compiled) {
    println!("{}", "Generated SQL:".green().bold());
    if compiled.sql.is_empty() {
        println!("{}", "(no conditions)".dimmed());
    } else {
        println!("{}", compiled.sql.white());
    }

    if !compiled.params.is_empty() {
        println!();
        println!("{}", "Bindings:".cyan());
        for (i, value) in compiled.params.iter().enumerate() {
            println!("  {} = {}", (i + 1).to_string().dimmed(), value.to_string().yellow());
        }
    }
}

fn format_output(results: &[serde_json::Map<String, serde_json::Value>], format: &OutputFormat) {
    if results.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).unwrap_or_default());
        }
        OutputFormat::Table => {
            let columns: Vec<&String> = results[0].keys().collect();

            let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
            for row in results {
                for (i, col) in columns.iter().enumerate() {
                    let len = row.get(*col).map(val_to_string).unwrap_or_default().chars().count();
                    widths[i] = widths[i].max(len);
                }
            }

            let header: Vec<String> = columns
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:width$}", c, width = w))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in results {
                let cells: Vec<String> = columns
                    .iter()
                    .zip(&widths)
                    .map(|(c, w)| {
                        let val = row.get(*c).map(val_to_string).unwrap_or_default();
                        format!("{:width$}", val, width = w)
                    })
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", results.len().to_string().cyan());
        }
    }
}

fn val_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}

fn explain_table(schema: &TableSchema) {
    println!("{} {}", "Table:".dimmed(), schema.table().cyan().bold());
    println!();

    println!("{}", "Fields:".green().bold());
    for field in schema.fields() {
        let mut notes = Vec::new();
        if field.is_primary_key() {
            notes.push("primary key".to_string());
        }
        match &field.json {
            None => notes.push("hidden".to_string()),
            Some(json) if json != &field.column => notes.push(format!("json: {}", json)),
            Some(_) => {}
        }
        let ops = schema
            .operations(&field.column)
            .map(|ops| ops.suffixes().join(" "))
            .unwrap_or_default();
        println!(
            "  {:>2} {:20} {} {}",
            field.position,
            field.column.white(),
            ops.dimmed(),
            notes.join(", ").yellow()
        );
    }

    let relations: Vec<_> = schema.relations().collect();
    if !relations.is_empty() {
        println!();
        println!("{}", "Relations:".green().bold());
        for rel in relations {
            let arity = if rel.is_singular { "one" } else { "many" };
            let path = match (&rel.through, &rel.through_field, &rel.end_field) {
                (Some(through), Some(tf), Some(ef)) => format!(
                    "{}.{} → {}.{} / {}.{} = {}.{}",
                    schema.name(),
                    rel.src,
                    through,
                    rel.dest,
                    rel.target,
                    ef,
                    through,
                    tf
                ),
                _ => format!("{}.{} → {}.{}", schema.name(), rel.src, rel.target, rel.dest),
            };
            println!("  {:20} {:5} {}", rel.name.white(), arity.cyan(), path.dimmed());
        }
    }
}

fn show_operators() {
    println!("{}", "Filter Operator Reference".cyan().bold());
    println!();
    println!("{:10} {}", "Suffix".white().bold(), "SQL".white().bold());
    println!("{}", "─".repeat(40).dimmed());

    let g = Dialect::Postgres.generator();
    for op in Operator::ALL {
        let operands: Vec<String> = match op.arity() {
            relq::operator::Arity::One => vec!["$1".to_string()],
            relq::operator::Arity::Many => vec!["$1".to_string(), "$2".to_string()],
        };
        println!("{:10} {}", op.suffix().cyan(), op.render("col", &operands, g.as_ref()).dimmed());
    }

    println!();
    println!("{:10} {}", "_and".cyan(), "(a AND b)".dimmed());
    println!("{:10} {}", "_or".cyan(), "(a OR b)".dimmed());
    println!("{:10} {}", "_not".cyan(), "NOT (a)".dimmed());
}
