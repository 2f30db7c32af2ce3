//! treeql: run tree queries from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Execute a query against the configured database
//! treeql todo 'q=(primary_key, instruction, slaves(*)).filter(slaves.primary_key>2)'
//!
//! # Dry run (show SQL only)
//! treeql todo 'q=(*, !instruction).limit(5)' --dry-run
//!
//! # Show the action tree and the SQL
//! treeql explain todo 'q=(primary_key).filter(slaves.slavedetails.info like "%x%")'
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use tracing_subscriber::EnvFilter;
use treeql::prelude::*;

#[derive(Parser)]
#[command(name = "treeql")]
#[command(version)]
#[command(about = "Tree-shaped queries compiled to a single SQL statement", long_about = None)]
#[command(after_help = "EXAMPLES:
    treeql todo 'q=(primary_key, instruction)'
    treeql todo_slave 'q=(*, todo(worker), slavedetails(info)).order(primary_key, desc)' --format pretty
    treeql todo 'q=%28primary_key%29.limit%285%29' --encoded --dry-run")]
struct Cli {
    /// Entity to query
    entity: Option<String>,

    /// The query, e.g. q=(id, name)
    query: Option<String>,

    /// Don't execute, just show the generated SQL
    #[arg(short, long)]
    dry_run: bool,

    /// The query is percent-encoded, as in a URL
    #[arg(short, long)]
    encoded: bool,

    /// Schema registry file (TOML)
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Database connection URL
    #[arg(long, env = "TREEQL_DATABASE_URL")]
    database_url: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// The document exactly as the database produced it
    Json,
    /// Indented JSON
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a query and show its action tree and SQL
    Explain {
        entity: String,
        query: String,
    },
    /// List the entities in the schema registry
    Entities,
    /// Show the syntax reference
    Syntax,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "treeql=debug" } else { "treeql=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?.with_env();
    if let Some(schema) = &cli.schema {
        config.schema = Some(schema.clone());
    }
    if let Some(url) = &cli.database_url {
        config.database_url = Some(url.clone());
    }

    match &cli.command {
        Some(Commands::Syntax) => {
            show_syntax();
            Ok(())
        }
        Some(Commands::Entities) => {
            let registry = load_registry(&config)?;
            show_entities(&registry);
            Ok(())
        }
        Some(Commands::Explain { entity, query }) => {
            let registry = load_registry(&config)?;
            let query = decode(query, cli.encoded)?;
            explain_query(&registry, entity, &query)
        }
        None => match (&cli.entity, &cli.query) {
            (Some(entity), Some(query)) => {
                let registry = load_registry(&config)?;
                let query = decode(query, cli.encoded)?;
                execute_query(&registry, &config, entity, &query, &cli).await
            }
            _ => {
                println!("{}", "treeql: tree-shaped queries over SQL".cyan().bold());
                println!();
                println!("Usage: treeql <ENTITY> <QUERY> [OPTIONS]");
                println!();
                println!("Try: treeql --help");
                Ok(())
            }
        },
    }
}

fn load_registry(config: &Config) -> anyhow::Result<Registry> {
    let path = config.schema_path()?;
    let registry = Registry::load(path)
        .with_context(|| format!("loading schema from {}", path.display()))?;
    Ok(registry)
}

fn decode(query: &str, encoded: bool) -> anyhow::Result<String> {
    if encoded {
        Ok(treeql::decode_query_string(query)?)
    } else {
        Ok(query.to_string())
    }
}

async fn execute_query(
    registry: &Registry,
    config: &Config,
    entity: &str,
    text: &str,
    cli: &Cli,
) -> anyhow::Result<()> {
    if cli.verbose {
        eprintln!("{} {} {}", "Input:".dimmed(), entity.cyan(), text.yellow());
    }

    let query = treeql::prepare(registry, entity, text)?;
    let statement = query.to_statement();

    // Dry run or no database URL: just show SQL
    if cli.dry_run || config.database_url.is_none() {
        print_statement(&statement);
        if config.database_url.is_none() && !cli.dry_run {
            println!();
            println!(
                "{}",
                "⚠ No database URL. Use --database-url or set TREEQL_DATABASE_URL".yellow()
            );
        }
        return Ok(());
    }

    let url = config.database_url()?;
    if cli.verbose {
        eprintln!("{} {}", "Connecting to:".dimmed(), url);
    }
    let db = Database::connect(url).await?;
    let json = db.fetch_json(&statement).await?;

    match cli.format {
        OutputFormat::Json => println!("{}", json),
        OutputFormat::Pretty => {
            let value: serde_json::Value =
                serde_json::from_str(&json).context("database returned malformed JSON")?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn print_statement(statement: &Statement) {
    println!("{}", "Generated SQL:".green().bold());
    println!("{}", statement.sql.white());
    if !statement.params.is_empty() {
        println!();
        println!("{}", "Bindings:".cyan());
        for (i, param) in statement.params.iter().enumerate() {
            println!(
                "  ?{} = {} {}",
                i + 1,
                param.to_string().yellow(),
                format!("({})", param.type_name()).dimmed()
            );
        }
    }
}

fn explain_query(registry: &Registry, entity: &str, text: &str) -> anyhow::Result<()> {
    println!("{}", "treeql Query Explanation".cyan().bold());
    println!();
    println!("{} {} {}", "Query:".dimmed(), entity.cyan(), text.yellow());
    println!();

    let tree = match treeql::parse(text) {
        Ok(tree) => tree,
        Err(e) => {
            if let TreeqlError::Syntax { position, .. } = &e {
                eprintln!("  {}", text);
                let column = caret_column(text, *position);
                eprintln!("  {}{}", " ".repeat(column), "^".red().bold());
            }
            return Err(e.into());
        }
    };

    println!("{}", "Action Tree:".green().bold());
    print_tree(&tree, entity, 1);
    println!();

    let query = treeql::prepare(registry, entity, text)?;
    print_statement(&query.to_statement());
    Ok(())
}

/// Error positions are byte offsets; the caret goes under the character.
fn caret_column(text: &str, position: usize) -> usize {
    text.get(..position)
        .map_or(position, |before| before.chars().count())
}

fn print_tree(tree: &ActionTree, name: &str, depth: usize) {
    let indent = "  ".repeat(depth);
    let selection = match &tree.select {
        Selection::Fields(selectors) => selectors
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", "),
        Selection::FilterOnly => "(filter only)".dimmed().to_string(),
    };
    println!("{}{} {}", indent, name.cyan().bold(), selection.white());

    for filter in &tree.filters {
        println!("{}  {} {}", indent, "filter".dimmed(), filter.to_string().yellow());
    }
    if let Some(sort) = &tree.sort {
        println!("{}  {} {} {}", indent, "order".dimmed(), sort.field, sort.order);
    }
    if let Some(limit) = tree.limit {
        println!("{}  {} {}", indent, "limit".dimmed(), limit);
    }
    if let Some(offset) = tree.offset {
        println!("{}  {} {}", indent, "offset".dimmed(), offset);
    }
    for (alias, child) in &tree.relations {
        print_tree(child, alias, depth + 1);
    }
}

fn show_entities(registry: &Registry) {
    if registry.is_empty() {
        println!("{}", "(no entities)".dimmed());
        return;
    }

    for entity in registry.entities() {
        println!(
            "{} {}",
            entity.name.cyan().bold(),
            format!("(table {}, identity {})", entity.table, entity.identity).dimmed()
        );
        for field in entity.fields() {
            if field.alias == field.name {
                println!("  {}", field.alias.white());
            } else {
                println!("  {} {}", field.alias.white(), format!("<- {}", field.name).dimmed());
            }
        }
        for (alias, rel) in entity.relationships() {
            println!(
                "  {}(...) {} {} {}",
                alias.yellow(),
                rel.direction.to_string().dimmed(),
                rel.target.cyan(),
                format!("on {} = {}", rel.parent_column, rel.child_column).dimmed()
            );
        }
        println!();
    }
}

fn show_syntax() {
    println!("{}", "treeql Syntax Reference".cyan().bold());
    println!();

    let forms = [
        ("q=(a, b)", "Select fields a and b"),
        ("q=(*)", "Select every field"),
        ("q=(*, !a)", "Every field except a"),
        ("q=(id, rel(a))", "Nest a relation with its own fields"),
        (".filter(a>=2)", "Filter: = != > >= < <="),
        (".filter(a in [1, 2])", "Membership"),
        (".filter(a like \"%x%\")", "Pattern match (ilike: case-insensitive)"),
        (".filter(a is_null 1)", "NULL check (0 for NOT NULL)"),
        (".filter(rel.a=2)", "Filter through a relation"),
        (".order(a, desc)", "Sort (asc | desc)"),
        (".limit(10)", "Page size (0 = no limit, default 20)"),
        (".offset(20)", "Skip rows"),
    ];

    println!("{:28} {}", "Form".white().bold(), "Meaning".white().bold());
    println!("{}", "─".repeat(70).dimmed());

    for (form, meaning) in forms {
        println!("{:28} {}", form.yellow(), meaning.white());
    }
}
