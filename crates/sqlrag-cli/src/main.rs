//! sqlrag CLI - Ask questions of a MySQL database in natural language.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sqlrag_core::{SqlRagConfig, VectorIndex};
use sqlrag_db::MySqlDatabase;
use sqlrag_llm::OllamaClient;
use sqlrag_query::{QueryEngine, QueryOptions, QueryOutcome, QuerySession, SchemaIndexer};
use sqlrag_store::SqliteVectorIndex;

type Engine = QueryEngine<OllamaClient, OllamaClient, SqliteVectorIndex, MySqlDatabase>;

/// Words that end a chat session.
const EXIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

/// sqlrag - Natural-language questions over a relational database
#[derive(Parser)]
#[command(name = "sqlrag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/sqlrag/config.toml, then ./sqlrag.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the schema index from the database
    Index,

    /// Answer one question
    Ask {
        /// The question
        question: String,

        /// Print the session as JSON
        #[arg(long)]
        json: bool,
    },

    /// Answer questions interactively
    Chat,

    /// Show which tables a question retrieves
    Search {
        /// The question
        question: String,

        /// Number of tables to retrieve
        #[arg(short = 'n', long)]
        top_n: Option<usize>,
    },

    /// Show the indexed schema of a table
    Schema {
        /// Table name
        table: String,
    },

    /// Show index statistics
    Stats,
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = SqlRagConfig::resolve(cli.config.as_deref())?;
    debug!(
        "Using database {}:{}/{}, index {}",
        config.database.host,
        config.database.port,
        config.database.name,
        config.index.path.display()
    );

    match cli.command {
        Commands::Index => index(&config).await?,
        Commands::Ask { question, json } => {
            let engine = build_engine(&config)?;
            let session = engine.ask(&question).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                print_session(&session);
            }
        }
        Commands::Chat => chat(&config).await?,
        Commands::Search { question, top_n } => {
            let engine = build_engine(&config)?;
            let top_n = top_n.unwrap_or(config.query.top_n);
            search(&engine, &question, top_n).await?;
        }
        Commands::Schema { table } => schema(&config, &table).await?,
        Commands::Stats => stats(&config).await?,
    }

    Ok(())
}

fn open_index(config: &SqlRagConfig) -> SqliteVectorIndex {
    SqliteVectorIndex::new(&config.index.path, &config.index.collection)
}

fn build_engine(config: &SqlRagConfig) -> Result<Engine, Box<dyn std::error::Error>> {
    let models = Arc::new(OllamaClient::new(&config.models)?);
    Ok(QueryEngine::new(
        models.clone(),
        models,
        Arc::new(open_index(config)),
        Arc::new(MySqlDatabase::new(config.database.clone())),
        QueryOptions::from(&config.query),
    ))
}

async fn index(config: &SqlRagConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "Indexing schema of '{}' into {} ({})...",
        config.database.name,
        config.index.path.display(),
        config.index.collection
    );

    let indexer = SchemaIndexer::new(
        Arc::new(MySqlDatabase::new(config.database.clone())),
        Arc::new(OllamaClient::new(&config.models)?),
        Arc::new(open_index(config)),
    );
    let report = indexer.rebuild().await?;

    println!("Found {} tables: {}", report.tables.len(), report.tables.join(", "));
    println!(
        "\nIndexed {} tables in {}ms",
        report.tables.len(),
        report.elapsed_ms
    );

    if let Some(sample) = report.sample_document {
        println!("\nSample schema document:\n{}", sample);
    }

    Ok(())
}

async fn chat(config: &SqlRagConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(config)?;

    println!("Ask a question about the '{}' database.", config.database.name);
    println!("Type 'quit', 'exit' or 'q' to leave.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"Question: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&question.to_lowercase().as_str()) {
            break;
        }

        match engine.ask(question).await {
            Ok(session) => print_session(&session),
            Err(e) => eprintln!("Error: {}\n", e),
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn print_session(session: &QuerySession) {
    println!(
        "\nRelevant tables: {}",
        session.retrieval.table_names().join(", ")
    );
    println!("\nGenerated SQL:\n{}\n", session.sql);

    match &session.outcome {
        QueryOutcome::Answered { rows, answer, .. } => {
            println!("({} rows)\n", rows.len());
            println!("Answer:\n{}\n", answer);
        }
        QueryOutcome::NoResults { .. } => {
            println!("No results found.\n");
        }
        QueryOutcome::ExecutionFailed { error, .. } => {
            println!("Error executing SQL: {}", error);
            println!("Try rephrasing your question.\n");
        }
    }
}

async fn search(
    engine: &Engine,
    question: &str,
    top_n: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let retrieval = engine.retrieve(question, top_n).await?;

    if retrieval.is_empty() {
        println!("No tables indexed. Run 'sqlrag index' first.");
        return Ok(());
    }

    for schema in &retrieval.schemas {
        println!(
            "{:>3}. {:<30} {:.4}",
            schema.rank, schema.table_name, schema.score
        );
    }
    Ok(())
}

async fn schema(config: &SqlRagConfig, table: &str) -> Result<(), Box<dyn std::error::Error>> {
    let index = open_index(config);

    let Some(record) = index.get(table).await? else {
        eprintln!("Table '{}' is not in the index.", table);
        std::process::exit(1);
    };

    println!("{}", record.document);

    let structured = record.metadata.table_schema()?;
    println!("{}", serde_json::to_string_pretty(&structured)?);
    Ok(())
}

async fn stats(config: &SqlRagConfig) -> Result<(), Box<dyn std::error::Error>> {
    let stats = open_index(config).stats().await?;

    println!("Collection:  {}", stats.collection);
    println!("Records:     {}", stats.records);
    match stats.dimension {
        Some(dimension) => println!("Dimension:   {}", dimension),
        None => println!("Dimension:   -"),
    }
    println!("Fingerprint: {}", stats.fingerprint);
    println!("Storage:     {} bytes", stats.storage_bytes);
    Ok(())
}
