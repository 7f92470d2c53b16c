use northwind_agent::config::ReportStyle;
use northwind_agent::{
    provision_northwind, AgentConfig, AnswerResult, ExecutionEngine, LlmOracle, Oracle, Orchestrator,
    ReportFormatter, RuleOracle,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEMO_QUESTIONS: &[&str] = &[
    "What are the top 5 best-selling products?",
    "Show me sales performance by category",
    "Which customers have placed the most orders?",
    "What's the average order value?",
    "Show me the database schema for the Products table",
    "Which suppliers provide the most products?",
    "What are the total sales by country?",
    "Show me employee sales performance",
    "What products are currently out of stock?",
    "Analyze the seasonal trends in our sales data",
];

#[derive(Parser)]
#[command(name = "northwind-agent")]
#[command(about = "Answer natural-language questions about the Northwind sample database")]
#[command(version)]
struct Args {
    /// Path to the SQLite store (or set DATABASE_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Use the offline keyword oracle even when OPENAI_API_KEY is set
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the Northwind tables and load the sample rows
    Init,
    /// List tables with their row counts
    Tables,
    /// Ask a single question
    Ask {
        question: String,

        /// Print the cycle trace as JSON after the answer
        #[arg(long)]
        trace: bool,
    },
    /// Interactive loop; `tables` lists tables, `exit` quits
    Repl,
    /// Run the demo question list
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AgentConfig::from_env()?;
    if let Some(db) = args.db {
        config.database_path = db;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.command {
        Commands::Init => init(&config),
        Commands::Tables => tables(&config).await,
        Commands::Ask { question, trace } => {
            let orchestrator = build_orchestrator(&config, args.offline)?;
            let answer = orchestrator.ask(&question).await;
            print_answer(&answer);
            if trace {
                println!("{}", serde_json::to_string_pretty(&answer.trace)?);
            }
            Ok(())
        }
        Commands::Repl => repl(&config, args.offline).await,
        Commands::Demo => demo(&config, args.offline).await,
    }
}

fn init(config: &AgentConfig) -> Result<()> {
    let report = provision_northwind(&config.database_path)?;
    println!(
        "Provisioned {} ({} tables, {} rows inserted)",
        config.database_path.display(),
        report.tables,
        report.rows_inserted
    );
    Ok(())
}

async fn tables(config: &AgentConfig) -> Result<()> {
    let engine = ExecutionEngine::new(&config.database_path, config.execution.clone());
    let listing = engine.list_tables().await?;
    let formatter = ReportFormatter::new(&config.reporting);
    println!("{}", formatter.format(&[listing], ReportStyle::Table));
    Ok(())
}

fn build_orchestrator(config: &AgentConfig, offline: bool) -> Result<Orchestrator> {
    let oracle: Arc<dyn Oracle> = if offline || config.llm.api_key.trim().is_empty() {
        if !offline {
            warn!("OPENAI_API_KEY is not set; using the offline keyword oracle");
        }
        Arc::new(RuleOracle::new()?)
    } else {
        config.validate_for_llm()?;
        let oracle = LlmOracle::new(config.llm.clone())?;
        info!("Using language model {}", oracle.model());
        Arc::new(oracle)
    };
    Ok(Orchestrator::from_config(config, oracle)?)
}

fn print_answer(answer: &AnswerResult) {
    println!("\n{}", answer.text);
    if !answer.capabilities_attempted.is_empty() {
        println!("\n[capabilities: {}]", answer.capabilities_attempted.join(", "));
    }
}

async fn repl(config: &AgentConfig, offline: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config, offline)?;
    println!("Northwind agent. Type 'tables' to list tables, 'exit' to quit.");

    let stdin = io::stdin();
    loop {
        print!("\n> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        match input.to_lowercase().as_str() {
            "" => continue,
            "exit" | "quit" => break,
            "tables" => tables(config).await?,
            _ => print_answer(&orchestrator.ask(input).await),
        }
    }
    Ok(())
}

async fn demo(config: &AgentConfig, offline: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config, offline)?;
    println!("{}", "=".repeat(60));
    for (i, question) in DEMO_QUESTIONS.iter().enumerate() {
        println!("\nDemo question {}: {}", i + 1, question);
        let answer = orchestrator.ask(question).await;
        print_answer(&answer);
        if !answer.succeeded {
            warn!("Demo question {} failed: {:?}", i + 1, answer.failure_reason);
        }
    }
    Ok(())
}
