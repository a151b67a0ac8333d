use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tablechat::assistant::{DataAssistant, ResponseType};
use tablechat::catalog;
use tablechat::config::{DbConfig, LlmConfig};
use tablechat::connector::TableConnector;
use tablechat::llm::LlmClient;
use tracing::info;

#[derive(Parser)]
#[command(name = "tablechat")]
#[command(about = "Ask natural-language questions about a MySQL table")]
struct Args {
    /// The question in natural language
    question: Option<String>,

    /// Table to ask about
    #[arg(short, long)]
    table: Option<String>,

    /// List the tables in the configured schema and exit
    #[arg(long)]
    list_tables: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let db = DbConfig::from_env()?;

    if args.list_tables {
        for table in catalog::list_tables(&db).await? {
            println!("{}", table);
        }
        return Ok(());
    }

    let (table, question) = match (args.table, args.question) {
        (Some(table), Some(question)) => (table, question),
        _ => anyhow::bail!("provide --table and a question, or --list-tables"),
    };

    info!("Question: {}", question);

    let backend = Arc::new(LlmClient::new(LlmConfig::from_env()?));
    let assistant = DataAssistant::new(backend);
    let connector = TableConnector::bind(&table, &db)?;

    let response = assistant.ask(Some(&connector), &question).await;
    match response.response_type {
        ResponseType::Answer => println!("{}", response.answer),
        ResponseType::Error => anyhow::bail!("{}", response.answer),
    }

    Ok(())
}
