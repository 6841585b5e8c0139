use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use pagechat::chat::{self, ChatEvent};
use pagechat::config::load_config;
use pagechat::index;
use pagechat::server;
use pagechat::session::SessionState;

#[derive(Parser)]
#[command(name = "pagechat", about = "Ask questions about a PDF over HTTP")]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve,
    /// Ingest a PDF into the data directory without starting the server.
    Ingest {
        /// Path to the PDF file.
        file: PathBuf,
    },
    /// Ask a single question against the persisted index and print the answer.
    Ask {
        /// The question to ask.
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Serve => server::run_server(config).await,
        Command::Ingest { file } => {
            let bytes = std::fs::read(&file)?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.pdf".to_string());
            let index = index::ingest(&config, &bytes, &name).await?;
            println!("Indexed {} pages from {}.", index.entries.len(), name);
            Ok(())
        }
        Command::Ask { question } => {
            let session = Arc::new(SessionState::new(&config.memory));
            let mut events = chat::stream_chat_turn(&config, session, &question).await?;
            let mut cited_pages: Vec<u32> = Vec::new();
            while let Some(event) = events.next().await {
                match event {
                    ChatEvent::Sources { sources } => {
                        cited_pages = sources.iter().filter_map(|s| s.page).collect();
                    }
                    ChatEvent::MessageChunk { content } => {
                        print!("{}", content);
                        use std::io::Write;
                        std::io::stdout().flush()?;
                    }
                    ChatEvent::MessageEnd => println!(),
                    ChatEvent::Error { error } => {
                        println!();
                        anyhow::bail!(error);
                    }
                    ChatEvent::MessageStart => {}
                }
            }
            if !cited_pages.is_empty() {
                let pages: Vec<String> = cited_pages.iter().map(u32::to_string).collect();
                println!("(sources: pages {})", pages.join(", "));
            }
            Ok(())
        }
    }
}
