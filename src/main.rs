use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod analysis;
mod app;
mod bot;
mod chat;
mod config;
mod content;
mod llm;
mod message;
mod prompts;
mod ui;

use bot::{BotAdapter, PoeRequest};
use config::Config;
use llm::GeminiClient;

#[derive(Parser)]
#[command(name = "specieslens")]
#[command(version)]
#[command(about = "Streamed species identification chat, powered by Gemini", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one Poe bot request: JSON on stdin, JSON on stdout
    Bot,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        None => app::App::new(&config)?.run().await,
        Some(Commands::Bot) => run_bot(&config).await,
    }
}

/// Read a single bot-platform request from stdin and print the response.
/// The adapter never fails, so a malformed request still produces a
/// well-formed text reply.
async fn run_bot(config: &Config) -> Result<()> {
    let client = GeminiClient::new(config)?;
    let adapter = BotAdapter::new(Arc::new(client));

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read request from stdin")?;
    let request: PoeRequest = serde_json::from_str(&input).unwrap_or_default();

    let response = adapter.handle(&request).await;
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
