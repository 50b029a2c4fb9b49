//! codeplay - terminal participant in a live coding session
//!
//! Joins the hub, prints chat and language changes from everyone in the
//! session, and sends whatever is typed.
//!
//! # Usage
//!
//! ```text
//! codeplay                          # join 127.0.0.1:3000
//! codeplay --addr 10.0.0.5:3000     # join another hub
//! codeplay --language python        # start with python selected
//! ```
//!
//! Lines typed are sent as chat. Lines starting with `/` are commands:
//! `/lang <id>`, `/languages`, `/status`, `/history`, `/quit`.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use codeplay_client::config::{DEFAULT_ADDR, ENV_ADDR};
use codeplay_client::{ClientConfig, SyncClient};
use codeplay_core::{Language, LanguageId};

// ============================================================================
// CLI Arguments
// ============================================================================

/// codeplay - shared chat and language selection for a coding session
#[derive(Parser, Debug)]
#[command(name = "codeplay")]
#[command(about = "Join a live coding session")]
#[command(version)]
struct Args {
    /// Hub address (host:port)
    #[arg(long, short = 'a', env = ENV_ADDR, default_value = DEFAULT_ADDR)]
    addr: String,

    /// Name sent to the hub (appears in hub logs)
    #[arg(long, short = 'n')]
    name: Option<String>,

    /// Language selected at startup
    #[arg(long, short = 'l')]
    language: Option<String>,
}

// ============================================================================
// Input
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Chat(String),
    Language(LanguageId),
    ListLanguages,
    Status,
    History,
    Quit,
    Unknown(String),
    Empty,
}

fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }

    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Chat(line.trim_end_matches(['\r', '\n']).to_string());
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, rest)| (name, rest.trim()));

    match name {
        "lang" | "language" if !rest.is_empty() => Input::Language(LanguageId::new(rest)),
        "languages" => Input::ListLanguages,
        "status" => Input::Status,
        "history" => Input::History,
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(trimmed.to_string()),
    }
}

fn print_languages(current: &LanguageId) {
    for language in Language::ALL {
        let marker = if language.id() == *current { "*" } else { " " };
        println!(" {marker} {:<12} {}", language.as_id(), language.display_name());
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

fn create_log_file() -> Option<std::fs::File> {
    let log_dir = dirs::state_dir()?.join("codeplay");

    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory {log_dir:?}: {e}");
        return None;
    }

    let log_path: PathBuf = log_dir.join("codeplay.log");
    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Warning: Failed to open log file {log_path:?}: {e}");
            None
        }
    }
}

fn init_logging() {
    // Logs go to a file so they never interleave with the conversation.
    if let Some(file) = create_log_file() {
        let filter = EnvFilter::from_default_env().add_directive(
            "codeplay_client=info"
                .parse()
                .unwrap_or_else(|_| tracing_subscriber::filter::Directive::from(tracing::Level::INFO)),
        );

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("off"))
            .init();
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let mut config = ClientConfig {
        addr: args.addr,
        client_name: args.name,
        ..ClientConfig::default()
    };
    if let Some(language) = args.language {
        config.initial_language = LanguageId::parse(&language)?;
    }

    info!(addr = %config.addr, "codeplay starting");
    println!("Joining {} ... (/quit to leave)", config.addr);

    let client = SyncClient::connect(config);

    let _chat = client.on_chat(|text| println!("> {text}"));
    let _language = client.on_language_change(|language| {
        println!("* language is now {} ({language})", language.display_name());
    });
    let _status = client.on_status(|status| println!("* {status}"));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match parse_input(&line) {
            Input::Chat(text) => {
                if !client.send_chat(&text) {
                    println!("! not sent ({})", client.status());
                }
            }
            Input::Language(language) => {
                let announced = client.send_language_change(language.clone());
                println!("* selected {} ({language})", language.display_name());
                if !announced {
                    println!("! selection kept locally, not shared ({})", client.status());
                }
            }
            Input::ListLanguages => print_languages(&client.language()),
            Input::Status => {
                let id = client
                    .connection_id()
                    .map_or_else(|| "-".to_string(), |id| id.to_string());
                println!("* {} as {id}, language {}", client.status(), client.language());
            }
            Input::History => {
                for entry in client.chat_log() {
                    println!("  [{}] {}", entry.received_at.format("%H:%M:%S"), entry.text);
                }
            }
            Input::Quit => break,
            Input::Unknown(command) => println!("! unknown command: {command}"),
            Input::Empty => {}
        }
    }

    client.shutdown().await;
    info!("codeplay stopped");
    Ok(())
}
