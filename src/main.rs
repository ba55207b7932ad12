mod common;
mod config;
mod content;
mod network;
mod repl;
mod session;
mod storage;
mod ui;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use network::{ClientServices, RestApi, SessionClient, WebSocketConnector};
use storage::CredentialDatabase;
use tokio::sync::mpsc;
use ui::ChatApp;

#[derive(Parser)]
#[command(
    name = "rust_assistant_chat",
    version,
    about = "Chat client for the Rust assistant"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, PartialEq, Eq)]
enum Mode {
    /// Line-oriented chat in the terminal instead of the desktop window
    Terminal {
        /// Sign in as this user when no stored credential is valid
        #[arg(long)]
        username: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    app_config.apply_env_overrides(|key| std::env::var(key).ok());

    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    let (event_tx, event_rx) = mpsc::channel(100);

    let client = SessionClient::new(event_tx, cmd_rx, build_services(&app_config)?);
    let session = tokio::spawn(client.run());

    match cli.mode {
        Some(Mode::Terminal { username }) => {
            let password = std::env::var("CHAT_PASSWORD").ok();
            repl::run(cmd_tx, event_rx, username, password).await;
        }
        None => run_desktop(cmd_tx, event_rx)?,
    }

    session.abort();
    Ok(())
}

fn build_services(
    app_config: &config::AppConfig,
) -> Result<ClientServices, Box<dyn std::error::Error>> {
    let api = Arc::new(RestApi::new(&app_config.api_base_url)?);
    let connector = Arc::new(WebSocketConnector::new(&app_config.socket_url)?);

    let credentials = match open_credentials(app_config) {
        Ok(db) => Some(db),
        Err(err) => {
            log::warn!("Credential store unavailable, logins will not be remembered: {err}");
            None
        }
    };

    log::info!(
        "Using API {} and socket {}",
        app_config.api_base_url,
        app_config.socket_url
    );

    Ok(ClientServices {
        connector,
        auth: api.clone(),
        history: api,
        credentials,
        reply_timeout: app_config.reply_timeout(),
    })
}

fn open_credentials(
    app_config: &config::AppConfig,
) -> Result<CredentialDatabase, Box<dyn std::error::Error>> {
    storage::ensure_data_dir(&app_config.data_dir)?;
    Ok(CredentialDatabase::with_path(app_config.credential_db_path())?)
}

fn run_desktop(
    cmd_tx: mpsc::Sender<common::SessionCommand>,
    event_rx: mpsc::Receiver<common::SessionEvent>,
) -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions::default();
    let mut event_rx = Some(event_rx);

    eframe::run_native(
        "Rust Assistant",
        options,
        Box::new(move |cc| {
            let event_receiver = event_rx
                .take()
                .expect("ChatApp should only be initialized once");
            Ok(Box::new(ChatApp::new(cc, cmd_tx.clone(), event_receiver)))
        }),
    )
}
