//! chatrelay: HTTP entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config) and init logger
//!   4. Report missing provider credentials (non-fatal)
//!   5. Build provider registry and conversation store
//!   6. Run the readiness check once and log the result
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Serve HTTP until shutdown

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chatrelay::chat::ChatService;
use chatrelay::conversation::ConversationStore;
use chatrelay::error::AppError;
use chatrelay::{config, http, llm, logger};

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        bind = %config.bind,
        default_model = %config.chat.default_model,
        truncation_threshold = config.chat.truncation.threshold(),
        truncation_keep = config.chat.truncation.keep(),
        session_idle_timeout_secs = config.chat.sessions.idle_timeout().as_secs(),
        max_sessions = config.chat.sessions.max_sessions(),
        routes = config.routing.models.len(),
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    for e in config.missing_credentials() {
        warn!(error = %e, "provider credential missing; requests to it will return an error reply");
    }

    let providers = llm::providers::build(&config).map_err(|e| AppError::Config(e.to_string()))?;
    let store = ConversationStore::new(config.chat.system_prompt.as_str(), config.chat.truncation)
        .with_limits(config.chat.sessions);
    let chat = Arc::new(ChatService::new(store, providers, config.chat.default_model.clone()));

    let readiness = chat.readiness().await;
    if readiness.valid {
        info!(message = %readiness.message, "provider ready");
    } else {
        warn!(message = %readiness.message, "provider not ready");
    }

    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    http::serve(&config.bind, chat, shutdown).await
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: chatrelay [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: {})", config::DEFAULT_CONFIG_PATH);
                println!("  -v, -vv, -vvv, -vvvv       Set logging verbosity (warn, info, debug, trace)");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
