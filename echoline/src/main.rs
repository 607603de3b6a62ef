use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use echoline::api::{ApiServer, ApiServerConfig};
use echoline::AppConfig;

#[derive(Parser)]
#[command(name = "echoline")]
#[command(about = "Conversational echo service with cached conversation history", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start API server
    Serve {
        /// Host to bind to
        #[arg(long, env = "ECHOLINE_HOST", default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, env = "ECHOLINE_PORT", default_value = "8080")]
        port: u16,

        /// Give up on a store health check in /health/ready after this long
        #[arg(long, env = "ECHOLINE_READINESS_TIMEOUT_MS", default_value_t = 2000)]
        readiness_timeout_ms: u64,
    },

    /// Send one message and print the reply with the updated history
    Send {
        /// User identifier
        user_id: String,

        /// Message text
        message: String,
    },

    /// Print the stored history for a user
    Show {
        /// User identifier
        user_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "echoline=info,echoline_store=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let manager = Arc::new(cli.config.build_manager().await?);

    match cli.command {
        Commands::Serve {
            host,
            port,
            readiness_timeout_ms,
        } => {
            let config = ApiServerConfig {
                host,
                port,
                readiness_timeout: Duration::from_millis(readiness_timeout_ms),
            };
            let server = ApiServer::new(config, manager);
            server.start().await?;
        }

        Commands::Send { ref user_id, ref message } => {
            let exchange = manager.handle(user_id, message).await?;

            println!("{}", exchange.reply);
            println!();
            print_history(&exchange.history);
        }

        Commands::Show { ref user_id } => {
            let history = manager.history(user_id).await?;

            if history.is_empty() {
                println!("No history for {}", user_id);
            } else {
                print_history(&history);
            }
        }
    }

    Ok(())
}

fn print_history(history: &[echoline_store::Turn]) {
    println!("History ({} turns):", history.len());
    for (i, turn) in history.iter().enumerate() {
        println!("  {:>3} [{:>9}] {}", i + 1, turn.role.as_str(), turn.content);
    }
}
