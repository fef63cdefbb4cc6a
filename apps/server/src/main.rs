use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use roomcast_config::{load as load_config, AppConfig};
use roomcast_gateway::{create_router, GatewayState};
use roomcast_runtime::{telemetry, RelayServices};
use tokio::net::TcpListener;
use tracing::info;

/// How long shutdown waits for WebSocket sessions to finish.
const SESSION_CLOSE_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "roomcast")]
#[command(about = "Room-based message relay (serves by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Start the HTTP and WebSocket server
    Serve,
    /// Run a single drain cycle and print the report
    Drain,
    /// Print the quarantined queue entries
    Quarantine,
    /// Print the latest stored messages of a room
    History {
        room_id: String,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(&config).await,
        Commands::Drain => drain(&config).await,
        Commands::Quarantine => show_quarantine(&config).await,
        Commands::History { room_id, limit } => show_history(&config, &room_id, limit).await,
    }
}

async fn initialise(config: &AppConfig) -> anyhow::Result<RelayServices> {
    RelayServices::initialise(config)
        .await
        .context("failed to initialise relay services")
}

async fn run_server(config: &AppConfig) -> anyhow::Result<()> {
    info!("starting Roomcast relay");

    let services = initialise(config).await?;
    let tasks = services.start().await?;

    let state = GatewayState::new(services.router.clone(), services.queue.clone());
    let app = create_router(state.clone());

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(roomcast_runtime::shutdown_signal())
        .await
        .context("http server error")?;

    // Upgraded sockets are not tracked by the graceful shutdown above; they
    // have to stop submitting before the side-channels are settled.
    state.close_sessions(SESSION_CLOSE_GRACE).await;
    tasks.shutdown().await;
    info!("relay shut down");
    Ok(())
}

async fn drain(config: &AppConfig) -> anyhow::Result<()> {
    let services = initialise(config).await?;

    let report = services
        .flush_worker()
        .drain_once()
        .await
        .context("drain cycle failed")?;

    println!("Drain cycle finished:");
    println!("- {} entries attempted", report.attempted);
    println!("- {} persisted", report.persisted);
    println!("- {} quarantined", report.quarantined);
    println!("- {} trimmed from the queue", report.trimmed);
    println!("- {} still pending", services.queue.len().await?);

    Ok(())
}

async fn show_quarantine(config: &AppConfig) -> anyhow::Result<()> {
    let services = initialise(config).await?;

    let entries = services
        .queue
        .quarantined()
        .await
        .context("failed to read quarantine")?;

    if entries.is_empty() {
        println!("Quarantine is empty");
        return Ok(());
    }

    println!("Found {} quarantined entries:", entries.len());
    for (index, entry) in entries.iter().enumerate() {
        println!("{:<5} {}", index, entry);
    }

    Ok(())
}

async fn show_history(config: &AppConfig, room_id: &str, limit: i64) -> anyhow::Result<()> {
    let services = initialise(config).await?;

    let comments = services
        .comments
        .find_by_room(room_id, limit)
        .await
        .with_context(|| format!("failed to fetch messages of room {room_id}"))?;

    if comments.is_empty() {
        println!("No messages stored for room {room_id}");
        return Ok(());
    }

    println!(
        "{:<25} {:<20} {}",
        "Created At", "Sender", "Text (truncated)"
    );
    println!("{}", "-".repeat(100));
    for comment in comments {
        let text = if comment.text.chars().count() > 50 {
            format!("{}...", comment.text.chars().take(47).collect::<String>())
        } else {
            comment.text
        };
        println!("{:<25} {:<20} {}", comment.created_at, comment.sender_name, text);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["roomcast"]).unwrap();
        assert_eq!(cli.command.unwrap_or(Commands::Serve), Commands::Serve);
    }

    #[test]
    fn operator_commands_parse() {
        let cli = Cli::try_parse_from(["roomcast", "drain"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Drain));

        let cli = Cli::try_parse_from(["roomcast", "quarantine"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Quarantine));

        let cli = Cli::try_parse_from(["roomcast", "history", "Q1", "--limit", "5"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::History {
                room_id: "Q1".into(),
                limit: 5
            })
        );
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["roomcast", "console"]).is_err());
    }
}
