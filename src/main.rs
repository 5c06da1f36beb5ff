use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use chatsrv::{db_task, server};

/// Chat server with a built-in two-player game of Tic-Tac-Toe.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// TCP port to listen on.
    port: u16,

    /// Path of the SQLite database holding users and the match.
    #[arg(long, default_value = "chatsrv.db")]
    database: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let db = db_task::run(&args.database)?;

    let listener = TcpListener::bind(("0.0.0.0", args.port))
        .await
        .with_context(|| format!("failed to bind port {}", args.port))?;
    info!("listening on port {}", args.port);

    let gs = server::start(db.clone());
    tokio::spawn(server::console::run(gs.clone(), db));

    tokio::select! {
        result = server::serve(gs.clone(), listener) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            let _ = gs.send(server::Message::Shutdown).await;
            // give the connection tasks a moment to flush their goodbyes
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok(())
        }
    }
}
