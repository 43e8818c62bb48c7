//! Throwaway OneBot-like peer for local testing of `wsbot`.
//!
//! Accepts WebSocket clients on `/ws`, logs what they send, and periodically
//! pushes a group message from a random user saying `上班` or `下班`.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use futures::{SinkExt as _, StreamExt as _};
use rand::Rng as _;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{self, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PATH: &str = "/ws";
const COMMANDS: [&str; 2] = ["上班", "下班"];

#[derive(Debug, Parser)]
#[command(name = "mockserver", version, about = "Mock OneBot WebSocket server")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8081")]
    addr: SocketAddr,
    /// Seconds between generated messages
    #[arg(long, default_value_t = 10)]
    interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let listener = TcpListener::bind(cli.addr).await?;
    let period = Duration::from_secs(cli.interval_secs.max(1));
    info!(url = %format!("ws://{}{PATH}", listener.local_addr()?), "Mock server listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve(stream, peer, period));
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Mock server stopped");
    Ok(())
}

async fn serve(stream: TcpStream, peer: SocketAddr, period: Duration) {
    let check_path = |request: &Request, response: Response| {
        if request.uri().path() == PATH {
            Ok(response)
        } else {
            let mut error = ErrorResponse::new(Some("not found".to_owned()));
            *error.status_mut() = StatusCode::NOT_FOUND;
            Err(error)
        }
    };

    let ws = match tokio_tungstenite::accept_hdr_async(stream, check_path).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "Handshake failed");
            return;
        }
    };
    info!(%peer, "Client connected");

    let (mut write, mut read) = ws.split();
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            inbound = read.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => info!(%peer, frame = %text, "Received"),
                    Some(Ok(Message::Binary(bytes))) => info!(%peer, len = bytes.len(), "Received binary"),
                    Some(Ok(Message::Close(frame))) => {
                        info!(%peer, ?frame, "Client closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%peer, error = %e, "Read failed");
                        break;
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                let payload = random_message();
                if let Err(e) = write.send(Message::Text(payload.into())).await {
                    warn!(%peer, error = %e, "Write failed");
                    break;
                }
                info!(%peer, "Sent OneBot-like message");
            }
        }
    }

    let bye = CloseFrame {
        code: CloseCode::Normal,
        reason: "bye".into(),
    };
    drop(write.send(Message::Close(Some(bye))).await);
    info!(%peer, "Client disconnected");
}

fn random_message() -> String {
    let mut rng = rand::rng();
    let user_id = rng.random_range(10_000..=10_002_i64);
    let text = COMMANDS[rng.random_range(0..COMMANDS.len())];

    json!({
        "time": chrono::Utc::now().timestamp(),
        "post_type": "message",
        "message_type": "group",
        "user_id": user_id,
        "raw_message": text,
        "message": text,
    })
    .to_string()
}
