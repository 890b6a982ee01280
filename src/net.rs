// ==============================================================================
// net.rs - SPECTATOR WEBSOCKET FEED
// ------------------------------------------------------------------------------
// Read-only. On connect a client gets one `welcome` (session id + track
// markers), then every broadcast snapshot. The only message it may send is
// `{"type":"ping"}`, answered with `{"type":"pong"}`; anything else is
// ignored. Cars are driven by their controllers, never by clients.
// ==============================================================================

use std::sync::Arc;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::accept_async;
use tungstenite::Message;

use crate::state::RaceState;

fn is_ping(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|t| t == "ping"))
        .unwrap_or(false)
}

pub async fn start_websocket_server(addr: String, state: Arc<Mutex<RaceState>>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    log::info!("Spectator feed on ws://{}", addr);

    loop {
        let (raw, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                log::warn!("Accept failed: {}", e);
                continue;
            }
        };
        tokio::spawn(handle_spectator(raw, peer.to_string(), Arc::clone(&state)));
    }
}

async fn handle_spectator(raw: TcpStream, peer: String, state: Arc<Mutex<RaceState>>) {
    let ws = match accept_async(raw).await {
        Ok(ws) => ws,
        Err(e) => {
            log::warn!("Handshake with {} failed: {}", peer, e);
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    // -------------------------------
    // 1) Outgoing channel + send loop
    // -------------------------------
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // -------------------------------
    // 2) Welcome, then join the broadcast
    // -------------------------------
    {
        let mut race = state.lock().await;
        match serde_json::to_string(&race.welcome()) {
            Ok(welcome) => {
                let _ = tx.send(welcome);
            }
            Err(e) => log::error!("Welcome serialisation failed: {}", e),
        }
        race.register_client(tx.clone());
    }

    log::info!("Spectator connected: {}", peer);

    // -------------------------------
    // 3) Receive loop (ping only)
    // -------------------------------
    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(_) => break,
        };
        if msg.is_close() {
            break;
        }
        let Ok(text) = msg.to_text() else {
            continue;
        };
        if is_ping(text) {
            let _ = tx.send(r#"{"type":"pong"}"#.into());
        } else {
            log::trace!("Ignoring message from {}: {}", peer, text);
        }
    }

    // the broadcaster drops this client's sender on its next failed send
    log::info!("Spectator disconnected: {}", peer);
}
