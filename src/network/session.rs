//! Per-connection session loop.
//!
//! Each connection runs one task with a unified `tokio::select!` loop over
//! the inbound WebSocket stream, the client's writer queue, and the exit
//! signal. The loop is the only writer the socket ever has: handlers
//! enqueue, this task drains, so frames never interleave.
//!
//! The first text frame decides the protocol; every later frame parses
//! under that binding. Detection failure and parse failure both end the
//! session; semantic errors inside handlers do not.

use crate::handlers;
use crate::state::{Client, Hub};
use cloudlink_proto::{detect, Protocol};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// What a frame did to the session.
enum FrameOutcome {
    Continue,
    /// Send this error string, then end the session.
    Terminate(&'static str),
}

/// Run a session for a freshly accepted TCP connection.
pub async fn run(hub: Arc<Hub>, stream: TcpStream, addr: SocketAddr) -> anyhow::Result<()> {
    let mut ws = tokio_tungstenite::accept_async(stream).await?;

    if hub.config.reject_clients {
        info!(%addr, "rejecting connection");
        let _ = ws
            .close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "server is not accepting new connections".into(),
            }))
            .await;
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = hub.create_client(addr, tx);
    if hub.config.check_ip_addresses {
        info!(client = %client.id, uuid = %client.uuid, %addr, "client address");
    }

    let mut protocol = Protocol::Undetermined;
    loop {
        tokio::select! {
            inbound = ws.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match handle_frame(&hub, &client, &mut protocol, &text).await {
                        FrameOutcome::Continue => {}
                        FrameOutcome::Terminate(reply) => {
                            let _ = ws.send(Message::Text(reply.to_string())).await;
                            break;
                        }
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!(client = %client.id, "binary frame received");
                    let _ = ws
                        .close(Some(CloseFrame {
                            code: CloseCode::Unsupported,
                            reason: "binary frames are not supported".into(),
                        }))
                        .await;
                    break;
                }
                Some(Ok(Message::Close(_))) => break,
                // Ping/pong bookkeeping happens inside the transport.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(client = %client.id, error = %e, "read error");
                    break;
                }
                None => break,
            },

            outbound = rx.recv() => match outbound {
                Some(packet) => {
                    let text = packet.encode();
                    debug!(client = %client.id, frame = %text, "writing frame");
                    if let Err(e) = ws.send(Message::Text(text)).await {
                        warn!(client = %client.id, error = %e, "write error");
                        break;
                    }
                }
                // All senders dropped: the client is gone from the hub.
                None => break,
            },

            _ = client.closed() => {
                let _ = ws
                    .close(Some(CloseFrame {
                        code: CloseCode::Away,
                        reason: "server shutting down".into(),
                    }))
                    .await;
                break;
            }
        }
    }

    // Drain in-flight packets before deregistering.
    while let Ok(packet) = rx.try_recv() {
        let _ = ws.send(Message::Text(packet.encode())).await;
    }
    let _ = ws.close(None).await;

    teardown(&hub, &client).await;
    Ok(())
}

/// Deregister the client and announce the departure to the rooms it was in.
async fn teardown(hub: &Arc<Hub>, client: &Arc<Client>) {
    let (was_named, bound) = {
        let state = client.state.read().await;
        (state.name_set, state.protocol)
    };
    let rooms = client.all_rooms().await;
    hub.destroy_client(client).await;

    if was_named && bound == Protocol::Cl3or4 {
        for room in &rooms {
            handlers::cl3or4::broadcast_userlist_event(room, client, "remove").await;
        }
    }
}

async fn handle_frame(
    hub: &Arc<Hub>,
    client: &Arc<Client>,
    protocol: &mut Protocol,
    text: &str,
) -> FrameOutcome {
    if *protocol == Protocol::Undetermined {
        let Some(first) = detect(text) else {
            warn!(client = %client.id, "failed to detect protocol");
            return FrameOutcome::Terminate("failed to detect protocol");
        };
        *protocol = first.protocol();
        handlers::dispatch_first(hub, client, first).await;
        return FrameOutcome::Continue;
    }

    match handlers::dispatch(hub, client, *protocol, text).await {
        Ok(()) => FrameOutcome::Continue,
        Err(e) => {
            warn!(client = %client.id, error = %e, "failed to parse packet");
            FrameOutcome::Terminate("failed to parse packet")
        }
    }
}
