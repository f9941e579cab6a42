//! Integration test common infrastructure.
//!
//! Spawns in-process hub instances and provides a WebSocket test client
//! for driving protocol flows and asserting on server emissions.

#![allow(dead_code)]

use anyhow::{anyhow, bail};
use cloudlinkd::config::HubConfig;
use cloudlinkd::network::Gateway;
use cloudlinkd::state::Hub;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const SILENCE_WINDOW: Duration = Duration::from_millis(200);

/// An in-process hub instance.
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Spawn a hub with default configuration.
    pub async fn spawn() -> Self {
        Self::spawn_with(HubConfig::default()).await
    }

    /// Spawn a hub with the given configuration.
    pub async fn spawn_with(config: HubConfig) -> Self {
        let hub = Hub::new(config);
        let gateway = Gateway::bind("127.0.0.1:0".parse().unwrap(), hub)
            .await
            .expect("bind test gateway");
        let addr = gateway.local_addr().expect("gateway local addr");
        let shutdown = gateway.shutdown_token();
        tokio::spawn(gateway.run());
        Self { addr, shutdown }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Connect a new test client.
    pub async fn client(&self) -> TestClient {
        TestClient::connect(&self.url())
            .await
            .expect("connect test client")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A WebSocket test client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (ws, _) = connect_async(url).await?;
        Ok(Self { ws })
    }

    /// Send a raw text frame.
    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Send a JSON value as a text frame.
    pub async fn send_json(&mut self, value: Value) -> anyhow::Result<()> {
        self.send_text(&value.to_string()).await
    }

    /// Send a binary frame (for protocol-error tests).
    pub async fn send_binary(&mut self, bytes: Vec<u8>) -> anyhow::Result<()> {
        self.ws.send(Message::Binary(bytes)).await?;
        Ok(())
    }

    /// Receive the next text frame.
    pub async fn recv_text(&mut self) -> anyhow::Result<String> {
        loop {
            let frame = timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .map_err(|_| anyhow!("timed out waiting for a frame"))?;
            match frame {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Close(_))) | None => bail!("connection closed"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Receive the next frame parsed as JSON.
    pub async fn recv_json(&mut self) -> anyhow::Result<Value> {
        Ok(serde_json::from_str(&self.recv_text().await?)?)
    }

    /// Receive frames until one satisfies the predicate, returning it.
    /// Gives up after 50 frames.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Value>
    where
        F: FnMut(&Value) -> bool,
    {
        for _ in 0..50 {
            let value = self.recv_json().await?;
            if predicate(&value) {
                return Ok(value);
            }
        }
        bail!("predicate not satisfied within 50 frames")
    }

    /// Receive frames until a `statuscode` arrives, asserting its code id.
    pub async fn expect_statuscode(&mut self, code_id: u64) -> anyhow::Result<Value> {
        let status = self
            .recv_until(|v| v["cmd"] == "statuscode")
            .await?;
        anyhow::ensure!(
            status["code_id"] == code_id,
            "expected code_id {code_id}, got {status}"
        );
        Ok(status)
    }

    /// Assert that nothing arrives for a short window.
    pub async fn expect_silence(&mut self) {
        let frame = timeout(SILENCE_WINDOW, self.ws.next()).await;
        if let Ok(Some(Ok(Message::Text(text)))) = frame {
            panic!("expected silence, received frame: {text}");
        }
    }

    /// Wait for the server to close the connection.
    pub async fn expect_close(&mut self) -> anyhow::Result<()> {
        loop {
            match timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .map_err(|_| anyhow!("timed out waiting for close"))?
            {
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => continue,
                Some(Err(_)) => return Ok(()),
            }
        }
    }
}
