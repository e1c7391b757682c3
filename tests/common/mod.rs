//! Loopback stand-in for the tracker server.
//!
//! Speaks just enough of the protocol to drive the simulator: reads the
//! identity frame, answers with an ACK byte chosen by a per-connection
//! policy, then acknowledges each report with a record count of 1.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gps_tracker_simulator::config::SimulatorConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Accept,
    RejectAck(u8),
    /// Acknowledge the handshake, then hang up halfway through the record
    /// ACK of the n-th report.
    CloseAfterReports(usize),
}

#[derive(Debug, Clone)]
pub enum ServerEvent {
    Handshake {
        identity: String,
        connection: usize,
        at: Instant,
    },
    Report {
        identity: String,
        packet: Vec<u8>,
        at: Instant,
    },
    UnexpectedBytes {
        identity: String,
        len: usize,
    },
}

pub struct FakeServer {
    pub addr: SocketAddr,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

type Policy = dyn Fn(&str, usize) -> Behavior + Send + Sync;

impl FakeServer {
    /// `policy` receives the identity and how many times it has connected
    /// before (0 for the first connection).
    pub async fn spawn<P>(policy: P) -> FakeServer
    where
        P: Fn(&str, usize) -> Behavior + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake server");
        let addr = listener.local_addr().unwrap();
        let (sender, events) = mpsc::unbounded_channel();
        let policy: Arc<Policy> = Arc::new(policy);
        let connections = Arc::new(Mutex::new(HashMap::<String, usize>::new()));

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let sender = sender.clone();
                let policy = Arc::clone(&policy);
                let connections = Arc::clone(&connections);
                tokio::spawn(async move {
                    let _ = serve(stream, sender, policy, connections).await;
                });
            }
        });

        FakeServer { addr, events }
    }

    pub fn config(&self) -> SimulatorConfig {
        SimulatorConfig {
            server_address: self.addr.to_string(),
            seed: Some(42),
            log_stdout: false,
            ..Default::default()
        }
    }

    pub async fn next_event(&mut self, within: Duration) -> Option<ServerEvent> {
        tokio::time::timeout(within, self.events.recv()).await.ok().flatten()
    }

    /// Collects everything reported so far without waiting.
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

async fn serve(
    mut stream: TcpStream,
    events: mpsc::UnboundedSender<ServerEvent>,
    policy: Arc<Policy>,
    connections: Arc<Mutex<HashMap<String, usize>>>,
) -> std::io::Result<()> {
    let len = stream.read_u16().await? as usize;
    let mut raw = vec![0u8; len];
    stream.read_exact(&mut raw).await?;
    let identity = String::from_utf8_lossy(&raw).into_owned();

    let connection = {
        let mut connections = connections.lock().unwrap();
        let count = connections.entry(identity.clone()).or_insert(0);
        let current = *count;
        *count += 1;
        current
    };
    let _ = events.send(ServerEvent::Handshake {
        identity: identity.clone(),
        connection,
        at: Instant::now(),
    });

    let close_after = match policy(&identity, connection) {
        Behavior::RejectAck(ack) => {
            stream.write_all(&[ack]).await?;
            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).await?;
            if !rest.is_empty() {
                let _ = events.send(ServerEvent::UnexpectedBytes {
                    identity,
                    len: rest.len(),
                });
            }
            return Ok(());
        }
        Behavior::Accept => None,
        Behavior::CloseAfterReports(n) => Some(n),
    };

    stream.write_all(&[0x01]).await?;
    let mut received = 0;
    loop {
        let mut header = [0u8; 8];
        stream.read_exact(&mut header).await?;
        let body_len = u32::from_be_bytes(header[4..8].try_into().unwrap()) as usize;
        let mut rest = vec![0u8; body_len + 4];
        stream.read_exact(&mut rest).await?;

        let mut packet = header.to_vec();
        packet.extend_from_slice(&rest);
        let _ = events.send(ServerEvent::Report {
            identity: identity.clone(),
            packet,
            at: Instant::now(),
        });
        received += 1;

        if close_after == Some(received) {
            stream.write_all(&[0x00, 0x00]).await?;
            return Ok(());
        }
        stream.write_all(&1u32.to_be_bytes()).await?;
    }
}
