use std::future::Future;
use std::io;
use std::time::Duration;

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::traffic_models::ReportSchedule;

use super::codec::{
    check_handshake_ack, decode_record_ack, encode_handshake, DeviceIdentity, InvalidAck,
    ReportEncoder, RECORD_ACK_SIZE,
};
use super::connector::Connector;
use super::location::{LocationFix, LocationSampler};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] InvalidAck),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Dialing,
    Handshaking,
    Reporting,
    Closed,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceStats {
    pub identity: String,
    pub sessions: u64,
    pub handshakes: u64,
    pub reports_sent: u64,
    pub acks_received: u64,
    pub last_ack_count: Option<u32>,
    pub connection_errors: u64,
    pub protocol_errors: u64,
    pub reporting_time_ms: u64,
}

impl DeviceStats {
    fn record_error(&mut self, error: &SessionError) {
        match error {
            SessionError::Connection(_) => self.connection_errors += 1,
            SessionError::Protocol(_) => self.protocol_errors += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub server_address: String,
    pub schedule: ReportSchedule,
    /// Applied to connect, each read and each write. `None` leaves it to the OS.
    pub io_timeout: Option<Duration>,
    pub encoder: ReportEncoder,
}

/// One simulated tracker. Identity and random source survive reconnects;
/// the connection lives only for the duration of [`Device::run_session`].
#[derive(Debug)]
pub struct Device {
    identity: DeviceIdentity,
    settings: SessionSettings,
    sampler: LocationSampler<StdRng>,
    state: SessionState,
    last_state_change: Instant,
    stats: DeviceStats,
}

impl Device {
    pub fn new(identity: DeviceIdentity, settings: SessionSettings, sampler: LocationSampler<StdRng>) -> Self {
        let stats = DeviceStats {
            identity: identity.to_string(),
            ..Default::default()
        };
        Self {
            identity,
            settings,
            sampler,
            state: SessionState::Closed,
            last_state_change: Instant::now(),
            stats,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    pub fn into_stats(mut self) -> DeviceStats {
        self.change_state(SessionState::Closed);
        self.stats
    }

    fn change_state(&mut self, new_state: SessionState) {
        let now = Instant::now();
        if self.state == SessionState::Reporting {
            let elapsed = now.duration_since(self.last_state_change);
            self.stats.reporting_time_ms += elapsed.as_millis() as u64;
        }
        if self.state != new_state {
            debug!(identity = %self.identity, from = ?self.state, to = ?new_state, "session state changed");
        }
        self.state = new_state;
        self.last_state_change = now;
    }

    /// One connection attempt: dial, handshake, then report until something
    /// fails. The connection is shut down before returning.
    pub async fn run_session<C: Connector>(&mut self, connector: &C) -> Result<(), SessionError> {
        self.change_state(SessionState::Dialing);
        self.stats.sessions += 1;

        let address = self.settings.server_address.clone();
        let result = match with_timeout(self.settings.io_timeout, connector.connect(&address)).await {
            Ok(mut stream) => {
                info!(identity = %self.identity, server = %address, "connected");
                let result = self.drive(&mut stream).await;
                let _ = stream.shutdown().await;
                result
            }
            Err(e) => Err(e.into()),
        };

        self.change_state(SessionState::Closed);
        if let Err(e) = &result {
            self.stats.record_error(e);
        }
        result
    }

    async fn drive<S>(&mut self, stream: &mut S) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let timeout = self.settings.io_timeout;

        self.change_state(SessionState::Handshaking);
        handshake(stream, &self.identity, timeout).await?;
        self.stats.handshakes += 1;

        self.change_state(SessionState::Reporting);
        loop {
            let fix = self.sampler.next_fix();
            send_report(stream, &self.settings.encoder, &fix, timeout).await?;
            self.stats.reports_sent += 1;
            info!(identity = %self.identity, lat = fix.latitude, lon = fix.longitude, "sent report");

            let count = read_record_ack(stream, timeout).await?;
            self.stats.acks_received += 1;
            self.stats.last_ack_count = Some(count);
            info!(identity = %self.identity, count, "received record ack");

            let delay = self.settings.schedule.sample(self.sampler.rng_mut());
            tokio::time::sleep(delay).await;
        }
    }
}

async fn with_timeout<T, F>(limit: Option<Duration>, operation: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "network operation timed out"))?,
        None => operation.await,
    }
}

/// Sends the identity frame and waits for the single-byte verdict.
pub async fn handshake<S>(
    stream: &mut S,
    identity: &DeviceIdentity,
    timeout: Option<Duration>,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = encode_handshake(identity);
    with_timeout(timeout, stream.write_all(&frame)).await?;

    let mut ack = [0u8; 1];
    with_timeout(timeout, stream.read_exact(&mut ack)).await?;
    check_handshake_ack(ack[0])?;
    Ok(())
}

pub async fn send_report<S>(
    stream: &mut S,
    encoder: &ReportEncoder,
    fix: &LocationFix,
    timeout: Option<Duration>,
) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let packet = encoder.encode(fix);
    with_timeout(timeout, stream.write_all(&packet)).await
}

pub async fn read_record_ack<S>(stream: &mut S, timeout: Option<Duration>) -> io::Result<u32>
where
    S: AsyncRead + Unpin,
{
    let mut bytes = [0u8; RECORD_ACK_SIZE];
    with_timeout(timeout, stream.read_exact(&mut bytes)).await?;
    Ok(decode_record_ack(bytes))
}
