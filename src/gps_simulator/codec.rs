//! Wire encoding for the tracker protocol.
//!
//! # Handshake
//!
//! ```text
//! client -> [u16 BE identity length][ASCII identity]
//! server -> [u8 ack]            (0x01 accepted)
//! ```
//!
//! # Report
//!
//! ```text
//! client -> [4 preamble][4 length][32 body][4 checksum]
//! server -> [u32 BE accepted record count]
//! ```
//!
//! The body carries a single AVL record (codec 0x08). The length field covers
//! the body only. The checksum is a placeholder: the default encoder writes
//! zeros and no CRC algorithm is implemented.

use std::fmt;

use rand::Rng;
use thiserror::Error;

use crate::constants::{
    ALTITUDE, ANGLE, CODEC_ID, COORDINATE_SCALE, EXTENSION_BYTES, HANDSHAKE_ACCEPTED,
    IDENTITY_PREFIX, IDENTITY_RANDOM_DIGITS, PRIORITY, RECORD_COUNT, SATELLITES, SPEED,
};

use super::location::LocationFix;

pub const HEADER_SIZE: usize = 8;
pub const BODY_SIZE: usize = 32;
pub const CHECKSUM_SIZE: usize = 4;
pub const REPORT_PACKET_SIZE: usize = HEADER_SIZE + BODY_SIZE + CHECKSUM_SIZE;
pub const RECORD_ACK_SIZE: usize = 4;

/// Computes the 4-byte trailer from the packet body.
pub type ChecksumFn = fn(&[u8]) -> u32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("identity must be ASCII: {0:?}")]
    NonAsciiIdentity(String),

    #[error("identity is {0} bytes, the length prefix holds at most 65535")]
    IdentityTooLong(usize),

    #[error("identity must not be empty")]
    EmptyIdentity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid ACK: 0x{0:02x}")]
pub struct InvalidAck(pub u8);

/// Device identifier sent in the handshake. Always ASCII and short enough for
/// its u16 length prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn new(value: impl Into<String>) -> Result<Self, CodecError> {
        let value = value.into();
        if value.is_empty() {
            return Err(CodecError::EmptyIdentity);
        }
        if !value.is_ascii() {
            return Err(CodecError::NonAsciiIdentity(value));
        }
        if value.len() > u16::MAX as usize {
            return Err(CodecError::IdentityTooLong(value.len()));
        }
        Ok(Self(value))
    }

    /// IMEI-like identity: fixed prefix plus zero-padded random digits.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let upper = 10u32.pow(IDENTITY_RANDOM_DIGITS);
        let digits = rng.gen_range(0..upper);
        Self(format!(
            "{IDENTITY_PREFIX}{digits:0width$}",
            width = IDENTITY_RANDOM_DIGITS as usize
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn encode_handshake(identity: &DeviceIdentity) -> Vec<u8> {
    let bytes = identity.as_bytes();
    let mut frame = Vec::with_capacity(2 + bytes.len());
    // DeviceIdentity guarantees the length fits
    frame.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    frame.extend_from_slice(bytes);
    frame
}

pub fn check_handshake_ack(ack: u8) -> Result<(), InvalidAck> {
    if ack == HANDSHAKE_ACCEPTED {
        Ok(())
    } else {
        Err(InvalidAck(ack))
    }
}

pub fn decode_record_ack(bytes: [u8; RECORD_ACK_SIZE]) -> u32 {
    u32::from_be_bytes(bytes)
}

pub fn degrees_to_fixed(degrees: f64) -> i32 {
    (degrees * COORDINATE_SCALE).round() as i32
}

pub fn fixed_to_degrees(value: i32) -> f64 {
    value as f64 / COORDINATE_SCALE
}

pub fn zero_checksum(_body: &[u8]) -> u32 {
    0
}

#[derive(Clone, Copy)]
pub struct ReportEncoder {
    checksum: ChecksumFn,
}

impl fmt::Debug for ReportEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportEncoder").finish_non_exhaustive()
    }
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self {
            checksum: zero_checksum,
        }
    }
}

impl ReportEncoder {
    pub fn with_checksum(checksum: ChecksumFn) -> Self {
        Self { checksum }
    }

    pub fn encode(&self, fix: &LocationFix) -> Vec<u8> {
        let body = Self::encode_body(fix);
        let checksum = (self.checksum)(&body);

        let mut packet = Vec::with_capacity(REPORT_PACKET_SIZE);
        packet.extend_from_slice(&[0u8; 4]);
        packet.extend_from_slice(&(body.len() as u32).to_be_bytes());
        packet.extend_from_slice(&body);
        packet.extend_from_slice(&checksum.to_be_bytes());
        packet
    }

    fn encode_body(fix: &LocationFix) -> Vec<u8> {
        let mut body = Vec::with_capacity(BODY_SIZE);
        body.push(CODEC_ID);
        body.push(RECORD_COUNT);
        body.extend_from_slice(&fix.timestamp_ms.to_be_bytes());
        body.push(PRIORITY);
        body.extend_from_slice(&degrees_to_fixed(fix.longitude).to_be_bytes());
        body.extend_from_slice(&degrees_to_fixed(fix.latitude).to_be_bytes());
        body.extend_from_slice(&ALTITUDE.to_be_bytes());
        body.extend_from_slice(&ANGLE.to_be_bytes());
        body.push(SATELLITES);
        body.extend_from_slice(&SPEED.to_be_bytes());
        body.extend_from_slice(&EXTENSION_BYTES);
        body.push(RECORD_COUNT);
        body
    }
}

/// Encodes one fix with the zero checksum.
pub fn encode_report_packet(fix: &LocationFix) -> Vec<u8> {
    ReportEncoder::default().encode(fix)
}
