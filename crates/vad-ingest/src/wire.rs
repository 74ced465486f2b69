// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary wire codec for sensor packets.
//!
//! All transports carry the same packed little-endian layout:
//!
//! ```text
//! Offset  Size  Field
//! 0       4     sensor_id (u32 LE)
//! 4       8     timestamp_us (u64 LE)
//! 12      1     data_type (u8)
//! 13      3     reserved
//! 16      2     payload_len (u16 LE)
//! 18      2     reserved
//! 20      8     seq (u64 LE)
//! 28      4     padding
//! 32      N     payload (payload_len bytes)
//! ```
//!
//! The stream transport additionally prefixes each message with
//! `u32 LE total_len` where `total_len = HEADER_SIZE + payload_len`
//! (the prefix itself is not counted).
//!
//! Decoding writes into a caller-provided [`SensorPacket`] and never
//! allocates; the packet owns a fixed [`MAX_PAYLOAD`]-byte buffer so the
//! same value can be reused across the processor loop.

use thiserror::Error;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 32;

/// Maximum payload a packet may declare.
pub const MAX_PAYLOAD: usize = 4096;

/// Largest datagram / stream frame any transport will accept.
pub const MAX_DATAGRAM: usize = 65_535;

/// Payload is 16-bit LE PCM audio (RMS energy VAD).
pub const DATA_TYPE_AUDIO: u8 = 1;

/// Payload is a 10-channel f32 LE sensor vector (emotional VAD).
pub const DATA_TYPE_SENSOR_VECTOR: u8 = 2;

/// Packet rejection reasons.
///
/// Every variant is counted as a parse error by the pipeline; none of them
/// terminates a receiver or processor.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Input shorter than the 32-byte header.
    #[error("input too short for header: {0} bytes")]
    ShortHeader(usize),

    /// Declared payload length exceeds [`MAX_PAYLOAD`].
    #[error("declared payload length {0} exceeds maximum {MAX_PAYLOAD}")]
    PayloadTooLarge(usize),

    /// Input shorter than header + declared payload.
    #[error("input truncated: have {have} bytes, need {need}")]
    Truncated { have: usize, need: usize },

    /// Stream frame length prefix outside `[HEADER_SIZE, MAX_DATAGRAM]`.
    #[error("stream frame length {0} out of range")]
    FrameLenOutOfRange(usize),
}

/// A decoded sensor packet.
///
/// Fixed-size value type: the payload lives in an inline buffer so decode is
/// a header parse plus one bounded memcpy. Roughly 4 KiB on the stack;
/// processors keep exactly one per thread.
pub struct SensorPacket {
    pub sensor_id: u32,
    pub timestamp_us: u64,
    pub data_type: u8,
    pub seq: u64,
    pub payload_len: u16,
    payload: [u8; MAX_PAYLOAD],
}

impl SensorPacket {
    /// Create an empty packet for reuse with [`decode`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sensor_id: 0,
            timestamp_us: 0,
            data_type: 0,
            seq: 0,
            payload_len: 0,
            payload: [0u8; MAX_PAYLOAD],
        }
    }

    /// The valid portion of the payload buffer.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len as usize]
    }

    /// Set the payload, truncating at [`MAX_PAYLOAD`].
    ///
    /// Encode-side helper for tests and the load generator.
    pub fn set_payload(&mut self, data: &[u8]) {
        let n = data.len().min(MAX_PAYLOAD);
        self.payload[..n].copy_from_slice(&data[..n]);
        self.payload_len = n as u16;
    }

    /// Total encoded size of this packet (header + payload).
    #[inline]
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize
    }

    /// Encode into `dst`, returning the number of bytes written.
    ///
    /// Exact inverse of [`decode`]. Returns `None` if `dst` is too small.
    pub fn encode_into(&self, dst: &mut [u8]) -> Option<usize> {
        let total = self.encoded_len();
        if dst.len() < total {
            return None;
        }
        dst[..HEADER_SIZE].fill(0);
        dst[0..4].copy_from_slice(&self.sensor_id.to_le_bytes());
        dst[4..12].copy_from_slice(&self.timestamp_us.to_le_bytes());
        dst[12] = self.data_type;
        dst[16..18].copy_from_slice(&self.payload_len.to_le_bytes());
        dst[20..28].copy_from_slice(&self.seq.to_le_bytes());
        dst[HEADER_SIZE..total].copy_from_slice(self.payload());
        Some(total)
    }
}

impl Default for SensorPacket {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a wire packet from `buf` into `out`.
///
/// Trailing bytes beyond the declared payload are ignored: datagrams carry
/// no trailer and the stream framer delivers exact-length frames, but a
/// permissive tail keeps the codec transport-agnostic.
///
/// # Errors
///
/// See [`ParseError`]. On error `out` is left in an unspecified but valid
/// state; the caller must not use it.
pub fn decode(buf: &[u8], out: &mut SensorPacket) -> Result<(), ParseError> {
    if buf.len() < HEADER_SIZE {
        return Err(ParseError::ShortHeader(buf.len()));
    }

    let payload_len = u16::from_le_bytes([buf[16], buf[17]]) as usize;
    if payload_len > MAX_PAYLOAD {
        return Err(ParseError::PayloadTooLarge(payload_len));
    }
    if buf.len() < HEADER_SIZE + payload_len {
        return Err(ParseError::Truncated {
            have: buf.len(),
            need: HEADER_SIZE + payload_len,
        });
    }

    out.sensor_id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    out.timestamp_us = u64::from_le_bytes([
        buf[4], buf[5], buf[6], buf[7], buf[8], buf[9], buf[10], buf[11],
    ]);
    out.data_type = buf[12];
    out.seq = u64::from_le_bytes([
        buf[20], buf[21], buf[22], buf[23], buf[24], buf[25], buf[26], buf[27],
    ]);
    out.payload_len = payload_len as u16;
    out.payload[..payload_len].copy_from_slice(&buf[HEADER_SIZE..HEADER_SIZE + payload_len]);

    Ok(())
}

/// Validate a stream frame length prefix.
///
/// A frame must hold at least a full header and at most [`MAX_DATAGRAM`]
/// bytes; anything else desynchronizes the stream and closes the connection.
#[inline]
pub fn validate_frame_len(total_len: usize) -> Result<(), ParseError> {
    if total_len < HEADER_SIZE || total_len > MAX_DATAGRAM {
        return Err(ParseError::FrameLenOutOfRange(total_len));
    }
    Ok(())
}
