//! IMU Wire Protocol
//!
//! Framing and message codec for the binary TCP protocol spoken between
//! the IMU Client and the sensor device: a 5-byte header (message id +
//! little-endian payload length) followed by a variable-length payload.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server -> client: reports whether the sensor is armed.
pub const MSG_IMU_STATE: u8 = 0x01;
/// Server -> client: a decoded gyro/accel sample.
pub const MSG_IMU_DATA: u8 = 0x02;
/// Client -> server: request the sensor be turned on/off.
pub const MSG_SET_IMU_STATE: u8 = 0x81;

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 5;
/// Payload size of an `IMU_DATA` frame: u64 timestamp + 6 f32s.
pub const IMU_DATA_PAYLOAD_LEN: usize = 32;
/// Payloads larger than this are treated as a protocol violation.
pub const MAX_PAYLOAD_LEN: u32 = 1_000_000;

/// Errors raised while decoding frames off the wire.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// `payload_length` in the header exceeded [`MAX_PAYLOAD_LEN`].
    #[error("payload length {0} exceeds maximum of {MAX_PAYLOAD_LEN}")]
    PayloadTooLarge(u32),

    /// An `IMU_DATA` payload was not exactly [`IMU_DATA_PAYLOAD_LEN`] bytes.
    #[error("IMU_DATA payload must be {IMU_DATA_PAYLOAD_LEN} bytes, got {0}")]
    InvalidSampleLength(usize),

    /// An `IMU_STATE` payload was empty.
    #[error("IMU_STATE payload is empty")]
    EmptyStatePayload,

    /// Underlying socket I/O failure.
    #[error("IMU stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The fixed 5-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub message_id: u8,
    pub payload_length: u32,
}

impl FrameHeader {
    /// Decode a header from its 5-byte wire representation.
    pub fn decode(bytes: [u8; HEADER_LEN]) -> Result<Self, ProtocolError> {
        let payload_length = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        if payload_length > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge(payload_length));
        }
        Ok(Self {
            message_id: bytes[0],
            payload_length,
        })
    }

    /// Encode this header into its wire representation.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let len = self.payload_length.to_le_bytes();
        [self.message_id, len[0], len[1], len[2], len[3]]
    }
}

/// A 3-component vector of single-precision floats (gyro or accel axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    fn decode(bytes: &[u8]) -> Self {
        Self {
            x: f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            y: f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            z: f32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
        out.extend_from_slice(&self.z.to_le_bytes());
    }
}

/// A decoded IMU sample (`IMU_DATA`, message id `0x02`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    pub timestamp_ns: u64,
    pub gyro: Vec3,
    pub accel: Vec3,
}

impl ImuSample {
    /// Decode a 32-byte `IMU_DATA` payload.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() != IMU_DATA_PAYLOAD_LEN {
            return Err(ProtocolError::InvalidSampleLength(payload.len()));
        }
        let timestamp_ns = u64::from_le_bytes(payload[0..8].try_into().unwrap());
        let gyro = Vec3::decode(&payload[8..20]);
        let accel = Vec3::decode(&payload[20..32]);
        Ok(Self {
            timestamp_ns,
            gyro,
            accel,
        })
    }

    /// Encode back to a 32-byte payload. Used by tests to exercise the
    /// round-trip property and by the loopback test double in `imu-client`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IMU_DATA_PAYLOAD_LEN);
        out.extend_from_slice(&self.timestamp_ns.to_le_bytes());
        self.gyro.encode_into(&mut out);
        self.accel.encode_into(&mut out);
        out
    }

    /// Encode a full frame (header + payload) ready to write to the wire.
    pub fn encode_frame(&self) -> Vec<u8> {
        let payload = self.encode();
        let header = FrameHeader {
            message_id: MSG_IMU_DATA,
            payload_length: payload.len() as u32,
        };
        let mut out = header.encode().to_vec();
        out.extend_from_slice(&payload);
        out
    }
}

/// A message decoded from an incoming frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IncomingMessage {
    /// `IMU_STATE`: the sensor's armed/disarmed state.
    State { is_on: bool },
    /// `IMU_DATA`: a gyro/accel sample.
    Sample(ImuSample),
    /// Any other message id — silently ignored per §4.2 step 4.
    Unknown { message_id: u8 },
}

/// Decode a message body given its header's `message_id`.
pub fn decode_message(message_id: u8, payload: &[u8]) -> Result<IncomingMessage, ProtocolError> {
    match message_id {
        MSG_IMU_STATE => {
            let byte = *payload.first().ok_or(ProtocolError::EmptyStatePayload)?;
            Ok(IncomingMessage::State { is_on: byte == 0x01 })
        }
        MSG_IMU_DATA => Ok(IncomingMessage::Sample(ImuSample::decode(payload)?)),
        other => Ok(IncomingMessage::Unknown { message_id: other }),
    }
}

/// Encode a `SET_IMU_STATE` frame (client -> server re-arm request).
pub fn encode_set_state(on: bool) -> [u8; HEADER_LEN + 1] {
    let header = FrameHeader {
        message_id: MSG_SET_IMU_STATE,
        payload_length: 1,
    };
    let h = header.encode();
    [h[0], h[1], h[2], h[3], h[4], u8::from(on)]
}

/// Encode an `IMU_STATE` frame. Used by the loopback test double, mirroring
/// the real sensor's behavior of announcing state on connect and on change.
pub fn encode_state_frame(is_on: bool) -> [u8; HEADER_LEN + 1] {
    let header = FrameHeader {
        message_id: MSG_IMU_STATE,
        payload_length: 1,
    };
    let h = header.encode();
    [h[0], h[1], h[2], h[3], h[4], u8::from(is_on)]
}
