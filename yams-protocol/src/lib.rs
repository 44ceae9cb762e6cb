//! # yams-protocol
//!
//! Wire protocol for talking to the YAMS daemon over a local socket.
//!
//! This crate provides:
//! - Binary framing with a fixed 20-byte header and CRC-32 validation
//! - A streaming frame reader that tolerates arbitrary read boundaries
//! - The request/response envelope and its payload catalogue
//! - Protocol error types and daemon error codes

pub mod envelope;
pub mod error;
pub mod frame;
pub mod reader;

pub use envelope::{Envelope, ErrorResponse, Payload, PayloadCase};
pub use error::{ErrorCode, ProtocolError};
pub use frame::{
    checksum, decode_frame_header, encode_frame, encode_frame_header, Frame, FrameFlags,
    FrameHeader, FRAME_HEADER_SIZE, MAGIC,
};
pub use reader::FrameReader;

/// Protocol version carried in every frame header and envelope.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum frame payload size (16 MiB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;
