//! Binary frame format.
//!
//! Frame layout (20 bytes header + payload), all fields big-endian:
//!
//! ```text
//! +---------+---------+--------------+----------+---------+
//! |  magic  | version | payload_size | checksum |  flags  |
//! | 4 bytes | 4 bytes |   4 bytes    | 4 bytes  | 4 bytes |
//! +---------+---------+--------------+----------+---------+
//! | payload                                               |
//! | payload_size bytes                                    |
//! +-------------------------------------------------------+
//! ```
//!
//! The checksum is CRC-32/ISO-HDLC over the payload bytes.

use crate::error::ProtocolError;
use crate::{MAX_FRAME_SIZE, PROTOCOL_VERSION};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Magic number identifying frames: "YAMS".
pub const MAGIC: u32 = 0x5941_4D53;

/// Size of the fixed frame header in bytes (5 x u32).
pub const FRAME_HEADER_SIZE: usize = 20;

/// Frame flags bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FrameFlags(u32);

impl FrameFlags {
    /// Payload is one part of a multi-frame response.
    pub const CHUNKED: u32 = 1 << 0;
    /// Final part of a chunked response.
    pub const LAST_CHUNK: u32 = 1 << 1;
    /// Payload describes an error.
    pub const ERROR: u32 = 1 << 2;
    /// Header carries metadata only.
    pub const HEADER_ONLY: u32 = 1 << 3;

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn with_chunked(mut self) -> Self {
        self.0 |= Self::CHUNKED;
        self
    }

    pub fn with_last_chunk(mut self) -> Self {
        self.0 |= Self::LAST_CHUNK;
        self
    }

    pub fn with_error(mut self) -> Self {
        self.0 |= Self::ERROR;
        self
    }

    pub fn with_header_only(mut self) -> Self {
        self.0 |= Self::HEADER_ONLY;
        self
    }

    pub fn is_chunked(&self) -> bool {
        self.0 & Self::CHUNKED != 0
    }

    pub fn is_last_chunk(&self) -> bool {
        self.0 & Self::LAST_CHUNK != 0
    }

    pub fn is_error(&self) -> bool {
        self.0 & Self::ERROR != 0
    }

    pub fn is_header_only(&self) -> bool {
        self.0 & Self::HEADER_ONLY != 0
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub version: u32,
    pub payload_size: u32,
    pub checksum: u32,
    pub flags: FrameFlags,
}

/// Computes the wire checksum of a payload.
pub fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Encodes a frame header.
pub fn encode_frame_header(
    payload_size: u32,
    checksum: u32,
    flags: FrameFlags,
) -> [u8; FRAME_HEADER_SIZE] {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    let mut buf = &mut header[..];
    buf.put_u32(MAGIC);
    buf.put_u32(PROTOCOL_VERSION);
    buf.put_u32(payload_size);
    buf.put_u32(checksum);
    buf.put_u32(flags.bits());
    header
}

/// Decodes a frame header from the first 20 bytes of `bytes`.
///
/// Only the fixed fields are validated here; the payload size limit and the
/// checksum are checked by the reader once the payload is available.
pub fn decode_frame_header(bytes: &[u8]) -> Result<FrameHeader, ProtocolError> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(ProtocolError::Truncated { len: bytes.len() });
    }

    let mut buf = &bytes[..FRAME_HEADER_SIZE];
    let magic = buf.get_u32();
    if magic != MAGIC {
        return Err(ProtocolError::InvalidMagic(magic));
    }

    let version = buf.get_u32();
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    Ok(FrameHeader {
        magic,
        version,
        payload_size: buf.get_u32(),
        checksum: buf.get_u32(),
        flags: FrameFlags::from_bits(buf.get_u32()),
    })
}

/// Encodes `payload` into a complete frame (header followed by payload).
pub fn encode_frame(payload: &[u8], flags: FrameFlags) -> Result<BytesMut, ProtocolError> {
    if payload.len() > MAX_FRAME_SIZE as usize {
        return Err(ProtocolError::FrameTooLarge {
            size: u32::try_from(payload.len()).unwrap_or(u32::MAX),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_slice(&encode_frame_header(
        payload.len() as u32,
        checksum(payload),
        flags,
    ));
    buf.put_slice(payload);
    Ok(buf)
}

/// A parsed frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Creates a frame carrying `payload` with no flags set.
    pub fn new(payload: Bytes) -> Self {
        Self::with_flags(payload, FrameFlags::empty())
    }

    /// Creates a frame carrying `payload` with the given flags.
    pub fn with_flags(payload: Bytes, flags: FrameFlags) -> Self {
        Self {
            header: FrameHeader {
                magic: MAGIC,
                version: PROTOCOL_VERSION,
                payload_size: payload.len() as u32,
                checksum: checksum(&payload),
                flags,
            },
            payload,
        }
    }

    pub fn flags(&self) -> FrameFlags {
        self.header.flags
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        encode_frame(&self.payload, self.header.flags)
    }
}
