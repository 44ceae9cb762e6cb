//! Streaming frame reader.
//!
//! Bytes arrive from the socket in whatever pieces the kernel hands out.
//! [`FrameReader`] accumulates them and yields complete, checksum-verified
//! frames in arrival order.

use crate::error::ProtocolError;
use crate::frame::{checksum, decode_frame_header, Frame, FRAME_HEADER_SIZE};
use crate::MAX_FRAME_SIZE;
use bytes::{Buf, BytesMut};

/// Initial buffer capacity (8 KiB).
const INITIAL_CAPACITY: usize = 8 * 1024;

/// Accumulates stream bytes and splits them into frames.
pub struct FrameReader {
    buffer: BytesMut,
    max_frame_size: u32,
    skipped: u64,
}

impl FrameReader {
    pub fn new(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            max_frame_size,
            skipped: 0,
        }
    }

    /// Appends data to the internal buffer.
    pub fn append(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to read the next frame from the buffer.
    ///
    /// Returns `Ok(None)` when no complete frame is available yet. A header
    /// with the wrong magic or version costs exactly one byte and also
    /// returns `Ok(None)`, so a caller looping until `None` may stop early on
    /// garbage; [`FrameReader::drain`] keeps going in that case.
    ///
    /// An oversized payload or a checksum mismatch is returned as an error
    /// and the stream should be considered unusable.
    pub fn try_read_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.buffer.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let header = match decode_frame_header(&self.buffer) {
            Ok(header) => header,
            Err(_) => {
                self.buffer.advance(1);
                self.skipped += 1;
                return Ok(None);
            }
        };

        if header.payload_size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: header.payload_size,
                max: self.max_frame_size,
            });
        }

        let total_len = FRAME_HEADER_SIZE + header.payload_size as usize;
        if self.buffer.len() < total_len {
            return Ok(None);
        }

        let payload = &self.buffer[FRAME_HEADER_SIZE..total_len];
        let actual = checksum(payload);
        if actual != header.checksum {
            return Err(ProtocolError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        let mut frame = self.buffer.split_to(total_len);
        frame.advance(FRAME_HEADER_SIZE);

        Ok(Some(Frame {
            header,
            payload: frame.freeze(),
        }))
    }

    /// Returns an iterator over every frame that can be read right now.
    ///
    /// Unlike looping on [`FrameReader::try_read_frame`] until `None`, this
    /// keeps scanning past skipped garbage bytes. Iteration ends when the
    /// buffer holds no further complete frame, or after the first error.
    pub fn drain(&mut self) -> Drain<'_> {
        Drain {
            reader: self,
            failed: false,
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the total number of bytes discarded while resynchronizing.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

/// Iterator returned by [`FrameReader::drain`].
pub struct Drain<'a> {
    reader: &'a mut FrameReader,
    failed: bool,
}

impl Iterator for Drain<'_> {
    type Item = Result<Frame, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let before = self.reader.buffered();
            match self.reader.try_read_frame() {
                Ok(Some(frame)) => return Some(Ok(frame)),
                Ok(None) if self.reader.buffered() < before => continue,
                Ok(None) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
