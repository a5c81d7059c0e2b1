//! Framing for the mixed text/binary byte stream.
//!
//! A frame whose first byte is `0x00` is binary: the marker, a big-endian
//! `u32` payload length, then the payload. Anything else is a text command
//! line terminated by `\n`. Both kinds may be interleaved on one connection.

use crate::error::FrameError;

pub const BINARY_MARKER: u8 = 0x00;
pub const BINARY_HEADER_LEN: usize = 5;

/// One complete protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Fixed-capacity receive buffer with a fill cursor.
///
/// Bytes are appended at the cursor and whole frames are taken off the front,
/// after which the remainder is compacted back to offset zero.
#[derive(Debug)]
pub struct ReceiveBuffer {
    data: Box<[u8]>,
    filled: usize,
}

impl ReceiveBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.filled
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.data.len()
    }

    /// Unfilled space that a socket read may write into.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.filled..]
    }

    /// Marks `count` bytes of [`spare_mut`](Self::spare_mut) as received.
    pub fn commit(&mut self, count: usize) {
        self.filled = (self.filled + count).min(self.data.len());
    }

    /// Appends as much of `bytes` as fits and returns how many were taken.
    #[cfg(test)]
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> usize {
        let spare = self.spare_mut();
        let count = bytes.len().min(spare.len());
        spare[..count].copy_from_slice(&bytes[..count]);
        self.commit(count);
        count
    }

    /// Takes the next complete frame off the front of the buffer.
    ///
    /// Returns `Ok(None)` while the front frame is still incomplete, and an
    /// error once it can never complete within the buffer's capacity.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let buffered = &self.data[..self.filled];
        let Some(&first) = buffered.first() else {
            return Ok(None);
        };

        if first == BINARY_MARKER {
            if buffered.len() < BINARY_HEADER_LEN {
                return Ok(None);
            }
            let declared = u32::from_be_bytes([buffered[1], buffered[2], buffered[3], buffered[4]]);
            let declared = declared as usize;
            let total = BINARY_HEADER_LEN.saturating_add(declared);
            if total > self.capacity() {
                return Err(FrameError::BinaryTooLarge {
                    declared,
                    capacity: self.capacity(),
                });
            }
            if buffered.len() < total {
                return Ok(None);
            }
            let payload = buffered[BINARY_HEADER_LEN..total].to_vec();
            self.consume(total);
            return Ok(Some(Frame::Binary(payload)));
        }

        match buffered.iter().position(|&byte| byte == b'\n') {
            Some(newline) => {
                let line = &buffered[..newline];
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                let text = String::from_utf8_lossy(line).into_owned();
                self.consume(newline + 1);
                Ok(Some(Frame::Text(text)))
            }
            None if self.is_full() => Err(FrameError::LineTooLong {
                capacity: self.capacity(),
            }),
            None => Ok(None),
        }
    }

    fn consume(&mut self, count: usize) {
        self.data.copy_within(count..self.filled, 0);
        self.filled -= count;
    }
}

/// Encodes `payload` as a binary frame.
pub fn encode_binary(payload: &[u8], out: &mut Vec<u8>) -> Result<(), FrameError> {
    let declared = u32::try_from(payload.len()).map_err(|_| FrameError::BinaryTooLarge {
        declared: payload.len(),
        capacity: u32::MAX as usize,
    })?;
    out.reserve(BINARY_HEADER_LEN + payload.len());
    out.push(BINARY_MARKER);
    out.extend_from_slice(&declared.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        encode_binary(payload, &mut out).expect("encode");
        out
    }

    fn drain(buffer: &mut ReceiveBuffer) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = buffer.next_frame().expect("frame") {
            frames.push(frame);
        }
        frames
    }

    fn sample_stream() -> Vec<u8> {
        let mut stream = b"bcore_write WRAM;10;4\n".to_vec();
        stream.extend(binary(&[0xAA, 0xBB, 0xCC, 0xDD]));
        stream.extend_from_slice(b"CORE_READ WRAM;10;4\r\n");
        stream
    }

    #[test]
    fn splits_text_and_binary_frames() {
        let mut buffer = ReceiveBuffer::with_capacity(256);
        buffer.extend_from_slice(&sample_stream());

        assert_eq!(
            drain(&mut buffer),
            vec![
                Frame::Text("bcore_write WRAM;10;4".into()),
                Frame::Binary(vec![0xAA, 0xBB, 0xCC, 0xDD]),
                Frame::Text("CORE_READ WRAM;10;4".into()),
            ]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn chunking_does_not_change_the_frames() {
        let stream = sample_stream();
        let mut whole = ReceiveBuffer::with_capacity(256);
        whole.extend_from_slice(&stream);
        let expected = drain(&mut whole);

        for chunk_size in 1..stream.len() {
            let mut buffer = ReceiveBuffer::with_capacity(256);
            let mut frames = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                buffer.extend_from_slice(chunk);
                frames.extend(drain(&mut buffer));
            }
            assert_eq!(frames, expected, "chunk size {chunk_size}");
        }

        for split in 0..stream.len() {
            let mut buffer = ReceiveBuffer::with_capacity(256);
            buffer.extend_from_slice(&stream[..split]);
            let mut frames = drain(&mut buffer);
            buffer.extend_from_slice(&stream[split..]);
            frames.extend(drain(&mut buffer));
            assert_eq!(frames, expected, "split at {split}");
        }
    }

    #[test]
    fn waits_for_complete_binary_header_and_payload() {
        let mut buffer = ReceiveBuffer::with_capacity(64);
        buffer.extend_from_slice(&[0, 0, 0]);
        assert_eq!(buffer.next_frame(), Ok(None));
        buffer.extend_from_slice(&[0, 3, 1, 2]);
        assert_eq!(buffer.next_frame(), Ok(None));
        assert_eq!(buffer.len(), 7);
        buffer.extend_from_slice(&[3]);
        assert_eq!(buffer.next_frame(), Ok(Some(Frame::Binary(vec![1, 2, 3]))));
    }

    #[test]
    fn empty_binary_frame_is_complete() {
        let mut buffer = ReceiveBuffer::with_capacity(16);
        buffer.extend_from_slice(&binary(&[]));
        assert_eq!(buffer.next_frame(), Ok(Some(Frame::Binary(Vec::new()))));
    }

    #[test]
    fn oversized_binary_header_is_a_fault() {
        let mut buffer = ReceiveBuffer::with_capacity(16);
        buffer.extend_from_slice(&[0, 0, 0, 0, 12]);
        assert_eq!(
            buffer.next_frame(),
            Err(FrameError::BinaryTooLarge {
                declared: 12,
                capacity: 16
            })
        );
    }

    #[test]
    fn binary_frame_that_exactly_fills_the_buffer_is_accepted() {
        let mut buffer = ReceiveBuffer::with_capacity(16);
        buffer.extend_from_slice(&binary(&[7; 11]));
        assert!(buffer.is_full());
        assert_eq!(buffer.next_frame(), Ok(Some(Frame::Binary(vec![7; 11]))));
        assert!(buffer.is_empty());

        buffer.extend_from_slice(&[0, 0, 0, 0, 12]);
        assert_eq!(
            buffer.next_frame(),
            Err(FrameError::BinaryTooLarge {
                declared: 12,
                capacity: 16
            })
        );
    }

    #[test]
    fn full_buffer_without_newline_is_a_fault() {
        let mut buffer = ReceiveBuffer::with_capacity(8);
        assert_eq!(buffer.extend_from_slice(b"emulator_info"), 8);
        assert!(buffer.is_full());
        assert_eq!(
            buffer.next_frame(),
            Err(FrameError::LineTooLong { capacity: 8 })
        );
    }

    #[test]
    fn line_that_exactly_fills_the_buffer_is_accepted() {
        let mut buffer = ReceiveBuffer::with_capacity(8);
        buffer.extend_from_slice(b"pausing\n");
        assert_eq!(buffer.next_frame(), Ok(Some(Frame::Text("pausing".into()))));
        assert_eq!(buffer.spare_mut().len(), 8);
    }

    #[test]
    fn encodes_length_big_endian() {
        assert_eq!(binary(&[9; 3]), vec![0, 0, 0, 0, 3, 9, 9, 9]);
        assert_eq!(binary(&[0; 0x0102])[..5], [0, 0, 0, 1, 2]);
    }
}
