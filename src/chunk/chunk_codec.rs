//! Framing of messages into chunks that fit the link's tiny frames.
//!
//! Wire format of a single frame:
//! ```ascii
//! 0:     tag (u8): 0x00 = END, 0x01 = START, 0x02 = CONTINUE
//! 1..18: up to 17 bytes of message body, shorter for the final chunk
//! ```
//!
//! A message that fits into a single frame is sent as a single END chunk, i.e. it never carries
//!  a START tag. Receivers treat 'no message in progress' as the implicit start.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::ChunkError;

/// Number of message bytes in a single chunk. The link delivers roughly 20 bytes per
///  transmission, one of which is taken by the tag.
pub const MAX_PAYLOAD: usize = 17;

pub const MAX_FRAME_LEN: usize = MAX_PAYLOAD + 1;

#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
pub enum ChunkTag {
    End = 0x00,
    Start = 0x01,
    Continue = 0x02,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Chunk {
    tag: ChunkTag,
    body: Bytes,
}
impl Chunk {
    pub fn new(tag: ChunkTag, body: Bytes) -> Result<Chunk, ChunkError> {
        if body.len() > MAX_PAYLOAD {
            return Err(ChunkError::BodyTooLong { len: body.len(), max: MAX_PAYLOAD });
        }
        Ok(Chunk { tag, body })
    }

    pub fn tag(&self) -> ChunkTag {
        self.tag
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.tag.into());
        buf.put_slice(&self.body);
    }

    pub fn to_frame(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.body.len());
        self.ser(&mut buf);
        buf.freeze()
    }

    /// Parses a received frame, consuming the entire buffer.
    ///
    /// NB: The body length is not checked on the receiving side. Peers that pad their frames
    ///  to a fixed size or use a slightly bigger frame are still understood.
    pub fn deser(buf: &mut impl Buf) -> Result<Chunk, ChunkError> {
        if !buf.has_remaining() {
            return Err(ChunkError::EmptyFrame);
        }

        let raw_tag = buf.get_u8();
        let tag = ChunkTag::try_from(raw_tag)
            .map_err(|_| ChunkError::UnknownTag(raw_tag))?;
        let body = buf.copy_to_bytes(buf.remaining());
        Ok(Chunk { tag, body })
    }
}

/// Splits a payload into its chunk sequence. An empty payload is represented by a single END
///  chunk with an empty body.
pub fn encode(payload: &[u8]) -> Vec<Chunk> {
    if payload.is_empty() {
        return vec![Chunk { tag: ChunkTag::End, body: Bytes::new() }];
    }

    let payload = Bytes::copy_from_slice(payload);
    let num_chunks = payload.len().div_ceil(MAX_PAYLOAD);

    (0..num_chunks)
        .map(|i| {
            let tag = if i == num_chunks - 1 {
                ChunkTag::End
            }
            else if i == 0 {
                ChunkTag::Start
            }
            else {
                ChunkTag::Continue
            };

            let start = i * MAX_PAYLOAD;
            let end = payload.len().min(start + MAX_PAYLOAD);
            Chunk { tag, body: payload.slice(start..end) }
        })
        .collect()
}

/// Folds a chunk into the accumulated buffer of the message in progress, returning the new
///  buffer. An empty buffer or a START chunk begins a new message, discarding whatever was
///  accumulated before.
///
/// When the chunk is tagged END, all trailing zero bytes are stripped from the result. This
///  removes the padding that some peers add to their final frame, and it is required for wire
///  compatibility with them. It is also lossy: a message whose actual payload ends in zero bytes
///  loses them on reassembly.
pub fn fold(mut buffer: BytesMut, chunk: &Chunk) -> BytesMut {
    if chunk.tag == ChunkTag::Start {
        buffer.clear();
    }
    buffer.extend_from_slice(&chunk.body);

    if chunk.tag == ChunkTag::End {
        let len = buffer.iter()
            .rposition(|&b| b != 0)
            .map(|pos| pos + 1)
            .unwrap_or(0);
        buffer.truncate(len);
    }

    buffer
}
