use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::chunk::chunk_codec::{fold, Chunk, ChunkTag};
use crate::error::ChunkError;

/// Accumulates the chunks received on a single link into messages. There is at most one message
///  in progress at any time - the protocol has no notion of interleaved messages.
///
/// Chunks are never rejected for arriving 'unexpectedly': a missing START chunk means the next
///  chunk is appended to whatever is buffered, and a duplicated chunk is appended twice. The
///  result is a corrupted message rather than an error.
#[derive(Debug, Default)]
pub struct ReassemblyEngine {
    buffer: BytesMut,
}
impl ReassemblyEngine {
    pub fn new() -> ReassemblyEngine {
        Default::default()
    }

    /// Returns the completed message if the chunk is tagged END, `None` while the message is
    ///  still in progress.
    pub fn feed(&mut self, chunk: &Chunk) -> Option<Bytes> {
        let buffer = std::mem::take(&mut self.buffer);
        self.buffer = fold(buffer, chunk);

        if chunk.tag() == ChunkTag::End {
            let message = std::mem::take(&mut self.buffer).freeze();
            trace!("message of {} bytes complete", message.len());
            Some(message)
        }
        else {
            trace!("message in progress, {} bytes buffered", self.buffer.len());
            None
        }
    }

    /// Parses a raw frame as received from the link and feeds it. A frame that can not be parsed
    ///  leaves the buffered data untouched.
    pub fn feed_frame(&mut self, mut frame: &[u8]) -> Result<Option<Bytes>, ChunkError> {
        let chunk = Chunk::deser(&mut frame)?;
        Ok(self.feed(&chunk))
    }

    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}


#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use crate::chunk::chunk_codec::encode;
    use super::*;

    fn chunk(tag: ChunkTag, body: &'static [u8]) -> Chunk {
        Chunk::new(tag, Bytes::from_static(body)).unwrap()
    }

    #[test]
    fn test_single_chunk_message() {
        let mut engine = ReassemblyEngine::new();
        assert_eq!(engine.feed(&chunk(ChunkTag::End, b"hello")), Some(Bytes::from_static(b"hello")));
        assert!(engine.pending().is_empty());
    }

    #[test]
    fn test_multi_chunk_message() {
        let payload = b"a message that is definitely longer than a single chunk".to_vec();
        let chunks = encode(&payload);
        let (last, rest) = chunks.split_last().unwrap();

        let mut engine = ReassemblyEngine::new();
        for c in rest {
            assert_eq!(engine.feed(c), None);
        }
        assert_eq!(engine.feed(last), Some(Bytes::from(payload)));
        assert!(engine.pending().is_empty());
    }

    #[test]
    fn test_consecutive_messages() {
        let mut engine = ReassemblyEngine::new();
        for payload in [b"first message, spanning two chunks".to_vec(), b"second".to_vec()] {
            let mut result = None;
            for c in encode(&payload) {
                result = engine.feed(&c);
            }
            assert_eq!(result, Some(Bytes::from(payload)));
        }
    }

    #[test]
    fn test_start_resets_partial_buffer() {
        let mut engine = ReassemblyEngine::new();
        engine.feed(&chunk(ChunkTag::Start, b"abandoned"));
        engine.feed(&chunk(ChunkTag::Continue, b" partial"));

        assert_eq!(engine.feed(&chunk(ChunkTag::Start, b"new")), None);
        assert_eq!(engine.pending(), b"new");
        assert_eq!(engine.feed(&chunk(ChunkTag::End, b" one")), Some(Bytes::from_static(b"new one")));
    }

    #[test]
    fn test_continue_without_start_is_absorbed() {
        let mut engine = ReassemblyEngine::new();
        assert_eq!(engine.feed(&chunk(ChunkTag::Continue, b"orphan")), None);
        assert_eq!(engine.feed(&chunk(ChunkTag::End, b"!")), Some(Bytes::from_static(b"orphan!")));
    }

    #[test]
    fn test_feed_frame_with_unknown_tag_keeps_buffer() {
        let mut engine = ReassemblyEngine::new();
        engine.feed_frame(&[0x01, b'a', b'b']).unwrap();

        assert_eq!(engine.feed_frame(&[0x09, b'x']), Err(ChunkError::UnknownTag(9)));
        assert_eq!(engine.pending(), b"ab");

        assert_eq!(engine.feed_frame(&[0x00, b'c']), Ok(Some(Bytes::from_static(b"abc"))));
    }

    #[test]
    fn test_empty_frame() {
        let mut engine = ReassemblyEngine::new();
        assert_eq!(engine.feed_frame(&[]), Err(ChunkError::EmptyFrame));
    }

    #[test]
    fn test_reset() {
        let mut engine = ReassemblyEngine::new();
        engine.feed(&chunk(ChunkTag::Start, b"abc"));
        engine.reset();
        assert!(engine.pending().is_empty());
    }
}
