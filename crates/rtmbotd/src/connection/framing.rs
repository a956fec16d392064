//! Frame reassembly over a chunked, message-oriented socket.
//!
//! A real-time socket delivers each logical frame as one or more chunks,
//! the last of which carries an end-of-frame marker. `FrameReader` turns
//! that into a lazy sequence of `Frame` handles, each readable as a plain
//! byte stream covering exactly one frame.
//!
//! ```text
//!   chunks:  [{"type":] [ "hel ] [ lo"}  ⏎end] [ {"type":"message",...} ⏎end]
//!             └──────────── Frame 1 ──────────┘ └──────────── Frame 2 ───────┘
//! ```
//!
//! Only one frame is active at a time. Requesting the next frame first
//! drains whatever is left of the previous one, so a consumer that stops
//! early never sees stray bytes at the start of the following frame.

use async_trait::async_trait;

use crate::error::TransportError;

// ============================================================================
// Chunk Source
// ============================================================================

/// One read from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Payload bytes, with a marker set on the final chunk of a frame
    Data { bytes: Vec<u8>, end_of_frame: bool },

    /// The peer closed the socket
    Close,
}

impl Chunk {
    /// A chunk that ends its frame.
    pub fn last(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Data {
            bytes: bytes.into(),
            end_of_frame: true,
        }
    }

    /// A chunk with more of the frame still to come.
    pub fn partial(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Data {
            bytes: bytes.into(),
            end_of_frame: false,
        }
    }
}

/// Receiving half of a real-time socket.
#[async_trait]
pub trait ChunkSource: Send {
    /// Waits for the next chunk.
    async fn recv_chunk(&mut self) -> Result<Chunk, TransportError>;

    /// Whether the socket is still open for reading.
    fn is_open(&self) -> bool;
}

// ============================================================================
// Frame Reader
// ============================================================================

/// Lazy sequence of frames read from a `ChunkSource`.
pub struct FrameReader {
    source: Box<dyn ChunkSource>,
    buffer: Vec<u8>,
    offset: usize,
    /// End marker seen for the current frame (true between frames)
    end_of_frame: bool,
    /// The socket reported closure
    closed: bool,
    /// The current frame was cut short by a close
    truncated: bool,
}

impl FrameReader {
    pub fn new(source: Box<dyn ChunkSource>) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            offset: 0,
            end_of_frame: true,
            closed: false,
            truncated: false,
        }
    }

    /// Returns a handle to the next frame, or `None` once the socket is
    /// no longer open.
    ///
    /// Any unread part of the previous frame is drained first.
    ///
    /// # Errors
    ///
    /// Transport errors raised while draining the previous frame.
    pub async fn next_frame(&mut self) -> Result<Option<Frame<'_>>, TransportError> {
        self.drain().await?;

        if self.closed || !self.source.is_open() {
            return Ok(None);
        }

        self.buffer.clear();
        self.offset = 0;
        self.end_of_frame = false;
        self.truncated = false;
        Ok(Some(Frame { reader: self }))
    }

    async fn drain(&mut self) -> Result<(), TransportError> {
        self.buffer.clear();
        self.offset = 0;
        while !self.end_of_frame {
            self.fill().await?;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Pulls one chunk into the buffer.
    async fn fill(&mut self) -> Result<(), TransportError> {
        match self.source.recv_chunk().await? {
            Chunk::Data {
                bytes,
                end_of_frame,
            } => {
                self.buffer = bytes;
                self.offset = 0;
                self.end_of_frame = end_of_frame;
            }
            Chunk::Close => {
                self.buffer.clear();
                self.offset = 0;
                self.end_of_frame = true;
                self.closed = true;
                self.truncated = true;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Frame
// ============================================================================

/// Read handle for a single frame.
///
/// Borrowing the reader mutably keeps a second frame from being requested
/// while this one is still in use.
pub struct Frame<'a> {
    reader: &'a mut FrameReader,
}

impl Frame<'_> {
    /// Reads bytes of this frame into `buf`.
    ///
    /// Returns buffered bytes first. When the buffer is exhausted and the
    /// end marker has not arrived, pulls another chunk from the socket.
    /// Returns 0 once the frame is complete, without touching the socket.
    ///
    /// # Errors
    ///
    /// Transport errors from the underlying socket.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let reader = &mut *self.reader;
            let available = reader.buffer.len() - reader.offset;
            if available > 0 {
                let n = available.min(buf.len());
                buf[..n].copy_from_slice(&reader.buffer[reader.offset..reader.offset + n]);
                reader.offset += n;
                return Ok(n);
            }
            if reader.end_of_frame {
                return Ok(0);
            }
            reader.fill().await?;
        }
    }

    /// Reads the rest of the frame, appending to `out`.
    ///
    /// Returns the number of bytes appended.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, TransportError> {
        let start = out.len();
        loop {
            let reader = &mut *self.reader;
            out.extend_from_slice(&reader.buffer[reader.offset..]);
            reader.offset = reader.buffer.len();
            if reader.end_of_frame {
                return Ok(out.len() - start);
            }
            reader.fill().await?;
        }
    }

    /// Discards the rest of the frame.
    pub async fn deplete(&mut self) -> Result<(), TransportError> {
        self.reader.drain().await
    }

    /// True if the socket closed before this frame's end marker arrived.
    pub fn is_truncated(&self) -> bool {
        self.reader.truncated
    }
}
