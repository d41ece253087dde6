//! Session Read Buffer
//!
//! Fixed-capacity buffer shared by the framer, the snapshot streamer and the
//! tail forwarder of one session, in that order.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Capacity of the per-session read buffer.
pub const BUFFER_CAPACITY: usize = 32768;

/// Read buffer with a fill mark and a consume cursor.
///
/// Invariant: `0 <= cursor <= filled <= capacity`.
pub struct SessionBuffer {
    buf: Box<[u8]>,
    filled: usize,
    cursor: usize,
}

impl SessionBuffer {
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            filled: 0,
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes read but not yet consumed.
    pub fn unconsumed(&self) -> &[u8] {
        &self.buf[self.cursor..self.filled]
    }

    /// Every byte currently buffered, consumed or not.
    pub fn buffered(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    /// Mark `n` unconsumed bytes as consumed.
    pub fn consume(&mut self, n: usize) {
        self.cursor = (self.cursor + n).min(self.filled);
    }

    /// Move the cursor to an absolute position within the filled region.
    pub fn seek(&mut self, pos: usize) {
        self.cursor = pos.min(self.filled);
    }

    /// Forget everything buffered.
    pub fn clear(&mut self) {
        self.filled = 0;
        self.cursor = 0;
    }

    /// Append one read after the filled region. Returns the number of bytes
    /// read; zero means end of stream or a full buffer.
    pub async fn read_append<R>(&mut self, reader: &mut R) -> std::io::Result<usize>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if self.filled == self.buf.len() {
            return Ok(0);
        }
        let n = reader.read(&mut self.buf[self.filled..]).await?;
        self.filled += n;
        Ok(n)
    }

    /// Replace the buffer contents with one fresh read from the start.
    pub async fn read_fresh<R>(&mut self, reader: &mut R) -> std::io::Result<usize>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.clear();
        let n = reader.read(&mut self.buf[..]).await?;
        self.filled = n;
        Ok(n)
    }

    /// Drop the first `n` filled bytes, shifting the rest to the front.
    pub fn discard_front(&mut self, n: usize) {
        let n = n.min(self.filled);
        self.buf.copy_within(n..self.filled, 0);
        self.filled -= n;
        self.cursor = self.cursor.saturating_sub(n);
    }
}

impl Default for SessionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuffer")
            .field("capacity", &self.buf.len())
            .field("filled", &self.filled)
            .field("cursor", &self.cursor)
            .finish()
    }
}
