//! Streaming UTF-8 validation.
//!
//! `Utf8Reader` passes bytes through untouched and fails the read with
//! `InvalidData` as soon as the stream stops being valid UTF-8. A multi-byte
//! sequence split across two reads is carried over and checked together with
//! the next chunk.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, ReadBuf};

/// Longest incomplete UTF-8 sequence that can trail a chunk.
const MAX_PENDING: usize = 3;

pub struct Utf8Reader<R> {
    inner: R,
    /// Trailing bytes of an incomplete sequence, already handed to the caller.
    pending: Vec<u8>,
    /// Total bytes read from `inner`.
    consumed: u64,
}

impl<R> Utf8Reader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::with_capacity(MAX_PENDING),
            consumed: 0,
        }
    }

    /// Total bytes passed through so far.
    pub fn bytes_read(&self) -> u64 {
        self.consumed
    }

    fn check(&mut self, chunk: &[u8]) -> io::Result<()> {
        let carried = self.pending.len();
        let joined: Vec<u8>;
        let data: &[u8] = if carried == 0 {
            chunk
        } else {
            let mut buf = std::mem::take(&mut self.pending);
            buf.extend_from_slice(chunk);
            joined = buf;
            &joined
        };

        let start = self.consumed - carried as u64;
        self.consumed += chunk.len() as u64;

        match std::str::from_utf8(data) {
            Ok(_) => {
                self.pending.clear();
                Ok(())
            }
            Err(e) if e.error_len().is_none() => {
                self.pending.clear();
                self.pending.extend_from_slice(&data[e.valid_up_to()..]);
                Ok(())
            }
            Err(e) => Err(invalid_utf8(start + e.valid_up_to() as u64)),
        }
    }
}

fn invalid_utf8(offset: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("stream did not contain valid UTF-8 (byte offset {})", offset),
    )
}

impl<R: AsyncRead + Unpin> AsyncRead for Utf8Reader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let chunk = &buf.filled()[before..];

        if chunk.is_empty() {
            if !this.pending.is_empty() {
                let offset = this.consumed - this.pending.len() as u64;
                return Poll::Ready(Err(invalid_utf8(offset)));
            }
            return Poll::Ready(Ok(()));
        }

        Poll::Ready(this.check(chunk))
    }
}
