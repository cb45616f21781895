//! Line framer: turns a raw byte stream into protocol lines.
//!
//! Lines end in `\r\n`; a bare `\n` is accepted too and the `\r` is stripped.
//! Whatever follows the last terminator stays buffered until the next read
//! completes it, so frames never depend on where the socket split the data.

use bytes::{Bytes, BytesMut};

/// Default receive size for a single socket read.
pub const RECV_BUFFER: usize = 4096;

/// Accumulates received bytes and hands out complete lines.
#[derive(Debug, Default)]
pub struct Framer {
    buf: BytesMut,
}

impl Framer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(RECV_BUFFER),
        }
    }

    /// Append bytes from one receive.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Mutable access for `AsyncReadExt::read_buf` to fill directly.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Bytes held back waiting for a terminator.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Lazily extract every complete line currently buffered.
    ///
    /// Frames are yielded without their terminator. Dropping the iterator
    /// early leaves the remaining lines buffered for the next call.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { buf: &mut self.buf }
    }
}

/// Iterator over complete frames, see [`Framer::frames`].
pub struct Frames<'a> {
    buf: &'a mut BytesMut,
}

impl Iterator for Frames<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        let newline = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line = self.buf.split_to(newline + 1);
        line.truncate(newline);
        if line.last() == Some(&b'\r') {
            line.truncate(newline - 1);
        }
        Some(line.freeze())
    }
}
