// MIT License - Copyright (c) 2026 Peter Wright
// Line transport

pub mod command;
pub mod reader;
pub mod tls;

use std::io;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};

use crate::constants::MAX_FRAME_LEN;

/// Any byte stream the client can run its line protocol over.
///
/// `connect` uses a TLS stream; tests attach an in-memory duplex.
pub trait PanelIo: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> PanelIo for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedIo = Box<dyn PanelIo>;

/// Split a stream into its line reader and line writer halves.
pub fn split_lines(stream: BoxedIo) -> (LineReader, LineWriter) {
    let (read_half, write_half) = tokio::io::split(stream);
    (
        LineReader {
            inner: BufReader::new(read_half),
            buf: Vec::new(),
            max_len: MAX_FRAME_LEN,
        },
        LineWriter {
            inner: write_half,
            closed: false,
        },
    )
}

/// One inbound line, or the reason it was thrown away.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    /// The line's bytes were not UTF-8.
    NotUtf8,
    /// The line ran past the frame limit; the rest of it was skipped.
    Oversized,
}

/// Inbound half: yields one frame per newline.
pub struct LineReader {
    inner: BufReader<ReadHalf<BoxedIo>>,
    buf: Vec<u8>,
    max_len: usize,
}

impl LineReader {
    /// Next line without its terminator. `Ok(None)` means the peer closed
    /// the connection. Only I/O failures are errors.
    pub async fn next_line(&mut self) -> io::Result<Option<Frame>> {
        self.buf.clear();
        // One extra byte for the terminator
        let limit = self.max_len as u64 + 1;
        let n = (&mut self.inner)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await?;
        if n == 0 {
            return Ok(None);
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        } else if self.buf.len() > self.max_len {
            self.skip_line().await?;
            return Ok(Some(Frame::Oversized));
        }

        match String::from_utf8(std::mem::take(&mut self.buf)) {
            Ok(line) => Ok(Some(Frame::Line(line))),
            Err(_) => Ok(Some(Frame::NotUtf8)),
        }
    }

    /// Discard input up to and including the next newline.
    async fn skip_line(&mut self) -> io::Result<()> {
        loop {
            let (used, done) = {
                let chunk = self.inner.fill_buf().await?;
                if chunk.is_empty() {
                    return Ok(());
                }
                match chunk.iter().position(|&b| b == b'\n') {
                    Some(i) => (i + 1, true),
                    None => (chunk.len(), false),
                }
            };
            self.inner.consume(used);
            if done {
                return Ok(());
            }
        }
    }
}

/// Outbound half.
pub struct LineWriter {
    inner: WriteHalf<BoxedIo>,
    closed: bool,
}

impl LineWriter {
    /// Write one frame. The line and its terminator go out in a single
    /// write so frames can't interleave.
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"));
        }
        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(b'\n');
        self.inner.write_all(&frame).await?;
        self.inner.flush().await
    }

    /// Shut the write side down. Closing twice is a no-op.
    pub async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.shutdown().await
    }
}
