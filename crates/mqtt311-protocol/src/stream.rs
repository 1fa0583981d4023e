//! Buffered packet framing over asynchronous byte channels.

use crate::error::{MqttError, Result};
use crate::packet::{detect, Packet};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 4096;

/// Reads whole packets from a byte channel.
///
/// The fixed header is peeked from the internal buffer to learn the full
/// packet length; no bytes are consumed until a complete packet is present.
#[derive(Debug)]
pub struct Decoder<R> {
    reader: R,
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Reads exactly one packet.
    ///
    /// EOF before any byte of a packet is
    /// [`ConnectionClosed`](MqttError::ConnectionClosed); EOF mid-packet is
    /// [`UnexpectedEof`](MqttError::UnexpectedEof). An undecodable fixed
    /// header fails with [`DetectionOverflow`](MqttError::DetectionOverflow).
    pub async fn read(&mut self) -> Result<Packet> {
        loop {
            if let Some((_, total)) = detect(&self.buffer)? {
                if self.buffer.len() >= total {
                    let (packet, n) = Packet::decode(&self.buffer[..total])?;
                    self.buffer.advance(n);
                    return Ok(packet);
                }
            }

            self.buffer.reserve(READ_CHUNK);
            let n = self.reader.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(if self.buffer.is_empty() {
                    MqttError::ConnectionClosed
                } else {
                    MqttError::UnexpectedEof
                });
            }
        }
    }
}

/// Writes packets into an outbound buffer and flushes it on demand.
#[derive(Debug)]
pub struct Encoder<W> {
    writer: W,
    buffer: BytesMut,
}

impl<W: AsyncWrite + Unpin> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buffer: BytesMut::new(),
        }
    }

    /// Encodes `packet` into a freshly sized buffer and appends it to the
    /// outbound buffer. Nothing reaches the channel until
    /// [`flush`](Encoder::flush).
    pub fn write(&mut self, packet: &Packet) -> Result<()> {
        let bytes = packet.to_bytes()?;
        self.buffer.extend_from_slice(&bytes);
        Ok(())
    }

    /// Forces the outbound buffer to the underlying channel.
    pub async fn flush(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer).await?;
            self.buffer.clear();
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Flushes and half-closes the channel.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// A full-duplex packet stream: a [`Decoder`] and an [`Encoder`] over one
/// connection's halves.
#[derive(Debug)]
pub struct Stream<R, W> {
    decoder: Decoder<R>,
    encoder: Encoder<W>,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> Stream<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            decoder: Decoder::new(reader),
            encoder: Encoder::new(writer),
        }
    }

    pub async fn read(&mut self) -> Result<Packet> {
        self.decoder.read().await
    }

    pub fn write(&mut self, packet: &Packet) -> Result<()> {
        self.encoder.write(packet)
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.encoder.flush().await
    }

    pub fn into_parts(self) -> (Decoder<R>, Encoder<W>) {
        (self.decoder, self.encoder)
    }
}
