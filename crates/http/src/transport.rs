//! Transport abstraction over plain and TLS-wrapped TCP streams.
//!
//! The two variants are concrete types behind one capability set
//! (read-some, write-all, shutdown); the connection state machine never
//! cares which one it holds. A transport is split once into a reader half
//! (owned by the read task) and a writer half (shared behind the
//! connection's writer lock).

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

/// A connected peer stream, plain or TLS. For TLS the server-side
/// handshake has already completed.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    pub fn is_secure(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    /// Splits the stream into independently owned read and write halves.
    pub fn split(self) -> (TransportReader, TransportWriter) {
        match self {
            Transport::Plain(stream) => {
                let (reader, writer) = stream.into_split();
                (TransportReader::Plain(reader), TransportWriter::Plain(writer))
            }
            Transport::Tls(stream) => {
                let (reader, writer) = tokio::io::split(*stream);
                (TransportReader::Tls(reader), TransportWriter::Tls(writer))
            }
        }
    }
}

/// The read half of a transport.
pub enum TransportReader {
    Plain(OwnedReadHalf),
    Tls(ReadHalf<TlsStream<TcpStream>>),
}

impl TransportReader {
    /// Reads some bytes, appending to `buf`. Returns the number of bytes
    /// read; zero means the peer closed the stream.
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        match self {
            TransportReader::Plain(reader) => reader.read_buf(buf).await,
            TransportReader::Tls(reader) => reader.read_buf(buf).await,
        }
    }
}

/// The write half of a transport.
pub enum TransportWriter {
    Plain(OwnedWriteHalf),
    Tls(WriteHalf<TlsStream<TcpStream>>),
}

impl TransportWriter {
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            TransportWriter::Plain(writer) => writer.write_all(buf).await,
            TransportWriter::Tls(writer) => writer.write_all(buf).await,
        }
    }

    /// Graceful closure: shut the stream down (FIN, and for TLS a
    /// close_notify) before it is dropped. Errors are ignored; the peer may
    /// already be gone.
    pub async fn shutdown(&mut self) {
        let _ = match self {
            TransportWriter::Plain(writer) => writer.shutdown().await,
            TransportWriter::Tls(writer) => writer.shutdown().await,
        };
    }
}
