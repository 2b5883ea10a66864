//! Streams a file to the peer after a download reply.
//!
//! The transfer bypasses the write queue: the sender holds the writer lock
//! for the whole transfer, so an in-flight queued write finishes first and
//! nothing interleaves with the file bytes. The connection always stops
//! when the transfer ends, successfully or not.

use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::connection::connection::Connection;

/// Chunk size for file transfers; also the size of the lazily allocated
/// send buffer.
pub const FILE_SEND_BUFFER_SIZE: usize = 64 * 1024;

pub(crate) struct FileSender {
    file: File,
    buffer: Vec<u8>,
}

impl FileSender {
    /// Opens the file and queries its size and last-modified time.
    pub(crate) async fn open(path: &str) -> io::Result<(FileSender, u64, SystemTime)> {
        let file = File::open(path).await?;
        let metadata = file.metadata().await?;
        let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());
        Ok((FileSender { file, buffer: Vec::new() }, metadata.len(), modified))
    }

    /// Writes the serialized header block, then the file in
    /// [`FILE_SEND_BUFFER_SIZE`] chunks, and stops the connection.
    pub(crate) async fn run(mut self, connection: Arc<Connection>, head: Bytes) {
        {
            let mut writer = connection.writer().lock().await;
            let writer = match writer.as_mut() {
                Some(writer) => writer,
                None => {
                    connection.manager().stop(&connection);
                    return;
                }
            };
            if writer.write_all(&head).await.is_err() {
                connection.manager().stop(&connection);
                return;
            }

            self.buffer = vec![0u8; FILE_SEND_BUFFER_SIZE];
            loop {
                let read = match self.file.read(&mut self.buffer).await {
                    Ok(read) => read,
                    Err(_) => break,
                };
                if read == 0 {
                    break;
                }
                if writer.write_all(&self.buffer[..read]).await.is_err() {
                    break;
                }
            }
        }
        // file handle and buffer are released here; the lock is no longer
        // held when the stop path runs
        drop(self);
        connection.manager().stop(&connection);
    }
}
