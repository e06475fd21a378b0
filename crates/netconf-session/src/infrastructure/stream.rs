//! Channel transport over any Tokio byte stream.
//!
//! [`StreamChannelOpener`] turns an `AsyncRead` + `AsyncWrite` pair into a
//! [`SubsystemChannel`].  Opening the channel spawns a reader task, which is
//! the session's delivery context: every successful `read` is handed to the
//! registered [`DataReceiver`] in order, and end-of-stream or a read error is
//! reported once through [`DataReceiver::on_closed`].
//!
//! The stream is already "the subsystem", so the subsystem name passed to
//! `open` is only logged.  This adapter backs the SSH process transport and
//! the in-process test peers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::application::channel::{ChannelError, ChannelOpener, DataReceiver, SubsystemChannel};

const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024;

/// Opens a single channel over a pre-connected reader/writer pair.
pub struct StreamChannelOpener<R, W> {
    parts: Mutex<Option<(R, W)>>,
    read_buffer_size: usize,
}

impl<R, W> StreamChannelOpener<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            parts: Mutex::new(Some((reader, writer))),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Size of each read; small values exercise reassembly in tests.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }
}

impl<S> StreamChannelOpener<tokio::io::ReadHalf<S>, tokio::io::WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Splits a bidirectional stream into its two halves.
    pub fn from_stream(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

#[async_trait]
impl<R, W> ChannelOpener for StreamChannelOpener<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn open(
        &self,
        subsystem: &str,
        receiver: Arc<dyn DataReceiver>,
    ) -> Result<Box<dyn SubsystemChannel>, ChannelError> {
        let (reader, writer) =
            self.parts
                .lock()
                .await
                .take()
                .ok_or_else(|| ChannelError::OpenFailed {
                    subsystem: subsystem.to_string(),
                    reason: "stream already used by another channel".to_string(),
                })?;

        debug!(subsystem, "starting stream reader");
        let reader_task = tokio::spawn(read_loop(reader, receiver, self.read_buffer_size));
        Ok(Box::new(StreamChannel {
            writer: Mutex::new(Some(writer)),
            reader_task,
        }))
    }
}

/// Reads until end-of-stream, forwarding every piece to `receiver`.
async fn read_loop<R>(mut reader: R, receiver: Arc<dyn DataReceiver>, buffer_size: usize)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                info!("channel reached end of stream");
                break;
            }
            Ok(n) => receiver.on_data(&buf[..n]),
            Err(e) => {
                error!("read error on channel: {e}");
                break;
            }
        }
    }
    receiver.on_closed();
}

/// The sending half of a stream-backed channel.
pub struct StreamChannel<W> {
    writer: Mutex<Option<W>>,
    reader_task: JoinHandle<()>,
}

#[async_trait]
impl<W> SubsystemChannel for StreamChannel<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, data: &[u8]) -> Result<(), ChannelError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ChannelError::Closed)?;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        let writer = self.writer.lock().await.take();
        self.reader_task.abort();
        match writer {
            Some(mut writer) => {
                writer.shutdown().await?;
                Ok(())
            }
            None => Err(ChannelError::Closed),
        }
    }
}

impl<W> Drop for StreamChannel<W> {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}
