//! Outbound half of a client connection.
//!
//! Every write to a connection, whether a reply from its own handler or a
//! push from another connection's fan-out, goes through the same lock so
//! frames never interleave. Writes are bounded by a timeout; a write that
//! fails or times out closes the channel, which ends the owning handler.
//! A frame too large to encode is refused before the lock and leaves the
//! channel open.

use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::ChatError;
use crate::protocol::{Frame, FrameCodec};

type FrameSink = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, FrameCodec>;

#[derive(Clone)]
pub struct Outbound {
    conn_id: Uuid,
    sink: Arc<Mutex<FrameSink>>,
    closed: CancellationToken,
    write_timeout: Duration,
    max_payload: usize,
}

impl Outbound {
    pub fn new<W>(conn_id: Uuid, writer: W, codec: FrameCodec, write_timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        let max_payload = codec.max_payload();
        Self {
            conn_id,
            sink: Arc::new(Mutex::new(FramedWrite::new(writer, codec))),
            closed: CancellationToken::new(),
            write_timeout,
            max_payload,
        }
    }

    /// Identifies the connection this channel belongs to.
    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Write one frame. Waiting for the lock counts against the timeout.
    pub async fn send(&self, frame: Frame) -> Result<(), ChatError> {
        if self.closed.is_cancelled() {
            return Err(ChatError::ChannelClosed);
        }
        let len = frame.payload_len()?;
        if len > self.max_payload {
            return Err(ChatError::FrameTooLarge {
                len,
                max: self.max_payload,
            });
        }

        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send(frame).await
        };

        let result = match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::PushTimeout),
        };

        match &result {
            Err(e) if e.is_transport() => {
                debug!(conn = %self.conn_id, "outbound write failed, closing channel: {e}");
                self.closed.cancel();
            }
            _ => {}
        }
        result
    }

    /// Mark the channel closed. The owning handler stops reading.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the channel has been closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Flush and shut down the underlying writer.
    pub async fn shutdown(&self) {
        self.closed.cancel();
        let close = async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        };
        let _ = tokio::time::timeout(self.write_timeout, close).await;
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("conn_id", &self.conn_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
