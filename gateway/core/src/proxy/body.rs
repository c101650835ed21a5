//! Response bodies
//!
//! Every response produced by the gateway uses [`GatewayBody`], so split and
//! pass-through responses can be returned from the same handler.

use std::convert::Infallible;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::streaming::{RecordSink, SinkClosed};

/// Boxed error type carried by response bodies
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type of every gateway response
pub type GatewayBody = UnsyncBoxBody<Bytes, BoxError>;

/// A body holding a single in-memory chunk
pub fn full(chunk: impl Into<Bytes>) -> GatewayBody {
    Full::new(chunk.into())
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

/// A streaming body fed through a [`ChannelSink`]
///
/// When the client disconnects, hyper drops the body: the sink's next write
/// fails with [`SinkClosed`] and [`RecordSink::closed`] resolves.
#[must_use]
pub fn channel_body(capacity: usize) -> (ChannelSink, GatewayBody) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let body = StreamBody::new(ReceiverStream::new(rx)).boxed_unsync();
    (ChannelSink { tx }, body)
}

/// Sink writing chunks into a streaming response body
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Result<Frame<Bytes>, BoxError>>,
}

#[async_trait]
impl RecordSink for ChannelSink {
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        self.tx
            .send(Ok(Frame::data(chunk)))
            .await
            .map_err(|_| SinkClosed)
    }

    async fn closed(&mut self) {
        self.tx.closed().await;
    }
}
