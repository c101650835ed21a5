//! Stream Aggregator
//!
//! The single writer of a split response. Records arrive from any number of
//! executors over one channel; the aggregator frames them into one JSON array:
//!
//! ```text
//! [\n
//! rec_a1\n
//! ,rec_b1\n
//! ,rec_a2\n
//! ]\n
//! ```
//!
//! Completion is declared only after `launched` finish signals have been
//! observed, so records can never be cut off by an early close.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::executor::{Emission, ExecutorReport, Record};

/// Opening delimiter of the aggregate document
pub const ARRAY_OPEN: &[u8] = b"[\n";
/// Closing delimiter of the aggregate document
pub const ARRAY_CLOSE: &[u8] = b"]\n";
/// Element separator, written before every element after the first
pub const ELEMENT_SEPARATOR: u8 = b',';

/// The client side of the sink is gone
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("client connection closed")]
pub struct SinkClosed;

/// Destination of the aggregate document
///
/// Each call writes one complete unit; implementations must not split a
/// chunk across interleaved writers.
#[async_trait]
pub trait RecordSink: Send {
    /// Write one chunk
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed>;

    /// Resolve once the reading side is gone
    ///
    /// Sinks that cannot observe their reader never resolve.
    async fn closed(&mut self) {
        std::future::pending::<()>().await;
    }
}

#[async_trait]
impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        (**self).write(chunk).await
    }

    async fn closed(&mut self) {
        (**self).closed().await;
    }
}

#[async_trait]
impl RecordSink for Vec<u8> {
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        self.extend_from_slice(&chunk);
        Ok(())
    }
}

/// What the aggregator observed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregateSummary {
    /// Elements written to the sink
    pub records_written: usize,
    /// Finish signals observed
    pub finished: usize,
    /// Reports from executors that stopped with an error
    pub failures: Vec<ExecutorReport>,
    /// Sink closed before the document was complete
    pub client_disconnected: bool,
}

/// Frames records from many executors into one document
pub struct StreamAggregator<S> {
    sink: S,
    written: usize,
}

impl<S: RecordSink> StreamAggregator<S> {
    /// Create an aggregator writing into `sink`
    pub fn new(sink: S) -> Self {
        Self { sink, written: 0 }
    }

    /// Consume emissions until `launched` executors have finished
    ///
    /// Returns the sink together with the summary so callers can inspect
    /// in-memory output.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Emission>,
        launched: usize,
    ) -> (S, AggregateSummary) {
        let mut summary = AggregateSummary::default();

        if self.sink.write(Bytes::from_static(ARRAY_OPEN)).await.is_err() {
            summary.client_disconnected = true;
            return (self.sink, summary);
        }

        while summary.finished < launched {
            // A closed sink ends the wait even while every executor is silent
            let next = tokio::select! {
                emission = rx.recv() => Some(emission),
                () = self.sink.closed() => None,
            };
            let Some(next) = next else {
                debug!(
                    finished = summary.finished,
                    "Client went away while waiting for records"
                );
                summary.client_disconnected = true;
                summary.records_written = self.written;
                return (self.sink, summary);
            };
            let Some(emission) = next else {
                // Every sender is gone; an executor died without reporting
                warn!(
                    launched,
                    finished = summary.finished,
                    "Executor channel closed before all executors finished"
                );
                break;
            };

            match emission {
                Emission::Record { executor, record } => {
                    if self.write_element(&record).await.is_err() {
                        debug!(executor, "Client went away mid-stream");
                        summary.client_disconnected = true;
                        summary.records_written = self.written;
                        return (self.sink, summary);
                    }
                }
                Emission::Finished(report) => {
                    summary.finished += 1;
                    if !report.succeeded() {
                        summary.failures.push(report);
                    }
                }
            }
        }

        summary.records_written = self.written;
        if self.sink.write(Bytes::from_static(ARRAY_CLOSE)).await.is_err() {
            summary.client_disconnected = true;
        }
        (self.sink, summary)
    }

    /// Write separator, record and newline as a single chunk
    async fn write_element(&mut self, record: &Record) -> Result<(), SinkClosed> {
        let mut chunk = BytesMut::with_capacity(record.len() + 2);
        if self.written > 0 {
            chunk.put_u8(ELEMENT_SEPARATOR);
        }
        chunk.put_slice(record.as_bytes());
        chunk.put_u8(b'\n');
        self.sink.write(chunk.freeze()).await?;
        self.written += 1;
        Ok(())
    }
}
