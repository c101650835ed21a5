//! Sub-Request Executor
//!
//! Runs one streaming GET per [`SubRequest`], decodes the NDJSON body and
//! hands each record to the aggregator over a bounded channel. Every run
//! ends with exactly one [`Emission::Finished`], whatever the outcome.
//!
//! Executors never see the client connection. A failing executor only
//! shortens the aggregate; siblings keep running.

use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::ndjson::{LineDecoder, LineTooLong};
use crate::config::DEFAULT_BUFFER_SIZE;
use crate::routing::{SubRequest, Window};

/// Media type requested from backends
pub const NDJSON: &str = "application/ndjson";

// ============================================================================
// Configuration
// ============================================================================

/// Limits applied to every sub-request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Longest accepted record in bytes
    pub max_line_bytes: usize,
    /// Ceiling for one backend call, including the streamed body
    pub request_timeout: Duration,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Capacity of the executor -> aggregator channel
    pub channel_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: DEFAULT_BUFFER_SIZE,
            request_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(5),
            channel_capacity: 100,
        }
    }
}

// ============================================================================
// Records and Emissions
// ============================================================================

/// One opaque, already-serialized record from a backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record(Bytes);

impl Record {
    /// Wrap raw record bytes
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes of the record
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Message from an executor to the aggregator
#[derive(Debug)]
pub enum Emission {
    /// A decoded record
    Record {
        /// Index of the emitting executor
        executor: usize,
        /// The record
        record: Record,
    },
    /// Executor terminated (sent exactly once per executor)
    Finished(ExecutorReport),
}

/// Executor errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// Connection or request failure
    #[error("Transport error: {0}")]
    Transport(String),
    /// Backend answered with a non-success status
    #[error("Backend returned status {0}")]
    Status(u16),
    /// Backend call exceeded the configured ceiling
    #[error("Backend call timed out")]
    Timeout,
    /// Error while reading the body
    #[error("Body read failed: {0}")]
    Body(String),
    /// A record exceeded the maximum line length
    #[error(transparent)]
    LineTooLong(#[from] LineTooLong),
    /// Aggregator stopped receiving (client went away)
    #[error("Aggregator closed")]
    AggregatorClosed,
}

impl ExecutorError {
    fn from_reqwest(error: &reqwest::Error, in_body: bool) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if in_body {
            Self::Body(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Outcome of one executor run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorReport {
    /// Index of the sub-request in its plan
    pub index: usize,
    /// Window the sub-request covered
    pub window: Window,
    /// Records emitted before termination
    pub records: usize,
    /// Wall time of the run
    pub elapsed: Duration,
    /// Why the run stopped early, if it did
    pub error: Option<ExecutorError>,
}

impl ExecutorReport {
    /// Whether the sub-request completed without error
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Streams sub-requests from backends
#[derive(Clone, Debug)]
pub struct SubRequestExecutor {
    client: reqwest::Client,
    max_line_bytes: usize,
}

impl SubRequestExecutor {
    /// Create an executor sharing `client`'s connection pool
    #[must_use]
    pub fn new(client: reqwest::Client, max_line_bytes: usize) -> Self {
        Self {
            client,
            max_line_bytes,
        }
    }

    /// Build the shared HTTP client from executor limits
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn build_client(config: &ExecutorConfig) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
    }

    /// Run one sub-request to completion
    ///
    /// Sends `Emission::Finished` exactly once before returning the same report.
    pub async fn run(&self, sub: SubRequest, tx: mpsc::Sender<Emission>) -> ExecutorReport {
        let start = Instant::now();
        let mut records = 0;

        debug!(url = %sub.url, window = %sub.window, "send");
        let result = self.stream_records(&sub, &tx, &mut records).await;

        let report = ExecutorReport {
            index: sub.index,
            window: sub.window,
            records,
            elapsed: start.elapsed(),
            error: result.err(),
        };

        match &report.error {
            None => debug!(
                url = %sub.url,
                records,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Sub-request complete"
            ),
            Some(ExecutorError::AggregatorClosed) => debug!(
                url = %sub.url,
                records,
                "Sub-request abandoned, aggregator closed"
            ),
            Some(e) => warn!(
                url = %sub.url,
                window = %sub.window,
                records,
                error = %e,
                "Sub-request failed"
            ),
        }

        // A closed channel only means nobody is waiting for the report
        let _ = tx.send(Emission::Finished(report.clone())).await;
        report
    }

    async fn stream_records(
        &self,
        sub: &SubRequest,
        tx: &mpsc::Sender<Emission>,
        records: &mut usize,
    ) -> Result<(), ExecutorError> {
        let response = self
            .client
            .get(&sub.url)
            .header(ACCEPT, NDJSON)
            .send()
            .await
            .map_err(|e| ExecutorError::from_reqwest(&e, false))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExecutorError::Status(status.as_u16()));
        }

        let mut stream = response.bytes_stream();
        let mut decoder = LineDecoder::new(self.max_line_bytes);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ExecutorError::from_reqwest(&e, true))?;
            decoder.extend(&chunk);
            while let Some(line) = decoder.next_record()? {
                emit(sub.index, line, tx).await?;
                *records += 1;
            }
        }

        if let Some(line) = decoder.finish()? {
            emit(sub.index, line, tx).await?;
            *records += 1;
        }

        Ok(())
    }
}

async fn emit(
    executor: usize,
    line: Bytes,
    tx: &mpsc::Sender<Emission>,
) -> Result<(), ExecutorError> {
    tx.send(Emission::Record {
        executor,
        record: Record(line),
    })
    .await
    .map_err(|_| ExecutorError::AggregatorClosed)
}
