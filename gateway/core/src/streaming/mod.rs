//! Streaming Fan-Out / Fan-In
//!
//! Everything that happens once a request has been split:
//!
//! ```text
//!                    SplitEngine (control task)
//!                            │ spawn × N
//!        ┌───────────────────┼───────────────────┐
//!        v                   v                   v
//!  SubRequestExecutor  SubRequestExecutor  SubRequestExecutor
//!   [0, t1)             [t1, t2)            [t2, now)
//!        │ Emission          │                   │
//!        └──────────> mpsc (bounded) <───────────┘
//!                            │
//!                            v
//!                    StreamAggregator ──> RecordSink (client)
//! ```
//!
//! Executors never touch the client connection; the aggregator is its only
//! writer. Completion is counted per request from the number of executors
//! actually launched.

pub mod aggregator;
pub mod engine;
pub mod executor;
pub mod ndjson;

pub use aggregator::{AggregateSummary, RecordSink, SinkClosed, StreamAggregator};
pub use engine::{SplitEngine, SplitSummary};
pub use executor::{
    Emission, ExecutorConfig, ExecutorError, ExecutorReport, Record, SubRequestExecutor, NDJSON,
};
pub use ndjson::{LineDecoder, LineTooLong};
