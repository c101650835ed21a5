//! Split Engine
//!
//! Control task for one split request: launches one executor per window,
//! drives the aggregator, and reaps the executors once the document is
//! closed. All state here is scoped to a single request.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::aggregator::{RecordSink, StreamAggregator};
use super::executor::{ExecutorReport, SubRequestExecutor};
use crate::routing::SplitPlan;

/// Result of one split request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitSummary {
    /// Executors launched (equals the plan's window count)
    pub launched: usize,
    /// Executors that completed without error
    pub succeeded: usize,
    /// Executors that stopped with an error
    pub failed: usize,
    /// Elements written to the client
    pub records_written: usize,
    /// Client went away before the document was complete
    pub client_disconnected: bool,
    /// Per-executor reports, in plan order
    pub reports: Vec<ExecutorReport>,
}

/// Fans a plan out over concurrent executors and fans the records back in
#[derive(Clone, Debug)]
pub struct SplitEngine {
    executor: Arc<SubRequestExecutor>,
    channel_capacity: usize,
}

impl SplitEngine {
    /// Create an engine
    #[must_use]
    pub fn new(executor: SubRequestExecutor, channel_capacity: usize) -> Self {
        Self {
            executor: Arc::new(executor),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Execute `plan`, writing the aggregate document into `sink`
    pub async fn run<S: RecordSink>(&self, plan: SplitPlan, sink: S) -> SplitSummary {
        let api = plan.api().to_string();
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let mut executors = JoinSet::new();

        for sub in plan.into_sub_requests() {
            let executor = Arc::clone(&self.executor);
            let tx = tx.clone();
            executors.spawn(async move { executor.run(sub, tx).await });
        }
        let launched = executors.len();
        // Only executors hold senders from here on
        drop(tx);

        let (_sink, aggregate) = StreamAggregator::new(sink).run(rx, launched).await;

        if aggregate.client_disconnected {
            executors.abort_all();
        }

        let mut reports = Vec::with_capacity(launched);
        while let Some(joined) = executors.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(api = %api, error = %e, "Executor task panicked"),
            }
        }
        reports.sort_by_key(|r| r.index);

        let succeeded = reports.iter().filter(|r| r.succeeded()).count();
        let summary = SplitSummary {
            launched,
            succeeded,
            failed: launched - succeeded,
            records_written: aggregate.records_written,
            client_disconnected: aggregate.client_disconnected,
            reports,
        };

        info!(
            api = %api,
            launched = summary.launched,
            failed = summary.failed,
            records = summary.records_written,
            client_disconnected = summary.client_disconnected,
            "Split request complete"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiRedirect;
    use crate::routing::{PlanDecision, SplitParams, SplitPlanner, SplitTable};
    use crate::streaming::executor::ExecutorConfig;
    use crate::streaming::SinkClosed;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use http_body_util::StreamBody;
    use hyper::body::{Frame, Incoming};
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response};
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn split_plan(backend: &str, timestamps: Vec<i64>) -> SplitPlan {
        let planner = SplitPlanner::new(
            SplitTable::from_redirects(vec![ApiRedirect {
                api: "files".into(),
                timestamps,
            }]),
            SplitParams::default(),
        );
        match planner.plan_at(backend, "/files", None, 300) {
            PlanDecision::Split(plan) => plan,
            PlanDecision::PassThrough(reason) => panic!("expected split, got {reason}"),
        }
    }

    fn engine() -> SplitEngine {
        let config = ExecutorConfig::default();
        let client = SubRequestExecutor::build_client(&config).unwrap();
        SplitEngine::new(SubRequestExecutor::new(client, 1024), 4)
    }

    /// Backend that answers every request with one record and never ends the body
    async fn stalling_backend() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((conn, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let service = service_fn(|_request: Request<Incoming>| async {
                        let record = Frame::data(Bytes::from_static(b"{\"n\":1}\n"));
                        let frames = stream::iter([Ok::<_, Infallible>(record)])
                            .chain(stream::pending());
                        Ok::<_, Infallible>(Response::new(StreamBody::new(frames)))
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(conn), service)
                        .await;
                });
            }
        });
        format!("http://{addr}")
    }

    /// Sink whose reader hangs up after `limit` chunks
    struct HangUpSink {
        accepted: usize,
        limit: usize,
    }

    #[async_trait]
    impl RecordSink for HangUpSink {
        async fn write(&mut self, _chunk: Bytes) -> Result<(), SinkClosed> {
            if self.accepted >= self.limit {
                return Err(SinkClosed);
            }
            self.accepted += 1;
            Ok(())
        }

        async fn closed(&mut self) {
            if self.accepted < self.limit {
                std::future::pending::<()>().await;
            }
        }
    }

    #[tokio::test]
    async fn test_disconnect_aborts_stalled_executors() {
        let backend = stalling_backend().await;
        let plan = split_plan(&backend, vec![100]);
        let sink = HangUpSink {
            accepted: 0,
            limit: 2,
        };

        let summary = tokio::time::timeout(Duration::from_secs(5), engine().run(plan, sink))
            .await
            .expect("engine must not wait for stalled backends");

        assert_eq!(summary.launched, 2);
        assert!(summary.client_disconnected);
        assert_eq!(summary.records_written, 1);
        assert!(summary.reports.len() < summary.launched);
    }

    #[tokio::test]
    async fn test_unreachable_backends_yield_empty_array() {
        let plan = split_plan("http://127.0.0.1:1", vec![100, 200]);

        let mut out = Vec::new();
        let summary = engine().run(plan, &mut out).await;

        assert_eq!(out, b"[\n]\n");
        assert_eq!(summary.launched, 3);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.records_written, 0);
        assert_eq!(
            summary.reports.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }
}
