//! HTTP listener
//!
//! Accepts TCP connections and serves each one on its own task with hyper's
//! HTTP/1 connection driver. Every request is handed to the shared
//! [`Gateway`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use gateway_core::{ClientAddr, Gateway};

/// The gateway's HTTP server
pub struct GatewayServer {
    listener: TcpListener,
    gateway: Arc<Gateway>,
    shutdown: Arc<Notify>,
}

impl GatewayServer {
    /// Bind the listening socket
    pub async fn bind(addr: &str, gateway: Gateway) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;

        Ok(Self {
            listener,
            gateway: Arc::new(gateway),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle used to stop the accept loop
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Accept connections until shutdown is signalled
    ///
    /// In-flight connections keep running on their own tasks.
    pub async fn run(self) -> Result<()> {
        let addr = self.local_addr()?;
        info!(%addr, base = self.gateway.base(), "Gateway listening");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => serve(stream, peer, Arc::clone(&self.gateway)),
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                },
            }
        }

        Ok(())
    }
}

fn serve(stream: TcpStream, peer: SocketAddr, gateway: Arc<Gateway>) {
    tokio::spawn(async move {
        let service = service_fn(move |mut request: Request<Incoming>| {
            request.extensions_mut().insert(ClientAddr(peer));
            let gateway = Arc::clone(&gateway);
            async move { Ok::<_, Infallible>(gateway.handle(request).await) }
        });

        if let Err(e) = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .await
        {
            debug!(%peer, error = %e, "Connection ended with error");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::config::{ApiRedirect, GatewayConfigFile};

    async fn server() -> GatewayServer {
        let mut config = GatewayConfigFile::new();
        config.base = "/dbs".into();
        config.backends = vec!["http://127.0.0.1:1".into()];
        config.api_redirects = vec![ApiRedirect {
            api: "files".into(),
            timestamps: vec![100],
        }];
        let gateway = Gateway::new(config.into_settings().unwrap()).unwrap();
        GatewayServer::bind("127.0.0.1:0", gateway).await.unwrap()
    }

    #[tokio::test]
    async fn test_serves_requests_until_shutdown() {
        let server = server().await;
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let running = tokio::spawn(server.run());

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{addr}/elsewhere"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);

        let response = client
            .get(format!("http://{addr}/dbs/files?dataset=x"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(&response.bytes().await.unwrap()[..], b"[\n]\n");

        shutdown.notify_one();
        running.await.unwrap().unwrap();
    }
}
