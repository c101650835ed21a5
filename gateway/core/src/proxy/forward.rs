//! Pass-Through Forwarder
//!
//! Verbatim single-backend forwarding for requests that are not split:
//! every non-GET method, unconfigured APIs and client-overridden queries.
//! The backend's status, headers and body reach the client unchanged, apart
//! from hop-by-hop headers. The client address, when known, is appended to
//! `X-Forwarded-For`.

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Body, Frame};
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Request, Response};
use thiserror::Error;
use tracing::debug;

use super::body::{BoxError, GatewayBody};

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::HOST,
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Peer address of the client connection
///
/// The listener stores it in the request extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// Forwarding errors
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The client request body could not be read
    #[error("Failed to read request body: {0}")]
    RequestBody(BoxError),
    /// The backend could not be reached
    #[error("Backend request failed: {0}")]
    Backend(#[from] reqwest::Error),
    /// The proxied response could not be assembled
    #[error("Invalid backend response: {0}")]
    Response(#[from] hyper::http::Error),
}

/// Forwards requests verbatim to one backend
#[derive(Clone, Debug)]
pub struct PassThroughForwarder {
    client: reqwest::Client,
}

impl PassThroughForwarder {
    /// Create a forwarder sharing `client`'s connection pool
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Target URL: backend base followed by the request's path and query
    #[must_use]
    pub fn target_url<B>(backend: &str, request: &Request<B>) -> String {
        let path_and_query = request
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        format!("{}{}", backend.trim_end_matches('/'), path_and_query)
    }

    /// Forward `request` to `backend` and stream the answer back
    ///
    /// # Errors
    ///
    /// Returns an error if the request body cannot be read or the backend
    /// cannot be reached.
    pub async fn forward<B>(
        &self,
        backend: &str,
        request: Request<B>,
    ) -> Result<Response<GatewayBody>, ForwardError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let url = Self::target_url(backend, &request);
        let (parts, body) = request.into_parts();
        let mut headers = strip_hop_by_hop(parts.headers);
        if let Some(ClientAddr(peer)) = parts.extensions.get::<ClientAddr>() {
            append_forwarded_for(&mut headers, peer.ip());
        }
        let body = body
            .collect()
            .await
            .map_err(|e| ForwardError::RequestBody(e.into()))?
            .to_bytes();

        debug!(method = %parts.method, url = %url, "Forwarding request");

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let mut builder = Response::builder().status(upstream.status());
        if let Some(headers) = builder.headers_mut() {
            *headers = strip_hop_by_hop(upstream.headers().clone());
        }

        let stream = upstream
            .bytes_stream()
            .map_ok(Frame::data)
            .map_err(BoxError::from);
        Ok(builder.body(StreamBody::new(stream).boxed_unsync())?)
    }
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

/// Append `client` to the `X-Forwarded-For` chain
fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    let chain = if prior.is_empty() {
        client.to_string()
    } else {
        format!("{}, {client}", prior.join(", "))
    };
    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
