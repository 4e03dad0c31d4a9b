//! Queue source that GETs the job list over plain HTTP/1.1.

use std::time::Duration;

use http_body_util::{BodyExt, Empty};
use hyper::Uri;
use tracing::debug;

use nodesize_core::QueuedJob;

use super::{SourceError, parse_queue};
use crate::fetch::Fetcher;

#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
    uri: Uri,
    /// `host:port` to connect to.
    address: String,
    timeout: Duration,
}

impl HttpSource {
    /// Create a source for an `http://` URL.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let uri: Uri = url
            .parse()
            .map_err(|_| SourceError::InvalidUrl(url.to_string()))?;
        if uri.scheme_str() != Some("http") {
            return Err(SourceError::InvalidUrl(url.to_string()));
        }
        let authority = uri
            .authority()
            .ok_or_else(|| SourceError::InvalidUrl(url.to_string()))?;
        let address = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));

        Ok(Self {
            url: url.to_string(),
            uri,
            address,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and decode the queue, bounded by the configured timeout.
    pub async fn get(&self) -> Result<Vec<QueuedJob>, SourceError> {
        match tokio::time::timeout(self.timeout, self.request()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                url: self.url.clone(),
                timeout: self.timeout,
            }),
        }
    }

    async fn request(&self) -> Result<Vec<QueuedJob>, SourceError> {
        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| self.http_error(e))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| self.http_error(e))?;

        // Drive the connection in the background.
        let url = self.url.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, %url, "queue connection closed with error");
            }
        });

        let path = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let req = http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", self.address.as_str())
            .header("accept", "application/json")
            .header("user-agent", "nodesize/0.1")
            .body(Empty::<bytes::Bytes>::new())
            .map_err(|e| self.http_error(e))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| self.http_error(e))?;

        if !resp.status().is_success() {
            return Err(SourceError::Status {
                url: self.url.clone(),
                status: resp.status().as_u16(),
            });
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| self.http_error(e))?
            .to_bytes();
        debug!(url = %self.url, bytes = body.len(), "fetched queue");

        parse_queue(&body)
    }

    fn http_error(&self, e: impl std::fmt::Display) -> SourceError {
        SourceError::Http {
            url: self.url.clone(),
            reason: e.to_string(),
        }
    }
}

impl Fetcher for HttpSource {
    type Output = Vec<QueuedJob>;

    async fn fetch(&self) -> anyhow::Result<Vec<QueuedJob>> {
        Ok(self.get().await?)
    }
}
