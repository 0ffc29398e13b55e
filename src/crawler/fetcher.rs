//! HTTP transport and per-request fetch task
//!
//! This module handles:
//! - The [`Transport`] seam the controller issues requests through
//! - A reqwest-backed transport with a proper user agent string
//! - The fetch task that applies the request timeout and streams progress
//!   back to the controller as [`FetchEvent`]s

use crate::TransportError;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{header::SET_COOKIE, redirect::Policy, Client};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use url::Url;

/// An outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    pub headers: BTreeMap<String, String>,
}

/// Stream of response body chunks
pub type BodyStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Status line, cookies and streaming body of a response
pub struct TransportResponse {
    pub status: u16,

    /// Raw `Set-Cookie` header values
    pub set_cookies: Vec<String>,

    pub body: BodyStream,
}

impl TransportResponse {
    /// Builds a response whose body arrives as a single chunk
    pub fn from_bytes(status: u16, set_cookies: Vec<String>, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        let chunks = if body.is_empty() {
            Vec::new()
        } else {
            vec![Ok(body)]
        };

        Self {
            status,
            set_cookies,
            body: stream::iter(chunks).boxed(),
        }
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("set_cookies", &self.set_cookies)
            .finish_non_exhaustive()
    }
}

/// Issues one HTTP(S) request
///
/// Implementations must not follow redirects; a redirect is a response like
/// any other.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: FetchRequest) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a transport with the given user agent
    ///
    /// # Example
    ///
    /// ```no_run
    /// use trawler::HttpTransport;
    ///
    /// let transport = HttpTransport::new("Trawler/0.1").unwrap();
    /// ```
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::none())
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: FetchRequest) -> Result<TransportResponse, TransportError> {
        let url = request.url.to_string();

        let mut builder = self.client.get(request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|source| TransportError::Http {
            url: url.clone(),
            source,
        })?;

        let status = response.status().as_u16();
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(String::from)
            .collect();

        let body = stream::unfold(Some(response), move |state| {
            let url = url.clone();
            async move {
                let mut response = match state {
                    Some(response) => response,
                    None => return None,
                };
                match response.chunk().await {
                    Ok(Some(bytes)) => Some((Ok(bytes.to_vec()), Some(response))),
                    Ok(None) => None,
                    Err(source) => Some((Err(TransportError::Http { url, source }), None)),
                }
            }
        })
        .boxed();

        Ok(TransportResponse {
            status,
            set_cookies,
            body,
        })
    }
}

/// Progress of one in-flight request, reported to the controller
#[derive(Debug)]
pub enum FetchEvent {
    /// Headers arrived
    Response {
        id: u64,
        status: u16,
        set_cookies: Vec<String>,
        ttfb: Duration,
    },

    /// A body chunk arrived
    Chunk { id: u64, len: usize },

    /// The exchange ended; carries the full body or the failure
    Finished {
        id: u64,
        result: Result<Vec<u8>, TransportError>,
    },
}

impl FetchEvent {
    pub fn id(&self) -> u64 {
        match self {
            FetchEvent::Response { id, .. }
            | FetchEvent::Chunk { id, .. }
            | FetchEvent::Finished { id, .. } => *id,
        }
    }
}

/// Runs one request to completion, reporting progress over `events`
///
/// `wait` bounds the whole exchange (headers and body). When it elapses the
/// request is dropped and `Finished` carries [`TransportError::Timeout`].
/// Exactly one `Finished` event is sent per call.
pub(crate) async fn fetch(
    transport: Arc<dyn Transport>,
    request: FetchRequest,
    wait: Duration,
    id: u64,
    events: UnboundedSender<FetchEvent>,
) {
    let start = Instant::now();

    let exchange = async {
        let response = transport.send(request).await?;

        // A closed channel means the controller is gone; nothing left to report to
        let _ = events.send(FetchEvent::Response {
            id,
            status: response.status,
            set_cookies: response.set_cookies,
            ttfb: start.elapsed(),
        });

        let mut body = Vec::new();
        let mut chunks = response.body;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            let _ = events.send(FetchEvent::Chunk {
                id,
                len: chunk.len(),
            });
            body.extend_from_slice(&chunk);
        }

        Ok::<_, TransportError>(body)
    };

    let result = match tokio::time::timeout(wait, exchange).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(wait)),
    };

    let _ = events.send(FetchEvent::Finished { id, result });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct SlowTransport {
        delay: Duration,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn send(&self, _request: FetchRequest) -> Result<TransportResponse, TransportError> {
            tokio::time::sleep(self.delay).await;
            Ok(TransportResponse::from_bytes(
                200,
                vec!["a=1".to_string()],
                "<html></html>",
            ))
        }
    }

    fn request() -> FetchRequest {
        FetchRequest {
            url: Url::parse("http://example.com/").unwrap(),
            headers: BTreeMap::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_reports_response_chunk_and_finished() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = Arc::new(SlowTransport {
            delay: Duration::from_millis(50),
        });

        fetch(transport, request(), Duration::from_secs(1), 7, tx).await;

        match rx.recv().await.unwrap() {
            FetchEvent::Response {
                id,
                status,
                set_cookies,
                ttfb,
            } => {
                assert_eq!(id, 7);
                assert_eq!(status, 200);
                assert_eq!(set_cookies, vec!["a=1".to_string()]);
                assert!(ttfb >= Duration::from_millis(50));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            FetchEvent::Chunk { id: 7, len: 13 }
        ));
        match rx.recv().await.unwrap() {
            FetchEvent::Finished { result, .. } => {
                assert_eq!(result.unwrap(), b"<html></html>".to_vec())
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_times_out() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = Arc::new(SlowTransport {
            delay: Duration::from_secs(5),
        });

        fetch(transport, request(), Duration::from_millis(100), 1, tx).await;

        match rx.recv().await.unwrap() {
            FetchEvent::Finished { id, result } => {
                assert_eq!(id, 1);
                assert!(matches!(result, Err(TransportError::Timeout(_))));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_empty_body_has_no_chunks() {
        let response = TransportResponse::from_bytes(204, Vec::new(), Vec::new());
        assert_eq!(response.status, 204);
    }

    #[test]
    fn test_http_transport_builds() {
        assert!(HttpTransport::new("Trawler/0.1 (test)").is_ok());
    }
}
