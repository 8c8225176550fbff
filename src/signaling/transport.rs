use crate::identity::Identity;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

pub const PUSH_SEGMENT: &str = "events";
pub const REQUEST_SEGMENT: &str = "message";
pub const MESSAGE_PARAM: &str = "message";

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("invalid signaling endpoint: {0}")]
    Endpoint(String),
    #[error("websocket: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("push payload is not utf-8")]
    NotUtf8,
    #[error("request timed out after {0:?}")]
    TimedOut(Duration),
}

/// Server-to-client delivery of encoded envelopes.
#[async_trait]
pub trait PushChannel: Send {
    /// Next envelope; `None` once the subscription has ended.
    async fn recv(&mut self) -> Option<Result<String, SignalingError>>;
    async fn close(&mut self);
}

/// Client-to-server delivery of one encoded envelope.
#[async_trait]
pub trait RequestChannel: Send + Sync {
    async fn send(&self, encoded: String) -> Result<(), SignalingError>;
}

/// Addresses of both signaling channels, derived from the configured base.
///
/// Query parameters on the base (an access token, say) are kept on both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub push: Url,
    pub request: Url,
}

impl Endpoints {
    pub fn derive(base: &Url, id: &Identity) -> Result<Self, SignalingError> {
        let mut push = with_segment(base, PUSH_SEGMENT)?;
        let push_scheme = match base.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(SignalingError::Endpoint(format!(
                    "unsupported scheme {other}"
                )))
            }
        };
        push.set_scheme(push_scheme)
            .map_err(|_| SignalingError::Endpoint("invalid websocket scheme".into()))?;
        push.query_pairs_mut().append_pair("id", id.as_str());

        let mut request = with_segment(base, REQUEST_SEGMENT)?;
        let request_scheme = if push_scheme == "wss" { "https" } else { "http" };
        request
            .set_scheme(request_scheme)
            .map_err(|_| SignalingError::Endpoint("invalid http scheme".into()))?;

        Ok(Self { push, request })
    }
}

fn with_segment(base: &Url, segment: &str) -> Result<Url, SignalingError> {
    let mut url = base.clone();
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| SignalingError::Endpoint(format!("{base} cannot be a base url")))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

/// Push channel over a websocket subscription.
pub struct WebSocketPush {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl WebSocketPush {
    pub async fn connect(url: &Url) -> Result<Self, SignalingError> {
        let (stream, _) = connect_async(url.as_str()).await?;
        tracing::debug!(url = %url, "signaling push channel connected");
        Ok(Self {
            stream,
            closed: false,
        })
    }
}

#[async_trait]
impl PushChannel for WebSocketPush {
    async fn recv(&mut self) -> Option<Result<String, SignalingError>> {
        if self.closed {
            return None;
        }
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    tracing::trace!(kind = "text", len = text.len(), "push message");
                    return Some(Ok(text.as_str().to_owned()));
                }
                Ok(Message::Binary(data)) => {
                    tracing::trace!(kind = "binary", len = data.len(), "push message");
                    return Some(String::from_utf8(data.to_vec()).map_err(|_| SignalingError::NotUtf8));
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    self.closed = true;
                    return match err {
                        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                            None
                        }
                        other => Some(Err(other.into())),
                    };
                }
            }
        }
        self.closed = true;
        None
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.stream.close(None).await {
            tracing::debug!(error = %err, "push channel close");
        }
    }
}

/// Request channel sending each envelope as a single query parameter.
///
/// Query encoding is left to `url`; the response body is ignored. Every
/// request is bounded by `timeout`.
pub struct HttpRequestChannel {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpRequestChannel {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, SignalingError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn request_url(&self, encoded: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair(MESSAGE_PARAM, encoded);
        url
    }
}

#[async_trait]
impl RequestChannel for HttpRequestChannel {
    async fn send(&self, encoded: String) -> Result<(), SignalingError> {
        let url = self.request_url(&encoded);
        self.client.get(url).send().await?.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_from_https_base() {
        let base = Url::parse("https://signal.example.com/rtc?token=x").unwrap();
        let endpoints = Endpoints::derive(&base, &Identity::from("abc")).unwrap();
        assert_eq!(
            endpoints.push.as_str(),
            "wss://signal.example.com/rtc/events?token=x&id=abc"
        );
        assert_eq!(
            endpoints.request.as_str(),
            "https://signal.example.com/rtc/message?token=x"
        );
    }

    #[test]
    fn endpoints_from_root_base() {
        let base = Url::parse("http://localhost:8080/").unwrap();
        let endpoints = Endpoints::derive(&base, &Identity::from("me")).unwrap();
        assert_eq!(endpoints.push.as_str(), "ws://localhost:8080/events?id=me");
        assert_eq!(endpoints.request.as_str(), "http://localhost:8080/message");
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let base = Url::parse("ftp://example.com/").unwrap();
        assert!(Endpoints::derive(&base, &Identity::from("me")).is_err());
    }

    fn channel(endpoint: &str) -> HttpRequestChannel {
        HttpRequestChannel::new(Url::parse(endpoint).unwrap(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn envelope_is_one_escaped_parameter() {
        let channel = channel("http://localhost/message");
        let encoded = r#"{"type":"NO_OFFER","payload":{"id":"a b+c"}}"#;
        let url = channel.request_url(encoded);
        let pairs: Vec<_> = url.query_pairs().collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, MESSAGE_PARAM);
        assert_eq!(pairs[0].1, encoded);
    }

    #[test]
    fn request_keeps_base_query() {
        let base = Url::parse("https://s.example.com/rtc?token=secret#frag").unwrap();
        let endpoints = Endpoints::derive(&base, &Identity::from("me")).unwrap();
        let channel = channel(endpoints.request.as_str());
        let url = channel.request_url(r#"{"type":"NO_OFFER"}"#);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("token".to_string(), "secret".to_string()),
                (MESSAGE_PARAM.to_string(), r#"{"type":"NO_OFFER"}"#.to_string()),
            ]
        );
        assert_eq!(endpoints.push.fragment(), None);
    }
}
