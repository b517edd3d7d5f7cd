//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! TCP accepts run on a background task and every upgrade runs on its own
//! task, so a slow or stalled handshake never holds up other clients.
//! Finished connections are handed to [`Transport::accept`] through a
//! channel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use percent_encoding::percent_decode_str;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// How long a client has to finish the WebSocket upgrade.
const UPGRADE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upgraded connections waiting to be picked up by `accept`.
const PENDING_CAPACITY: usize = 128;

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    local_addr: SocketAddr,
    incoming: mpsc::Receiver<WebSocketConnection>,
    acceptor: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address and starts
    /// accepting in the background.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let bind_error = |source| TransportError::Bind {
            addr: addr.to_owned(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        tracing::info!(%local_addr, "WebSocket transport listening");

        let (tx, incoming) = mpsc::channel(PENDING_CAPACITY);
        let acceptor = tokio::spawn(accept_loop(listener, tx));

        Ok(Self {
            local_addr,
            incoming,
            acceptor,
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        self.incoming
            .recv()
            .await
            .ok_or(TransportError::ListenerStopped)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        self.acceptor.abort();
        tracing::info!(local_addr = %self.local_addr, "WebSocket transport shut down");
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: mpsc::Sender<WebSocketConnection>,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept failed");
                continue;
            }
        };
        let tx = tx.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(UPGRADE_TIMEOUT, upgrade(stream)).await {
                Ok(Ok(conn)) => {
                    tracing::debug!(id = %conn.id, %addr, "accepted WebSocket connection");
                    let _ = tx.send(conn).await;
                }
                Ok(Err(e)) => {
                    tracing::debug!(%addr, error = %e, "WebSocket upgrade failed");
                }
                Err(_) => {
                    tracing::debug!(%addr, "WebSocket upgrade timed out");
                }
            }
        });
    }
}

async fn upgrade(
    stream: TcpStream,
) -> Result<WebSocketConnection, TransportError> {
    let mut credential = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        credential = bearer_credential(req);
        Ok(resp)
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .map_err(TransportError::Upgrade)?;

    let id = ConnectionId::new(
        NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
    );
    let (sink, stream) = ws.split();

    Ok(WebSocketConnection {
        id,
        credential,
        sink: Mutex::new(sink),
        stream: Mutex::new(stream),
    })
}

/// Pulls the bearer token out of an upgrade request.
///
/// `Authorization: Bearer <token>` wins over a `token` query parameter.
/// The query value is percent-decoded.
fn bearer_credential(req: &Request) -> Option<String> {
    let from_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty())
        .map(str::to_owned);

    from_header.or_else(|| {
        req.uri().query()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key != "token" {
                return None;
            }
            let value = percent_decode_str(value).decode_utf8().ok()?;
            (!value.is_empty()).then(|| value.into_owned())
        })
    })
}

/// A single upgraded WebSocket connection.
///
/// The write and read halves sit behind separate locks so a task blocked
/// in `recv` never stalls outbound frames.
pub struct WebSocketConnection {
    id: ConnectionId,
    credential: Option<String>,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        // JSON frames go out as text; anything else as binary.
        let msg = match String::from_utf8(data.to_vec()) {
            Ok(text) => Message::Text(text.into()),
            Err(e) => Message::Binary(e.into_bytes().into()),
        };
        self.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(TransportError::Send)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => return Err(TransportError::Receive(e)),
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(TransportError::Send)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, auth: Option<&str>) -> Request {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_bearer_credential_from_header() {
        let req = request("/game", Some("Bearer abc123"));
        assert_eq!(bearer_credential(&req).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_bearer_credential_scheme_is_case_insensitive() {
        let req = request("/game", Some("bearer xyz"));
        assert_eq!(bearer_credential(&req).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_bearer_credential_from_query() {
        let req = request("/game?room=ABC123&token=t-1", None);
        assert_eq!(bearer_credential(&req).as_deref(), Some("t-1"));
    }

    #[test]
    fn test_bearer_credential_query_value_is_percent_decoded() {
        let req = request("/game?token=tok%2Bx%3D%3D", None);
        assert_eq!(bearer_credential(&req).as_deref(), Some("tok+x=="));
    }

    #[test]
    fn test_bearer_credential_query_invalid_utf8_returns_none() {
        assert!(bearer_credential(&request("/game?token=%FF", None)).is_none());
    }

    #[test]
    fn test_bearer_credential_header_wins_over_query() {
        let req = request("/game?token=from-query", Some("Bearer from-header"));
        assert_eq!(bearer_credential(&req).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_bearer_credential_missing_returns_none() {
        assert!(bearer_credential(&request("/game", None)).is_none());
        assert!(bearer_credential(&request("/game?token=", None)).is_none());
        assert!(
            bearer_credential(&request("/game", Some("Basic dXNlcg=="))).is_none()
        );
    }
}
