//! WebSocket client transport for the sync engine.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::engine::{self, Frame, FrameSink, FrameStream};
use crate::error::{AuError, Result};
use crate::model::WorkspaceDocument;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsFrameSink(SplitSink<WsStream, Message>);
struct WsFrameStream(SplitStream<WsStream>);

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Binary(data) => Message::Binary(data),
            Frame::Ping => Message::Ping(Vec::new()),
            Frame::Pong => Message::Pong(Vec::new()),
            Frame::Close => Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            })),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| AuError::Transport(e.to_string()))
    }
}

#[async_trait]
impl FrameStream for WsFrameStream {
    async fn next(&mut self) -> Option<Result<Frame>> {
        loop {
            return match self.0.next().await? {
                Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data))),
                Ok(Message::Ping(_)) => Some(Ok(Frame::Ping)),
                Ok(Message::Pong(_)) => Some(Ok(Frame::Pong)),
                Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
                // text and raw frames carry nothing for the sync protocol
                Ok(_) => continue,
                Err(e) => Some(Err(AuError::Transport(e.to_string()))),
            };
        }
    }
}

/// Turn an http(s) base address into the ws(s) sync endpoint URL for a
/// workspace.
pub fn sync_endpoint(address: &str, workspace_id: &str) -> Result<Url> {
    let ws_address = address
        .replace("https://", "wss://")
        .replace("http://", "ws://");
    let mut url =
        Url::parse(&ws_address).map_err(|e| AuError::Transport(format!("invalid url: {e}")))?;
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| AuError::Transport("url cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(["workspaces", workspace_id, "sync"]);
    Ok(url)
}

/// Dial a peer's sync endpoint and run a client session against the given
/// document.
pub async fn connect_and_sync(
    address: &str,
    workspace_id: &str,
    document: &WorkspaceDocument,
    until_caught_up: bool,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let url = sync_endpoint(address, workspace_id)?;
    tracing::debug!(%url, "dialing sync endpoint");
    let (ws, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| AuError::Transport(format!("failed to dial: {e}")))?;
    let (sink, stream) = ws.split();
    engine::sync(
        Box::new(WsFrameStream(stream)),
        Box::new(WsFrameSink(sink)),
        document,
        until_caught_up,
        shutdown,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_rewrites_scheme_and_appends_path() {
        let url = sync_endpoint("http://localhost:8080", "01HYJ4ZVXN3Y5X0GB3ZM5ZQ5RA").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:8080/workspaces/01HYJ4ZVXN3Y5X0GB3ZM5ZQ5RA/sync"
        );

        let url = sync_endpoint("https://peer.example/base/", "01HYJ4ZVXN3Y5X0GB3ZM5ZQ5RA").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://peer.example/base/workspaces/01HYJ4ZVXN3Y5X0GB3ZM5ZQ5RA/sync"
        );
    }

    #[test]
    fn endpoint_strips_query_and_fragment() {
        let url = sync_endpoint("http://host/?q=1#frag", "01HYJ4ZVXN3Y5X0GB3ZM5ZQ5RA").unwrap();
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn endpoint_rejects_garbage() {
        assert!(sync_endpoint("not a url", "x").is_err());
    }
}
