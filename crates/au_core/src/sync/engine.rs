//! Bidirectional CRDT reconciliation over a message-framed duplex channel.
//!
//! The transport is opaque: anything that can carry binary payloads plus
//! ping/pong/close control frames works (in practice a WebSocket). A
//! session runs three cooperating tasks:
//!
//! 1. **Reader** - pulls frames under a rolling read deadline, forwards
//!    binary payloads to the driver, answers pings via the writer and
//!    adjusts the deadline on ping/pong traffic.
//! 2. **Writer** - multiplexes outbound sync messages, pong replies and a
//!    jittered ping ticker; every frame gets its own write deadline and a
//!    close frame is sent when the outbound channel drains shut.
//! 3. **Driver** - the only task touching the CRDT sync state. It flushes
//!    generated messages, feeds inbound ones into the sync state and, in
//!    catch-up mode, exits as soon as the peer's advertised heads match the
//!    local ones.
//!
//! The session result is the first meaningful error of driver, reader or
//! writer; a clean peer close or a satisfied catch-up condition is success.

use std::time::Duration;

use async_trait::async_trait;
use automerge::sync;
use automerge::ChangeHash;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout};

use crate::error::{AuError, Result};
use crate::model::WorkspaceDocument;

/// Deadline for any single outbound frame to be accepted by the transport.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);
/// Maximum inbound silence before the reader declares a timeout.
pub const PING_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for a pong reply after we receive a ping.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(10);
/// Maximum accepted frame payload size. Sync messages above this indicate a
/// misbehaving peer.
pub const READ_LIMIT: usize = 65536;

/// One frame on the duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An application payload: one opaque CRDT sync message.
    Binary(Vec<u8>),
    /// Keep-alive probe.
    Ping,
    /// Keep-alive reply.
    Pong,
    /// Normal closure.
    Close,
}

/// Outbound half of a sync transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame. Implementations should not buffer indefinitely; the
    /// engine applies its own write deadline around this call.
    async fn send(&mut self, frame: Frame) -> Result<()>;
}

/// Inbound half of a sync transport.
#[async_trait]
pub trait FrameStream: Send {
    /// Receive the next frame, or `None` once the peer has gone away.
    async fn next(&mut self) -> Option<Result<Frame>>;
}

/// Draw the per-session ping interval uniformly from
/// `[WRITE_WAIT, PING_TIMEOUT)` so that peers do not phase-lock their
/// keep-alives.
fn ping_interval() -> Duration {
    let low = WRITE_WAIT.as_millis() as u64;
    let high = PING_TIMEOUT.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(low..high))
}

fn heads_equal(a: &[ChangeHash], b: &[ChangeHash]) -> bool {
    a.len() == b.len() && a.iter().all(|hash| b.contains(hash))
}

async fn read_pump(
    mut stream: Box<dyn FrameStream>,
    incoming: mpsc::Sender<Vec<u8>>,
    pongs: mpsc::Sender<()>,
    ping_interval: Duration,
    mut writer_done: watch::Receiver<bool>,
) -> Result<()> {
    let mut deadline = ping_interval;
    loop {
        let read = tokio::select! {
            // the writer has sent its close frame; abort the pending read
            _ = signalled(&mut writer_done) => {
                tracing::debug!("writer finished - reader exiting");
                return Ok(());
            }
            read = timeout(deadline, stream.next()) => read,
        };
        let frame = match read {
            Err(_) => {
                return Err(AuError::Timeout(format!(
                    "no frame received within {deadline:?}"
                )));
            }
            Ok(None) => {
                tracing::debug!("transport closed");
                return Ok(());
            }
            Ok(Some(frame)) => frame?,
        };
        match frame {
            Frame::Binary(message) => {
                if message.len() > READ_LIMIT {
                    return Err(AuError::Transport(format!(
                        "frame of {} bytes exceeds the read limit",
                        message.len()
                    )));
                }
                tracing::debug!(size_bytes = message.len(), "received binary message");
                if incoming.send(message).await.is_err() {
                    // driver is gone; keep draining until the peer closes
                    tracing::debug!("driver finished - discarding inbound message");
                }
            }
            Frame::Ping => {
                tracing::debug!("received ping - sending pong");
                let _ = pongs.send(()).await;
                deadline = PONG_TIMEOUT;
            }
            Frame::Pong => {
                tracing::debug!("received pong");
                deadline = ping_interval;
            }
            Frame::Close => {
                tracing::debug!("received close");
                return Ok(());
            }
        }
    }
}

async fn write_pump(
    mut sink: Box<dyn FrameSink>,
    mut outgoing: mpsc::Receiver<Vec<u8>>,
    mut pongs: mpsc::Receiver<()>,
    ping_period: Duration,
) -> Result<()> {
    tracing::debug!(interval = ?ping_period, "sending pings on an interval");
    let mut ticker = interval(ping_period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // the first tick fires immediately
    let mut pongs_closed = false;
    loop {
        tokio::select! {
            message = outgoing.recv() => match message {
                Some(message) => {
                    tracing::debug!(size_bytes = message.len(), "sending binary message");
                    send_with_deadline(sink.as_mut(), Frame::Binary(message)).await?;
                }
                None => {
                    // best effort: the peer may already be gone
                    tracing::debug!("sending close message");
                    let _ = send_with_deadline(sink.as_mut(), Frame::Close).await;
                    return Ok(());
                }
            },
            pong = pongs.recv(), if !pongs_closed => match pong {
                Some(()) => send_with_deadline(sink.as_mut(), Frame::Pong).await?,
                None => pongs_closed = true,
            },
            _ = ticker.tick() => {
                tracing::debug!("sending ping");
                send_with_deadline(sink.as_mut(), Frame::Ping).await?;
            }
        }
    }
}

async fn send_with_deadline(sink: &mut dyn FrameSink, frame: Frame) -> Result<()> {
    match timeout(WRITE_WAIT, sink.send(frame)).await {
        Err(_) => Err(AuError::Timeout(format!(
            "frame not accepted within {WRITE_WAIT:?}"
        ))),
        Ok(result) => result,
    }
}

/// Push every message the sync state currently wants to emit onto the
/// outgoing channel.
async fn flush_generated(
    document: &WorkspaceDocument,
    state: &mut sync::State,
    outgoing: &mpsc::Sender<Vec<u8>>,
) {
    for message in document.generate_sync_messages(state) {
        if outgoing.send(message).await.is_err() {
            break;
        }
    }
}

/// Resolve once the watched signal flips to `true`; never resolve when the
/// signal's sender has gone away.
async fn signalled(signal: &mut watch::Receiver<bool>) {
    loop {
        if *signal.borrow() {
            return;
        }
        if signal.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Drive one sync session over the given transport halves.
///
/// With `until_caught_up` the session ends successfully as soon as the
/// local document's heads match the heads the peer last advertised - the
/// single-shot client mode. Otherwise the session runs until the peer
/// disconnects - the server mode. Setting `shutdown` to `true` cancels the
/// session from outside.
pub async fn sync(
    stream: Box<dyn FrameStream>,
    sink: Box<dyn FrameSink>,
    document: &WorkspaceDocument,
    until_caught_up: bool,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let ping_period = ping_interval();

    let (incoming_tx, mut incoming_rx) = mpsc::channel::<Vec<u8>>(16);
    let (outgoing_tx, outgoing_rx) = mpsc::channel::<Vec<u8>>(16);
    let (pong_tx, pong_rx) = mpsc::channel::<()>(1);
    let (writer_done_tx, writer_done_rx) = watch::channel(false);

    let reader = tokio::spawn(read_pump(
        stream,
        incoming_tx,
        pong_tx,
        ping_period,
        writer_done_rx,
    ));
    let writer = tokio::spawn(async move {
        let result = write_pump(sink, outgoing_rx, pong_rx, ping_period).await;
        // unblock the reader; it has no connection handle of its own to close
        let _ = writer_done_tx.send(true);
        result
    });

    let mut state = sync::State::new();

    // first flush everything we can
    flush_generated(document, &mut state, &outgoing_tx).await;

    let mut driver_result: Result<()> = Ok(());
    loop {
        tokio::select! {
            message = incoming_rx.recv() => {
                let Some(message) = message else { break };
                match document.receive_sync_message(&mut state, &message) {
                    Err(e) => {
                        driver_result = Err(e);
                        break;
                    }
                    Ok(peer_heads) => {
                        if until_caught_up && heads_equal(&peer_heads, &document.heads()) {
                            tracing::debug!("caught up with peer heads");
                            break;
                        }
                    }
                }
                flush_generated(document, &mut state, &outgoing_tx).await;
            }
            _ = signalled(&mut shutdown) => {
                driver_result = Err(AuError::Cancelled);
                break;
            }
        }
    }

    // closing the outbound channel makes the writer send a close frame
    tracing::debug!("closing outgoing");
    drop(outgoing_tx);
    incoming_rx.close();

    let reader_result = reader.await.unwrap_or(Err(AuError::Cancelled));
    let writer_result = writer.await.unwrap_or(Err(AuError::Cancelled));
    tracing::debug!(
        reader_ok = reader_result.is_ok(),
        writer_ok = writer_result.is_ok(),
        "sync pumps finished"
    );

    driver_result.and(reader_result).and(writer_result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CreateTodoParams;

    /// In-memory duplex transport: a pair of connected frame channels.
    struct ChannelStream(mpsc::Receiver<Frame>);
    struct ChannelSink(mpsc::Sender<Frame>);

    #[async_trait]
    impl FrameStream for ChannelStream {
        async fn next(&mut self) -> Option<Result<Frame>> {
            self.0.recv().await.map(Ok)
        }
    }

    #[async_trait]
    impl FrameSink for ChannelSink {
        async fn send(&mut self, frame: Frame) -> Result<()> {
            self.0
                .send(frame)
                .await
                .map_err(|_| AuError::Transport("peer hung up".to_string()))
        }
    }

    fn duplex() -> (
        (Box<dyn FrameStream>, Box<dyn FrameSink>),
        (Box<dyn FrameStream>, Box<dyn FrameSink>),
    ) {
        let (a_tx, b_rx) = mpsc::channel(64);
        let (b_tx, a_rx) = mpsc::channel(64);
        (
            (Box::new(ChannelStream(a_rx)), Box::new(ChannelSink(a_tx))),
            (Box::new(ChannelStream(b_rx)), Box::new(ChannelSink(b_tx))),
        )
    }

    fn workspace_with_todos(alias: &str, titles: &[&str]) -> WorkspaceDocument {
        let document = WorkspaceDocument::create(
            "01HYJ4ZVXN3Y5X0GB3ZM5ZQ5RA",
            alias,
            chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )
        .unwrap();
        for title in titles {
            document
                .create_todo(CreateTodoParams {
                    title: title.to_string(),
                    description: String::new(),
                    status: None,
                    annotations: Default::default(),
                    created_by: "Ada <ada@x>".to_string(),
                })
                .unwrap();
        }
        document
    }

    fn no_shutdown() -> watch::Receiver<bool> {
        let (_tx, rx) = watch::channel(false);
        rx
    }

    #[tokio::test]
    async fn divergent_peers_converge() {
        let client_doc = workspace_with_todos("Client", &["client todo one", "client todo two"]);
        // the server starts from the client's serialized state, then diverges
        let server_doc = WorkspaceDocument::load(&client_doc.save()).unwrap();
        server_doc
            .create_todo(CreateTodoParams {
                title: "server only todo".to_string(),
                description: String::new(),
                status: None,
                annotations: Default::default(),
                created_by: "Ben <ben@x>".to_string(),
            })
            .unwrap();

        let ((client_stream, server_facing_sink), (server_stream, client_facing_sink)) = duplex();

        let server = tokio::spawn(async move {
            sync(server_stream, client_facing_sink, &server_doc, false, no_shutdown()).await?;
            Ok::<_, AuError>(server_doc)
        });

        sync(
            client_stream,
            server_facing_sink,
            &client_doc,
            true,
            no_shutdown(),
        )
        .await
        .unwrap();

        let server_doc = server.await.unwrap().unwrap();
        assert_eq!(client_doc.heads(), server_doc.heads());
        assert_eq!(client_doc.list_todos().unwrap().len(), 3);
        assert_eq!(server_doc.list_todos().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn caught_up_client_terminates_promptly() {
        // both sides share identical state from the start
        let saved = workspace_with_todos("Shared", &["a shared todo"]).save();
        let client_doc = WorkspaceDocument::load(&saved).unwrap();
        let server_doc = WorkspaceDocument::load(&saved).unwrap();

        let ((client_stream, server_facing_sink), (server_stream, client_facing_sink)) = duplex();

        let server = tokio::spawn(async move {
            sync(server_stream, client_facing_sink, &server_doc, false, no_shutdown()).await
        });

        let result = timeout(
            Duration::from_secs(5),
            sync(
                client_stream,
                server_facing_sink,
                &client_doc,
                true,
                no_shutdown(),
            ),
        )
        .await
        .expect("catch-up client should not hang");
        result.unwrap();

        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_signal_cancels_the_session() {
        let document = workspace_with_todos("Cancelled", &[]);
        // a transport that never produces frames
        let (_quiet_tx, quiet_rx) = mpsc::channel::<Frame>(1);
        let (sink_tx, mut sink_rx) = mpsc::channel::<Frame>(64);
        // drain whatever the writer sends so it never blocks
        tokio::spawn(async move { while sink_rx.recv().await.is_some() {} });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let session = tokio::spawn(async move {
            sync(
                Box::new(ChannelStream(quiet_rx)),
                Box::new(ChannelSink(sink_tx)),
                &document,
                false,
                shutdown_rx,
            )
            .await
        });

        shutdown_tx.send(true).unwrap();
        let result = timeout(Duration::from_secs(5), session)
            .await
            .expect("cancelled session should stop")
            .unwrap();
        assert!(matches!(result, Err(AuError::Cancelled)));
    }

    #[tokio::test]
    async fn oversized_frames_fail_the_session() {
        let document = workspace_with_todos("Limited", &[]);
        let (frames_tx, frames_rx) = mpsc::channel::<Frame>(1);
        let (sink_tx, mut sink_rx) = mpsc::channel::<Frame>(64);
        tokio::spawn(async move { while sink_rx.recv().await.is_some() {} });

        frames_tx
            .send(Frame::Binary(vec![0u8; READ_LIMIT + 1]))
            .await
            .unwrap();

        let result = sync(
            Box::new(ChannelStream(frames_rx)),
            Box::new(ChannelSink(sink_tx)),
            &document,
            false,
            no_shutdown(),
        )
        .await;
        assert!(matches!(result, Err(AuError::Transport(_))));
    }

    #[tokio::test]
    async fn undecodable_messages_fail_the_session() {
        let document = workspace_with_todos("Strict", &[]);
        let (frames_tx, frames_rx) = mpsc::channel::<Frame>(1);
        let (sink_tx, mut sink_rx) = mpsc::channel::<Frame>(64);
        tokio::spawn(async move { while sink_rx.recv().await.is_some() {} });

        frames_tx
            .send(Frame::Binary(b"not a sync message".to_vec()))
            .await
            .unwrap();
        drop(frames_tx);

        let result = sync(
            Box::new(ChannelStream(frames_rx)),
            Box::new(ChannelSink(sink_tx)),
            &document,
            false,
            no_shutdown(),
        )
        .await;
        assert!(matches!(result, Err(AuError::Corrupt(_))));
    }

    #[test]
    fn heads_equality_is_order_insensitive() {
        let a = workspace_with_todos("A", &["first todo"]);
        let heads = a.heads();
        let mut reversed = heads.clone();
        reversed.reverse();
        assert!(heads_equal(&heads, &reversed));
        assert!(!heads_equal(&heads, &[]));
    }
}
