//! Peer-to-peer workspace synchronization.
//!
//! [`engine`] drives the transport-agnostic reconciliation session;
//! [`ws`] binds it to a WebSocket client connection. The server-side
//! WebSocket binding lives with the HTTP adapter.

pub mod engine;
pub mod ws;

pub use engine::{sync, Frame, FrameSink, FrameStream};
pub use ws::connect_and_sync;
