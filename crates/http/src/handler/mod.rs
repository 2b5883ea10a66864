//! Interfaces to the external collaborators of the connection core.
//!
//! The connection core does not route requests or speak the WebSocket frame
//! format itself; it drives these two seams:
//!
//! - [`RequestHandler`]: the application router. Invoked once per fully
//!   read request, synchronously, with the reply to fill in.
//! - [`WebsocketSession`] / [`WebsocketSessionFactory`]: the frame codec
//!   and its per-connection state, created when a handler answers
//!   `101 Switching Protocols`. The session receives every inbound byte
//!   after the upgrade and pushes outbound frames through the
//!   [`FrameWriter`] it was created with.

use crate::protocol::{Reply, Request};

pub use crate::connection::FrameWriter;

/// The application request handler.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handles one request, filling in `reply`. Runs on the connection's
    /// read task; requests on one connection are strictly serialized.
    fn handle_request(&self, request: &Request, reply: &mut Reply);
}

/// Outcome of feeding buffered bytes to a websocket session.
#[derive(Debug, Clone, Copy)]
pub struct WsParse {
    /// A complete frame was parsed (and already acted upon).
    pub complete: bool,
    /// How many buffered bytes the session consumed.
    pub consumed: usize,
    /// False once a close control frame was received: the connection moves
    /// to its closing state and stops reading.
    pub keepalive: bool,
}

/// A per-connection websocket session, fed by the connection after a
/// protocol switch.
///
/// Implementations hold the frame codec state; `parse` takes `&self`, so
/// interior mutability is the implementor's concern (sessions are only ever
/// fed from the single read task, but pings arrive from a timer task).
pub trait WebsocketSession: Send + Sync {
    /// Called once, right after the switch to WebSocket.
    fn start(&self) {}

    /// Called when the connection stops; the session releases any
    /// resources it holds.
    fn stop(&self) {}

    /// Feeds buffered inbound bytes to the frame codec.
    fn parse(&self, data: &[u8]) -> WsParse;

    /// Sends a server-side Ping, used to probe idle keep-alive peers.
    fn send_ping(&self);

    /// Lets the session capture its session id from the upgrade exchange.
    fn store_session_id(&self, request: &Request, reply: &Reply) {
        let _ = (request, reply);
    }
}

/// Creates websocket sessions at upgrade time.
pub trait WebsocketSessionFactory: Send + Sync + 'static {
    /// `writer` enqueues already-framed bytes onto the owning connection's
    /// write queue.
    fn create(&self, writer: FrameWriter) -> std::sync::Arc<dyn WebsocketSession>;
}
