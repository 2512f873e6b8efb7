use std::cmp::Ordering;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// DatagramTransport is the connected UDP channel the session borrows for
/// RTCP traffic. The session never owns the socket; it disconnects and
/// closes it only as part of the BYE teardown.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    fn is_open(&self) -> bool;
    fn is_connected(&self) -> bool;
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Sends one datagram to the connected remote peer.
    async fn send(&self, buf: &[u8]) -> Result<usize>;

    async fn disconnect(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// PacketHandler is the demultiplexer-facing surface of a protocol
/// handler sharing a 5-tuple. Handlers are polled in descending
/// `pipeline_priority` order; the first whose `can_handle` accepts the
/// datagram processes it.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    /// Cheap classification on the raw datagram, run before `handle`.
    fn can_handle(&self, packet: &[u8]) -> bool;

    /// Processes one datagram. Returns the bytes to write back to the
    /// origin, if the protocol calls for an immediate reply.
    async fn handle(
        &self,
        packet: &[u8],
        local: SocketAddr,
        remote: SocketAddr,
    ) -> Result<Option<Bytes>>;

    fn pipeline_priority(&self) -> i32;

    fn compare_to(&self, other: &dyn PacketHandler) -> Ordering {
        self.pipeline_priority().cmp(&other.pipeline_priority())
    }
}
