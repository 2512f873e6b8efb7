#[cfg(test)]
mod dtls_test;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use util::sync::Mutex;

use crate::error::Result;

/// MTU used by the handshake transport.
pub const DTLS_MTU: usize = 1500;

/// PacketTransformer turns one packet family between its plain and
/// protected form. `None` signals an authentication or replay failure;
/// the caller drops the packet.
pub trait PacketTransformer: Send + Sync {
    /// Protects an outbound packet.
    fn transform(&self, packet: &[u8]) -> Option<Bytes>;

    /// Unprotects an inbound packet.
    fn reverse_transform(&self, packet: &[u8]) -> Option<Bytes>;
}

/// The four transformers a completed DTLS-SRTP handshake yields, one per
/// direction and packet family. Immutable once derived.
pub struct SrtpTransformers {
    pub rtp_encoder: Arc<dyn PacketTransformer>,
    pub rtp_decoder: Arc<dyn PacketTransformer>,
    pub rtcp_encoder: Arc<dyn PacketTransformer>,
    pub rtcp_decoder: Arc<dyn PacketTransformer>,
}

/// DtlsEndpoint is the borrowed DTLS-SRTP stack. `handshake` drives the
/// server-role exchange over the datagram transport (MTU [`DTLS_MTU`]),
/// blocking on I/O, and derives the transformers from the negotiated
/// master keys and salts.
#[async_trait]
pub trait DtlsEndpoint: Send + Sync {
    async fn handshake(&self) -> Result<SrtpTransformers>;
}

/// DtlsHandler gates all secure RTP/RTCP I/O on the completion of the
/// DTLS handshake. Until `is_handshake_complete` turns true every
/// encode/decode returns `None`, which keeps a partially keyed session
/// off the wire.
pub struct DtlsHandler {
    endpoint: Arc<dyn DtlsEndpoint>,
    handshake_complete: AtomicBool,
    handshaking: AtomicBool,
    transformers: Mutex<Option<SrtpTransformers>>,
}

impl DtlsHandler {
    pub fn new(endpoint: Arc<dyn DtlsEndpoint>) -> Self {
        DtlsHandler {
            endpoint,
            handshake_complete: AtomicBool::new(false),
            handshaking: AtomicBool::new(false),
            transformers: Mutex::new(None),
        }
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.handshake_complete.load(Ordering::SeqCst)
    }

    pub fn is_handshaking(&self) -> bool {
        self.handshaking.load(Ordering::SeqCst)
    }

    /// Starts the handshake worker. A second call while a worker is
    /// running, or after completion, is a no-op.
    pub fn handshake(self: &Arc<Self>) {
        if self.is_handshake_complete() {
            return;
        }
        if self.handshaking.swap(true, Ordering::SeqCst) {
            return;
        }

        let handler = Arc::clone(self);
        tokio::spawn(async move {
            match handler.endpoint.handshake().await {
                Ok(transformers) => {
                    {
                        let mut t = handler.transformers.lock();
                        *t = Some(transformers);
                    }
                    handler.handshake_complete.store(true, Ordering::SeqCst);
                    log::info!("dtls handshake completed");
                }
                Err(err) => {
                    log::error!("dtls handshake failed: {err}");
                }
            }
            handler.handshaking.store(false, Ordering::SeqCst);
        });
    }

    pub fn encode_rtp(&self, packet: &[u8]) -> Option<Bytes> {
        self.with_transformers(|t| t.rtp_encoder.transform(packet))
    }

    pub fn decode_rtp(&self, packet: &[u8]) -> Option<Bytes> {
        self.with_transformers(|t| t.rtp_decoder.reverse_transform(packet))
    }

    pub fn encode_rtcp(&self, packet: &[u8]) -> Option<Bytes> {
        self.with_transformers(|t| t.rtcp_encoder.transform(packet))
    }

    pub fn decode_rtcp(&self, packet: &[u8]) -> Option<Bytes> {
        self.with_transformers(|t| t.rtcp_decoder.reverse_transform(packet))
    }

    fn with_transformers<F>(&self, f: F) -> Option<Bytes>
    where
        F: FnOnce(&SrtpTransformers) -> Option<Bytes>,
    {
        if !self.is_handshake_complete() {
            return None;
        }
        let transformers = self.transformers.lock();
        transformers.as_ref().and_then(f)
    }
}
