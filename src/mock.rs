use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;

use crate::clock::Clock;
use crate::dtls::{DtlsEndpoint, PacketTransformer, SrtpTransformers};
use crate::error::{Error, Result};
use crate::ntp;

/// MockClock replaces the host clock so tests control session time.
pub struct MockClock {
    now_ms: AtomicU64,
}

impl MockClock {
    pub fn new(start_ms: u64) -> Self {
        MockClock {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    /// set_now pins the current time.
    pub fn set_now(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }

    /// advance moves the clock forward by `d`.
    pub fn advance(&self, d: Duration) {
        self.now_ms
            .fetch_add(d.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn current_time(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn ntp_time(&self) -> u64 {
        ntp::ntp_time(UNIX_EPOCH + Duration::from_millis(self.current_time()))
    }
}

/// XorTransformer is a stand-in SRTP/SRTCP transform: it flips every
/// byte, so protected output is never byte-identical to the plaintext
/// and the reverse transform restores it.
pub struct XorTransformer(pub u8);

impl PacketTransformer for XorTransformer {
    fn transform(&self, packet: &[u8]) -> Option<Bytes> {
        let out: Vec<u8> = packet.iter().map(|b| b ^ self.0).collect();
        Some(Bytes::from(out))
    }

    fn reverse_transform(&self, packet: &[u8]) -> Option<Bytes> {
        self.transform(packet)
    }
}

pub fn xor_transformers(key: u8) -> SrtpTransformers {
    SrtpTransformers {
        rtp_encoder: Arc::new(XorTransformer(key)),
        rtp_decoder: Arc::new(XorTransformer(key)),
        rtcp_encoder: Arc::new(XorTransformer(key)),
        rtcp_decoder: Arc::new(XorTransformer(key)),
    }
}

/// MockDtlsEndpoint finishes (or refuses) a handshake after `delay` and
/// hands out [`xor_transformers`] with key `0xff`.
pub struct MockDtlsEndpoint {
    pub delay: Duration,
    pub fail: bool,
}

#[async_trait]
impl DtlsEndpoint for MockDtlsEndpoint {
    async fn handshake(&self) -> Result<SrtpTransformers> {
        tokio::time::sleep(self.delay).await;
        if self.fail {
            Err(Error::Other("handshake refused".to_owned()))
        } else {
            Ok(xor_transformers(0xff))
        }
    }
}

/// PendingDtlsEndpoint never completes its handshake.
pub struct PendingDtlsEndpoint;

#[async_trait]
impl DtlsEndpoint for PendingDtlsEndpoint {
    async fn handshake(&self) -> Result<SrtpTransformers> {
        loop {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
}
