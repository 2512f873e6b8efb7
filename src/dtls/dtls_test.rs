use std::time::Duration;

use super::*;
use crate::mock::MockDtlsEndpoint;

#[tokio::test]
async fn test_handshake_success_flags() {
    let handler = Arc::new(DtlsHandler::new(Arc::new(MockDtlsEndpoint {
        delay: Duration::from_millis(20),
        fail: false,
    })));

    assert!(!handler.is_handshake_complete());
    assert!(!handler.is_handshaking());

    handler.handshake();
    assert!(handler.is_handshaking());
    assert!(handler.encode_rtcp(b"data").is_none());

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(handler.is_handshake_complete());
    assert!(!handler.is_handshaking());

    let encoded = handler.encode_rtcp(&[0x81, 0xc9]).expect("encode");
    assert_eq!(&encoded[..], &[0x81 ^ 0xff, 0xc9 ^ 0xff]);
    let decoded = handler.decode_rtcp(&encoded).expect("decode");
    assert_eq!(&decoded[..], &[0x81, 0xc9]);

    // the RTP-plane transformers come from the same keying material
    let rtp = handler.encode_rtp(&[0x80, 0x00]).expect("encode rtp");
    assert_eq!(&handler.decode_rtp(&rtp).expect("decode rtp")[..], &[0x80, 0x00]);
}

#[tokio::test]
async fn test_handshake_failure_keeps_gate_closed() {
    let handler = Arc::new(DtlsHandler::new(Arc::new(MockDtlsEndpoint {
        delay: Duration::from_millis(10),
        fail: true,
    })));

    handler.handshake();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!handler.is_handshake_complete());
    assert!(!handler.is_handshaking());
    assert!(handler.encode_rtcp(b"data").is_none());
    assert!(handler.decode_rtcp(b"data").is_none());
}

#[tokio::test]
async fn test_handshake_idempotent() {
    let handler = Arc::new(DtlsHandler::new(Arc::new(MockDtlsEndpoint {
        delay: Duration::from_millis(10),
        fail: false,
    })));

    handler.handshake();
    handler.handshake();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(handler.is_handshake_complete());

    // restarting after completion changes nothing
    handler.handshake();
    assert!(!handler.is_handshaking());
}
