use bytes::Bytes;
use util::marshal::{Marshal, Unmarshal};

use super::*;
use crate::goodbye::Goodbye;
use crate::source_description::{SourceDescriptionChunk, SourceDescriptionItem};

// An RTCP packet from a packet dump
fn real_packet() -> Bytes {
    Bytes::from_static(&[
        // Receiver Report (offset=0)
        0x81, 0xc9, 0x00, 0x07, // v=2, p=0, count=1, RR, len=7
        0x90, 0x2f, 0x9e, 0x2e, // ssrc=0x902f9e2e
        0xbc, 0x5e, 0x9a, 0x40, // ssrc=0xbc5e9a40
        0x00, 0x00, 0x00, 0x00, // fracLost=0, totalLost=0
        0x00, 0x00, 0x46, 0xe1, // lastSeq=0x46e1
        0x00, 0x00, 0x01, 0x11, // jitter=273
        0x09, 0xf3, 0x64, 0x32, // lsr=0x9f36432
        0x00, 0x02, 0x4a, 0x79, // delay=150137
        // Source Description (offset=32)
        0x81, 0xca, 0x00, 0x0c, // v=2, p=0, count=1, SDES, len=12
        0x90, 0x2f, 0x9e, 0x2e, // ssrc=0x902f9e2e
        0x01, 0x26, // CNAME, len=38
        0x7b, 0x39, 0x63, 0x30, 0x30, 0x65, 0x62, 0x39, 0x32, 0x2d, 0x31, 0x61, 0x66,
        0x62, 0x2d, 0x39, 0x64, 0x34, 0x39, 0x2d, 0x61, 0x34, 0x37, 0x64, 0x2d, 0x39,
        0x31, 0x66, 0x36, 0x34, 0x65, 0x65, 0x65, 0x36, 0x39, 0x66, 0x35, 0x7d, // text
        0x00, 0x00, 0x00, 0x00, // END + padding
    ])
}

#[test]
fn test_compound_packet_unmarshal() {
    let mut data = real_packet();
    let compound = CompoundPacket::unmarshal(&mut data).expect("unmarshal");

    assert_eq!(compound.0.len(), 2);
    assert_eq!(
        compound.cname().expect("cname"),
        Bytes::from_static(b"{9c00eb92-1afb-9d49-a47d-91f64eee69f5}")
    );
    assert_eq!(compound.destination_ssrc(), vec![0xbc5e9a40]);
    assert!(!compound.has_goodbye());
}

#[test]
fn test_compound_packet_validate() {
    let cname = SourceDescription::with_cname(1234, Bytes::from_static(b"cname"));

    let tests: Vec<(&str, CompoundPacket, Option<Error>)> = vec![
        (
            "empty",
            CompoundPacket(vec![]),
            Some(Error::EmptyCompound),
        ),
        (
            "no cname",
            CompoundPacket(vec![Box::<SenderReport>::default()]),
            Some(Error::MissingCname),
        ),
        (
            "just bye",
            CompoundPacket(vec![Box::<Goodbye>::default()]),
            Some(Error::BadFirstPacket),
        ),
        (
            "sdes missing cname",
            CompoundPacket(vec![
                Box::<SenderReport>::default(),
                Box::new(SourceDescription {
                    chunks: vec![SourceDescriptionChunk {
                        source: 1234,
                        items: vec![SourceDescriptionItem {
                            sdes_type: SdesType::SdesNote,
                            text: Bytes::from_static(b"not a cname"),
                        }],
                    }],
                }),
            ]),
            Some(Error::MissingCname),
        ),
        (
            "bad first packet",
            CompoundPacket(vec![
                Box::new(cname.clone()),
                Box::<SenderReport>::default(),
            ]),
            Some(Error::BadFirstPacket),
        ),
        (
            "good compound",
            CompoundPacket(vec![
                Box::<SenderReport>::default(),
                Box::new(cname.clone()),
            ]),
            None,
        ),
        (
            "rr and bye",
            CompoundPacket(vec![
                Box::<ReceiverReport>::default(),
                Box::new(cname.clone()),
                Box::<Goodbye>::default(),
            ]),
            None,
        ),
        (
            "multiple rrs",
            CompoundPacket(vec![
                Box::<ReceiverReport>::default(),
                Box::<ReceiverReport>::default(),
                Box::new(cname),
            ]),
            None,
        ),
    ];

    for (name, compound, want_error) in tests {
        let result = compound.validate();
        assert_eq!(
            result.is_err(),
            want_error.is_some(),
            "Validate {name}: err = {result:?}, want {want_error:?}"
        );
        if let Some(err) = want_error {
            assert_eq!(err, result.err().unwrap(), "Validate {name}");
        }
    }
}

#[test]
fn test_compound_packet_roundtrip() {
    let compound = CompoundPacket(vec![
        Box::<ReceiverReport>::default(),
        Box::new(SourceDescription::with_cname(
            1234,
            Bytes::from_static(b"cname"),
        )),
        Box::new(Goodbye {
            sources: vec![1234],
            reason: Bytes::from_static(b"end call"),
        }),
    ]);

    let mut data = compound.marshal().expect("marshal");
    let decoded = CompoundPacket::unmarshal(&mut data).expect("unmarshal");

    assert_eq!(decoded, compound);
    assert!(decoded.has_goodbye());
    assert_eq!(decoded.cname().expect("cname"), Bytes::from_static(b"cname"));
}

#[test]
fn test_compound_packet_invalid_marshal() {
    // a compound without the mandatory SDES must refuse to marshal
    let compound = CompoundPacket(vec![Box::<ReceiverReport>::default()]);
    let got_err = compound.marshal().err().unwrap();
    assert_eq!(Error::MissingCname, got_err);
}
