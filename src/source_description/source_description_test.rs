use util::marshal::{Marshal, Unmarshal};

use super::*;

#[test]
fn test_source_description_unmarshal() {
    let tests = vec![
        (
            "nil",
            Bytes::from_static(&[]),
            SourceDescription::default(),
            Some(Error::PacketTooShort),
        ),
        (
            "no chunks",
            Bytes::from_static(&[
                0x80, 0xca, 0x00, 0x00, // v=2, p=0, count=0, SDES, len=0
            ]),
            SourceDescription::default(),
            None,
        ),
        (
            "missing type",
            Bytes::from_static(&[
                0x81, 0xca, 0x00, 0x01, // v=2, p=0, count=1, SDES, len=1
                0x00, 0x00, 0x00, 0x00, // ssrc=0
            ]),
            SourceDescription::default(),
            Some(Error::PacketTooShort),
        ),
        (
            "cname",
            Bytes::from_static(&[
                0x81, 0xca, 0x00, 0x02, // v=2, p=0, count=1, SDES, len=2
                0x00, 0x00, 0x00, 0x00, // ssrc=0
                0x01, 0x01, 0x41, 0x00, // CNAME, len=1, text=A, END
            ]),
            SourceDescription {
                chunks: vec![SourceDescriptionChunk {
                    source: 0,
                    items: vec![SourceDescriptionItem {
                        sdes_type: SdesType::SdesCname,
                        text: Bytes::from_static(b"A"),
                    }],
                }],
            },
            None,
        ),
        (
            "wrong type",
            Bytes::from_static(&[
                0x81, 0xc9, 0x00, 0x02, // v=2, p=0, count=1, RR, len=2
                0x00, 0x00, 0x00, 0x00, // ssrc=0
                0x01, 0x01, 0x41, 0x00, // CNAME, len=1, text=A, END
            ]),
            SourceDescription::default(),
            Some(Error::WrongType),
        ),
        (
            "bad count in header",
            Bytes::from_static(&[
                0x81, 0xca, 0x00, 0x00, // v=2, p=0, count=1, SDES, len=0
            ]),
            SourceDescription::default(),
            Some(Error::InvalidHeader),
        ),
    ];

    for (name, mut data, want, want_error) in tests {
        let got = SourceDescription::unmarshal(&mut data);

        assert_eq!(
            got.is_err(),
            want_error.is_some(),
            "Unmarshal {name}: err = {got:?}, want {want_error:?}"
        );

        if let Some(err) = want_error {
            let got_err = got.err().unwrap();
            assert_eq!(
                err, got_err,
                "Unmarshal {name}: err = {got_err:?}, want {err:?}"
            );
        } else {
            let actual = got.unwrap();
            assert_eq!(
                actual, want,
                "Unmarshal {name}: got {actual:?}, want {want:?}"
            );
        }
    }
}

#[test]
fn test_source_description_roundtrip() {
    let tests = vec![
        (
            "valid",
            SourceDescription {
                chunks: vec![
                    SourceDescriptionChunk {
                        source: 1,
                        items: vec![SourceDescriptionItem {
                            sdes_type: SdesType::SdesCname,
                            text: Bytes::from_static(b"test@example.com"),
                        }],
                    },
                    SourceDescriptionChunk {
                        source: 2,
                        items: vec![
                            SourceDescriptionItem {
                                sdes_type: SdesType::SdesNote,
                                text: Bytes::from_static(b"some note"),
                            },
                            SourceDescriptionItem {
                                sdes_type: SdesType::SdesNote,
                                text: Bytes::from_static(b"another note"),
                            },
                        ],
                    },
                ],
            },
            None,
        ),
        (
            "item without type",
            SourceDescription {
                chunks: vec![SourceDescriptionChunk {
                    source: 1,
                    items: vec![SourceDescriptionItem {
                        sdes_type: SdesType::SdesEnd,
                        text: Bytes::from_static(b"test@example.com"),
                    }],
                }],
            },
            Some(Error::SdesMissingType),
        ),
        (
            "zero items",
            SourceDescription {
                chunks: vec![SourceDescriptionChunk {
                    source: 1,
                    items: vec![],
                }],
            },
            None,
        ),
        (
            "with cname helper",
            SourceDescription::with_cname(0x902f9e2e, Bytes::from_static(b"cname")),
            None,
        ),
    ];

    for (name, want, want_error) in tests {
        let got = want.marshal();

        assert_eq!(
            got.is_err(),
            want_error.is_some(),
            "Marshal {name}: err = {got:?}, want {want_error:?}"
        );

        if let Some(err) = want_error {
            let got_err = got.err().unwrap();
            assert_eq!(
                err, got_err,
                "Marshal {name}: err = {got_err:?}, want {err:?}"
            );
        } else {
            let mut data = got.ok().unwrap();
            let actual = SourceDescription::unmarshal(&mut data)
                .unwrap_or_else(|_| panic!("Unmarshal {name}"));

            assert_eq!(
                actual, want,
                "{name} round trip: got {actual:?}, want {want:?}"
            );
        }
    }
}
