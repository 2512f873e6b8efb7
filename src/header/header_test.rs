use bytes::Bytes;
use util::marshal::{Marshal, Unmarshal};

use super::*;

#[test]
fn test_header_unmarshal() {
    let tests = vec![
        (
            "valid",
            Bytes::from_static(&[
                0x81, 0xc9, 0x00, 0x07, // v=2, p=0, count=1, RR, len=7
            ]),
            Header {
                padding: false,
                count: 1,
                packet_type: PacketType::ReceiverReport,
                length: 7,
            },
            None,
        ),
        (
            "also valid",
            Bytes::from_static(&[
                0x9d, 0xc9, 0x00, 0x04, // v=2, p=1, count=29, RR, len=4
            ]),
            Header {
                padding: true,
                count: 29,
                packet_type: PacketType::ReceiverReport,
                length: 4,
            },
            None,
        ),
        (
            "bad version",
            Bytes::from_static(&[
                0x00, 0xc9, 0x00, 0x04, // v=0, p=0, count=0, RR, len=4
            ]),
            Header::default(),
            Some(Error::BadVersion),
        ),
        (
            "unknown type kept as unsupported",
            Bytes::from_static(&[
                0x81, 0xd0, 0x00, 0x00, // v=2, p=0, count=1, PT=208, len=0
            ]),
            Header {
                padding: false,
                count: 1,
                packet_type: PacketType::Unsupported,
                length: 0,
            },
            None,
        ),
        (
            "too short",
            Bytes::from_static(&[0x80]),
            Header::default(),
            Some(Error::PacketTooShort),
        ),
    ];

    for (name, mut data, want, want_error) in tests {
        let got = Header::unmarshal(&mut data);

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
fn test_header_roundtrip() {
    let tests = vec![
        (
            "valid",
            Header {
                padding: true,
                count: 31,
                packet_type: PacketType::SenderReport,
                length: 4,
            },
            None,
        ),
        (
            "also valid",
            Header {
                padding: false,
                count: 28,
                packet_type: PacketType::ReceiverReport,
                length: 65535,
            },
            None,
        ),
        (
            "invalid count",
            Header {
                padding: false,
                count: 40,
                packet_type: PacketType::SenderReport,
                length: 0,
            },
            Some(Error::InvalidHeader),
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

            let actual = Header::unmarshal(&mut data)
                .unwrap_or_else(|_| panic!("Unmarshal {name}"));

            assert_eq!(
                actual, want,
                "{name} round trip: got {actual:?}, want {want:?}"
            );
        }
    }
}
