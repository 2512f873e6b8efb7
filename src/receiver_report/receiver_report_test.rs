use bytes::Bytes;
use util::marshal::{Marshal, Unmarshal};

use super::*;

#[test]
fn test_receiver_report_unmarshal() {
    let tests = vec![
        (
            "valid",
            Bytes::from_static(&[
                0x81, 0xc9, 0x00, 0x07, // v=2, p=0, count=1, RR, len=7
                0x90, 0x2f, 0x9e, 0x2e, // ssrc=0x902f9e2e
                0xbc, 0x5e, 0x9a, 0x40, // ssrc=0xbc5e9a40
                0x00, 0x00, 0x00, 0x00, // fracLost=0, totalLost=0
                0x00, 0x00, 0x46, 0xe1, // lastSeq=0x46e1
                0x00, 0x00, 0x01, 0x11, // jitter=273
                0x09, 0xf3, 0x64, 0x32, // lsr=0x9f36432
                0x00, 0x02, 0x4a, 0x79, // delay=150137
            ]),
            ReceiverReport {
                ssrc: 0x902f9e2e,
                reports: vec![ReceptionReport {
                    ssrc: 0xbc5e9a40,
                    fraction_lost: 0,
                    total_lost: 0,
                    last_sequence_number: 0x46e1,
                    jitter: 273,
                    last_sender_report: 0x9f36432,
                    delay: 150137,
                }],
            },
            None,
        ),
        (
            "valid empty",
            Bytes::from_static(&[
                0x80, 0xc9, 0x00, 0x01, // v=2, p=0, count=0, RR, len=1
                0x90, 0x2f, 0x9e, 0x2e, // ssrc=0x902f9e2e
            ]),
            ReceiverReport {
                ssrc: 0x902f9e2e,
                reports: vec![],
            },
            None,
        ),
        (
            "wrong type",
            Bytes::from_static(&[
                0x80, 0xc8, 0x00, 0x01, // v=2, p=0, count=0, SR, len=1
                0x90, 0x2f, 0x9e, 0x2e, // ssrc=0x902f9e2e
            ]),
            ReceiverReport::default(),
            Some(Error::WrongType),
        ),
        (
            "bad count in header",
            Bytes::from_static(&[
                0x82, 0xc9, 0x00, 0x01, // v=2, p=0, count=2, RR, len=1
                0x90, 0x2f, 0x9e, 0x2e, // ssrc=0x902f9e2e
            ]),
            ReceiverReport::default(),
            Some(Error::PacketTooShort),
        ),
        (
            "nil",
            Bytes::from_static(&[]),
            ReceiverReport::default(),
            Some(Error::PacketTooShort),
        ),
    ];

    for (name, mut data, want, want_error) in tests {
        let got = ReceiverReport::unmarshal(&mut data);

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
fn test_receiver_report_roundtrip() {
    let report = ReceiverReport {
        ssrc: 0x902f9e2e,
        reports: vec![
            ReceptionReport {
                ssrc: 0xc8f9a0e0,
                fraction_lost: 24,
                total_lost: 3,
                last_sequence_number: 230,
                jitter: 95,
                last_sender_report: 42,
                delay: 23,
            },
            ReceptionReport::default(),
        ],
    };

    let mut data = report.marshal().expect("marshal");
    let decoded = ReceiverReport::unmarshal(&mut data).expect("unmarshal");
    assert_eq!(decoded, report);
}

#[test]
fn test_receiver_report_too_many_reports() {
    let report = ReceiverReport {
        reports: vec![ReceptionReport::default(); COUNT_MAX + 1],
        ..Default::default()
    };
    let got_err = report.marshal().err().unwrap();
    assert_eq!(Error::TooManyReports, got_err);
}
