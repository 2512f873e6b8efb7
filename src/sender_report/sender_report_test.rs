use bytes::Bytes;
use util::marshal::{Marshal, Unmarshal};

use super::*;

#[test]
fn test_sender_report_unmarshal() {
    let tests = vec![
        (
            "nil",
            Bytes::from_static(&[]),
            SenderReport::default(),
            Some(Error::PacketTooShort),
        ),
        (
            "valid",
            Bytes::from_static(&[
                0x81, 0xc8, 0x00, 0x0c, // v=2, p=0, count=1, SR, len=12
                0x90, 0x2f, 0x9e, 0x2e, // ssrc=0x902f9e2e
                0xda, 0x8b, 0xd1, 0xfc, 0xdd, 0xdd, 0xa0, 0x5a, // ntp
                0xaa, 0xf4, 0xed, 0xd5, // rtp=0xaaf4edd5
                0x00, 0x00, 0x00, 0x01, // packetCount=1
                0x00, 0x00, 0x00, 0x02, // octetCount=2
                0xbc, 0x5e, 0x9a, 0x40, // ssrc=0xbc5e9a40
                0x00, 0x00, 0x00, 0x00, // fracLost=0, totalLost=0
                0x00, 0x00, 0x46, 0xe1, // lastSeq=0x46e1
                0x00, 0x00, 0x01, 0x11, // jitter=273
                0x09, 0xf3, 0x64, 0x32, // lsr=0x9f36432
                0x00, 0x02, 0x4a, 0x79, // delay=150137
            ]),
            SenderReport {
                ssrc: 0x902f9e2e,
                ntp_time: 0xda8bd1fcdddda05a,
                rtp_time: 0xaaf4edd5,
                packet_count: 1,
                octet_count: 2,
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
            "wrong type",
            Bytes::from_static(&[
                0x80, 0xc9, 0x00, 0x06, // v=2, p=0, count=0, RR, len=6
                0x90, 0x2f, 0x9e, 0x2e, // ssrc=0x902f9e2e
                0xda, 0x8b, 0xd1, 0xfc, 0xdd, 0xdd, 0xa0, 0x5a, // ntp
                0xaa, 0xf4, 0xed, 0xd5, // rtp=0xaaf4edd5
                0x00, 0x00, 0x00, 0x01, // packetCount=1
                0x00, 0x00, 0x00, 0x02, // octetCount=2
            ]),
            SenderReport::default(),
            Some(Error::WrongType),
        ),
        (
            "bad count in header",
            Bytes::from_static(&[
                0x82, 0xc8, 0x00, 0x06, // v=2, p=0, count=2, SR, len=6
                0x90, 0x2f, 0x9e, 0x2e, // ssrc=0x902f9e2e
                0xda, 0x8b, 0xd1, 0xfc, 0xdd, 0xdd, 0xa0, 0x5a, // ntp
                0xaa, 0xf4, 0xed, 0xd5, // rtp=0xaaf4edd5
                0x00, 0x00, 0x00, 0x01, // packetCount=1
                0x00, 0x00, 0x00, 0x02, // octetCount=2
            ]),
            SenderReport::default(),
            Some(Error::PacketTooShort),
        ),
    ];

    for (name, mut data, want, want_error) in tests {
        let got = SenderReport::unmarshal(&mut data);

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
            let header = Header {
                padding: false,
                count: want.reports.len() as u8,
                packet_type: PacketType::SenderReport,
                length: 12,
            };
            assert_eq!(actual.header(), header, "Unmarshal {name} header mismatch");
        }
    }
}

#[test]
fn test_sender_report_roundtrip() {
    let report = SenderReport {
        ssrc: 0x902f9e2e,
        ntp_time: 0xda8bd1fcdddda05a,
        rtp_time: 0xaaf4edd5,
        packet_count: 70,
        octet_count: 4637,
        reports: vec![
            ReceptionReport {
                ssrc: 0xbc5e9a40,
                fraction_lost: 3,
                total_lost: 12,
                last_sequence_number: 0x46e1,
                jitter: 273,
                last_sender_report: 0x9f36432,
                delay: 150137,
            },
            ReceptionReport::default(),
        ],
    };

    let mut data = report.marshal().expect("marshal");
    let decoded = SenderReport::unmarshal(&mut data).expect("unmarshal");
    assert_eq!(decoded, report);
}

#[test]
fn test_sender_report_too_many_reports() {
    let report = SenderReport {
        reports: vec![ReceptionReport::default(); COUNT_MAX + 1],
        ..Default::default()
    };
    let got_err = report.marshal().err().unwrap();
    assert_eq!(Error::TooManyReports, got_err);
}
