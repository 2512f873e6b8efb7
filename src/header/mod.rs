#[cfg(test)]
mod header_test;

use std::fmt;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;

type Result<T> = std::result::Result<T, util::Error>;

/// PacketType is the RTCP packet type carried in the common header.
/// Only the RFC 3550 core types are interpreted by this session; see
/// <https://www.iana.org/assignments/rtp-parameters/rtp-parameters.xhtml#rtp-parameters-4>
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum PacketType {
    #[default]
    Unsupported = 0,
    SenderReport = 200,       // RFC 3550, 6.4.1
    ReceiverReport = 201,     // RFC 3550, 6.4.2
    SourceDescription = 202,  // RFC 3550, 6.5
    Goodbye = 203,            // RFC 3550, 6.6
    ApplicationDefined = 204, // RFC 3550, 6.7
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PacketType::Unsupported => "Unsupported",
            PacketType::SenderReport => "SR",
            PacketType::ReceiverReport => "RR",
            PacketType::SourceDescription => "SDES",
            PacketType::Goodbye => "BYE",
            PacketType::ApplicationDefined => "APP",
        };
        write!(f, "{s}")
    }
}

impl From<u8> for PacketType {
    fn from(b: u8) -> Self {
        match b {
            200 => PacketType::SenderReport,
            201 => PacketType::ReceiverReport,
            202 => PacketType::SourceDescription,
            203 => PacketType::Goodbye,
            204 => PacketType::ApplicationDefined,
            _ => PacketType::Unsupported,
        }
    }
}

pub(crate) const RTP_VERSION: u8 = 2;

const VERSION_SHIFT: u8 = 6;
const VERSION_MASK: u8 = 0x3;
const PADDING_SHIFT: u8 = 5;
const PADDING_MASK: u8 = 0x1;
const COUNT_SHIFT: u8 = 0;
const COUNT_MASK: u8 = 0x1f;

pub(crate) const HEADER_LENGTH: usize = 4;
pub(crate) const COUNT_MAX: usize = (1 << 5) - 1;
pub(crate) const SSRC_LENGTH: usize = 4;

/// A Header is the common header shared by all RTCP packets.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct Header {
    /// When set, this individual RTCP packet ends with padding octets
    /// that are counted in the length field but carry no information.
    pub padding: bool,
    /// The number of reception reports, chunks or sources contained in
    /// this packet (meaning depends on the packet type).
    pub count: u8,
    /// The RTCP packet type for this packet.
    pub packet_type: PacketType,
    /// The length of this RTCP packet in 32-bit words minus one,
    /// including the header and any padding.
    pub length: u16,
}

impl MarshalSize for Header {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH
    }
}

impl Marshal for Header {
    /// Marshal encodes the Header in binary
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.remaining_mut() < HEADER_LENGTH {
            return Err(Error::BufferTooShort.into());
        }
        if self.count > COUNT_MAX as u8 {
            return Err(Error::InvalidHeader.into());
        }

        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |V=2|P|    RC   |      PT       |             length            |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         */
        let mut b0 = RTP_VERSION << VERSION_SHIFT;
        if self.padding {
            b0 |= 1 << PADDING_SHIFT;
        }
        b0 |= self.count << COUNT_SHIFT;

        buf.put_u8(b0);
        buf.put_u8(self.packet_type as u8);
        buf.put_u16(self.length);

        Ok(HEADER_LENGTH)
    }
}

impl Unmarshal for Header {
    /// Unmarshal decodes the Header from binary
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if raw_packet.remaining() < HEADER_LENGTH {
            return Err(Error::PacketTooShort.into());
        }

        let b0 = raw_packet.get_u8();
        let version = (b0 >> VERSION_SHIFT) & VERSION_MASK;
        if version != RTP_VERSION {
            return Err(Error::BadVersion.into());
        }

        let padding = ((b0 >> PADDING_SHIFT) & PADDING_MASK) > 0;
        let count = (b0 >> COUNT_SHIFT) & COUNT_MASK;
        let packet_type: PacketType = raw_packet.get_u8().into();
        let length = raw_packet.get_u16();

        Ok(Header {
            padding,
            count,
            packet_type,
            length,
        })
    }
}
