use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::{Header, HEADER_LENGTH};
use crate::packet::Packet;

type Result<T> = std::result::Result<T, util::Error>;

/// RawPacket carries an RTCP sub-packet the session does not interpret
/// (APP, or a type outside 200..=204) so compound decoding can continue.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct RawPacket(pub Bytes);

impl fmt::Display for RawPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawPacket: {self:?}")
    }
}

impl Packet for RawPacket {
    fn header(&self) -> Header {
        let mut buf = self.0.clone();
        Header::unmarshal(&mut buf).unwrap_or_default()
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![]
    }

    fn raw_size(&self) -> usize {
        self.0.len()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool {
        other
            .as_any()
            .downcast_ref::<RawPacket>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet + Send + Sync> {
        Box::new(self.clone())
    }
}

impl MarshalSize for RawPacket {
    fn marshal_size(&self) -> usize {
        self.raw_size()
    }
}

impl Marshal for RawPacket {
    /// Marshal copies the raw sub-packet verbatim
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.remaining_mut() < self.0.len() {
            return Err(Error::BufferTooShort.into());
        }
        buf.put(self.0.clone());
        Ok(self.0.len())
    }
}

impl Unmarshal for RawPacket {
    /// Unmarshal keeps the sub-packet bytes after validating the header
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let len = raw_packet.remaining();
        if len < HEADER_LENGTH {
            return Err(Error::PacketTooShort.into());
        }

        let bytes = raw_packet.copy_to_bytes(len);
        let mut header_buf = bytes.clone();
        Header::unmarshal(&mut header_buf)?;

        Ok(RawPacket(bytes))
    }
}
