#[cfg(test)]
mod compound_packet_test;

use std::any::Any;
use std::fmt;

use bytes::{Buf, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::goodbye::Goodbye;
use crate::header::Header;
use crate::packet::{self, Packet};
use crate::receiver_report::ReceiverReport;
use crate::sender_report::SenderReport;
use crate::source_description::{SdesType, SourceDescription};

type Result<T> = std::result::Result<T, util::Error>;

/// A CompoundPacket is a collection of RTCP packets transmitted as a
/// single datagram.
///
/// To maximize the resolution of reception statistics, the first packet
/// must always be a SenderReport or a ReceiverReport, even when the only
/// other packet in the compound is a Goodbye.
///
/// Next, a SourceDescription containing a CNAME item must be included to
/// identify the source. A Goodbye, if present, comes after it.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct CompoundPacket(pub Vec<Box<dyn Packet + Send + Sync>>);

impl fmt::Display for CompoundPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for p in &self.0 {
            out += p.to_string().as_str();
        }
        write!(f, "{out}")
    }
}

impl CompoundPacket {
    /// validate returns an error if this is not an RFC-compliant
    /// CompoundPacket.
    pub fn validate(&self) -> std::result::Result<(), Error> {
        if self.0.is_empty() {
            return Err(Error::EmptyCompound);
        }

        // SenderReport and ReceiverReport are the only types that
        // are allowed to be the first packet in a compound datagram.
        if self.0[0].as_any().downcast_ref::<SenderReport>().is_none()
            && self.0[0].as_any().downcast_ref::<ReceiverReport>().is_none()
        {
            return Err(Error::BadFirstPacket);
        }

        for pkt in &self.0[1..] {
            // If the number of reception reports exceeds 31, additional
            // ReceiverReports can precede the SourceDescription.
            if pkt.as_any().downcast_ref::<ReceiverReport>().is_some() {
                continue;
            }

            // A SourceDescription containing a CNAME must be included in
            // every CompoundPacket.
            if let Some(sdes) = pkt.as_any().downcast_ref::<SourceDescription>() {
                let has_cname = sdes.chunks.iter().any(|c| {
                    c.items
                        .iter()
                        .any(|it| it.sdes_type == SdesType::SdesCname)
                });

                if !has_cname {
                    return Err(Error::MissingCname);
                }

                return Ok(());
            }

            // Other packets are not permitted before the CNAME.
            return Err(Error::PacketBeforeCname);
        }

        // CNAME never reached
        Err(Error::MissingCname)
    }

    /// cname returns the CNAME that *must* be present in every
    /// CompoundPacket.
    pub fn cname(&self) -> std::result::Result<Bytes, Error> {
        if self.0.is_empty() {
            return Err(Error::EmptyCompound);
        }

        for pkt in &self.0[1..] {
            if let Some(sdes) = pkt.as_any().downcast_ref::<SourceDescription>() {
                for c in &sdes.chunks {
                    for it in &c.items {
                        if it.sdes_type == SdesType::SdesCname {
                            return Ok(it.text.clone());
                        }
                    }
                }
            } else if pkt.as_any().downcast_ref::<ReceiverReport>().is_none() {
                return Err(Error::PacketBeforeCname);
            }
        }

        Err(Error::MissingCname)
    }

    /// has_goodbye reports whether the compound carries a BYE sub-packet.
    pub fn has_goodbye(&self) -> bool {
        self.0
            .iter()
            .any(|p| p.as_any().downcast_ref::<Goodbye>().is_some())
    }

    /// destination_ssrc returns the synchronization sources associated
    /// with this CompoundPacket's reception report.
    pub fn destination_ssrc(&self) -> Vec<u32> {
        if self.0.is_empty() {
            vec![]
        } else {
            self.0[0].destination_ssrc()
        }
    }
}

impl Packet for CompoundPacket {
    fn header(&self) -> Header {
        if self.0.is_empty() {
            Header::default()
        } else {
            self.0[0].header()
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        CompoundPacket::destination_ssrc(self)
    }

    fn raw_size(&self) -> usize {
        self.0.iter().map(|p| p.marshal_size()).sum()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool {
        other
            .as_any()
            .downcast_ref::<CompoundPacket>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet + Send + Sync> {
        Box::new(self.clone())
    }
}

impl MarshalSize for CompoundPacket {
    fn marshal_size(&self) -> usize {
        self.raw_size()
    }
}

impl Marshal for CompoundPacket {
    /// Marshal encodes the CompoundPacket as binary.
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        self.validate()?;

        for p in &self.0 {
            let n = p.marshal_to(buf)?;
            buf = &mut buf[n..];
        }

        Ok(self.marshal_size())
    }
}

impl Unmarshal for CompoundPacket {
    /// Unmarshal decodes a CompoundPacket from binary and checks its
    /// composition rules.
    fn unmarshal<B>(raw_data: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let packets = packet::unmarshal(raw_data)?;
        let c = CompoundPacket(packets);
        c.validate()?;
        Ok(c)
    }
}
