use std::any::Any;
use std::fmt;

use bytes::{Buf, Bytes, BytesMut};
use util::marshal::{Marshal, Unmarshal};

use crate::error::Error;
use crate::goodbye::Goodbye;
use crate::header::{Header, PacketType, HEADER_LENGTH};
use crate::raw_packet::RawPacket;
use crate::receiver_report::ReceiverReport;
use crate::sender_report::SenderReport;
use crate::source_description::SourceDescription;

type Result<T> = std::result::Result<T, util::Error>;

/// Packet represents an RTCP packet, a protocol used for out-of-band
/// statistics and control information for an RTP session.
pub trait Packet: Marshal + fmt::Display + fmt::Debug + Send + Sync {
    fn header(&self) -> Header;
    fn destination_ssrc(&self) -> Vec<u32>;
    fn raw_size(&self) -> usize;
    fn as_any(&self) -> &(dyn Any + Send + Sync);
    fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool;
    fn cloned(&self) -> Box<dyn Packet + Send + Sync>;
}

impl PartialEq for dyn Packet + Send + Sync {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl Clone for Box<dyn Packet + Send + Sync> {
    fn clone(&self) -> Self {
        self.cloned()
    }
}

/// Marshal serializes a sequence of packets into a single datagram body.
pub fn marshal(packets: &[Box<dyn Packet + Send + Sync>]) -> Result<Bytes> {
    let mut out = BytesMut::new();
    for p in packets {
        let data = p.marshal()?;
        out.extend_from_slice(&data);
    }
    Ok(out.freeze())
}

/// Unmarshal takes an entire udp datagram (which may consist of multiple
/// RTCP packets) and returns the unmarshaled packets it contains.
pub fn unmarshal<B>(raw_data: &mut B) -> Result<Vec<Box<dyn Packet + Send + Sync>>>
where
    B: Buf,
{
    let mut packets = vec![];

    while raw_data.has_remaining() {
        let p = unmarshaller(raw_data)?;
        packets.push(p);
    }

    match packets.len() {
        // Empty packet
        0 => Err(Error::InvalidHeader.into()),

        // Multiple packets
        _ => Ok(packets),
    }
}

/// unmarshaller pulls the leading RTCP sub-packet from the buffer, walking
/// the declared length so the sub-packet boundaries must sum to the
/// datagram length.
fn unmarshaller<B>(raw_data: &mut B) -> Result<Box<dyn Packet + Send + Sync>>
where
    B: Buf,
{
    if raw_data.remaining() < HEADER_LENGTH {
        return Err(Error::PacketTooShort.into());
    }

    let mut peek = &raw_data.chunk()[..HEADER_LENGTH];
    let header = Header::unmarshal(&mut peek)?;

    let bytes_len = (header.length as usize + 1) * 4;
    if bytes_len > raw_data.remaining() {
        return Err(Error::PacketTooShort.into());
    }

    let mut in_packet = raw_data.copy_to_bytes(bytes_len);

    let p: Box<dyn Packet + Send + Sync> = match header.packet_type {
        PacketType::SenderReport => Box::new(SenderReport::unmarshal(&mut in_packet)?),
        PacketType::ReceiverReport => Box::new(ReceiverReport::unmarshal(&mut in_packet)?),
        PacketType::SourceDescription => Box::new(SourceDescription::unmarshal(&mut in_packet)?),
        PacketType::Goodbye => Box::new(Goodbye::unmarshal(&mut in_packet)?),
        PacketType::ApplicationDefined => Box::new(RawPacket::unmarshal(&mut in_packet)?),
        _ => {
            log::warn!(
                "skipping unsupported rtcp packet type {}",
                header.packet_type as u8
            );
            Box::new(RawPacket::unmarshal(&mut in_packet)?)
        }
    };

    Ok(p)
}
