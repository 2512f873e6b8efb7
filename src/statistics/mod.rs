
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use util::marshal::MarshalSize;

use crate::clock::Clock;
use crate::compound_packet::CompoundPacket;
use crate::goodbye::Goodbye;
use crate::ntp;
use crate::packet::Packet;
use crate::receiver_report::ReceiverReport;
use crate::reception_report::ReceptionReport;
use crate::sender_report::SenderReport;
use crate::source_description::SourceDescription;

/// Fraction of the session bandwidth allotted to RTCP.
pub const RTCP_BW_FRACTION: f64 = 0.05;

/// Share of the RTCP bandwidth reserved for active senders when they are
/// fewer than a quarter of the membership.
const RTCP_SENDER_BW_FRACTION: f64 = 0.25;
const RTCP_RECEIVER_BW_FRACTION: f64 = 1.0 - RTCP_SENDER_BW_FRACTION;

/// Minimum deterministic interval in seconds, halved to
/// [`INITIAL_RTCP_MIN_TIME`] before the first transmission.
const RTCP_MIN_TIME: f64 = 2.5;
const INITIAL_RTCP_MIN_TIME: f64 = 0.5;

/// Divisor that compensates for the fact that the randomized timer is
/// reconsidered instead of fired unconditionally (e - 3/2).
const COMPENSATION: f64 = std::f64::consts::E - 1.5;

/// Probable size of the first compound packet the session will build.
const DEFAULT_AVG_RTCP_SIZE: f64 = 200.0;

/// Report intervals without RTP activity before a sender is demoted.
const SENDER_TIMEOUT_INTERVALS: u64 = 2;

/// Deterministic intervals without any activity before a member is
/// evicted.
const MEMBER_TIMEOUT_INTERVALS: u64 = 5;

/// The two packet classes the transmission scheduler emits.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum RtcpPacketType {
    /// An SR or RR compound, chosen by `we_sent` when it is built.
    #[default]
    Report,
    /// The leave announcement.
    Bye,
}

impl fmt::Display for RtcpPacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RtcpPacketType::Report => "RTCP REPORT",
            RtcpPacketType::Bye => "RTCP BYE",
        };
        write!(f, "{s}")
    }
}

/// Per-source state for every participant the session has heard from,
/// local SSRC included.
#[derive(Debug, Default, Clone)]
pub(crate) struct MemberEntry {
    /// Last time (clock ms) any RTP or RTCP activity was seen.
    pub(crate) last_seen: u64,
    /// Last time RTP data was seen; drives the sender timeout.
    pub(crate) last_rtp_seen: u64,
    pub(crate) is_sender: bool,

    // RTP reception state feeding the report blocks
    started: bool,
    base_seq: u16,
    max_seq: u16,
    seq_cycles: u32,
    received: u32,
    transit: i64,
    pub(crate) jitter: f64,
    pub(crate) cumulative_loss: u32,
    expected_prior: u32,
    received_prior: u32,

    /// Full 64-bit NTP timestamp of the last SR from this source.
    pub(crate) last_sr_ntp: u64,
    /// Clock ms when that SR arrived; drives the DLSR field.
    pub(crate) last_sr_recv_time: u64,

    /// What this participant last reported about the local stream.
    pub(crate) reported_jitter: u32,
    pub(crate) reported_loss: u32,
}

impl MemberEntry {
    fn update_seq(&mut self, seq: u16) {
        if !self.started {
            self.started = true;
            self.base_seq = seq;
            self.max_seq = seq;
            self.received = 1;
            return;
        }

        self.received = self.received.wrapping_add(1);

        let diff = seq as i32 - self.max_seq as i32;
        if diff > 0 {
            self.max_seq = seq;
        } else if diff < -0x0FFF {
            // wrapped around
            self.seq_cycles += 1;
            self.max_seq = seq;
        }
    }

    /// RFC 3550 A.8 interarrival jitter, in timestamp units.
    fn update_jitter(&mut self, arrival_units: i64, rtp_timestamp: u32) {
        let transit = arrival_units - rtp_timestamp as i64;
        if self.transit != 0 {
            let d = (transit - self.transit).abs() as f64;
            self.jitter += (d - self.jitter) / 16.0;
        }
        self.transit = transit;
    }

    fn extended_seq(&self) -> u32 {
        (self.seq_cycles << 16) | self.max_seq as u32
    }

    fn expected(&self) -> u32 {
        self.extended_seq().wrapping_sub(self.base_seq as u32).wrapping_add(1)
    }
}

/// RtpStatistics keeps the session-wide state the RFC 3550 transmission
/// algorithm feeds on: the member table, sender set, `we_sent`, the
/// smoothed compound size, and the bandwidth split. It is also the
/// factory for the compounds the scheduler emits, since it owns all the
/// numbers that go into them.
pub struct RtpStatistics {
    clock: Arc<dyn Clock>,

    ssrc: u32,
    cname: Bytes,
    clock_rate: u32,

    /// Target RTCP bandwidth, bits per second.
    rtcp_bw: f64,
    /// EWMA (weight 1/16) over compound sizes in both directions, bytes.
    avg_rtcp_size: f64,

    members: HashMap<u32, MemberEntry>,
    pmembers: usize,
    senders: usize,
    we_sent: bool,

    next_packet_type: RtcpPacketType,

    // local send state feeding SR sender info
    rtp_packets_sent: u32,
    rtp_octets_sent: u32,
    last_rtp_sent: u64,
}

impl RtpStatistics {
    /// Creates statistics for a session with the given bandwidth
    /// (bits/second); RTCP gets [`RTCP_BW_FRACTION`] of it.
    pub fn new(clock: Arc<dyn Clock>, cname: Bytes, session_bw: f64, clock_rate: u32) -> Self {
        Self::with_ssrc(rand::random::<u32>(), clock, cname, session_bw, clock_rate)
    }

    pub fn with_ssrc(
        ssrc: u32,
        clock: Arc<dyn Clock>,
        cname: Bytes,
        session_bw: f64,
        clock_rate: u32,
    ) -> Self {
        let mut members = HashMap::new();
        members.insert(ssrc, MemberEntry::default());

        RtpStatistics {
            clock,
            ssrc,
            cname,
            clock_rate,
            rtcp_bw: session_bw * RTCP_BW_FRACTION,
            avg_rtcp_size: DEFAULT_AVG_RTCP_SIZE,
            members,
            pmembers: 1,
            senders: 0,
            we_sent: false,
            next_packet_type: RtcpPacketType::Report,
            rtp_packets_sent: 0,
            rtp_octets_sent: 0,
            last_rtp_sent: 0,
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn cname(&self) -> &Bytes {
        &self.cname
    }

    pub fn current_time(&self) -> u64 {
        self.clock.current_time()
    }

    pub fn members(&self) -> usize {
        self.members.len()
    }

    pub fn pmembers(&self) -> usize {
        self.pmembers
    }

    pub fn senders(&self) -> usize {
        self.senders
    }

    pub fn we_sent(&self) -> bool {
        self.we_sent
    }

    pub fn avg_rtcp_size(&self) -> f64 {
        self.avg_rtcp_size
    }

    pub fn rtcp_packet_type(&self) -> RtcpPacketType {
        self.next_packet_type
    }

    /// Remembers which packet class the pending timer will emit.
    pub fn set_rtcp_packet_type(&mut self, packet_type: RtcpPacketType) {
        self.next_packet_type = packet_type;
    }

    /// Pins the smoothed compound size, e.g. to the size of the BYE the
    /// leave path schedules.
    pub fn set_rtcp_avg_size(&mut self, size: usize) {
        self.avg_rtcp_size = size as f64;
    }

    /// pmembers snapshots members at transmission time so a later
    /// shrinkage can be detected by reverse reconsideration.
    pub fn confirm_members(&mut self) {
        self.pmembers = self.members.len();
    }

    /// Drops every member except the local participant.
    pub fn reset_members(&mut self) {
        let local = self
            .members
            .remove(&self.ssrc)
            .unwrap_or_default();
        self.members.clear();
        self.members.insert(self.ssrc, local);
        self.pmembers = 1;
    }

    pub fn clear_senders(&mut self) {
        self.senders = 0;
        self.we_sent = false;
        for member in self.members.values_mut() {
            member.is_sender = false;
        }
    }

    /// The randomized transmission interval in milliseconds: the
    /// deterministic interval T scaled by a uniform draw from [0.5, 1.5]
    /// and divided by the reconsideration compensation factor.
    pub fn rtcp_interval(&self, initial: bool) -> u64 {
        let t = self.deterministic_interval(initial);
        let factor = rand::random::<f64>() + 0.5;
        (t * factor / COMPENSATION * 1000.0) as u64
    }

    /// The deterministic calculated interval T in seconds
    /// (RFC 3550 appendix A.7).
    fn deterministic_interval(&self, initial: bool) -> f64 {
        let members = self.members.len() as f64;
        let senders = self.senders as f64;

        let (n, rtcp_bw) = if self.senders > 0 && senders < members * RTCP_SENDER_BW_FRACTION {
            if self.we_sent {
                (senders, self.rtcp_bw * RTCP_SENDER_BW_FRACTION)
            } else {
                (members - senders, self.rtcp_bw * RTCP_RECEIVER_BW_FRACTION)
            }
        } else {
            (members, self.rtcp_bw)
        };

        let min = if initial {
            INITIAL_RTCP_MIN_TIME
        } else {
            RTCP_MIN_TIME
        };

        let t = n * self.avg_rtcp_size * 8.0 / rtcp_bw;
        if t < min {
            min
        } else {
            t
        }
    }

    fn update_avg_size(&mut self, size: usize) {
        self.avg_rtcp_size = (15.0 / 16.0) * self.avg_rtcp_size + (1.0 / 16.0) * size as f64;
    }

    fn member_mut(&mut self, ssrc: u32) -> &mut MemberEntry {
        let now = self.clock.current_time();
        let entry = self.members.entry(ssrc).or_default();
        entry.last_seen = now;
        entry
    }

    fn mark_sender(&mut self, ssrc: u32) {
        let now = self.clock.current_time();
        let entry = self.members.entry(ssrc).or_default();
        entry.last_seen = now;
        entry.last_rtp_seen = now;
        if !entry.is_sender {
            entry.is_sender = true;
            self.senders += 1;
        }
    }

    /// Called by the RTP plane for every outgoing media packet.
    pub fn on_rtp_sent(&mut self, payload_octets: usize) {
        self.we_sent = true;
        self.rtp_packets_sent = self.rtp_packets_sent.wrapping_add(1);
        self.rtp_octets_sent = self.rtp_octets_sent.wrapping_add(payload_octets as u32);
        self.last_rtp_sent = self.clock.current_time();
        self.mark_sender(self.ssrc);
    }

    /// Called by the RTP plane for every incoming media packet.
    pub fn on_rtp_receive(&mut self, ssrc: u32, seq: u16, rtp_timestamp: u32) {
        let now = self.clock.current_time();
        let arrival_units = (now as i64) * (self.clock_rate as i64) / 1000;

        self.mark_sender(ssrc);
        if let Some(entry) = self.members.get_mut(&ssrc) {
            entry.update_seq(seq);
            entry.update_jitter(arrival_units, rtp_timestamp);
        }
    }

    /// Folds one inbound compound into the member table and counters.
    pub fn on_rtcp_receive(&mut self, compound: &CompoundPacket) {
        self.update_avg_size(compound.marshal_size());

        let now = self.clock.current_time();
        for packet in &compound.0 {
            if let Some(sr) = packet.as_any().downcast_ref::<SenderReport>() {
                self.mark_sender(sr.ssrc);
                if let Some(entry) = self.members.get_mut(&sr.ssrc) {
                    entry.last_sr_ntp = sr.ntp_time;
                    entry.last_sr_recv_time = now;
                }
                self.record_reports_about_local(sr.ssrc, &sr.reports);
            } else if let Some(rr) = packet.as_any().downcast_ref::<ReceiverReport>() {
                self.member_mut(rr.ssrc);
                self.record_reports_about_local(rr.ssrc, &rr.reports);
            } else if let Some(sdes) = packet.as_any().downcast_ref::<SourceDescription>() {
                for chunk in &sdes.chunks {
                    self.member_mut(chunk.source);
                }
            } else if let Some(bye) = packet.as_any().downcast_ref::<Goodbye>() {
                for source in &bye.sources {
                    self.remove_member(*source);
                }
            }
        }
    }

    /// Accounts one outbound compound.
    pub fn on_rtcp_sent(&mut self, compound: &CompoundPacket) {
        self.update_avg_size(compound.marshal_size());
        let ssrc = self.ssrc;
        self.member_mut(ssrc);
    }

    fn record_reports_about_local(&mut self, reporter: u32, reports: &[ReceptionReport]) {
        let local = self.ssrc;
        for report in reports {
            if report.ssrc == local {
                if let Some(entry) = self.members.get_mut(&reporter) {
                    entry.reported_jitter = report.jitter;
                    entry.reported_loss = report.total_lost;
                }
            }
        }
    }

    fn remove_member(&mut self, ssrc: u32) {
        if ssrc == self.ssrc {
            return;
        }
        if let Some(entry) = self.members.remove(&ssrc) {
            if entry.is_sender {
                self.senders -= 1;
            }
        }
    }

    /// Demotes senders that have been silent on the RTP plane for two
    /// report intervals; clears `we_sent` for the local participant the
    /// same way. Returns whether anything was demoted.
    pub fn is_sender_timeout(&mut self) -> bool {
        let now = self.clock.current_time();
        let interval = (self.deterministic_interval(false) * 1000.0) as u64;
        let deadline = SENDER_TIMEOUT_INTERVALS * interval;

        let mut any = false;
        for (ssrc, entry) in self.members.iter_mut() {
            if entry.is_sender && now.saturating_sub(entry.last_rtp_seen) > deadline {
                entry.is_sender = false;
                self.senders -= 1;
                any = true;
                if *ssrc == self.ssrc {
                    self.we_sent = false;
                }
            }
        }
        any
    }

    /// Evicts members without any activity for five deterministic
    /// intervals. The local participant is never evicted. Returns whether
    /// anything was removed.
    pub fn is_member_timeout(&mut self) -> bool {
        let now = self.clock.current_time();
        let interval = (self.deterministic_interval(false) * 1000.0) as u64;
        let deadline = MEMBER_TIMEOUT_INTERVALS * interval;
        let local = self.ssrc;

        let before = self.members.len();
        let mut dropped_senders = 0;
        self.members.retain(|ssrc, entry| {
            if *ssrc == local {
                return true;
            }
            let stale = now.saturating_sub(entry.last_seen) > deadline;
            if stale && entry.is_sender {
                dropped_senders += 1;
            }
            !stale
        });
        self.senders -= dropped_senders;

        self.members.len() != before
    }

    /// Builds one reception report block per remote sender
    /// (RFC 3550 appendix A.3).
    pub fn reception_reports(&mut self) -> Vec<ReceptionReport> {
        let now = self.clock.current_time();
        let local = self.ssrc;

        let mut reports = vec![];
        for (ssrc, entry) in self.members.iter_mut() {
            if *ssrc == local || !entry.is_sender || !entry.started {
                continue;
            }

            let expected = entry.expected();
            let lost = expected.saturating_sub(entry.received);

            let expected_interval = expected.wrapping_sub(entry.expected_prior);
            let received_interval = entry.received.wrapping_sub(entry.received_prior);
            let lost_interval =
                expected_interval as i64 - received_interval as i64;

            let fraction_lost = if expected_interval == 0 || lost_interval <= 0 {
                0
            } else {
                ((lost_interval << 8) / expected_interval as i64).min(255) as u8
            };

            entry.expected_prior = expected;
            entry.received_prior = entry.received;
            entry.cumulative_loss = lost;

            reports.push(ReceptionReport {
                ssrc: *ssrc,
                fraction_lost,
                total_lost: lost & 0xFF_FFFF,
                last_sequence_number: entry.extended_seq(),
                jitter: entry.jitter as u32,
                last_sender_report: if entry.last_sr_ntp == 0 {
                    0
                } else {
                    ntp::middle_32(entry.last_sr_ntp)
                },
                delay: if entry.last_sr_recv_time == 0 {
                    0
                } else {
                    ntp::delay_since(now.saturating_sub(entry.last_sr_recv_time))
                },
            });
        }
        reports
    }

    /// Builds the scheduled report compound: SR when the local
    /// participant sent RTP since the last report, RR otherwise, followed
    /// by an SDES carrying the CNAME.
    pub fn build_report(&mut self) -> CompoundPacket {
        let reports = self.reception_reports();

        let leading: Box<dyn Packet + Send + Sync> = if self.we_sent {
            Box::new(SenderReport {
                ssrc: self.ssrc,
                ntp_time: self.clock.ntp_time(),
                rtp_time: (self.clock.current_time()
                    * self.clock_rate as u64
                    / 1000) as u32,
                packet_count: self.rtp_packets_sent,
                octet_count: self.rtp_octets_sent,
                reports,
            })
        } else {
            Box::new(ReceiverReport {
                ssrc: self.ssrc,
                reports,
            })
        };

        CompoundPacket(vec![
            leading,
            Box::new(SourceDescription::with_cname(self.ssrc, self.cname.clone())),
        ])
    }

    /// Builds the leave compound: an empty RR, the SDES, and the BYE for
    /// the local source.
    pub fn build_bye(&mut self) -> CompoundPacket {
        CompoundPacket(vec![
            Box::new(ReceiverReport {
                ssrc: self.ssrc,
                reports: vec![],
            }),
            Box::new(SourceDescription::with_cname(self.ssrc, self.cname.clone())),
            Box::new(Goodbye {
                sources: vec![self.ssrc],
                reason: Bytes::new(),
            }),
        ])
    }
}
