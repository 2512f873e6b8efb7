
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;
use util::marshal::{Marshal, MarshalSize};

use crate::compound_packet::CompoundPacket;
use crate::dtls::DtlsHandler;
use crate::error::{Error, Result};
use crate::packet;
use crate::statistics::{RtcpPacketType, RtpStatistics};
use crate::transport::{DatagramTransport, PacketHandler};
use crate::MAX_RTCP_PACKET_SIZE;

/// Period of the SSRC timeout sweep.
const SSRC_SWEEP_PERIOD: Duration = Duration::from_secs(7);

/// True for datagrams this handler is responsible for: RTP version 2, a
/// leading SR or RR, and no padding on the first sub-packet of the
/// compound. PT is what discriminates RTCP from RTP on a shared 5-tuple.
fn classify(packet: &[u8]) -> bool {
    if packet.len() < 4 {
        return false;
    }
    if packet[0] >> 6 != 2 {
        return false;
    }
    if (packet[0] >> 5) & 0x1 != 0 {
        return false;
    }
    let pt = packet[1];
    pt == 200 || pt == 201
}

/// The single pending transmission. Dropping it cancels the timer task;
/// the id detects a timer that fired while being replaced.
struct TxTask {
    id: u64,
    packet_type: RtcpPacketType,
    _cancel_tx: mpsc::Sender<()>,
}

struct Session {
    statistics: RtpStatistics,

    /// Time of the last RTCP transmission (clock ms).
    tp: u64,
    /// Scheduled time of the next transmission; `None` when nothing is
    /// scheduled.
    tn: Option<u64>,
    /// True until the first RTCP packet goes out.
    initial: bool,
    joined: bool,

    secure: bool,
    dtls: Option<Arc<DtlsHandler>>,

    pending: Option<TxTask>,
    next_task_id: u64,
    /// Once false, nothing can be scheduled anymore; `join` reopens it.
    tx_timer_open: bool,
    sweep_stop: Option<mpsc::Sender<()>>,

    /// Outbound scratch buffer, reused for every transmission.
    tx_buffer: Vec<u8>,
}

impl Session {
    fn handshake_complete(&self) -> bool {
        self.dtls
            .as_ref()
            .map(|d| d.is_handshake_complete())
            .unwrap_or(false)
    }
}

struct HandlerInternal {
    transport: Arc<dyn DatagramTransport>,
    session: Mutex<Session>,
    pipeline_priority: AtomicI32,
}

/// RtcpHandler drives RTCP for one RTP session: it owns the RFC 3550
/// transmission timer, dispatches inbound compounds into the statistics,
/// and runs the join/leave/reset lifecycle. With SRTCP enabled, all I/O
/// is gated on the DTLS handshake.
pub struct RtcpHandler {
    internal: Arc<HandlerInternal>,
}

impl RtcpHandler {
    pub fn new(statistics: RtpStatistics, transport: Arc<dyn DatagramTransport>) -> Self {
        RtcpHandler {
            internal: Arc::new(HandlerInternal {
                transport,
                session: Mutex::new(Session {
                    statistics,
                    tp: 0,
                    tn: None,
                    initial: true,
                    joined: false,
                    secure: false,
                    dtls: None,
                    pending: None,
                    next_task_id: 0,
                    tx_timer_open: false,
                    sweep_stop: None,
                    tx_buffer: vec![0u8; MAX_RTCP_PACKET_SIZE],
                }),
                pipeline_priority: AtomicI32::new(0),
            }),
        }
    }

    /// The handler is in the initial stage until it has sent at least one
    /// RTCP packet during the current RTP session.
    pub async fn is_initial(&self) -> bool {
        self.internal.session.lock().await.initial
    }

    pub async fn is_joined(&self) -> bool {
        self.internal.session.lock().await.joined
    }

    pub async fn is_secure(&self) -> bool {
        self.internal.session.lock().await.secure
    }

    pub fn set_pipeline_priority(&self, priority: i32) {
        self.internal
            .pipeline_priority
            .store(priority, Ordering::SeqCst);
    }

    /// Time in milliseconds until the pending transmission, or `None` if
    /// nothing is scheduled or the deadline already passed.
    pub async fn next_report_delay(&self) -> Option<u64> {
        let session = self.internal.session.lock().await;
        let tn = session.tn?;
        let tc = session.statistics.current_time();
        if tn <= tc {
            None
        } else {
            Some(tn - tc)
        }
    }

    /// Upon joining the session the first report is scheduled at
    /// `tc + T` with the halved initial minimum interval, and the
    /// periodic SSRC timeout sweep is installed. A second join while
    /// already joined is a no-op.
    pub async fn join_rtp_session(&self) {
        let mut session = self.internal.session.lock().await;
        if session.joined {
            return;
        }

        session.tx_timer_open = true;

        let t = session.statistics.rtcp_interval(session.initial);
        let tc = session.statistics.current_time();
        session.tn = Some(tc + t);
        self.internal
            .schedule(&mut session, tc + t, RtcpPacketType::Report);

        self.internal.start_ssrc_sweep(&mut session);

        session.joined = true;
    }

    /// When the participant leaves, tp is reset to the current time,
    /// members and pmembers fall back to 1, `initial` is set, senders are
    /// cleared, and avg_rtcp_size becomes the size of the compound BYE
    /// that is then scheduled for `tc + T`. The sweep stops immediately;
    /// the transmission timer stays alive so the BYE can fire.
    pub async fn leave_rtp_session(&self) {
        let mut session = self.internal.session.lock().await;
        if !session.joined {
            return;
        }
        log::info!("leaving rtp session");

        session.sweep_stop.take();

        let tc = session.statistics.current_time();
        session.tp = tc;
        session.statistics.reset_members();
        session.initial = true;
        session.statistics.clear_senders();

        let bye_size = session.statistics.build_bye().marshal_size();
        session.statistics.set_rtcp_avg_size(bye_size);

        let t = session.statistics.rtcp_interval(session.initial);
        session.tn = Some(tc + t);
        self.internal
            .schedule(&mut session, tc + t, RtcpPacketType::Bye);

        session.joined = false;
    }

    /// Cancels every task and timer and restores construction defaults.
    /// Illegal while joined to an active session.
    pub async fn reset(&self) -> Result<()> {
        let mut session = self.internal.session.lock().await;
        if session.joined {
            return Err(Error::InvalidState(
                "cannot reset handler while part of an active rtp session",
            ));
        }
        self.internal.do_reset(&mut session);
        Ok(())
    }

    /// Secures the session: all RTCP becomes SRTCP through the handler's
    /// transformers once its handshake completes; until then every
    /// datagram in either direction is dropped.
    pub async fn enable_srtcp(&self, dtls: Arc<DtlsHandler>) {
        let mut session = self.internal.session.lock().await;
        session.dtls = Some(dtls);
        session.secure = true;
    }

    /// Restores plaintext RTCP. Refused while the handshake worker runs.
    pub async fn disable_srtcp(&self) -> Result<()> {
        let mut session = self.internal.session.lock().await;
        if let Some(dtls) = &session.dtls {
            if dtls.is_handshaking() {
                return Err(Error::HandshakeInProgress);
            }
        }
        session.dtls = None;
        session.secure = false;
        Ok(())
    }
}

impl HandlerInternal {
    /// Installs the pending transmission, replacing (and thereby
    /// cancelling) any previous one. After the timer has been closed the
    /// call logs and installs nothing; reports stop from then on.
    fn schedule(
        self: &Arc<Self>,
        session: &mut Session,
        deadline: u64,
        packet_type: RtcpPacketType,
    ) {
        if !session.tx_timer_open {
            log::warn!("rtcp timer already closed, no more packets will be scheduled");
            return;
        }

        session.pending.take();
        session.next_task_id += 1;
        let id = session.next_task_id;

        let (cancel_tx, mut cancel_rx) = mpsc::channel(1);
        session.pending = Some(TxTask {
            id,
            packet_type,
            _cancel_tx: cancel_tx,
        });
        session.statistics.set_rtcp_packet_type(packet_type);

        let delay = deadline.saturating_sub(session.statistics.current_time());
        let internal = Arc::clone(self);
        tokio::spawn(async move {
            let timer = tokio::time::sleep(Duration::from_millis(delay));
            tokio::pin!(timer);
            tokio::select! {
                _ = timer.as_mut() => {
                    internal.on_expire(id, packet_type).await;
                }
                _ = cancel_rx.recv() => {}
            }
        });
    }

    fn start_ssrc_sweep(self: &Arc<Self>, session: &mut Session) {
        let (stop_tx, mut stop_rx) = mpsc::channel(1);
        session.sweep_stop = Some(stop_tx);

        let internal = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let timer = tokio::time::sleep(SSRC_SWEEP_PERIOD);
                tokio::pin!(timer);
                tokio::select! {
                    _ = timer.as_mut() => {
                        let mut session = internal.session.lock().await;
                        session.statistics.is_sender_timeout();
                        session.statistics.is_member_timeout();
                    }
                    _ = stop_rx.recv() => break,
                }
            }
        });
    }

    /// Decides whether to transmit now or reschedule, per the timer
    /// reconsideration algorithm. Any failure other than a transport
    /// error tears the whole session down.
    async fn on_expire(self: &Arc<Self>, id: u64, packet_type: RtcpPacketType) {
        let mut session = self.session.lock().await;
        match &session.pending {
            Some(task) if task.id == id => {}
            // cancelled or replaced while the timer was firing
            _ => return,
        }
        session.pending = None;

        if let Err(err) = self.handle_expire(&mut session, packet_type).await {
            log::error!("scheduled {packet_type} transmission failed, stopping handler: {err}");
            self.do_reset(&mut session);
        }
    }

    async fn handle_expire(
        self: &Arc<Self>,
        session: &mut Session,
        packet_type: RtcpPacketType,
    ) -> Result<()> {
        let tc = session.statistics.current_time();

        match packet_type {
            RtcpPacketType::Report => {
                // a leave or reset that raced this expiry wins
                if !session.joined {
                    return Ok(());
                }

                let t = session.statistics.rtcp_interval(session.initial);
                let mut tn = session.tp + t;
                session.tn = Some(tn);

                if tn <= tc {
                    let compound = session.statistics.build_report();
                    self.send_rtcp(session, &compound).await?;
                    session.tp = tc;

                    // Redraw the interval. The draw above was conditioned
                    // on being small enough to cause a transmission, so it
                    // is not distributed like a fresh one.
                    let t = session.statistics.rtcp_interval(session.initial);
                    tn = tc + t;
                    session.tn = Some(tn);
                }

                self.schedule(session, tn, RtcpPacketType::Report);
                session.statistics.confirm_members();
            }

            RtcpPacketType::Bye => {
                // timer reconsideration applies to the BYE as well; it is
                // never dropped, only delayed
                let t = session.statistics.rtcp_interval(session.initial);
                let tn = session.tp + t;
                session.tn = Some(tn);

                if tn <= tc {
                    let compound = session.statistics.build_bye();
                    session
                        .statistics
                        .set_rtcp_avg_size(compound.marshal_size());
                    self.send_rtcp(session, &compound).await?;
                    self.close_transport().await;
                    self.do_reset(session);
                } else {
                    self.schedule(session, tn, RtcpPacketType::Bye);
                }
            }
        }

        Ok(())
    }

    /// Marshals and transmits one compound. Secure sessions stay silent
    /// until the handshake completes, and a transport failure is logged
    /// without updating the statistics for the failed packet.
    async fn send_rtcp(&self, session: &mut Session, compound: &CompoundPacket) -> Result<()> {
        if session.secure && !session.handshake_complete() {
            return Ok(());
        }

        if !self.transport.is_open() || !self.transport.is_connected() {
            log::warn!(
                "could not send {} packet, channel is closed",
                session.statistics.rtcp_packet_type()
            );
            return Ok(());
        }

        let n = compound.marshal_to(&mut session.tx_buffer[..])?;

        let encrypted;
        let wire: &[u8] = if session.secure {
            match session
                .dtls
                .as_ref()
                .and_then(|d| d.encode_rtcp(&session.tx_buffer[..n]))
            {
                Some(data) => {
                    encrypted = data;
                    &encrypted
                }
                None => {
                    log::warn!("could not protect outgoing rtcp packet, dropping");
                    return Ok(());
                }
            }
        } else {
            &session.tx_buffer[..n]
        };

        log::debug!("OUTGOING {compound}");

        match self.transport.send(wire).await {
            Ok(_) => {
                // initial flips only on a successful transmission
                session.initial = false;
                session.statistics.on_rtcp_sent(compound);
            }
            Err(err) => {
                // the statistics are deliberately not updated for the
                // failed packet
                log::warn!("failed to send rtcp packet: {err}");
            }
        }

        Ok(())
    }

    async fn close_transport(&self) {
        if self.transport.is_connected() {
            if let Err(err) = self.transport.disconnect().await {
                log::warn!("failed to disconnect rtcp channel: {err}");
            }
        }
        if self.transport.is_open() {
            if let Err(err) = self.transport.close().await {
                log::warn!("failed to close rtcp channel: {err}");
            }
        }
    }

    fn do_reset(&self, session: &mut Session) {
        session.pending.take();
        session.tx_timer_open = false;
        session.sweep_stop.take();

        session.tp = 0;
        session.tn = None;
        session.initial = true;
        session.joined = false;

        if session.secure {
            session.secure = false;
            session.dtls = None;
        }
    }
}

#[async_trait]
impl PacketHandler for RtcpHandler {
    fn can_handle(&self, packet: &[u8]) -> bool {
        classify(packet)
    }

    async fn handle(
        &self,
        packet: &[u8],
        _local: SocketAddr,
        _remote: SocketAddr,
    ) -> Result<Option<Bytes>> {
        let mut session = self.internal.session.lock().await;

        // never process data while the DTLS handshake is ongoing
        if session.secure && !session.handshake_complete() {
            return Ok(None);
        }

        if !session.joined {
            return Err(Error::InvalidState("no rtp session joined"));
        }

        if !classify(packet) {
            log::warn!("cannot handle incoming packet");
            return Err(Error::UnsupportedPacket);
        }

        let plaintext = if session.secure {
            match session.dtls.as_ref().and_then(|d| d.decode_rtcp(packet)) {
                Some(data) if !data.is_empty() => data,
                _ => {
                    log::warn!("could not decode incoming srtcp packet, dropping");
                    return Ok(None);
                }
            }
        } else {
            Bytes::copy_from_slice(packet)
        };

        let mut buf = plaintext;
        let packets = match packet::unmarshal(&mut buf) {
            Ok(packets) => packets,
            Err(err) => {
                log::warn!("dropping malformed rtcp compound: {err}");
                return Ok(None);
            }
        };
        let compound = CompoundPacket(packets);

        log::debug!("INCOMING {compound}");

        session.statistics.on_rtcp_receive(&compound);

        if compound.has_goodbye() {
            let pending_report = matches!(
                session.pending.as_ref().map(|t| t.packet_type),
                Some(RtcpPacketType::Report)
            );

            // A BYE that shrinks the membership below pmembers triggers
            // reverse reconsideration: tn and tp contract towards tc and
            // the pending report moves up.
            if pending_report && session.statistics.members() < session.statistics.pmembers() {
                let tc = session.statistics.current_time();
                let ratio =
                    session.statistics.members() as f64 / session.statistics.pmembers() as f64;

                let tn = session.tn.unwrap_or(tc);
                let new_tn = (tc as f64 + ratio * (tn as f64 - tc as f64)).max(0.0) as u64;
                let new_tp = (tc as f64 - ratio * (tc as f64 - session.tp as f64)).max(0.0) as u64;

                session.tn = Some(new_tn);
                session.tp = new_tp;

                self.internal
                    .schedule(&mut session, new_tn, RtcpPacketType::Report);
                session.statistics.confirm_members();
            }
        }

        // RTCP never produces an immediate reply
        Ok(None)
    }

    fn pipeline_priority(&self) -> i32 {
        self.internal.pipeline_priority.load(Ordering::SeqCst)
    }
}
