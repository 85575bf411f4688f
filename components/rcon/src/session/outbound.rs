use crate::{
    config::RconConfig,
    events::SessionEvent,
    frame::ClientFrame,
    metrics::RconMetrics,
    session::{SessionError, SessionState, Terminate},
};
use log::{debug, warn};
use std::time::Instant;
use tokio::{
    net::UdpSocket,
    sync::{mpsc, watch},
    time::{interval_at, Instant as TokioInstant, MissedTickBehavior},
};

/// One retry slot per sequence byte. No hashing, no per-command allocation
/// beyond the encoded datagram itself.
#[derive(Debug)]
pub(crate) struct PendingTable {
    slots: [Option<PendingFrame>; 256],
}

#[derive(Debug)]
struct PendingFrame {
    datagram: Vec<u8>,
    retries: u8,
}

pub(crate) enum TickAction {
    Idle,
    Retransmit(Vec<u8>),
    Expire,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self { slots: std::array::from_fn(|_| None) }
    }

    /// Parks a freshly transmitted datagram. Returns the displaced datagram
    /// when the slot was still occupied, which only happens once 256 commands
    /// are unacknowledged at the same time.
    pub(crate) fn park(&mut self, seq: u8, datagram: Vec<u8>) -> Option<Vec<u8>> {
        self.slots[seq as usize].replace(PendingFrame { datagram, retries: 0 }).map(|slot| slot.datagram)
    }

    /// Clears the slot for an acknowledged sequence. Any reply fragment
    /// counts; retries stop on the first one.
    pub(crate) fn clear(&mut self, seq: u8) -> bool {
        self.slots[seq as usize].take().is_some()
    }

    /// Advances one slot by one retry interval.
    pub(crate) fn tick(&mut self, seq: u8, max_retries: u8) -> TickAction {
        match &mut self.slots[seq as usize] {
            None => TickAction::Idle,
            Some(slot) if slot.retries < max_retries => {
                slot.retries += 1;
                TickAction::Retransmit(slot.datagram.clone())
            }
            Some(_) => {
                self.slots[seq as usize] = None;
                TickAction::Expire
            }
        }
    }

    #[cfg(test)]
    fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// The writer half of a connection: sole owner of the pending table and the
/// command counter. Dequeues commands, assigns sequences, retries on a fixed
/// tick and keeps the link warm with keepalive commands.
pub(crate) struct Writer<'a> {
    socket: &'a UdpSocket,
    commands: &'a mut mpsc::Receiver<String>,
    acks: mpsc::Receiver<u8>,
    link: watch::Receiver<SessionState>,
    events: mpsc::Sender<SessionEvent>,
    metrics: &'a RconMetrics,
    config: &'a RconConfig,
    pending: PendingTable,
    cmd_counter: u8,
    last_activity: Instant,
    consecutive_failures: u32,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(
        socket: &'a UdpSocket,
        commands: &'a mut mpsc::Receiver<String>,
        acks: mpsc::Receiver<u8>,
        link: watch::Receiver<SessionState>,
        events: mpsc::Sender<SessionEvent>,
        metrics: &'a RconMetrics,
        config: &'a RconConfig,
    ) -> Self {
        Self {
            socket,
            commands,
            acks,
            link,
            events,
            metrics,
            config,
            pending: PendingTable::new(),
            cmd_counter: 0,
            last_activity: Instant::now(),
            consecutive_failures: 0,
        }
    }

    pub(crate) async fn run(mut self) -> Result<Terminate, SessionError> {
        // The first retry sweep belongs one full interval out, not at startup.
        let mut ticker =
            interval_at(TokioInstant::now() + self.config.retry_interval, self.config.retry_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                dequeued = self.commands.recv() => {
                    let command = dequeued.ok_or(SessionError::ChannelClosed)?;
                    self.transmit_command(command).await?;
                }
                acked = self.acks.recv() => {
                    let seq = acked.ok_or(SessionError::ChannelClosed)?;
                    if self.pending.clear(seq) {
                        debug!("rcon.event=ack seq={seq}");
                        self.consecutive_failures = 0;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep().await?;
                }
            }
        }
    }

    /// Assigns the next sequence, encodes, parks a retry copy and transmits.
    async fn transmit_command(&mut self, command: String) -> Result<(), SessionError> {
        let seq = self.cmd_counter;
        self.cmd_counter = self.cmd_counter.wrapping_add(1);

        let datagram = ClientFrame::Command { seq, command }.encode();
        if self.pending.park(seq, datagram.clone()).is_some() {
            warn!("rcon.event=slot_overrun seq={seq}");
            let _ = self.events.try_send(SessionEvent::SlotOverrun { seq });
        }

        self.socket.send(&datagram).await?;
        self.metrics.record_command();
        self.last_activity = Instant::now();
        debug!("rcon.event=command_sent seq={seq} bytes={}", datagram.len());
        Ok(())
    }

    async fn sweep(&mut self) -> Result<(), SessionError> {
        for seq in 0..=u8::MAX {
            match self.pending.tick(seq, self.config.max_retries) {
                TickAction::Idle => {}
                TickAction::Retransmit(datagram) => {
                    self.socket.send(&datagram).await?;
                    self.metrics.record_retransmit();
                    debug!("rcon.event=retransmit seq={seq}");
                }
                TickAction::Expire => {
                    self.metrics.record_send_timeout();
                    warn!("rcon.event=send_timeout seq={seq}");
                    let _ = self.events.try_send(SessionEvent::SendTimeout { seq });
                    self.consecutive_failures += 1;
                    if self.consecutive_failures >= self.config.max_consecutive_failures {
                        warn!("rcon.event=peer_dead failures={}", self.consecutive_failures);
                        let _ = self.events.try_send(SessionEvent::PeerDead);
                        return Err(SessionError::PeerDead);
                    }
                }
            }
        }

        // The keepalive is an ordinary empty command: it consumes a sequence
        // slot and is retried like anything else, so it also proves the
        // command path end to end.
        if *self.link.borrow() == SessionState::Online
            && self.last_activity.elapsed() >= self.config.heartbeat_idle
        {
            self.metrics.record_heartbeat();
            debug!("rcon.event=heartbeat");
            self.transmit_command(String::new()).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn park_and_clear() {
        let mut table = PendingTable::new();
        assert!(table.park(7, vec![1, 2, 3]).is_none());
        assert_eq!(table.live(), 1);
        assert!(table.clear(7));
        assert!(!table.clear(7));
        assert_eq!(table.live(), 0);
    }

    #[test]
    fn park_reports_displaced_frame() {
        let mut table = PendingTable::new();
        assert!(table.park(3, vec![0xAA]).is_none());
        assert_eq!(table.park(3, vec![0xBB]), Some(vec![0xAA]));
    }

    #[test]
    fn tick_retransmits_then_expires() {
        let mut table = PendingTable::new();
        table.park(9, vec![0x01]);

        for _ in 0..5 {
            assert!(matches!(table.tick(9, 5), TickAction::Retransmit(_)));
        }
        assert!(matches!(table.tick(9, 5), TickAction::Expire));
        assert!(matches!(table.tick(9, 5), TickAction::Idle));
    }

    #[test]
    fn clear_stops_retries() {
        let mut table = PendingTable::new();
        table.park(1, vec![0x01]);
        assert!(matches!(table.tick(1, 5), TickAction::Retransmit(_)));
        assert!(table.clear(1));
        assert!(matches!(table.tick(1, 5), TickAction::Idle));
    }
}
