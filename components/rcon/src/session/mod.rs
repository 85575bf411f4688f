mod outbound;

use crate::{
    config::RconConfig,
    events::{CommandError, CommandReply, ServerMessage, SessionEvent},
    frame::{ClientFrame, DropReason, ServerFrame},
    metrics::RconMetrics,
    task::spawn_detached,
};
use log::{debug, info, warn};
use outbound::Writer;
use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    net::{lookup_host, UdpSocket},
    sync::{mpsc, mpsc::error::TrySendError, watch},
    time::{sleep, timeout},
};

/// Largest datagram the engine will accept in one read.
const MAX_DATAGRAM: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingLogin,
    Online,
    Dead,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::AwaitingLogin => "awaiting_login",
            SessionState::Online => "online",
            SessionState::Dead => "dead",
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to resolve {0}")]
    Resolve(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("read deadline expired")]
    ReadTimeout,
    #[error("peer declared dead after repeated send timeouts")]
    PeerDead,
    #[error("server rejected the password")]
    AuthFailed,
    #[error("internal channel closed")]
    ChannelClosed,
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Resolve(_) => "resolve",
            SessionError::Io(_) => "io",
            SessionError::ReadTimeout => "read_timeout",
            SessionError::PeerDead => "peer_dead",
            SessionError::AuthFailed => "auth_failed",
            SessionError::ChannelClosed => "channel_closed",
        }
    }
}

/// How a single connection ended, as opposed to an error that warrants a
/// reconnect.
pub(crate) enum Terminate {
    Shutdown,
    AuthFailed,
}

/// Non-blocking command ingress. Cheap to clone; safe to use from any task.
/// Sequence numbers are assigned by the engine at transmit time, never here.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<String>,
}

impl CommandSender {
    pub fn send(&self, command: impl Into<String>) -> Result<(), CommandError> {
        self.tx.try_send(command.into()).map_err(|err| match err {
            TrySendError::Full(_) => CommandError::QueueFull,
            TrySendError::Closed(_) => CommandError::Closed,
        })
    }

    pub fn kick_player(&self, player_id: u16, reason: &str) -> Result<(), CommandError> {
        let command = if reason.is_empty() {
            format!("kick {player_id}")
        } else {
            format!("kick {player_id} {reason}")
        };
        self.send(command)
    }
}

/// Consumer ends of everything the engine publishes.
pub struct EventStreams {
    /// Command replies, fragmentation sub-headers included. Feed these to a
    /// [`ReplyAssembler`](crate::frame::ReplyAssembler) for whole responses.
    pub replies: mpsc::Receiver<CommandReply>,
    /// Server messages, already acknowledged on the wire.
    pub messages: mpsc::Receiver<ServerMessage>,
    /// Informational and error events.
    pub events: mpsc::Receiver<SessionEvent>,
    /// Live session state.
    pub state: watch::Receiver<SessionState>,
}

/// Handle for a detached session started with [`RconClient::start`].
pub struct SessionHandle {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn signal_exit(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }
}

/// The session engine. Owns the socket, the retry table and the state
/// machine; publishes decoded traffic into externally consumed queues.
pub struct RconClient {
    config: RconConfig,
    metrics: Arc<RconMetrics>,
    command_rx: mpsc::Receiver<String>,
    // Held so the command queue never reads as closed when callers drop
    // their sender clones.
    _command_tx: mpsc::Sender<String>,
    replies: mpsc::Sender<CommandReply>,
    messages: mpsc::Sender<ServerMessage>,
    events: mpsc::Sender<SessionEvent>,
    state: watch::Sender<SessionState>,
}

impl RconClient {
    pub fn new(config: RconConfig) -> (Self, CommandSender, EventStreams) {
        let (command_tx, command_rx) = mpsc::channel(config.command_queue.max(1));
        let (reply_tx, reply_rx) = mpsc::channel(config.reply_queue.max(1));
        let (message_tx, message_rx) = mpsc::channel(config.message_queue.max(1));
        let (event_tx, event_rx) = mpsc::channel(config.event_queue.max(1));
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        let client = Self {
            config,
            metrics: Arc::new(RconMetrics::new()),
            command_rx,
            _command_tx: command_tx.clone(),
            replies: reply_tx,
            messages: message_tx,
            events: event_tx,
            state: state_tx,
        };
        let sender = CommandSender { tx: command_tx };
        let streams =
            EventStreams { replies: reply_rx, messages: message_rx, events: event_rx, state: state_rx };
        (client, sender, streams)
    }

    pub fn metrics(&self) -> Arc<RconMetrics> {
        self.metrics.clone()
    }

    /// Runs the reconnect loop until shutdown or a permanent login rejection.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SessionError> {
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            let _ = self.state.send(SessionState::Connecting);

            match self.connect_and_drive(&mut shutdown).await {
                Ok(Terminate::Shutdown) => {
                    info!("rcon.event=shutdown");
                    return Ok(());
                }
                Ok(Terminate::AuthFailed) => {
                    let _ = self.state.send(SessionState::Dead);
                    return Err(SessionError::AuthFailed);
                }
                Err(err) => {
                    warn!("rcon.event=link_down reason={} detail={err}", err.kind());
                    self.metrics.record_reconnect();
                    let _ = self.events.try_send(SessionEvent::LinkDown { reason: err.to_string() });
                    let delay = self.config.reconnect_delay;
                    let _ = self.events.try_send(SessionEvent::Reconnecting { delay });
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = shutdown.changed() => return Ok(()),
                    }
                }
            }
        }
    }

    /// Detaches the engine onto the runtime and returns a shutdown handle.
    pub fn start(self) -> SessionHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = self.state.subscribe();
        spawn_detached("session", async move {
            match self.run(shutdown_rx).await {
                Ok(()) => info!("rcon.event=session_stopped"),
                Err(err) => warn!("rcon.event=session_terminated reason={}", err.kind()),
            }
        });
        SessionHandle { shutdown: shutdown_tx, state }
    }

    /// One connection: resolve, bind, log in, then drive the reader and the
    /// writer until either fails or shutdown is signalled. Dropping the
    /// writer on exit discards the per-connection pending table, which is
    /// exactly the reconnect reset the protocol wants.
    async fn connect_and_drive(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Terminate, SessionError> {
        let addr = lookup_host(&self.config.server)
            .await?
            .next()
            .ok_or_else(|| SessionError::Resolve(self.config.server.clone()))?;

        let bind_addr: SocketAddr = match addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        // A connected socket makes the kernel discard datagrams from any
        // other source, which is the peer filter the protocol requires.
        socket.connect(addr).await?;

        let _ = self.state.send(SessionState::AwaitingLogin);
        info!("rcon.event=connect peer={addr}");
        socket.send(&ClientFrame::Login { password: self.config.password.clone() }.encode()).await?;

        let (ack_tx, ack_rx) = mpsc::channel(64);
        let reader = Reader {
            socket: &socket,
            config: &self.config,
            metrics: self.metrics.as_ref(),
            state: &self.state,
            replies: &self.replies,
            messages: &self.messages,
            events: &self.events,
            acks: ack_tx,
        };
        let writer = Writer::new(
            &socket,
            &mut self.command_rx,
            ack_rx,
            self.state.subscribe(),
            self.events.clone(),
            self.metrics.as_ref(),
            &self.config,
        );

        tokio::select! {
            result = reader.run() => result,
            result = writer.run() => result,
            _ = shutdown.changed() => Ok(Terminate::Shutdown),
        }
    }
}

/// The reader half of a connection: receives, CRC-checks, decodes and routes.
struct Reader<'a> {
    socket: &'a UdpSocket,
    config: &'a RconConfig,
    metrics: &'a RconMetrics,
    state: &'a watch::Sender<SessionState>,
    replies: &'a mpsc::Sender<CommandReply>,
    messages: &'a mpsc::Sender<ServerMessage>,
    events: &'a mpsc::Sender<SessionEvent>,
    acks: mpsc::Sender<u8>,
}

impl Reader<'_> {
    async fn run(self) -> Result<Terminate, SessionError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut deadline = self.config.first_read_timeout;

        loop {
            let len = match timeout(deadline, self.socket.recv(&mut buf)).await {
                Err(_) => return Err(SessionError::ReadTimeout),
                Ok(received) => received?,
            };
            deadline = self.config.read_timeout;
            self.metrics.record_frame(len);

            let frame = match ServerFrame::parse(&buf[..len]) {
                Ok(frame) => frame,
                Err(err) => {
                    // Corruption is expected on UDP; account for it and move on.
                    self.metrics.record_drop(err.reason());
                    debug!("rcon.event=datagram_drop reason={} bytes={len}", err.reason().as_str());
                    continue;
                }
            };

            if let Some(terminate) = self.dispatch(frame).await? {
                return Ok(terminate);
            }
        }
    }

    async fn dispatch(&self, frame: ServerFrame) -> Result<Option<Terminate>, SessionError> {
        match frame {
            ServerFrame::Login { accepted: true } => {
                if *self.state.borrow() == SessionState::AwaitingLogin {
                    let _ = self.state.send(SessionState::Online);
                    info!("rcon.event=login_ok");
                    let _ = self.events.try_send(SessionEvent::LoggedIn);
                }
                Ok(None)
            }
            ServerFrame::Login { accepted: false } => {
                warn!("rcon.event=login_rejected");
                let _ = self.events.try_send(SessionEvent::AuthFailed);
                Ok(Some(Terminate::AuthFailed))
            }
            ServerFrame::Reply { seq, part, payload } => {
                if !self.online() {
                    self.metrics.record_drop(DropReason::NotLoggedIn);
                    return Ok(None);
                }
                // Stop the retry clock before the consumer sees the reply;
                // any fragment of a response acknowledges the command.
                let _ = self.acks.send(seq).await;
                let _ = self.replies.send(CommandReply { seq, part, payload }).await;
                Ok(None)
            }
            ServerFrame::Message { seq, message } => {
                if !self.online() {
                    self.metrics.record_drop(DropReason::NotLoggedIn);
                    return Ok(None);
                }
                self.socket.send(&ClientFrame::MessageAck { seq }.encode()).await?;
                self.metrics.record_ack();
                let text = String::from_utf8_lossy(&message).into_owned();
                let _ = self.messages.send(ServerMessage { seq, message: text }).await;
                Ok(None)
            }
        }
    }

    fn online(&self) -> bool {
        *self.state.borrow() == SessionState::Online
    }
}
