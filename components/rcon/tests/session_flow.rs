use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::timeout;
use warden_rcon::fixtures;
use warden_rcon::frame::{ClientFrame, ReplyAssembler, ReplyAssemblerConfig};
use warden_rcon::{
    CommandSender, EventStreams, RconClient, RconConfig, SessionError, SessionEvent, SessionState,
};

const WAIT: Duration = Duration::from_secs(5);

/// Accepting login moves the session online.
#[tokio::test]
async fn login_accept_goes_online() {
    let (mut server, mut harness) = Harness::spawn(tuned_config()).await;
    server.accept_login("secret").await;

    harness.wait_for_state(SessionState::Online).await;
    assert!(matches!(harness.next_event().await, SessionEvent::LoggedIn));
    harness.shutdown().await.expect("clean shutdown");
}

/// Rejecting login is terminal: no reconnect, state lands on `dead`.
#[tokio::test]
async fn login_reject_is_terminal() {
    let (mut server, mut harness) = Harness::spawn(tuned_config()).await;

    let login = server.recv_frame().await;
    assert_eq!(login, ClientFrame::Login { password: "secret".into() });
    server.send(&fixtures::login_response(false)).await;

    assert!(matches!(harness.next_event().await, SessionEvent::AuthFailed));
    let result = timeout(WAIT, &mut harness.runner).await.expect("engine exits").expect("no panic");
    assert!(matches!(result, Err(SessionError::AuthFailed)));
    assert_eq!(*harness.streams.state.borrow(), SessionState::Dead);

    // No further connection attempt follows a rejected password.
    assert!(server.recv_within(Duration::from_millis(400)).await.is_none());
}

/// A command goes out at sequence zero, the reply comes back, and the
/// pending slot stops retrying.
#[tokio::test]
async fn command_round_trip() {
    let (mut server, mut harness) = Harness::spawn(tuned_config()).await;
    server.accept_login("secret").await;
    harness.wait_for_state(SessionState::Online).await;

    harness.commands.send("players").expect("queue accepts");
    let frame = server.recv_frame().await;
    assert_eq!(frame, ClientFrame::Command { seq: 0, command: "players".into() });
    server.send(&fixtures::command_reply(0, "Players on server: 0")).await;

    let reply = timeout(WAIT, harness.streams.replies.recv()).await.expect("reply arrives").expect("stream open");
    assert_eq!(reply.seq, 0);
    assert!(reply.part.is_none());
    assert_eq!(&reply.payload[..], b"Players on server: 0");

    // Acked: the retry sweep must stay quiet.
    assert!(server.recv_within(3 * RETRY).await.is_none());
    assert_eq!(harness.metrics.retransmits(), 0);
    harness.shutdown().await.expect("clean shutdown");
}

/// Successive commands use successive sequence bytes.
#[tokio::test]
async fn sequences_are_monotonic() {
    let (mut server, mut harness) = Harness::spawn(tuned_config()).await;
    server.accept_login("secret").await;
    harness.wait_for_state(SessionState::Online).await;

    for expected_seq in 0..4u8 {
        harness.commands.send(format!("cmd {expected_seq}")).expect("queue accepts");
        let frame = server.recv_frame().await;
        match frame {
            ClientFrame::Command { seq, .. } => assert_eq!(seq, expected_seq),
            other => panic!("unexpected frame {other:?}"),
        }
        server.send(&fixtures::command_reply(expected_seq, "ok")).await;
    }
    harness.shutdown().await.expect("clean shutdown");
}

/// A fragmented reply delivered out of order assembles exactly once.
#[tokio::test]
async fn fragmented_reply_assembles() {
    let (mut server, mut harness) = Harness::spawn(tuned_config()).await;
    server.accept_login("secret").await;
    harness.wait_for_state(SessionState::Online).await;

    server.send(&fixtures::command_reply_part(5, 3, 0, "AAA")).await;
    server.send(&fixtures::command_reply_part(5, 3, 2, "CCC")).await;
    server.send(&fixtures::command_reply_part(5, 3, 1, "BBB")).await;

    let mut assembler = ReplyAssembler::new(ReplyAssemblerConfig::default());
    let mut drops = Vec::new();
    let mut joined = None;
    for _ in 0..3 {
        let reply = timeout(WAIT, harness.streams.replies.recv()).await.expect("fragment").expect("stream open");
        joined = assembler.ingest(reply, Instant::now(), &mut drops);
    }
    let joined = joined.expect("assembled on final fragment");
    assert_eq!(joined.seq, 5);
    assert_eq!(joined.text, "AAABBBCCC");
    assert!(drops.is_empty());
    harness.shutdown().await.expect("clean shutdown");
}

/// Retry then success: the second transmission is answered, totals stay at
/// exactly two datagrams for that sequence.
#[tokio::test]
async fn retry_then_success() {
    let (mut server, mut harness) = Harness::spawn(tuned_config()).await;
    server.accept_login("secret").await;
    harness.wait_for_state(SessionState::Online).await;

    harness.commands.send("missions").expect("queue accepts");

    // Initial transmission is ignored; the retry gets an answer.
    let first = server.recv_frame().await;
    assert_eq!(first, ClientFrame::Command { seq: 0, command: "missions".into() });
    let second = server.recv_frame().await;
    assert_eq!(second, first);
    server.send(&fixtures::command_reply(0, "mission list")).await;

    let reply = timeout(WAIT, harness.streams.replies.recv()).await.expect("reply").expect("stream open");
    assert_eq!(reply.seq, 0);

    assert!(server.recv_within(3 * RETRY).await.is_none(), "slot kept retrying after ack");
    assert_eq!(harness.metrics.retransmits(), 1);
    harness.shutdown().await.expect("clean shutdown");
}

/// Retry exhaustion: six transmissions, one SendTimeout, slot cleared.
#[tokio::test]
async fn retry_exhaustion() {
    let (mut server, mut harness) = Harness::spawn(tuned_config()).await;
    server.accept_login("secret").await;
    harness.wait_for_state(SessionState::Online).await;
    assert!(matches!(harness.next_event().await, SessionEvent::LoggedIn));

    harness.commands.send("void").expect("queue accepts");

    let mut transmissions = 0;
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        tokio::select! {
            frame = server.recv_frame() => {
                assert_eq!(frame, ClientFrame::Command { seq: 0, command: "void".into() });
                transmissions += 1;
            }
            event = harness.streams.events.recv() => {
                match event.expect("stream open") {
                    SessionEvent::SendTimeout { seq } => {
                        assert_eq!(seq, 0);
                        break;
                    }
                    other => panic!("unexpected event {other:?}"),
                }
            }
            _ = tokio::time::sleep_until(deadline) => panic!("no SendTimeout within {WAIT:?}"),
        }
    }
    assert_eq!(transmissions, 6, "initial send plus five retries");

    // Slot is clear: nothing else goes out for this sequence.
    assert!(server.recv_within(3 * RETRY).await.is_none());
    assert_eq!(harness.metrics.send_timeouts(), 1);
    harness.shutdown().await.expect("clean shutdown");
}

/// Every server message is acknowledged with the server's own sequence.
#[tokio::test]
async fn server_message_is_acked() {
    let (mut server, mut harness) = Harness::spawn(tuned_config()).await;
    server.accept_login("secret").await;
    harness.wait_for_state(SessionState::Online).await;

    server.send(&fixtures::server_message(0x2A, "(Global) zed: hi")).await;

    let ack = server.recv_frame().await;
    assert_eq!(ack, ClientFrame::MessageAck { seq: 0x2A });
    assert!(server.recv_within(2 * RETRY).await.is_none(), "acks are not retried");

    let message = timeout(WAIT, harness.streams.messages.recv()).await.expect("message").expect("stream open");
    assert_eq!(message.seq, 0x2A);
    assert_eq!(message.message, "(Global) zed: hi");
    harness.shutdown().await.expect("clean shutdown");
}

/// After the configured idle span the engine sends an empty command as a
/// keepalive, and retries it like any command until acknowledged.
#[tokio::test]
async fn idle_heartbeat_fires() {
    let mut config = tuned_config();
    config.heartbeat_idle = Duration::from_millis(500);
    let (mut server, mut harness) = Harness::spawn(config).await;
    server.accept_login("secret").await;
    harness.wait_for_state(SessionState::Online).await;

    // Quiet before the idle threshold.
    assert!(server.recv_within(Duration::from_millis(250)).await.is_none());

    let beat = server.recv_frame().await;
    assert_eq!(beat, ClientFrame::Command { seq: 0, command: String::new() });
    server.send(&fixtures::command_reply(0, "")).await;
    assert_eq!(harness.metrics.heartbeats_sent(), 1);
    harness.shutdown().await.expect("clean shutdown");
}

/// Messages that arrive before the login verdict are dropped, not surfaced.
#[tokio::test]
async fn traffic_before_login_is_dropped() {
    let (mut server, mut harness) = Harness::spawn(tuned_config()).await;

    let login = server.recv_frame().await;
    assert!(matches!(login, ClientFrame::Login { .. }));
    server.send(&fixtures::server_message(1, "too early")).await;
    server.send(&fixtures::login_response(true)).await;

    harness.wait_for_state(SessionState::Online).await;
    assert!(
        timeout(Duration::from_millis(300), harness.streams.messages.recv()).await.is_err(),
        "pre-login message must not surface"
    );
    harness.shutdown().await.expect("clean shutdown");
}

/// The engine survives a dead link and logs in again after the backoff.
#[tokio::test]
async fn reconnects_after_read_deadline() {
    let mut config = tuned_config();
    config.first_read_timeout = Duration::from_millis(200);
    config.read_timeout = Duration::from_millis(400);
    config.reconnect_delay = Duration::from_millis(100);
    let (mut server, mut harness) = Harness::spawn(config).await;

    // Ignore the first login; the read deadline forces a reconnect.
    let first = server.recv_frame().await;
    assert!(matches!(first, ClientFrame::Login { .. }));

    // The second attempt is accepted.
    server.accept_login("secret").await;
    harness.wait_for_state(SessionState::Online).await;
    assert!(harness.metrics.reconnects() >= 1);
    harness.shutdown().await.expect("clean shutdown");
}

/// Shutdown stops the engine promptly.
#[tokio::test]
async fn session_exits_on_signal() {
    let (mut server, harness) = Harness::spawn(tuned_config()).await;
    server.accept_login("secret").await;
    harness.shutdown().await.expect("clean shutdown");
}

const RETRY: Duration = Duration::from_millis(100);

fn tuned_config() -> RconConfig {
    let mut config = RconConfig::new("placeholder", "secret");
    config.retry_interval = RETRY;
    config.first_read_timeout = Duration::from_secs(5);
    config.read_timeout = Duration::from_secs(5);
    config.heartbeat_idle = Duration::from_secs(30);
    config.reconnect_delay = Duration::from_millis(100);
    config
}

struct Harness {
    commands: CommandSender,
    streams: EventStreams,
    metrics: std::sync::Arc<warden_rcon::RconMetrics>,
    shutdown_tx: watch::Sender<bool>,
    runner: tokio::task::JoinHandle<Result<(), SessionError>>,
}

impl Harness {
    async fn spawn(mut config: RconConfig) -> (FakeServer, Harness) {
        let server = FakeServer::bind().await;
        config.server = server.addr.to_string();

        let (client, commands, streams) = RconClient::new(config);
        let metrics = client.metrics();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn(client.run(shutdown_rx));

        (server, Harness { commands, streams, metrics, shutdown_tx, runner })
    }

    async fn wait_for_state(&mut self, wanted: SessionState) {
        timeout(WAIT, self.streams.state.wait_for(|state| *state == wanted))
            .await
            .expect("state deadline")
            .expect("state channel open");
    }

    async fn next_event(&mut self) -> SessionEvent {
        timeout(WAIT, self.streams.events.recv()).await.expect("event deadline").expect("event stream open")
    }

    async fn shutdown(self) -> Result<(), SessionError> {
        let _ = self.shutdown_tx.send(true);
        timeout(WAIT, self.runner).await.expect("engine join deadline").expect("engine task panicked")
    }
}

/// A scripted stand-in for the game server: one datagram socket plus the
/// peer address learned from the first datagram.
struct FakeServer {
    socket: UdpSocket,
    addr: SocketAddr,
    peer: Option<SocketAddr>,
}

impl FakeServer {
    async fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind fake server");
        let addr = socket.local_addr().expect("local addr");
        Self { socket, addr, peer: None }
    }

    /// Consumes the login request and answers it positively.
    async fn accept_login(&mut self, expected_password: &str) {
        let frame = self.recv_frame().await;
        assert_eq!(frame, ClientFrame::Login { password: expected_password.into() });
        self.send(&fixtures::login_response(true)).await;
    }

    async fn recv_frame(&mut self) -> ClientFrame {
        timeout(WAIT, self.recv_frame_inner()).await.expect("datagram deadline")
    }

    async fn recv_within(&mut self, wait: Duration) -> Option<ClientFrame> {
        timeout(wait, self.recv_frame_inner()).await.ok()
    }

    async fn recv_frame_inner(&mut self) -> ClientFrame {
        let mut buf = vec![0u8; 4096];
        let (len, peer) = self.socket.recv_from(&mut buf).await.expect("fake server recv");
        self.peer = Some(peer);
        ClientFrame::parse(&buf[..len]).expect("client datagram decodes")
    }

    async fn send(&self, datagram: &[u8]) {
        let peer = self.peer.expect("client spoke first");
        self.socket.send_to(datagram, peer).await.expect("fake server send");
    }
}
