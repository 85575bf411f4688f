use std::time::Duration;

/// Engine configuration. `server` and `password` come from the operator;
/// everything else defaults to the protocol's nominal timings and only moves
/// in tests.
#[derive(Debug, Clone)]
pub struct RconConfig {
    /// Peer endpoint, `host:port`.
    pub server: String,
    /// Shared RCON password. May be empty; the server will reject it.
    pub password: String,

    /// Outbound command queue depth. Producers see `QueueFull` beyond this.
    pub command_queue: usize,
    /// Command-reply stream depth.
    pub reply_queue: usize,
    /// Server-message stream depth.
    pub message_queue: usize,
    /// Session event stream depth. Events are dropped, not blocked on, when
    /// the consumer lags.
    pub event_queue: usize,

    /// Deadline for the first datagram after sending the login request.
    pub first_read_timeout: Duration,
    /// Deadline between datagrams once the link has produced one.
    pub read_timeout: Duration,
    /// Retry sweep period over the pending table.
    pub retry_interval: Duration,
    /// Retransmissions per pending command before it is abandoned.
    pub max_retries: u8,
    /// Consecutive abandoned commands before the peer is declared dead.
    pub max_consecutive_failures: u32,
    /// Outbound idle span after which a keepalive command is sent.
    pub heartbeat_idle: Duration,
    /// Pause between connection attempts.
    pub reconnect_delay: Duration,
}

impl RconConfig {
    pub fn new(server: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            password: password.into(),
            command_queue: 10,
            reply_queue: 20,
            message_queue: 20,
            event_queue: 16,
            first_read_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(45),
            retry_interval: Duration::from_secs(1),
            max_retries: 5,
            max_consecutive_failures: 5,
            heartbeat_idle: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(15),
        }
    }
}
