use crate::frame::DropReason;
use bytes::Bytes;
use crc32fast::Hasher;
use thiserror::Error;

/// Magic prefix carried by every datagram.
pub const RCON_MAGIC: [u8; 2] = *b"BE";
/// Fixed header: magic(2) + crc32-LE(4) + spacer(1) + kind(1).
pub const HEADER_LEN: usize = 8;
/// The CRC covers everything from the spacer byte to the end of the datagram.
pub const CRC_SPAN_OFFSET: usize = 6;

const CRC_OFFSET: usize = 2;
const SPACER: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Login = 0x00,
    Command = 0x01,
    Message = 0x02,
}

impl PacketKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PacketKind::Login => "login",
            PacketKind::Command => "command",
            PacketKind::Message => "message",
        }
    }
}

impl TryFrom<u8> for PacketKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(PacketKind::Login),
            0x01 => Ok(PacketKind::Command),
            0x02 => Ok(PacketKind::Message),
            _ => Err(()),
        }
    }
}

/// Sub-header announcing a fragmented command reply: `(0x00, total, index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartHeader {
    pub total: u8,
    pub index: u8,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram too short ({0} bytes)")]
    Truncated(usize),
    #[error("bad magic {0:02x?}")]
    Magic([u8; 2]),
    #[error("bad spacer 0x{0:02x}")]
    Spacer(u8),
    #[error("unknown packet kind 0x{0:02x}")]
    Kind(u8),
    #[error("crc mismatch: header 0x{header:08x}, computed 0x{computed:08x}")]
    Crc { header: u32, computed: u32 },
    #[error("fragment index {index} out of range for total {total}")]
    Fragment { total: u8, index: u8 },
}

impl DecodeError {
    pub fn reason(&self) -> DropReason {
        match self {
            DecodeError::Truncated(_) => DropReason::Truncated,
            DecodeError::Magic(_) => DropReason::Magic,
            DecodeError::Spacer(_) => DropReason::Spacer,
            DecodeError::Kind(_) => DropReason::Kind,
            DecodeError::Crc { .. } => DropReason::Crc,
            DecodeError::Fragment { .. } => DropReason::Fragment,
        }
    }
}

/// Frames transmitted by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Password handshake. The password fills the rest of the datagram.
    Login { password: String },
    /// Sequenced administrative command. An empty command is the keepalive.
    Command { seq: u8, command: String },
    /// Acknowledges a server message, echoing the server's sequence.
    MessageAck { seq: u8 },
}

/// Frames transmitted by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Login verdict: one payload byte, `0x01` accepted.
    Login { accepted: bool },
    /// Reply to a client command, possibly one fragment of several.
    Reply { seq: u8, part: Option<PartHeader>, payload: Bytes },
    /// Asynchronous server message (chat, joins, kicks).
    Message { seq: u8, message: Bytes },
}

impl ClientFrame {
    pub fn kind(&self) -> PacketKind {
        match self {
            ClientFrame::Login { .. } => PacketKind::Login,
            ClientFrame::Command { .. } => PacketKind::Command,
            ClientFrame::MessageAck { .. } => PacketKind::Message,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            ClientFrame::Login { password } => seal(PacketKind::Login, password.as_bytes()),
            ClientFrame::Command { seq, command } => {
                let mut body = Vec::with_capacity(1 + command.len());
                body.push(*seq);
                body.extend_from_slice(command.as_bytes());
                seal(PacketKind::Command, &body)
            }
            ClientFrame::MessageAck { seq } => seal(PacketKind::Message, &[*seq]),
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, DecodeError> {
        let (kind, payload) = split_verified(buf)?;
        match kind {
            PacketKind::Login => Ok(ClientFrame::Login { password: String::from_utf8_lossy(payload).into_owned() }),
            PacketKind::Command => {
                let (seq, rest) = split_seq(payload)?;
                Ok(ClientFrame::Command { seq, command: String::from_utf8_lossy(rest).into_owned() })
            }
            PacketKind::Message => {
                let (seq, _) = split_seq(payload)?;
                Ok(ClientFrame::MessageAck { seq })
            }
        }
    }
}

impl ServerFrame {
    pub fn kind(&self) -> PacketKind {
        match self {
            ServerFrame::Login { .. } => PacketKind::Login,
            ServerFrame::Reply { .. } => PacketKind::Command,
            ServerFrame::Message { .. } => PacketKind::Message,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            ServerFrame::Login { accepted } => seal(PacketKind::Login, &[u8::from(*accepted)]),
            ServerFrame::Reply { seq, part, payload } => {
                let mut body = Vec::with_capacity(4 + payload.len());
                body.push(*seq);
                if let Some(part) = part {
                    body.push(0x00);
                    body.push(part.total);
                    body.push(part.index);
                }
                body.extend_from_slice(payload);
                seal(PacketKind::Command, &body)
            }
            ServerFrame::Message { seq, message } => {
                let mut body = Vec::with_capacity(1 + message.len());
                body.push(*seq);
                body.extend_from_slice(message);
                seal(PacketKind::Message, &body)
            }
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, DecodeError> {
        let (kind, payload) = split_verified(buf)?;
        match kind {
            PacketKind::Login => {
                let code = payload.first().ok_or(DecodeError::Truncated(buf.len()))?;
                Ok(ServerFrame::Login { accepted: *code == 0x01 })
            }
            PacketKind::Command => {
                let (seq, rest) = split_seq(payload)?;
                // A 0x00 directly after the sequence announces the 3-byte
                // fragmentation sub-header, provided the frame is long enough
                // to actually carry it.
                if payload.len() >= 4 && payload[1] == 0x00 {
                    let part = PartHeader { total: payload[2], index: payload[3] };
                    if part.index >= part.total {
                        return Err(DecodeError::Fragment { total: part.total, index: part.index });
                    }
                    Ok(ServerFrame::Reply { seq, part: Some(part), payload: Bytes::copy_from_slice(&rest[3..]) })
                } else {
                    Ok(ServerFrame::Reply { seq, part: None, payload: Bytes::copy_from_slice(rest) })
                }
            }
            PacketKind::Message => {
                let (seq, rest) = split_seq(payload)?;
                Ok(ServerFrame::Message { seq, message: Bytes::copy_from_slice(rest) })
            }
        }
    }
}

/// Validates the fixed header and the CRC, returning the packet kind and the
/// payload after the header. Every check failure maps onto a [`DropReason`]
/// so callers can drop the datagram silently and still account for it.
fn split_verified(buf: &[u8]) -> Result<(PacketKind, &[u8]), DecodeError> {
    if buf.len() < HEADER_LEN {
        return Err(DecodeError::Truncated(buf.len()));
    }
    if buf[..2] != RCON_MAGIC {
        return Err(DecodeError::Magic([buf[0], buf[1]]));
    }
    if buf[6] != SPACER {
        return Err(DecodeError::Spacer(buf[6]));
    }
    let kind = PacketKind::try_from(buf[7]).map_err(|_| DecodeError::Kind(buf[7]))?;

    let header = u32::from_le_bytes(buf[CRC_OFFSET..CRC_OFFSET + 4].try_into().unwrap());
    let computed = crc_span(&buf[CRC_SPAN_OFFSET..]);
    if header != computed {
        return Err(DecodeError::Crc { header, computed });
    }

    Ok((kind, &buf[HEADER_LEN..]))
}

fn split_seq(payload: &[u8]) -> Result<(u8, &[u8]), DecodeError> {
    match payload.split_first() {
        Some((seq, rest)) => Ok((*seq, rest)),
        None => Err(DecodeError::Truncated(HEADER_LEN)),
    }
}

fn seal(kind: PacketKind, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend_from_slice(&RCON_MAGIC);
    buf.extend_from_slice(&[0u8; 4]);
    buf.push(SPACER);
    buf.push(kind as u8);
    buf.extend_from_slice(body);
    patch_crc(&mut buf);
    buf
}

/// Recomputes the CRC over `buf[6..]` and writes it back into the header.
/// Used by `seal` and by anything that mutates an already-encoded frame.
pub fn patch_crc(buf: &mut [u8]) {
    let crc = crc_span(&buf[CRC_SPAN_OFFSET..]);
    buf[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
}

fn crc_span(span: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(span);
    hasher.finalize()
}
