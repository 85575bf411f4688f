pub mod assembler;
pub mod codec;

pub use assembler::{AssembledReply, ReplyAssembler, ReplyAssemblerConfig};
pub use codec::{ClientFrame, DecodeError, PacketKind, PartHeader, ServerFrame, CRC_SPAN_OFFSET, HEADER_LEN, RCON_MAGIC};

/// Drop reasons exposed via metrics and structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    Truncated,
    Magic,
    Spacer,
    Kind,
    Crc,
    Fragment,
    NotLoggedIn,
    FragmentTimeout,
}

impl DropReason {
    pub const ALL: [DropReason; 8] = [
        DropReason::Truncated,
        DropReason::Magic,
        DropReason::Spacer,
        DropReason::Kind,
        DropReason::Crc,
        DropReason::Fragment,
        DropReason::NotLoggedIn,
        DropReason::FragmentTimeout,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::Truncated => "truncated",
            DropReason::Magic => "magic",
            DropReason::Spacer => "spacer",
            DropReason::Kind => "kind",
            DropReason::Crc => "crc",
            DropReason::Fragment => "fragment",
            DropReason::NotLoggedIn => "not_logged_in",
            DropReason::FragmentTimeout => "fragment_timeout",
        }
    }

    pub fn index(self) -> usize {
        match self {
            DropReason::Truncated => 0,
            DropReason::Magic => 1,
            DropReason::Spacer => 2,
            DropReason::Kind => 3,
            DropReason::Crc => 4,
            DropReason::Fragment => 5,
            DropReason::NotLoggedIn => 6,
            DropReason::FragmentTimeout => 7,
        }
    }
}

/// Lightweight description of a dropped datagram or reassembly slot.
#[derive(Debug, Clone, Copy)]
pub struct DropEvent {
    pub reason: DropReason,
    pub seq: Option<u8>,
    pub bytes: usize,
}

impl DropEvent {
    pub fn new(reason: DropReason, seq: Option<u8>, bytes: usize) -> Self {
        Self { reason, seq, bytes }
    }
}
