pub mod config;
pub mod events;
pub mod fixtures;
pub mod frame;
pub mod metrics;
pub mod session;
mod task;

pub use config::RconConfig;
pub use events::{CommandError, CommandReply, ServerMessage, SessionEvent};
pub use frame::{AssembledReply, DropReason, ReplyAssembler, ReplyAssemblerConfig};
pub use metrics::RconMetrics;
pub use session::{CommandSender, EventStreams, RconClient, SessionError, SessionHandle, SessionState};
