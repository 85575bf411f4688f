use crate::events::CommandReply;
use crate::frame::{DropEvent, DropReason};
use bytes::Bytes;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ReplyAssemblerConfig {
    /// How long an incomplete slot may wait for its remaining fragments.
    pub slot_ttl: Duration,
}

impl Default for ReplyAssemblerConfig {
    fn default() -> Self {
        Self { slot_ttl: Duration::from_secs(30) }
    }
}

/// Joins fragmented command replies back into whole responses.
///
/// One slot per sequence byte, no hashing. A slot goes live on its first
/// fragment and is cleared once every announced part is present or the slot
/// deadline passes. Duplicate fragments replace in place; a presence bitmap
/// rather than a counter decides completion, so redelivery cannot complete a
/// slot early.
#[derive(Debug)]
pub struct ReplyAssembler {
    config: ReplyAssemblerConfig,
    slots: [Option<Box<SlotState>>; 256],
}

#[derive(Debug)]
struct SlotState {
    total: u8,
    present: [u64; 4],
    parts: Vec<Option<Bytes>>,
    buffered: usize,
    first_rx: Instant,
}

impl SlotState {
    fn new(total: u8, now: Instant) -> Self {
        Self { total, present: [0; 4], parts: vec![None; total as usize], buffered: 0, first_rx: now }
    }

    fn mark(&mut self, index: u8) {
        self.present[index as usize / 64] |= 1 << (index % 64);
    }

    fn is_marked(&self, index: u8) -> bool {
        self.present[index as usize / 64] & (1 << (index % 64)) != 0
    }

    fn received(&self) -> u32 {
        self.present.iter().map(|word| word.count_ones()).sum()
    }
}

/// A fully joined reply, ready for the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledReply {
    pub seq: u8,
    pub text: String,
}

impl ReplyAssembler {
    pub fn new(config: ReplyAssemblerConfig) -> Self {
        Self { config, slots: std::array::from_fn(|_| None) }
    }

    /// Feeds one command-reply event. Returns the joined reply once complete.
    pub fn ingest(&mut self, reply: CommandReply, now: Instant, drops: &mut Vec<DropEvent>) -> Option<AssembledReply> {
        let part = match reply.part {
            None => return Some(AssembledReply { seq: reply.seq, text: lossy(&reply.payload) }),
            Some(part) => part,
        };

        let slot = self.slots[reply.seq as usize]
            .get_or_insert_with(|| Box::new(SlotState::new(part.total, now)));

        // The first fragment fixes the expected part count; a disagreeing
        // sub-header means the datagram belongs to some other response.
        if part.total != slot.total || part.index >= slot.total {
            drops.push(DropEvent::new(DropReason::Fragment, Some(reply.seq), reply.payload.len()));
            return None;
        }

        if slot.is_marked(part.index) {
            slot.buffered -= slot.parts[part.index as usize].as_ref().map_or(0, Bytes::len);
        }
        slot.buffered += reply.payload.len();
        slot.parts[part.index as usize] = Some(reply.payload);
        slot.mark(part.index);

        if slot.received() == slot.total as u32 {
            let slot = self.slots[reply.seq as usize].take().expect("slot live");
            let mut joined = Vec::with_capacity(slot.buffered);
            for chunk in slot.parts.iter().flatten() {
                joined.extend_from_slice(chunk);
            }
            return Some(AssembledReply { seq: reply.seq, text: lossy(&joined) });
        }

        None
    }

    /// Drops slots whose deadline passed without the full set of fragments.
    pub fn collect_expired(&mut self, now: Instant, drops: &mut Vec<DropEvent>) {
        for (seq, entry) in self.slots.iter_mut().enumerate() {
            let expired = entry.as_ref().is_some_and(|slot| now.duration_since(slot.first_rx) >= self.config.slot_ttl);
            if expired {
                let slot = entry.take().expect("slot live");
                drops.push(DropEvent::new(DropReason::FragmentTimeout, Some(seq as u8), slot.buffered));
            }
        }
    }

    /// Forgets every in-flight slot. Called when the session reconnects.
    pub fn clear(&mut self) {
        for entry in self.slots.iter_mut() {
            *entry = None;
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
