use std::time::{Duration, Instant};
use warden_rcon::events::CommandReply;
use warden_rcon::fixtures;
use warden_rcon::frame::{DropEvent, ReplyAssembler, ReplyAssemblerConfig, ServerFrame};
use warden_rcon::{DropReason, RconMetrics};

/// Feeds a hostile datagram stream through the decode + reassembly path and
/// checks that every piece of garbage is dropped, accounted for, and leaves
/// the good traffic untouched.
#[test]
fn adverse_stream_is_bounded() {
    let mut harness = Harness::new(Duration::from_millis(100));
    let mut now = Instant::now();

    harness.process(&fixtures::command_reply(1, "clean"), now);

    now += Duration::from_millis(5);
    harness.process(&fixtures::mutated(fixtures::command_reply(2, "bad magic"), |buf| buf[0] = b'X'), now);

    now += Duration::from_millis(5);
    harness.process(&fixtures::mutated(fixtures::command_reply(3, "bit rot"), |buf| buf[10] ^= 0x08), now);

    now += Duration::from_millis(5);
    harness.process(&fixtures::command_reply(4, "still clean")[..6], now);

    now += Duration::from_millis(5);
    let ok = fixtures::server_message(9, "ignored kind");
    harness.process(&fixtures::mutated(ok, |buf| {
        buf[7] = 0x05;
        patch(buf);
    }), now);

    now += Duration::from_millis(5);
    harness.process(&fixtures::mutated(fixtures::command_reply(5, "spacer"), |buf| {
        buf[6] = 0x00;
        patch(buf);
    }), now);

    // A lone fragment that never completes.
    now += Duration::from_millis(5);
    harness.process(&fixtures::command_reply_part(6, 2, 0, "half"), now);
    now += Duration::from_millis(200);
    harness.advance(now);

    // The stream stays usable afterwards.
    harness.process(&fixtures::command_reply(7, "after the storm"), now);

    assert_eq!(harness.assembled, vec!["clean".to_string(), "after the storm".to_string()]);

    let drops = harness.metrics.drops_snapshot();
    assert_eq!(count_for(&drops, "magic"), 1);
    assert_eq!(count_for(&drops, "crc"), 1);
    assert_eq!(count_for(&drops, "truncated"), 1);
    assert_eq!(count_for(&drops, "kind"), 1);
    assert_eq!(count_for(&drops, "spacer"), 1);
    assert_eq!(count_for(&drops, "fragment_timeout"), 1);
}

#[test]
fn fragment_header_garbage_is_dropped() {
    let mut harness = Harness::new(Duration::from_secs(30));
    let now = Instant::now();

    // Index beyond the announced total never reaches the assembler.
    let bad_index = fixtures::mutated(fixtures::command_reply_part(8, 3, 0, "x"), |buf| {
        buf[11] = 7;
        patch(buf);
    });
    harness.process(&bad_index, now);
    assert_eq!(count_for(&harness.metrics.drops_snapshot(), "fragment"), 1);

    // A fragment disagreeing about the total is dropped by the assembler.
    harness.process(&fixtures::command_reply_part(8, 3, 0, "x"), now);
    harness.process(&fixtures::command_reply_part(8, 4, 1, "y"), now);
    assert_eq!(count_for(&harness.metrics.drops_snapshot(), "fragment"), 2);
    assert!(harness.assembled.is_empty());
}

fn patch(buf: &mut [u8]) {
    warden_rcon::frame::codec::patch_crc(buf);
}

fn count_for(entries: &[(&str, u64)], key: &str) -> u64 {
    entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v).unwrap_or(0)
}

struct Harness {
    assembler: ReplyAssembler,
    metrics: RconMetrics,
    drop_events: Vec<DropEvent>,
    assembled: Vec<String>,
}

impl Harness {
    fn new(slot_ttl: Duration) -> Self {
        Self {
            assembler: ReplyAssembler::new(ReplyAssemblerConfig { slot_ttl }),
            metrics: RconMetrics::new(),
            drop_events: Vec::new(),
            assembled: Vec::new(),
        }
    }

    fn process(&mut self, datagram: &[u8], now: Instant) {
        self.advance(now);
        self.metrics.record_frame(datagram.len());
        match ServerFrame::parse(datagram) {
            Ok(ServerFrame::Reply { seq, part, payload }) => {
                let reply = CommandReply { seq, part, payload };
                if let Some(assembled) = self.assembler.ingest(reply, now, &mut self.drop_events) {
                    self.assembled.push(assembled.text);
                }
                self.consume_drop_events();
            }
            Ok(_) => {}
            Err(err) => self.metrics.record_drop(err.reason()),
        }
    }

    fn advance(&mut self, now: Instant) {
        self.assembler.collect_expired(now, &mut self.drop_events);
        self.consume_drop_events();
    }

    fn consume_drop_events(&mut self) {
        for event in self.drop_events.drain(..) {
            self.metrics.record_drop(event.reason);
        }
    }
}

/// Decode never panics on arbitrary short inputs.
#[test]
fn tiny_datagrams_are_rejected() {
    for len in 0..8 {
        let buf = vec![0x42; len];
        assert!(ServerFrame::parse(&buf).is_err());
    }
    assert_eq!(
        count_reason(&fixtures::mutated(fixtures::command_reply(0, ""), |_| {})),
        None,
        "well-formed empty reply must parse"
    );
}

fn count_reason(datagram: &[u8]) -> Option<DropReason> {
    ServerFrame::parse(datagram).err().map(|err| err.reason())
}
