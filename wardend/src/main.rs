mod config;
mod console;
mod filter;
mod lookup;
mod parse;
mod sinks;

use clap::Parser;
use config::WardenConfig;
use filter::ChatFilter;
use log::{debug, error, info, warn};
use lookup::PlayerDirectory;
use parse::{MessageEvent, MessageParser};
use sinks::{AdminLogs, SinkKind};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use warden_rcon::{
    AssembledReply, CommandReply, CommandSender, RconClient, RconConfig, ReplyAssembler, ReplyAssemblerConfig,
    ServerMessage, SessionEvent, SessionState,
};

#[derive(Parser, Debug)]
#[command(name = "wardend")]
#[command(version, about = "Game-server administration daemon speaking BattlEye-style RCON")]
struct Args {
    /// JSON config file
    #[arg(short, long, default_value = "config/default.json")]
    config: PathBuf,

    /// Disable the interactive stdin console
    #[arg(long, default_value_t = false)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
    let args = Args::parse();

    let config = WardenConfig::from_file(&args.config)?;
    info!("wardend.event=start server={}", config.server);

    let logs = Arc::new(AdminLogs::open(&config.log_dir)?);
    let filter = match ChatFilter::load(&config.chat_filter) {
        Ok(filter) => {
            info!("wardend.event=filter_loaded rules={}", filter.len());
            Arc::new(filter)
        }
        Err(err) => {
            warn!("wardend.event=filter_unavailable reason={err}");
            Arc::new(ChatFilter::default())
        }
    };
    let directory = match &config.lookup {
        Some(lookup) => Some(Arc::new(PlayerDirectory::new(lookup)?)),
        None => None,
    };
    let parser = Arc::new(MessageParser::new());

    let (client, commands, streams) =
        RconClient::new(RconConfig::new(config.server.clone(), config.rconpw.clone()));
    let session = client.start();

    let (stop_tx, stop_rx) = watch::channel(false);
    let (fatal_tx, fatal_rx) = oneshot::channel();
    let (response_tx, response_rx) = mpsc::channel(16);

    tokio::spawn(assemble_replies(streams.replies, streams.state, response_tx));
    tokio::spawn(handle_responses(response_rx, parser.clone()));
    tokio::spawn(handle_messages(
        streams.messages,
        commands.clone(),
        parser,
        filter,
        logs.clone(),
        directory,
    ));
    tokio::spawn(handle_events(streams.events, logs, fatal_tx));
    if !args.no_console {
        tokio::spawn(console::run(commands, stop_rx));
    }

    tokio::select! {
        _ = signal::ctrl_c() => info!("wardend.event=interrupt"),
        _ = fatal_rx => error!("wardend.event=session_fatal"),
    }

    session.signal_exit();
    let _ = stop_tx.send(true);
    Ok(())
}

/// Joins fragmented command replies and forwards whole responses. In-flight
/// fragments belong to the connection that produced them, so a reconnect
/// clears the table.
async fn assemble_replies(
    mut replies: mpsc::Receiver<CommandReply>,
    mut state: watch::Receiver<SessionState>,
    out: mpsc::Sender<AssembledReply>,
) {
    let mut assembler = ReplyAssembler::new(ReplyAssemblerConfig::default());
    let mut drops = Vec::new();
    let mut gc = interval(Duration::from_secs(5));
    gc.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            received = replies.recv() => {
                let Some(reply) = received else { break };
                if let Some(joined) = assembler.ingest(reply, Instant::now(), &mut drops) {
                    if out.send(joined).await.is_err() {
                        break;
                    }
                }
            }
            changed = state.changed() => {
                if changed.is_ok() && *state.borrow() == SessionState::Connecting {
                    assembler.clear();
                }
            }
            _ = gc.tick() => assembler.collect_expired(Instant::now(), &mut drops),
        }
        for dropped in drops.drain(..) {
            warn!(
                "rcon.event=reply_drop reason={} seq={:?} bytes={}",
                dropped.reason.as_str(),
                dropped.seq,
                dropped.bytes
            );
        }
    }
}

/// Consumes assembled command responses.
async fn handle_responses(mut responses: mpsc::Receiver<AssembledReply>, parser: Arc<MessageParser>) {
    while let Some(reply) = responses.recv().await {
        if reply.text.starts_with("Players on server:") {
            let rows = parser.parse_roster(&reply.text);
            info!("roster.event=players count={}", rows.len());
            for row in rows {
                info!(
                    "roster.event=row number={} addr={}:{} ping={} guid={} name={:?}",
                    row.number,
                    row.ip,
                    row.port,
                    row.ping,
                    row.guid.as_deref().unwrap_or("-"),
                    row.name
                );
            }
        } else if !reply.text.is_empty() {
            info!("rcon.event=response seq={} text={:?}", reply.seq, reply.text);
        }
        // Empty responses are keepalive acknowledgements; nothing to do.
    }
}

/// Consumes asynchronous server messages: chat, joins, GUID logins, kicks.
async fn handle_messages(
    mut messages: mpsc::Receiver<ServerMessage>,
    commands: CommandSender,
    parser: Arc<MessageParser>,
    filter: Arc<ChatFilter>,
    logs: Arc<AdminLogs>,
    directory: Option<Arc<PlayerDirectory>>,
) {
    // Player numbers by name, maintained from join/kick traffic so the chat
    // filter can act on offenders.
    let mut online: HashMap<String, u16> = HashMap::new();

    while let Some(message) = messages.recv().await {
        match parser.classify(&message.message) {
            Ok(MessageEvent::Chat { channel, player, text }) => {
                info!("chat.event=message channel={channel} player={player:?} text={text:?}");
                apply_filter(&filter, &commands, &logs, &online, &message.message, &player);
            }
            Ok(MessageEvent::Connected { number, name, ip, port }) => {
                info!("player.event=connected number={number} name={name:?} addr={ip}:{port}");
                online.insert(name, number);
            }
            Ok(MessageEvent::GuidLogin { number, name, guid }) => {
                info!("player.event=guid number={number} name={name:?} guid={guid}");
                online.insert(name.clone(), number);
                if let Some(directory) = &directory {
                    check_directory(directory.clone(), commands.clone(), logs.clone(), number, name, guid);
                }
            }
            Ok(MessageEvent::Kicked { number, name, guid, admin, reason }) => {
                info!("player.event=kicked number={number} name={name:?} guid={guid} by={admin:?} reason={reason:?}");
                logs.append(SinkKind::Kick, &message.message);
                online.remove(&name);
            }
            Ok(MessageEvent::Unclassified { text }) => info!("server.event=message text={text:?}"),
            Err(err) => {
                warn!("chat.event=parse_failed reason={err}");
                logs.append(SinkKind::Error, &err.to_string());
            }
        }
    }
}

fn apply_filter(
    filter: &ChatFilter,
    commands: &CommandSender,
    logs: &AdminLogs,
    online: &HashMap<String, u16>,
    raw: &str,
    player: &str,
) {
    for rule in filter.hits(raw) {
        if rule.action.log_console {
            info!("filter.event=detection rule={} text={raw:?}", rule.index);
        }
        if rule.action.log_chat {
            logs.append(SinkKind::Chat, &format!("#{} {raw}", rule.index));
        }
        if !rule.action.kick && !rule.action.ban {
            continue;
        }

        let Some(&number) = online.get(player) else {
            warn!("filter.event=player_unknown player={player:?} rule={}", rule.index);
            continue;
        };
        let result = if rule.action.ban {
            logs.append(SinkKind::Ban, &format!("#{} {raw}", rule.index));
            commands.send(format!("ban {number} 0 chat filter #{}", rule.index))
        } else {
            logs.append(SinkKind::Kick, &format!("#{} {raw}", rule.index));
            commands.kick_player(number, "chat filter")
        };
        if let Err(err) = result {
            warn!("filter.event=enqueue_failed rule={} reason={err}", rule.index);
        }
    }
}

/// Asks the lookup backend about a freshly seen GUID; known-banned players
/// are kicked straight away.
fn check_directory(
    directory: Arc<PlayerDirectory>,
    commands: CommandSender,
    logs: Arc<AdminLogs>,
    number: u16,
    name: String,
    guid: String,
) {
    tokio::spawn(async move {
        match directory.fetch(&guid).await {
            Ok(record) if record.banned => {
                logs.append(SinkKind::Kick, &format!("#{number} {name}: listed ban ({guid})"));
                if let Err(err) = commands.kick_player(number, "ban evasion") {
                    warn!("lookup.event=kick_failed number={number} reason={err}");
                }
            }
            Ok(record) => {
                info!("lookup.event=record guid={} name={:?} note={:?}", record.guid, record.name, record.note);
            }
            Err(err) => debug!("lookup.event=miss guid={guid} reason={err}"),
        }
    });
}

/// Consumes session events: operational logging, audit trail, fatal exits.
async fn handle_events(mut events: mpsc::Receiver<SessionEvent>, logs: Arc<AdminLogs>, fatal: oneshot::Sender<()>) {
    let mut fatal = Some(fatal);
    while let Some(event) = events.recv().await {
        match &event {
            SessionEvent::LoggedIn => info!("session.event=logged_in"),
            SessionEvent::Reconnecting { delay } => info!("session.event=reconnecting delay={delay:?}"),
            other => {
                warn!("session.event={} detail={other:?}", other.kind());
                logs.append(SinkKind::Error, &format!("{}: {other:?}", other.kind()));
            }
        }
        if event.is_fatal() {
            if let Some(fatal) = fatal.take() {
                let _ = fatal.send(());
            }
        }
    }
    // The stream only closes when the engine is gone; treat that as fatal too.
    if let Some(fatal) = fatal.take() {
        let _ = fatal.send(());
    }
}
