use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use warden_rcon::CommandSender;

/// Interactive operator console on stdin. Short aliases for the common
/// moderation commands; anything unrecognised is passed through verbatim.
pub async fn run(commands: CommandSender, mut shutdown: watch::Receiver<bool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => dispatch(&commands, line.trim()),
                    Ok(None) => break,
                    Err(err) => {
                        warn!("console.event=read_failed reason={err}");
                        break;
                    }
                }
            }
        }
    }
    info!("console.event=stopped");
}

fn dispatch(commands: &CommandSender, line: &str) {
    if line.is_empty() {
        return;
    }

    let mut fields = line.split_whitespace();
    let result = match fields.next() {
        Some("kick") => match fields.next().and_then(|id| id.parse::<u16>().ok()) {
            Some(id) => {
                let reason = fields.collect::<Vec<_>>().join(" ");
                commands.kick_player(id, &reason)
            }
            None => {
                warn!("console.event=bad_command line={line:?} hint=\"kick <id> [reason]\"");
                return;
            }
        },
        Some("players") | Some("pl") => commands.send("players"),
        Some("ping") => commands.send("maxping"),
        Some("say") => commands.send(format!("say -1 {}", fields.collect::<Vec<_>>().join(" "))),
        Some(_) => commands.send(line),
        None => return,
    };

    if let Err(err) = result {
        warn!("console.event=enqueue_failed reason={err}");
    }
}
