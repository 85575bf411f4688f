use log::warn;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Chat,
    Kick,
    Ban,
    Error,
}

impl SinkKind {
    fn file_name(self) -> &'static str {
        match self {
            SinkKind::Chat => "chat.log",
            SinkKind::Kick => "kick.log",
            SinkKind::Ban => "ban.log",
            SinkKind::Error => "error.log",
        }
    }
}

/// Append-only audit files. One line per event, unix-millis prefixed.
pub struct AdminLogs {
    chat: Mutex<File>,
    kick: Mutex<File>,
    ban: Mutex<File>,
    error: Mutex<File>,
}

impl AdminLogs {
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let open = |kind: SinkKind| -> std::io::Result<Mutex<File>> {
            let file = OpenOptions::new().create(true).append(true).open(dir.join(kind.file_name()))?;
            Ok(Mutex::new(file))
        };
        Ok(Self {
            chat: open(SinkKind::Chat)?,
            kick: open(SinkKind::Kick)?,
            ban: open(SinkKind::Ban)?,
            error: open(SinkKind::Error)?,
        })
    }

    pub fn append(&self, kind: SinkKind, line: &str) {
        let file = match kind {
            SinkKind::Chat => &self.chat,
            SinkKind::Kick => &self.kick,
            SinkKind::Ban => &self.ban,
            SinkKind::Error => &self.error,
        };
        let mut file = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(err) = writeln!(file, "{} {line}", unix_millis()) {
            warn!("sink.event=write_failed file={} reason={err}", kind.file_name());
        }
    }
}

fn unix_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appends_to_expected_files() {
        let dir = tempdir().expect("tempdir");
        let logs = AdminLogs::open(dir.path()).expect("open sinks");

        logs.append(SinkKind::Kick, "#3 Gray: chat filter");
        logs.append(SinkKind::Kick, "#4 Miller: chat filter");
        logs.append(SinkKind::Ban, "#5 Hicks: gold seller");

        let kick = std::fs::read_to_string(dir.path().join("kick.log")).expect("kick log");
        assert_eq!(kick.lines().count(), 2);
        assert!(kick.lines().all(|line| line.ends_with("chat filter")));

        let ban = std::fs::read_to_string(dir.path().join("ban.log")).expect("ban log");
        assert!(ban.contains("gold seller"));
        assert!(dir.path().join("chat.log").exists());
    }
}
