use regex::Regex;
use thiserror::Error;

/// What a server message turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEvent {
    /// In-game chat: `(Channel) player: text`.
    Chat { channel: String, player: String, text: String },
    /// `Player #N name (ip:port) connected`.
    Connected { number: u16, name: String, ip: String, port: u16 },
    /// `Player #N name - GUID: <32 hex> (unverified)`.
    GuidLogin { number: u16, name: String, guid: String },
    /// `Player #N name (<32 hex>) has been kicked by admin: reason`.
    Kicked { number: u16, name: String, guid: String, admin: String, reason: String },
    /// Anything the known shapes do not cover (mission rotations, restarts).
    Unclassified { text: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageParseError {
    #[error("message looked like {shape} but did not parse: {text:?}")]
    Malformed { shape: &'static str, text: String },
}

/// Classifies raw server messages. Shapes are matched the way the game
/// formats them; a message that advertises a shape (suffix/prefix) but fails
/// its pattern is an error rather than silently unclassified.
pub struct MessageParser {
    chat: Regex,
    connected: Regex,
    guid_login: Regex,
    kicked: Regex,
    roster_row: Regex,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageParser {
    pub fn new() -> Self {
        Self {
            chat: Regex::new(r"^\((\w+)\) (.*?): (.*)$").expect("chat pattern"),
            connected: Regex::new(
                r"^Player #([0-9]{1,3}) (.*) \((\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5})\) connected$",
            )
            .expect("connected pattern"),
            guid_login: Regex::new(r"^Player #([0-9]{1,3}) (.*) - GUID: ([a-f0-9]{32}) \(unverified\)$")
                .expect("guid pattern"),
            kicked: Regex::new(r"Player #(\d+) (.*) \((\w{32})\) has been kicked by (.+): (.+)")
                .expect("kicked pattern"),
            roster_row: Regex::new(
                r"(\d+)\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5})\s+(-?\d+)\s+((\w{32})(\([^)]+\))|-)\s+(.*)",
            )
            .expect("roster pattern"),
        }
    }

    pub fn classify(&self, raw: &str) -> Result<MessageEvent, MessageParseError> {
        if raw.ends_with("(unverified)") {
            let caps = self
                .guid_login
                .captures(raw)
                .ok_or_else(|| MessageParseError::Malformed { shape: "guid login", text: raw.to_string() })?;
            return Ok(MessageEvent::GuidLogin {
                number: parse_number(&caps[1]),
                name: caps[2].to_string(),
                guid: caps[3].to_string(),
            });
        }

        if raw.ends_with("connected") {
            let caps = self
                .connected
                .captures(raw)
                .ok_or_else(|| MessageParseError::Malformed { shape: "connect notice", text: raw.to_string() })?;
            return Ok(MessageEvent::Connected {
                number: parse_number(&caps[1]),
                name: caps[2].to_string(),
                ip: caps[3].to_string(),
                port: caps[4].parse().unwrap_or(0),
            });
        }

        if raw.starts_with('(') {
            let caps = self
                .chat
                .captures(raw)
                .ok_or_else(|| MessageParseError::Malformed { shape: "chat line", text: raw.to_string() })?;
            return Ok(MessageEvent::Chat {
                channel: caps[1].to_string(),
                player: caps[2].to_string(),
                text: caps[3].to_string(),
            });
        }

        if let Some(caps) = self.kicked.captures(raw) {
            return Ok(MessageEvent::Kicked {
                number: parse_number(&caps[1]),
                name: caps[2].to_string(),
                guid: caps[3].to_string(),
                admin: caps[4].to_string(),
                reason: caps[5].to_string(),
            });
        }

        Ok(MessageEvent::Unclassified { text: raw.to_string() })
    }

    /// Parses the body of a `players` response into rows. Header and ruler
    /// lines fall out naturally because they do not match the row shape.
    pub fn parse_roster(&self, response: &str) -> Vec<PlayerRow> {
        response
            .lines()
            .filter_map(|line| {
                let caps = self.roster_row.captures(line)?;
                Some(PlayerRow {
                    number: parse_number(&caps[1]),
                    ip: caps[2].to_string(),
                    port: caps[3].parse().unwrap_or(0),
                    ping: caps[4].parse().unwrap_or(-1),
                    guid: caps.get(6).map(|guid| guid.as_str().to_string()),
                    name: caps[8].to_string(),
                })
            })
            .collect()
    }
}

/// One row of a `players` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRow {
    pub number: u16,
    pub ip: String,
    pub port: u16,
    pub ping: i32,
    pub guid: Option<String>,
    pub name: String,
}

fn parse_number(field: &str) -> u16 {
    field.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_chat() {
        let parser = MessageParser::new();
        let event = parser.classify("(Global) Miller: anyone at NWAF?").unwrap();
        assert_eq!(
            event,
            MessageEvent::Chat {
                channel: "Global".into(),
                player: "Miller".into(),
                text: "anyone at NWAF?".into()
            }
        );
    }

    #[test]
    fn classifies_connect_and_login() {
        let parser = MessageParser::new();

        let event = parser.classify("Player #12 Miller (198.51.100.7:2304) connected").unwrap();
        assert_eq!(
            event,
            MessageEvent::Connected { number: 12, name: "Miller".into(), ip: "198.51.100.7".into(), port: 2304 }
        );

        let event = parser
            .classify("Player #12 Miller - GUID: 0123456789abcdef0123456789abcdef (unverified)")
            .unwrap();
        assert_eq!(
            event,
            MessageEvent::GuidLogin {
                number: 12,
                name: "Miller".into(),
                guid: "0123456789abcdef0123456789abcdef".into()
            }
        );
    }

    #[test]
    fn classifies_kick_notice() {
        let parser = MessageParser::new();
        let event = parser
            .classify("Player #3 Gray (abcdefabcdefabcdefabcdefabcdefab) has been kicked by BattlEye: Script Restriction #42")
            .unwrap();
        assert_eq!(
            event,
            MessageEvent::Kicked {
                number: 3,
                name: "Gray".into(),
                guid: "abcdefabcdefabcdefabcdefabcdefab".into(),
                admin: "BattlEye".into(),
                reason: "Script Restriction #42".into(),
            }
        );
    }

    #[test]
    fn malformed_shapes_error_out() {
        let parser = MessageParser::new();
        assert!(matches!(
            parser.classify("Player #x broken - GUID: nope (unverified)"),
            Err(MessageParseError::Malformed { shape: "guid login", .. })
        ));
        assert!(matches!(
            parser.classify("Server restart in 5 minutes").unwrap(),
            MessageEvent::Unclassified { .. }
        ));
    }

    #[test]
    fn roster_rows_parse() {
        let parser = MessageParser::new();
        let response = "Players on server:\n\
                        [#] [IP Address]:[Port] [Ping] [GUID] [Name]\n\
                        --------------------------------------------------\n\
                        0   198.51.100.7:2304    32   0123456789abcdef0123456789abcdef(OK) Miller\n\
                        1   203.0.113.9:2304     -1   - Gray (Lobby)\n\
                        (2 players in total)";
        let rows = parser.parse_roster(response);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].number, 0);
        assert_eq!(rows[0].guid.as_deref(), Some("0123456789abcdef0123456789abcdef"));
        assert_eq!(rows[0].name, "Miller");
        assert_eq!(rows[1].ping, -1);
        assert_eq!(rows[1].guid, None);
        assert_eq!(rows[1].name, "Gray (Lobby)");
    }
}
