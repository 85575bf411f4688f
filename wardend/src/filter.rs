use regex::Regex;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("failed to read filter file: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad pattern on line {line}: {source}")]
    Pattern {
        line: usize,
        #[source]
        source: regex::Error,
    },
}

/// What to do when a chat line matches a rule. Reaction codes in the filter
/// file combine the four primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterAction {
    pub log_chat: bool,
    pub log_console: bool,
    pub kick: bool,
    pub ban: bool,
}

impl FilterAction {
    /// Maps a reaction code from the filter file. Unknown codes degrade to
    /// plain chat logging.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self { log_chat: true, ..Self::default() },
            2 => Self { log_console: true, ..Self::default() },
            3 | 4 => Self { log_chat: true, log_console: true, ..Self::default() },
            5 => Self { kick: true, ..Self::default() },
            6 | 7 => Self { log_console: true, kick: true, ..Self::default() },
            8 => Self { log_console: true, ban: true, ..Self::default() },
            _ => Self { log_chat: true, ..Self::default() },
        }
    }
}

#[derive(Debug)]
pub struct FilterRule {
    pub index: u16,
    pub action: FilterAction,
    pub pattern: Regex,
}

/// Chat filter: one rule per line, `<reaction-code> <pattern>`. Lines that
/// are empty, comments, or otherwise not two fields are skipped.
#[derive(Debug, Default)]
pub struct ChatFilter {
    rules: Vec<FilterRule>,
}

impl ChatFilter {
    pub fn load(path: &Path) -> Result<Self, FilterError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, FilterError> {
        let mut rules = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            let mut fields = line.split_whitespace();
            let (Some(code), Some(pattern)) = (fields.next(), fields.next()) else {
                continue;
            };
            if fields.next().is_some() || code.starts_with('#') {
                continue;
            }
            let pattern =
                Regex::new(pattern).map_err(|source| FilterError::Pattern { line: line_no + 1, source })?;
            rules.push(FilterRule {
                index: rules.len() as u16,
                action: FilterAction::from_code(code.parse().unwrap_or(1)),
                pattern,
            });
        }
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules whose pattern matches the given chat line.
    pub fn hits<'a>(&'a self, line: &'a str) -> impl Iterator<Item = &'a FilterRule> {
        self.rules.iter().filter(move |rule| rule.pattern.is_match(line))
    }
}
