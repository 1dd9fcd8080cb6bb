use serde::{Deserialize, Serialize};

/// Sub-channel key used for updates that arrive outside any topic ("General").
pub const GENERAL_SUB_CHANNEL: i32 = 0;

/// Bot credentials as set by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub bot_token: String,
    pub authorized_chat_id: String,
}

impl Credentials {
    /// Both values present. Outbound traffic is disabled otherwise.
    pub fn is_complete(&self) -> bool {
        !self.bot_token.trim().is_empty() && !self.authorized_chat_id.trim().is_empty()
    }

    /// Whether an inbound chat may issue commands. An empty authorized id
    /// accepts every chat.
    pub fn authorizes(&self, chat_id: &str) -> bool {
        let authorized = self.authorized_chat_id.trim();
        authorized.is_empty() || authorized == chat_id.trim()
    }
}

/// Identity of the live dashboard message of one sub-channel.
/// `message_id == 0` means no dashboard exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardState {
    pub sub_channel: i32,
    pub message_id: i64,
    pub page: u8,
}

impl DashboardState {
    pub fn none(sub_channel: i32) -> Self {
        Self {
            sub_channel,
            message_id: 0,
            page: 1,
        }
    }

    pub fn is_live(&self) -> bool {
        self.message_id != 0
    }
}

/// A locally logged event waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: i64,
    pub event_type: String,
    pub payload: String,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl Event {
    /// One line of a sync batch: `[type] payload`
    pub fn summary_line(&self) -> String {
        format!("[{}] {}", self.event_type, self.payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Message,
    CallbackQuery,
}

/// Normalized inbound item. Raw provider payloads never leave the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    pub kind: UpdateKind,
    /// `None` when a callback query carries no message context.
    pub chat_id: Option<String>,
    pub sub_channel: Option<i32>,
    pub text: Option<String>,
    pub callback_data: Option<String>,
    pub callback_query_id: Option<String>,
}

impl Update {
    /// The string that should be parsed as a command, if any.
    pub fn command_text(&self) -> Option<&str> {
        match self.kind {
            UpdateKind::Message => self.text.as_deref(),
            UpdateKind::CallbackQuery => self.callback_data.as_deref(),
        }
    }
}

/// A parsed, routable command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
    pub source_sub_channel: Option<i32>,
    pub is_callback: bool,
    pub callback_query_id: Option<String>,
}

impl Command {
    /// Split on whitespace runs; the first token, lower-cased and without an
    /// `@botname` suffix, is the name. Returns `None` for blank input.
    pub fn parse(text: &str, source_sub_channel: Option<i32>, is_callback: bool) -> Option<Self> {
        let mut tokens = text.split_whitespace();
        let first = tokens.next()?;
        let name = first.split('@').next().unwrap_or(first).to_lowercase();
        if name.is_empty() {
            return None;
        }

        Some(Self {
            name,
            args: tokens.map(str::to_string).collect(),
            source_sub_channel,
            is_callback,
            callback_query_id: None,
        })
    }

    pub fn from_update(update: &Update) -> Option<Self> {
        let text = update.command_text()?;
        let is_callback = update.kind == UpdateKind::CallbackQuery;
        let mut cmd = Self::parse(text, update.sub_channel, is_callback)?;
        cmd.callback_query_id = update.callback_query_id.clone();
        Some(cmd)
    }

    /// Arguments joined back with single spaces.
    pub fn rest(&self) -> String {
        self.args.join(" ")
    }
}

/// One inline button: label plus the command string it sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

impl Button {
    pub fn new(text: &str, callback_data: &str) -> Self {
        Self {
            text: text.to_string(),
            callback_data: callback_data.to_string(),
        }
    }
}

/// Rows of inline buttons attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Document,
}

/// A file produced by a capability, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_bot_suffix_and_lowercases() {
        let cmd = Command::parse("  /Shell@CommanderBot   ls   -la ", Some(7), false).unwrap();
        assert_eq!(cmd.name, "/shell");
        assert_eq!(cmd.args, vec!["ls", "-la"]);
        assert_eq!(cmd.source_sub_channel, Some(7));
        assert!(!cmd.is_callback);
    }

    #[test]
    fn test_parse_blank_is_none() {
        assert!(Command::parse("   ", None, false).is_none());
        assert!(Command::parse("@bot", None, false).is_none());
    }

    #[test]
    fn test_authorization_trims_and_compares_exactly() {
        let creds = Credentials {
            bot_token: "t".into(),
            authorized_chat_id: " 1400 ".into(),
        };
        assert!(creds.authorizes("1400"));
        assert!(creds.authorizes(" 1400\n"));
        assert!(!creds.authorizes("14000"));
        assert!(!creds.authorizes("-1400"));

        let open = Credentials::default();
        assert!(open.authorizes("anything"));
        assert!(!open.is_complete());
    }

    #[test]
    fn test_callback_update_uses_callback_data() {
        let update = Update {
            update_id: 5,
            kind: UpdateKind::CallbackQuery,
            chat_id: Some("1".into()),
            sub_channel: None,
            text: Some("ignored".into()),
            callback_data: Some("ls /sdcard".into()),
            callback_query_id: Some("q1".into()),
        };
        let cmd = Command::from_update(&update).unwrap();
        assert_eq!(cmd.name, "ls");
        assert_eq!(cmd.rest(), "/sdcard");
        assert!(cmd.is_callback);
        assert_eq!(cmd.callback_query_id.as_deref(), Some("q1"));
    }
}
