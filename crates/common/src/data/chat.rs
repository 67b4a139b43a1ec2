use chrono::{DateTime, Utc};
use faststr::FastStr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
    Other,
    Receiver,
    Admin,
}

/// One line of chat history as the backend expects it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatEntry {
    pub name:    FastStr,
    pub content: FastStr,
}

impl ChatEntry {
    pub fn new(name: impl Into<FastStr>, content: impl Into<FastStr>) -> Self {
        Self {
            name:    name.into(),
            content: content.into(),
        }
    }
}

/// Reference to an uploaded document. Only the metadata travels, the
/// backend fetches the content from `url` itself.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(rename = "type")]
    pub ty:           FastStr,
    pub name:         FastStr,
    pub url:          FastStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<FastStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<FastStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size:         Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at:  Option<DateTime<Utc>>,
}

/// Body of one conversational turn sent to the upstream chat endpoints.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChatPayload {
    pub user_input:         FastStr,
    pub chat_history:       Vec<ChatEntry>,
    #[serde(rename = "humanChatHistory")]
    pub human_chat_history: Vec<ChatEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions:       Option<FastStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents:          Option<Vec<Document>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_only:        Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_wait_time:   Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BotMessage {
    pub sender:  Sender,
    pub content: FastStr,
}

impl BotMessage {
    pub fn bot(content: impl Into<FastStr>) -> Self {
        Self {
            sender:  Sender::Bot,
            content: content.into(),
        }
    }
}
