mod chat;
mod forward;

pub use chat::{BotMessage, ChatEntry, ChatPayload, Document, Sender};
pub use forward::{ForwardRequest, Method};
