//! Data models for ambientmix.

mod conversation;
mod mix;

pub use conversation::{Conversation, Message, Role};
pub use mix::{format_flag, parse_flag, FieldError, Mix, MixRecord, Track, EMPTY_CHANNEL};
