mod language;
mod message;

pub use language::{Language, SUPPORTED_LANGUAGES, print_languages};
pub use message::{ChatMessage, Message, PresenceEntry};
