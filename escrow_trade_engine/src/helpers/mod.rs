mod keyed_lock;
mod message_bus;
mod preview;

pub use keyed_lock::KeyedLocks;
pub use message_bus::{MessageBus, DEFAULT_TOPIC_CAPACITY};
pub use preview::{message_preview, truncate_preview, ENCRYPTED_PREVIEW, PREVIEW_MAX_CHARS};
