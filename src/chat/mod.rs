pub mod engine;
pub mod grouping;
pub mod prompt;
pub mod store;
pub mod types;

pub use engine::{ChatEngine, SendOutcome, SendState};
pub use grouping::{group_for_display, DateBucket, SessionGroup};
pub use prompt::PromptComposer;
pub use store::SessionStore;
pub use types::{ChatFolder, ChatSession, Message, Role};
