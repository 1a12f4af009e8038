pub mod defaults;
pub mod search;
pub mod store;
pub mod types;

pub use search::{retrieve, RetrievalResult, DEFAULT_TOP_K};
pub use store::KnowledgeStore;
pub use types::{EntryDraft, KnowledgeEntry};
