//! Backends implementing [`StateStore`](crate::state::StateStore),
//! [`MediaLibrary`](crate::media::MediaLibrary) and
//! [`SuggestionStore`](crate::suggestion::SuggestionStore).

mod memory;
mod sqlite;
#[cfg(test)]
mod tests;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
