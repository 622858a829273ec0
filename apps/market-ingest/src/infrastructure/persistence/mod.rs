//! Persistence adapters: SQLite and in-memory sinks and snapshot stores.

mod in_memory;
mod sqlite;

pub use in_memory::{InMemorySink, InMemorySnapshotStore};
pub use sqlite::{SqliteSink, SqliteSnapshotStore, open_pool};
