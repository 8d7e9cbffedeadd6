mod in_memory;
mod postgres;

pub use self::in_memory::{
    InMemoryConnection, InMemoryConnector, InMemoryResponseBuilder, Journal, JournalEntry,
};
pub use self::postgres::{PgConnector, PgSessionConnection};
