pub mod sqlite;

pub use sqlite::SqliteSink;
