pub mod db;
pub mod domain;
pub mod timestamp;

pub use db::{connect, SqlitePool};
pub use domain::Measurement;
