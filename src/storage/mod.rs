//! Storage layer facade.

pub mod sqlite;

pub use sqlite::{Neighbor, SqliteStorage, VideoRecord};
